pub mod auth;
pub mod handlers;

pub use auth::*;
pub use handlers::*;
