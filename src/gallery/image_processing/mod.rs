// Image processing module - decoding, aspect-preserving resize and per-format encoding
pub mod formats;
mod resize;
mod types;

pub use resize::{decode, make_thumbnail, resize_nearest, thumbnail_dimensions};
pub use types::{ImageSize, ThumbnailFormat};
