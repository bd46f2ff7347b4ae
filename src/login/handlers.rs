use axum::{
    Form,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::AppState;

use super::{clear_session_cookie, is_authenticated, password_matches, session_cookie};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}

async fn render_login(app_state: &AppState, error_message: Option<&str>) -> Response {
    let style_url = app_state
        .static_handler
        .get_versioned_url("/static/style.css")
        .await;

    let globals = liquid::object!({
        "site_title": app_state.config.app.name,
        "style_url": style_url,
        "error": error_message.unwrap_or(""),
    });

    match app_state
        .template_engine
        .render_template("login.html.liquid", globals)
        .await
    {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render login page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn login_page(State(app_state): State<AppState>, headers: HeaderMap) -> Response {
    if is_authenticated(&headers, &app_state.session_secret) {
        return Redirect::to("/").into_response();
    }
    render_login(&app_state, None).await
}

pub async fn login_submit(
    State(app_state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    if !password_matches(&app_state.config.app.password, &form.password) {
        warn!("Login failed - invalid password");
        let mut response = render_login(&app_state, Some("Invalid password")).await;
        if response.status() == StatusCode::OK {
            *response.status_mut() = StatusCode::UNAUTHORIZED;
        }
        return response;
    }

    let cookie = match session_cookie(&app_state.session_secret, chrono::Utc::now().timestamp())
        .and_then(|c| HeaderValue::from_str(&c).map_err(|e| e.to_string()))
    {
        Ok(cookie) => cookie,
        Err(e) => {
            error!("Failed to create session cookie: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!("Login successful");
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    (headers, Redirect::to("/")).into_response()
}

pub async fn logout() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = HeaderValue::from_str(&clear_session_cookie()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (headers, Redirect::to("/login"))
}
