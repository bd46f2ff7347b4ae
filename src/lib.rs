use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderName, HeaderValue, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

pub mod gallery;
pub mod login;
pub mod startup_checks;
pub mod static_files;
pub mod templating;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub templates: TemplateConfig,
    pub static_files: StaticConfig,
    pub gallery: GalleryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Site title shown on every page.
    pub name: String,
    /// The shared password guests log in with.
    pub password: String,
    /// Cookie signing key. A random key is generated per process when unset.
    pub session_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Originals live here, one flat directory.
    pub upload_directory: PathBuf,
    /// Sidecars live here; thumbnails in its `thumbnails` subdirectory.
    pub metadata_directory: PathBuf,
    /// Longest side of a thumbnail, in pixels.
    pub thumbnail_size: u32,
    /// JPEG quality for thumbnails.
    pub thumbnail_quality: u8,
    pub max_upload_size_mb: usize,
    /// `exiftool` executable; `None` turns the external lookup off.
    pub exiftool_path: Option<PathBuf>,
    /// Fall back to dates embedded in file names.
    pub filename_dates: bool,
}

impl GalleryConfig {
    pub fn thumbnail_directory(&self) -> PathBuf {
        self.metadata_directory
            .join(gallery::ThumbnailManager::DIRECTORY_NAME)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Photo Gallery".to_string(),
            password: String::new(),
            session_secret: None,
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("templates"),
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("static"),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            upload_directory: PathBuf::from("uploads"),
            metadata_directory: PathBuf::from("metadata"),
            thumbnail_size: 300,
            thumbnail_quality: 80,
            max_upload_size_mb: 32,
            exiftool_path: Some(PathBuf::from("exiftool")),
            filename_dates: true,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub template_engine: Arc<templating::TemplateEngine>,
    pub static_handler: static_files::StaticFileHandler,
    pub gallery: gallery::SharedGallery,
    pub session_secret: Arc<str>,
    pub config: Config,
}

#[derive(Debug, Default, Deserialize)]
struct StaticQuery {
    v: Option<String>,
}

async fn static_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<StaticQuery>,
) -> impl IntoResponse {
    app_state.static_handler.serve(&path, query.v.is_some()).await
}

/// Headers added to every response.
const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

pub async fn create_app(config: Config) -> Router {
    let gallery = Arc::new(gallery::Gallery::new(config.gallery.clone()));
    create_app_with_gallery(config, gallery).await
}

/// Build the router around an already constructed gallery.
pub async fn create_app_with_gallery(config: Config, gallery: gallery::SharedGallery) -> Router {
    let template_engine = Arc::new(templating::TemplateEngine::new(
        config.templates.directory.clone(),
    ));

    let static_handler =
        static_files::StaticFileHandler::new(config.static_files.directory.clone());
    static_handler.refresh_file_versions().await;

    let session_secret: Arc<str> = match &config.app.session_secret {
        Some(secret) if !secret.is_empty() => Arc::from(secret.as_str()),
        _ => {
            tracing::info!("No session secret configured, sessions end on restart");
            Arc::from(login::generate_secret())
        }
    };

    let max_upload_bytes = config.gallery.max_upload_bytes();

    let app_state = AppState {
        template_engine,
        static_handler,
        gallery,
        session_secret,
        config,
    };

    let mut router = Router::new()
        .route("/", get(gallery::gallery_page_handler))
        .route("/login", get(login::login_page).post(login::login_submit))
        .route("/logout", get(login::logout).post(login::logout))
        .route(
            "/upload",
            post(gallery::upload_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/download-all", get(gallery::download_all_handler))
        .route("/uploads/{filename}", get(gallery::photo_handler))
        .route("/thumbnails/{filename}", get(gallery::thumbnail_handler))
        .route("/static/{*path}", get(static_file_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let method = request.method();
                    let uri = request.uri();
                    let user_agent = request
                        .headers()
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %method,
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %status,
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        );

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }

    router.with_state(app_state)
}
