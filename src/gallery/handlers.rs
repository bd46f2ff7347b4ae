use super::{
    GalleryError, GalleryQuery, PhotoField, PhotoRecord, UploadOutcome, archive_filename, filter,
    unique_values, write_archive,
};
use crate::{AppState, static_files::serve_file};
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;
use std::path::Path as StdPath;
use tokio::io::AsyncReadExt;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, error, info, warn};

const PHOTO_FIELD: &str = "photos";
const PHOTO_CACHE_CONTROL: &str = "private, max-age=86400";
const ARCHIVE_PIPE_CAPACITY: usize = 64 * 1024;

fn authorized(app_state: &AppState, headers: &HeaderMap) -> bool {
    crate::login::is_authenticated(headers, &app_state.session_secret)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// One grid cell on the gallery page.
#[derive(Debug, Serialize)]
struct PhotoCard {
    name: String,
    url: String,
    thumbnail_url: String,
    uploader: String,
    event: String,
    uploaded: String,
    taken: Option<String>,
}

impl PhotoCard {
    fn from_record(record: &PhotoRecord, cache_breaker: i64) -> Self {
        let encoded = urlencoding::encode(&record.filename);
        Self {
            name: record.filename.clone(),
            url: format!("{}{}", super::UPLOADS_URL_PREFIX, encoded),
            thumbnail_url: format!("/thumbnails/{}?v={}", encoded, cache_breaker),
            uploader: record.uploader_name.clone(),
            event: record.event_name.clone(),
            uploaded: record.upload_time.format("%Y-%m-%d %H:%M").to_string(),
            taken: record
                .photo_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
        }
    }
}

fn download_url(event: &str, uploader: &str) -> String {
    let mut params = Vec::new();
    if !event.is_empty() {
        params.push(format!("event={}", urlencoding::encode(event)));
    }
    if !uploader.is_empty() {
        params.push(format!("uploader={}", urlencoding::encode(uploader)));
    }

    if params.is_empty() {
        "/download-all".to_string()
    } else {
        format!("/download-all?{}", params.join("&"))
    }
}

pub async fn gallery_page_handler(
    State(app_state): State<AppState>,
    Query(query): Query<GalleryQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&app_state, &headers) {
        return Redirect::to("/login").into_response();
    }

    let all = match app_state.gallery.catalog().await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to list photos: {}", e);
            return e.into_response();
        }
    };

    let (event, uploader) = (query.event(), query.uploader());
    let shown = filter(&all, event, uploader);
    let cache_breaker = chrono::Utc::now().timestamp();
    let photos: Vec<PhotoCard> = shown
        .iter()
        .map(|r| PhotoCard::from_record(r, cache_breaker))
        .collect();

    debug!(
        "Rendering gallery with {} of {} photos (event={:?}, uploader={:?})",
        shown.len(),
        all.len(),
        event,
        uploader
    );

    let style_url = app_state
        .static_handler
        .get_versioned_url("/static/style.css")
        .await;

    let globals = liquid::object!({
        "site_title": app_state.config.app.name,
        "style_url": style_url,
        "photos": photos,
        "events": unique_values(&all, PhotoField::Event),
        "uploaders": unique_values(&all, PhotoField::Uploader),
        "selected_event": event,
        "selected_uploader": uploader,
        "total_count": all.len(),
        "filtered_count": shown.len(),
        "download_url": download_url(event, uploader),
        "cache_breaker": cache_breaker,
        "max_upload_mb": app_state.config.gallery.max_upload_size_mb,
    });

    match app_state
        .template_engine
        .render_template("gallery.html.liquid", globals)
        .await
    {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render gallery page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

struct PendingUpload {
    file_name: String,
    content_type: String,
    data: Bytes,
}

/// Multipart upload of `photos` files plus `uploader_name` and `event_name`.
///
/// Every file is attempted; the request redirects back to the gallery as long as
/// at least one file was sent, whatever happened to the individual files.
pub async fn upload_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&app_state, &headers) {
        return unauthorized();
    }

    let mut uploader_name = String::new();
    let mut event_name = String::new();
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed upload request: {}", e);
                return e.into_response();
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let result = match name.as_str() {
            "uploader_name" => field.text().await.map(|t| uploader_name = t),
            "event_name" => field.text().await.map(|t| event_name = t),
            PHOTO_FIELD | "photos[]" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                field.bytes().await.map(|data| {
                    if !(file_name.is_empty() && data.is_empty()) {
                        files.push(PendingUpload {
                            file_name,
                            content_type,
                            data,
                        });
                    }
                })
            }
            other => {
                debug!("Ignoring form field {:?}", other);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Failed to read upload field {:?}: {}", name, e);
            return e.into_response();
        }
    }

    if files.is_empty() {
        return GalleryError::InvalidInput("no files uploaded".to_string()).into_response();
    }

    let mut outcome = UploadOutcome::default();
    for file in &files {
        let result = app_state
            .gallery
            .save_upload(
                &file.data[..],
                &file.file_name,
                &file.content_type,
                &uploader_name,
                &event_name,
            )
            .await;
        outcome.record(&file.file_name, result);
    }

    info!(
        "Upload finished: {} saved, {} rejected, {} failed",
        outcome.saved.len(),
        outcome.rejected,
        outcome.failed
    );
    Redirect::to("/").into_response()
}

fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", safe).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"gallery_photos.zip\""))
}

/// Stream a ZIP of the photos matching the current filters.
pub async fn download_all_handler(
    State(app_state): State<AppState>,
    Query(query): Query<GalleryQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&app_state, &headers) {
        return unauthorized();
    }

    let (event, uploader) = (query.event(), query.uploader());
    let records = match app_state.gallery.export(event, uploader).await {
        Ok(records) => records,
        Err(e) => {
            info!("Nothing to export for event={:?} uploader={:?}: {}", event, uploader, e);
            return e.into_response();
        }
    };

    let filename = archive_filename(event, uploader, chrono::Local::now());
    info!("Streaming {} photos as {}", records.len(), filename);

    let (reader, writer) = tokio::io::duplex(ARCHIVE_PIPE_CAPACITY);
    let bridge = SyncIoBridge::new(writer);
    let upload_dir = app_state.gallery.config().upload_directory.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = write_archive(&upload_dir, &records, bridge) {
            warn!("Archive stream ended early: {}", e);
        }
    });

    let mut response = Body::from_stream(ReaderStream::new(reader)).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    response_headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));
    response
}

pub async fn photo_handler(
    State(app_state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&app_state, &headers) {
        return unauthorized();
    }

    match app_state.gallery.photo_path(&filename) {
        Ok(path) => {
            let content_type = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            serve_file(&path, &content_type, PHOTO_CACHE_CONTROL).await
        }
        Err(e) => e.into_response(),
    }
}

/// Serve a thumbnail, regenerating it first if it went missing.
pub async fn thumbnail_handler(
    State(app_state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&app_state, &headers) {
        return unauthorized();
    }

    match app_state.gallery.thumbnail(&filename).await {
        Ok(path) => {
            let content_type = sniff_image_type(&path).await;
            serve_file(&path, &content_type, PHOTO_CACHE_CONTROL).await
        }
        Err(e) => e.into_response(),
    }
}

/// Content type from the file's leading bytes, since a thumbnail keeps its
/// source's name even when it was re-encoded in another format.
async fn sniff_image_type(path: &StdPath) -> String {
    let mut head = [0u8; 32];
    let read = match tokio::fs::File::open(path).await {
        Ok(mut file) => file.read(&mut head).await.unwrap_or(0),
        Err(_) => 0,
    };

    match image::guess_format(&head[..read]) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_encodes_filters() {
        assert_eq!(download_url("", ""), "/download-all");
        assert_eq!(
            download_url("Summer Party", ""),
            "/download-all?event=Summer%20Party"
        );
        assert_eq!(
            download_url("A&B", "Zoë"),
            "/download-all?event=A%26B&uploader=Zo%C3%AB"
        );
    }

    #[test]
    fn test_content_disposition_quotes_are_replaced() {
        let value = content_disposition("gallery_photos_\"x\"_2024.zip");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"gallery_photos__x__2024.zip\""
        );
    }

    #[test]
    fn test_photo_card_urls() {
        let record = PhotoRecord::new("my photo.jpg", "Ann", "Trip", chrono::Utc::now(), None);
        let card = PhotoCard::from_record(&record, 42);
        assert_eq!(card.url, "/uploads/my%20photo.jpg");
        assert_eq!(card.thumbnail_url, "/thumbnails/my%20photo.jpg?v=42");
        assert_eq!(card.taken, None);
    }
}
