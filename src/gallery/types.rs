use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::GalleryError;

/// Public URL prefix under which originals are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

pub const DEFAULT_UPLOADER: &str = "Anonymous";
pub const BACKFILL_UPLOADER: &str = "Unknown";

/// One catalog entry, persisted as a JSON sidecar next to (not inside) the image.
///
/// Field names on disk are `path`, `name`, `uploader`, `event`, `date` and
/// `photo_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    #[serde(rename = "path")]
    pub storage_path: String,
    #[serde(rename = "name")]
    pub filename: String,
    #[serde(rename = "uploader")]
    pub uploader_name: String,
    #[serde(rename = "event")]
    pub event_name: String,
    #[serde(rename = "date")]
    pub upload_time: DateTime<Utc>,
    #[serde(default, with = "photo_time_format")]
    pub photo_time: Option<DateTime<Utc>>,
}

impl PhotoRecord {
    pub fn new(
        filename: &str,
        uploader_name: &str,
        event_name: &str,
        upload_time: DateTime<Utc>,
        photo_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            storage_path: format!("{}{}", UPLOADS_URL_PREFIX, filename),
            filename: filename.to_string(),
            uploader_name: uploader_name.to_string(),
            event_name: event_name.to_string(),
            upload_time,
            photo_time,
        }
    }

    /// Timestamp used for ordering: capture time when known, upload time otherwise.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.photo_time.unwrap_or(self.upload_time)
    }

    pub fn field(&self, field: PhotoField) -> &str {
        match field {
            PhotoField::Event => &self.event_name,
            PhotoField::Uploader => &self.uploader_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoField {
    Event,
    Uploader,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GalleryQuery {
    pub event: Option<String>,
    pub uploader: Option<String>,
}

impl GalleryQuery {
    pub fn event(&self) -> &str {
        self.event.as_deref().unwrap_or_default()
    }

    pub fn uploader(&self) -> &str {
        self.uploader.as_deref().unwrap_or_default()
    }
}

/// Tally of one multi-file upload request. Individual failures do not fail the request.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub saved: Vec<String>,
    pub rejected: usize,
    pub failed: usize,
}

impl UploadOutcome {
    pub fn record(&mut self, original_name: &str, result: Result<PhotoRecord, GalleryError>) {
        match result {
            Ok(record) => self.saved.push(record.filename),
            Err(GalleryError::InvalidInput(reason)) => {
                warn!("Rejected upload {}: {}", original_name, reason);
                self.rejected += 1;
            }
            Err(e) => {
                error!("Failed to store upload {}: {}", original_name, e);
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.saved.len() + self.rejected + self.failed
    }
}

/// Counts of what a single reconciliation pass changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub metadata_created: usize,
    pub thumbnails_created: usize,
    pub metadata_removed: usize,
    pub thumbnails_removed: usize,
    pub failures: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.metadata_created == 0
            && self.thumbnails_created == 0
            && self.metadata_removed == 0
            && self.thumbnails_removed == 0
    }
}

/// Sidecars written by older deployments use the zero time (`0001-01-01T00:00:00Z`)
/// for "unknown"; `null` and a missing field are accepted too.
pub(crate) mod photo_time_format {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);

        if parsed.year() <= 1 {
            Ok(None)
        } else {
            Ok(Some(parsed))
        }
    }
}
