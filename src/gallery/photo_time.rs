use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info, trace};

/// Tags asked of exiftool, capture time first.
const EXIFTOOL_FIELDS: [&str; 7] = [
    "DateTimeOriginal",
    "CreateDate",
    "DateTimeCreated",
    "MetadataDate",
    "DateTime",
    "DateTimeDigitized",
    "ModifyDate",
];

/// Embedded EXIF tags in the same preference order (`CreateDate` is EXIF `DateTimeDigitized`,
/// `ModifyDate` is EXIF `DateTime`).
const EXIF_FIELDS: [rexif::ExifTag; 3] = [
    rexif::ExifTag::DateTimeOriginal,
    rexif::ExifTag::DateTimeDigitized,
    rexif::ExifTag::DateTime,
];

const ZONED_FORMATS: [&str; 5] = [
    "%Y:%m:%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y:%m:%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y/%m/%d %H:%M:%S%:z",
];

const NAIVE_FORMATS: [&str; 5] = [
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y:%m:%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y:%m:%d", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a metadata timestamp with the first accepted format that matches.
///
/// Values without an offset are taken as UTC; date-only values become midnight.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in &ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in &NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    for format in &DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN).and_utc());
        }
    }

    None
}

/// One way of finding out when a photo was taken.
pub trait PhotoTimeSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` means "this source does not know"; it is never an error.
    fn extract(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// Tries each source in order and returns the first timestamp found.
pub struct PhotoTimeExtractor {
    sources: Vec<Box<dyn PhotoTimeSource>>,
}

impl PhotoTimeExtractor {
    pub fn new(sources: Vec<Box<dyn PhotoTimeSource>>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &crate::GalleryConfig) -> Self {
        let mut sources: Vec<Box<dyn PhotoTimeSource>> = Vec::new();
        if let Some(program) = &config.exiftool_path {
            sources.push(Box::new(ExifToolSource::new(program.clone())));
        }
        sources.push(Box::new(EmbeddedExifSource));
        if config.filename_dates {
            sources.push(Box::new(FilenameSource));
        }
        Self::new(sources)
    }

    pub fn extract(&self, path: &Path) -> Option<DateTime<Utc>> {
        for source in &self.sources {
            if let Some(time) = source.extract(path) {
                info!(
                    "Photo time for {} from {}: {}",
                    display_name(path),
                    source.name(),
                    time.to_rfc3339()
                );
                return Some(time);
            }
        }

        debug!("No photo time found for {}", display_name(path));
        None
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Shells out to `exiftool`. When the program is missing this source silently
/// reports nothing.
pub struct ExifToolSource {
    program: PathBuf,
    available: OnceLock<bool>,
}

impl ExifToolSource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            available: OnceLock::new(),
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = Command::new(&self.program)
                .arg("-ver")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if !available {
                debug!("{:?} not available, skipping external metadata", self.program);
            }
            available
        })
    }
}

impl PhotoTimeSource for ExifToolSource {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract(&self, path: &Path) -> Option<DateTime<Utc>> {
        if !self.is_available() {
            return None;
        }

        let mut command = Command::new(&self.program);
        command.arg("-json");
        for field in &EXIFTOOL_FIELDS {
            command.arg(format!("-{}", field));
        }
        let output = command
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;

        let parsed: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_slice(&output.stdout).ok()?;
        let tags = parsed.into_iter().next()?;

        for field in &EXIFTOOL_FIELDS {
            let Some(value) = tags.get(*field) else {
                continue;
            };
            let raw = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if raw.trim().is_empty() || raw.trim() == "-" {
                continue;
            }
            match parse_timestamp(&raw) {
                Some(time) => return Some(time),
                None => debug!(
                    "exiftool field {} for {} is not a date: {}",
                    field,
                    display_name(path),
                    raw
                ),
            }
        }

        None
    }
}

/// In-process EXIF parsing.
pub struct EmbeddedExifSource;

impl PhotoTimeSource for EmbeddedExifSource {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn extract(&self, path: &Path) -> Option<DateTime<Utc>> {
        let exif = match rexif::parse_file(path) {
            Ok(exif) => exif,
            Err(e) => {
                trace!("No EXIF data for {}: {}", path.display(), e);
                return None;
            }
        };

        for field in &EXIF_FIELDS {
            if let Some(entry) = exif.entries.iter().find(|e| e.tag == *field) {
                if let Some(time) = parse_timestamp(&entry.value_more_readable) {
                    debug!("Found capture date in {:?}: {}", field, time);
                    return Some(time);
                }
                debug!(
                    "EXIF {:?} for {} is not a date: {}",
                    field,
                    display_name(path),
                    entry.value_more_readable
                );
            }
        }

        // Any remaining field whose name mentions a date or time
        exif.entries.iter().find_map(|entry| {
            let tag_name = format!("{:?}", entry.tag).to_lowercase();
            if !(tag_name.contains("date") || tag_name.contains("time")) {
                return None;
            }
            let time = parse_timestamp(&entry.value_more_readable)?;
            debug!("Found date in EXIF field {:?}: {}", entry.tag, time);
            Some(time)
        })
    }
}

/// Recognises timestamps that cameras and phones embed in file names, e.g.
/// `IMG_20230814_153012.jpg`, `PXL_20230814_153012345.jpg`,
/// `2023-08-14 15.30.12.png` or `IMG-20230814-WA0001.jpg`.
pub struct FilenameSource;

impl PhotoTimeSource for FilenameSource {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn extract(&self, path: &Path) -> Option<DateTime<Utc>> {
        let stem = path.file_stem()?.to_str()?;
        date_from_filename(stem)
    }
}

fn date_from_filename(stem: &str) -> Option<DateTime<Utc>> {
    let groups: Vec<&str> = stem
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .collect();

    for (i, group) in groups.iter().enumerate() {
        // 20230814153012
        if group.len() >= 14
            && let Some(time) = compose(&group[..8], Some(&group[8..14]))
        {
            return Some(time);
        }

        // 20230814 followed by 153012[345]
        if group.len() == 8 {
            let time = groups.get(i + 1).filter(|g| g.len() >= 6).map(|g| &g[..6]);
            if let Some(found) = compose(group, time) {
                return Some(found);
            }
        }

        // 2023 08 14 [15 30 12]
        if group.len() == 4
            && let [month, day, rest @ ..] = &groups[i + 1..]
            && month.len() == 2
            && day.len() == 2
        {
            let date = format!("{}{}{}", group, month, day);
            let time = match rest {
                [h, m, s, ..] if h.len() == 2 && m.len() == 2 && s.len() == 2 => {
                    Some(format!("{}{}{}", h, m, s))
                }
                _ => None,
            };
            if let Some(found) = compose(&date, time.as_deref()) {
                return Some(found);
            }
        }
    }

    None
}

/// Build a timestamp from `YYYYMMDD` and an optional `HHMMSS`. An invalid time of
/// day degrades to midnight; years outside 1970..=2100 are rejected as noise.
fn compose(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let year: i32 = date.get(0..4)?.parse().ok()?;
    let month: u32 = date.get(4..6)?.parse().ok()?;
    let day: u32 = date.get(6..8)?.parse().ok()?;
    if !(1970..=2100).contains(&year) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = time
        .and_then(|t| {
            let hour = t.get(0..2)?.parse().ok()?;
            let minute = t.get(2..4)?.parse().ok()?;
            let second = t.get(4..6)?.parse().ok()?;
            NaiveTime::from_hms_opt(hour, minute, second)
        })
        .unwrap_or(NaiveTime::MIN);

    Some(date.and_time(time).and_utc())
}
