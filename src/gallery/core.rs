use super::{
    BACKFILL_UPLOADER, DEFAULT_UPLOADER, Gallery, GalleryError, PhotoField, PhotoRecord, is_image,
    is_valid_content_type,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

impl Gallery {
    /// Image files currently in the upload directory, as `(filename, path)`.
    pub(crate) fn photo_files(&self) -> Result<Vec<(String, PathBuf)>, GalleryError> {
        let mut photos = Vec::new();

        for entry in WalkDir::new(&self.config.upload_directory)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(std::io::Error::from(e).into()),
                Err(e) => {
                    warn!("Skipping unreadable upload entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().to_string();
            if is_image(&filename) {
                photos.push((filename, entry.into_path()));
            }
        }

        Ok(photos)
    }

    /// Record used when a photo has no usable sidecar: unknown uploader, no
    /// event, and the file's modification time as upload time.
    pub(crate) fn default_record(
        &self,
        filename: &str,
        path: &Path,
        extract_photo_time: bool,
    ) -> PhotoRecord {
        let upload_time = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let photo_time = if extract_photo_time {
            self.extractor.extract(path)
        } else {
            None
        };

        PhotoRecord::new(filename, BACKFILL_UPLOADER, "", upload_time, photo_time)
    }

    /// Every photo in the catalog, newest first.
    ///
    /// Photos without a readable sidecar get a default record that is not persisted.
    pub fn list_all(&self) -> Result<Vec<PhotoRecord>, GalleryError> {
        let mut records: Vec<PhotoRecord> = self
            .photo_files()?
            .into_iter()
            .map(|(filename, path)| {
                self.store
                    .load(&filename)
                    .unwrap_or_else(|| self.default_record(&filename, &path, false))
            })
            .collect();

        sort_by_effective_time(&mut records);
        debug!("Catalog lists {} photos", records.len());
        Ok(records)
    }

    pub async fn catalog(self: &Arc<Self>) -> Result<Vec<PhotoRecord>, GalleryError> {
        let gallery = Arc::clone(self);
        tokio::task::spawn_blocking(move || gallery.list_all()).await?
    }

    /// Location of a stored original. Names that are not plain file names are
    /// treated as missing.
    pub fn photo_path(&self, filename: &str) -> Result<PathBuf, GalleryError> {
        if !is_catalog_name(filename) {
            return Err(GalleryError::NotFound);
        }

        let path = self.config.upload_directory.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(GalleryError::NotFound)
        }
    }

    /// Thumbnail for a stored photo, regenerating it when it has gone missing.
    pub fn thumbnail_path(&self, filename: &str) -> Result<PathBuf, GalleryError> {
        if !is_catalog_name(filename) {
            return Err(GalleryError::NotFound);
        }
        if let Ok(path) = self.thumbnails.serve(filename) {
            return Ok(path);
        }

        let source = self.photo_path(filename)?;
        match self.thumbnails.generate(&source, filename) {
            Ok(path) => {
                info!("Regenerated missing thumbnail for {}", filename);
                Ok(path)
            }
            Err(e) => {
                warn!("Failed to regenerate thumbnail for {}: {}", filename, e);
                Err(GalleryError::NotFound)
            }
        }
    }

    pub async fn thumbnail(self: &Arc<Self>, filename: &str) -> Result<PathBuf, GalleryError> {
        let gallery = Arc::clone(self);
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || gallery.thumbnail_path(&filename)).await?
    }

    /// Store one uploaded file and catalog it.
    ///
    /// The content type is checked before anything touches the disk. The stored
    /// name is the sanitized original name, suffixed `_1`, `_2`, ... when taken.
    /// Metadata and thumbnail failures are logged; the upload still succeeds.
    pub async fn save_upload<R>(
        self: &Arc<Self>,
        mut reader: R,
        original_name: &str,
        content_type: &str,
        uploader_name: &str,
        event_name: &str,
    ) -> Result<PhotoRecord, GalleryError>
    where
        R: AsyncRead + Unpin,
    {
        if !is_valid_content_type(content_type) {
            return Err(GalleryError::InvalidInput(format!(
                "unsupported content type {:?} for {}",
                content_type, original_name
            )));
        }

        let requested = sanitize_filename(original_name);
        if !is_image(&requested) {
            return Err(GalleryError::InvalidInput(format!(
                "{} does not have an image extension",
                original_name
            )));
        }

        let upload_time = Utc::now();
        let upload_dir = self.config.upload_directory.clone();
        let (filename, file) =
            tokio::task::spawn_blocking(move || create_unique_file(&upload_dir, &requested))
                .await??;
        let path = self.config.upload_directory.join(&filename);

        let mut file = tokio::fs::File::from_std(file);
        let written = async {
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;
        drop(file);

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to write upload {}: {}", filename, e);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        };
        info!("Stored upload {} as {} ({} bytes)", original_name, filename, bytes);

        let uploader_name = match uploader_name.trim() {
            "" => DEFAULT_UPLOADER.to_string(),
            name => name.to_string(),
        };
        let event_name = event_name.trim().to_string();

        let gallery = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            gallery.catalog_upload(&filename, &uploader_name, &event_name, upload_time)
        })
        .await?
    }

    /// Derive the record and thumbnail for a freshly written file.
    fn catalog_upload(
        &self,
        filename: &str,
        uploader_name: &str,
        event_name: &str,
        upload_time: DateTime<Utc>,
    ) -> Result<PhotoRecord, GalleryError> {
        let path = self.config.upload_directory.join(filename);
        let photo_time = self.extractor.extract(&path);
        let record = PhotoRecord::new(filename, uploader_name, event_name, upload_time, photo_time);

        if let Err(e) = self.store.save(filename, &record) {
            error!("Failed to save metadata for {}: {}", filename, e);
        }

        // A thumbnail left over from an earlier photo of the same name is replaced
        if let Err(e) = self.thumbnails.generate(&path, filename) {
            warn!("Failed to generate thumbnail for {}: {}", filename, e);
        }

        Ok(record)
    }
}

/// Newest first by effective time; equal times fall back to filename order.
pub fn sort_by_effective_time(records: &mut [PhotoRecord]) {
    records.sort_by(|a, b| {
        b.effective_time()
            .cmp(&a.effective_time())
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Records matching both filters exactly. An empty filter matches everything.
pub fn filter(records: &[PhotoRecord], event: &str, uploader: &str) -> Vec<PhotoRecord> {
    records
        .iter()
        .filter(|r| event.is_empty() || r.event_name == event)
        .filter(|r| uploader.is_empty() || r.uploader_name == uploader)
        .cloned()
        .collect()
}

/// Distinct non-empty values of `field`, sorted ascending.
pub fn unique_values(records: &[PhotoRecord], field: PhotoField) -> Vec<String> {
    records
        .iter()
        .map(|r| r.field(field))
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Reduce a client-supplied name to its final path component.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => "upload".to_string(),
        name => name.chars().filter(|c| !c.is_control()).collect(),
    }
}

/// Whether a requested name can refer to a catalogued photo: a single plain
/// path component with an image extension.
pub fn is_catalog_name(filename: &str) -> bool {
    !filename.is_empty()
        && sanitize_filename(filename) == filename
        && Path::new(filename)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        && is_image(filename)
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Create `name` in `dir`, or `stem_N.ext` for the smallest free N.
///
/// Creation is exclusive, so concurrent callers can never receive the same name.
pub fn create_unique_file(dir: &Path, name: &str) -> Result<(String, File), GalleryError> {
    let (stem, extension) = split_extension(name);
    let mut counter: u64 = 0;

    loop {
        let candidate = if counter == 0 {
            name.to_string()
        } else {
            format!("{}_{}{}", stem, counter, extension)
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\IMG_1.JPG"), "IMG_1.JPG");
        assert_eq!(sanitize_filename("dir/"), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("my photo.png"), "my photo.png");
    }

    #[test]
    fn test_catalog_names_are_plain_image_names() {
        assert!(is_catalog_name("photo.jpg"));
        assert!(is_catalog_name("my photo.PNG"));
        assert!(!is_catalog_name(""));
        assert!(!is_catalog_name(".."));
        assert!(!is_catalog_name("../secret.jpg"));
        assert!(!is_catalog_name("..\\secret.jpg"));
        assert!(!is_catalog_name("/etc/passwd.jpg"));
        assert!(!is_catalog_name("evil.html"));
        assert!(!is_catalog_name("notes.txt"));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("photo.jpg"), ("photo", ".jpg"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_unique_names_never_overwrite() {
        let temp_dir = TempDir::new().unwrap();

        let names: Vec<String> = (0..4)
            .map(|_| create_unique_file(temp_dir.path(), "photo.jpg").unwrap().0)
            .collect();
        assert_eq!(names, vec!["photo.jpg", "photo_1.jpg", "photo_2.jpg", "photo_3.jpg"]);
    }

    #[test]
    fn test_unique_name_fills_smallest_gap() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.png"), b"x").unwrap();
        fs::write(temp_dir.path().join("a_2.png"), b"x").unwrap();

        let (name, _) = create_unique_file(temp_dir.path(), "a.png").unwrap();
        assert_eq!(name, "a_1.png");
        let (name, _) = create_unique_file(temp_dir.path(), "a.png").unwrap();
        assert_eq!(name, "a_3.png");
        assert_eq!(fs::read(temp_dir.path().join("a_2.png")).unwrap(), b"x");
    }

    #[test]
    fn test_unique_name_concurrent_callers() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || create_unique_file(&dir, "same.jpg").unwrap().0)
            })
            .collect();
        let names: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(names.len(), 8);
        assert!(names.contains("same.jpg"));
        assert!(names.contains("same_7.jpg"));
    }

    fn record(name: &str, event: &str, uploader: &str) -> PhotoRecord {
        PhotoRecord::new(name, uploader, event, Utc::now(), None)
    }

    #[test]
    fn test_filter_combination() {
        let records = vec![
            record("1.jpg", "A", "X"),
            record("2.jpg", "A", "Y"),
            record("3.jpg", "B", "X"),
        ];

        assert_eq!(filter(&records, "A", "").len(), 2);
        assert_eq!(filter(&records, "", "X").len(), 2);
        assert_eq!(filter(&records, "A", "X").len(), 1);
        assert_eq!(filter(&records, "", "").len(), 3);
        assert!(filter(&records, "a", "").is_empty());
    }

    #[test]
    fn test_unique_values_sorted_distinct_non_empty() {
        let records = vec![
            record("1.jpg", "Wedding", "bob"),
            record("2.jpg", "", "Alice"),
            record("3.jpg", "Birthday", "Bob"),
            record("4.jpg", "Wedding", "Alice"),
        ];

        assert_eq!(
            unique_values(&records, PhotoField::Event),
            vec!["Birthday", "Wedding"]
        );
        assert_eq!(
            unique_values(&records, PhotoField::Uploader),
            vec!["Alice", "Bob", "bob"]
        );
    }

    #[test]
    fn test_sort_prefers_photo_time_then_upload_time() {
        use chrono::TimeZone;
        let t1 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let mut records = vec![
            PhotoRecord::new("A.jpg", "u", "", late, Some(t1)),
            PhotoRecord::new("B.jpg", "u", "", t2, None),
            PhotoRecord::new("C.jpg", "u", "", late, Some(t3)),
        ];
        sort_by_effective_time(&mut records);

        let order: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(order, vec!["C.jpg", "B.jpg", "A.jpg"]);
    }

    #[test]
    fn test_sort_ties_are_stable_by_name() {
        let when = Utc::now();
        let mut records = vec![
            PhotoRecord::new("b.jpg", "u", "", when, None),
            PhotoRecord::new("a.jpg", "u", "", when, None),
        ];
        sort_by_effective_time(&mut records);
        assert_eq!(records[0].filename, "a.jpg");
    }
}
