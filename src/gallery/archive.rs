use super::{Gallery, GalleryError, PhotoRecord, core};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

impl Gallery {
    /// Photos to include in an export for the given filters.
    ///
    /// A selection matching nothing is `NotFound` rather than an empty archive.
    pub fn export_selection(
        &self,
        event: &str,
        uploader: &str,
    ) -> Result<Vec<PhotoRecord>, GalleryError> {
        let records = core::filter(&self.list_all()?, event, uploader);
        if records.is_empty() {
            return Err(GalleryError::NotFound);
        }
        Ok(records)
    }

    pub async fn export(
        self: &Arc<Self>,
        event: &str,
        uploader: &str,
    ) -> Result<Vec<PhotoRecord>, GalleryError> {
        let gallery = Arc::clone(self);
        let (event, uploader) = (event.to_string(), uploader.to_string());
        tokio::task::spawn_blocking(move || gallery.export_selection(&event, &uploader)).await?
    }
}

/// `gallery_photos[_<event>][_<uploader>]_<YYYY-MM-DD_HH-MM-SS>.zip`, with
/// spaces in the filter values replaced by underscores.
pub fn archive_filename(event: &str, uploader: &str, now: DateTime<Local>) -> String {
    let mut name = String::from("gallery_photos");
    for part in [event, uploader] {
        if !part.is_empty() {
            name.push('_');
            name.push_str(&part.replace(' ', "_"));
        }
    }
    name.push('_');
    name.push_str(&now.format("%Y-%m-%d_%H-%M-%S").to_string());
    name.push_str(".zip");
    name
}

/// Write `records` as a deflated ZIP stream to `writer`, one entry per photo
/// named by its bare filename.
///
/// Only sequential writes are made, so `writer` can be a pipe into the response
/// body. A photo that cannot be opened or read is logged and skipped; failures of
/// `writer` itself end the archive. Returns the number of entries written.
pub fn write_archive<W: Write>(
    upload_dir: &Path,
    records: &[PhotoRecord],
    writer: W,
) -> Result<usize, GalleryError> {
    let mut zip = ZipWriter::new_stream(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = 0;

    for record in records {
        let path = upload_dir.join(&record.filename);
        let mut source = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping {} in archive: {}", record.filename, e);
                continue;
            }
        };

        zip.start_file(record.filename.as_str(), options)?;
        match std::io::copy(&mut source, &mut zip) {
            Ok(bytes) => {
                debug!("Archived {} ({} bytes)", record.filename, bytes);
                written += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Err(e.into()),
            Err(e) => warn!("Failed to copy {} into archive: {}", record.filename, e),
        }
    }

    zip.finish()?;
    info!("Finished archive with {} of {} photos", written, records.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    #[test]
    fn test_archive_filename_without_filters() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            archive_filename("", "", now),
            "gallery_photos_2024-03-09_07-05-01.zip"
        );
    }

    #[test]
    fn test_archive_filename_with_filters() {
        let now = Local.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(
            archive_filename("Summer Party", "", now),
            "gallery_photos_Summer_Party_2024-12-31_23-59-58.zip"
        );
        assert_eq!(
            archive_filename("Summer Party", "Jane Doe", now),
            "gallery_photos_Summer_Party_Jane_Doe_2024-12-31_23-59-58.zip"
        );
        assert_eq!(
            archive_filename("", "Jane", now),
            "gallery_photos_Jane_2024-12-31_23-59-58.zip"
        );
    }

    #[test]
    fn test_write_archive_uses_bare_names_and_skips_missing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("one.jpg"), b"first photo").unwrap();
        std::fs::write(temp_dir.path().join("two.png"), b"second photo").unwrap();

        let records = vec![
            PhotoRecord::new("one.jpg", "A", "", chrono::Utc::now(), None),
            PhotoRecord::new("gone.jpg", "A", "", chrono::Utc::now(), None),
            PhotoRecord::new("two.png", "A", "", chrono::Utc::now(), None),
        ];

        let mut buffer = Vec::new();
        let written = write_archive(temp_dir.path(), &records, &mut buffer).unwrap();
        assert_eq!(written, 2);

        let mut archive = zip::ZipArchive::new(Cursor::new(buffer)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["one.jpg", "two.png"]);

        let mut contents = String::new();
        archive
            .by_name("two.png")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "second photo");
    }
}
