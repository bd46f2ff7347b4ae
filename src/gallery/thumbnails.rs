use super::{GalleryError, image_processing};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Distinguishes concurrent writers of the same thumbnail.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates, locates and removes thumbnails under `<metadata>/thumbnails`.
///
/// A thumbnail has the same file name as its source photo.
#[derive(Debug, Clone)]
pub struct ThumbnailManager {
    thumbnail_dir: PathBuf,
    size: u32,
    quality: u8,
}

impl ThumbnailManager {
    /// Subdirectory of the metadata root holding thumbnails.
    pub const DIRECTORY_NAME: &'static str = "thumbnails";

    pub fn new(thumbnail_dir: impl Into<PathBuf>, size: u32, quality: u8) -> Self {
        Self {
            thumbnail_dir: thumbnail_dir.into(),
            size,
            quality,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.thumbnail_dir
    }

    pub fn thumbnail_path(&self, filename: &str) -> PathBuf {
        self.thumbnail_dir.join(filename)
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.thumbnail_path(filename).is_file()
    }

    /// Decode `source`, resize it and write the thumbnail for `filename`,
    /// replacing any existing one.
    pub fn generate(&self, source: &Path, filename: &str) -> Result<PathBuf, GalleryError> {
        let (thumbnail, format) = image_processing::make_thumbnail(source, self.size)?;

        let final_path = self.thumbnail_path(filename);
        let tmp_path = self.thumbnail_dir.join(format!(
            ".{}.{}-{}.tmp",
            filename,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write_result = (|| -> Result<(), GalleryError> {
            let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
            image_processing::formats::encode(&thumbnail, format, self.quality, &mut writer)?;
            writer.flush()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        debug!(
            "Generated {}x{} thumbnail for {} as {:?}",
            thumbnail.width(),
            thumbnail.height(),
            filename,
            format.encoded_as()
        );
        Ok(final_path)
    }

    /// Generate the thumbnail only when none exists yet. Returns whether one was
    /// written. An existing thumbnail is never checked for staleness.
    pub fn ensure(&self, source: &Path, filename: &str) -> Result<bool, GalleryError> {
        if self.exists(filename) {
            return Ok(false);
        }
        self.generate(source, filename)?;
        Ok(true)
    }

    /// Path of an existing thumbnail, or `NotFound`.
    pub fn serve(&self, filename: &str) -> Result<PathBuf, GalleryError> {
        let path = self.thumbnail_path(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(GalleryError::NotFound)
        }
    }

    pub fn remove(&self, filename: &str) -> Result<(), GalleryError> {
        fs::remove_file(self.thumbnail_path(filename))?;
        Ok(())
    }

    /// Names of the files in the thumbnail directory, skipping in-progress writes.
    pub fn thumbnail_filenames(&self) -> Result<Vec<String>, GalleryError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.thumbnail_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') && name.ends_with(".tmp") {
                warn!("Skipping leftover temporary thumbnail {}", name);
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }
}
