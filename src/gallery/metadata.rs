use super::{GalleryError, PhotoRecord};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) const SIDECAR_SUFFIX: &str = ".json";

/// Reads and writes one JSON sidecar per photo under the metadata root.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    metadata_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn sidecar_path(&self, filename: &str) -> PathBuf {
        self.metadata_dir
            .join(format!("{}{}", filename, SIDECAR_SUFFIX))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.sidecar_path(filename).is_file()
    }

    /// Persist `record` as the sidecar for `filename`.
    ///
    /// The JSON is written to a temporary file in the same directory and renamed
    /// into place, so a crash mid-write never leaves a truncated sidecar behind.
    pub fn save(&self, filename: &str, record: &PhotoRecord) -> Result<(), GalleryError> {
        let json = serde_json::to_vec(record)?;
        let final_path = self.sidecar_path(filename);
        let tmp_path = self
            .metadata_dir
            .join(format!(".{}{}.tmp", filename, SIDECAR_SUFFIX));

        let write_result = (|| -> std::io::Result<()> {
            let mut file = open_private(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &final_path)
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Saved metadata for {}", filename);
        Ok(())
    }

    /// Load the sidecar for `filename`.
    ///
    /// A missing sidecar and one that fails to parse both come back as `None`.
    pub fn load(&self, filename: &str) -> Option<PhotoRecord> {
        let path = self.sidecar_path(filename);
        let data = fs::read(&path).ok()?;

        match serde_json::from_slice::<PhotoRecord>(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Failed to parse metadata for {}: {}", filename, e);
                None
            }
        }
    }

    pub fn remove(&self, filename: &str) -> Result<(), GalleryError> {
        fs::remove_file(self.sidecar_path(filename))?;
        Ok(())
    }

    /// Image filenames that currently have a sidecar file, in directory order.
    pub fn sidecar_filenames(&self) -> Result<Vec<String>, GalleryError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.metadata_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if let Some(image_name) = file_name.strip_suffix(SIDECAR_SUFFIX)
                && !image_name.is_empty()
            {
                names.push(image_name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
