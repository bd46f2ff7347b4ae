use crate::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create directory {path:?}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No gallery password configured (set GALLERY_PASSWORD)")]
    PasswordMissing,

    #[error("Thumbnail size must be positive")]
    InvalidThumbnailSize,
}

async fn ensure_directory(label: &str, dir: &Path) -> Result<(), StartupCheckError> {
    if dir.is_dir() {
        info!("{} directory exists: {:?}", label, dir);
        return Ok(());
    }

    info!("{} directory does not exist, creating: {:?}", label, dir);
    tokio::fs::create_dir_all(dir).await.map_err(|source| {
        error!("Failed to create {} directory {:?}: {}", label, dir, source);
        StartupCheckError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source,
        }
    })
}

/// Verify the configuration and create the storage directories.
///
/// Every returned error is fatal; missing template or static directories only warn.
pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    if config.app.password.is_empty() {
        error!("No gallery password configured");
        errors.push(StartupCheckError::PasswordMissing);
    }

    if config.gallery.thumbnail_size == 0 {
        errors.push(StartupCheckError::InvalidThumbnailSize);
    }

    let gallery = &config.gallery;
    for (label, dir) in [
        ("Upload", gallery.upload_directory.clone()),
        ("Metadata", gallery.metadata_directory.clone()),
        ("Thumbnail", gallery.thumbnail_directory()),
    ] {
        if let Err(e) = ensure_directory(label, &dir).await {
            errors.push(e);
        }
    }

    for (label, dir) in [
        ("Templates", &config.templates.directory),
        ("Static files", &config.static_files.directory),
    ] {
        if dir.is_dir() {
            info!("{} directory exists: {:?}", label, dir);
        } else {
            warn!("{} directory does not exist: {:?}", label, dir);
            warn!("This may cause issues with page rendering");
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
