use super::{Gallery, GalleryError, ReconcileReport, is_image};
use std::collections::HashSet;
use std::fs;
use tracing::{debug, error, info, warn};

impl Gallery {
    /// Create the upload, metadata and thumbnail directories.
    pub fn ensure_directories(&self) -> Result<(), GalleryError> {
        for dir in [
            self.config.upload_directory.as_path(),
            self.store.directory(),
            self.thumbnails.directory(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Bring sidecars and thumbnails in line with the photos on disk.
    ///
    /// Missing sidecars and thumbnails are created, and ones whose photo is gone are
    /// deleted. Only the directory setup can fail the pass; every per-photo failure
    /// is logged and counted. A second run over unchanged directories changes nothing.
    pub fn reconcile(&self) -> Result<ReconcileReport, GalleryError> {
        self.ensure_directories()?;

        let mut report = ReconcileReport::default();
        let photos = self.photo_files()?;
        let present: HashSet<&str> = photos.iter().map(|(name, _)| name.as_str()).collect();

        for (filename, path) in &photos {
            if self.store.exists(filename) {
                continue;
            }
            let record = self.default_record(filename, path, true);
            match self.store.save(filename, &record) {
                Ok(()) => {
                    debug!("Backfilled metadata for {}", filename);
                    report.metadata_created += 1;
                }
                Err(e) => {
                    warn!("Failed to backfill metadata for {}: {}", filename, e);
                    report.failures += 1;
                }
            }
        }

        for (filename, path) in &photos {
            match self.thumbnails.ensure(path, filename) {
                Ok(true) => report.thumbnails_created += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to generate thumbnail for {}: {}", filename, e);
                    report.failures += 1;
                }
            }
        }

        let source_exists = |name: &str| {
            present.contains(name) || self.config.upload_directory.join(name).is_file()
        };

        match self.store.sidecar_filenames() {
            Ok(names) => {
                for name in names.iter().filter(|n| !source_exists(n.as_str())) {
                    match self.store.remove(name) {
                        Ok(()) => {
                            debug!("Removed orphaned metadata for {}", name);
                            report.metadata_removed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to remove orphaned metadata for {}: {}", name, e);
                            report.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to list metadata directory: {}", e);
                report.failures += 1;
            }
        }

        match self.thumbnails.thumbnail_filenames() {
            Ok(names) => {
                for name in names.iter().filter(|n| is_image(n) && !source_exists(n.as_str())) {
                    match self.thumbnails.remove(name) {
                        Ok(()) => {
                            debug!("Removed orphaned thumbnail {}", name);
                            report.thumbnails_removed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to remove orphaned thumbnail {}: {}", name, e);
                            report.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to list thumbnail directory: {}", e);
                report.failures += 1;
            }
        }

        info!(
            "Reconciled {} photos: {} metadata and {} thumbnails created, {} metadata and {} thumbnails removed, {} failures",
            photos.len(),
            report.metadata_created,
            report.thumbnails_created,
            report.metadata_removed,
            report.thumbnails_removed,
            report.failures
        );
        Ok(report)
    }
}
