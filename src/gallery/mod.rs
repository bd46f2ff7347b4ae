// Gallery module - photo catalog, derived thumbnails and the HTTP handlers around them
mod archive;
mod core;
mod error;
mod handlers;
mod image_processing;
mod metadata;
mod photo_time;
mod reconcile;
mod thumbnails;
mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;
#[cfg(test)]
mod tests;

// Re-export public items
pub use archive::{archive_filename, write_archive};
pub use self::core::{create_unique_file, filter, sanitize_filename, sort_by_effective_time, unique_values};
pub use error::GalleryError;
pub use handlers::{
    download_all_handler, gallery_page_handler, photo_handler, thumbnail_handler, upload_handler,
};
pub use image_processing::{ImageSize, ThumbnailFormat, thumbnail_dimensions};
pub use metadata::MetadataStore;
pub use photo_time::{
    EmbeddedExifSource, ExifToolSource, FilenameSource, PhotoTimeExtractor, PhotoTimeSource,
    parse_timestamp,
};
pub use thumbnails::ThumbnailManager;
pub use types::*;

use std::sync::Arc;

pub type SharedGallery = Arc<Gallery>;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub struct Gallery {
    pub(crate) config: crate::GalleryConfig,
    pub(crate) store: MetadataStore,
    pub(crate) thumbnails: ThumbnailManager,
    pub(crate) extractor: PhotoTimeExtractor,
}

impl Gallery {
    pub fn new(config: crate::GalleryConfig) -> Self {
        let extractor = PhotoTimeExtractor::from_config(&config);
        Self::with_extractor(config, extractor)
    }

    pub fn with_extractor(config: crate::GalleryConfig, extractor: PhotoTimeExtractor) -> Self {
        let store = MetadataStore::new(config.metadata_directory.clone());
        let thumbnails = ThumbnailManager::new(
            config.thumbnail_directory(),
            config.thumbnail_size,
            config.thumbnail_quality,
        );

        Self {
            config,
            store,
            thumbnails,
            extractor,
        }
    }

    pub fn config(&self) -> &crate::GalleryConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.store
    }

    pub fn thumbnails(&self) -> &ThumbnailManager {
        &self.thumbnails
    }
}

/// Whether `file_name` has one of the catalogued image extensions (any case).
pub fn is_image(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Whether a declared upload content type is on the allow-list.
pub fn is_valid_content_type(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.contains(&content_type)
}

#[cfg(test)]
mod content_tests {
    use super::*;

    #[test]
    fn test_is_image() {
        assert!(is_image("a.jpg"));
        assert!(is_image("B.JPEG"));
        assert!(is_image("c.Png"));
        assert!(is_image("d.gif"));
        assert!(is_image("e.webp"));
        assert!(!is_image("f.bmp"));
        assert!(!is_image("g.jpg.json"));
        assert!(!is_image("jpg"));
    }

    #[test]
    fn test_content_type_allow_list() {
        for allowed in ALLOWED_CONTENT_TYPES {
            assert!(is_valid_content_type(allowed));
        }
        assert!(!is_valid_content_type("image/bmp"));
        assert!(!is_valid_content_type("text/html"));
        assert!(!is_valid_content_type("IMAGE/JPEG"));
        assert!(!is_valid_content_type(""));
    }
}
