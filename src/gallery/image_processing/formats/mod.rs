pub mod gif;
pub mod jpeg;
pub mod png;

use super::types::ThumbnailFormat;
use crate::gallery::GalleryError;
use image::DynamicImage;
use std::io::Write;

/// Encode `image` with the encoder belonging to `format`.
pub fn encode<W: Write>(
    image: &DynamicImage,
    format: ThumbnailFormat,
    jpeg_quality: u8,
    writer: W,
) -> Result<(), GalleryError> {
    match format {
        ThumbnailFormat::Jpeg | ThumbnailFormat::Other => jpeg::encode(image, writer, jpeg_quality),
        ThumbnailFormat::Png => png::encode(image, writer),
        ThumbnailFormat::Gif => gif::encode(image, writer),
    }
}
