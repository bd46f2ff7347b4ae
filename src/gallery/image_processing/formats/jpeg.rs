use image::{DynamicImage, ImageEncoder, codecs::jpeg::JpegEncoder};
use std::io::Write;

use crate::gallery::GalleryError;

/// Encode as JPEG at `quality`. JPEG has no alpha channel, so the image is flattened to RGB.
pub fn encode<W: Write>(image: &DynamicImage, writer: W, quality: u8) -> Result<(), GalleryError> {
    let rgb_image = image.to_rgb8();
    let encoder = JpegEncoder::new_with_quality(writer, quality);
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(())
}
