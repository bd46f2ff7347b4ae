use image::{DynamicImage, codecs::gif::GifEncoder};
use std::io::Write;

use crate::gallery::GalleryError;

/// Encode a single GIF frame. Animated sources keep only their first frame.
pub fn encode<W: Write>(image: &DynamicImage, writer: W) -> Result<(), GalleryError> {
    let rgba_image = image.to_rgba8();
    let mut encoder = GifEncoder::new(writer);
    encoder.encode(
        &rgba_image,
        rgba_image.width(),
        rgba_image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(())
}
