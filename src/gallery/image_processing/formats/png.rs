use image::{DynamicImage, ImageEncoder, codecs::png::PngEncoder};
use std::io::Write;

use crate::gallery::GalleryError;

pub fn encode<W: Write>(image: &DynamicImage, writer: W) -> Result<(), GalleryError> {
    let rgba_image = image.to_rgba8();
    let encoder = PngEncoder::new(writer);
    encoder.write_image(
        &rgba_image,
        rgba_image.width(),
        rgba_image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(())
}
