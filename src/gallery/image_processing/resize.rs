use crate::gallery::GalleryError;
use image::{DynamicImage, ImageReader, RgbaImage};
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use super::types::{ImageSize, ThumbnailFormat};

/// Scale `(width, height)` so the longest side becomes exactly `target`.
///
/// The other side is `floor(other * target / longest)`, never less than one pixel.
/// Square sources map to `target x target`.
pub fn thumbnail_dimensions(
    width: u32,
    height: u32,
    target: u32,
) -> Result<ImageSize, GalleryError> {
    if width == 0 || height == 0 {
        return Err(GalleryError::DecodeError(format!(
            "degenerate source dimensions {}x{}",
            width, height
        )));
    }
    if target == 0 {
        return Err(GalleryError::InvalidInput(
            "thumbnail size must be positive".to_string(),
        ));
    }

    let scale = |other: u32, longest: u32| -> u32 {
        let scaled = u64::from(other) * u64::from(target) / u64::from(longest);
        (scaled as u32).max(1)
    };

    if width > height {
        Ok(ImageSize::new(target, scale(height, width)))
    } else {
        Ok(ImageSize::new(scale(width, height), target))
    }
}

/// Nearest-neighbour resample: destination pixel `(x, y)` copies source pixel
/// `(floor(x * srcW / dstW), floor(y * srcH / dstH))`.
pub fn resize_nearest(image: &DynamicImage, size: ImageSize) -> DynamicImage {
    let source = image.to_rgba8();
    let (src_width, src_height) = source.dimensions();
    let (dst_width, dst_height) = (size.width.max(1), size.height.max(1));

    let resized = RgbaImage::from_fn(dst_width, dst_height, |x, y| {
        let src_x = (u64::from(x) * u64::from(src_width) / u64::from(dst_width)) as u32;
        let src_y = (u64::from(y) * u64::from(src_height) / u64::from(dst_height)) as u32;
        *source.get_pixel(src_x, src_y)
    });

    DynamicImage::ImageRgba8(resized)
}

/// Decode the file at `path`, sniffing its format from the content rather than the extension.
pub fn decode(path: &Path) -> Result<(DynamicImage, ThumbnailFormat), GalleryError> {
    let file = std::fs::File::open(path)?;
    let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
    let format = ThumbnailFormat::from_image_format(reader.format());

    debug!("Decoding {:?} as {:?}", path, format);

    let image = reader
        .decode()
        .map_err(|e| GalleryError::DecodeError(e.to_string()))?;

    Ok((image, format))
}

/// Decode `path` and shrink (or enlarge) it so its longest side is `target`.
pub fn make_thumbnail(
    path: &Path,
    target: u32,
) -> Result<(DynamicImage, ThumbnailFormat), GalleryError> {
    let (image, format) = decode(path)?;
    let size = thumbnail_dimensions(image.width(), image.height(), target)?;
    Ok((resize_nearest(&image, size), format))
}
