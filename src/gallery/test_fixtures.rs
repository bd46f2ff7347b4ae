use super::{EmbeddedExifSource, FilenameSource, Gallery, PhotoTimeExtractor};
use image::{ImageBuffer, Rgb};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A gallery rooted in a fresh temporary directory. The external metadata tool
/// is left out so results do not depend on what is installed.
pub(crate) fn test_gallery() -> (Arc<Gallery>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = crate::GalleryConfig {
        upload_directory: temp_dir.path().join("uploads"),
        metadata_directory: temp_dir.path().join("metadata"),
        ..Default::default()
    };
    let extractor =
        PhotoTimeExtractor::new(vec![Box::new(EmbeddedExifSource), Box::new(FilenameSource)]);
    let gallery = Gallery::with_extractor(config, extractor);
    gallery.ensure_directories().unwrap();
    (Arc::new(gallery), temp_dir)
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90])
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Jpeg).unwrap();
    buffer.into_inner()
}

pub(crate) fn write_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(width, height)).unwrap();
}

/// A decodable JPEG carrying an EXIF block with `DateTime` in IFD0 and
/// `DateTimeOriginal` in the Exif sub-IFD.
pub(crate) fn jpeg_with_exif(
    width: u32,
    height: u32,
    date_time: &str,
    date_time_original: &str,
) -> Vec<u8> {
    assert_eq!(date_time.len(), 19);
    assert_eq!(date_time_original.len(), 19);

    // Little-endian TIFF: header, IFD0 (2 entries), Exif IFD (1 entry), strings
    let mut tiff: Vec<u8> = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    let ifd0_offset = 8u32;
    let exif_ifd_offset = ifd0_offset + 2 + 2 * 12 + 4;
    let date_time_offset = exif_ifd_offset + 2 + 12 + 4;
    let original_offset = date_time_offset + 20;

    let entry = |tiff: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32| {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&count.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    };

    tiff.extend_from_slice(&2u16.to_le_bytes());
    entry(&mut tiff, 0x0132, 2, 20, date_time_offset);
    entry(&mut tiff, 0x8769, 4, 1, exif_ifd_offset);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    entry(&mut tiff, 0x9003, 2, 20, original_offset);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(date_time.as_bytes());
    tiff.push(0);
    tiff.extend_from_slice(date_time_original.as_bytes());
    tiff.push(0);

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    let plain = jpeg_bytes(width, height);
    let mut out = Vec::with_capacity(plain.len() + app1.len());
    out.extend_from_slice(&plain[..2]);
    out.extend_from_slice(&app1);
    out.extend_from_slice(&plain[2..]);
    out
}
