use image::ImageFormat;

/// Encoding used for a derived image, chosen from the sniffed source format.
///
/// JPEG, PNG and GIF sources keep their format; everything else is written as JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Jpeg,
    Png,
    Gif,
    Other,
}

impl ThumbnailFormat {
    pub fn from_image_format(format: Option<ImageFormat>) -> Self {
        match format {
            Some(ImageFormat::Jpeg) => ThumbnailFormat::Jpeg,
            Some(ImageFormat::Png) => ThumbnailFormat::Png,
            Some(ImageFormat::Gif) => ThumbnailFormat::Gif,
            _ => ThumbnailFormat::Other,
        }
    }

    /// Format the bytes on disk will actually be in.
    pub fn encoded_as(&self) -> ImageFormat {
        match self {
            ThumbnailFormat::Png => ImageFormat::Png,
            ThumbnailFormat::Gif => ImageFormat::Gif,
            ThumbnailFormat::Jpeg | ThumbnailFormat::Other => ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}
