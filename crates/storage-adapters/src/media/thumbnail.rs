use std::io::Cursor;

use domains::{DomainError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

/// Images narrower than this are their own thumbnail.
pub const THUMBNAIL_WIDTH_THRESHOLD: u32 = 600;
/// Wider images are shrunk by this factor on both axes.
pub const THUMBNAIL_DOWNSCALE: u32 = 3;

fn thumbnail_error(err: impl std::fmt::Display) -> DomainError {
    DomainError::Thumbnail(err.to_string())
}

/// Derives the thumbnail bytes for an image blob.
///
/// JPEGs stay JPEG (flattened to RGB), everything else is re-encoded as an
/// optimised PNG.
pub fn derive_thumbnail(data: &[u8]) -> Result<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(thumbnail_error)?;
    let format = reader
        .format()
        .ok_or_else(|| DomainError::Thumbnail("unrecognised image format".into()))?;
    let (width, _) = reader.into_dimensions().map_err(thumbnail_error)?;
    if width < THUMBNAIL_WIDTH_THRESHOLD {
        return Ok(data.to_vec());
    }

    let image = image::load_from_memory_with_format(data, format).map_err(thumbnail_error)?;
    let resized = image.resize_exact(
        (image.width() / THUMBNAIL_DOWNSCALE).max(1),
        (image.height() / THUMBNAIL_DOWNSCALE).max(1),
        FilterType::Triangle,
    );
    encode(resized, format)
}

fn encode(image: DynamicImage, source: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    if source == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut out, ImageFormat::Jpeg)
            .map_err(thumbnail_error)?;
        return Ok(out.into_inner());
    }

    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(thumbnail_error)?;
    oxipng::optimize_from_memory(&out.into_inner(), &oxipng::Options::from_preset(2))
        .map_err(thumbnail_error)
}
