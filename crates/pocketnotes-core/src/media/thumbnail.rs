//! Preview thumbnails for note images.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageFormat};

use crate::{Error, Result};

/// Output format for generated thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Jpeg,
    Png,
}

/// Configuration for thumbnail generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
    /// Output image format.
    pub format: ThumbnailFormat,
    /// JPEG quality (only used when `format` is [`ThumbnailFormat::Jpeg`]).
    pub jpeg_quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_width: 256,
            max_height: 256,
            format: ThumbnailFormat::Jpeg,
            jpeg_quality: 80,
        }
    }
}

/// Generated thumbnail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Generate a thumbnail from a decoded image.
///
/// The image is resized to fit within `max_width` x `max_height` while preserving
/// aspect ratio. Images smaller than the target bounds are not upscaled.
pub fn generate_thumbnail(
    source: &DynamicImage,
    options: ThumbnailOptions,
) -> Result<ThumbnailImage> {
    if options.max_width == 0 || options.max_height == 0 {
        return Err(Error::InvalidInput(
            "Thumbnail max dimensions must be greater than zero".to_string(),
        ));
    }

    let (source_width, source_height) = source.dimensions();
    let resized = if source_width <= options.max_width && source_height <= options.max_height {
        source.clone()
    } else {
        source.thumbnail(options.max_width, options.max_height)
    };
    let (width, height) = resized.dimensions();

    Ok(ThumbnailImage {
        bytes: encode_thumbnail(&resized, options)?,
        width,
        height,
    })
}

fn encode_thumbnail(image: &DynamicImage, options: ThumbnailOptions) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());

    match options.format {
        ThumbnailFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut cursor, options.jpeg_quality);
            encoder.encode_image(&rgb).map_err(|error| {
                Error::InvalidInput(format!("Failed to encode JPEG thumbnail: {error}"))
            })?;
        }
        ThumbnailFormat::Png => {
            image
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|error| {
                    Error::InvalidInput(format!("Failed to encode thumbnail image: {error}"))
                })?;
        }
    }

    Ok(cursor.into_inner())
}
