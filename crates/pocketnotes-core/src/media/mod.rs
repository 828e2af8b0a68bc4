//! Image decoding and preview generation for note photos.

mod thumbnail;

use std::path::Path;

use image::GenericImageView;

use crate::models::NoteImage;
use crate::{Error, Result};

pub use thumbnail::{generate_thumbnail, ThumbnailFormat, ThumbnailImage, ThumbnailOptions};

/// Upper bound for a single picked or downloaded image.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Decode encoded image bytes into a [`NoteImage`] with a list preview.
pub fn decode_image(bytes: Vec<u8>, options: ThumbnailOptions) -> Result<NoteImage> {
    if bytes.is_empty() {
        return Err(Error::InvalidInput("Image bytes cannot be empty".to_string()));
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|error| Error::InvalidInput(format!("Failed to decode image: {error}")))?;
    let dimensions = decoded.dimensions();
    let preview = generate_thumbnail(&decoded, options)?;

    Ok(NoteImage::from_parts(
        bytes,
        dimensions,
        preview.bytes,
        (preview.width, preview.height),
    ))
}

/// Read a picked image file, refusing files larger than `max_bytes`.
pub async fn read_image_file(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(Error::InvalidInput(format!(
            "Image path {} is not a file",
            path.display()
        )));
    }
    if metadata.len() > max_bytes {
        return Err(Error::InvalidInput(format!(
            "Image {} is {} bytes, limit is {max_bytes}",
            path.display(),
            metadata.len()
        )));
    }
    Ok(tokio::fs::read(path).await?)
}


#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;

    #[test]
    fn decode_reports_dimensions_and_preview() {
        let bytes = png_bytes(640, 320);
        let image = decode_image(bytes.clone(), ThumbnailOptions::default()).unwrap();

        assert_eq!(image.dimensions(), (640, 320));
        assert_eq!(image.preview_dimensions(), (256, 128));
        assert_eq!(image.source_bytes(), bytes.as_slice());
        assert!(!image.preview_bytes().is_empty());
    }

    #[test]
    fn decode_rejects_empty_and_garbage() {
        assert!(matches!(
            decode_image(Vec::new(), ThumbnailOptions::default()),
            Err(Error::InvalidInput(_))
        ));
        match decode_image(b"not-an-image".to_vec(), ThumbnailOptions::default()).unwrap_err() {
            Error::InvalidInput(message) => assert!(message.contains("decode")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_image_file_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, png_bytes(4, 4)).unwrap();

        assert!(!read_image_file(&path, DEFAULT_MAX_IMAGE_BYTES)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            read_image_file(&path, 8).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            read_image_file(&dir.path().join("missing.png"), DEFAULT_MAX_IMAGE_BYTES).await,
            Err(Error::Io(_))
        ));
    }
}
