//! Image key and decoded image payload

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Name of a stored image object in the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    /// Generate a fresh random key for a new upload.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a caller-supplied key. Keys must be non-empty and contain no
    /// path separators.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput("Image key cannot be empty".to_string()));
        }
        if key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(Error::InvalidInput(format!(
                "Image key '{key}' must not contain path separators"
            )));
        }
        Ok(Self(key.to_string()))
    }

    pub(crate) const fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ImageKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded image attached to a note.
///
/// Cloning is cheap: the source bytes and preview are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct NoteImage {
    source: Arc<[u8]>,
    width: u32,
    height: u32,
    preview: Arc<[u8]>,
    preview_width: u32,
    preview_height: u32,
}

impl NoteImage {
    pub(crate) fn from_parts(
        source: Vec<u8>,
        (width, height): (u32, u32),
        preview: Vec<u8>,
        (preview_width, preview_height): (u32, u32),
    ) -> Self {
        Self {
            source: source.into(),
            width,
            height,
            preview: preview.into(),
            preview_width,
            preview_height,
        }
    }

    /// Original encoded bytes, as picked or downloaded.
    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Encoded thumbnail for list display.
    pub fn preview_bytes(&self) -> &[u8] {
        &self.preview
    }

    pub const fn preview_dimensions(&self) -> (u32, u32) {
        (self.preview_width, self.preview_height)
    }
}

impl fmt::Debug for NoteImage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NoteImage")
            .field("source_len", &self.source.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("preview_len", &self.preview.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique() {
        assert_ne!(ImageKey::new(), ImageKey::new());
    }

    #[test]
    fn parse_trims_and_rejects_invalid_keys() {
        assert_eq!(ImageKey::parse(" cat.png ").unwrap().as_str(), "cat.png");
        assert!(ImageKey::parse("   ").is_err());
        assert!(ImageKey::parse("../etc/passwd").is_err());
        assert!(ImageKey::parse("..").is_err());
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let image = NoteImage::from_parts(vec![7; 64], (8, 8), vec![7; 16], (4, 4));
        let debug = format!("{image:?}");
        assert!(debug.contains("source_len: 64"));
        assert!(!debug.contains("7, 7"));
    }
}
