//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::image::{ImageKey, NoteImage};
use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether the remote service has acknowledged a note.
///
/// Local state is optimistic: a note shows up in the store as soon as it is
/// created and carries `Pending` until the gateway hears back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed(String),
}

impl SyncStatus {
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed(_) => "not synced",
        }
    }
}

/// A note in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Unique identifier, never reassigned
    pub id: NoteId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Key of the stored image object, if the note has one
    pub image_key: Option<ImageKey>,
    /// Decoded image, present once picked locally or fetched
    pub image: Option<NoteImage>,
    /// Remote acknowledgement state
    pub sync_status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Note {
    /// Create a new local note. It starts out `Pending`.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: NoteId::new(),
            name: name.into(),
            description: description.into(),
            image_key: None,
            image: None,
            sync_status: SyncStatus::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Builder-style helper to set the image key.
    #[must_use]
    pub fn with_image_key(mut self, key: ImageKey) -> Self {
        self.image_key = Some(key);
        self
    }

    /// Builder-style helper to attach a decoded image.
    #[must_use]
    pub fn with_image(mut self, image: NoteImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Rebuild a note from a remote record. Remote notes are already synced.
    pub fn from_record(record: NoteRecord) -> Result<Self> {
        let id = record
            .id
            .trim()
            .parse::<NoteId>()
            .map_err(|error| Error::InvalidInput(format!("Invalid note id '{}': {error}", record.id)))?;
        let name = normalize_text_option(Some(record.name))
            .ok_or_else(|| Error::InvalidInput(format!("Note {id} has an empty name")))?;
        let image_key = normalize_text_option(record.image).map(ImageKey::from_raw);

        Ok(Self {
            id,
            name,
            description: record.description.unwrap_or_default(),
            image_key,
            image: None,
            sync_status: SyncStatus::Synced,
            created_at: record.created_at.unwrap_or_default(),
        })
    }

    /// Project this note onto the remote record shape.
    #[must_use]
    pub fn to_record(&self) -> NoteRecord {
        NoteRecord {
            id: self.id.as_str(),
            name: self.name.clone(),
            description: Some(self.description.clone()),
            image: self.image_key.as_ref().map(|key| key.as_str().to_string()),
            created_at: Some(self.created_at),
        }
    }

    /// Whether the note references an image that has not been decoded yet.
    #[must_use]
    pub const fn needs_image(&self) -> bool {
        self.image_key.is_some() && self.image.is_none()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Note as stored by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}
