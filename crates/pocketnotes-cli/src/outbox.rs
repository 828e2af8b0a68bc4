//! Notes that were created but not acknowledged by the notes service.
//!
//! Every CLI run starts from a fresh store, so failed notes are kept in
//! `outbox.json` next to the service state until `pocketnotes retry`
//! gets them through.

use std::path::{Path, PathBuf};

use pocketnotes_core::backend::RemoteBackend;
use pocketnotes_core::media::{decode_image, read_image_file, ThumbnailOptions};
use pocketnotes_core::models::{Note, NoteImage, NoteRecord, SyncStatus};
use pocketnotes_core::SyncGateway;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const OUTBOX_FILE_NAME: &str = "outbox.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxEntry {
    pub record: NoteRecord,
    /// Local file the image was picked from.
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    /// Last failure, as shown to the user.
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug)]
pub struct Outbox {
    path: PathBuf,
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    /// Load the outbox. An unreadable file is moved aside to
    /// `outbox.json.corrupt` so the session can still start.
    pub fn load(data_dir: &Path) -> Result<Self, CliError> {
        let path = data_dir.join(OUTBOX_FILE_NAME);
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(error) => {
                    let quarantine = path.with_extension("json.corrupt");
                    tracing::warn!(
                        "Failed to parse outbox at {}: {}; moving it to {}",
                        path.display(),
                        error,
                        quarantine.display()
                    );
                    std::fs::rename(&path, &quarantine)?;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<(), CliError> {
        if self.entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(&self.entries)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    /// Add or replace the entry for the same note.
    pub fn push(&mut self, entry: OutboxEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|existing| existing.record.id == entry.record.id)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.record.id != id);
        self.entries.len() != before
    }

    pub fn set_reason(&mut self, id: &str, reason: String) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.record.id == id) {
            entry.reason = reason;
        }
    }

    /// Put outbox notes back into the store, marked as not synced.
    ///
    /// A note the service already holds is only re-marked, so that a
    /// missing image upload is retried too.
    pub async fn restore_into<B: RemoteBackend>(
        &self,
        gateway: &SyncGateway<B>,
    ) -> Result<(), CliError> {
        let store = gateway.store();
        for entry in &self.entries {
            let mut note = match Note::from_record(entry.record.clone()) {
                Ok(note) => note,
                Err(error) => {
                    tracing::warn!("Skipping unreadable outbox entry: {}", error);
                    continue;
                }
            };
            let status = SyncStatus::Failed(entry.reason.clone());

            let image = if let Some(path) = &entry.image_path {
                let loaded =
                    load_image(path, gateway.max_image_bytes(), gateway.thumbnail_options()).await;
                match loaded {
                    Ok(image) => Some(image),
                    Err(error) => {
                        tracing::warn!("Cannot reload image for {}: {}", note.id, error);
                        None
                    }
                }
            } else {
                None
            };

            if store.get(&note.id)?.is_some() {
                if let Some(image) = image {
                    store.attach_image(&note.id, image)?;
                }
                store.set_sync_status(&note.id, status)?;
            } else {
                note.sync_status = status;
                note.image = image;
                store.add_note(note)?;
            }
        }
        Ok(())
    }
}

async fn load_image(
    path: &Path,
    max_image_bytes: u64,
    thumbnails: ThumbnailOptions,
) -> pocketnotes_core::Result<NoteImage> {
    let bytes = read_image_file(path, max_image_bytes).await?;
    decode_image(bytes, thumbnails)
}
