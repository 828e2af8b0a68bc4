//! Note intents: add, delete, sign in/out and resubmission.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::RemoteBackend;
use crate::media::{decode_image, read_image_file};
use crate::models::{ImageKey, Note, SyncStatus};
use crate::store::NoteStore;
use crate::sync::{Completion, SyncGateway};
use crate::util::normalize_text_option;
use crate::{Error, Result};

/// Input for [`NoteService::add_note`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub name: String,
    pub description: String,
    /// Picked image on the local filesystem.
    pub image_path: Option<PathBuf>,
}

impl NewNote {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

/// Remote work started for one note.
#[derive(Debug)]
#[must_use = "await the pending sync or drop it to continue in the background"]
pub struct PendingSync {
    pub record: Completion<()>,
    pub image: Option<Completion<()>>,
}

impl PendingSync {
    /// Wait for every part to finish. Reports the first failure.
    pub async fn wait(self) -> Result<()> {
        let image = match self.image {
            Some(upload) => upload.await,
            None => Ok(()),
        };
        let record = self.record.await;
        image.and(record)
    }
}

/// Entry point for clients. Applies changes to the store first and then
/// hands them to the gateway.
pub struct NoteService<B> {
    gateway: SyncGateway<B>,
}

impl<B> Clone for NoteService<B> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<B: RemoteBackend> NoteService<B> {
    pub const fn new(gateway: SyncGateway<B>) -> Self {
        Self { gateway }
    }

    /// Service over a fresh store with default settings.
    pub fn with_backend(backend: Arc<B>) -> Self {
        Self::new(SyncGateway::new(backend, NoteStore::new()))
    }

    pub const fn store(&self) -> &NoteStore {
        self.gateway.store()
    }

    pub const fn gateway(&self) -> &SyncGateway<B> {
        &self.gateway
    }

    /// Create a note, show it locally and start persisting it.
    ///
    /// The image, if any, is read and decoded before the note is added so a
    /// bad file never produces a half-built note.
    pub async fn add_note(&self, input: NewNote) -> Result<(Note, PendingSync)> {
        let name = normalize_text_option(Some(input.name))
            .ok_or_else(|| Error::InvalidInput("Note name cannot be empty".to_string()))?;
        let description = input.description.trim().to_string();
        let mut note = Note::new(name, description);

        let upload = match input.image_path {
            Some(path) => {
                let bytes = read_image_file(&path, self.gateway.max_image_bytes()).await?;
                let image = decode_image(bytes.clone(), self.gateway.thumbnail_options())?;
                let key = ImageKey::new();
                note = note.with_image_key(key.clone()).with_image(image);
                Some((key, bytes))
            }
            None => None,
        };

        let position = self.store().add_note(note.clone())?;
        tracing::info!("Added note {} at position {}", note.id, position);

        let image = upload.map(|(key, bytes)| {
            self.gateway
                .submit_image_bytes(key, bytes, Some(note.id))
        });
        let record = self.gateway.submit_new_note(&note);
        Ok((note, PendingSync { record, image }))
    }

    /// Remove the note shown at `index` and delete it remotely.
    pub fn delete_note_at(&self, index: usize) -> Result<(Note, Completion<()>)> {
        let note = self.store().delete_note_at(index)?;
        tracing::info!("Deleted note {}", note.id);
        let completion = self.gateway.submit_delete(&note);
        Ok((note, completion))
    }

    pub fn sign_in(&self) -> Completion<()> {
        self.gateway.sign_in()
    }

    pub fn sign_out(&self) -> Completion<()> {
        self.gateway.sign_out()
    }

    /// Resubmit every note marked `Failed`.
    ///
    /// Images are uploaded again only when their bytes are still held
    /// locally.
    pub fn retry_failed(&self) -> Result<Vec<(Note, PendingSync)>> {
        let failed: Vec<Note> = self
            .store()
            .notes()?
            .iter()
            .filter(|note| note.sync_status.is_failed())
            .cloned()
            .collect();
        if !failed.is_empty() {
            tracing::info!("Retrying {} unsynced notes", failed.len());
        }

        let mut pending = Vec::with_capacity(failed.len());
        for mut note in failed {
            self.store().set_sync_status(&note.id, SyncStatus::Pending)?;
            note.sync_status = SyncStatus::Pending;

            let image = match (&note.image_key, &note.image) {
                (Some(key), Some(image)) => Some(self.gateway.submit_image_bytes(
                    key.clone(),
                    image.source_bytes().to_vec(),
                    Some(note.id),
                )),
                _ => None,
            };
            let record = self.gateway.submit_new_note(&note);
            pending.push((note, PendingSync { record, image }));
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::{BackendError, BackendOperation, MemoryBackend};
    use crate::media::test_support::png_bytes;
    use crate::sync::RetryPolicy;

    fn service(backend: &MemoryBackend) -> NoteService<MemoryBackend> {
        let gateway = SyncGateway::new(Arc::new(backend.clone()), NoteStore::new())
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            });
        NoteService::new(gateway)
    }

    #[tokio::test]
    async fn add_note_appears_locally_and_remotely() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);

        let (note, pending) = service
            .add_note(NewNote::new(" Milk ").with_description("2%"))
            .await
            .unwrap();
        assert_eq!(note.name, "Milk");
        assert_eq!(service.store().len().unwrap(), 1);

        pending.wait().await.unwrap();
        assert_eq!(backend.records().len(), 1);
        assert_eq!(
            service.store().get(&note.id).unwrap().unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);

        assert!(matches!(
            service.add_note(NewNote::new("   ")).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(service.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn add_note_with_image_uploads_bytes() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, png_bytes(300, 150)).unwrap();

        let (note, pending) = service
            .add_note(NewNote::new("Cat").with_image_path(&path))
            .await
            .unwrap();
        pending.wait().await.unwrap();

        let key = note.image_key.clone().unwrap();
        assert!(backend.has_image(&key));
        let image = note.image.unwrap();
        assert_eq!(image.dimensions(), (300, 150));
        assert_eq!(image.preview_dimensions(), (256, 128));
    }

    #[tokio::test]
    async fn unreadable_image_adds_nothing() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(service
            .add_note(NewNote::new("Cat").with_image_path(&path))
            .await
            .is_err());
        assert!(service.store().is_empty().unwrap());
        assert!(backend.records().is_empty());
    }

    #[tokio::test]
    async fn delete_note_at_removes_locally_and_remotely() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);
        for name in ["Milk", "Eggs"] {
            let (_, pending) = service.add_note(NewNote::new(name)).await.unwrap();
            pending.wait().await.unwrap();
        }

        let (removed, completion) = service.delete_note_at(0).unwrap();
        completion.await.unwrap();

        assert_eq!(removed.name, "Milk");
        let names: Vec<String> = backend.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Eggs"]);
        assert_eq!(service.store().get(&removed.id).unwrap(), None);
    }

    #[tokio::test]
    async fn delete_out_of_range_changes_nothing() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);
        let (_, pending) = service.add_note(NewNote::new("Milk")).await.unwrap();
        pending.wait().await.unwrap();

        assert!(matches!(
            service.delete_note_at(3),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert_eq!(service.store().len().unwrap(), 1);
        assert_eq!(backend.calls(BackendOperation::DeleteNote), 0);
    }

    #[tokio::test]
    async fn failed_notes_can_be_retried() {
        let backend = MemoryBackend::signed_in();
        backend.fail_next(
            BackendOperation::CreateNote,
            BackendError::Rejected("quota".to_string()),
        );
        let service = service(&backend);

        let (note, pending) = service.add_note(NewNote::new("Milk")).await.unwrap();
        assert!(pending.wait().await.is_err());
        assert!(service
            .store()
            .get(&note.id)
            .unwrap()
            .unwrap()
            .sync_status
            .is_failed());

        let retried = service.retry_failed().unwrap();
        assert_eq!(retried.len(), 1);
        for (_, pending) in retried {
            pending.wait().await.unwrap();
        }
        assert_eq!(
            service.store().get(&note.id).unwrap().unwrap().sync_status,
            SyncStatus::Synced
        );
        assert!(service.retry_failed().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_all_land() {
        let backend = MemoryBackend::signed_in();
        let service = service(&backend);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    let (_, pending) = service
                        .add_note(NewNote::new(format!("note {i}")))
                        .await
                        .unwrap();
                    pending.wait().await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let notes = service.store().notes().unwrap();
        assert_eq!(notes.len(), 20);
        assert!(notes.iter().all(|note| note.sync_status == SyncStatus::Synced));
        assert_eq!(backend.records().len(), 20);
    }
}
