//! Bridge between the note store and the remote service.
//!
//! Outbound, [`SyncGateway`] turns local changes into remote calls that run
//! in the background and report through a [`Completion`]. Inbound, it turns
//! remote events (sign-in changes, notes created or deleted elsewhere,
//! downloaded images) into store mutations.
//!
//! Local state is optimistic. A note created locally is `Pending` until the
//! remote create succeeds (`Synced`) or gives up (`Failed`). Failed notes
//! stay in the store and can be resubmitted.

mod completion;
mod retry;

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::{BackendError, BackendOperation, RemoteBackend, RemoteEvent};
use crate::media::{decode_image, read_image_file, ThumbnailOptions, DEFAULT_MAX_IMAGE_BYTES};
use crate::models::{ImageKey, Note, NoteId, NoteImage, SyncStatus};
use crate::store::NoteStore;
use crate::util::compact_text;
use crate::{Error, Result};

pub use completion::Completion;
pub use retry::RetryPolicy;

use completion::Resolver;

/// Result of rebuilding the store from the remote service.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Notes in the store after the rebuild.
    pub notes: usize,
    /// One pending fetch per note whose image still has to be downloaded.
    pub image_fetches: Vec<Completion<()>>,
}

impl RefreshOutcome {
    /// Wait for all image fetches and return the failures.
    pub async fn wait_for_images(self) -> Vec<Error> {
        let mut failures = Vec::new();
        for fetch in self.image_fetches {
            if let Err(error) = fetch.await {
                failures.push(error);
            }
        }
        failures
    }
}

/// Forwards store changes to a [`RemoteBackend`] and applies remote events
/// to the store. Holds no note state of its own.
pub struct SyncGateway<B> {
    backend: Arc<B>,
    store: NoteStore,
    retry: RetryPolicy,
    thumbnails: ThumbnailOptions,
    max_image_bytes: u64,
}

impl<B> Clone for SyncGateway<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: self.store.clone(),
            retry: self.retry,
            thumbnails: self.thumbnails,
            max_image_bytes: self.max_image_bytes,
        }
    }
}

impl<B: RemoteBackend> SyncGateway<B> {
    pub fn new(backend: Arc<B>, store: NoteStore) -> Self {
        Self {
            backend,
            store,
            retry: RetryPolicy::default(),
            thumbnails: ThumbnailOptions::default(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_thumbnail_options(mut self, thumbnails: ThumbnailOptions) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    #[must_use]
    pub const fn with_max_image_bytes(mut self, max_image_bytes: u64) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub const fn store(&self) -> &NoteStore {
        &self.store
    }

    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub const fn thumbnail_options(&self) -> ThumbnailOptions {
        self.thumbnails
    }

    pub const fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    /// Run `task` in the background and hand back its completion.
    fn spawn<T, Fut>(&self, operation: BackendOperation, task: Fut) -> Completion<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Completion::ready(
                operation.as_str(),
                Err(Error::InvalidInput(format!(
                    "Cannot {operation} outside a Tokio runtime"
                ))),
            );
        };

        let (resolver, completion): (Resolver<T>, _) = Completion::channel(operation.as_str());
        runtime.spawn(async move {
            resolver.resolve(task.await);
        });
        completion
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Persist a note remotely. On success the note is marked `Synced`, on
    /// final failure `Failed`.
    ///
    /// The note should already be in the store; otherwise the status update
    /// is skipped.
    pub fn submit_new_note(&self, note: &Note) -> Completion<()> {
        let gateway = self.clone();
        let record = note.to_record();
        let id = note.id;
        tracing::debug!("Submitting note {}", id);

        self.spawn(BackendOperation::CreateNote, async move {
            let backend = &gateway.backend;
            let record = &record;
            let result = gateway
                .retry
                .run(BackendOperation::CreateNote, move || async move {
                    // A conflict means an earlier attempt already landed.
                    match backend.create_note(record.clone()).await {
                        Err(BackendError::Conflict(_)) => Ok(()),
                        other => other,
                    }
                })
                .await;
            match &result {
                Ok(()) => gateway.apply_status(&id, None),
                Err(error) => gateway.apply_status(&id, Some(error)),
            }
            result
        })
    }

    /// Read a picked image from disk and upload it under `key`.
    ///
    /// Only the upload reports [`Error::RemoteOperationFailed`]. A file that
    /// cannot be read resolves with [`Error::Io`], and a path that is not a
    /// file or is over the size limit with [`Error::InvalidInput`]; nothing
    /// is sent in either case.
    pub fn submit_image_upload(&self, local_path: PathBuf, key: ImageKey) -> Completion<()> {
        let gateway = self.clone();
        self.spawn(BackendOperation::UploadImage, async move {
            let bytes = read_image_file(&local_path, gateway.max_image_bytes).await?;
            gateway.upload(key, bytes).await
        })
    }

    /// Upload already-read image bytes. When `owner` is given, a failed
    /// upload marks that note `Failed`.
    pub fn submit_image_bytes(
        &self,
        key: ImageKey,
        bytes: Vec<u8>,
        owner: Option<NoteId>,
    ) -> Completion<()> {
        let gateway = self.clone();
        self.spawn(BackendOperation::UploadImage, async move {
            let result = gateway.upload(key, bytes).await;
            if let (Err(error), Some(owner)) = (&result, owner) {
                gateway.apply_status(&owner, Some(error));
            }
            result
        })
    }

    async fn upload(&self, key: ImageKey, bytes: Vec<u8>) -> Result<()> {
        let backend = &self.backend;
        let (key, bytes) = (&key, &bytes);
        self.retry
            .run(BackendOperation::UploadImage, move || async move {
                backend.upload_image(key.clone(), bytes.clone()).await
            })
            .await
    }

    /// Delete a note remotely, together with its image.
    ///
    /// A note that is already gone remotely counts as deleted.
    pub fn submit_delete(&self, note: &Note) -> Completion<()> {
        let gateway = self.clone();
        let id = note.id;
        let image_key = note.image_key.clone();
        tracing::debug!("Submitting delete of note {}", id);

        self.spawn(BackendOperation::DeleteNote, async move {
            let backend = &gateway.backend;
            gateway
                .retry
                .run(BackendOperation::DeleteNote, move || async move {
                    match backend.delete_note(id).await {
                        Err(BackendError::NotFound(_)) => Ok(()),
                        other => other,
                    }
                })
                .await?;

            if let Some(key) = image_key {
                let key = &key;
                gateway
                    .retry
                    .run(BackendOperation::RemoveImage, move || async move {
                        backend.remove_image(key.clone()).await
                    })
                    .await?;
            }
            Ok(())
        })
    }

    /// Download and decode an image. Resolves exactly once.
    pub fn fetch_image(&self, key: ImageKey) -> Completion<NoteImage> {
        let gateway = self.clone();
        self.spawn(BackendOperation::DownloadImage, async move {
            gateway.download(key).await
        })
    }

    async fn download(&self, key: ImageKey) -> Result<NoteImage> {
        let backend = &self.backend;
        let key = &key;
        let bytes = self
            .retry
            .run(BackendOperation::DownloadImage, move || async move {
                backend.download_image(key.clone()).await
            })
            .await?;
        decode_image(bytes, self.thumbnails)
    }

    /// Fetch the image of a note and attach it once it arrives.
    ///
    /// If the note left the store in the meantime the image is dropped.
    pub fn fetch_image_for(&self, id: NoteId, key: ImageKey) -> Completion<()> {
        let gateway = self.clone();
        self.spawn(BackendOperation::DownloadImage, async move {
            let image = gateway.download(key).await?;
            match gateway.store.attach_image(&id, image) {
                Ok(()) => Ok(()),
                Err(Error::NotFound(_)) => {
                    tracing::debug!("Note {} was removed before its image arrived", id);
                    Ok(())
                }
                Err(error) => Err(error),
            }
        })
    }

    pub fn sign_in(&self) -> Completion<()> {
        let gateway = self.clone();
        self.spawn(BackendOperation::SignIn, async move {
            let backend = &gateway.backend;
            gateway
                .retry
                .run(BackendOperation::SignIn, move || backend.sign_in())
                .await
        })
    }

    pub fn sign_out(&self) -> Completion<()> {
        let gateway = self.clone();
        self.spawn(BackendOperation::SignOut, async move {
            let backend = &gateway.backend;
            gateway
                .retry
                .run(BackendOperation::SignOut, move || backend.sign_out())
                .await
        })
    }

    /// Record the outcome of a submission on the owning note.
    fn apply_status(&self, id: &NoteId, failure: Option<&Error>) {
        let result = match failure {
            None => self.store.mark_synced(id),
            Some(error) => self.store.set_sync_status(
                id,
                SyncStatus::Failed(compact_text(&error.to_string())),
            ),
        };
        match result {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                tracing::debug!("Note {} left the store before its sync finished", id);
            }
            Err(error) => tracing::error!("Failed to record sync status of {}: {}", id, error),
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Apply one remote event to the store.
    pub async fn handle_event(&self, event: RemoteEvent) -> Result<()> {
        match event {
            RemoteEvent::SignedIn => {
                tracing::info!("Signed in; loading notes");
                self.store.set_signed_in(true)?;
                // Image fetches keep running in the background.
                drop(self.refresh().await?);
            }
            RemoteEvent::SignedOut => {
                tracing::info!("Signed out; clearing notes");
                self.store.set_signed_in(false)?;
                self.store.reset_notes()?;
            }
            RemoteEvent::NoteCreated(record) => {
                let note = Note::from_record(record)?;
                let fetch = note
                    .image_key
                    .clone()
                    .map(|key| (note.id, key));
                self.store.upsert_note(note)?;
                if let Some((id, key)) = fetch {
                    let wanted = self.store.get(&id)?.is_some_and(|note| {
                        note.image.is_none() && !note.sync_status.is_failed()
                    });
                    if wanted {
                        drop(self.fetch_image_for(id, key));
                    }
                }
            }
            RemoteEvent::NoteDeleted(id) => {
                if self.store.remove_note(&id)?.is_none() {
                    tracing::debug!("Remote deletion of unknown note {}", id);
                }
            }
        }
        Ok(())
    }

    /// Rebuild the store from the remote note list.
    ///
    /// Remote notes come first, in remote order. Local notes the remote
    /// service has not acknowledged yet (`Pending` or `Failed`) are kept
    /// after them. Images already decoded locally are reused, and a local
    /// `Failed` status is kept. The merge itself is one store mutation.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let settled: HashSet<NoteId> = self
            .store
            .notes()?
            .iter()
            .filter(|note| note.sync_status == SyncStatus::Synced)
            .map(|note| note.id)
            .collect();

        let backend = &self.backend;
        let records = self
            .retry
            .run(BackendOperation::ListNotes, move || backend.list_notes())
            .await?;
        let remote = records
            .into_iter()
            .filter_map(|record| match Note::from_record(record) {
                Ok(note) => Some(note),
                Err(error) => {
                    tracing::warn!("Skipping malformed remote note: {}", error);
                    None
                }
            })
            .collect();

        let merge = self.store.merge_remote(remote, &settled)?;
        tracing::info!(
            "Loaded {} notes, fetching {} images",
            merge.len,
            merge.missing_images.len()
        );

        Ok(RefreshOutcome {
            notes: merge.len,
            image_fetches: merge
                .missing_images
                .into_iter()
                .map(|(id, key)| self.fetch_image_for(id, key))
                .collect(),
        })
    }

    /// Sync the signed-in flag with the remote session and load notes when
    /// signed in. Used on cold start.
    pub async fn restore_session(&self) -> Result<Option<RefreshOutcome>> {
        let backend = &self.backend;
        let signed_in = self
            .retry
            .run(BackendOperation::CheckSession, move || backend.is_signed_in())
            .await?;
        self.store.set_signed_in(signed_in)?;
        if signed_in {
            Ok(Some(self.refresh().await?))
        } else {
            self.store.reset_notes()?;
            Ok(None)
        }
    }

    /// Subscribe to remote events and apply them in the background.
    ///
    /// The loop stops when the backend closes the event stream or a store
    /// invariant is violated.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            Error::InvalidInput(format!("Gateway requires a Tokio runtime: {error}"))
        })?;
        let mut events = self.backend.subscribe_events();
        let gateway = self.clone();

        Ok(runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(error) = gateway.handle_event(event).await {
                    if error.is_fatal() {
                        tracing::error!("Stopping remote event loop: {}", error);
                        break;
                    }
                    tracing::warn!("Failed to apply remote event: {}", error);
                }
            }
            tracing::debug!("Remote event loop finished");
        }))
    }
}
