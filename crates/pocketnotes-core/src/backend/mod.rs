//! Contract of the external persistence and auth service.
//!
//! The service owns durable storage, sync and sessions. The core only
//! talks to it through [`RemoteBackend`]; two implementations ship with
//! the crate: an in-process [`MemoryBackend`] and a directory-backed
//! [`LocalDirBackend`].

mod local_dir;
mod memory;

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{ImageKey, NoteId, NoteRecord};

pub use local_dir::LocalDirBackend;
pub use memory::MemoryBackend;

/// Events pushed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    SignedIn,
    SignedOut,
    NoteCreated(NoteRecord),
    NoteDeleted(NoteId),
}

/// Remote operations, used for error reporting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    SignIn,
    SignOut,
    CheckSession,
    ListNotes,
    CreateNote,
    DeleteNote,
    UploadImage,
    DownloadImage,
    RemoveImage,
}

impl BackendOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign in",
            Self::SignOut => "sign out",
            Self::CheckSession => "check session",
            Self::ListNotes => "list notes",
            Self::CreateNote => "create note",
            Self::DeleteNote => "delete note",
            Self::UploadImage => "upload image",
            Self::DownloadImage => "download image",
            Self::RemoveImage => "remove image",
        }
    }
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Transient failures worth another attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Async operations offered by the remote service.
pub trait RemoteBackend: Send + Sync + 'static {
    fn sign_in(&self) -> impl Future<Output = BackendResult<()>> + Send;

    fn sign_out(&self) -> impl Future<Output = BackendResult<()>> + Send;

    fn is_signed_in(&self) -> impl Future<Output = BackendResult<bool>> + Send;

    /// Register for auth and data events.
    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<RemoteEvent>;

    /// All notes of the signed-in user, in creation order.
    fn list_notes(&self) -> impl Future<Output = BackendResult<Vec<NoteRecord>>> + Send;

    fn create_note(&self, record: NoteRecord) -> impl Future<Output = BackendResult<()>> + Send;

    fn delete_note(&self, id: NoteId) -> impl Future<Output = BackendResult<()>> + Send;

    fn upload_image(
        &self,
        key: ImageKey,
        bytes: Vec<u8>,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    fn download_image(&self, key: ImageKey) -> impl Future<Output = BackendResult<Vec<u8>>> + Send;

    fn remove_image(&self, key: ImageKey) -> impl Future<Output = BackendResult<()>> + Send;
}

/// Fan-out helper shared by the bundled backends.
#[derive(Default)]
struct EventFanout {
    subscribers: Vec<mpsc::UnboundedSender<RemoteEvent>>,
}

impl EventFanout {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RemoteEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: &RemoteEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
