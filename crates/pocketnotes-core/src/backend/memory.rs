//! In-process backend with fault injection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::{
    BackendError, BackendOperation, BackendResult, EventFanout, RemoteBackend, RemoteEvent,
};
use crate::models::{ImageKey, NoteId, NoteRecord};

/// Remote service simulated in memory.
///
/// Own writes are not echoed back as events; [`MemoryBackend::push_remote_note`]
/// and [`MemoryBackend::remove_remote_note`] simulate changes made elsewhere.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    signed_in: bool,
    records: Vec<NoteRecord>,
    images: HashMap<String, Vec<u8>>,
    events: EventFanout,
    faults: HashMap<BackendOperation, VecDeque<BackendError>>,
    calls: HashMap<BackendOperation, usize>,
}

impl MemoryState {
    fn begin(&mut self, operation: BackendOperation) -> BackendResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_session(&self) -> BackendResult<()> {
        if self.signed_in {
            Ok(())
        } else {
            Err(BackendError::Unauthenticated)
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an active session, as if restored from a previous run.
    #[must_use]
    pub fn signed_in() -> Self {
        let backend = Self::default();
        if let Ok(mut state) = backend.inner.lock() {
            state.signed_in = true;
        }
        backend
    }

    fn state(&self) -> BackendResult<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Unavailable("memory backend state poisoned".to_string()))
    }

    /// Make the next call of `operation` fail with `error`. Queued errors
    /// are consumed one per call.
    pub fn fail_next(&self, operation: BackendOperation, error: BackendError) {
        if let Ok(mut state) = self.state() {
            state.faults.entry(operation).or_default().push_back(error);
        }
    }

    /// Number of calls made for `operation`, including failed ones.
    pub fn calls(&self, operation: BackendOperation) -> usize {
        self.state()
            .map(|state| state.calls.get(&operation).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<NoteRecord> {
        self.state()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    pub fn has_image(&self, key: &ImageKey) -> bool {
        self.state()
            .map(|state| state.images.contains_key(key.as_str()))
            .unwrap_or_default()
    }

    /// Store image bytes directly, as if uploaded from another device.
    pub fn put_image(&self, key: &ImageKey, bytes: Vec<u8>) {
        if let Ok(mut state) = self.state() {
            state.images.insert(key.as_str().to_string(), bytes);
        }
    }

    /// Simulate a note created from another device.
    pub fn push_remote_note(&self, record: NoteRecord) {
        if let Ok(mut state) = self.state() {
            state.records.push(record.clone());
            state.events.emit(&RemoteEvent::NoteCreated(record));
        }
    }

    /// Simulate a note deleted from another device.
    pub fn remove_remote_note(&self, id: NoteId) {
        if let Ok(mut state) = self.state() {
            let raw = id.as_str();
            state.records.retain(|record| record.id != raw);
            state.events.emit(&RemoteEvent::NoteDeleted(id));
        }
    }
}

impl RemoteBackend for MemoryBackend {
    async fn sign_in(&self) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::SignIn)?;
        state.signed_in = true;
        state.events.emit(&RemoteEvent::SignedIn);
        Ok(())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::SignOut)?;
        state.signed_in = false;
        state.events.emit(&RemoteEvent::SignedOut);
        Ok(())
    }

    async fn is_signed_in(&self) -> BackendResult<bool> {
        let mut state = self.state()?;
        state.begin(BackendOperation::CheckSession)?;
        Ok(state.signed_in)
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<RemoteEvent> {
        match self.state() {
            Ok(mut state) => state.events.subscribe(),
            Err(_) => mpsc::unbounded_channel().1,
        }
    }

    async fn list_notes(&self) -> BackendResult<Vec<NoteRecord>> {
        let mut state = self.state()?;
        state.begin(BackendOperation::ListNotes)?;
        state.require_session()?;
        Ok(state.records.clone())
    }

    async fn create_note(&self, record: NoteRecord) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::CreateNote)?;
        state.require_session()?;
        if state.records.iter().any(|existing| existing.id == record.id) {
            return Err(BackendError::Conflict(format!(
                "note {} already exists",
                record.id
            )));
        }
        state.records.push(record);
        Ok(())
    }

    async fn delete_note(&self, id: NoteId) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::DeleteNote)?;
        state.require_session()?;
        let raw = id.as_str();
        let before = state.records.len();
        state.records.retain(|record| record.id != raw);
        if state.records.len() == before {
            return Err(BackendError::NotFound(raw));
        }
        Ok(())
    }

    async fn upload_image(&self, key: ImageKey, bytes: Vec<u8>) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::UploadImage)?;
        state.require_session()?;
        state.images.insert(key.as_str().to_string(), bytes);
        Ok(())
    }

    async fn download_image(&self, key: ImageKey) -> BackendResult<Vec<u8>> {
        let mut state = self.state()?;
        state.begin(BackendOperation::DownloadImage)?;
        state.require_session()?;
        state
            .images
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn remove_image(&self, key: ImageKey) -> BackendResult<()> {
        let mut state = self.state()?;
        state.begin(BackendOperation::RemoveImage)?;
        state.require_session()?;
        state.images.remove(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    #[tokio::test]
    async fn writes_require_session() {
        let backend = MemoryBackend::new();
        let record = Note::new("Milk", "2%").to_record();

        assert!(matches!(
            backend.create_note(record.clone()).await,
            Err(BackendError::Unauthenticated)
        ));

        backend.sign_in().await.unwrap();
        backend.create_note(record.clone()).await.unwrap();
        assert_eq!(backend.records(), vec![record]);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let backend = MemoryBackend::signed_in();
        let record = Note::new("Milk", "2%").to_record();
        backend.create_note(record.clone()).await.unwrap();
        assert!(matches!(
            backend.create_note(record).await,
            Err(BackendError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let backend = MemoryBackend::signed_in();
        backend.fail_next(
            BackendOperation::ListNotes,
            BackendError::Unavailable("first".to_string()),
        );

        assert!(backend.list_notes().await.is_err());
        assert!(backend.list_notes().await.unwrap().is_empty());
        assert_eq!(backend.calls(BackendOperation::ListNotes), 2);
    }

    #[tokio::test]
    async fn auth_changes_are_broadcast() {
        let backend = MemoryBackend::new();
        let mut events = backend.subscribe_events();

        backend.sign_in().await.unwrap();
        backend.sign_out().await.unwrap();

        assert_eq!(events.recv().await, Some(RemoteEvent::SignedIn));
        assert_eq!(events.recv().await, Some(RemoteEvent::SignedOut));
        assert!(!backend.is_signed_in().await.unwrap());
    }

    #[tokio::test]
    async fn image_lifecycle() {
        let backend = MemoryBackend::signed_in();
        let key = ImageKey::new();

        assert!(matches!(
            backend.download_image(key.clone()).await,
            Err(BackendError::NotFound(_))
        ));
        backend.upload_image(key.clone(), vec![1, 2]).await.unwrap();
        assert_eq!(backend.download_image(key.clone()).await.unwrap(), vec![1, 2]);
        backend.remove_image(key.clone()).await.unwrap();
        assert!(!backend.has_image(&key));
    }
}
