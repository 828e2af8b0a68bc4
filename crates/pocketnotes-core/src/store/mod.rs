//! In-memory note store with change subscriptions.
//!
//! `NoteStore` is the single source of truth for the displayed notes and the
//! signed-in flag. It is a cheap handle: clone it and hand it to every
//! consumer instead of reaching for a global.
//!
//! Every mutation runs under one lock, so mutations from different threads
//! or tasks are applied one at a time and subscribers see them in the order
//! they were applied. Subscribers receive immutable snapshots: a snapshot
//! already handed out is never modified by later mutations.

mod subscription;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{ImageKey, Note, NoteId, NoteImage, SyncStatus};
use crate::state::AuthState;
use crate::{Error, Result};

pub use subscription::Subscription;

/// Immutable view of the note sequence at one point in time.
pub type NotesSnapshot = Arc<Vec<Note>>;

/// Outcome of [`NoteStore::merge_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMerge {
    /// Notes in the store after the merge.
    pub len: usize,
    /// Notes whose image still has to be downloaded.
    pub missing_images: Vec<(NoteId, ImageKey)>,
}

/// Thread-safe observable holder of notes and sign-in state.
#[derive(Clone, Default)]
pub struct NoteStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    notes: NotesSnapshot,
    auth: AuthState,
    note_subscribers: Vec<mpsc::UnboundedSender<NotesSnapshot>>,
    auth_subscribers: Vec<mpsc::UnboundedSender<AuthState>>,
}

impl StoreState {
    fn position(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| note.id == *id)
    }

    fn notes_mut(&mut self) -> &mut Vec<Note> {
        // Copy-on-write: clones only when a subscriber still holds the
        // current snapshot.
        Arc::make_mut(&mut self.notes)
    }

    fn publish_notes(&mut self) {
        let snapshot = Arc::clone(&self.notes);
        self.note_subscribers
            .retain(|subscriber| subscriber.send(Arc::clone(&snapshot)).is_ok());
        tracing::debug!(
            "Published {} notes to {} subscribers",
            snapshot.len(),
            self.note_subscribers.len()
        );
    }

    fn publish_auth(&mut self) {
        let auth = self.auth;
        self.auth_subscribers
            .retain(|subscriber| subscriber.send(auth).is_ok());
    }
}

impl NoteStore {
    /// Create an empty, signed-out store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.inner.lock().map_err(|_| {
            tracing::error!("Note store lock poisoned; refusing further access");
            Error::StoreInvariantViolation("note store lock poisoned".to_string())
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append a note to the end of the sequence and return the new length.
    ///
    /// Note ids are unique within the store; appending a note whose id is
    /// already present is an invariant violation and leaves the store as is.
    pub fn add_note(&self, note: Note) -> Result<usize> {
        let mut state = self.lock()?;
        if state.position(&note.id).is_some() {
            tracing::error!("Refusing to add duplicate note {}", note.id);
            return Err(Error::StoreInvariantViolation(format!(
                "note {} is already in the store",
                note.id
            )));
        }

        state.notes_mut().push(note);
        let len = state.notes.len();
        state.publish_notes();
        Ok(len)
    }

    /// Remove and return the note at `index`.
    ///
    /// Later notes shift down by one. An invalid index fails with
    /// [`Error::IndexOutOfRange`] and notifies nobody.
    pub fn delete_note_at(&self, index: usize) -> Result<Note> {
        let mut state = self.lock()?;
        let len = state.notes.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }

        let note = state.notes_mut().remove(index);
        state.publish_notes();
        Ok(note)
    }

    /// Remove every note. Used on sign-out.
    pub fn reset_notes(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.notes.is_empty() {
            state.notes_mut().clear();
        }
        state.publish_notes();
        Ok(())
    }

    /// Set the signed-in flag. Flag subscribers are notified on every call.
    pub fn set_signed_in(&self, signed_in: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.auth = AuthState::from_flag(signed_in);
        state.publish_auth();
        Ok(())
    }

    /// Rebuild the sequence from the remote note list in one critical
    /// section, so no mutation can land between reading the local notes and
    /// publishing the merged ones.
    ///
    /// Remote notes come first, in remote order; a repeated remote id is
    /// skipped. Local notes missing from the remote list are kept after them,
    /// except those that were already `Synced` when the list was requested
    /// (`settled`), which were deleted remotely. A local note keeps its
    /// decoded image when the image key matches, and keeps a `Failed` status.
    pub fn merge_remote(
        &self,
        remote: Vec<Note>,
        settled: &HashSet<NoteId>,
    ) -> Result<RemoteMerge> {
        let mut state = self.lock()?;
        let local = Arc::clone(&state.notes);
        let by_id: HashMap<NoteId, &Note> = local.iter().map(|note| (note.id, note)).collect();

        let mut seen = HashSet::with_capacity(remote.len());
        let mut merged = Vec::with_capacity(remote.len() + local.len());
        for mut note in remote {
            if !seen.insert(note.id) {
                tracing::warn!("Skipping duplicate remote note {}", note.id);
                continue;
            }
            if let Some(existing) = by_id.get(&note.id) {
                if note.image.is_none() && note.image_key == existing.image_key {
                    note.image.clone_from(&existing.image);
                }
                if existing.sync_status.is_failed() {
                    note.sync_status = existing.sync_status.clone();
                }
            }
            merged.push(note);
        }
        merged.extend(
            local
                .iter()
                .filter(|note| !seen.contains(&note.id))
                .filter(|note| {
                    note.sync_status != SyncStatus::Synced || !settled.contains(&note.id)
                })
                .cloned(),
        );

        let missing_images = merged
            .iter()
            .filter(|note| note.needs_image() && !note.sync_status.is_failed())
            .filter_map(|note| note.image_key.clone().map(|key| (note.id, key)))
            .collect();
        let len = merged.len();
        state.notes = Arc::new(merged);
        state.publish_notes();
        Ok(RemoteMerge { len, missing_images })
    }

    /// Insert a note, or replace the note with the same id in place.
    ///
    /// A decoded image already held locally survives a replacement that
    /// carries the same image key but no payload. A local `Failed` status
    /// survives too, since the echo of a record says nothing about its image.
    pub fn upsert_note(&self, mut note: Note) -> Result<()> {
        let mut state = self.lock()?;
        match state.position(&note.id) {
            Some(index) => {
                let existing = &state.notes[index];
                if note.image.is_none() && note.image_key == existing.image_key {
                    note.image.clone_from(&existing.image);
                }
                if existing.sync_status.is_failed() {
                    note.sync_status = existing.sync_status.clone();
                }
                if *existing == note {
                    return Ok(());
                }
                state.notes_mut()[index] = note;
            }
            None => state.notes_mut().push(note),
        }
        state.publish_notes();
        Ok(())
    }

    /// Remove a note by id. Returns `None` when it was not in the store.
    pub fn remove_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let mut state = self.lock()?;
        let Some(index) = state.position(id) else {
            return Ok(None);
        };
        let note = state.notes_mut().remove(index);
        state.publish_notes();
        Ok(Some(note))
    }

    /// Attach a decoded image to a note.
    pub fn attach_image(&self, id: &NoteId, image: NoteImage) -> Result<()> {
        let mut state = self.lock()?;
        let index = state
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        state.notes_mut()[index].image = Some(image);
        state.publish_notes();
        Ok(())
    }

    /// Record the remote acknowledgement state of a note.
    pub fn set_sync_status(&self, id: &NoteId, status: SyncStatus) -> Result<()> {
        let mut state = self.lock()?;
        let index = state
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if state.notes[index].sync_status == status {
            return Ok(());
        }
        state.notes_mut()[index].sync_status = status;
        state.publish_notes();
        Ok(())
    }

    /// Move a `Pending` note to `Synced`. A note marked `Failed` by another
    /// submission stays failed until it is resubmitted.
    pub fn mark_synced(&self, id: &NoteId) -> Result<()> {
        let mut state = self.lock()?;
        let index = state
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if state.notes[index].sync_status != SyncStatus::Pending {
            return Ok(());
        }
        state.notes_mut()[index].sync_status = SyncStatus::Synced;
        state.publish_notes();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current snapshot of the notes.
    pub fn notes(&self) -> Result<NotesSnapshot> {
        Ok(Arc::clone(&self.lock()?.notes))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.notes.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.notes.is_empty())
    }

    pub fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let state = self.lock()?;
        Ok(state.position(id).map(|index| state.notes[index].clone()))
    }

    /// Display position of a note.
    pub fn position(&self, id: &NoteId) -> Result<Option<usize>> {
        Ok(self.lock()?.position(id))
    }

    pub fn auth_state(&self) -> Result<AuthState> {
        Ok(self.lock()?.auth)
    }

    pub fn is_signed_in(&self) -> Result<bool> {
        Ok(self.auth_state()?.is_signed_in())
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to note changes. The current snapshot is delivered first.
    pub fn subscribe_notes(&self) -> Result<Subscription<NotesSnapshot>> {
        let mut state = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(Arc::clone(&state.notes));
        state.note_subscribers.push(tx);
        Ok(Subscription::new(rx))
    }

    /// Subscribe to sign-in changes. The current state is delivered first.
    pub fn subscribe_signed_in(&self) -> Result<Subscription<AuthState>> {
        let mut state = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(state.auth);
        state.auth_subscribers.push(tx);
        Ok(Subscription::new(rx))
    }

    /// Run `observer` on a background task for every notes snapshot,
    /// starting with the current one.
    ///
    /// Must be called from within a Tokio runtime. The task ends when the
    /// store and all its clones are dropped, or when the handle is aborted.
    pub fn observe_notes<F>(&self, observer: F) -> Result<JoinHandle<()>>
    where
        F: FnMut(NotesSnapshot) + Send + 'static,
    {
        let subscription = self.subscribe_notes()?;
        spawn_observer(subscription, observer)
    }

    /// Run `observer` on a background task for every sign-in change,
    /// starting with the current state.
    pub fn observe_signed_in<F>(&self, observer: F) -> Result<JoinHandle<()>>
    where
        F: FnMut(AuthState) + Send + 'static,
    {
        let subscription = self.subscribe_signed_in()?;
        spawn_observer(subscription, observer)
    }
}

fn spawn_observer<T, F>(mut subscription: Subscription<T>, mut observer: F) -> Result<JoinHandle<()>>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
        Error::InvalidInput(format!("Observers require a Tokio runtime: {error}"))
    })?;
    Ok(runtime.spawn(async move {
        while let Some(value) = subscription.recv().await {
            observer(value);
        }
    }))
}
