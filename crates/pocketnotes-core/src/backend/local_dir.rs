//! Directory-backed backend for single-machine use.
//!
//! Layout under the root directory:
//! - `remote.json`: session flag and note records in creation order
//! - `images/<key>`: uploaded image blobs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{BackendError, BackendResult, EventFanout, RemoteBackend, RemoteEvent};
use crate::models::{ImageKey, NoteId, NoteRecord};

const STATE_FILE_NAME: &str = "remote.json";
const IMAGES_DIR_NAME: &str = "images";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    signed_in: bool,
    #[serde(default)]
    notes: Vec<NoteRecord>,
}

/// Backend that keeps its state in a local directory.
#[derive(Clone)]
pub struct LocalDirBackend {
    root: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    events: Arc<Mutex<EventFanout>>,
}

impl LocalDirBackend {
    /// Open (and create if needed) a backend rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(IMAGES_DIR_NAME))?;
        tracing::info!("Using local backend at {}", root.display());
        Ok(Self {
            root,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            events: Arc::new(Mutex::new(EventFanout::default())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    fn image_path(&self, key: &ImageKey) -> BackendResult<PathBuf> {
        let key = ImageKey::parse(key.as_str())
            .map_err(|error| BackendError::Rejected(error.to_string()))?;
        Ok(self.root.join(IMAGES_DIR_NAME).join(key.as_str()))
    }

    fn emit(&self, event: &RemoteEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.emit(event);
        }
    }

    async fn load(&self) -> BackendResult<PersistedState> {
        match tokio::fs::read_to_string(self.state_path()).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(PersistedState::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, state: &PersistedState) -> BackendResult<()> {
        let path = self.state_path();
        let temp_path = path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&temp_path, serialized).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    /// Load, modify and persist the state under the write lock.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut PersistedState) -> BackendResult<T> + Send,
    ) -> BackendResult<T> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let output = change(&mut state)?;
        self.save(&state).await?;
        Ok(output)
    }

    async fn require_session(&self) -> BackendResult<()> {
        if self.load().await?.signed_in {
            Ok(())
        } else {
            Err(BackendError::Unauthenticated)
        }
    }
}

impl RemoteBackend for LocalDirBackend {
    async fn sign_in(&self) -> BackendResult<()> {
        self.update(|state| {
            state.signed_in = true;
            Ok(())
        })
        .await?;
        self.emit(&RemoteEvent::SignedIn);
        Ok(())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.update(|state| {
            state.signed_in = false;
            Ok(())
        })
        .await?;
        self.emit(&RemoteEvent::SignedOut);
        Ok(())
    }

    async fn is_signed_in(&self) -> BackendResult<bool> {
        Ok(self.load().await?.signed_in)
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<RemoteEvent> {
        match self.events.lock() {
            Ok(mut events) => events.subscribe(),
            Err(_) => mpsc::unbounded_channel().1,
        }
    }

    async fn list_notes(&self) -> BackendResult<Vec<NoteRecord>> {
        let state = self.load().await?;
        if !state.signed_in {
            return Err(BackendError::Unauthenticated);
        }
        Ok(state.notes)
    }

    async fn create_note(&self, record: NoteRecord) -> BackendResult<()> {
        self.update(move |state| {
            if !state.signed_in {
                return Err(BackendError::Unauthenticated);
            }
            if state.notes.iter().any(|existing| existing.id == record.id) {
                return Err(BackendError::Conflict(format!(
                    "note {} already exists",
                    record.id
                )));
            }
            state.notes.push(record);
            Ok(())
        })
        .await
    }

    async fn delete_note(&self, id: NoteId) -> BackendResult<()> {
        let raw = id.as_str();
        self.update(move |state| {
            if !state.signed_in {
                return Err(BackendError::Unauthenticated);
            }
            let before = state.notes.len();
            state.notes.retain(|record| record.id != raw);
            if state.notes.len() == before {
                return Err(BackendError::NotFound(raw));
            }
            Ok(())
        })
        .await
    }

    async fn upload_image(&self, key: ImageKey, bytes: Vec<u8>) -> BackendResult<()> {
        self.require_session().await?;
        let path = self.image_path(&key)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn download_image(&self, key: ImageKey) -> BackendResult<Vec<u8>> {
        self.require_session().await?;
        let path = self.image_path(&key)?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn remove_image(&self, key: ImageKey) -> BackendResult<()> {
        self.require_session().await?;
        let path = self.image_path(&key)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
