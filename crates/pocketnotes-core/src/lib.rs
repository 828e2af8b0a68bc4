//! pocketnotes-core - Core library for pocketnotes
//!
//! This crate contains the observable note store, the gateway that keeps it
//! in step with the remote notes service, and the models and media helpers
//! shared by all pocketnotes clients.

pub mod backend;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use state::AuthState;
pub use store::{NoteStore, NotesSnapshot, RemoteMerge, Subscription};
pub use sync::{Completion, SyncGateway};
