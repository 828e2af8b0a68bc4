//! High-level note operations shared by clients.

mod notes;

pub use notes::{NewNote, NoteService, PendingSync};
