//! Data models for pocketnotes

mod image;
mod note;

pub use image::{ImageKey, NoteImage};
pub use note::{Note, NoteId, NoteRecord, SyncStatus};
