use std::io;

use pocketnotes_core::backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pocketnotes_core::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Note name cannot be empty")]
    EmptyName,
    #[error("No note at position {0}; run `pocketnotes list` to see positions")]
    InvalidPosition(usize),
    #[error("Not signed in. Run `pocketnotes login` first.")]
    NotSignedIn,
    #[error("Note '{name}' was saved locally but not synced: {source}")]
    NotSynced {
        name: String,
        #[source]
        source: pocketnotes_core::Error,
    },
    #[error("{0} note(s) are still not synced")]
    RetryIncomplete(usize),
    #[error("Configuration error: {0}")]
    Config(String),
}
