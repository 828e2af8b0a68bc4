use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub const BIN_NAME: &str = "pocketnotes";

#[derive(Parser)]
#[command(name = BIN_NAME)]
#[command(about = "Jot down notes with photos and keep them in sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the notes service state
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note name
        #[arg(required = true)]
        name: Vec<String>,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
        /// Image file to attach
        #[arg(short, long, value_name = "PATH")]
        image: Option<PathBuf>,
    },
    /// List notes in display order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the note at a list position
    #[command(alias = "rm")]
    Delete {
        /// Position as shown by `pocketnotes list` (starting at 1)
        position: usize,
    },
    /// Start a session with the notes service
    Login,
    /// End the current session
    Logout,
    /// Show session and sync state
    Status,
    /// Resubmit notes that failed to sync
    Retry,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}
