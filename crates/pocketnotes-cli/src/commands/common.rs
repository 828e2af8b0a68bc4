use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use pocketnotes_core::backend::LocalDirBackend;
use pocketnotes_core::config::ClientConfig;
use pocketnotes_core::models::{Note, SyncStatus};
use pocketnotes_core::services::NoteService;
use pocketnotes_core::util::text_preview;
use pocketnotes_core::{NoteStore, SyncGateway};
use serde::Serialize;

use crate::error::CliError;
use crate::outbox::Outbox;

const CONFIG_FILE_NAME: &str = "config.json";

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Everything a command needs after a cold start.
pub struct Session {
    pub service: NoteService<LocalDirBackend>,
    pub outbox: Outbox,
    pub data_dir: PathBuf,
}

impl Session {
    pub fn store(&self) -> &NoteStore {
        self.service.store()
    }

    pub fn require_signed_in(&self) -> Result<(), CliError> {
        if self.store().is_signed_in()? {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub position: usize,
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub image_size: Option<(u32, u32)>,
    pub status: String,
    pub created_at: i64,
    pub relative_time: String,
}

/// Build store and gateway over the local service directory, restore the
/// session and load notes.
pub async fn open_session(options: &GlobalOptions) -> Result<Session, CliError> {
    let config_path = options.config.clone().or_else(default_config_path);
    let config = ClientConfig::load(config_path.as_deref())?;
    let data_dir = resolve_data_dir(options.data_dir.clone(), config.data_dir.clone())?;

    let backend = LocalDirBackend::open(&data_dir)?;
    let gateway = SyncGateway::new(Arc::new(backend), NoteStore::new())
        .with_retry_policy(config.retry_policy())
        .with_thumbnail_options(config.thumbnail_options())
        .with_max_image_bytes(config.max_image_bytes);

    if let Some(outcome) = gateway.restore_session().await? {
        for error in outcome.wait_for_images().await {
            tracing::warn!("Failed to load image: {}", error);
        }
    }

    let outbox = Outbox::load(&data_dir)?;
    if gateway.store().is_signed_in()? {
        outbox.restore_into(&gateway).await?;
    }

    Ok(Session {
        service: NoteService::new(gateway),
        outbox,
        data_dir,
    })
}

pub fn resolve_data_dir(
    cli_data_dir: Option<PathBuf>,
    config_data_dir: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    cli_data_dir
        .or(config_data_dir)
        .or_else(default_data_dir)
        .ok_or_else(|| {
            CliError::Config(
                "Failed to resolve a data directory; pass --data-dir".to_string(),
            )
        })
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("pocketnotes"))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pocketnotes").join(CONFIG_FILE_NAME))
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .enumerate()
        .map(|(index, note)| {
            let position = index + 1;
            let name = text_preview(&note.name, 30);
            let relative_time = format_relative_time(note.created_at, now_ms);
            let mut line = format!("{position:>3}. {name:<30}  {relative_time:<10}");
            if note.image_key.is_some() {
                line.push_str("  [image]");
            }
            if let SyncStatus::Failed(reason) = &note.sync_status {
                line.push_str(&format!("  (not synced: {})", text_preview(reason, 60)));
            }
            if !note.description.is_empty() {
                line.push_str(&format!("\n     {}", text_preview(&note.description, 70)));
            }
            line
        })
        .collect()
}

pub fn note_to_list_item(position: usize, note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        position,
        id: note.id.to_string(),
        name: note.name.clone(),
        description: note.description.clone(),
        image: note.image_key.as_ref().map(ToString::to_string),
        image_size: note.image.as_ref().map(|image| image.dimensions()),
        status: note.sync_status.label().to_string(),
        created_at: note.created_at,
        relative_time: format_relative_time(note.created_at, now_ms),
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
