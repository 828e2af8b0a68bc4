use std::path::PathBuf;

use pocketnotes_core::services::NewNote;
use pocketnotes_core::util::compact_text;

use crate::commands::common::{normalize_content, Session};
use crate::error::CliError;
use crate::outbox::OutboxEntry;

pub async fn run_add(
    session: &mut Session,
    name_parts: &[String],
    description: Option<String>,
    image: Option<PathBuf>,
) -> Result<(), CliError> {
    session.require_signed_in()?;
    let name = normalize_content(&name_parts.join(" ")).ok_or(CliError::EmptyName)?;

    let mut input = NewNote::new(name).with_description(description.unwrap_or_default());
    if let Some(path) = &image {
        input = input.with_image_path(path);
    }
    let (note, pending) = session.service.add_note(input).await?;

    match pending.wait().await {
        Ok(()) => {
            println!("{}", note.id);
            Ok(())
        }
        Err(error) => {
            session.outbox.push(OutboxEntry {
                record: note.to_record(),
                image_path: image,
                reason: compact_text(&error.to_string()),
            });
            session.outbox.save()?;
            Err(CliError::NotSynced {
                name: note.name,
                source: error,
            })
        }
    }
}
