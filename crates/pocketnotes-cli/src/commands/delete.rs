use crate::commands::common::Session;
use crate::error::CliError;

/// Delete the note at a 1-based display position.
pub async fn run_delete(session: &mut Session, position: usize) -> Result<(), CliError> {
    session.require_signed_in()?;
    let index = position
        .checked_sub(1)
        .ok_or(CliError::InvalidPosition(position))?;

    let (note, completion) = match session.service.delete_note_at(index) {
        Ok(deleted) => deleted,
        Err(pocketnotes_core::Error::IndexOutOfRange { .. }) => {
            return Err(CliError::InvalidPosition(position));
        }
        Err(error) => return Err(error.into()),
    };

    if session.outbox.remove(&note.id.as_str()) {
        session.outbox.save()?;
    }
    completion.await?;

    println!("Deleted {}", note.name);
    Ok(())
}
