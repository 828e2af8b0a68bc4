use pocketnotes_core::util::compact_text;

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_retry(session: &mut Session) -> Result<(), CliError> {
    session.require_signed_in()?;
    let retried = session.service.retry_failed()?;
    if retried.is_empty() {
        println!("Nothing to retry");
        return Ok(());
    }

    let mut still_failing = 0;
    for (note, pending) in retried {
        let id = note.id.as_str();
        match pending.wait().await {
            Ok(()) => {
                session.outbox.remove(&id);
                println!("Synced {}", note.name);
            }
            Err(error) => {
                still_failing += 1;
                session.outbox.set_reason(&id, compact_text(&error.to_string()));
                eprintln!("{}: not synced: {error}", note.name);
            }
        }
    }
    session.outbox.save()?;

    if still_failing > 0 {
        return Err(CliError::RetryIncomplete(still_failing));
    }
    Ok(())
}
