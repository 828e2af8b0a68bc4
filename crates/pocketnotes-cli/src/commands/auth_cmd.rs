use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_login(session: &Session) -> Result<(), CliError> {
    if session.store().is_signed_in()? {
        println!("Already signed in");
        return Ok(());
    }
    session.service.sign_in().await?;
    println!("Signed in");
    Ok(())
}

pub async fn run_logout(session: &Session) -> Result<(), CliError> {
    if !session.store().is_signed_in()? {
        println!("Not signed in");
        return Ok(());
    }
    session.service.sign_out().await?;
    println!("Signed out");
    Ok(())
}

pub fn run_status(session: &Session) -> Result<(), CliError> {
    println!("Data directory: {}", session.data_dir.display());
    if !session.store().is_signed_in()? {
        println!("Signed out");
        return Ok(());
    }

    let notes = session.store().notes()?;
    let unsynced = notes
        .iter()
        .filter(|note| note.sync_status.is_failed())
        .count();
    println!("Signed in");
    println!("{} notes, {} not synced", notes.len(), unsynced);
    Ok(())
}
