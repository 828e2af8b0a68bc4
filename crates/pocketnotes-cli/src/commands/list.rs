use crate::commands::common::{format_note_lines, note_to_list_item, NoteListItem, Session};
use crate::error::CliError;

pub fn run_list(session: &Session, as_json: bool) -> Result<(), CliError> {
    session.require_signed_in()?;
    let notes = session.store().notes()?;

    if as_json {
        let json_items = notes
            .iter()
            .enumerate()
            .map(|(index, note)| note_to_list_item(index + 1, note))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes yet");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
