use std::path::{Path, PathBuf};

use pocketnotes_core::models::{Note, SyncStatus};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::commands::add::run_add;
use crate::commands::auth_cmd::{run_login, run_logout};
use crate::commands::common::{
    format_note_lines, format_relative_time, note_to_list_item, open_session, resolve_data_dir,
    GlobalOptions, Session,
};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::retry::run_retry;
use crate::error::CliError;
use crate::outbox::{Outbox, OutboxEntry};

fn options(dir: &TempDir) -> GlobalOptions {
    GlobalOptions {
        data_dir: Some(dir.path().join("data")),
        config: Some(dir.path().join("missing-config.json")),
    }
}

async fn signed_in_session(dir: &TempDir) -> Session {
    run_login(&open_session(&options(dir)).await.unwrap())
        .await
        .unwrap();
    open_session(&options(dir)).await.unwrap()
}

fn names(session: &Session) -> Vec<String> {
    session
        .store()
        .notes()
        .unwrap()
        .iter()
        .map(|note| note.name.clone())
        .collect()
}

fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]))
        .save(path)
        .unwrap();
}

#[test]
fn format_relative_time_units() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 10_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60 * 1000, now), "5m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60 * 1000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60 * 1000, now), "3d ago");
}

#[test]
fn resolve_data_dir_prefers_flag_over_config() {
    let resolved = resolve_data_dir(
        Some(PathBuf::from("/tmp/flag")),
        Some(PathBuf::from("/tmp/config")),
    )
    .unwrap();
    assert_eq!(resolved, PathBuf::from("/tmp/flag"));

    let resolved = resolve_data_dir(None, Some(PathBuf::from("/tmp/config"))).unwrap();
    assert_eq!(resolved, PathBuf::from("/tmp/config"));
}

#[test]
fn note_lines_show_position_and_sync_state() {
    let mut failed = Note::new("Eggs", "a dozen");
    failed.sync_status = SyncStatus::Failed("service unavailable".to_string());
    let lines = format_note_lines(&[Note::new("Milk", ""), failed]);

    assert!(lines[0].starts_with("  1. Milk"));
    assert!(!lines[0].contains("not synced"));
    assert!(lines[1].starts_with("  2. Eggs"));
    assert!(lines[1].contains("(not synced: service unavailable)"));
    assert!(lines[1].ends_with("a dozen"));
}

#[test]
fn list_item_reports_status_label() {
    let item = note_to_list_item(3, &Note::new("Milk", "2%"));
    assert_eq!(item.position, 3);
    assert_eq!(item.status, "pending");
    assert_eq!(item.image, None);
}

#[tokio::test]
async fn commands_require_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(&options(&dir)).await.unwrap();

    assert!(matches!(
        run_add(&mut session, &["Milk".to_string()], None, None).await,
        Err(CliError::NotSignedIn)
    ));
    assert!(matches!(
        run_list(&session, false),
        Err(CliError::NotSignedIn)
    ));
    assert!(matches!(
        run_delete(&mut session, 1).await,
        Err(CliError::NotSignedIn)
    ));
}

#[tokio::test]
async fn added_notes_survive_a_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = signed_in_session(&dir).await;

    run_add(&mut session, &["Milk".to_string()], Some("2%".to_string()), None)
        .await
        .unwrap();
    run_add(&mut session, &["Eggs".to_string(), "(large)".to_string()], None, None)
        .await
        .unwrap();
    assert_eq!(names(&session), vec!["Milk", "Eggs (large)"]);

    let session = open_session(&options(&dir)).await.unwrap();
    assert_eq!(names(&session), vec!["Milk", "Eggs (large)"]);
    let notes = session.store().notes().unwrap();
    assert_eq!(notes[0].description, "2%");
    assert!(notes
        .iter()
        .all(|note| note.sync_status == SyncStatus::Synced));
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = signed_in_session(&dir).await;

    assert!(matches!(
        run_add(&mut session, &["   ".to_string()], None, None).await,
        Err(CliError::EmptyName)
    ));
}

#[tokio::test]
async fn delete_uses_display_positions() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = signed_in_session(&dir).await;
    for name in ["Milk", "Eggs", "Bread"] {
        run_add(&mut session, &[name.to_string()], None, None)
            .await
            .unwrap();
    }

    run_delete(&mut session, 2).await.unwrap();
    assert_eq!(names(&session), vec!["Milk", "Bread"]);

    assert!(matches!(
        run_delete(&mut session, 0).await,
        Err(CliError::InvalidPosition(0))
    ));
    assert!(matches!(
        run_delete(&mut session, 3).await,
        Err(CliError::InvalidPosition(3))
    ));

    let session = open_session(&options(&dir)).await.unwrap();
    assert_eq!(names(&session), vec!["Milk", "Bread"]);
}

#[tokio::test]
async fn images_are_uploaded_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("cat.png");
    write_png(&photo, 64, 32);
    let mut session = signed_in_session(&dir).await;

    run_add(&mut session, &["Cat".to_string()], None, Some(photo))
        .await
        .unwrap();

    let session = open_session(&options(&dir)).await.unwrap();
    let notes = session.store().notes().unwrap();
    let image = notes[0].image.as_ref().unwrap();
    assert_eq!(image.dimensions(), (64, 32));
}

#[tokio::test]
async fn signing_out_hides_notes_until_next_login() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = signed_in_session(&dir).await;
    run_add(&mut session, &["Milk".to_string()], None, None)
        .await
        .unwrap();

    run_logout(&session).await.unwrap();
    let session = open_session(&options(&dir)).await.unwrap();
    assert!(!session.store().is_signed_in().unwrap());
    assert!(session.store().is_empty().unwrap());

    let session = signed_in_session(&dir).await;
    assert_eq!(names(&session), vec!["Milk"]);
}

#[tokio::test]
async fn outbox_notes_are_listed_as_not_synced_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    drop(signed_in_session(&dir).await);

    let data_dir = dir.path().join("data");
    let offline = Note::new("Offline", "");
    let mut outbox = Outbox::load(&data_dir).unwrap();
    outbox.push(OutboxEntry {
        record: offline.to_record(),
        image_path: None,
        reason: "service unavailable".to_string(),
    });
    outbox.save().unwrap();

    let mut session = open_session(&options(&dir)).await.unwrap();
    let restored = session.store().get(&offline.id).unwrap().unwrap();
    assert_eq!(
        restored.sync_status,
        SyncStatus::Failed("service unavailable".to_string())
    );

    run_retry(&mut session).await.unwrap();
    assert!(session.outbox.entries().is_empty());
    assert!(!data_dir.join("outbox.json").exists());

    let session = open_session(&options(&dir)).await.unwrap();
    let synced = session.store().get(&offline.id).unwrap().unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn retry_with_nothing_failed_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = signed_in_session(&dir).await;
    run_retry(&mut session).await.unwrap();
}

#[test]
fn outbox_push_replaces_entries_for_the_same_note() {
    let dir = tempfile::tempdir().unwrap();
    let note = Note::new("Milk", "");
    let mut outbox = Outbox::load(dir.path()).unwrap();
    for reason in ["first", "second"] {
        outbox.push(OutboxEntry {
            record: note.to_record(),
            image_path: None,
            reason: reason.to_string(),
        });
    }
    assert_eq!(outbox.entries().len(), 1);
    assert_eq!(outbox.entries()[0].reason, "second");

    outbox.save().unwrap();
    let reloaded = Outbox::load(dir.path()).unwrap();
    assert_eq!(reloaded.entries(), outbox.entries());
}

#[test]
fn outbox_save_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut outbox = Outbox::load(dir.path()).unwrap();
    outbox.push(OutboxEntry {
        record: Note::new("Milk", "").to_record(),
        image_path: None,
        reason: "offline".to_string(),
    });

    outbox.save().unwrap();
    assert!(dir.path().join("outbox.json").exists());
    assert!(!dir.path().join("outbox.json.tmp").exists());
}

#[tokio::test]
async fn truncated_outbox_does_not_block_the_session() {
    let dir = tempfile::tempdir().unwrap();
    drop(signed_in_session(&dir).await);
    let data_dir = dir.path().join("data");
    std::fs::write(data_dir.join("outbox.json"), "[{\"record\": {\"id\"").unwrap();

    let session = open_session(&options(&dir)).await.unwrap();
    assert!(session.outbox.entries().is_empty());
    assert!(run_list(&session, false).is_ok());
    assert!(!data_dir.join("outbox.json").exists());
    assert!(data_dir.join("outbox.json.corrupt").exists());
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("pocketnotes.bash");

    run_completions(clap_complete::Shell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("pocketnotes"));
}
