//! Tests for database repository operations.

use castle_chess::{
    DbErrorKind, GameRecord, GameRepository, GameStatus, NewGameRow, SessionId, Side,
};
use tempfile::NamedTempFile;

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db() -> (NamedTempFile, GameRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = GameRepository::open(db_path).expect("Failed to open repository");
    (db_file, repo)
}

fn initial_row(game_id: &str) -> NewGameRow {
    NewGameRow::from_record(game_id, &GameRecord::initial()).expect("valid record")
}

#[test]
fn test_get_missing_game() {
    let (_db, repo) = setup_test_db();
    assert!(repo.get("nope").expect("Query failed").is_none());
}

#[test]
fn test_upsert_and_get() {
    let (_db, repo) = setup_test_db();
    repo.upsert(&initial_row("g")).expect("Upsert failed");

    let row = repo.get("g").expect("Query failed").expect("row");
    assert_eq!(row.game_id(), "g");
    assert_eq!(row.turn(), "White");
    assert_eq!(row.status(), "WaitingForOpponent");
    assert!(row.white().is_none());
    assert_eq!(row.to_record().expect("decode"), GameRecord::initial());
}

#[test]
fn test_upsert_replaces_existing_row() {
    let (_db, repo) = setup_test_db();
    repo.upsert(&initial_row("g")).expect("Upsert failed");

    let mut record = GameRecord::initial();
    record.seat(Side::White, SessionId::from("A"));
    repo.upsert(&NewGameRow::from_record("g", &record).expect("row"))
        .expect("Upsert failed");

    let row = repo.get("g").expect("Query failed").expect("row");
    assert_eq!(row.white().as_deref(), Some("A"));
}

#[test]
fn test_insert_if_absent_only_once() {
    let (_db, repo) = setup_test_db();
    assert!(repo.insert_if_absent(&initial_row("g")).expect("Insert failed"));
    assert!(!repo.insert_if_absent(&initial_row("g")).expect("Insert failed"));
}

#[test]
fn test_modify_writes_only_changes() {
    let (_db, repo) = setup_test_db();
    repo.upsert(&initial_row("g")).expect("Upsert failed");

    let (record, changed) = repo
        .modify("g", |record| record.seat(Side::White, SessionId::from("A")))
        .expect("Modify failed")
        .expect("game exists");
    assert!(changed);
    assert_eq!(record.players().white, Some(SessionId::from("A")));

    let (_, changed) = repo
        .modify("g", |record| record.seat(Side::White, SessionId::from("B")))
        .expect("Modify failed")
        .expect("game exists");
    assert!(!changed, "White is already taken");

    let stored = repo.get("g").expect("Query failed").expect("row");
    assert_eq!(stored.white().as_deref(), Some("A"));
}

#[test]
fn test_modify_missing_game() {
    let (_db, repo) = setup_test_db();
    let result = repo.modify("nope", |_| true).expect("Modify failed");
    assert!(result.is_none());
}

#[test]
fn test_both_seats_make_game_active() {
    let (_db, repo) = setup_test_db();
    repo.upsert(&initial_row("g")).expect("Upsert failed");
    repo.modify("g", |r| r.seat(Side::White, SessionId::from("A")))
        .expect("Modify failed");
    repo.modify("g", |r| r.seat(Side::Black, SessionId::from("B")))
        .expect("Modify failed");

    let row = repo.get("g").expect("Query failed").expect("row");
    assert_eq!(row.status(), "Active");
    assert_eq!(
        row.to_record().expect("decode").status(),
        GameStatus::Active
    );
}

#[test]
fn test_row_without_side_to_move_is_corrupt() {
    let mut record = GameRecord::initial();
    record.set_position("8/8/8/8/8/8/8/8");
    let err = NewGameRow::from_record("g", &record).expect_err("no turn field");
    assert_eq!(err.kind, DbErrorKind::Corrupt);
}
