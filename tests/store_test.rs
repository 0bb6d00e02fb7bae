//! Tests for the session store backends.

use castle_chess::{
    ClaimOutcome, GameRecord, GameStatus, MemoryStore, PositionUpdate, SessionId, SessionStore,
    Side, Snapshot, SqliteStore, StoreError, StoreErrorKind,
    Subscription,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

/// Creates a SQLite store on a temporary file. The file handle must stay in
/// scope to keep the database alive.
async fn sqlite_store() -> (NamedTempFile, SqliteStore) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let store = SqliteStore::open(db_path, Duration::from_millis(20))
        .await
        .expect("Failed to open store");
    (db_file, store)
}

async fn check_create_and_fetch(store: &dyn SessionStore) {
    assert!(store.fetch("g").await.expect("fetch failed").is_none());

    let created = store
        .create_if_absent("g", &GameRecord::initial())
        .await
        .expect("create failed");
    assert!(created);

    let again = store
        .create_if_absent("g", &GameRecord::initial())
        .await
        .expect("create failed");
    assert!(!again, "second create must not overwrite");

    let stored = store.fetch("g").await.expect("fetch failed").expect("record");
    assert_eq!(stored, GameRecord::initial());
}

async fn check_claims(store: &dyn SessionStore) {
    store
        .create_if_absent("g", &GameRecord::initial())
        .await
        .expect("create failed");
    let a = SessionId::from("A");
    let b = SessionId::from("B");

    let white = store.claim_slot("g", Side::White, &a).await.expect("claim failed");
    assert!(matches!(white, ClaimOutcome::Claimed(_)));
    assert_eq!(white.record().status(), GameStatus::WaitingForOpponent);

    let stolen = store.claim_slot("g", Side::White, &b).await.expect("claim failed");
    assert!(matches!(stolen, ClaimOutcome::Taken(_)));
    assert_eq!(stolen.record().players().white, Some(a.clone()));

    let black = store.claim_slot("g", Side::Black, &b).await.expect("claim failed");
    assert!(matches!(black, ClaimOutcome::Claimed(_)));

    let stored = store.fetch("g").await.expect("fetch failed").expect("record");
    assert_eq!(stored.players().white, Some(a));
    assert_eq!(stored.players().black, Some(b));
    assert_eq!(stored.status(), GameStatus::Active);
}

async fn check_publish_keeps_seats(store: &dyn SessionStore) {
    store
        .create_if_absent("g", &GameRecord::initial())
        .await
        .expect("create failed");
    let a = SessionId::from("A");
    store.claim_slot("g", Side::White, &a).await.expect("claim failed");

    store
        .publish_position(
            "g",
            &PositionUpdate {
                position: AFTER_E4.to_string(),
                status: GameStatus::WaitingForOpponent,
            },
        )
        .await
        .expect("publish failed");

    let stored = store.fetch("g").await.expect("fetch failed").expect("record");
    assert_eq!(stored.position(), AFTER_E4);
    assert_eq!(stored.turn().expect("valid"), Side::Black);
    assert_eq!(stored.players().white, Some(a));
}

async fn check_missing_game(store: &dyn SessionStore) {
    let err = store
        .claim_slot("missing", Side::White, &SessionId::from("A"))
        .await
        .expect_err("claim on a missing game");
    assert_eq!(err.kind, StoreErrorKind::NotFound);

    let err = store
        .publish_position(
            "missing",
            &PositionUpdate {
                position: AFTER_E4.to_string(),
                status: GameStatus::Active,
            },
        )
        .await
        .expect_err("publish on a missing game");
    assert_eq!(err.kind, StoreErrorKind::NotFound);
}

async fn check_subscription(store: &dyn SessionStore) {
    let mut sub = store.subscribe("g").await.expect("subscribe failed");

    let first = tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
        .await
        .expect("no initial snapshot")
        .expect("subscription closed")
        .expect("snapshot error");
    assert!(first.is_none(), "game does not exist yet");

    store.write("g", &GameRecord::initial()).await.expect("write failed");

    let second = tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
        .await
        .expect("no change notification")
        .expect("subscription closed")
        .expect("snapshot error");
    assert_eq!(second, Some(GameRecord::initial()));

    sub.cancel();
}

#[tokio::test]
async fn test_memory_create_and_fetch() {
    check_create_and_fetch(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_claims() {
    check_claims(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_publish_keeps_seats() {
    check_publish_keeps_seats(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_missing_game() {
    check_missing_game(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_subscription() {
    check_subscription(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_create_and_fetch() {
    let (_db, store) = sqlite_store().await;
    check_create_and_fetch(&store).await;
}

#[tokio::test]
async fn test_sqlite_claims() {
    let (_db, store) = sqlite_store().await;
    check_claims(&store).await;
}

#[tokio::test]
async fn test_sqlite_publish_keeps_seats() {
    let (_db, store) = sqlite_store().await;
    check_publish_keeps_seats(&store).await;
}

#[tokio::test]
async fn test_sqlite_missing_game() {
    let (_db, store) = sqlite_store().await;
    check_missing_game(&store).await;
}

#[tokio::test]
async fn test_sqlite_subscription() {
    let (_db, store) = sqlite_store().await;
    check_subscription(&store).await;
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    {
        let store = SqliteStore::open(db_path.clone(), Duration::from_millis(20))
            .await
            .expect("open failed");
        store
            .create_if_absent("g", &GameRecord::initial())
            .await
            .expect("create failed");
        store
            .claim_slot("g", Side::White, &SessionId::from("A"))
            .await
            .expect("claim failed");
    }

    let reopened = SqliteStore::open(db_path, Duration::from_millis(20))
        .await
        .expect("reopen failed");
    let stored = reopened.fetch("g").await.expect("fetch failed").expect("record");
    assert_eq!(stored.players().white, Some(SessionId::from("A")));
}

#[tokio::test]
async fn test_sqlite_concurrent_claims_pick_one_winner() {
    let (_db, store) = sqlite_store().await;
    store
        .create_if_absent("g", &GameRecord::initial())
        .await
        .expect("create failed");

    let a = SessionId::from("A");
    let b = SessionId::from("B");
    let (first, second) = tokio::join!(
        store.claim_slot("g", Side::White, &a),
        store.claim_slot("g", Side::White, &b),
    );
    let outcomes = [first.expect("claim failed"), second.expect("claim failed")];
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
        .count();
    assert_eq!(winners, 1);
}

async fn next_polled(sub: &mut Subscription) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
        .await
        .expect("no snapshot")
        .expect("subscription closed")
}

#[tokio::test]
async fn test_polling_emits_unchanged_document_after_outage() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut sub = Subscription::polling(Duration::from_millis(10), move || {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            match call {
                1 | 2 => Err(StoreError::new(StoreErrorKind::Unavailable, "store down")),
                _ => Ok(Some(GameRecord::initial())),
            }
        }
    });

    let first = next_polled(&mut sub).await.expect("first fetch");
    assert_eq!(first, Some(GameRecord::initial()));
    let err = next_polled(&mut sub).await.expect_err("outage reported");
    assert_eq!(err.kind, StoreErrorKind::Unavailable);
    // One error per outage, then the same document again once it ends.
    let recovered = next_polled(&mut sub).await.expect("recovered");
    assert_eq!(recovered, Some(GameRecord::initial()));
    assert!(calls.load(Ordering::SeqCst) >= 4);
}
