//! End-to-end tests of sessions sharing one game through a store.

use castle_chess::{
    ConnectionState, GameRecord, GameStatus, MemoryStore, MoveError, RemoteStore, ResetError,
    Role, STARTING_FEN, SessionContext, SessionId, SessionPhase, SessionStore, ShakmatyValidator,
    Side, Square, StoreError, StoreErrorKind, TurnIndicator, reset_game, router,
};
use std::sync::Arc;
use std::time::Duration;

const GAME: &str = "mainCastleGame";
const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

fn sq(s: &str) -> Square {
    s.parse().expect("valid square")
}

async fn join(store: Arc<dyn SessionStore>, id: &str) -> SessionContext {
    SessionContext::connect(
        SessionId::from(id),
        GAME.to_string(),
        store,
        Arc::new(ShakmatyValidator::new()),
    )
    .await
    .expect("connect failed")
}

/// Handles snapshots until the store goes quiet. Returns the status lines.
async fn drain(ctx: &mut SessionContext) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(Some(snapshot)) =
        tokio::time::timeout(Duration::from_millis(200), ctx.next_snapshot()).await
    {
        lines.push(ctx.handle_snapshot(snapshot).await);
    }
    lines
}

async fn seated_pair(store: Arc<dyn SessionStore>) -> (SessionContext, SessionContext) {
    let mut a = join(store.clone(), "A").await;
    drain(&mut a).await;
    let mut b = join(store, "B").await;
    drain(&mut b).await;
    drain(&mut a).await;
    (a, b)
}

#[tokio::test]
async fn test_first_session_creates_game_and_takes_white() {
    let store = Arc::new(MemoryStore::new());
    let mut a = join(store.clone(), "A").await;
    assert_eq!(a.connection_state(), ConnectionState::Connected);
    assert_eq!(a.role(), None);
    assert_eq!(a.phase(), SessionPhase::Unassigned);

    let lines = drain(&mut a).await;
    assert_eq!(lines.first().map(String::as_str), Some("Started a new game. Waiting for players."));
    assert_eq!(a.role(), Some(Role::White));
    assert_eq!(a.phase(), SessionPhase::AssignedWaiting);
    assert_eq!(a.turn_indicator(), None);

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.players().white, Some(SessionId::from("A")));
    assert_eq!(stored.players().black, None);
    assert_eq!(stored.status(), GameStatus::WaitingForOpponent);
}

#[tokio::test]
async fn test_second_session_takes_black_and_game_starts() {
    let store = Arc::new(MemoryStore::new());
    let (a, b) = seated_pair(store.clone()).await;

    assert_eq!(a.role(), Some(Role::White));
    assert_eq!(b.role(), Some(Role::Black));
    assert_eq!(a.status(), GameStatus::Active);
    assert_eq!(b.status(), GameStatus::Active);
    assert_eq!(a.turn_indicator(), Some(TurnIndicator::MyTurn));
    assert_eq!(b.turn_indicator(), Some(TurnIndicator::TheirTurn));

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.status(), GameStatus::Active);
}

#[tokio::test]
async fn test_third_session_observes() {
    let store = Arc::new(MemoryStore::new());
    let (_a, _b) = seated_pair(store.clone()).await;

    let mut c = join(store.clone(), "C").await;
    let lines = drain(&mut c).await;
    assert_eq!(c.role(), Some(Role::Observer));
    assert_eq!(c.phase(), SessionPhase::Observing);
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Game Loaded! Status: Active. Current Turn: White. You are Observer.")
    );

    let err = c.submit_move(sq("e2"), sq("e4")).expect_err("observer moved");
    assert!(matches!(err, MoveError::NotYourTurn { .. }));

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.players().white, Some(SessionId::from("A")));
    assert_eq!(stored.players().black, Some(SessionId::from("B")));
}

#[tokio::test]
async fn test_move_reaches_opponent() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, mut b) = seated_pair(store.clone()).await;

    let submitted = a.submit_move(sq("e2"), sq("e4")).expect("e4 accepted");
    assert_eq!(submitted.accepted.status_message(), "Move: e4. Black's turn.");
    assert_eq!(a.position(), AFTER_E4);
    assert!(a.is_publish_pending());

    let publish = submitted.publish.expect("connected sessions publish");
    let result = publish.send().await;
    assert_eq!(a.finish_publish(result), None);
    assert!(!a.is_publish_pending());

    drain(&mut b).await;
    assert_eq!(b.position(), AFTER_E4);
    assert_eq!(b.turn().expect("valid"), Side::Black);
    assert_eq!(b.turn_indicator(), Some(TurnIndicator::MyTurn));

    // The echo of A's own write changes nothing.
    drain(&mut a).await;
    assert_eq!(a.position(), AFTER_E4);
    assert_eq!(a.role(), Some(Role::White));
}

#[tokio::test]
async fn test_out_of_turn_move_leaves_store_untouched() {
    let store = Arc::new(MemoryStore::new());
    let (_a, mut b) = seated_pair(store.clone()).await;

    let err = b.submit_move(sq("e7"), sq("e5")).expect_err("black moved first");
    assert_eq!(err.to_string(), "It is White's turn, not yours.");
    assert_eq!(b.position(), STARTING_FEN);

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.position(), STARTING_FEN);
}

#[tokio::test]
async fn test_second_move_waits_for_publish() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store).await;

    let first = a.submit_move(sq("e2"), sq("e4")).expect("e4 accepted");
    let err = a.submit_move(sq("d2"), sq("d4")).expect_err("publish in flight");
    assert!(matches!(err, MoveError::PublishPending));

    let publish = first.publish.expect("publish");
    let result = publish.send().await;
    a.finish_publish(result);
    assert!(!a.is_publish_pending());
}

#[tokio::test]
async fn test_failed_publish_is_reported_without_rollback() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store).await;

    a.submit_move(sq("e2"), sq("e4")).expect("e4 accepted");
    let message = a.finish_publish(Err(StoreError::new(
        StoreErrorKind::Unavailable,
        "connection reset",
    )));
    assert_eq!(message.as_deref(), Some("Failed to sync move: connection reset"));
    assert_eq!(a.position(), AFTER_E4);
}

#[tokio::test]
async fn test_selection_lists_targets_and_refuses_opponent_pieces() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store).await;

    let mut targets = a.select(sq("g1")).expect("knight selectable");
    targets.sort_by_key(|s| (s.file(), s.rank()));
    assert_eq!(targets, vec![sq("f3"), sq("h3")]);
    assert_eq!(a.selection().map(|s| s.from), Some(sq("g1")));

    let err = a.select(sq("e7")).expect_err("black pawn");
    assert_eq!(err.to_string(), "You can only move your own (White) pieces.");
    assert!(a.selection().is_none());

    assert_eq!(a.select(sq("e4")).expect("empty square"), Vec::<Square>::new());

    a.select(sq("g1")).expect("knight selectable");
    let submitted = a.move_selected(sq("f3")).expect("Nf3 accepted");
    assert_eq!(submitted.accepted.san, "Nf3");

    assert!(matches!(
        a.move_selected(sq("e4")),
        Err(MoveError::NothingSelected)
    ));
}

#[tokio::test]
async fn test_invalid_remote_position_keeps_last_known_good() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store.clone()).await;

    let mut broken = store.fetch(GAME).await.expect("fetch").expect("record");
    broken.set_position("this is not chess");
    store.write(GAME, &broken).await.expect("write");

    let lines = drain(&mut a).await;
    assert_eq!(lines.last().map(String::as_str), Some("ERROR: Invalid Game State."));
    assert_eq!(a.position(), STARTING_FEN);
    assert_eq!(a.role(), Some(Role::White));
}

#[tokio::test]
async fn test_invalid_position_blocks_seat_claims() {
    let store = Arc::new(MemoryStore::new());
    let mut broken = GameRecord::initial();
    broken.set_position("8/8/8/8/8/8/8/8");
    store.write(GAME, &broken).await.expect("write");

    let mut c = join(store.clone(), "C").await;
    let lines = drain(&mut c).await;
    assert_eq!(lines.last().map(String::as_str), Some("ERROR: Invalid Game State."));
    assert_eq!(c.role(), None);

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.players().white, None);
    assert_eq!(stored.players().black, None);
}

#[tokio::test]
async fn test_write_during_publish_is_applied_afterwards() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store.clone()).await;

    let submitted = a.submit_move(sq("e2"), sq("e4")).expect("e4 accepted");
    let result = submitted.publish.expect("publish").send().await;

    // Someone resets the game before A hears back about its own publish.
    store.write(GAME, &GameRecord::initial()).await.expect("write");
    drain(&mut a).await;
    assert_eq!(a.position(), AFTER_E4);

    assert_eq!(a.finish_publish(result), None);
    drain(&mut a).await;

    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.position(), STARTING_FEN);
    assert_eq!(a.position(), stored.position());
    assert_eq!(a.turn().expect("valid"), Side::White);
}

#[tokio::test]
async fn test_offline_session_plays_both_sides() {
    let mut ctx = SessionContext::offline(GAME.to_string(), Arc::new(ShakmatyValidator::new()));
    assert_eq!(ctx.connection_state(), ConnectionState::Disconnected);
    assert_eq!(ctx.role(), Some(Role::White));

    let white = ctx.submit_move(sq("e2"), sq("e4")).expect("white move");
    assert!(white.publish.is_none());
    assert!(!ctx.is_publish_pending());

    let targets = ctx.select(sq("e7")).expect("black piece selectable offline");
    assert!(targets.contains(&sq("e5")));
    ctx.move_selected(sq("e5")).expect("black move");
    assert_eq!(ctx.turn().expect("valid"), Side::White);
    assert_eq!(ctx.turn_indicator(), Some(TurnIndicator::MyTurn));
}

#[tokio::test]
async fn test_checkmate_finishes_the_game() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, mut b) = seated_pair(store.clone()).await;

    let line = [
        ("e2", "e4", true),
        ("e7", "e5", false),
        ("f1", "c4", true),
        ("b8", "c6", false),
        ("d1", "h5", true),
        ("g8", "f6", false),
        ("h5", "f7", true),
    ];
    for (from, to, white) in line {
        let (mover, other) = if white { (&mut a, &mut b) } else { (&mut b, &mut a) };
        let submitted = mover.submit_move(sq(from), sq(to)).expect("legal move");
        let result = submitted.publish.expect("publish").send().await;
        mover.finish_publish(result);
        drain(other).await;
        drain(mover).await;
    }

    assert_eq!(a.status(), GameStatus::Finished);
    assert_eq!(b.status(), GameStatus::Finished);
    let stored = store.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.status(), GameStatus::Finished);
}

#[tokio::test]
async fn test_reset_refuses_active_game_unless_forced() {
    let store = Arc::new(MemoryStore::new());
    let (_a, _b) = seated_pair(store.clone()).await;

    let err = reset_game(store.as_ref(), GAME, false)
        .await
        .expect_err("active game reset");
    assert!(matches!(err, ResetError::InProgress(GameStatus::Active)));

    let record = reset_game(store.as_ref(), GAME, true).await.expect("forced reset");
    assert_eq!(record, GameRecord::initial());
    assert_eq!(store.fetch(GAME).await.expect("fetch"), Some(GameRecord::initial()));
}

#[tokio::test]
async fn test_reset_creates_missing_game() {
    let store = MemoryStore::new();
    reset_game(&store, GAME, false).await.expect("reset");
    assert!(store.fetch(GAME).await.expect("fetch").is_some());
}

#[tokio::test]
async fn test_disconnect_stops_publishing() {
    let store = Arc::new(MemoryStore::new());
    let (mut a, _b) = seated_pair(store).await;

    a.disconnect();
    assert_eq!(a.connection_state(), ConnectionState::Disconnected);
    let submitted = a.submit_move(sq("e2"), sq("e4")).expect("still a legal move");
    assert!(submitted.publish.is_none());
}

#[tokio::test]
async fn test_sessions_over_http() {
    let backing = Arc::new(MemoryStore::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(backing.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let url = format!("http://{}", addr);
    let remote = |url: &str| -> Arc<dyn SessionStore> {
        Arc::new(RemoteStore::connect(url.to_string(), Duration::from_millis(20)).expect("client"))
    };

    let mut a = join(remote(&url), "A").await;
    drain(&mut a).await;
    let mut b = join(remote(&url), "B").await;
    drain(&mut b).await;

    assert_eq!(a.role(), Some(Role::White));
    assert_eq!(b.role(), Some(Role::Black));

    let submitted = a.submit_move(sq("e2"), sq("e4")).expect("e4 accepted");
    let result = submitted.publish.expect("publish").send().await;
    assert_eq!(a.finish_publish(result), None);

    drain(&mut b).await;
    assert_eq!(b.position(), AFTER_E4);

    let stored = backing.fetch(GAME).await.expect("fetch").expect("record");
    assert_eq!(stored.position(), AFTER_E4);
    assert_eq!(stored.status(), GameStatus::Active);

    server.abort();
}
