//! One player's connection to the shared game.

use crate::arbiter::{Reconciliation, reconcile};
use crate::games::chess::{
    MoveValidator, PositionError, Role, STARTING_FEN, Side, Square, piece_at,
};
use crate::pipeline::{AcceptedMove, GateMode, MoveError, check_gate, submit_move};
use crate::record::{GameRecord, GameStatus, Players, SessionId};
use crate::store::{
    ClaimOutcome, PositionUpdate, SessionStore, Snapshot, StoreError, Subscription,
};
use derive_more::{Display, From};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Connection to the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    /// Subscribing to the store.
    Connecting,
    /// Receiving change notifications.
    Connected,
    /// No store; playing locally.
    Disconnected,
}

/// Coarse progress of a session through a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionPhase {
    /// No role yet.
    Unassigned,
    /// Seated, waiting for an opponent.
    AssignedWaiting,
    /// Seated with both seats filled.
    AssignedActive,
    /// Watching a full game.
    Observing,
}

/// Whose move it is, from this session's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TurnIndicator {
    /// This session may move.
    MyTurn,
    /// Waiting on the opponent.
    TheirTurn,
}

/// A piece picked up for moving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Square of the selected piece.
    pub from: Square,
    /// Squares the piece can legally reach.
    pub targets: Vec<Square>,
}

/// A position update waiting to be sent to the store.
///
/// Runs independently of the session so the caller can keep handling input
/// while it is in flight; report the result back with
/// [`SessionContext::finish_publish`].
#[derive(Debug, Clone)]
pub struct PendingPublish {
    store: Arc<dyn SessionStore>,
    game_id: String,
    update: PositionUpdate,
}

impl PendingPublish {
    /// Sends the update.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write fails.
    #[instrument(skip(self), fields(game_id = %self.game_id, status = %self.update.status))]
    pub async fn send(self) -> Result<(), StoreError> {
        self.store.publish_position(&self.game_id, &self.update).await
    }

    /// The update being sent.
    pub fn update(&self) -> &PositionUpdate {
        &self.update
    }
}

/// A move applied locally, with the publish still to run.
#[derive(Debug, Clone)]
pub struct Submitted {
    /// The accepted move.
    pub accepted: AcceptedMove,
    /// Publish to run; `None` in offline mode.
    pub publish: Option<PendingPublish>,
}

/// Errors from resetting a game.
#[derive(Debug, Clone, Display, From)]
pub enum ResetError {
    /// The game is still being played.
    #[display("Game is {}; pass --force to reset it anyway", _0)]
    #[from(ignore)]
    InProgress(GameStatus),
    /// The store failed.
    #[display("{}", _0)]
    Store(StoreError),
}

impl std::error::Error for ResetError {}

/// Puts a fresh game in the store.
///
/// A game that is waiting or active is only replaced when `force` is set;
/// a finished or missing game is always replaced.
///
/// # Errors
///
/// Returns [`ResetError::InProgress`] when refusing, or the store's error.
#[instrument(skip(store))]
pub async fn reset_game(
    store: &dyn SessionStore,
    game_id: &str,
    force: bool,
) -> Result<GameRecord, ResetError> {
    if let Some(existing) = store.fetch(game_id).await? {
        let status = existing.status();
        if status != GameStatus::Finished && !force {
            warn!(status = %status, "Refusing to reset a game in progress");
            return Err(ResetError::InProgress(status));
        }
    }
    let record = GameRecord::initial();
    store.write(game_id, &record).await?;
    info!("Game reset");
    Ok(record)
}

/// A session's view of the shared game: identity, role, and the
/// last-known-good position.
#[derive(Debug)]
pub struct SessionContext {
    session_id: SessionId,
    game_id: String,
    store: Option<Arc<dyn SessionStore>>,
    subscription: Option<Subscription>,
    validator: Arc<dyn MoveValidator>,
    connection_state: ConnectionState,
    mode: GateMode,
    role: Option<Role>,
    position: String,
    players: Players,
    status: GameStatus,
    selection: Option<Selection>,
    publish_pending: bool,
    deferred: Option<GameRecord>,
}

impl SessionContext {
    /// Starts a local game with no store. The user plays both sides.
    #[instrument(skip(validator))]
    pub fn offline(game_id: String, validator: Arc<dyn MoveValidator>) -> Self {
        info!("Starting in offline mode");
        Self {
            session_id: SessionId::generate(),
            game_id,
            store: None,
            subscription: None,
            validator,
            connection_state: ConnectionState::Disconnected,
            mode: GateMode::Offline,
            role: Some(Role::White),
            position: STARTING_FEN.to_string(),
            players: Players::default(),
            status: GameStatus::Active,
            selection: None,
            publish_pending: false,
            deferred: None,
        }
    }

    /// Subscribes `session_id` to `game_id` in `store`.
    ///
    /// The session holds no role until the first snapshot is handled.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the subscription cannot be opened.
    #[instrument(skip(store, validator), fields(session_id = %session_id))]
    pub async fn connect(
        session_id: SessionId,
        game_id: String,
        store: Arc<dyn SessionStore>,
        validator: Arc<dyn MoveValidator>,
    ) -> Result<Self, StoreError> {
        let mut ctx = Self {
            session_id,
            game_id,
            store: None,
            subscription: None,
            validator,
            connection_state: ConnectionState::Connecting,
            mode: GateMode::Seated,
            role: None,
            position: STARTING_FEN.to_string(),
            players: Players::default(),
            status: GameStatus::WaitingForOpponent,
            selection: None,
            publish_pending: false,
            deferred: None,
        };

        let subscription = store.subscribe(&ctx.game_id).await?;
        ctx.store = Some(store);
        ctx.subscription = Some(subscription);
        ctx.connection_state = ConnectionState::Connected;
        info!(game_id = %ctx.game_id, "Session connected");
        Ok(ctx)
    }

    /// Stops listening to the store. The session keeps its last-known
    /// position but can no longer publish.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.store = None;
        self.connection_state = ConnectionState::Disconnected;
        info!("Session disconnected");
    }

    /// Waits for the next store notification. Never resolves when
    /// disconnected.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next_snapshot().await,
            None => std::future::pending().await,
        }
    }

    /// Handles one store notification and returns the status line to show.
    #[instrument(skip(self, snapshot), fields(session_id = %self.session_id))]
    pub async fn handle_snapshot(&mut self, snapshot: Snapshot) -> String {
        match snapshot {
            Err(e) => {
                error!(error = %e, "Store listener error");
                format!("Error loading game: {}", e.message)
            }
            Ok(None) => self.initialize_game().await,
            Ok(Some(record)) => self.apply_record(record).await,
        }
    }

    /// Creates the game document when the store has none.
    async fn initialize_game(&mut self) -> String {
        let Some(store) = self.store.clone() else {
            return "No game to load.".to_string();
        };
        info!("No existing game state found; initializing");
        match store.create_if_absent(&self.game_id, &GameRecord::initial()).await {
            Ok(true) => "Started a new game. Waiting for players.".to_string(),
            Ok(false) => {
                debug!("Another session created the game first");
                "Joining game.".to_string()
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize game");
                format!("Error initializing game: {}", e.message)
            }
        }
    }

    /// Adopts a record from the store and settles this session's role.
    async fn apply_record(&mut self, record: GameRecord) -> String {
        let mut notice = None;
        match self.validator.side_to_move(record.position()) {
            Ok(_) if self.publish_pending => {
                debug!("Publish in flight; deferring remote position");
                self.deferred = Some(record.clone());
            }
            Ok(_) => self.adopt_position(record.position()),
            Err(e) => {
                warn!(error = %e, "Remote position is invalid; keeping last-known-good");
                notice = Some("ERROR: Invalid Game State.".to_string());
            }
        }
        self.players = record.players().clone();
        self.status = record.status();

        // A record without a readable position cannot be written back, so
        // no seat is claimed against it.
        if let Some(notice) = notice {
            return notice;
        }

        if let Err(message) = self.settle_role(record).await {
            return message;
        }

        let turn = self
            .turn()
            .map(|side| side.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let role = self
            .role
            .map(|role| role.to_string())
            .unwrap_or_else(|| "unassigned".to_string());
        format!(
            "Game Loaded! Status: {}. Current Turn: {}. You are {}.",
            self.status, turn, role
        )
    }

    fn adopt_position(&mut self, position: &str) {
        if position != self.position {
            debug!("Adopting remote position");
            self.position = position.to_string();
            self.selection = None;
        }
    }

    /// Runs the role arbitrator, submitting claims until the role settles.
    /// A seat lost to another session is retried against the winning record;
    /// with two seats this ends within two rounds.
    async fn settle_role(&mut self, mut record: GameRecord) -> Result<(), String> {
        for _ in 0..=2 {
            let Reconciliation { role, claim } = reconcile(&record, &self.session_id);
            let Some(claim) = claim else {
                self.set_role(role);
                return Ok(());
            };
            let Some(store) = self.store.clone() else {
                return Err("Cannot claim a seat while disconnected.".to_string());
            };

            match store
                .claim_slot(&self.game_id, claim.side, &self.session_id)
                .await
            {
                Ok(ClaimOutcome::Claimed(claimed)) => {
                    info!(side = %claim.side, "Seat claimed");
                    self.players = claimed.players().clone();
                    self.status = claimed.status();
                    self.set_role(role);
                    return Ok(());
                }
                Ok(ClaimOutcome::Taken(current)) => {
                    info!(side = %claim.side, "Seat taken by another session; retrying");
                    self.players = current.players().clone();
                    self.status = current.status();
                    record = current;
                }
                Err(e) => {
                    error!(error = %e, "Seat claim failed");
                    return Err(format!("Could not claim a seat: {}", e.message));
                }
            }
        }
        warn!("Role did not settle");
        Err("Could not settle a player role.".to_string())
    }

    fn set_role(&mut self, role: Role) {
        if self.role != Some(role) {
            info!(role = %role, "Role assigned");
        }
        self.role = Some(role);
    }

    /// Picks up the piece on `square` and lists where it can go.
    ///
    /// An empty square clears the selection and returns no targets.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] if the session may not move now or the piece
    /// belongs to the other side. The selection is cleared.
    #[instrument(skip(self), fields(session_id = %self.session_id, square = %square))]
    pub fn select(&mut self, square: Square) -> Result<Vec<Square>, MoveError> {
        self.selection = None;
        let turn = self.turn().map_err(MoveError::InvalidPosition)?;
        check_gate(self.role, turn, self.mode)?;

        let Some(piece) = piece_at(&self.position, square) else {
            debug!("Empty square selected");
            return Ok(Vec::new());
        };
        let owner = if piece.is_ascii_uppercase() {
            Side::White
        } else {
            Side::Black
        };
        let mover = match self.mode {
            GateMode::Offline => turn,
            GateMode::Seated => self.role.and_then(Role::side).unwrap_or(turn),
        };
        if owner != mover {
            debug!(owner = %owner, "Selected an opposing piece");
            return Err(MoveError::NotYourPiece { side: mover });
        }

        let targets: Vec<Square> = self
            .validator
            .moves_from(&self.position, square)
            .map_err(MoveError::InvalidPosition)?
            .into_iter()
            .map(|m| m.to)
            .collect();
        debug!(count = targets.len(), "Piece selected");
        self.selection = Some(Selection {
            from: square,
            targets: targets.clone(),
        });
        Ok(targets)
    }

    /// Moves the selected piece to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::NothingSelected`] if nothing is selected, otherwise
    /// whatever [`SessionContext::submit_move`] returns.
    pub fn move_selected(&mut self, to: Square) -> Result<Submitted, MoveError> {
        match self.selection.take() {
            Some(selection) => self.submit_move(selection.from, to),
            None => Err(MoveError::NothingSelected),
        }
    }

    /// Gates, validates and applies a move, returning the publish to run.
    ///
    /// The local position changes immediately. The opponent sees the move
    /// once the publish lands and their subscription delivers it.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] if the move is refused; local state is unchanged
    /// apart from the selection being cleared.
    #[instrument(skip(self), fields(session_id = %self.session_id, from = %from, to = %to))]
    pub fn submit_move(&mut self, from: Square, to: Square) -> Result<Submitted, MoveError> {
        self.selection = None;
        if self.publish_pending {
            debug!("Previous publish still in flight");
            return Err(MoveError::PublishPending);
        }
        let turn = self.turn().map_err(MoveError::InvalidPosition)?;

        let accepted = submit_move(
            self.validator.as_ref(),
            &self.position,
            self.role,
            turn,
            from,
            to,
            self.mode,
        )?;

        self.position = accepted.position.clone();
        if accepted.outcome.is_some() {
            self.status = GameStatus::Finished;
        }

        let publish = self.store.clone().map(|store| {
            self.publish_pending = true;
            PendingPublish {
                store,
                game_id: self.game_id.clone(),
                update: PositionUpdate {
                    position: accepted.position.clone(),
                    status: self.status,
                },
            }
        });

        Ok(Submitted { accepted, publish })
    }

    /// Records how a publish ended. Returns a status line on failure.
    ///
    /// A failed publish is not rolled back: the local board keeps the move
    /// until the next snapshot from the store replaces it. The newest
    /// snapshot that arrived while the publish was in flight counts as that
    /// next snapshot and is adopted here.
    #[instrument(skip(self, result), fields(session_id = %self.session_id))]
    pub fn finish_publish(&mut self, result: Result<(), StoreError>) -> Option<String> {
        self.publish_pending = false;
        if let Some(record) = self.deferred.take() {
            debug!("Applying snapshot deferred during publish");
            self.adopt_position(record.position());
            self.players = record.players().clone();
            self.status = record.status();
        }
        match result {
            Ok(()) => {
                debug!("Move published");
                None
            }
            Err(e) => {
                error!(error = %e, "Publishing move failed");
                Some(format!("Failed to sync move: {}", e.message))
            }
        }
    }

    /// This session's identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The game this session is attached to.
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Role, once assigned.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Last-known-good position.
    pub fn position(&self) -> &str {
        &self.position
    }

    /// Seats as last seen in the store.
    pub fn players(&self) -> &Players {
        &self.players
    }

    /// Match status as last seen (or set by a local game-ending move).
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Store connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Current selection, if a piece is picked up.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// True while a publish is in flight.
    pub fn is_publish_pending(&self) -> bool {
        self.publish_pending
    }

    /// Side to move in the local position.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError`] if the local position is unreadable.
    pub fn turn(&self) -> Result<Side, PositionError> {
        self.validator.side_to_move(&self.position)
    }

    /// Where this session stands in the match.
    pub fn phase(&self) -> SessionPhase {
        match (self.role, self.mode) {
            (None, _) => SessionPhase::Unassigned,
            (Some(_), GateMode::Offline) => SessionPhase::AssignedActive,
            (Some(Role::Observer), _) => SessionPhase::Observing,
            (Some(_), GateMode::Seated) if self.players.is_full() => SessionPhase::AssignedActive,
            (Some(_), GateMode::Seated) => SessionPhase::AssignedWaiting,
        }
    }

    /// Whose turn it is for this session. `None` unless actively playing.
    pub fn turn_indicator(&self) -> Option<TurnIndicator> {
        if self.phase() != SessionPhase::AssignedActive {
            return None;
        }
        let turn = self.turn().ok()?;
        let mine = self.mode == GateMode::Offline || self.role.is_some_and(|r| r.plays(turn));
        Some(if mine {
            TurnIndicator::MyTurn
        } else {
            TurnIndicator::TheirTurn
        })
    }
}
