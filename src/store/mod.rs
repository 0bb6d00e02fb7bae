//! Session stores: where the shared game document lives.

mod error;
mod memory;
mod remote;
mod sqlite;
mod subscription;

pub use error::{StoreError, StoreErrorKind};
pub use memory::MemoryStore;
pub use remote::{ClaimRequest, ClaimResponse, CreateResponse, RemoteStore};
pub use sqlite::SqliteStore;
pub use subscription::{Snapshot, Subscription};

use crate::config::{ClientConfig, StoreKind};
use crate::games::chess::Side;
use crate::record::{GameRecord, GameStatus, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of asking the store to seat a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The session holds the seat. Carries the record after the claim.
    Claimed(GameRecord),
    /// Someone else got there first, or the session already holds the
    /// other seat. Carries the current record.
    Taken(GameRecord),
}

impl ClaimOutcome {
    /// The record carried by either outcome.
    pub fn record(&self) -> &GameRecord {
        match self {
            ClaimOutcome::Claimed(record) | ClaimOutcome::Taken(record) => record,
        }
    }
}

/// Applies a seat claim to `record` in place.
///
/// Returns the outcome and whether `record` changed. A session already seated
/// on `side` gets `Claimed` without a change; one seated on the other side
/// is never moved.
#[instrument(skip(record), fields(session_id = %session_id, side = %side))]
pub fn resolve_claim(
    record: &mut GameRecord,
    side: Side,
    session_id: &SessionId,
) -> (ClaimOutcome, bool) {
    match record.players().side_of(session_id) {
        Some(held) if held == side => {
            return (ClaimOutcome::Claimed(record.clone()), false);
        }
        Some(held) => {
            debug!(held = %held, "Session already holds the other seat");
            return (ClaimOutcome::Taken(record.clone()), false);
        }
        None => {}
    }

    if record.seat(side, session_id.clone()) {
        (ClaimOutcome::Claimed(record.clone()), true)
    } else {
        debug!("Seat already taken");
        (ClaimOutcome::Taken(record.clone()), false)
    }
}

/// Body of a position update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// FEN of the new position.
    pub position: String,
    /// Match status after the move.
    pub status: GameStatus,
}

/// A remote, subscribable document store keyed by game id.
///
/// Only `fetch`, `write` and `subscribe` are required. The conditional
/// operations have last-write-wins defaults built from those three;
/// implementations with an atomic primitive should override them.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Reads the game document. `None` if absent.
    async fn fetch(&self, game_id: &str) -> Result<Option<GameRecord>, StoreError>;

    /// Overwrites the game document unconditionally.
    async fn write(&self, game_id: &str, record: &GameRecord) -> Result<(), StoreError>;

    /// Subscribes to changes of the game document. The first snapshot is the
    /// document's current state.
    async fn subscribe(&self, game_id: &str) -> Result<Subscription, StoreError>;

    /// Creates the document unless it already exists. Returns true if created.
    async fn create_if_absent(&self, game_id: &str, record: &GameRecord) -> Result<bool, StoreError> {
        if self.fetch(game_id).await?.is_some() {
            return Ok(false);
        }
        self.write(game_id, record).await?;
        Ok(true)
    }

    /// Seats `session_id` on `side` if the seat is open.
    ///
    /// The default reads then writes, so two concurrent claimants can both
    /// believe they won; the later write silently replaces the earlier.
    async fn claim_slot(
        &self,
        game_id: &str,
        side: Side,
        session_id: &SessionId,
    ) -> Result<ClaimOutcome, StoreError> {
        warn!(game_id, "Claiming without an atomic primitive; last write wins");
        let mut record = self
            .fetch(game_id)
            .await?
            .ok_or_else(|| StoreError::not_found(game_id))?;
        let (outcome, changed) = resolve_claim(&mut record, side, session_id);
        if changed {
            self.write(game_id, &record).await?;
        }
        Ok(outcome)
    }

    /// Replaces the position and status, leaving the seats untouched.
    async fn publish_position(&self, game_id: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        let mut record = self
            .fetch(game_id)
            .await?
            .ok_or_else(|| StoreError::not_found(game_id))?;
        record.set_position(update.position.clone());
        record.set_status(update.status);
        self.write(game_id, &record).await
    }
}

/// Opens the backend named in `config`. `None` for the offline store.
///
/// # Errors
///
/// Returns a [`StoreError`] if the backend cannot be opened.
#[instrument(skip(config), fields(store = %config.store()))]
pub async fn open_store(
    config: &ClientConfig,
) -> Result<Option<Arc<dyn SessionStore>>, StoreError> {
    let store: Arc<dyn SessionStore> = match config.store() {
        StoreKind::Offline => return Ok(None),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Sqlite => {
            Arc::new(SqliteStore::open(config.db_path().clone(), config.poll_interval()).await?)
        }
        StoreKind::Remote => Arc::new(RemoteStore::connect(
            config.store_url().clone(),
            config.poll_interval(),
        )?),
    };
    Ok(Some(store))
}
