//! In-process session store.

use super::{
    ClaimOutcome, PositionUpdate, SessionStore, StoreError, Subscription, resolve_claim,
};
use crate::games::chess::Side;
use crate::record::{GameRecord, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Session store held in memory and shared by cloning.
///
/// Every operation runs under one lock, so claims are atomic. Subscribers
/// see changes in write order.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    games: Arc<Mutex<HashMap<String, GameRecord>>>,
    changes: broadcast::Sender<(String, GameRecord)>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory session store");
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            games: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    /// Stores `record` and notifies subscribers. Caller holds the lock.
    fn commit(&self, games: &mut HashMap<String, GameRecord>, game_id: &str, record: GameRecord) {
        games.insert(game_id.to_string(), record.clone());
        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send((game_id.to_string(), record));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    #[instrument(skip(self))]
    async fn fetch(&self, game_id: &str) -> Result<Option<GameRecord>, StoreError> {
        let games = self.games.lock().await;
        Ok(games.get(game_id).cloned())
    }

    #[instrument(skip(self, record))]
    async fn write(&self, game_id: &str, record: &GameRecord) -> Result<(), StoreError> {
        let mut games = self.games.lock().await;
        self.commit(&mut games, game_id, record.clone());
        debug!(status = %record.status(), "Record written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, game_id: &str) -> Result<Subscription, StoreError> {
        // Take the receiver under the lock so no write lands between the
        // initial snapshot and the first notification.
        let games = self.games.lock().await;
        let mut changes = self.changes.subscribe();
        let current = games.get(game_id).cloned();
        drop(games);

        let store = self.clone();
        let game_id = game_id.to_string();
        info!(game_id = %game_id, "Subscribed");

        Ok(Subscription::spawn(move |tx| async move {
            if tx.send(Ok(current)).await.is_err() {
                return;
            }
            loop {
                let snapshot = match changes.recv().await {
                    Ok((id, record)) if id == game_id => Some(record),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subscriber lagged; resending latest");
                        store.games.lock().await.get(&game_id).cloned()
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(Ok(snapshot)).await.is_err() {
                    break;
                }
            }
        }))
    }

    #[instrument(skip(self, record))]
    async fn create_if_absent(&self, game_id: &str, record: &GameRecord) -> Result<bool, StoreError> {
        let mut games = self.games.lock().await;
        if games.contains_key(game_id) {
            return Ok(false);
        }
        self.commit(&mut games, game_id, record.clone());
        info!("Game created");
        Ok(true)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn claim_slot(
        &self,
        game_id: &str,
        side: Side,
        session_id: &SessionId,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut games = self.games.lock().await;
        let mut record = games
            .get(game_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(game_id))?;

        let (outcome, changed) = resolve_claim(&mut record, side, session_id);
        if changed {
            self.commit(&mut games, game_id, record);
        }
        Ok(outcome)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn publish_position(&self, game_id: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        let mut games = self.games.lock().await;
        let mut record = games
            .get(game_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(game_id))?;
        record.set_position(update.position.clone());
        record.set_status(update.status);
        self.commit(&mut games, game_id, record);
        Ok(())
    }
}
