//! SQLite-backed session store.

use super::{
    ClaimOutcome, PositionUpdate, SessionStore, StoreError, Subscription, resolve_claim,
};
use crate::db::{GameRepository, NewGameRow};
use crate::games::chess::Side;
use crate::record::{GameRecord, SessionId};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};

/// Session store persisted in a SQLite file.
///
/// Conditional operations run in write-locked transactions, so concurrent
/// claimants (even in separate processes) cannot both win a seat.
/// Subscriptions poll the file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    repository: GameRepository,
    poll_interval: Duration,
}

impl SqliteStore {
    /// Opens (and migrates) the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] of kind `Unavailable` if the file cannot be
    /// opened.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub async fn open(db_path: String, poll_interval: Duration) -> Result<Self, StoreError> {
        let repository = tokio::task::spawn_blocking(move || GameRepository::open(db_path)).await??;
        info!(?poll_interval, "SQLite session store ready");
        Ok(Self {
            repository,
            poll_interval,
        })
    }

    /// Runs a blocking repository call off the async runtime.
    async fn blocking<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(GameRepository) -> Result<T, StoreError> + Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || call(repository)).await?
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip(self))]
    async fn fetch(&self, game_id: &str) -> Result<Option<GameRecord>, StoreError> {
        let game_id = game_id.to_string();
        self.blocking(move |repo| {
            repo.get(&game_id)?
                .map(|row| row.to_record().map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    #[instrument(skip(self, record))]
    async fn write(&self, game_id: &str, record: &GameRecord) -> Result<(), StoreError> {
        let row = NewGameRow::from_record(game_id, record)?;
        self.blocking(move |repo| Ok(repo.upsert(&row)?)).await
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, game_id: &str) -> Result<Subscription, StoreError> {
        let store = self.clone();
        let game_id = game_id.to_string();
        info!(game_id = %game_id, "Subscribed by polling");
        Ok(Subscription::polling(self.poll_interval, move || {
            let store = store.clone();
            let game_id = game_id.clone();
            async move { store.fetch(&game_id).await }
        }))
    }

    #[instrument(skip(self, record))]
    async fn create_if_absent(&self, game_id: &str, record: &GameRecord) -> Result<bool, StoreError> {
        let row = NewGameRow::from_record(game_id, record)?;
        self.blocking(move |repo| Ok(repo.insert_if_absent(&row)?)).await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn claim_slot(
        &self,
        game_id: &str,
        side: Side,
        session_id: &SessionId,
    ) -> Result<ClaimOutcome, StoreError> {
        let id = game_id.to_string();
        let session_id = session_id.clone();
        let result = self
            .blocking(move |repo| {
                let mut outcome = None;
                let modified = repo.modify(&id, |record| {
                    let (claim, changed) = resolve_claim(record, side, &session_id);
                    outcome = Some(claim);
                    changed
                })?;
                Ok(modified.and(outcome))
            })
            .await?;
        result.ok_or_else(|| StoreError::not_found(game_id))
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn publish_position(&self, game_id: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        let id = game_id.to_string();
        let update = update.clone();
        let modified = self
            .blocking(move |repo| {
                Ok(repo.modify(&id, |record| {
                    record.set_position(update.position);
                    record.set_status(update.status);
                    true
                })?)
            })
            .await?;
        modified
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(game_id))
    }
}
