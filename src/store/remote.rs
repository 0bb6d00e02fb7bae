//! HTTP client for a session store served by `castle_chess serve`.

use super::{
    ClaimOutcome, PositionUpdate, SessionStore, StoreError, StoreErrorKind, Subscription,
};
use crate::games::chess::Side;
use crate::record::{GameDocument, GameRecord, SessionId};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a seat claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Seat to claim.
    pub side: Side,
    /// Claiming session.
    pub session_id: SessionId,
}

/// Reply to a seat claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    /// Whether the claimant holds the seat.
    pub claimed: bool,
    /// The document after the claim.
    pub record: GameDocument,
}

impl From<ClaimResponse> for ClaimOutcome {
    fn from(resp: ClaimResponse) -> Self {
        let record = GameRecord::from(resp.record);
        if resp.claimed {
            ClaimOutcome::Claimed(record)
        } else {
            ClaimOutcome::Taken(record)
        }
    }
}

/// Reply to a conditional create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Whether this request created the document.
    pub created: bool,
}

/// Session store reached over HTTP.
///
/// Claims and position updates are executed server-side against the
/// server's own store, so they are as atomic as that store. Subscriptions
/// poll.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl RemoteStore {
    /// Creates a client for the server at `base_url`. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] of kind `Unavailable` if the HTTP client
    /// cannot be built.
    #[instrument(skip(base_url), fields(base_url = %base_url))]
    pub fn connect(base_url: String, poll_interval: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::new(StoreErrorKind::Unavailable, e.to_string()))?;
        info!("Remote session store configured");
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            poll_interval,
        })
    }

    fn url(&self, game_id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/games/{}/{}", self.base_url, game_id, action),
            None => format!("{}/games/{}", self.base_url, game_id),
        }
    }

    /// Maps a non-success status to a [`StoreError`].
    #[track_caller]
    fn status_error(game_id: &str, status: StatusCode) -> StoreError {
        if status == StatusCode::NOT_FOUND {
            StoreError::not_found(game_id)
        } else {
            StoreError::new(
                StoreErrorKind::Backend,
                format!("Server answered {} for game '{}'", status, game_id),
            )
        }
    }
}

#[async_trait]
impl SessionStore for RemoteStore {
    #[instrument(skip(self))]
    async fn fetch(&self, game_id: &str) -> Result<Option<GameRecord>, StoreError> {
        let response = self.client.get(self.url(game_id, None)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Game absent");
                Ok(None)
            }
            status if status.is_success() => {
                let doc: GameDocument = response.json().await?;
                Ok(Some(GameRecord::from(doc)))
            }
            status => Err(Self::status_error(game_id, status)),
        }
    }

    #[instrument(skip(self, record))]
    async fn write(&self, game_id: &str, record: &GameRecord) -> Result<(), StoreError> {
        let doc = GameDocument::try_from(record)?;
        let response = self
            .client
            .put(self.url(game_id, None))
            .json(&doc)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(game_id, response.status()));
        }
        Ok(())
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
        let doc = GameDocument::try_from(record)?;
        let response = self
            .client
            .post(self.url(game_id, Some("create")))
            .json(&doc)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(game_id, response.status()));
        }
        let body: CreateResponse = response.json().await?;
        Ok(body.created)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn claim_slot(
        &self,
        game_id: &str,
        side: Side,
        session_id: &SessionId,
    ) -> Result<ClaimOutcome, StoreError> {
        let request = ClaimRequest {
            side,
            session_id: session_id.clone(),
        };
        let response = self
            .client
            .post(self.url(game_id, Some("claim")))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(game_id, response.status()));
        }
        let body: ClaimResponse = response.json().await?;
        if !body.claimed {
            warn!("Seat claim lost");
        }
        Ok(body.into())
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn publish_position(&self, game_id: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url(game_id, Some("position")))
            .json(update)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(game_id, response.status()));
        }
        Ok(())
    }
}
