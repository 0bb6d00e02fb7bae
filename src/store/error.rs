//! Session store errors.

use crate::db::{DbError, DbErrorKind};
use crate::games::chess::PositionError;
use derive_more::{Display, Error};
use tracing::instrument;

/// Category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StoreErrorKind {
    /// The store cannot be reached or is not configured.
    #[display("unavailable")]
    Unavailable,
    /// The game document does not exist.
    #[display("not found")]
    NotFound,
    /// The store reached but failed the request.
    #[display("backend")]
    Backend,
    /// The stored document could not be decoded.
    #[display("decode")]
    Decode,
}

/// Store error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store {} error: {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// Error category.
    pub kind: StoreErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new store error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a missing game document.
    #[track_caller]
    pub fn not_found(game_id: &str) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("No game '{}'", game_id))
    }

    /// True if the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        self.kind == StoreErrorKind::Unavailable
    }
}

impl From<DbError> for StoreError {
    #[track_caller]
    fn from(err: DbError) -> Self {
        let kind = match err.kind {
            DbErrorKind::Connection | DbErrorKind::Migration => StoreErrorKind::Unavailable,
            DbErrorKind::Corrupt => StoreErrorKind::Decode,
            DbErrorKind::Query => StoreErrorKind::Backend,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<PositionError> for StoreError {
    #[track_caller]
    fn from(err: PositionError) -> Self {
        Self::new(StoreErrorKind::Decode, err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() || err.is_timeout() {
            StoreErrorKind::Unavailable
        } else if err.is_decode() {
            StoreErrorKind::Decode
        } else {
            StoreErrorKind::Backend
        };
        Self::new(kind, err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(StoreErrorKind::Backend, format!("Store task failed: {}", err))
    }
}
