//! Database row models.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::{DbError, DbErrorKind, schema};
use crate::games::chess::Side;
use crate::record::{GameRecord, GameStatus, Players, SessionId};

/// A stored game document.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::game_records)]
#[diesel(primary_key(game_id))]
pub struct GameRow {
    game_id: String,
    position: String,
    turn: String,
    white: Option<String>,
    black: Option<String>,
    status: String,
    updated_at: NaiveDateTime,
}

impl GameRow {
    /// Converts the row into a [`GameRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the stored status is unknown.
    #[instrument(skip(self), fields(game_id = %self.game_id))]
    pub fn to_record(&self) -> Result<GameRecord, DbError> {
        let status: GameStatus = self.status.parse().map_err(|_| {
            DbError::new(
                DbErrorKind::Corrupt,
                format!("Unknown status '{}' for game '{}'", self.status, self.game_id),
            )
        })?;
        let players = Players {
            white: self.white.clone().map(SessionId::from),
            black: self.black.clone().map(SessionId::from),
        };
        Ok(GameRecord::new(self.position.clone(), players, status))
    }
}

/// Insertable game row.
#[derive(Debug, Clone, Insertable, AsChangeset, new, Getters)]
#[diesel(table_name = schema::game_records)]
#[diesel(primary_key(game_id))]
#[diesel(treat_none_as_null = true)]
pub struct NewGameRow {
    game_id: String,
    position: String,
    turn: String,
    white: Option<String>,
    black: Option<String>,
    status: String,
}

impl NewGameRow {
    /// Builds a row for `record` under `game_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the record's position has no side to move.
    #[instrument(skip(record))]
    pub fn from_record(game_id: &str, record: &GameRecord) -> Result<Self, DbError> {
        let turn: Side = record
            .turn()
            .map_err(|e| DbError::new(DbErrorKind::Corrupt, e.to_string()))?;
        Ok(Self::new(
            game_id.to_string(),
            record.position().to_string(),
            turn.to_string(),
            record.players().white.as_ref().map(|id| id.to_string()),
            record.players().black.as_ref().map(|id| id.to_string()),
            record.status().to_string(),
        ))
    }
}
