//! The shared game document and its wire form.

use crate::games::chess::{PositionError, STARTING_FEN, Side};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// Opaque identifier of one connection to the shared game.
///
/// Generated locally; not cryptographically meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    #[instrument]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum GameStatus {
    /// At most one seat is filled.
    #[default]
    WaitingForOpponent,
    /// Both seats are filled.
    Active,
    /// The game ended. Advisory only.
    Finished,
}

/// The two player seats.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Players {
    /// Session seated as White.
    pub white: Option<SessionId>,
    /// Session seated as Black.
    pub black: Option<SessionId>,
}

impl Players {
    /// Returns the occupant of the seat for `side`.
    pub fn seat(&self, side: Side) -> Option<&SessionId> {
        match side {
            Side::White => self.white.as_ref(),
            Side::Black => self.black.as_ref(),
        }
    }

    /// Returns true once both seats are occupied.
    pub fn is_full(&self) -> bool {
        self.white.is_some() && self.black.is_some()
    }

    /// Returns the side `session_id` is seated on, if any.
    pub fn side_of(&self, session_id: &SessionId) -> Option<Side> {
        if self.white.as_ref() == Some(session_id) {
            Some(Side::White)
        } else if self.black.as_ref() == Some(session_id) {
            Some(Side::Black)
        } else {
            None
        }
    }
}

/// The single shared document representing a match.
///
/// The side to move is not stored separately: [`GameRecord::turn`] reads it
/// from the position so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    position: String,
    players: Players,
    status: GameStatus,
}

impl GameRecord {
    /// Creates a record from its parts.
    pub fn new(position: impl Into<String>, players: Players, status: GameStatus) -> Self {
        Self {
            position: position.into(),
            players,
            status,
        }
    }

    /// A fresh match at the starting position with both seats open.
    #[instrument]
    pub fn initial() -> Self {
        Self::new(STARTING_FEN, Players::default(), GameStatus::WaitingForOpponent)
    }

    /// FEN of the current position.
    pub fn position(&self) -> &str {
        &self.position
    }

    /// Player seats.
    pub fn players(&self) -> &Players {
        &self.players
    }

    /// Match status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Side to move, read from the position's second field.
    #[instrument(skip(self), fields(position = %self.position))]
    pub fn turn(&self) -> Result<Side, PositionError> {
        self.position
            .split_whitespace()
            .nth(1)
            .and_then(Side::from_fen_field)
            .ok_or_else(|| PositionError::new(&self.position, "missing side to move"))
    }

    /// Replaces the position as a whole value.
    pub fn set_position(&mut self, position: impl Into<String>) {
        self.position = position.into();
    }

    /// Sets the match status.
    pub fn set_status(&mut self, status: GameStatus) {
        self.status = status;
    }

    /// Seats `session_id` on `side`. Moves a waiting match to `Active` once
    /// both seats are filled.
    ///
    /// Returns false without changing anything if the seat is taken.
    #[instrument(skip(self), fields(session_id = %session_id, side = %side))]
    pub fn seat(&mut self, side: Side, session_id: SessionId) -> bool {
        let slot = match side {
            Side::White => &mut self.players.white,
            Side::Black => &mut self.players.black,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(session_id);
        if self.players.is_full() && self.status == GameStatus::WaitingForOpponent {
            self.status = GameStatus::Active;
        }
        true
    }
}

impl Default for GameRecord {
    fn default() -> Self {
        Self::initial()
    }
}

/// Stored form of a [`GameRecord`].
///
/// Carries an explicit `turn` for readers that cannot parse FEN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDocument {
    /// FEN of the current position.
    pub position: String,
    /// Side to move.
    pub turn: Side,
    /// Player seats.
    pub players: Players,
    /// Match status.
    pub status: GameStatus,
}

impl TryFrom<&GameRecord> for GameDocument {
    type Error = PositionError;

    fn try_from(record: &GameRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            position: record.position.clone(),
            turn: record.turn()?,
            players: record.players.clone(),
            status: record.status,
        })
    }
}

impl From<GameDocument> for GameRecord {
    fn from(doc: GameDocument) -> Self {
        let record = GameRecord::new(doc.position, doc.players, doc.status);
        match record.turn() {
            Ok(turn) if turn != doc.turn => {
                warn!(stored = %doc.turn, derived = %turn, "Stored turn disagrees with position; using position");
            }
            _ => {}
        }
        record
    }
}
