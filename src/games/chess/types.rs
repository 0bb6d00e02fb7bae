//! Core domain types for the chess match.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

/// A side of the board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Side {
    /// White moves first.
    White,
    /// Black.
    Black,
}

impl Side {
    /// Returns the opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Parses the side-to-move field of a FEN string (`w` or `b`).
    #[instrument]
    pub fn from_fen_field(field: &str) -> Option<Self> {
        match field {
            "w" => Some(Side::White),
            "b" => Some(Side::Black),
            _ => None,
        }
    }
}

/// A session's authorization scope in a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Role {
    /// Seated as White.
    White,
    /// Seated as Black.
    Black,
    /// May view the board but never move.
    Observer,
}

impl Role {
    /// Returns the side this role plays, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Role::White => Some(Side::White),
            Role::Black => Some(Side::Black),
            Role::Observer => None,
        }
    }

    /// Returns true if this role plays the given side.
    pub fn plays(self, side: Side) -> bool {
        self.side() == Some(side)
    }
}

impl From<Side> for Role {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Role::White,
            Side::Black => Role::Black,
        }
    }
}

/// Piece a pawn becomes when it reaches the last rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum Promotion {
    /// Queen. The only choice offered to players.
    #[default]
    Queen,
    /// Rook.
    Rook,
    /// Bishop.
    Bishop,
    /// Knight.
    Knight,
}

/// A board square in algebraic coordinates (`a1` through `h8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Creates a square from zero-based file and rank indices.
    pub fn new(file: u8, rank: u8) -> Result<Self, SquareError> {
        if file > 7 || rank > 7 {
            return Err(SquareError::new(format!("({}, {})", file, rank)));
        }
        Ok(Self { file, rank })
    }

    /// Zero-based file index (`a` = 0).
    pub fn file(&self) -> u8 {
        self.file
    }

    /// Zero-based rank index (rank `1` = 0).
    pub fn rank(&self) -> u8 {
        self.rank
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

impl FromStr for Square {
    type Err = SquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        match bytes {
            [file @ b'a'..=b'h', rank @ b'1'..=b'8'] => Ok(Self {
                file: file - b'a',
                rank: rank - b'1',
            }),
            _ => Err(SquareError::new(s)),
        }
    }
}

impl TryFrom<String> for Square {
    type Error = SquareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<shakmaty::Square> for Square {
    fn from(square: shakmaty::Square) -> Self {
        Self {
            file: square.file() as u8,
            rank: square.rank() as u8,
        }
    }
}

impl From<Square> for shakmaty::Square {
    fn from(square: Square) -> Self {
        shakmaty::Square::from_coords(
            shakmaty::File::new(u32::from(square.file)),
            shakmaty::Rank::new(u32::from(square.rank)),
        )
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

/// A square name that is not on the board.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Not a board square: '{}'", input)]
pub struct SquareError {
    /// The rejected input.
    pub input: String,
}

impl SquareError {
    /// Creates a new square error for the given input.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}
