//! Move validation backed by the `shakmaty` rules engine.
//!
//! Positions cross this boundary as FEN strings only. The validator owns no
//! state of its own: every call parses the position it is handed, so the
//! shared game document stays the single source of truth.

use super::types::{Promotion, Side, Square};
use derive_more::{Display, Error};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, File, Move, Position};
use tracing::{debug, instrument, warn};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A legal move available from a square.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    /// Origin square.
    pub from: Square,
    /// Destination square (the king's destination for castling).
    pub to: Square,
    /// Standard algebraic notation of the move.
    pub san: String,
    /// Promotion piece, when the move promotes.
    pub promotion: Option<Promotion>,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GameOutcome {
    /// The side to move is mated.
    #[display("Checkmate. {} wins.", winner)]
    Checkmate {
        /// Side delivering mate.
        winner: Side,
    },
    /// The side to move has no legal moves and is not in check.
    #[display("Stalemate.")]
    Stalemate,
    /// Neither side can mate.
    #[display("Draw by insufficient material.")]
    InsufficientMaterial,
}

/// Result of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// FEN of the resulting position.
    pub position: String,
    /// Standard algebraic notation of the move that was played.
    pub san: String,
    /// Side to move in the resulting position.
    pub side_to_move: Side,
    /// Set when the resulting position ends the game.
    pub outcome: Option<GameOutcome>,
}

/// A position string the engine cannot load.
#[derive(Debug, Clone, Display, Error)]
#[display("Invalid position '{}': {} at {}:{}", fen, message, file, line)]
pub struct PositionError {
    /// The rejected FEN.
    pub fen: String,
    /// Engine diagnostic.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl PositionError {
    /// Creates a new position error with caller location tracking.
    #[track_caller]
    #[instrument(skip(fen, message))]
    pub fn new(fen: impl Into<String>, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            fen: fen.into(),
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Reasons the validator refuses a move.
#[derive(Debug, Clone, Display)]
pub enum MoveRejected {
    /// The position itself could not be loaded.
    #[display("{}", _0)]
    InvalidPosition(PositionError),
    /// No legal move connects the two squares.
    #[display("No legal move from {} to {}", from, to)]
    NoSuchMove {
        /// Requested origin.
        from: Square,
        /// Requested destination.
        to: Square,
    },
}

impl std::error::Error for MoveRejected {}

/// Rules collaborator consulted by the move pipeline.
pub trait MoveValidator: Send + Sync + std::fmt::Debug {
    /// Lists the legal moves of the piece standing on `square`.
    fn moves_from(&self, position: &str, square: Square) -> Result<Vec<LegalMove>, PositionError>;

    /// Applies the move `from`→`to`, promoting to `promotion` when a pawn
    /// reaches the last rank.
    fn apply_move(
        &self,
        position: &str,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> Result<AppliedMove, MoveRejected>;

    /// Returns the side to move in `position`.
    fn side_to_move(&self, position: &str) -> Result<Side, PositionError>;

    /// Returns how the game ended, if `position` is terminal.
    fn outcome(&self, position: &str) -> Result<Option<GameOutcome>, PositionError>;
}

/// Standard-chess validator using `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyValidator;

impl ShakmatyValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self
    }

    #[instrument(level = "trace")]
    fn load(position: &str) -> Result<Chess, PositionError> {
        let fen: Fen = position
            .parse()
            .map_err(|e: shakmaty::fen::ParseFenError| PositionError::new(position, e.to_string()))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| PositionError::new(position, e.to_string()))
    }

    fn side(color: Color) -> Side {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    /// Destination as a player would click it: castling moves land on the
    /// king's target square rather than the rook.
    fn destination(m: &Move) -> shakmaty::Square {
        match *m {
            Move::Castle { king, rook } => {
                let file = if (rook.file() as u8) > (king.file() as u8) {
                    File::G
                } else {
                    File::C
                };
                shakmaty::Square::from_coords(file, king.rank())
            }
            _ => m.to(),
        }
    }

    fn promotion(m: &Move) -> Option<Promotion> {
        m.promotion().map(|role| match role {
            shakmaty::Role::Rook => Promotion::Rook,
            shakmaty::Role::Bishop => Promotion::Bishop,
            shakmaty::Role::Knight => Promotion::Knight,
            _ => Promotion::Queen,
        })
    }

    fn outcome_of(pos: &Chess) -> Option<GameOutcome> {
        if pos.is_checkmate() {
            Some(GameOutcome::Checkmate {
                winner: Self::side(pos.turn()).opponent(),
            })
        } else if pos.is_stalemate() {
            Some(GameOutcome::Stalemate)
        } else if pos.is_insufficient_material() {
            Some(GameOutcome::InsufficientMaterial)
        } else {
            None
        }
    }
}

impl MoveValidator for ShakmatyValidator {
    #[instrument(skip(self), fields(square = %square))]
    fn moves_from(&self, position: &str, square: Square) -> Result<Vec<LegalMove>, PositionError> {
        let pos = Self::load(position)?;
        let origin = shakmaty::Square::from(square);

        let moves: Vec<LegalMove> = pos
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(origin))
            .filter(|m| matches!(Self::promotion(m), None | Some(Promotion::Queen)))
            .map(|m| LegalMove {
                from: square,
                to: Square::from(Self::destination(m)),
                san: San::from_move(&pos, m).to_string(),
                promotion: Self::promotion(m),
            })
            .collect();

        debug!(count = moves.len(), "Listed legal moves");
        Ok(moves)
    }

    #[instrument(skip(self), fields(from = %from, to = %to, promotion = %promotion))]
    fn apply_move(
        &self,
        position: &str,
        from: Square,
        to: Square,
        promotion: Promotion,
    ) -> Result<AppliedMove, MoveRejected> {
        let pos = Self::load(position).map_err(MoveRejected::InvalidPosition)?;
        let origin = shakmaty::Square::from(from);
        let target = shakmaty::Square::from(to);

        let legal = pos.legal_moves();
        let chosen = legal.iter().find(|m| {
            m.from() == Some(origin)
                && Self::destination(m) == target
                && Self::promotion(m).is_none_or(|p| p == promotion)
        });

        let Some(m) = chosen else {
            debug!("No matching legal move");
            return Err(MoveRejected::NoSuchMove { from, to });
        };

        let mut next = pos.clone();
        let san = SanPlus::from_move_and_play_unchecked(&mut next, m).to_string();

        let fen = Fen::from_position(next.clone(), EnPassantMode::Legal).to_string();
        let side_to_move = Self::side(next.turn());
        let outcome = Self::outcome_of(&next);

        if let Some(outcome) = outcome {
            debug!(%outcome, "Move ends the game");
        }

        Ok(AppliedMove {
            position: fen,
            san,
            side_to_move,
            outcome,
        })
    }

    #[instrument(skip(self))]
    fn side_to_move(&self, position: &str) -> Result<Side, PositionError> {
        let pos = Self::load(position)?;
        Ok(Self::side(pos.turn()))
    }

    #[instrument(skip(self))]
    fn outcome(&self, position: &str) -> Result<Option<GameOutcome>, PositionError> {
        let pos = Self::load(position).inspect_err(|e| {
            warn!(error = %e, "Cannot evaluate outcome of invalid position");
        })?;
        Ok(Self::outcome_of(&pos))
    }
}
