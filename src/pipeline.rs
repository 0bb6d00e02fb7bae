//! Move submission: gate, validate, apply.

use crate::games::chess::{
    GameOutcome, MoveRejected, MoveValidator, PositionError, Promotion, Role, Side, Square,
};
use derive_more::Display;
use tracing::{debug, info, instrument, warn};

/// How strictly the turn gate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// A seated player may only move on their own turn.
    #[default]
    Seated,
    /// Single local user plays both sides; the validator's side-to-move
    /// tracking is the only alternation.
    Offline,
}

/// A move the pipeline accepted and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedMove {
    /// FEN after the move.
    pub position: String,
    /// Standard algebraic notation of the move.
    pub san: String,
    /// Side to move after the move.
    pub turn: Side,
    /// Set when the move ended the game.
    pub outcome: Option<GameOutcome>,
}

impl AcceptedMove {
    /// Status line announcing the move.
    pub fn status_message(&self) -> String {
        match self.outcome {
            Some(outcome) => format!("Move: {}. {}", self.san, outcome),
            None => format!("Move: {}. {}'s turn.", self.san, self.turn),
        }
    }
}

/// User-facing rejection of a move attempt. Always recoverable.
#[derive(Debug, Clone, Display)]
pub enum MoveError {
    /// The session has no role yet.
    #[display("Please wait for the game to load your player role.")]
    NotYetAssigned,
    /// The session's role does not match the side to move.
    #[display("It is {}'s turn, not yours.", turn)]
    NotYourTurn {
        /// Side to move.
        turn: Side,
    },
    /// The selected piece belongs to the other side.
    #[display("You can only move your own ({}) pieces.", side)]
    NotYourPiece {
        /// Side the session plays.
        side: Side,
    },
    /// The validator found no legal move between the squares.
    #[display("Invalid move from {} to {}.", from, to)]
    IllegalMove {
        /// Requested origin.
        from: Square,
        /// Requested destination.
        to: Square,
    },
    /// A destination was chosen with no piece selected.
    #[display("Select one of your pieces first.")]
    NothingSelected,
    /// The previous move has not finished publishing.
    #[display("Still sending your last move. Try again in a moment.")]
    PublishPending,
    /// The local position cannot be loaded.
    #[display("ERROR: Invalid Game State.")]
    InvalidPosition(PositionError),
}

impl std::error::Error for MoveError {}

/// Checks the role/turn gate shared by selection and submission.
#[instrument(level = "debug")]
pub fn check_gate(role: Option<Role>, turn: Side, mode: GateMode) -> Result<(), MoveError> {
    let Some(role) = role else {
        debug!("No role assigned yet");
        return Err(MoveError::NotYetAssigned);
    };
    if mode == GateMode::Offline {
        return Ok(());
    }
    if !role.plays(turn) {
        debug!(role = %role, turn = %turn, "Not this session's turn");
        return Err(MoveError::NotYourTurn { turn });
    }
    Ok(())
}

/// Gates, validates and applies a single move attempt.
///
/// This is the only authorization check on a move: the store accepts any
/// write, so a client that bypasses this function can move out of turn.
/// Pawns reaching the last rank always become queens.
#[instrument(skip(validator, position), fields(role = ?role, turn = %turn, from = %from, to = %to))]
pub fn submit_move(
    validator: &dyn MoveValidator,
    position: &str,
    role: Option<Role>,
    turn: Side,
    from: Square,
    to: Square,
    mode: GateMode,
) -> Result<AcceptedMove, MoveError> {
    check_gate(role, turn, mode)?;

    let applied = validator
        .apply_move(position, from, to, Promotion::Queen)
        .map_err(|rejected| match rejected {
            MoveRejected::InvalidPosition(e) => {
                warn!(error = %e, "Local position is unreadable");
                MoveError::InvalidPosition(e)
            }
            MoveRejected::NoSuchMove { from, to } => {
                debug!("Validator rejected move");
                MoveError::IllegalMove { from, to }
            }
        })?;

    info!(san = %applied.san, next = %applied.side_to_move, "Move accepted");

    Ok(AcceptedMove {
        position: applied.position,
        san: applied.san,
        turn: applied.side_to_move,
        outcome: applied.outcome,
    })
}
