mod render;
mod types;
mod validator;

pub use render::{BoardRenderer, TextRenderer, board_text, piece_at};
pub use types::{Promotion, Role, Side, Square, SquareError};
pub use validator::{
    AppliedMove, GameOutcome, LegalMove, MoveRejected, MoveValidator, PositionError,
    STARTING_FEN, ShakmatyValidator,
};
