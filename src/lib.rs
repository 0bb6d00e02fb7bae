//! Castle Chess library - a chess board shared through a document store
//!
//! Two players on separate machines play one game whose state lives in a
//! single remote document. Each client subscribes to that document, works
//! out which seat it holds, and publishes its moves back.
//!
//! # Architecture
//!
//! - **Arbiter**: decides a session's role from the shared record
//! - **Pipeline**: gates, validates and applies move attempts
//! - **Session**: one player's view of the game and its store connection
//! - **Store**: in-memory, SQLite and HTTP backends for the game document
//! - **Server**: REST server exposing a store to remote players
//!
//! # Example
//!
//! ```no_run
//! use castle_chess::{MemoryStore, SessionContext, SessionId, ShakmatyValidator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), castle_chess::StoreError> {
//! let store = Arc::new(MemoryStore::new());
//! let mut session = SessionContext::connect(
//!     SessionId::generate(),
//!     "mainCastleGame".to_string(),
//!     store,
//!     Arc::new(ShakmatyValidator::new()),
//! )
//! .await?;
//!
//! if let Some(snapshot) = session.next_snapshot().await {
//!     println!("{}", session.handle_snapshot(snapshot).await);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod arbiter;
mod config;
mod db;
mod games;
mod pipeline;
mod record;
mod server;
mod session;
mod store;

// Crate-level exports - Configuration
pub use config::{
    ClientConfig, ConfigError, ENV_DB_PATH, ENV_GAME_ID, ENV_STORE_URL, StoreKind,
};

// Crate-level exports - Role arbitration
pub use arbiter::{Reconciliation, SlotClaim, reconcile};

// Crate-level exports - Move submission
pub use pipeline::{AcceptedMove, GateMode, MoveError, check_gate, submit_move};

// Crate-level exports - Shared record
pub use record::{GameDocument, GameRecord, GameStatus, Players, SessionId};

// Crate-level exports - Session
pub use session::{
    ConnectionState, PendingPublish, ResetError, Selection, SessionContext, SessionPhase,
    Submitted, TurnIndicator, reset_game,
};

// Crate-level exports - Stores
pub use store::{
    ClaimOutcome, ClaimRequest, ClaimResponse, CreateResponse, MemoryStore, PositionUpdate,
    RemoteStore, SessionStore, Snapshot, SqliteStore, StoreError, StoreErrorKind, Subscription,
    open_store, resolve_claim,
};

// Crate-level exports - Persistence
pub use db::{DbError, DbErrorKind, GameRepository, GameRow, NewGameRow};

// Crate-level exports - Server
pub use server::{ApiError, router, serve};

// Crate-level exports - Chess
pub use games::chess::{
    AppliedMove, BoardRenderer, GameOutcome, LegalMove, MoveRejected, MoveValidator,
    PositionError, Promotion, Role, STARTING_FEN, ShakmatyValidator, Side, Square, SquareError,
    TextRenderer, board_text, piece_at,
};
