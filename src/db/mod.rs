//! Database persistence layer for shared game documents.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::{DbError, DbErrorKind};
pub use models::{GameRow, NewGameRow};
pub use repository::GameRepository;
