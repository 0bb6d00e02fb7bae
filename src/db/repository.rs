//! Database repository for shared game documents.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::{DbError, DbErrorKind, GameRow, NewGameRow, schema};
use crate::record::GameRecord;

const BUSY_TIMEOUT_MS: u32 = 5_000;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository for game documents.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Opens the database at the given path, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, DbError> {
        info!(path = %db_path, "Opening game repository");
        let repo = Self { db_path };
        let mut conn = repo.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(DbErrorKind::Migration, e.to_string()))?;
        debug!(count = applied.len(), "Migrations applied");
        Ok(repo)
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path).map_err(|e| {
            DbError::new(
                DbErrorKind::Connection,
                format!("Failed to connect to '{}': {}", self.db_path, e),
            )
        })?;
        // Concurrent claims queue on the write lock instead of failing
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .execute(&mut conn)?;
        Ok(conn)
    }

    /// Gets the row for a game. Returns `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get(&self, game_id: &str) -> Result<Option<GameRow>, DbError> {
        let mut conn = self.connection()?;

        let row = schema::game_records::table
            .find(game_id)
            .select(GameRow::as_select())
            .first(&mut conn)
            .optional()?;

        debug!(found = row.is_some(), "Game row lookup");
        Ok(row)
    }

    /// Writes a row, replacing any existing row for the same game.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, row), fields(game_id = %row.game_id()))]
    pub fn upsert(&self, row: &NewGameRow) -> Result<(), DbError> {
        let mut conn = self.connection()?;

        diesel::replace_into(schema::game_records::table)
            .values(row)
            .execute(&mut conn)?;

        info!(status = %row.status(), "Game row written");
        Ok(())
    }

    /// Inserts a row only if the game does not exist yet.
    ///
    /// Returns true if the row was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, row), fields(game_id = %row.game_id()))]
    pub fn insert_if_absent(&self, row: &NewGameRow) -> Result<bool, DbError> {
        let mut conn = self.connection()?;

        let inserted = diesel::insert_or_ignore_into(schema::game_records::table)
            .values(row)
            .execute(&mut conn)?;

        info!(created = inserted == 1, "Conditional insert");
        Ok(inserted == 1)
    }

    /// Reads, edits and writes back a game inside one write-locked
    /// transaction. `edit` returns whether it changed the record; unchanged
    /// records are not written.
    ///
    /// Returns `None` if the game does not exist, otherwise the resulting
    /// record and whether it was written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs or the stored row is
    /// corrupt.
    #[instrument(skip(self, edit))]
    pub fn modify<F>(&self, game_id: &str, edit: F) -> Result<Option<(GameRecord, bool)>, DbError>
    where
        F: FnOnce(&mut GameRecord) -> bool,
    {
        let mut conn = self.connection()?;

        conn.immediate_transaction::<_, DbError, _>(|conn| {
            let row = schema::game_records::table
                .find(game_id)
                .select(GameRow::as_select())
                .first(conn)
                .optional()?;

            let Some(row) = row else {
                debug!("Game not found");
                return Ok(None);
            };

            let mut record = row.to_record()?;
            if !edit(&mut record) {
                debug!("Edit left record unchanged");
                return Ok(Some((record, false)));
            }

            let changes = NewGameRow::from_record(game_id, &record)?;
            diesel::update(schema::game_records::table.find(game_id))
                .set((&changes, schema::game_records::updated_at.eq(diesel::dsl::now)))
                .execute(conn)?;

            info!(status = %record.status(), "Game row updated");
            Ok(Some((record, true)))
        })
    }
}
