//! Database module for the analysis queue.

use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe database connection pool.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize database with schema.
///
/// Creates the tables used by the queue and the store:
/// - `queue`: Positions waiting for an evaluation, one row per FEN
/// - `evaluations`: Accepted evaluations, one row per move line
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file (use `:memory:` for in-memory)
///
/// # Errors
///
/// Returns an error if the database cannot be opened or schema creation fails.
pub fn init_db<P: AsRef<Path>>(path: P) -> SqliteResult<DbPool> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queue (
            fen TEXT PRIMARY KEY,
            moves TEXT NOT NULL,
            depth INTEGER NOT NULL,
            enqueued_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS evaluations (
            moves TEXT PRIMARY KEY,
            best_move TEXT,
            depth INTEGER NOT NULL,
            score REAL NOT NULL,
            saved_at TEXT NOT NULL
        );
        ",
    )?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Locks the connection, recovering it if a previous holder panicked.
pub(crate) fn lock(db: &DbPool) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|e| e.into_inner())
}

/// Joins move tokens into the stored line format.
pub(crate) fn join_moves(moves: &[String]) -> String {
    moves.join(" ")
}

/// Splits a stored line back into move tokens.
pub(crate) fn split_moves(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
