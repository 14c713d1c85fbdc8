//! SQLite-backed position queue.

use analysis_queue::{PositionQueue, QueueItem};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{join_moves, lock, split_moves, DbPool};

/// Position queue stored in the `queue` table.
///
/// Holds at most one row per FEN. Items are listed in the order they were
/// first queued.
#[derive(Clone)]
pub struct SqliteQueue {
    db: DbPool,
}

impl SqliteQueue {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Queues a position, or raises the depth of an already queued one.
    ///
    /// A queued position keeps its depth when the new request is not deeper.
    ///
    /// # Returns
    ///
    /// `true` if a row was inserted or updated.
    pub fn enqueue(&self, item: &QueueItem) -> SqliteResult<bool> {
        let conn = lock(&self.db);
        let changed = conn.execute(
            "INSERT INTO queue (fen, moves, depth, enqueued_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(fen) DO UPDATE SET moves = excluded.moves, depth = excluded.depth
             WHERE excluded.depth > queue.depth",
            (
                &item.fen,
                join_moves(&item.moves),
                item.depth,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(changed > 0)
    }

    /// All queued items, oldest first.
    pub fn items(&self) -> SqliteResult<Vec<QueueItem>> {
        let conn = lock(&self.db);
        let mut stmt = conn.prepare("SELECT fen, moves, depth FROM queue ORDER BY rowid ASC")?;
        let items = stmt
            .query_map([], item_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// The item queued for `fen`.
    pub fn get(&self, fen: &str) -> SqliteResult<Option<QueueItem>> {
        let conn = lock(&self.db);
        conn.query_row(
            "SELECT fen, moves, depth FROM queue WHERE fen = ?1",
            [fen],
            item_from_row,
        )
        .optional()
    }

    /// Deletes the item queued for `fen`.
    ///
    /// # Returns
    ///
    /// `true` if a row was deleted.
    pub fn delete(&self, fen: &str) -> SqliteResult<bool> {
        let conn = lock(&self.db);
        Ok(conn.execute("DELETE FROM queue WHERE fen = ?1", [fen])? > 0)
    }

    /// Number of queued positions.
    pub fn len(&self) -> SqliteResult<usize> {
        let conn = lock(&self.db);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn item_from_row(row: &Row<'_>) -> SqliteResult<QueueItem> {
    let moves: String = row.get(1)?;
    Ok(QueueItem {
        fen: row.get(0)?,
        moves: split_moves(&moves),
        depth: row.get(2)?,
    })
}

#[async_trait]
impl PositionQueue for SqliteQueue {
    async fn list_all(&self) -> anyhow::Result<Vec<QueueItem>> {
        Ok(self.items()?)
    }

    async fn find(&self, fen: &str) -> anyhow::Result<Option<QueueItem>> {
        Ok(self.get(fen)?)
    }

    async fn remove(&self, fen: &str) -> anyhow::Result<()> {
        self.delete(fen)?;
        Ok(())
    }
}
