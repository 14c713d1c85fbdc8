//! SQLite storage for accepted evaluations.
//!
//! [`SqliteStore`] is the orchestrator's durable sink. [`StoredEvaluations`]
//! reads the same table back as an evaluation source, so positions reached
//! again through the same line do not go back to the engine.

use analysis_queue::{EvaluationResult, EvaluationSource, EvaluationStore, QueueItem, SavedEvaluation};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};
use tracing::debug;

use crate::db::{join_moves, lock, split_moves, DbPool};

/// Evaluation store backed by the `evaluations` table, keyed by move line.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Saves an evaluation.
    ///
    /// An existing evaluation of the same line is replaced only by one that
    /// is at least as deep.
    ///
    /// # Returns
    ///
    /// `true` if the row was written.
    pub fn put(&self, evaluation: &SavedEvaluation) -> SqliteResult<bool> {
        let conn = lock(&self.db);
        let changed = conn.execute(
            "INSERT INTO evaluations (moves, best_move, depth, score, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(moves) DO UPDATE SET
                 best_move = excluded.best_move,
                 depth = excluded.depth,
                 score = excluded.score,
                 saved_at = excluded.saved_at
             WHERE excluded.depth >= evaluations.depth",
            (
                join_moves(&evaluation.moves),
                &evaluation.best_move,
                evaluation.depth,
                evaluation.score,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(changed > 0)
    }

    /// The stored evaluation of a move line.
    pub fn get(&self, moves: &[String]) -> SqliteResult<Option<SavedEvaluation>> {
        let conn = lock(&self.db);
        conn.query_row(
            "SELECT moves, best_move, depth, score FROM evaluations WHERE moves = ?1",
            [join_moves(moves)],
            |row| {
                let line: String = row.get(0)?;
                Ok(SavedEvaluation {
                    moves: split_moves(&line),
                    best_move: row.get(1)?,
                    depth: row.get(2)?,
                    score: row.get(3)?,
                })
            },
        )
        .optional()
    }

    /// Number of stored evaluations.
    pub fn count(&self) -> SqliteResult<usize> {
        let conn = lock(&self.db);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl EvaluationStore for SqliteStore {
    async fn save(&self, evaluation: &SavedEvaluation) -> anyhow::Result<()> {
        if !self.put(evaluation)? {
            debug!(line = %join_moves(&evaluation.moves), "Kept deeper stored evaluation");
        }
        Ok(())
    }
}

/// Evaluation source answering from previously saved evaluations.
///
/// Only answers when the stored evaluation is at least as deep as the item
/// requires, so shallow leftovers never shadow the engine. Evaluations of
/// positions without a legal move carry no best move and are never offered.
#[derive(Clone)]
pub struct StoredEvaluations {
    store: SqliteStore,
}

impl StoredEvaluations {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EvaluationSource for StoredEvaluations {
    fn name(&self) -> &str {
        "store"
    }

    async fn lookup(&self, item: &QueueItem) -> anyhow::Result<Option<EvaluationResult>> {
        let stored = self.store.get(&item.moves)?;
        Ok(stored
            .filter(|saved| saved.depth >= item.depth && saved.best_move.is_some())
            .map(|saved| EvaluationResult {
                fen: item.fen.clone(),
                best_move: saved.best_move,
                depth: saved.depth,
                score: saved.score,
            }))
    }
}
