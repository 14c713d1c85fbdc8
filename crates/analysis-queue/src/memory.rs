//! In-memory collaborators.
//!
//! `MemoryQueue`, `MemoryStore` and `EvaluationCache` satisfy the capability
//! contracts without any external dependency. The cache doubles as the
//! `seed` evaluation source of the worker.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use tracing::debug;

use crate::model::{EvaluationResult, QueueItem, SavedEvaluation};
use crate::traits::{EvaluationSource, EvaluationStore, PositionQueue};

/// Queue backed by a `BTreeMap<fen, item>`.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<BTreeMap<String, QueueItem>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an item.
    ///
    /// If the position is already queued, the deeper of the two depths wins.
    pub fn push(&self, item: QueueItem) {
        let mut items = self.items.lock().unwrap();
        match items.get(&item.fen) {
            Some(existing) if existing.depth >= item.depth => {}
            _ => {
                items.insert(item.fen.clone(), item);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fen: &str) -> bool {
        self.items.lock().unwrap().contains_key(fen)
    }
}

#[async_trait]
impl PositionQueue for MemoryQueue {
    async fn list_all(&self) -> anyhow::Result<Vec<QueueItem>> {
        Ok(self.items.lock().unwrap().values().cloned().collect())
    }

    async fn find(&self, fen: &str) -> anyhow::Result<Option<QueueItem>> {
        Ok(self.items.lock().unwrap().get(fen).cloned())
    }

    async fn remove(&self, fen: &str) -> anyhow::Result<()> {
        self.items.lock().unwrap().remove(fen);
        Ok(())
    }
}

/// Store that keeps every saved evaluation in order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<SavedEvaluation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, oldest first.
    pub fn saved(&self) -> Vec<SavedEvaluation> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn save(&self, evaluation: &SavedEvaluation) -> anyhow::Result<()> {
        self.saved.lock().unwrap().push(evaluation.clone());
        Ok(())
    }
}

/// Evaluation source answering from a `HashMap<fen, result>`.
///
/// Only answers when the cached entry is at least as deep as the item asks
/// for. Entries without a best move are never cached.
#[derive(Debug)]
pub struct EvaluationCache {
    name: String,
    entries: Mutex<HashMap<String, EvaluationResult>>,
}

impl EvaluationCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Loads a cache from a JSON array of evaluation results.
    ///
    /// Entries use the `{"fen", "bestMove", "depth", "score"}` shape. Entries
    /// without a best move are skipped. When a position appears more than once
    /// the deepest entry is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(name: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let results: Vec<EvaluationResult> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

        let cache = Self::new(name);
        for result in results {
            cache.insert(result);
        }
        Ok(cache)
    }

    /// Adds a result, keeping the deeper one if the position is already cached.
    ///
    /// Returns `false` if the result was not cached.
    pub fn insert(&self, result: EvaluationResult) -> bool {
        if !result.is_usable() {
            debug!(fen = %result.fen, cache = %self.name, "Skipping cache entry without best move");
            return false;
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&result.fen) {
            Some(existing) if existing.depth > result.depth => false,
            _ => {
                entries.insert(result.fen.clone(), result);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EvaluationSource for EvaluationCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, item: &QueueItem) -> anyhow::Result<Option<EvaluationResult>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&item.fen)
            .filter(|cached| cached.depth >= item.depth)
            .cloned())
    }
}
