//! Capabilities the orchestrator consumes.
//!
//! - `PositionQueue`: pending positions, keyed by FEN
//! - `EvaluationStore`: durable sink for accepted evaluations
//! - `EvaluationSource`: fast lookup of an existing evaluation
//! - `InterestFilter`: decides whether a line is worth analyzing
//! - `AnalysisEngine`: slow analysis reporting back through the commit path
//!
//! The I/O capabilities are async and backend-agnostic. In-memory versions
//! live in the [`memory`](crate::memory) module.

use async_trait::async_trait;

use crate::model::{EvaluationResult, Interest, QueueItem, SavedEvaluation};

/// Queue of positions waiting for an evaluation.
///
/// Holds at most one item per FEN.
#[async_trait]
pub trait PositionQueue: Send + Sync {
    /// Every item currently queued.
    async fn list_all(&self) -> anyhow::Result<Vec<QueueItem>>;

    /// The item queued for `fen`, if any.
    async fn find(&self, fen: &str) -> anyhow::Result<Option<QueueItem>>;

    /// Removes the item queued for `fen`. No-op if absent.
    async fn remove(&self, fen: &str) -> anyhow::Result<()>;
}

/// Persistent store of accepted evaluations.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn save(&self, evaluation: &SavedEvaluation) -> anyhow::Result<()>;
}

/// A place an evaluation might already exist.
#[async_trait]
pub trait EvaluationSource: Send + Sync {
    /// Name used in logs and configuration.
    fn name(&self) -> &str;

    /// Looks up an evaluation for the item.
    ///
    /// `Ok(None)` and results without a best move both mean "no answer".
    async fn lookup(&self, item: &QueueItem) -> anyhow::Result<Option<EvaluationResult>>;
}

/// Heuristic deciding whether a line deserves an evaluation.
pub trait InterestFilter: Send + Sync {
    fn classify(&self, moves: &[String]) -> Interest;
}

/// Slow analysis backend.
///
/// `analyze` returns as soon as the job is accepted. The finished evaluation
/// is delivered later through
/// [`Orchestrator::register_evaluation`](crate::Orchestrator::register_evaluation),
/// usually via an [`EvaluationSender`](crate::EvaluationSender).
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(&self, item: QueueItem) -> anyhow::Result<()>;

    /// Called after a result for `fen` went through the commit path,
    /// committed or not. Engines tracking running jobs forget `fen` here.
    fn release(&self, _fen: &str) {}
}
