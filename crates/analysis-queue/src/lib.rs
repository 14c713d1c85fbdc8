//! Work queue orchestration for chess position analysis.
//!
//! This crate decides, for every position waiting in a queue, whether a deep
//! enough evaluation already exists somewhere, whether the position is worth
//! analyzing at all, or whether it has to go to a (slow) analysis engine.
//!
//! # Overview
//!
//! - [`Orchestrator`] - Runs serialized passes over the queue and commits results
//! - [`PassScheduler`] - Single-flight scheduler keeping passes in call order
//! - [`PositionQueue`], [`EvaluationStore`], [`EvaluationSource`],
//!   [`InterestFilter`], [`AnalysisEngine`] - Capabilities the orchestrator consumes
//! - [`memory`] - In-memory implementations of the capabilities
//! - [`filter`] - Ready-made interest filters
//!
//! # Example
//!
//! ```ignore
//! use analysis_queue::{evaluation_channel, Orchestrator};
//!
//! let (tx, rx) = evaluation_channel();
//! let orchestrator = Arc::new(
//!     Orchestrator::builder()
//!         .queue(queue)
//!         .store(store)
//!         .source(cache)
//!         .engine(Arc::new(MyEngine::new(tx)))
//!         .build()?,
//! );
//! tokio::spawn({
//!     let orchestrator = orchestrator.clone();
//!     async move { orchestrator.drain_evaluations(rx).await }
//! });
//! orchestrator.run().await;
//! ```

pub mod error;
pub mod filter;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod scheduler;
pub mod traits;

pub use error::{CommitError, ConfigError};
pub use model::{EvaluationResult, Interest, QueueItem, SavedEvaluation};
pub use orchestrator::{
    evaluation_channel, EvaluationReceiver, EvaluationSender, ItemOutcome, Orchestrator,
    OrchestratorBuilder, PassReport,
};
pub use scheduler::{PassHandle, PassOutcome, PassScheduler};
pub use traits::{AnalysisEngine, EvaluationSource, EvaluationStore, InterestFilter, PositionQueue};
