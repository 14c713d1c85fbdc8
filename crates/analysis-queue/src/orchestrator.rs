//! Queue orchestration.
//!
//! The [`Orchestrator`] sweeps the queue once per [`Orchestrator::run`] call.
//! For every queued item it:
//!
//! 1. asks the interest filter (if any) whether the line is worth analyzing,
//! 2. walks the evaluation sources in priority order until one answers,
//! 3. commits the answer, or hands the item to the analysis engine.
//!
//! Commits go through [`Orchestrator::register_evaluation`], which is also
//! the entry point for results coming back from the engine. A commit is only
//! accepted when its depth reaches the depth the item was queued with.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Context as _;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{CommitError, ConfigError};
use crate::model::{EvaluationResult, Interest, QueueItem, SavedEvaluation};
use crate::scheduler::{PassHandle, PassScheduler};
use crate::traits::{AnalysisEngine, EvaluationSource, EvaluationStore, InterestFilter, PositionQueue};

/// Sending half used by engines to hand results back.
pub type EvaluationSender = mpsc::UnboundedSender<EvaluationResult>;
/// Receiving half consumed by [`Orchestrator::drain_evaluations`].
pub type EvaluationReceiver = mpsc::UnboundedReceiver<EvaluationResult>;

/// Creates the channel that carries engine results back to the orchestrator.
pub fn evaluation_channel() -> (EvaluationSender, EvaluationReceiver) {
    mpsc::unbounded_channel()
}

/// What happened to a single item during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Classified as not interesting and removed from the queue.
    Discarded,
    /// Interest not known yet; left in the queue.
    Deferred,
    /// A source answered and the answer was committed.
    Committed,
    /// A source answered but the commit was refused.
    Rejected,
    /// No source answered; the item was handed to the engine.
    Delegated,
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Items listed at the start of the pass.
    pub items: usize,
    pub discarded: usize,
    pub deferred: usize,
    pub committed: usize,
    pub rejected: usize,
    pub delegated: usize,
    /// Items whose processing hit a collaborator error.
    pub failed: usize,
}

impl PassReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Discarded => self.discarded += 1,
            ItemOutcome::Deferred => self.deferred += 1,
            ItemOutcome::Committed => self.committed += 1,
            ItemOutcome::Rejected => self.rejected += 1,
            ItemOutcome::Delegated => self.delegated += 1,
        }
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} committed, {} delegated, {} discarded, {} deferred, {} rejected, {} failed",
            self.items,
            self.committed,
            self.delegated,
            self.discarded,
            self.deferred,
            self.rejected,
            self.failed
        )
    }
}

/// Drives the queue through filter, lookup chain, commit and delegation.
pub struct Orchestrator {
    queue: Arc<dyn PositionQueue>,
    store: Arc<dyn EvaluationStore>,
    sources: Vec<Arc<dyn EvaluationSource>>,
    filter: Option<Arc<dyn InterestFilter>>,
    engine: Arc<dyn AnalysisEngine>,
    scheduler: PassScheduler,
}

impl Orchestrator {
    /// Starts building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Names of the configured sources, in lookup order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Schedules one pass over the queue.
    ///
    /// The pass starts once every previously scheduled pass has settled.
    /// Errors are logged and never reach the caller; the handle resolves to
    /// the pass outcome.
    pub fn run(self: &Arc<Self>) -> PassHandle {
        let this = Arc::clone(self);
        self.scheduler.schedule(this.pass())
    }

    async fn pass(self: Arc<Self>) -> anyhow::Result<PassReport> {
        let items = self
            .queue
            .list_all()
            .await
            .context("Failed to list queued positions")?;

        let this = &self;
        let outcomes = join_all(items.into_iter().map(|item| async move {
            let fen = item.fen.clone();
            (fen, this.process_item(item).await)
        }))
        .await;

        let mut report = PassReport {
            items: outcomes.len(),
            ..PassReport::default()
        };
        for (fen, outcome) in outcomes {
            match outcome {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    error!(fen = %fen, "Failed to process queued position: {:#}", err);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Runs the filter, lookup chain and resolution for one item.
    pub async fn process_item(&self, item: QueueItem) -> anyhow::Result<ItemOutcome> {
        if let Some(filter) = &self.filter {
            match filter.classify(&item.moves) {
                Interest::Interesting => {}
                Interest::NotInteresting => {
                    debug!(fen = %item.fen, "Position not interesting, dropping it");
                    self.queue.remove(&item.fen).await?;
                    return Ok(ItemOutcome::Discarded);
                }
                Interest::Undetermined => {
                    debug!(fen = %item.fen, "Interest undetermined, keeping position queued");
                    return Ok(ItemOutcome::Deferred);
                }
            }
        }

        match self.lookup(&item).await {
            Some(result) => match self.register_evaluation(result).await {
                Ok(()) => Ok(ItemOutcome::Committed),
                Err(CommitError::Collaborator(err)) => Err(err),
                Err(_) => Ok(ItemOutcome::Rejected),
            },
            None => {
                debug!(fen = %item.fen, depth = item.depth, "No stored evaluation, delegating to engine");
                self.engine
                    .analyze(item)
                    .await
                    .context("Analysis engine refused the position")?;
                Ok(ItemOutcome::Delegated)
            }
        }
    }

    /// Returns the first usable answer from the sources, in priority order.
    ///
    /// Later sources are not consulted once one has answered. A failing
    /// source is logged and counts as no answer.
    pub async fn lookup(&self, item: &QueueItem) -> Option<EvaluationResult> {
        for source in &self.sources {
            match source.lookup(item).await {
                Ok(Some(result)) if result.is_usable() => {
                    debug!(fen = %item.fen, source = source.name(), depth = result.depth, "Evaluation found");
                    return Some(result);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(fen = %item.fen, source = source.name(), "Evaluation source failed: {:#}", err);
                }
            }
        }
        None
    }

    /// Commits an evaluation for a queued position.
    ///
    /// The evaluation is saved and the item removed only when the result is
    /// at least as deep as the queued item. Every refusal is logged and
    /// returned; none of them mutate the queue or the store.
    ///
    /// The engine is told the position is settled whatever the outcome.
    pub async fn register_evaluation(&self, result: EvaluationResult) -> Result<(), CommitError> {
        let fen = result.fen.clone();
        let outcome = self.commit(result).await;
        self.engine.release(&fen);
        match &outcome {
            Ok(()) => {}
            Err(err @ CommitError::StaleEvaluation { .. }) => warn!("{}", err),
            Err(err) => error!("{}", err),
        }
        outcome
    }

    async fn commit(&self, result: EvaluationResult) -> Result<(), CommitError> {
        debug!(fen = %result.fen, depth = result.depth, best_move = ?result.best_move, "Registering evaluation");

        let item = self
            .queue
            .find(&result.fen)
            .await?
            .ok_or_else(|| CommitError::UnknownPosition(result.fen.clone()))?;

        if result.depth < item.depth {
            return Err(CommitError::StaleEvaluation {
                fen: result.fen,
                offered: result.depth,
                required: item.depth,
            });
        }

        let saved = SavedEvaluation {
            moves: item.moves,
            best_move: result.best_move().map(str::to_string),
            depth: result.depth,
            score: result.score,
        };
        self.store.save(&saved).await?;
        self.queue.remove(&item.fen).await?;

        info!(
            fen = %item.fen,
            best_move = ?saved.best_move,
            depth = saved.depth,
            score = saved.score,
            "Evaluation committed"
        );
        Ok(())
    }

    /// Commits every result received on `results` until all senders are gone.
    ///
    /// Returns the number of accepted commits.
    pub async fn drain_evaluations(&self, mut results: EvaluationReceiver) -> usize {
        let mut committed = 0;
        while let Some(result) = results.recv().await {
            if self.register_evaluation(result).await.is_ok() {
                committed += 1;
            }
        }
        committed
    }
}

/// Builder for [`Orchestrator`].
///
/// The queue, the store and the engine are required. Sources are consulted
/// in the order they were added; the filter is optional.
#[derive(Default)]
pub struct OrchestratorBuilder {
    queue: Option<Arc<dyn PositionQueue>>,
    store: Option<Arc<dyn EvaluationStore>>,
    sources: Vec<Arc<dyn EvaluationSource>>,
    filter: Option<Arc<dyn InterestFilter>>,
    engine: Option<Arc<dyn AnalysisEngine>>,
}

impl OrchestratorBuilder {
    pub fn queue(mut self, queue: Arc<dyn PositionQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(mut self, store: Arc<dyn EvaluationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Appends a source with the lowest priority so far.
    pub fn source(mut self, source: Arc<dyn EvaluationSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(mut self, sources: impl IntoIterator<Item = Arc<dyn EvaluationSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn InterestFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Validates the configuration and creates the orchestrator.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingCollaborator`] if the queue, store or engine is missing
    /// - [`ConfigError::DuplicateSource`] if two sources share a name
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let queue = self.queue.ok_or(ConfigError::MissingCollaborator("queue"))?;
        let store = self.store.ok_or(ConfigError::MissingCollaborator("store"))?;
        let engine = self.engine.ok_or(ConfigError::MissingCollaborator("engine"))?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name().to_string()) {
                return Err(ConfigError::DuplicateSource(source.name().to_string()));
            }
        }

        Ok(Orchestrator {
            queue,
            store,
            sources: self.sources,
            filter: self.filter,
            engine,
            scheduler: PassScheduler::new(),
        })
    }
}
