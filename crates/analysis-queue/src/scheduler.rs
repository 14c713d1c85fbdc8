//! Single-flight pass scheduler.
//!
//! Holds one "tail" future. Every scheduled pass waits on the current tail,
//! runs, and becomes the new tail. A link settles whatever its pass did
//! (error or panic included), so a failed pass never blocks the next one.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{error, info};

use crate::orchestrator::PassReport;

type Link = Shared<BoxFuture<'static, PassOutcome>>;

/// How a scheduled pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The pass went over every item it listed.
    Completed(PassReport),
    /// The pass returned an error or panicked. The message has been logged.
    Failed(String),
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }

    /// The report of a completed pass.
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::Failed(_) => None,
        }
    }
}

/// Serializes passes in submission order.
pub struct PassScheduler {
    tail: Mutex<Link>,
    next_pass: AtomicU64,
}

impl PassScheduler {
    pub fn new() -> Self {
        let settled: BoxFuture<'static, PassOutcome> =
            future::ready(PassOutcome::Completed(PassReport::default())).boxed();
        Self {
            tail: Mutex::new(settled.shared()),
            next_pass: AtomicU64::new(1),
        }
    }

    /// Queues `pass` behind every previously scheduled pass.
    ///
    /// The pass is spawned on the current Tokio runtime right away, so it runs
    /// even if the returned handle is dropped. Must be called from within a
    /// runtime.
    pub fn schedule<F>(&self, pass: F) -> PassHandle
    where
        F: Future<Output = anyhow::Result<PassReport>> + Send + 'static,
    {
        let id = self.next_pass.fetch_add(1, Ordering::Relaxed);

        let mut tail = self.tail.lock().unwrap_or_else(|e| e.into_inner());
        let previous = tail.clone();
        let link: BoxFuture<'static, PassOutcome> = async move {
            previous.await;
            // Spawned separately so a panic surfaces as a JoinError here.
            match tokio::spawn(pass).await {
                Ok(Ok(report)) => {
                    info!(pass = id, %report, "Pass completed");
                    PassOutcome::Completed(report)
                }
                Ok(Err(err)) => {
                    error!(pass = id, "Pass failed: {:#}", err);
                    PassOutcome::Failed(format!("{:#}", err))
                }
                Err(err) => {
                    error!(pass = id, "Pass aborted: {}", err);
                    PassOutcome::Failed(err.to_string())
                }
            }
        }
        .boxed();
        let link = link.shared();
        *tail = link.clone();
        drop(tail);

        tokio::spawn(link.clone());
        PassHandle { id, link }
    }
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle of a scheduled pass.
///
/// Resolves once the pass has settled. Dropping it does not cancel the pass.
pub struct PassHandle {
    id: u64,
    link: Link,
}

impl PassHandle {
    /// Sequence number of the pass, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PassHandle {
    type Output = PassOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.link.poll_unpin(cx)
    }
}
