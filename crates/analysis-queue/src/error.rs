//! Error types for building the orchestrator and committing evaluations.

use thiserror::Error;

/// Errors raised while assembling an [`Orchestrator`](crate::Orchestrator).
///
/// These are the only errors returned to the caller at construction time;
/// everything that goes wrong during a pass is logged instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required collaborator was not supplied to the builder.
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    /// Two evaluation sources were registered under the same name.
    #[error("Duplicate evaluation source: {0}")]
    DuplicateSource(String),
}

/// Reasons an evaluation was not committed.
///
/// None of these are fatal to the orchestrator: the queue and the store are
/// left untouched in every case except `Collaborator`, where the failing call
/// may have partially completed.
#[derive(Error, Debug)]
pub enum CommitError {
    /// No queued item matches the evaluated position.
    #[error("Could not register evaluation: position '{0}' was not found in queue")]
    UnknownPosition(String),
    /// The queued item demands a deeper evaluation than the one offered.
    #[error(
        "Could not register evaluation for '{fen}': depth {offered} is below the queued depth {required}"
    )]
    StaleEvaluation {
        fen: String,
        offered: u32,
        required: u32,
    },
    /// The queue or the store failed.
    #[error("Collaborator error: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}
