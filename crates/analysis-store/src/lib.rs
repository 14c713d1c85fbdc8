//! SQLite persistence for the analysis queue.
//!
//! - [`SqliteQueue`] - Position queue, one row per FEN
//! - [`SqliteStore`] - Accepted evaluations, one row per move line
//! - [`StoredEvaluations`] - Evaluation source reading the store back
//!
//! All three share one connection created by [`init_db`].

pub mod db;
pub mod queue;
pub mod store;

pub use db::{init_db, DbPool};
pub use queue::SqliteQueue;
pub use store::{SqliteStore, StoredEvaluations};
