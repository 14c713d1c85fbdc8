//! Values exchanged between the queue, the lookup sources and the store.

use serde::{Deserialize, Serialize};

/// A position waiting for an evaluation of at least `depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Position key (FEN). Unique within a queue.
    pub fen: String,
    /// Moves leading to the position, in the order they were played.
    pub moves: Vec<String>,
    /// Depth of the evaluation this item is waiting for.
    pub depth: u32,
}

impl QueueItem {
    /// Creates a queue item.
    pub fn new(fen: impl Into<String>, moves: Vec<String>, depth: u32) -> Self {
        Self {
            fen: fen.into(),
            moves,
            depth,
        }
    }

    /// The move sequence as a single space separated line.
    pub fn line(&self) -> String {
        self.moves.join(" ")
    }
}

/// An evaluation produced by a lookup source or by the analysis engine.
///
/// Sources are allowed to answer with partial results; only results carrying
/// a best move are considered usable (see [`EvaluationResult::is_usable`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Position key the result belongs to.
    pub fen: String,
    /// Recommended move, if the source knows one.
    #[serde(default)]
    pub best_move: Option<String>,
    /// Search depth the result was obtained at.
    pub depth: u32,
    /// Score in pawns (positive = advantage for the side to move).
    pub score: f64,
}

impl EvaluationResult {
    /// Creates a result with a best move.
    pub fn new(fen: impl Into<String>, best_move: impl Into<String>, depth: u32, score: f64) -> Self {
        Self {
            fen: fen.into(),
            best_move: Some(best_move.into()),
            depth,
            score,
        }
    }

    /// Returns the best move unless it is missing or empty.
    pub fn best_move(&self) -> Option<&str> {
        self.best_move.as_deref().filter(|m| !m.is_empty())
    }

    /// A result is usable only when it names a best move.
    pub fn is_usable(&self) -> bool {
        self.best_move().is_some()
    }
}

/// The record persisted once an evaluation has been accepted.
///
/// `best_move` is absent for positions without a legal move (mate or
/// stalemate), which are evaluated but have nothing to recommend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedEvaluation {
    pub moves: Vec<String>,
    #[serde(default)]
    pub best_move: Option<String>,
    pub depth: u32,
    pub score: f64,
}

/// Verdict of an [`InterestFilter`](crate::InterestFilter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Worth looking up or analyzing.
    Interesting,
    /// Not worth analyzing; the item is dropped from the queue.
    NotInteresting,
    /// Not known yet; the item is left alone until a later pass.
    Undetermined,
}

impl From<Option<bool>> for Interest {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Interest::Interesting,
            Some(false) => Interest::NotInteresting,
            None => Interest::Undetermined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_without_best_move_is_not_usable() {
        let result = EvaluationResult {
            fen: "pnK...".to_string(),
            best_move: None,
            depth: 40,
            score: -0.24,
        };
        assert!(!result.is_usable());
        assert_eq!(result.best_move(), None);
    }

    #[test]
    fn test_result_with_empty_best_move_is_not_usable() {
        let result = EvaluationResult {
            fen: "pnK...".to_string(),
            best_move: Some(String::new()),
            depth: 40,
            score: -0.24,
        };
        assert!(!result.is_usable());
    }

    #[test]
    fn test_result_with_best_move_is_usable() {
        let result = EvaluationResult::new("pnK...", "d4", 40, -0.24);
        assert!(result.is_usable());
        assert_eq!(result.best_move(), Some("d4"));
    }

    #[test]
    fn test_result_deserializes_camel_case_without_best_move() {
        let json = r#"{"fen":"bbb","depth":20,"score":0.02}"#;
        let result: EvaluationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.fen, "bbb");
        assert_eq!(result.depth, 20);
        assert!(result.best_move.is_none());

        let json = r#"{"fen":"bbb","bestMove":"d4","depth":20,"score":0.02}"#;
        let result: EvaluationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.best_move(), Some("d4"));
    }

    #[test]
    fn test_item_line() {
        let item = QueueItem::new("pnK...", vec!["d3".to_string(), "d5".to_string()], 40);
        assert_eq!(item.line(), "d3 d5");
        assert_eq!(QueueItem::new("x", vec![], 1).line(), "");
    }

    #[test]
    fn test_interest_from_option() {
        assert_eq!(Interest::from(Some(true)), Interest::Interesting);
        assert_eq!(Interest::from(Some(false)), Interest::NotInteresting);
        assert_eq!(Interest::from(None), Interest::Undetermined);
    }
}
