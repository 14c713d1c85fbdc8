//! Stockfish-backed analysis engine.
//!
//! Each accepted position is searched by its own Stockfish process, at most
//! `pool_size` at a time. Finished evaluations are handed back to the
//! orchestrator through an evaluation channel.

use analysis_queue::{AnalysisEngine, EvaluationResult, EvaluationSender, QueueItem};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;

/// Pawn value of a forced mate; mate in `n` scores `MATE_SCORE - n`.
pub const MATE_SCORE: f64 = 1000.0;

/// Engine score as reported on an `info` line, from the side to move's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    /// Converts the score to pawns.
    pub fn to_pawns(self) -> f64 {
        match self {
            Score::Centipawns(cp) => f64::from(cp) / 100.0,
            Score::Mate(n) if n > 0 => MATE_SCORE - f64::from(n),
            Score::Mate(n) => -(MATE_SCORE + f64::from(n)),
        }
    }
}

/// State of one search, built up from the engine's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutput {
    /// Search depth reached.
    pub depth: u32,
    /// Latest exact score.
    pub score: Option<Score>,
    /// Best move in UCI notation, absent when the position has no legal move.
    pub best_move: Option<String>,
}

impl SearchOutput {
    /// Folds one line of engine output into the search state.
    ///
    /// Returns `true` once the engine has reported its best move.
    pub fn apply_line(&mut self, line: &str) -> bool {
        if line.starts_with("info depth")
            && !line.contains("upperbound")
            && !line.contains("lowerbound")
        {
            let parts: Vec<&str> = line.split_whitespace().collect();
            for (i, part) in parts.iter().enumerate() {
                let value = parts.get(i + 1).and_then(|s| s.parse::<i32>().ok());
                match *part {
                    "depth" => {
                        if let Some(d) = value.and_then(|d| u32::try_from(d).ok()) {
                            self.depth = d;
                        }
                    }
                    "cp" => {
                        if let Some(cp) = value {
                            self.score = Some(Score::Centipawns(cp));
                        }
                    }
                    "mate" => {
                        if let Some(n) = value {
                            self.score = Some(Score::Mate(n));
                        }
                    }
                    "pv" => break,
                    _ => {}
                }
            }
            false
        } else if line.starts_with("bestmove") {
            self.best_move = line
                .split_whitespace()
                .nth(1)
                .filter(|m| *m != "(none)")
                .map(str::to_string);
            true
        } else {
            false
        }
    }

    /// Turns the finished search into an evaluation of `fen`.
    pub fn into_result(self, fen: impl Into<String>) -> EvaluationResult {
        EvaluationResult {
            fen: fen.into(),
            best_move: self.best_move,
            depth: self.depth,
            score: self.score.map_or(0.0, Score::to_pawns),
        }
    }
}

/// Runs one Stockfish search of `fen` to `depth`.
async fn search(stockfish_path: &str, fen: &str, depth: u32) -> anyhow::Result<SearchOutput> {
    let mut child = Command::new(stockfish_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start engine {}", stockfish_path))?;

    let mut stdin = child.stdin.take().context("Engine stdin unavailable")?;
    let stdout = child.stdout.take().context("Engine stdout unavailable")?;
    let mut reader = BufReader::new(stdout).lines();

    stdin.write_all(b"uci\n").await?;
    stdin
        .write_all(format!("position fen {}\n", fen).as_bytes())
        .await?;
    stdin
        .write_all(format!("go depth {}\n", depth).as_bytes())
        .await?;

    let mut output = SearchOutput::default();
    let mut finished = false;
    while let Some(line) = reader.next_line().await? {
        if output.apply_line(&line) {
            finished = true;
            break;
        }
    }
    if !finished {
        bail!("Engine exited before reporting a best move");
    }

    stdin.write_all(b"quit\n").await?;
    child.wait().await?;

    Ok(output)
}

type InFlight = Arc<Mutex<HashSet<String>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears a position from the in-flight set when its job ends without a
/// result. Once a result is sent the position stays marked until the commit
/// side calls [`AnalysisEngine::release`].
struct InFlightGuard {
    in_flight: InFlight,
    fen: String,
    held: bool,
}

impl InFlightGuard {
    fn new(in_flight: &InFlight, fen: &str) -> Self {
        Self {
            in_flight: Arc::clone(in_flight),
            fen: fen.to_string(),
            held: true,
        }
    }

    fn hand_over(mut self) {
        self.held = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.held {
            lock(&self.in_flight).remove(&self.fen);
        }
    }
}

/// Pool of Stockfish processes used as the orchestrator's analysis engine.
///
/// A position stays in flight from the moment it is accepted until its result
/// has been through the commit path, so the passes that keep offering it in
/// the meantime never start a second search.
pub struct StockfishEngine {
    semaphore: Arc<Semaphore>,
    stockfish_path: String,
    min_depth: u32,
    results: EvaluationSender,
    in_flight: InFlight,
}

impl StockfishEngine {
    /// Creates an engine delivering its evaluations to `results`.
    pub fn new(config: &EngineConfig, results: EvaluationSender) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.pool_size)),
            stockfish_path: config.stockfish_path.clone(),
            min_depth: config.min_depth,
            results,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Depth the engine searches `item` to.
    pub fn search_depth(&self, item: &QueueItem) -> u32 {
        item.depth.max(self.min_depth)
    }

    /// Number of positions accepted and not yet released.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

#[async_trait]
impl AnalysisEngine for StockfishEngine {
    async fn analyze(&self, item: QueueItem) -> anyhow::Result<()> {
        if self.results.is_closed() {
            bail!("Evaluation channel is closed");
        }
        if !lock(&self.in_flight).insert(item.fen.clone()) {
            debug!(fen = %item.fen, "Analysis already running");
            return Ok(());
        }

        let guard = InFlightGuard::new(&self.in_flight, &item.fen);
        let depth = self.search_depth(&item);
        let semaphore = Arc::clone(&self.semaphore);
        let stockfish_path = self.stockfish_path.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            match search(&stockfish_path, &item.fen, depth).await {
                Ok(output) => {
                    let result = output.into_result(item.fen.clone());
                    info!(fen = %item.fen, depth = result.depth, score = result.score, "Analysis finished");
                    if results.send(result).is_ok() {
                        guard.hand_over();
                    } else {
                        warn!(fen = %item.fen, "Evaluation dropped, nobody is committing results");
                    }
                }
                Err(e) => error!(fen = %item.fen, "Analysis failed: {:#}", e),
            }
        });

        Ok(())
    }

    fn release(&self, fen: &str) {
        lock(&self.in_flight).remove(fen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_queue::evaluation_channel;
    use std::time::Duration;

    fn config(stockfish_path: &str) -> EngineConfig {
        EngineConfig {
            stockfish_path: stockfish_path.to_string(),
            pool_size: 2,
            min_depth: 18,
        }
    }

    async fn wait_idle(engine: &StockfishEngine) {
        for _ in 0..100 {
            if engine.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Engine still busy");
    }

    #[test]
    fn test_score_to_pawns() {
        assert_eq!(Score::Centipawns(-24).to_pawns(), -0.24);
        assert_eq!(Score::Centipawns(150).to_pawns(), 1.5);
        assert_eq!(Score::Mate(3).to_pawns(), 997.0);
        assert_eq!(Score::Mate(-2).to_pawns(), -998.0);
        assert_eq!(Score::Mate(0).to_pawns(), -1000.0);
    }

    #[test]
    fn test_apply_info_lines() {
        let mut output = SearchOutput::default();
        assert!(!output.apply_line("id name Stockfish 16"));
        assert!(!output.apply_line(
            "info depth 12 seldepth 18 multipv 1 score cp 31 nodes 9000 pv e2e4 e7e5"
        ));
        assert_eq!(output.depth, 12);
        assert_eq!(output.score, Some(Score::Centipawns(31)));

        // Bound scores are ignored.
        assert!(!output.apply_line("info depth 13 score cp 80 lowerbound nodes 12000"));
        assert_eq!(output.depth, 12);
        assert_eq!(output.score, Some(Score::Centipawns(31)));

        assert!(!output.apply_line("info depth 14 score mate 4 nodes 15000 pv d1h5"));
        assert_eq!(output.depth, 14);
        assert_eq!(output.score, Some(Score::Mate(4)));
    }

    #[test]
    fn test_apply_bestmove() {
        let mut output = SearchOutput::default();
        output.apply_line("info depth 20 score cp -24 pv d2d4");
        assert!(output.apply_line("bestmove d2d4 ponder d7d5"));

        let result = output.into_result("pnK...");
        assert_eq!(result, EvaluationResult::new("pnK...", "d2d4", 20, -0.24));
    }

    #[test]
    fn test_no_legal_move_has_no_best_move() {
        let mut output = SearchOutput::default();
        output.apply_line("info depth 0 score mate 0");
        assert!(output.apply_line("bestmove (none)"));

        let result = output.into_result("mated");
        assert!(!result.is_usable());
        assert_eq!(result.score, -1000.0);
    }

    #[test]
    fn test_search_depth_respects_minimum() {
        let (tx, _rx) = evaluation_channel();
        let engine = StockfishEngine::new(&config("stockfish"), tx);

        assert_eq!(engine.search_depth(&QueueItem::new("a", vec![], 10)), 18);
        assert_eq!(engine.search_depth(&QueueItem::new("a", vec![], 40)), 40);
    }

    #[tokio::test]
    async fn test_duplicate_position_is_accepted_once() {
        let (tx, mut rx) = evaluation_channel();
        let engine = StockfishEngine::new(&config("/nonexistent/stockfish"), tx);

        engine.analyze(QueueItem::new("a", vec![], 20)).await.unwrap();
        engine.analyze(QueueItem::new("a", vec![], 20)).await.unwrap();
        assert_eq!(engine.in_flight(), 1);

        // The search fails to start: the position is released, nothing is sent.
        wait_idle(&engine).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_guard_clears_position_unless_handed_over() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        lock(&in_flight).insert("failed".to_string());
        lock(&in_flight).insert("sent".to_string());

        drop(InFlightGuard::new(&in_flight, "failed"));
        InFlightGuard::new(&in_flight, "sent").hand_over();

        assert!(!lock(&in_flight).contains("failed"));
        assert!(lock(&in_flight).contains("sent"));
    }

    #[tokio::test]
    async fn test_sent_position_is_not_searched_again_until_released() {
        let (tx, _rx) = evaluation_channel();
        let engine = StockfishEngine::new(&config("/nonexistent/stockfish"), tx);
        // Result for "a" sent and waiting in the channel.
        lock(&engine.in_flight).insert("a".to_string());

        engine.analyze(QueueItem::new("a", vec![], 20)).await.unwrap();
        assert_eq!(engine.in_flight(), 1);

        engine.release("a");
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_jobs() {
        let (tx, rx) = evaluation_channel();
        drop(rx);
        let engine = StockfishEngine::new(&config("stockfish"), tx);

        assert!(engine.analyze(QueueItem::new("a", vec![], 20)).await.is_err());
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Stockfish"]
    async fn test_stockfish_start_position() {
        let (tx, mut rx) = evaluation_channel();
        let engine = StockfishEngine::new(&config("stockfish"), tx);
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

        engine.analyze(QueueItem::new(fen, vec![], 10)).await.unwrap();
        let result = rx.recv().await.unwrap();

        assert_eq!(result.fen, fen);
        assert!(result.depth >= 18);
        assert!(result.is_usable());
    }
}
