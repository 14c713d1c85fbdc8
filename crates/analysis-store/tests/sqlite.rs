//! End-to-end tests running the orchestrator on the SQLite collaborators.

use std::sync::{Arc, Mutex};

use analysis_queue::{AnalysisEngine, EvaluationResult, Orchestrator, QueueItem};
use analysis_store::{init_db, SqliteQueue, SqliteStore, StoredEvaluations};
use async_trait::async_trait;

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl AnalysisEngine for RecordingEngine {
    async fn analyze(&self, item: QueueItem) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(item.fen);
        Ok(())
    }
}

fn line() -> Vec<String> {
    vec!["d3".to_string(), "d5".to_string()]
}

#[tokio::test]
async fn test_engine_result_is_reused_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = init_db(dir.path().join("analysis.db")).unwrap();
    let queue = SqliteQueue::new(db.clone());
    let store = SqliteStore::new(db);
    let engine = Arc::new(RecordingEngine::default());

    let orchestrator = Arc::new(
        Orchestrator::builder()
            .queue(Arc::new(queue.clone()))
            .store(Arc::new(store.clone()))
            .source(Arc::new(StoredEvaluations::new(store.clone())))
            .engine(engine.clone())
            .build()
            .unwrap(),
    );

    queue.enqueue(&QueueItem::new("pnK...", line(), 40)).unwrap();

    // Nothing stored yet: the position goes to the engine and stays queued.
    let outcome = orchestrator.run().await;
    assert_eq!(outcome.report().map(|r| r.delegated), Some(1));
    assert_eq!(*engine.calls.lock().unwrap(), vec!["pnK..."]);
    assert_eq!(queue.len().unwrap(), 1);

    // A shallow engine result is refused.
    let stale = orchestrator
        .register_evaluation(EvaluationResult::new("pnK...", "d4", 39, -0.1))
        .await;
    assert!(stale.is_err());
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(queue.len().unwrap(), 1);

    // The engine comes back with a deep enough result.
    orchestrator
        .register_evaluation(EvaluationResult::new("pnK...", "d4", 40, -0.24))
        .await
        .unwrap();
    assert_eq!(queue.len().unwrap(), 0);
    let saved = store.get(&line()).unwrap().unwrap();
    assert_eq!(saved.best_move.as_deref(), Some("d4"));
    assert_eq!(saved.depth, 40);
    assert_eq!(saved.score, -0.24);

    // The same line queued again is answered from the store.
    queue.enqueue(&QueueItem::new("pnK... (transposed)", line(), 35)).unwrap();
    let outcome = orchestrator.run().await;
    assert_eq!(outcome.report().map(|r| r.committed), Some(1));
    assert_eq!(engine.calls.lock().unwrap().len(), 1);
    assert_eq!(queue.len().unwrap(), 0);
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.db");

    {
        let queue = SqliteQueue::new(init_db(&path).unwrap());
        queue.enqueue(&QueueItem::new("a", line(), 20)).unwrap();
    }

    let queue = SqliteQueue::new(init_db(&path).unwrap());
    let items = queue.items().unwrap();
    assert_eq!(items, vec![QueueItem::new("a", line(), 20)]);
}
