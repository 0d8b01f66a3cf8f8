//! Worker pool over a bounded ingest queue.
//!
//! N workers pull documents off one bounded channel and run them through
//! the shared pipeline, giving cross-document parallelism with strict
//! per-document stage order. A full queue exerts backpressure: `submit`
//! waits for space, `try_submit` refuses immediately so transport layers
//! can answer 429.

use super::{CancellationToken, IngestResult, Pipeline};
use crate::extract::RawDocument;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Job {
    raw: RawDocument,
    force: bool,
    token: CancellationToken,
    result_tx: oneshot::Sender<IngestResult>,
}

/// Returned by `try_submit` when the queue is at capacity. Carries the
/// document back so the caller can retry.
#[derive(Debug)]
pub struct QueueFull(pub RawDocument);

impl std::fmt::Display for QueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ingest queue at capacity")
    }
}

impl std::error::Error for QueueFull {}

/// Handle to the running worker pool.
pub struct IngestWorkers {
    sender: mpsc::Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl IngestWorkers {
    /// Spawn `worker_count` workers over a queue of `capacity`.
    pub fn start(pipeline: Arc<Pipeline>, worker_count: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let receiver = Arc::clone(&receiver);
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { receiver.lock().await.recv().await };
                    let Some(job) = job else {
                        debug!(worker_id, "ingest queue closed, worker exiting");
                        break;
                    };
                    let result = pipeline
                        .process_cancellable(job.raw, job.force, job.token)
                        .await;
                    if job.result_tx.send(result).is_err() {
                        warn!(worker_id, "ingest result receiver dropped");
                    }
                }
            }));
        }

        Self { sender, handles }
    }

    /// Enqueue a document, waiting for queue space (backpressure).
    pub async fn submit(
        &self,
        raw: RawDocument,
        force: bool,
        token: CancellationToken,
    ) -> oneshot::Receiver<IngestResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let job = Job {
            raw,
            force,
            token,
            result_tx,
        };
        // Send fails only when all workers are gone; surface that as a
        // dropped receiver, which callers already handle.
        let _ = self.sender.send(job).await;
        result_rx
    }

    /// Enqueue without waiting; a full queue returns the document.
    pub fn try_submit(
        &self,
        raw: RawDocument,
        force: bool,
        token: CancellationToken,
    ) -> Result<oneshot::Receiver<IngestResult>, QueueFull> {
        let (result_tx, result_rx) = oneshot::channel();
        let job = Job {
            raw,
            force,
            token,
            result_tx,
        };
        self.sender.try_send(job).map_err(|error| match error {
            mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => {
                QueueFull(job.raw)
            }
        })?;
        Ok(result_rx)
    }

    /// Close the queue and wait for in-flight documents to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::embed::HashEmbedder;
    use crate::enrich::VocabularyService;
    use crate::llm::{FallbackChain, MockLlm};
    use crate::store::MemoryStore;

    fn test_pipeline(dir: &std::path::Path) -> Arc<Pipeline> {
        let mut chain = FallbackChain::new(5);
        chain.push(
            Arc::new(MockLlm::new("mock").with_fallback(
                r#"{"title": "A worker pool test document", "summary": "s",
                    "novelty": 0.9, "actionability": 0.9}"#,
            )),
            "m",
            2,
        );
        Arc::new(Pipeline::new(
            PipelineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(HashEmbedder::new(32)),
            Arc::new(chain),
            Arc::new(VocabularyService::empty()),
            dir,
        ))
    }

    #[tokio::test]
    async fn jobs_round_trip_through_workers() {
        let dir = tempfile::tempdir().unwrap();
        let workers = IngestWorkers::start(test_pipeline(dir.path()), 2, 8);

        let raw = RawDocument::new(
            b"A perfectly ordinary document about worker pools and queues in async runtimes."
                .to_vec(),
            "doc.txt",
        );
        let rx = workers
            .submit(raw, false, CancellationToken::new())
            .await;
        let result = rx.await.unwrap();
        assert_eq!(result.status.label(), "stored");

        workers.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_refuses_with_try_submit() {
        let dir = tempfile::tempdir().unwrap();
        // Zero workers never drain the queue; capacity 1 fills after one job.
        let pipeline = test_pipeline(dir.path());
        let (sender, _receiver) = mpsc::channel::<Job>(1);
        let workers = IngestWorkers {
            sender,
            handles: Vec::new(),
        };
        let _ = pipeline;

        let raw = || RawDocument::new(b"content".to_vec(), "a.txt");
        assert!(workers
            .try_submit(raw(), false, CancellationToken::new())
            .is_ok());
        assert!(workers
            .try_submit(raw(), false, CancellationToken::new())
            .is_err());
    }
}
