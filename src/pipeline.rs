// src/pipeline.rs
//! Wiring: feeds -> one channel -> evaluator task (detector, live store,
//! sinks) -> bounded queue -> indexer task.
//!
//! The evaluator owns the detector outright, so bucket state has exactly one
//! writer. Indexing never blocks evaluation: when its queue is full the record
//! is dropped from the index (it is still stored and written).

use anyhow::Result;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::detector::AnomalyDetector;
use crate::event::EventRecord;
use crate::retrieval::RagSystem;
use crate::sink::OutputSink;
use crate::sources::SourceManager;
use crate::store::LiveStore;

/// Pending records between feeds and the evaluator.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct Pipeline;

pub struct PipelineHandle {
    ingest: mpsc::Sender<EventRecord>,
    tasks: Vec<JoinHandle<()>>,
    feeds: usize,
}

impl PipelineHandle {
    /// Entry point for externally submitted records.
    pub fn sender(&self) -> mpsc::Sender<EventRecord> {
        self.ingest.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.ingest.is_closed()
    }

    pub fn feeds(&self) -> usize {
        self.feeds
    }

    pub fn abort(&self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

impl Pipeline {
    /// Open sinks and start the indexer, the evaluator and one task per enabled feed.
    pub fn spawn(
        cfg: &MonitorConfig,
        store: Arc<LiveStore>,
        rag: Arc<RagSystem>,
    ) -> Result<PipelineHandle> {
        let sink = OutputSink::open(&cfg.output)?;
        let detector = AnomalyDetector::from_config(cfg);
        let sources = SourceManager::from_config(cfg);
        let feeds = sources.len();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (index_tx, index_rx) = mpsc::channel(cfg.retrieval.queue_capacity);

        let mut tasks = Vec::with_capacity(feeds + 2);
        tasks.push(tokio::spawn(run_indexer(rag, index_rx)));
        tasks.push(tokio::spawn(async move {
            let report = run_consumer(rx, detector, store, sink, Some(index_tx)).await;
            tracing::info!(
                target: "pipeline",
                processed = report.processed,
                anomalies = report.anomalies,
                "evaluator stopped"
            );
        }));
        tasks.extend(sources.spawn_all(tx.clone()));

        tracing::info!(
            target: "pipeline",
            mode = cfg.mode.as_str(),
            feeds,
            "pipeline started"
        );

        Ok(PipelineHandle {
            ingest: tx,
            tasks,
            feeds,
        })
    }
}

/// Totals returned once the input channel closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub processed: u64,
    pub anomalies: u64,
    pub index_dropped: u64,
}

/// Evaluate records in arrival order until every sender is gone.
pub async fn run_consumer(
    mut rx: mpsc::Receiver<EventRecord>,
    mut detector: AnomalyDetector,
    store: Arc<LiveStore>,
    mut sink: OutputSink,
    indexer: Option<mpsc::Sender<EventRecord>>,
) -> ConsumerReport {
    let mut report = ConsumerReport::default();

    while let Some(record) = rx.recv().await {
        let record = detector.evaluate(record);
        report.processed += 1;
        if record.is_anomaly() {
            report.anomalies += 1;
        }
        counter!("events_total", "source" => record.source.to_string()).increment(1);

        store.push(&record);

        if let Err(e) = sink.write(&record) {
            tracing::warn!(target: "pipeline", error = ?e, "output write failed");
        }

        if let Some(q) = indexer.as_ref() {
            match q.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(r)) => {
                    report.index_dropped += 1;
                    counter!("index_dropped_total").increment(1);
                    tracing::warn!(target: "pipeline", source = %r.source, "index queue full, record not indexed");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(target: "pipeline", "indexer gone");
                }
            }
        }
    }

    report
}

/// Append queued records to the retrieval index; failures are logged and skipped.
pub async fn run_indexer(rag: Arc<RagSystem>, mut rx: mpsc::Receiver<EventRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = rag.add(&record).await {
            counter!("index_errors_total").increment(1);
            tracing::warn!(target: "pipeline", source = %record.source, error = %e, "indexing failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::rules::AnomalyRules;
    use crate::event::{payload, Location, Source};
    use crate::retrieval::{HashingEmbedder, MockGenerator, RetryPolicy};
    use std::time::Duration;

    fn iot(noise: f64) -> EventRecord {
        EventRecord::new(
            "2025-06-01T12:00:00Z",
            Source::IotSensors,
            payload([("noise_level", noise)]),
            Location::new(40.7128, -74.006),
        )
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(AnomalyRules::default(), Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn consumer_annotates_stores_and_forwards() {
        let (tx, rx) = mpsc::channel(8);
        let (itx, mut irx) = mpsc::channel(8);
        let store = Arc::new(LiveStore::with_capacity(10, 10));

        tx.send(iot(60.0)).await.unwrap();
        tx.send(iot(95.0)).await.unwrap();
        drop(tx);

        let report = run_consumer(rx, detector(), store.clone(), OutputSink::disabled(), Some(itx)).await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.anomalies, 1);
        assert_eq!(store.anomalies(10).len(), 1);

        assert!(!irx.recv().await.unwrap().is_anomaly());
        assert!(irx.recv().await.unwrap().is_anomaly());
    }

    #[tokio::test]
    async fn full_index_queue_drops_instead_of_blocking() {
        let (tx, rx) = mpsc::channel(8);
        let (itx, _irx) = mpsc::channel(1);
        let store = Arc::new(LiveStore::with_capacity(10, 10));

        for _ in 0..3 {
            tx.send(iot(50.0)).await.unwrap();
        }
        drop(tx);

        let report = run_consumer(rx, detector(), store.clone(), OutputSink::disabled(), Some(itx)).await;
        assert_eq!(report.processed, 3);
        assert_eq!(report.index_dropped, 2);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn indexer_fills_the_rag() {
        let rag = Arc::new(RagSystem::new(
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(MockGenerator::default()),
            RetryPolicy::default(),
            5,
        ));
        let (tx, rx) = mpsc::channel(4);
        tx.send(iot(70.0)).await.unwrap();
        tx.send(iot(71.0)).await.unwrap();
        drop(tx);
        run_indexer(rag.clone(), rx).await;
        assert_eq!(rag.document_count().await, 2);
    }
}
