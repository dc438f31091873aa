use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::anomaly::engine::AnomalyEngine;
use crate::config::Config;
use crate::db::repository::{self, AnomalyStore, RetryPolicy};
use crate::ingest::batch::{self, BatchFault};
use crate::ingest::object_store::ObjectStore;
use crate::ingest::types::{ObjectRef, TriggerEvent};

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "fault", rename_all = "snake_case")]
pub enum BatchStatus {
    Processed,
    Skipped(BatchFault),
    /// The invocation deadline expired. Records written before it stay written.
    DeadlineExceeded,
}

/// Result of processing one batch object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub container: String,
    pub key: String,
    #[serde(flatten)]
    pub status: BatchStatus,
    pub records_seen: usize,
    pub records_skipped: usize,
    pub anomalies_written: usize,
    pub write_failures: usize,
}

impl BatchReport {
    fn new(object: &ObjectRef, status: BatchStatus) -> Self {
        Self {
            container: object.container.clone(),
            key: object.key.clone(),
            status,
            records_seen: 0,
            records_skipped: 0,
            anomalies_written: 0,
            write_failures: 0,
        }
    }
}

/// Result of one trigger event. Always success-shaped; faults show up in the counters.
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub started_at: DateTime<Utc>,
    pub batches: Vec<BatchReport>,
}

impl EventReport {
    pub fn anomalies_written(&self) -> usize {
        self.batches.iter().map(|b| b.anomalies_written).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Clear,
    Written,
    Skipped,
    WriteFailed,
}

/// Orchestrates one trigger event end to end:
/// 1. Source check
/// 2. Batch load and parse
/// 3. Per-record scoring (features, model, rule, decision)
/// 4. Persistence of flagged records
pub struct BatchPipeline {
    source_container: String,
    objects: Arc<dyn ObjectStore>,
    engine: AnomalyEngine,
    store: Arc<dyn AnomalyStore>,
    retry: RetryPolicy,
    batch_timeout: Duration,
    concurrency: usize,
}

impl BatchPipeline {
    pub fn new(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        engine: AnomalyEngine,
        store: Arc<dyn AnomalyStore>,
    ) -> Self {
        Self {
            source_container: config.source.container.clone(),
            objects,
            engine,
            store,
            retry: RetryPolicy::from_config(&config.store),
            batch_timeout: Duration::from_secs(config.pipeline.batch_timeout_secs),
            concurrency: config.pipeline.concurrency.max(1),
        }
    }

    pub fn model_enabled(&self) -> bool {
        self.engine.model_enabled()
    }

    pub fn store(&self) -> &Arc<dyn AnomalyStore> {
        &self.store
    }

    /// Process every object named by the event. Batches are independent, but they share
    /// one invocation deadline: batches it cuts off are reported as `DeadlineExceeded`.
    pub async fn handle_event(&self, event: &TriggerEvent) -> EventReport {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.batch_timeout;
        let objects = event.objects();
        tracing::info!(batches = objects.len(), "Trigger event received");

        let mut batches = Vec::with_capacity(objects.len());
        for object in &objects {
            let report = self.process_batch(object, deadline).await;
            tracing::info!(
                container = %report.container,
                key = %report.key,
                status = ?report.status,
                records_seen = report.records_seen,
                records_skipped = report.records_skipped,
                anomalies_written = report.anomalies_written,
                write_failures = report.write_failures,
                "Batch finished"
            );
            batches.push(report);
        }

        EventReport { started_at, batches }
    }

    /// Process one batch object. Never fails: faults are reported in the result.
    async fn process_batch(&self, object: &ObjectRef, deadline: Instant) -> BatchReport {
        if object.container != self.source_container {
            let fault = BatchFault::SourceMismatch {
                expected: self.source_container.clone(),
                actual: object.container.clone(),
            };
            tracing::warn!(key = %object.key, error = %fault, "Skipping batch from unexpected source");
            return BatchReport::new(object, BatchStatus::Skipped(fault));
        }

        if Instant::now() >= deadline {
            tracing::warn!(key = %object.key, "Invocation deadline passed before batch started");
            return BatchReport::new(object, BatchStatus::DeadlineExceeded);
        }

        let load = self.objects.get_object(&object.container, &object.key);
        let payload = match tokio::time::timeout_at(deadline, load).await {
            Err(_) => {
                tracing::warn!(key = %object.key, "Invocation deadline passed while loading batch");
                return BatchReport::new(object, BatchStatus::DeadlineExceeded);
            }
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                let fault = BatchFault::Unreadable(e.to_string());
                tracing::warn!(key = %object.key, error = %fault, "Skipping unreadable batch");
                return BatchReport::new(object, BatchStatus::Skipped(fault));
            }
        };

        let records = match batch::parse_batch(&payload) {
            Ok(records) => records,
            Err(fault) => {
                tracing::warn!(key = %object.key, error = %fault, "Skipping malformed batch");
                return BatchReport::new(object, BatchStatus::Skipped(fault));
            }
        };

        tracing::info!(key = %object.key, transactions = records.len(), "Loaded batch");
        self.score_records(object, &records, deadline).await
    }

    async fn score_records(
        &self,
        object: &ObjectRef,
        records: &[JsonValue],
        deadline: Instant,
    ) -> BatchReport {
        let mut report = BatchReport::new(object, BatchStatus::Processed);
        report.records_seen = records.len();

        // Built before entering the stream so the handler future stays Send.
        let pending: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(index, value)| self.process_record(index, value, &object.key))
            .collect();
        let outcomes = futures::stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .take_until(tokio::time::sleep_until(deadline));
        tokio::pin!(outcomes);

        let mut finished = 0usize;
        while let Some(outcome) = outcomes.next().await {
            finished += 1;
            match outcome {
                RecordOutcome::Clear => {}
                RecordOutcome::Written => report.anomalies_written += 1,
                RecordOutcome::Skipped => report.records_skipped += 1,
                RecordOutcome::WriteFailed => report.write_failures += 1,
            }
        }

        if finished < records.len() {
            tracing::warn!(
                key = %object.key,
                finished,
                total = records.len(),
                timeout_secs = self.batch_timeout.as_secs(),
                "Batch deadline exceeded, remaining records not processed"
            );
            report.status = BatchStatus::DeadlineExceeded;
        }

        report
    }

    async fn process_record(&self, index: usize, value: &JsonValue, source_key: &str) -> RecordOutcome {
        let tx = match batch::parse_record(value) {
            Ok(tx) => tx,
            Err(fault) => {
                tracing::warn!(key = %source_key, index, error = %fault, "Skipping malformed record");
                return RecordOutcome::Skipped;
            }
        };

        let assessment = self.engine.assess(&tx).await;
        let Some(record) = assessment.into_record(&tx, source_key) else {
            tracing::debug!(transaction_id = %tx.transaction_id, "Transaction clear");
            return RecordOutcome::Clear;
        };

        tracing::info!(
            transaction_id = %record.transaction_id,
            amount = %record.amount,
            reason = record.reason.as_str(),
            score = ?record.anomaly_score.as_ref().map(|s| s.to_string()),
            "Flagging anomaly"
        );

        match repository::persist_with_retry(self.store.as_ref(), &record, self.retry).await {
            Ok(()) => RecordOutcome::Written,
            Err(e) => {
                tracing::error!(
                    transaction_id = %record.transaction_id,
                    error = %e,
                    "Failed to persist anomaly"
                );
                RecordOutcome::WriteFailed
            }
        }
    }
}
