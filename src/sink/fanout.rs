//! Batch delivery with isolated failure domains.
//!
//! Each enabled sink is attempted independently: a failing sink is captured
//! into its [`SinkOutcome`] and never aborts the sibling sink, and in split
//! mode a failing record never aborts the remaining records. The only
//! errors that propagate out of this layer are structural configuration
//! violations; everything else is counted and reported.

use std::fmt;

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::{info, warn};

use crate::config::{PubsubTarget, RunConfig, StorageTarget};
use crate::error::{
    ConfigError, MissingBucketSnafu, MissingProjectSnafu, SinkUnavailableSnafu,
};
use crate::record::key::{content_key_for_bytes, SequenceKeys};
use crate::record::Record;
use crate::sink::{BlobStore, MessageBus, PendingPublish, SinkSet};

/// The kind of destination a batch was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Storage,
    Pubsub,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Storage => write!(f, "storage"),
            SinkKind::Pubsub => write!(f, "pubsub"),
        }
    }
}

/// Per-sink delivery result.
#[derive(Debug, Clone, Serialize)]
pub struct SinkOutcome {
    pub kind: SinkKind,
    pub target: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub first_error: Option<String>,
}

impl SinkOutcome {
    fn new(kind: SinkKind, target: String, attempted: usize) -> Self {
        Self {
            kind,
            target,
            attempted,
            succeeded: 0,
            first_error: None,
        }
    }

    fn capture(&mut self, error: impl fmt::Display) {
        let message = error.to_string();
        warn!("{} delivery failure for {}: {message}", self.kind, self.target);
        if self.first_error.is_none() {
            self.first_error = Some(message);
        }
    }
}

/// Aggregated result of one pipeline invocation.
///
/// Distinguishes "records fetched" from per-sink delivery counts, so a
/// silent total failure is never mistaken for an empty upstream.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub fetched: usize,
    pub outcomes: Vec<SinkOutcome>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetched {} record(s)", self.fetched)?;
        for outcome in &self.outcomes {
            let verb = match outcome.kind {
                SinkKind::Storage => "stored",
                SinkKind::Pubsub => "published",
            };
            write!(
                f,
                "; {verb} {}/{} to {}",
                outcome.succeeded, outcome.attempted, outcome.target
            )?;
            if let Some(error) = &outcome.first_error {
                write!(f, " (first error: {error})")?;
            }
        }
        Ok(())
    }
}

/// Deliver a batch of records to every enabled sink.
///
/// Returns an error only for structural precondition violations; delivery
/// failures are captured in the summary.
pub async fn deliver(
    records: &[Record],
    config: &RunConfig,
    sinks: &SinkSet,
) -> Result<RunSummary, ConfigError> {
    let mut outcomes = Vec::new();

    if config.storage_enabled {
        let target = config.storage_target.as_ref().context(MissingBucketSnafu)?;
        let store = sinks
            .store
            .as_ref()
            .context(SinkUnavailableSnafu { sink: "storage" })?;
        outcomes.push(deliver_storage(records, target, store.as_ref(), config.split_records).await);
    }

    if config.pubsub_enabled {
        let target = config.pubsub_target.as_ref().context(MissingProjectSnafu)?;
        let bus = sinks
            .bus
            .as_ref()
            .context(SinkUnavailableSnafu { sink: "pubsub" })?;
        outcomes.push(deliver_pubsub(records, target, bus.as_ref(), config.split_records).await);
    }

    Ok(RunSummary {
        fetched: records.len(),
        outcomes,
    })
}

/// Serialize records as one newline-delimited JSON document.
fn ndjson(records: &[Record]) -> String {
    let mut doc = String::new();
    for record in records {
        doc.push_str(&record.to_line());
        doc.push('\n');
    }
    doc
}

/// Primitive record fields, stringified for use as message attributes.
fn primitive_attributes(record: &Record) -> Map<String, Value> {
    record
        .iter()
        .filter_map(|(name, value)| match value {
            Value::String(s) => Some((name.clone(), Value::String(s.clone()))),
            Value::Number(_) | Value::Bool(_) => {
                Some((name.clone(), Value::String(value.to_string())))
            }
            _ => None,
        })
        .collect()
}

async fn deliver_storage(
    records: &[Record],
    target: &StorageTarget,
    store: &dyn BlobStore,
    split: bool,
) -> SinkOutcome {
    let label = format!("{}/{}", target.bucket, target.path);
    let mut outcome = SinkOutcome::new(SinkKind::Storage, label, records.len());
    if records.is_empty() {
        return outcome;
    }

    if split {
        // One object per record, named by the run-scoped sequence
        // generator. A failing record never aborts the remaining writes.
        let keys = SequenceKeys::new();
        for record in records {
            let path = format!("{}/{}.json", target.path, keys.next());
            match store
                .write(&target.bucket, &path, Bytes::from(record.to_line()))
                .await
            {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => outcome.capture(e),
            }
        }
    } else {
        // One content-addressed object for the whole batch: a retried run
        // with identical records overwrites the same object.
        let doc = ndjson(records);
        let key = content_key_for_bytes(doc.as_bytes());
        let path = format!("{}/{}.ndjson", target.path, key);
        match store.write(&target.bucket, &path, Bytes::from(doc)).await {
            Ok(()) => outcome.succeeded = records.len(),
            Err(e) => outcome.capture(e),
        }
    }

    info!(
        "Stored {}/{} record(s) to {}",
        outcome.succeeded, outcome.attempted, outcome.target
    );
    outcome
}

async fn deliver_pubsub(
    records: &[Record],
    target: &PubsubTarget,
    bus: &dyn MessageBus,
    split: bool,
) -> SinkOutcome {
    let label = format!("{}/{}", target.project, target.topic);
    let mut outcome = SinkOutcome::new(SinkKind::Pubsub, label, records.len());
    if records.is_empty() {
        return outcome;
    }

    // Issue every publish first, then join them as a second phase, so the
    // network latency of N publishes overlaps instead of serializing.
    let mut pending: Vec<PendingPublish> = Vec::new();
    if split {
        let keys = SequenceKeys::new();
        for record in records {
            let mut attributes = primitive_attributes(record);
            attributes.insert("key".to_string(), Value::String(keys.next()));
            pending.push(bus.publish(
                &target.project,
                &target.topic,
                Bytes::from(record.to_line()),
                &attributes,
            ));
        }
    } else {
        let doc = ndjson(records);
        let mut attributes = Map::new();
        attributes.insert(
            "key".to_string(),
            Value::String(content_key_for_bytes(doc.as_bytes())),
        );
        pending.push(bus.publish(
            &target.project,
            &target.topic,
            Bytes::from(doc),
            &attributes,
        ));
    }

    let batched_count = records.len();
    for result in join_all(pending).await {
        match result {
            Ok(()) if split => outcome.succeeded += 1,
            Ok(()) => outcome.succeeded = batched_count,
            Err(e) => outcome.capture(e),
        }
    }

    info!(
        "Published {}/{} record(s) to {}",
        outcome.succeeded, outcome.attempted, outcome.target
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BusError, StoreError};
    use crate::sink::MemoryBus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut record = Record::new();
        for (name, value) in pairs {
            record.insert(*name, value.clone());
        }
        record
    }

    fn sample_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| record(&[("id", json!(i)), ("name", json!(format!("row{i}")))]))
            .collect()
    }

    fn config(storage: bool, pubsub: bool, split: bool) -> RunConfig {
        RunConfig {
            storage_enabled: storage,
            pubsub_enabled: pubsub,
            storage_target: storage.then(|| StorageTarget {
                bucket: "bucket".into(),
                path: "path".into(),
            }),
            pubsub_target: pubsub.then(|| PubsubTarget {
                project: "proj".into(),
                topic: "topic".into(),
            }),
            limit: None,
            split_records: split,
            debug: "info".into(),
            params: Map::new(),
        }
    }

    /// Blob store that always fails.
    struct FailingStore;

    #[async_trait]
    impl BlobStore for FailingStore {
        async fn exists(&self, bucket: &str) -> Result<bool, StoreError> {
            Err(StoreError::BucketMissing {
                bucket: bucket.to_string(),
            })
        }
        async fn read(&self, bucket: &str, _path: &str) -> Result<Bytes, StoreError> {
            Err(StoreError::BucketMissing {
                bucket: bucket.to_string(),
            })
        }
        async fn write(&self, bucket: &str, _path: &str, _data: Bytes) -> Result<(), StoreError> {
            Err(StoreError::BucketMissing {
                bucket: bucket.to_string(),
            })
        }
    }

    /// Bus that rejects messages whose payload contains a marker.
    struct SelectiveBus {
        marker: &'static str,
    }

    impl MessageBus for SelectiveBus {
        fn publish(
            &self,
            _project: &str,
            _topic: &str,
            data: Bytes,
            _attributes: &Map<String, Value>,
        ) -> PendingPublish {
            let fail = String::from_utf8_lossy(&data).contains(self.marker);
            Box::pin(async move {
                if fail {
                    Err(BusError::Rejected { status: 500 })
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_abort_sibling() {
        let records = sample_records(3);
        let sinks = SinkSet::new(Some(Arc::new(FailingStore)), Some(Arc::new(MemoryBus::new())));
        let config = config(true, true, true);

        let summary = deliver(&records, &config, &sinks).await.unwrap();

        let storage = &summary.outcomes[0];
        assert_eq!(storage.kind, SinkKind::Storage);
        assert_eq!(storage.succeeded, 0);
        assert!(storage.first_error.is_some());

        let pubsub = &summary.outcomes[1];
        assert_eq!(pubsub.kind, SinkKind::Pubsub);
        assert_eq!(pubsub.succeeded, 3);
        assert!(pubsub.first_error.is_none());
    }

    #[tokio::test]
    async fn test_split_mode_counts_per_record_failures() {
        let records = sample_records(5);
        let bus = SelectiveBus { marker: "row2" };
        let sinks = SinkSet::new(None, Some(Arc::new(bus)));
        let config = config(false, true, true);

        let summary = deliver(&records, &config, &sinks).await.unwrap();

        let pubsub = &summary.outcomes[0];
        assert_eq!(pubsub.attempted, 5);
        assert_eq!(pubsub.succeeded, 4);
        assert!(pubsub.first_error.is_some());
    }

    #[tokio::test]
    async fn test_batched_pubsub_is_one_message() {
        let records = sample_records(3);
        let bus = Arc::new(MemoryBus::new());
        let sinks = SinkSet::new(None, Some(bus.clone()));
        let config = config(false, true, false);

        let summary = deliver(&records, &config, &sinks).await.unwrap();

        let messages = bus.messages();
        assert_eq!(messages.len(), 1);
        let body = String::from_utf8(messages[0].data.to_vec()).unwrap();
        assert_eq!(body.lines().count(), 3);
        assert_eq!(summary.outcomes[0].succeeded, 3);
        // The batched message is content-addressed.
        assert_eq!(messages[0].attributes["key"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_split_pubsub_carries_primitive_attributes() {
        let records = sample_records(1);
        let bus = Arc::new(MemoryBus::new());
        let sinks = SinkSet::new(None, Some(bus.clone()));
        let config = config(false, true, true);

        deliver(&records, &config, &sinks).await.unwrap();

        let messages = bus.messages();
        assert_eq!(messages[0].attributes["id"], json!("0"));
        assert_eq!(messages[0].attributes["name"], json!("row0"));
        assert!(messages[0].attributes.contains_key("key"));
    }

    #[tokio::test]
    async fn test_enabled_sink_without_handle_is_config_error() {
        let records = sample_records(1);
        let sinks = SinkSet::default();
        let config = config(true, false, false);

        let result = deliver(&records, &config, &sinks).await;
        assert!(matches!(result, Err(ConfigError::SinkUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_delivers_nothing() {
        let bus = Arc::new(MemoryBus::new());
        let sinks = SinkSet::new(None, Some(bus.clone()));
        let config = config(false, true, false);

        let summary = deliver(&[], &config, &sinks).await.unwrap();
        assert_eq!(summary.outcomes[0].attempted, 0);
        assert!(bus.messages().is_empty());
    }
}
