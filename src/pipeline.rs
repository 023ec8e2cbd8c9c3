//! Pipeline orchestration.
//!
//! One invocation is a bounded, one-shot batch job: resolve the trigger,
//! validate the configuration, fetch, normalize, fan out, report. A fetch
//! failure is terminal and produces no partial fanout; sink and record
//! failures are captured downstream and reported in the summary. Sink
//! handles arrive in a caller-constructed [`SinkSet`]; invocations share no
//! mutable state beyond those read-only handles.

use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{ConfigSnafu, FetchSnafu, PipelineError};
use crate::feeds::Feed;
use crate::record::normalize::Normalizer;
use crate::record::Record;
use crate::sink::{self, RunSummary, SinkSet};
use crate::trigger::{self, TriggerPayload};

/// Run one ingestion job end to end.
pub async fn run(
    payload: &TriggerPayload,
    feed: &dyn Feed,
    sinks: &SinkSet,
) -> Result<RunSummary, PipelineError> {
    let config = trigger::resolve(payload, feed);
    info!(
        feed = feed.name(),
        storage = config.storage_enabled,
        pubsub = config.pubsub_enabled,
        split = config.split_records,
        limit = config.limit,
        "Resolved trigger"
    );

    // Structural invariants fail the run before any I/O.
    config.validate().context(ConfigSnafu)?;

    // All-or-nothing: a failed fetch means zero records and no fanout.
    let batch = feed.fetch(&config).await.context(FetchSnafu)?;
    debug!("Fetched {} batch from {}", batch.shape(), feed.name());

    let normalizer = Normalizer::new(feed.schema());
    let records: Vec<Record> = normalizer.normalize(&batch, config.limit).collect();
    info!("Normalized {} record(s)", records.len());

    let summary = sink::deliver(&records, &config, sinks)
        .await
        .context(ConfigSnafu)?;
    info!("{summary}");
    Ok(summary)
}
