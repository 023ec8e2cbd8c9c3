//! Sink capabilities and fan-out.
//!
//! Sinks are capability interfaces, not concrete SDKs: the fanout layer
//! pattern-matches on typed errors from [`BlobStore`] and [`MessageBus`]
//! instead of suppressing exceptions around each call. Handles are
//! constructed once at process start and collected into a [`SinkSet`]
//! passed into the pipeline; there is no hidden global state.

pub mod bus;
pub mod fanout;
pub mod store;

pub use bus::{MemoryBus, MessageBus, PendingPublish, RestBus};
pub use fanout::{deliver, RunSummary, SinkKind, SinkOutcome};
pub use store::{BlobStore, StorePool};

use std::sync::Arc;

/// Already-initialized sink handles for one process.
///
/// A handle may be absent when the corresponding sink can never be enabled
/// for this process (e.g. no bus endpoint is configured); enabling a sink
/// whose handle is missing is a configuration error, not a delivery error.
#[derive(Clone, Default)]
pub struct SinkSet {
    pub store: Option<Arc<dyn BlobStore>>,
    pub bus: Option<Arc<dyn MessageBus>>,
}

impl SinkSet {
    pub fn new(store: Option<Arc<dyn BlobStore>>, bus: Option<Arc<dyn MessageBus>>) -> Self {
        Self { store, bus }
    }
}
