//! Error types for the squall ingestion pipeline.
//!
//! One enum per failure domain. Configuration and fetch errors are terminal
//! for a run; storage and bus errors are captured into per-sink outcomes by
//! the fanout layer and only surface here when a precondition is violated.

use snafu::prelude::*;

/// Errors for a structurally invalid run configuration.
///
/// These abort the run before any I/O is attempted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Pub/sub was requested without a project id.
    #[snafu(display("Pub/sub requested but no project id was provided"))]
    MissingProject,

    /// Pub/sub was requested without a topic.
    #[snafu(display("Pub/sub requested but no topic was provided"))]
    MissingTopic,

    /// Storage was requested but no bucket could be determined.
    #[snafu(display("Storage requested but no bucket was provided"))]
    MissingBucket,

    /// No sink is enabled for this run.
    #[snafu(display("No sink is enabled; a run must produce at least one output"))]
    NoSinkEnabled,

    /// A sink is enabled but no backend handle was wired for it.
    #[snafu(display("{sink} sink is enabled but no backend was configured"))]
    SinkUnavailable { sink: &'static str },
}

/// Errors that can occur while fetching from the upstream source.
///
/// Fatal for the run: a failed fetch yields zero records and no fanout.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The attempt budget was exhausted without a usable payload.
    #[snafu(display("Upstream fetch failed after {attempts} attempt(s): {reason}"))]
    Exhausted { attempts: usize, reason: String },

    /// Failed to read a source file from object storage.
    #[snafu(display("Failed to read source data: {source}"))]
    SourceRead { source: StoreError },

    /// The configured input file does not exist.
    #[snafu(display("Input {path} not found in bucket {bucket}"))]
    MissingInput { bucket: String, path: String },

    /// The source cannot run with the parameters it was given.
    #[snafu(display("Invalid source parameters: {message}"))]
    BadQuery { message: String },
}

/// Errors that can occur during blob storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// The target bucket does not exist or is unreachable.
    #[snafu(display("Cannot access bucket {bucket}"))]
    BucketMissing { bucket: String },

    /// Failed to construct a backend handle for the bucket.
    #[snafu(display("Failed to open storage backend for {bucket}: {source}"))]
    Backend {
        bucket: String,
        source: object_store::Error,
    },

    /// IO error on the local storage root.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },
}

impl StoreError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            StoreError::BucketMissing { .. } => true,
            _ => false,
        }
    }
}

/// Errors that can occur while publishing to the message bus.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BusError {
    /// Transport-level publish failure.
    #[snafu(display("Publish transport error: {source}"))]
    Transport { source: reqwest::Error },

    /// The bus endpoint rejected the publish.
    #[snafu(display("Publish rejected with status {status}"))]
    Rejected { status: u16 },

    /// Failed to serialize the publish request body.
    #[snafu(display("Failed to serialize publish request: {source}"))]
    Serialize { source: serde_json::Error },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Fetch error.
    #[snafu(display("Fetch error: {source}"))]
    Fetch { source: FetchError },

    /// Storage error outside the fanout boundary.
    #[snafu(display("Storage error: {source}"))]
    Store { source: StoreError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<FetchError> for PipelineError {
    fn from(source: FetchError) -> Self {
        PipelineError::Fetch { source }
    }
}

impl From<StoreError> for PipelineError {
    fn from(source: StoreError) -> Self {
        PipelineError::Store { source }
    }
}
