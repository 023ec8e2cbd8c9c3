//! Upstream source abstraction.
//!
//! A source produces one [`RawBatch`] per invocation, all-or-nothing: there
//! is no partial fetch. Implementations live with their feeds; the HTTP
//! transport with its bounded retry loop is in [`http`].

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RunConfig;
use crate::error::FetchError;

/// Number of attempts before a fetch is declared failed.
pub const FETCH_ATTEMPTS: usize = 5;

/// The unparsed response from an external source.
#[derive(Debug, Clone)]
pub enum RawBatch {
    /// Delimited text, one row per line.
    Text(String),
    /// Already-parsed structured rows.
    Rows(Vec<Value>),
}

impl RawBatch {
    /// Short label for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            RawBatch::Text(_) => "text",
            RawBatch::Rows(_) => "rows",
        }
    }
}

/// Capability interface for the upstream call.
///
/// `fetch` performs the external call with bounded retry and returns a raw
/// batch or a definitive failure. Implementations must not return partial
/// data.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn fetch(&self, config: &RunConfig) -> Result<RawBatch, FetchError>;
}
