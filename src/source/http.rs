//! HTTP transport for upstream feeds.
//!
//! Wraps a shared `reqwest` client with the fetch retry policy: up to
//! [`FETCH_ATTEMPTS`] immediate attempts, where "call succeeded but the
//! payload is unusable" counts against the budget the same way a transport
//! error does. The upstreams are best-effort public feeds, so there is no
//! backoff beyond the attempt cap.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ExhaustedSnafu, FetchError};
use crate::source::{RawBatch, FETCH_ATTEMPTS};

/// Shared HTTP client for feed fetches.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a JSON document and extract a batch from it.
    ///
    /// `extract` returns `None` when the response parsed but carries no
    /// usable payload; that attempt is counted and retried like any other
    /// failure. The error after exhaustion carries the last failure reason.
    pub async fn fetch_json<F>(
        &self,
        url: &str,
        query: &[(&str, String)],
        extract: F,
    ) -> Result<RawBatch, FetchError>
    where
        F: Fn(&Value) -> Option<RawBatch>,
    {
        self.fetch_with(url, query, |body| {
            let value: Value = match serde_json::from_str(body) {
                Ok(value) => value,
                Err(e) => return Err(format!("response is not valid JSON: {e}")),
            };
            extract(&value).ok_or_else(|| "response carried no usable payload".to_string())
        })
        .await
    }

    /// Fetch a text document, treating an empty body as unusable.
    pub async fn fetch_text(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        self.fetch_with(url, query, |body| {
            if body.trim().is_empty() {
                Err("response body is empty".to_string())
            } else {
                Ok(body.to_string())
            }
        })
        .await
    }

    async fn fetch_with<T, F>(
        &self,
        url: &str,
        query: &[(&str, String)],
        parse: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        let mut last_reason = String::from("no attempts made");

        for attempt in 1..=FETCH_ATTEMPTS {
            debug!("Fetching {url} (attempt {attempt}/{FETCH_ATTEMPTS})");

            let response = match self.inner.get(url).query(query).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_reason = format!("transport error: {e}");
                    warn!("Attempt {attempt} failed for {url}: {last_reason}");
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                last_reason = format!("upstream returned status {status}");
                warn!("Attempt {attempt} failed for {url}: {last_reason}");
                continue;
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    last_reason = format!("failed to read response body: {e}");
                    warn!("Attempt {attempt} failed for {url}: {last_reason}");
                    continue;
                }
            };

            match parse(&body) {
                Ok(batch) => return Ok(batch),
                Err(reason) => {
                    last_reason = reason;
                    warn!("Attempt {attempt} failed for {url}: {last_reason}");
                }
            }
        }

        ExhaustedSnafu {
            attempts: FETCH_ATTEMPTS,
            reason: last_reason,
        }
        .fail()
    }
}
