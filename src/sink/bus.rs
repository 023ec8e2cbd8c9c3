//! Message bus capability and backends.
//!
//! `publish` hands back a pending future without awaiting it, so the fanout
//! can issue every publish in a batch first and join them as a second
//! phase, overlapping network latency instead of serializing it.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use snafu::prelude::*;

use crate::error::{BusError, RejectedSnafu, TransportSnafu};

/// A publish that has been issued but not yet completed.
pub type PendingPublish = BoxFuture<'static, Result<(), BusError>>;

/// Capability interface for the message bus.
pub trait MessageBus: Send + Sync {
    /// Issue a publish without waiting for completion.
    ///
    /// Attribute values are stringified; only primitives should be passed.
    fn publish(
        &self,
        project: &str,
        topic: &str,
        data: Bytes,
        attributes: &Map<String, Value>,
    ) -> PendingPublish;
}

/// REST backend posting Pub/Sub-style `:publish` requests.
pub struct RestBus {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RestBus {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Endpoint from `PUBSUB_ENDPOINT`, bearer token from `PUBSUB_TOKEN`.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("PUBSUB_ENDPOINT")
            .unwrap_or_else(|_| "https://pubsub.googleapis.com".to_string());
        Self::new(endpoint, std::env::var("PUBSUB_TOKEN").ok())
    }
}

impl MessageBus for RestBus {
    fn publish(
        &self,
        project: &str,
        topic: &str,
        data: Bytes,
        attributes: &Map<String, Value>,
    ) -> PendingPublish {
        let url = format!(
            "{}/v1/projects/{project}/topics/{topic}:publish",
            self.endpoint
        );
        let client = self.client.clone();
        let token = self.token.clone();

        let attributes: Map<String, Value> = attributes
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), Value::String(text))
            })
            .collect();
        let body = json!({
            "messages": [{
                "data": BASE64.encode(&data),
                "attributes": attributes,
            }]
        });

        Box::pin(async move {
            let mut request = client.post(&url).json(&body);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await.context(TransportSnafu)?;
            let status = response.status();
            ensure!(
                status.is_success(),
                RejectedSnafu {
                    status: status.as_u16(),
                }
            );
            Ok(())
        })
    }
}

/// A message captured by [`MemoryBus`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub project: String,
    pub topic: String,
    pub data: Bytes,
    pub attributes: Map<String, Value>,
}

/// In-memory bus for tests and dry runs.
#[derive(Default)]
pub struct MemoryBus {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl MessageBus for MemoryBus {
    fn publish(
        &self,
        project: &str,
        topic: &str,
        data: Bytes,
        attributes: &Map<String, Value>,
    ) -> PendingPublish {
        let message = PublishedMessage {
            project: project.to_string(),
            topic: topic.to_string(),
            data,
            attributes: attributes.clone(),
        };
        {
            let mut messages = self
                .messages
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            messages.push(message);
        }
        Box::pin(async { Ok(()) })
    }
}
