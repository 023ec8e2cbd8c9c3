//! Trigger payload resolution.
//!
//! The same job must be invocable from several trigger shapes (query
//! string, JSON body, wrapped JSON body, nothing at all) without the caller
//! knowing which one is in play. Resolution tries a fixed set of extraction
//! strategies in priority order; each is a pure function from the transport
//! abstraction to an optional configuration value. Resolution itself never
//! hard-fails: unparseable input degrades to an empty configuration and
//! failures surface later at field-level validation.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::{PubsubTarget, RunConfig, StorageTarget};
use crate::feeds::Feed;

/// Sink-addressing fields every feed recognizes in a bare parameter set.
const SINK_FIELDS: &[&str] = &["bucket", "path", "topic", "projectId"];

/// Opaque, partially-structured trigger input.
///
/// Produced by the hosting transport (HTTP query string, JSON body, or a
/// command line mimicking either); not owned by the core.
#[derive(Debug, Clone, Default)]
pub struct TriggerPayload {
    /// Query-style parameters, when the transport carried any.
    pub query: Option<Map<String, Value>>,
    /// Structured body, when the transport carried one.
    pub body: Option<Value>,
}

impl TriggerPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_body(body: Value) -> Self {
        Self {
            query: None,
            body: Some(body),
        }
    }
}

/// Where the configuration was found, in priority order.
#[derive(Debug)]
enum Extraction {
    QueryEmbeddedMessage(Value),
    QueryFieldSet(Map<String, Value>),
    BodyEmbeddedMessage(Value),
    BareBody(Value),
    Empty,
}

fn extract(payload: &TriggerPayload, expected_fields: &[&str]) -> Extraction {
    if let Some(query) = &payload.query {
        if let Some(message) = query.get("message") {
            return Extraction::QueryEmbeddedMessage(message.clone());
        }
        let recognized = SINK_FIELDS
            .iter()
            .chain(expected_fields.iter())
            .any(|field| query.contains_key(*field));
        if recognized {
            return Extraction::QueryFieldSet(query.clone());
        }
    }
    if let Some(body) = &payload.body {
        if let Some(message) = body.as_object().and_then(|object| object.get("message")) {
            return Extraction::BodyEmbeddedMessage(message.clone());
        }
        return Extraction::BareBody(body.clone());
    }
    Extraction::Empty
}

/// Reduce an extracted value to a field map. Text must parse as JSON; a
/// parse failure yields an empty map rather than an error.
fn to_message(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!("Trigger message is not an object: {other}");
                Map::new()
            }
            Err(e) => {
                error!("Cannot parse trigger message {text:?}: {e}");
                Map::new()
            }
        },
        other => {
            warn!("Trigger message has unusable shape: {other}");
            Map::new()
        }
    }
}

/// Resolve a trigger payload into the canonical run configuration,
/// applying the feed's defaults after extraction.
pub fn resolve(payload: &TriggerPayload, feed: &dyn Feed) -> RunConfig {
    let extraction = extract(payload, feed.expected_fields());
    debug!("Trigger resolved via {extraction:?}");

    let message = match extraction {
        Extraction::QueryEmbeddedMessage(value) => to_message(value),
        Extraction::QueryFieldSet(map) => map,
        Extraction::BodyEmbeddedMessage(value) => to_message(value),
        Extraction::BareBody(value) => to_message(value),
        Extraction::Empty => {
            warn!("Trigger carried no message; using defaults");
            Map::new()
        }
    };

    let mut storage_enabled = bool_field(&message, "storage");
    let pubsub_enabled = bool_field(&message, "pubsub");
    // A run must always produce at least one observable output.
    if !storage_enabled && !pubsub_enabled {
        storage_enabled = true;
    }

    let project = string_field(&message, "projectId")
        .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok().filter(|s| !s.is_empty()));
    let topic = string_field(&message, "topic");

    let pubsub_target = pubsub_enabled.then(|| PubsubTarget {
        project: project.clone().unwrap_or_default(),
        topic: topic.unwrap_or_default(),
    });

    let bucket = string_field(&message, "bucket")
        .or_else(|| project.as_ref().map(|project| format!("{project}_data")));
    let mut path = string_field(&message, "path")
        .unwrap_or_else(|| feed.default_path().to_string());
    if bool_field(&message, "addTimestamp") {
        // A fresh segment per run, so repeated runs don't overwrite an
        // existing set of files.
        path = format!(
            "{path}/timestamp={}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S")
        );
    }
    let storage_target = storage_enabled.then(|| StorageTarget {
        bucket: bucket.unwrap_or_default(),
        path,
    });

    let limit = limit_field(&message).or_else(|| feed.default_limit());
    let split_records = message
        .get("separateLines")
        .map(|value| !matches!(value, Value::Bool(false)))
        .unwrap_or_else(|| feed.default_split());

    RunConfig {
        storage_enabled,
        pubsub_enabled,
        storage_target,
        pubsub_target,
        limit,
        split_records,
        debug: debug_field(&message),
        params: message,
    }
}

/// Truthy check accepting booleans and their string forms.
fn bool_field(message: &Map<String, Value>, name: &str) -> bool {
    match message.get(name) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

/// Non-empty trimmed string field.
fn string_field(message: &Map<String, Value>, name: &str) -> Option<String> {
    message
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Positive integer, accepting numeric strings; anything else defers to
/// the feed default.
fn limit_field(message: &Map<String, Value>) -> Option<usize> {
    let limit = match message.get("limit") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    limit.filter(|limit| *limit > 0)
}

/// Log-level token: level names pass through, numeric Python-style levels
/// are translated, anything else falls back to "info".
fn debug_field(message: &Map<String, Value>) -> String {
    match message.get("debug") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_lowercase(),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(level) if level <= 10 && level > 0 => "debug".to_string(),
            Some(20) => "info".to_string(),
            Some(30) => "warn".to_string(),
            Some(level) if level >= 40 => "error".to_string(),
            _ => "info".to_string(),
        },
        _ => "info".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::record::normalize::RowSchema;
    use crate::source::{RawBatch, UpstreamSource};
    use async_trait::async_trait;
    use serde_json::json;

    struct StubFeed;

    #[async_trait]
    impl UpstreamSource for StubFeed {
        async fn fetch(&self, _config: &RunConfig) -> Result<RawBatch, FetchError> {
            Ok(RawBatch::Rows(vec![]))
        }
    }

    impl Feed for StubFeed {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn expected_fields(&self) -> &'static [&'static str] {
            &["query"]
        }
        fn default_path(&self) -> &'static str {
            "stub_data"
        }
        fn default_limit(&self) -> Option<usize> {
            Some(50)
        }
        fn schema(&self) -> RowSchema {
            RowSchema::Structured {
                epoch_fields: vec![],
            }
        }
    }

    fn query(pairs: &[(&str, Value)]) -> Option<Map<String, Value>> {
        let mut map = Map::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), value.clone());
        }
        Some(map)
    }

    #[test]
    fn test_query_embedded_message_wins_over_body() {
        let payload = TriggerPayload {
            query: query(&[("message", json!(r#"{"bucket":"b1"}"#))]),
            body: Some(json!({"bucket": "b2"})),
        };
        let config = resolve(&payload, &StubFeed);
        assert_eq!(config.storage_target.unwrap().bucket, "b1");
    }

    #[test]
    fn test_query_field_set_used_when_recognized() {
        let payload = TriggerPayload {
            query: query(&[("bucket", json!("qb")), ("storage", json!("true"))]),
            body: None,
        };
        let config = resolve(&payload, &StubFeed);
        assert!(config.storage_enabled);
        assert_eq!(config.storage_target.unwrap().bucket, "qb");
    }

    #[test]
    fn test_unrecognized_query_falls_through_to_body() {
        let payload = TriggerPayload {
            query: query(&[("unrelated", json!("x"))]),
            body: Some(json!({"bucket": "bb"})),
        };
        let config = resolve(&payload, &StubFeed);
        assert_eq!(config.storage_target.unwrap().bucket, "bb");
    }

    #[test]
    fn test_body_embedded_message_wins_over_bare_body() {
        let payload = TriggerPayload::from_body(json!({
            "message": {"bucket": "inner"},
            "bucket": "outer",
        }));
        let config = resolve(&payload, &StubFeed);
        assert_eq!(config.storage_target.unwrap().bucket, "inner");
    }

    #[test]
    fn test_unparseable_message_degrades_to_defaults() {
        let payload = TriggerPayload {
            query: query(&[("message", json!("{not json"))]),
            body: None,
        };
        let config = resolve(&payload, &StubFeed);
        assert!(config.storage_enabled);
        assert_eq!(config.limit, Some(50));
        assert_eq!(config.storage_target.unwrap().path, "stub_data");
    }

    #[test]
    fn test_storage_defaults_on_when_neither_sink_requested() {
        let config = resolve(&TriggerPayload::empty(), &StubFeed);
        assert!(config.storage_enabled);
        assert!(!config.pubsub_enabled);
    }

    #[test]
    fn test_bucket_defaults_from_project() {
        let payload = TriggerPayload::from_body(json!({
            "projectId": "my-proj",
            "pubsub": true,
            "topic": "t",
            "storage": true,
        }));
        let config = resolve(&payload, &StubFeed);
        assert_eq!(config.storage_target.unwrap().bucket, "my-proj_data");
        assert_eq!(config.pubsub_target.unwrap().project, "my-proj");
    }

    #[test]
    fn test_limit_accepts_numeric_string() {
        let payload = TriggerPayload::from_body(json!({"limit": "7"}));
        assert_eq!(resolve(&payload, &StubFeed).limit, Some(7));

        let payload = TriggerPayload::from_body(json!({"limit": ""}));
        assert_eq!(resolve(&payload, &StubFeed).limit, Some(50));
    }

    #[test]
    fn test_add_timestamp_appends_segment() {
        let payload = TriggerPayload::from_body(json!({
            "bucket": "b",
            "path": "p",
            "addTimestamp": "true",
        }));
        let config = resolve(&payload, &StubFeed);
        let path = config.storage_target.unwrap().path;
        assert!(path.starts_with("p/timestamp="));
    }

    #[test]
    fn test_separate_lines_presence_enables_split() {
        let payload = TriggerPayload::from_body(json!({"separateLines": true}));
        assert!(resolve(&payload, &StubFeed).split_records);

        let payload = TriggerPayload::from_body(json!({"separateLines": false}));
        assert!(!resolve(&payload, &StubFeed).split_records);

        assert!(!resolve(&TriggerPayload::empty(), &StubFeed).split_records);
    }

    #[test]
    fn test_debug_tokens() {
        let payload = TriggerPayload::from_body(json!({"debug": 10}));
        assert_eq!(resolve(&payload, &StubFeed).debug, "debug");

        let payload = TriggerPayload::from_body(json!({"debug": "WARN"}));
        assert_eq!(resolve(&payload, &StubFeed).debug, "warn");

        assert_eq!(resolve(&TriggerPayload::empty(), &StubFeed).debug, "info");
    }
}
