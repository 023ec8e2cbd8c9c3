//! Live flight state vectors.
//!
//! The upstream returns a `time` stamp and a `states` array of positional
//! arrays; each state is mapped onto named fields, with the query time
//! carried into every record. Epoch-seconds fields get human-readable
//! companions during normalization.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::RunConfig;
use crate::error::FetchError;
use crate::feeds::Feed;
use crate::record::normalize::RowSchema;
use crate::source::http::HttpClient;
use crate::source::{RawBatch, UpstreamSource};

const STATES_URL: &str = "https://opensky-network.org/api/states/all";

const DEFAULT_LIMIT: usize = 30;

#[derive(Clone, Copy)]
enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
}

/// Positional layout of one state vector.
const STATE_FIELDS: &[(&str, FieldKind)] = &[
    ("icao24", FieldKind::Str),
    ("callsign", FieldKind::Str),
    ("origin", FieldKind::Str),
    ("time", FieldKind::Int),
    ("contact", FieldKind::Int),
    ("longitude", FieldKind::Float),
    ("latitude", FieldKind::Float),
    ("baro_altitude", FieldKind::Float),
    ("on_ground", FieldKind::Bool),
    ("velocity", FieldKind::Float),
    ("heading", FieldKind::Float),
    ("vertical_rate", FieldKind::Float),
    ("sensors", FieldKind::Str),
    ("altitude", FieldKind::Float),
    ("squawk", FieldKind::Int),
    ("spi", FieldKind::Bool),
    ("position_source", FieldKind::Int),
];

pub struct FlightsFeed {
    http: HttpClient,
}

impl FlightsFeed {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

/// Convert one positional value to its declared kind, or null when the
/// entry is absent or malformed. Nulls are dropped during normalization.
fn convert(value: Option<&Value>, kind: FieldKind) -> Value {
    let value = match value {
        Some(value) if !value.is_null() => value,
        _ => return Value::Null,
    };
    match kind {
        FieldKind::Str => value
            .as_str()
            .map(|s| Value::String(s.trim().to_string()))
            .unwrap_or(Value::Null),
        FieldKind::Int => match value {
            Value::Number(n) if n.is_i64() => value.clone(),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        FieldKind::Float => value.as_f64().map(Value::from).unwrap_or(Value::Null),
        FieldKind::Bool => value.as_bool().map(Value::Bool).unwrap_or(Value::Null),
    }
}

/// Map a positional state array onto named fields.
fn state_to_row(state: &[Value], query_time: Option<i64>) -> Value {
    let mut row = Map::new();
    for (index, (name, kind)) in STATE_FIELDS.iter().enumerate() {
        row.insert(name.to_string(), convert(state.get(index), *kind));
    }
    if let Some(time) = query_time {
        row.insert("query_time".to_string(), Value::from(time));
    }
    Value::Object(row)
}

#[async_trait]
impl UpstreamSource for FlightsFeed {
    async fn fetch(&self, _config: &RunConfig) -> Result<RawBatch, FetchError> {
        self.http
            .fetch_json(STATES_URL, &[], |value| {
                // A response without states is unusable and retried.
                let states = value.get("states")?.as_array()?;
                let query_time = value.get("time").and_then(Value::as_i64);
                let rows = states
                    .iter()
                    .filter_map(Value::as_array)
                    .map(|state| state_to_row(state, query_time))
                    .collect();
                Some(RawBatch::Rows(rows))
            })
            .await
    }
}

impl Feed for FlightsFeed {
    fn name(&self) -> &'static str {
        "flights"
    }

    fn expected_fields(&self) -> &'static [&'static str] {
        &["query", "limit"]
    }

    fn default_path(&self) -> &'static str {
        "flights_streaming"
    }

    fn default_limit(&self) -> Option<usize> {
        Some(DEFAULT_LIMIT)
    }

    fn default_split(&self) -> bool {
        true
    }

    fn schema(&self) -> RowSchema {
        RowSchema::Structured {
            epoch_fields: vec!["time".into(), "contact".into(), "query_time".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_maps_positionally() {
        let state = vec![
            json!("ab1234"),
            json!("UAL123  "),
            json!("United States"),
            json!(1660521600),
            json!(1660521605),
            json!(-104.9),
            json!(39.7),
            json!(10000.5),
            json!(false),
            json!(250.0),
            json!(90.0),
            json!(1.5),
            Value::Null,
            json!(10500.0),
            json!("7700"),
            json!(false),
            json!(0),
        ];
        let row = state_to_row(&state, Some(1660521600));
        let object = row.as_object().unwrap();

        assert_eq!(object["icao24"], json!("ab1234"));
        assert_eq!(object["callsign"], json!("UAL123"));
        assert_eq!(object["squawk"], json!(7700));
        assert_eq!(object["sensors"], Value::Null);
        assert_eq!(object["on_ground"], json!(false));
        assert_eq!(object["query_time"], json!(1660521600));
    }

    #[test]
    fn test_short_state_pads_with_nulls() {
        let state = vec![json!("ab1234")];
        let row = state_to_row(&state, None);
        let object = row.as_object().unwrap();
        assert_eq!(object["icao24"], json!("ab1234"));
        assert_eq!(object["position_source"], Value::Null);
        assert!(!object.contains_key("query_time"));
    }
}
