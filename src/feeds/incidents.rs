//! Traffic incidents inside a bounding box.

use async_trait::async_trait;
use serde_json::Value;
use snafu::prelude::*;

use crate::config::RunConfig;
use crate::error::{BadQuerySnafu, FetchError};
use crate::feeds::Feed;
use crate::record::normalize::RowSchema;
use crate::source::http::HttpClient;
use crate::source::{RawBatch, UpstreamSource};

const INCIDENTS_URL: &str = "http://www.mapquestapi.com/traffic/v2/incidents";

const DEFAULT_FILTERS: &str = "construction,incidents";

pub struct IncidentsFeed {
    http: HttpClient,
}

impl IncidentsFeed {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Bounding box as `minLat,minLong,maxLat,maxLong`.
    fn bounds(config: &RunConfig) -> Result<String, FetchError> {
        match config.param("bounds") {
            Some(Value::Array(items)) if items.len() == 4 => {
                let corners: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|n| n.to_string())
                    .collect();
                if corners.len() == 4 {
                    return Ok(corners.join(","));
                }
                BadQuerySnafu {
                    message: "bounds must contain four numbers",
                }
                .fail()
            }
            Some(Value::String(raw)) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
            _ => BadQuerySnafu {
                message: "incidents feed requires a bounds box",
            }
            .fail(),
        }
    }

    fn filters(config: &RunConfig) -> String {
        match config.param("filters") {
            Some(Value::Array(items)) => {
                let listed: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                if listed.is_empty() {
                    DEFAULT_FILTERS.to_string()
                } else {
                    listed.join(",")
                }
            }
            _ => config
                .param_str("filters")
                .unwrap_or(DEFAULT_FILTERS)
                .to_string(),
        }
    }
}

#[async_trait]
impl UpstreamSource for IncidentsFeed {
    async fn fetch(&self, config: &RunConfig) -> Result<RawBatch, FetchError> {
        let key = config
            .param_str("key")
            .context(BadQuerySnafu {
                message: "incidents feed requires an api key",
            })?
            .to_string();
        let bounds = Self::bounds(config)?;
        let filters = Self::filters(config);

        let query = [
            ("key", key),
            ("boundingBox", bounds),
            ("filters", filters),
        ];
        self.http
            .fetch_json(INCIDENTS_URL, &query, |value| {
                // A response without an incidents array is unusable.
                let incidents = value.get("incidents")?.as_array()?;
                Some(RawBatch::Rows(incidents.clone()))
            })
            .await
    }
}

impl Feed for IncidentsFeed {
    fn name(&self) -> &'static str {
        "incidents"
    }

    fn expected_fields(&self) -> &'static [&'static str] {
        &["key", "bounds", "filters"]
    }

    fn default_path(&self) -> &'static str {
        "traffic"
    }

    fn schema(&self) -> RowSchema {
        RowSchema::Structured {
            epoch_fields: vec![],
        }
    }
}
