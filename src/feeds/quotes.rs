//! Daily quote bars for a set of ticker symbols.
//!
//! Fetches one CSV document per symbol from the public chart endpoint and
//! assembles a single delimited batch, appending the symbol to each row. A
//! symbol that exhausts its attempts is skipped; the fetch only fails when
//! no symbol produced data.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::error::{ExhaustedSnafu, FetchError};
use crate::feeds::Feed;
use crate::record::normalize::RowSchema;
use crate::source::http::HttpClient;
use crate::source::{RawBatch, UpstreamSource, FETCH_ATTEMPTS};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v7/finance/download";

/// Used when the trigger names no symbols.
const DEFAULT_SYMBOLS: &[&str] = &["GOOGL", "GLD", "NFLX"];

pub struct QuotesFeed {
    http: HttpClient,
}

impl QuotesFeed {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn symbols(config: &RunConfig) -> Vec<String> {
        let listed: Vec<String> = match config.param("symbols") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => config
                .param_str("symbols")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };
        if listed.is_empty() {
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            listed
        }
    }
}

#[async_trait]
impl UpstreamSource for QuotesFeed {
    async fn fetch(&self, config: &RunConfig) -> Result<RawBatch, FetchError> {
        let symbols = Self::symbols(config);
        let period = config.param_str("period").unwrap_or("7d").to_string();
        let interval = config.param_str("interval").unwrap_or("1d").to_string();

        let mut rows = String::new();
        let mut fetched = 0usize;

        for symbol in &symbols {
            debug!("Fetching quotes for {symbol}");
            let url = format!("{CHART_URL}/{symbol}");
            let query = [
                ("range", period.clone()),
                ("interval", interval.clone()),
                ("events", "history".to_string()),
            ];
            match self.http.fetch_text(&url, &query).await {
                Ok(csv) => {
                    // Skip the header row; the symbol rides along as a
                    // trailing column.
                    for line in csv.lines().skip(1) {
                        let line = line.trim_end_matches('\r');
                        if line.replace(',', "").trim().is_empty() {
                            continue;
                        }
                        rows.push_str(line);
                        rows.push(',');
                        rows.push_str(symbol);
                        rows.push('\n');
                    }
                    fetched += 1;
                }
                Err(e) => warn!("Skipping symbol {symbol}: {e}"),
            }
        }

        if fetched == 0 {
            return ExhaustedSnafu {
                attempts: FETCH_ATTEMPTS,
                reason: format!("none of {} symbol(s) produced data", symbols.len()),
            }
            .fail();
        }
        Ok(RawBatch::Text(rows))
    }
}

impl Feed for QuotesFeed {
    fn name(&self) -> &'static str {
        "quotes"
    }

    fn expected_fields(&self) -> &'static [&'static str] {
        &["symbols", "query", "period", "interval"]
    }

    fn default_path(&self) -> &'static str {
        "stocks"
    }

    fn schema(&self) -> RowSchema {
        RowSchema::Delimited {
            delimiter: ',',
            columns: [
                "date",
                "open",
                "high",
                "low",
                "close",
                "adj_close",
                "volume",
                "symbol",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_header: false,
        }
    }
}
