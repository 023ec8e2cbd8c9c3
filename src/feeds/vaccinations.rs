//! Vaccination rollup rows from a tab-delimited file in object storage.
//!
//! Unlike the HTTP feeds, this source reads through the same [`BlobStore`]
//! capability the storage sink writes through; the upstream seam is
//! transport-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::prelude::*;

use crate::config::RunConfig;
use crate::error::{BadQuerySnafu, FetchError, MissingInputSnafu, SourceReadSnafu};
use crate::feeds::Feed;
use crate::record::normalize::RowSchema;
use crate::sink::BlobStore;
use crate::source::{RawBatch, UpstreamSource};

const DEFAULT_INPUT: &str = "covid/vaccinations/us_state_vaccinations_aug.txt";

const COLUMNS: &[&str] = &[
    "date",
    "location",
    "total_vaccinations",
    "total_distributed",
    "people_vaccinated",
    "people_fully_vaccinated_per_hundred",
    "total_vaccinations_per_hundred",
    "people_fully_vaccinated",
    "people_vaccinated_per_hundred",
    "distributed_per_hundred",
    "daily_vaccinations_raw",
    "daily_vaccinations",
    "daily_vaccinations_per_million",
    "share_doses_used",
    "total_boosters",
    "total_boosters_per_hundred",
];

pub struct VaccinationsFeed {
    store: Arc<dyn BlobStore>,
}

impl VaccinationsFeed {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UpstreamSource for VaccinationsFeed {
    async fn fetch(&self, config: &RunConfig) -> Result<RawBatch, FetchError> {
        // The input file lives in the same bucket the run stores to.
        let bucket = config
            .storage_target
            .as_ref()
            .map(|target| target.bucket.as_str())
            .filter(|bucket| !bucket.is_empty())
            .context(BadQuerySnafu {
                message: "vaccinations feed requires a bucket",
            })?;
        let input = config.param_str("inputPath").unwrap_or(DEFAULT_INPUT);

        let accessible = self
            .store
            .exists(bucket)
            .await
            .context(SourceReadSnafu)?;
        ensure!(
            accessible,
            BadQuerySnafu {
                message: format!("cannot access bucket {bucket}"),
            }
        );

        let bytes = match self.store.read(bucket, input).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return MissingInputSnafu {
                    bucket: bucket.to_string(),
                    path: input.to_string(),
                }
                .fail();
            }
            Err(e) => return Err(e).context(SourceReadSnafu),
        };

        Ok(RawBatch::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }
}

impl Feed for VaccinationsFeed {
    fn name(&self) -> &'static str {
        "vaccinations"
    }

    fn expected_fields(&self) -> &'static [&'static str] {
        &["inputPath"]
    }

    fn schema(&self) -> RowSchema {
        RowSchema::Delimited {
            delimiter: '\t',
            columns: COLUMNS.iter().map(|s| s.to_string()).collect(),
            skip_header: true,
        }
    }
}
