//! Per-feed glue.
//!
//! Each feed couples an [`UpstreamSource`] implementation with the trigger
//! defaults and normalization schema for its data. The pipeline core never
//! branches on feed identity; everything feed-specific lives behind this
//! trait.

pub mod flights;
pub mod incidents;
pub mod quotes;
pub mod vaccinations;

pub use flights::FlightsFeed;
pub use incidents::IncidentsFeed;
pub use quotes::QuotesFeed;
pub use vaccinations::VaccinationsFeed;

use crate::record::normalize::RowSchema;
use crate::source::UpstreamSource;

/// A concrete ingestion job: one upstream source plus its trigger defaults
/// and row schema.
pub trait Feed: UpstreamSource {
    fn name(&self) -> &'static str;

    /// Feed-specific trigger fields, checked (together with the fixed sink
    /// fields) when deciding whether a bare query parameter set is itself
    /// the configuration.
    fn expected_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Default path prefix within the storage bucket.
    fn default_path(&self) -> &'static str {
        "data"
    }

    /// Default cap on emitted records.
    fn default_limit(&self) -> Option<usize> {
        None
    }

    /// Whether this feed delivers one output unit per record by default.
    fn default_split(&self) -> bool {
        false
    }

    /// How this feed's raw rows map onto record fields.
    fn schema(&self) -> RowSchema;
}
