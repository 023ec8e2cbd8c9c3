//! Canonical run configuration.
//!
//! A [`RunConfig`] is produced once per invocation by trigger resolution and
//! is immutable afterward. Validation of its structural invariants happens
//! before any I/O.

use serde::Serialize;
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{
    ConfigError, MissingBucketSnafu, MissingProjectSnafu, MissingTopicSnafu, NoSinkEnabledSnafu,
};

/// Object storage destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageTarget {
    pub bucket: String,
    /// Path prefix within the bucket; may carry a generated timestamp
    /// segment when the trigger asked for one.
    pub path: String,
}

/// Message bus destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PubsubTarget {
    pub project: String,
    pub topic: String,
}

/// Canonical, resolved configuration for one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub storage_enabled: bool,
    pub pubsub_enabled: bool,
    pub storage_target: Option<StorageTarget>,
    pub pubsub_target: Option<PubsubTarget>,
    /// Cap on the number of records emitted by normalization.
    pub limit: Option<usize>,
    /// One output unit per record instead of one per batch.
    pub split_records: bool,
    /// Log-level token requested by the trigger.
    pub debug: String,
    /// Opaque source-specific parameters, read by the feed that owns them.
    pub params: Map<String, Value>,
}

impl RunConfig {
    /// Check structural invariants. Must pass before any I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.storage_enabled || self.pubsub_enabled,
            NoSinkEnabledSnafu
        );
        if self.pubsub_enabled {
            let target = self.pubsub_target.as_ref().context(MissingProjectSnafu)?;
            ensure!(!target.project.is_empty(), MissingProjectSnafu);
            ensure!(!target.topic.is_empty(), MissingTopicSnafu);
        }
        if self.storage_enabled {
            let target = self.storage_target.as_ref().context(MissingBucketSnafu)?;
            ensure!(!target.bucket.is_empty(), MissingBucketSnafu);
        }
        Ok(())
    }

    /// Source parameter as a non-empty string.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Source parameter as a raw value.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfig {
        RunConfig {
            storage_enabled: true,
            pubsub_enabled: false,
            storage_target: Some(StorageTarget {
                bucket: "b".into(),
                path: "p".into(),
            }),
            pubsub_target: None,
            limit: None,
            split_records: false,
            debug: "info".into(),
            params: Map::new(),
        }
    }

    #[test]
    fn test_valid_storage_only() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_pubsub_requires_project_and_topic() {
        let mut config = base();
        config.pubsub_enabled = true;
        config.pubsub_target = Some(PubsubTarget {
            project: "".into(),
            topic: "t".into(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProject)
        ));

        config.pubsub_target = Some(PubsubTarget {
            project: "p".into(),
            topic: "".into(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::MissingTopic)));
    }

    #[test]
    fn test_no_sink_is_an_error() {
        let mut config = base();
        config.storage_enabled = false;
        assert!(matches!(config.validate(), Err(ConfigError::NoSinkEnabled)));
    }

    #[test]
    fn test_storage_requires_bucket() {
        let mut config = base();
        config.storage_target = None;
        assert!(matches!(config.validate(), Err(ConfigError::MissingBucket)));
    }
}
