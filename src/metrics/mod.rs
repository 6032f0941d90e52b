// Runtime metrics module
// Metrics source contract, the Docker Engine stats client and the resource sampler

pub mod docker;
pub mod sampler;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

pub use docker::DockerStatsClient;
pub use sampler::ResourceSampler;

/// One reading from a metrics source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    /// Numeric memory sub-metrics keyed by name
    pub submetrics: BTreeMap<String, f64>,
}

/// A snapshot stamped with the time its poll started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    pub submetrics: BTreeMap<String, f64>,
}

impl ResourceSample {
    #[inline]
    pub fn new(timestamp: DateTime<Utc>, snapshot: MetricsSnapshot) -> Self {
        Self {
            timestamp,
            memory_usage: snapshot.memory_usage,
            memory_limit: snapshot.memory_limit,
            submetrics: snapshot.submetrics,
        }
    }
}

/// Where resource readings come from
///
/// Returns `AnnError::MetricsUnavailable` when the resource is unknown or the
/// source cannot be reached.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn get_stats(&self, resource_id: &str) -> Result<MetricsSnapshot>;
}
