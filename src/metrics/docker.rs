use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{MetricsSnapshot, MetricsSource};
use crate::config::MetricsConfig;
use crate::{AnnError, Result};

/// Reads container memory statistics from the Docker Engine API
#[derive(Debug, Clone)]
pub struct DockerStatsClient {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    usage: Option<u64>,
    limit: Option<u64>,
    #[serde(default)]
    stats: BTreeMap<String, serde_json::Value>,
}

impl From<MemoryStats> for MetricsSnapshot {
    #[inline]
    fn from(stats: MemoryStats) -> Self {
        Self {
            memory_usage: stats.usage,
            memory_limit: stats.limit,
            submetrics: stats
                .stats
                .into_iter()
                .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
                .collect(),
        }
    }
}

impl DockerStatsClient {
    #[inline]
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let base_url = Url::parse(&config.docker_url).map_err(|e| {
            AnnError::Config(format!("invalid docker url {}: {}", config.docker_url, e))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self { base_url, agent })
    }

    /// Stats endpoint for a container, a one-off reading rather than a stream
    #[inline]
    pub fn stats_url(&self, container: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("/containers/{}/stats", container))
            .map_err(|e| AnnError::Config(format!("invalid container name {}: {}", container, e)))?;
        url.query_pairs_mut().append_pair("stream", "false");
        Ok(url)
    }

    /// Poll once, blocking the calling thread
    #[inline]
    pub fn get_stats_blocking(&self, container: &str) -> Result<MetricsSnapshot> {
        let url = self.stats_url(container)?;
        debug!("Polling container stats at {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| AnnError::MetricsUnavailable(format!("stats request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AnnError::MetricsUnavailable(format!(
                "container {} not found",
                container
            )));
        }
        if !status.is_success() {
            return Err(AnnError::MetricsUnavailable(format!(
                "stats request returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| AnnError::MetricsUnavailable(format!("failed to read stats: {}", e)))?;
        let stats: StatsResponse = serde_json::from_str(&body)
            .map_err(|e| AnnError::MetricsUnavailable(format!("failed to parse stats: {}", e)))?;

        Ok(stats.memory_stats.into())
    }
}

#[async_trait]
impl MetricsSource for DockerStatsClient {
    async fn get_stats(&self, resource_id: &str) -> Result<MetricsSnapshot> {
        let client = self.clone();
        let container = resource_id.to_string();

        tokio::task::spawn_blocking(move || client.get_stats_blocking(&container))
            .await
            .map_err(|e| AnnError::MetricsUnavailable(format!("stats task failed: {}", e)))?
    }
}
