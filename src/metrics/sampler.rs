use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{MetricsSource, ResourceSample};

/// Polls a metrics source on a fixed interval for a bounded duration
///
/// A sampler without a source returns no samples immediately, which is how
/// measurement is switched off.
#[derive(Clone, Default)]
pub struct ResourceSampler {
    source: Option<Arc<dyn MetricsSource>>,
}

impl ResourceSampler {
    #[inline]
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    #[inline]
    pub fn disabled() -> Self {
        Self { source: None }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Collect samples until `duration` has elapsed
    ///
    /// Polls start at multiples of `interval` from the call, so at most
    /// `ceil(duration / interval)` samples are collected. Failed polls are
    /// logged and skipped.
    #[inline]
    pub async fn sample(
        &self,
        resource_id: &str,
        duration: Duration,
        interval: Duration,
    ) -> Vec<ResourceSample> {
        let Some(source) = &self.source else {
            return Vec::new();
        };

        let start = Instant::now();
        let mut samples = Vec::new();
        let mut failures = 0_usize;

        while start.elapsed() < duration {
            let polled_at = start.elapsed();
            let timestamp = Utc::now();

            match source.get_stats(resource_id).await {
                Ok(snapshot) => samples.push(ResourceSample::new(timestamp, snapshot)),
                Err(e) => {
                    failures += 1;
                    warn!("Skipping resource sample for {}: {}", resource_id, e);
                }
            }

            // Next poll is scheduled from when this one started, not when it returned
            let next = polled_at + interval;
            let now = start.elapsed();
            if next > now {
                tokio::time::sleep((next - now).min(duration.saturating_sub(now))).await;
            }
        }

        debug!(
            "Collected {} samples for {} over {:?} ({} failed polls)",
            samples.len(),
            resource_id,
            duration,
            failures
        );
        samples
    }
}
