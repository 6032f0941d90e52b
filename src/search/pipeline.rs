use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::protocol::{QueryRequest, QueryResponse, ResultView};
use super::recall::{RecallTarget, rank_of};
use super::{SearchExecutor, validate_top_n};
use crate::config::{Config, SamplingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::metrics::{ResourceSample, ResourceSampler};
use crate::stats::{MeasurementRecord, Window};
use crate::store::{IndexConfiguration, SearchResult, SessionConfig, StoreSession, VectorStore};
use crate::{AnnError, Result};

/// Everything observed while answering one query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub response: QueryResponse,
    pub index: IndexConfiguration,
    pub question: String,
    pub target: Option<RecallTarget>,
    /// Absent when the table could not be counted
    pub num_of_rows: Option<i64>,
    /// When the similarity query started
    pub timestamp: DateTime<Utc>,
    pub before: Vec<ResourceSample>,
    pub during: Vec<ResourceSample>,
    pub after: Vec<ResourceSample>,
}

impl QueryOutcome {
    /// Measurement record for one sampling window
    #[inline]
    pub fn record(&self, window: Window) -> MeasurementRecord {
        let samples = match window {
            Window::Before => &self.before,
            Window::During => &self.during,
            Window::After => &self.after,
        };

        MeasurementRecord {
            index: self.index,
            num_of_rows: self.num_of_rows,
            search_time: self.response.search_time,
            target_rank: self.response.target_rank,
            keyword: self.question.clone(),
            target: self.target.clone(),
            timestamp: self.timestamp,
            samples: samples.clone(),
        }
    }
}

struct Measured {
    results: Vec<SearchResult>,
    search_time: f64,
    timestamp: DateTime<Utc>,
    num_of_rows: Option<i64>,
    before: Vec<ResourceSample>,
    during: Vec<ResourceSample>,
    after: Vec<ResourceSample>,
}

/// Embeds a question, searches under one index configuration and measures it
///
/// Each call opens and closes its own store session.
#[derive(Clone)]
pub struct QueryPipeline {
    session: SessionConfig,
    sampling: SamplingConfig,
    container: String,
    default_top_n: i64,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    sampler: ResourceSampler,
}

impl QueryPipeline {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        sampler: ResourceSampler,
    ) -> Self {
        Self {
            session: SessionConfig::from_config(config),
            sampling: config.sampling.clone(),
            container: config.metrics.container_name.clone(),
            default_top_n: config.server.default_top_n,
            embedder,
            store,
            sampler,
        }
    }

    /// Use a different table than the configured one, e.g. a category partition
    #[inline]
    #[must_use]
    pub fn with_table(mut self, table: String) -> Self {
        self.session.table.name = table;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_default_top_n(mut self, top_n: i64) -> Self {
        self.default_top_n = top_n;
        self
    }

    #[inline]
    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    #[inline]
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(AnnError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }
        let top_n = validate_top_n(request.top_n.unwrap_or(self.default_top_n))?;
        let target = request.target()?;

        let embedding = self.embedder.embed(question).await?;
        debug!("Embedded question into {} dimensions", embedding.vector.len());

        let mut session = self.store.open(&self.session).await?;
        let measured = self
            .measure(session.as_mut(), &embedding.vector, top_n)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close store session: {}", e);
        }
        let measured = measured?;

        let target_rank = target
            .as_ref()
            .map(|target| rank_of(&measured.results, target, top_n));

        info!(
            "{} search returned {} results in {:.4}s{}",
            self.session.index.label(),
            measured.results.len(),
            measured.search_time,
            target_rank.map_or_else(String::new, |rank| format!(", target rank {}", rank))
        );

        Ok(QueryOutcome {
            response: QueryResponse {
                results: measured.results.into_iter().map(ResultView::from).collect(),
                search_time: measured.search_time,
                target_rank,
            },
            index: self.session.index,
            question: question.to_string(),
            target,
            num_of_rows: measured.num_of_rows,
            timestamp: measured.timestamp,
            before: measured.before,
            during: measured.during,
            after: measured.after,
        })
    }

    async fn measure(
        &self,
        session: &mut dyn StoreSession,
        vector: &[f32],
        top_n: usize,
    ) -> Result<Measured> {
        let interval = self.sampling.interval();

        let before = self
            .sampler
            .sample(&self.container, self.sampling.before(), interval)
            .await;

        let mut during_task = JoinSet::new();
        let (started_tx, started_rx) = oneshot::channel();
        {
            let sampler = self.sampler.clone();
            let container = self.container.clone();
            let duration = self.sampling.during();
            during_task.spawn(async move {
                let _ = started_tx.send(());
                sampler.sample(&container, duration, interval).await
            });
        }
        // The during window must be running before the clock starts
        let _ = started_rx.await;

        let timestamp = Utc::now();
        let started = Instant::now();
        let results = SearchExecutor::search(&mut *session, vector, top_n as i64).await;
        let search_time = started.elapsed().as_secs_f64();
        let results = results?;

        // A failed count must not discard a search that already completed
        let num_of_rows = match session.row_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Failed to count rows in {}: {}", self.session.table.name, e);
                None
            }
        };

        let mut during = Vec::new();
        while let Some(joined) = during_task.join_next().await {
            match joined {
                Ok(samples) => during = samples,
                Err(e) => warn!("During-search sampler failed: {}", e),
            }
        }

        let after = self
            .sampler
            .sample(&self.container, self.sampling.after(), interval)
            .await;

        Ok(Measured {
            results,
            search_time,
            timestamp,
            num_of_rows,
            before,
            during,
            after,
        })
    }
}
