use super::*;
use crate::config::Config;
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::metrics::{MetricsSnapshot, MetricsSource, ResourceSampler};
use crate::stats::Window;
use crate::store::{
    Chunk, IndexConfiguration, IndexFamily, MemoryStore, SessionConfig, TableSpec, TableSummary,
    VectorStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct FixedEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, _text: &str) -> crate::Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding {
            vector: self.vector.clone(),
            model: "fixed".to_string(),
            prompt_tokens: 1,
            total_tokens: 1,
        })
    }
}

struct SteadyMetrics;

#[async_trait]
impl MetricsSource for SteadyMetrics {
    async fn get_stats(&self, _resource_id: &str) -> crate::Result<MetricsSnapshot> {
        Ok(MetricsSnapshot {
            memory_usage: Some(4096),
            memory_limit: Some(8192),
            ..MetricsSnapshot::default()
        })
    }
}

fn test_config(family: IndexFamily) -> Config {
    let mut config = Config::default();
    config.index = IndexConfiguration::new(family);
    config.store.dimension = 2;
    config.sampling.interval_ms = 10;
    config.sampling.before_ms = 30;
    config.sampling.during_ms = 50;
    config.sampling.after_ms = 30;
    config
}

fn chunk(file: &str, page: i32, chunk_no: i32, vector: [f32; 2]) -> Chunk {
    Chunk {
        file_name: file.to_string(),
        document_page: page,
        chunk_no,
        chunk_text: format!("chunk {}", chunk_no),
        model: "fixed".to_string(),
        prompt_tokens: 1,
        total_tokens: 1,
        created_date_time: Some(Utc::now()),
        chunk_vector: vector.to_vec(),
        business_category: "testing".to_string(),
    }
}

async fn seeded_store(config: &Config) -> MemoryStore {
    let store = MemoryStore::new();
    let session = SessionConfig::from_config(config);
    store.setup(&session).await.expect("setup should succeed");
    store
        .insert_chunks(
            &TableSpec {
                name: session.table.name.clone(),
                dimension: 2,
            },
            &[
                chunk("guide.pdf", 1, 1, [1.0, 0.0]),
                chunk("guide.pdf", 2, 2, [0.8, 0.6]),
                chunk("guide.pdf", 3, 3, [0.0, 1.0]),
            ],
        )
        .await
        .expect("insert should succeed");
    store
}

#[tokio::test]
async fn executor_rejects_non_positive_top_n() {
    let config = test_config(IndexFamily::None);
    let store = seeded_store(&config).await;
    let mut session = store
        .open(&SessionConfig::from_config(&config))
        .await
        .expect("session should open");

    for top_n in [0, -3] {
        let result = SearchExecutor::search(session.as_mut(), &[1.0, 0.0], top_n).await;
        assert!(matches!(result, Err(AnnError::InvalidArgument(_))));
    }
}

#[tokio::test]
async fn executor_bounds_and_orders_results() {
    for family in [IndexFamily::None, IndexFamily::Ivfflat, IndexFamily::Hnsw] {
        let config = test_config(family);
        let store = seeded_store(&config).await;
        let mut session = store
            .open(&SessionConfig::from_config(&config))
            .await
            .expect("session should open");

        let results = SearchExecutor::search(session.as_mut(), &[1.0, 0.0], 2)
            .await
            .expect("search should succeed");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].page, 1);
        assert!(results[0].distance <= results[1].distance);
    }
}

#[tokio::test]
async fn query_shape_follows_session_family() {
    let config = test_config(IndexFamily::Hnsw);
    let store = MemoryStore::new();
    let session = store
        .open(&SessionConfig::from_config(&config))
        .await
        .expect("session should open");

    let query = SearchExecutor::query_for(session.as_ref(), 7);
    assert_eq!(query.precision, crate::store::VectorPrecision::Half);
    assert_eq!(query.top_n, 7);
    assert_eq!(query.dimension, 2);
    assert_eq!(query.table, "document_vectors");
}

#[tokio::test]
async fn pipeline_ranks_target_and_records_windows() {
    let config = test_config(IndexFamily::Hnsw);
    let store = Arc::new(seeded_store(&config).await);
    let pipeline = QueryPipeline::new(
        &config,
        Arc::new(FixedEmbedder::new(vec![0.0, 1.0])),
        Arc::clone(&store) as Arc<dyn VectorStore>,
        ResourceSampler::new(Arc::new(SteadyMetrics)),
    );

    let request = QueryRequest::new("where is page two?")
        .with_top_n(3)
        .with_target("guide.pdf", 2);
    let outcome = pipeline.run(&request).await.expect("pipeline should succeed");

    assert_eq!(outcome.response.results.len(), 3);
    assert_eq!(outcome.response.results[0].page, 3);
    assert_eq!(outcome.response.target_rank, Some(2));
    assert_eq!(outcome.num_of_rows, Some(3));
    assert!(!outcome.before.is_empty());
    assert!(!outcome.during.is_empty());
    assert!(!outcome.after.is_empty());
    assert_eq!(
        outcome.response.results[1].link,
        "/pdf/guide.pdf?page=2".to_string()
    );

    let record = outcome.record(Window::During);
    assert_eq!(record.samples.len(), outcome.during.len());
    assert_eq!(record.target_rank, Some(2));
    assert_eq!(record.keyword, "where is page two?");

    assert_eq!(
        store.applied_directives().await,
        vec!["SET hnsw.ef_search = 40".to_string()]
    );
}

#[tokio::test]
async fn pipeline_without_target_has_no_rank() {
    let config = test_config(IndexFamily::None);
    let store = Arc::new(seeded_store(&config).await);
    let pipeline = QueryPipeline::new(
        &config,
        Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
        store,
        ResourceSampler::disabled(),
    );

    let outcome = pipeline
        .run(&QueryRequest::new("anything"))
        .await
        .expect("pipeline should succeed");

    assert_eq!(outcome.response.target_rank, None);
    assert_eq!(outcome.response.results.len(), 3);
    assert!(outcome.during.is_empty());

    let json = serde_json::to_value(&outcome.response).expect("response should serialize");
    assert!(json.get("target_rank").is_none());
}

#[tokio::test]
async fn absent_target_ranks_past_the_end() {
    let config = test_config(IndexFamily::None);
    let store = Arc::new(seeded_store(&config).await);
    let pipeline = QueryPipeline::new(
        &config,
        Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
        store,
        ResourceSampler::disabled(),
    );

    let request = QueryRequest::new("anything")
        .with_top_n(2)
        .with_target("other.pdf", 9);
    let outcome = pipeline.run(&request).await.expect("pipeline should succeed");

    assert_eq!(outcome.response.target_rank, Some(3));
}

#[tokio::test]
async fn invalid_requests_never_reach_collaborators() {
    let config = test_config(IndexFamily::None);
    let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
    let pipeline = QueryPipeline::new(
        &config,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        Arc::new(MemoryStore::new()),
        ResourceSampler::disabled(),
    );

    let blank = pipeline.run(&QueryRequest::new("   ")).await;
    assert!(matches!(blank, Err(AnnError::InvalidArgument(_))));

    let zero = pipeline
        .run(&QueryRequest::new("question").with_top_n(0))
        .await;
    assert!(matches!(zero, Err(AnnError::InvalidArgument(_))));

    let bad_page = QueryRequest {
        file_name: Some("guide.pdf".to_string()),
        page: Some(PageValue::Text("second".to_string())),
        ..QueryRequest::new("question")
    };
    assert!(matches!(
        pipeline.run(&bad_page).await,
        Err(AnnError::InvalidArgument(_))
    ));

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn latency_excludes_during_sampling() {
    let delay = Duration::from_millis(40);
    let mut config = test_config(IndexFamily::None);
    config.sampling.during_ms = 200;

    let store = Arc::new(seeded_store(&config).await.with_search_delay(delay));
    let pipeline = QueryPipeline::new(
        &config,
        Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
        store,
        ResourceSampler::new(Arc::new(SteadyMetrics)),
    );

    let outcome = pipeline
        .run(&QueryRequest::new("latency"))
        .await
        .expect("pipeline should succeed");

    let search_time = outcome.response.search_time;
    assert!(search_time >= delay.as_secs_f64());
    assert!(search_time < 0.15, "search_time was {}", search_time);
    assert!(!outcome.during.is_empty());
}

/// Store whose sessions answer queries but cannot count rows
struct UncountableStore(MemoryStore);

struct UncountableSession(Box<dyn StoreSession>);

#[async_trait]
impl StoreSession for UncountableSession {
    fn config(&self) -> &SessionConfig {
        self.0.config()
    }

    async fn query(&mut self, query: &SearchQuery, vector: &[f32]) -> Result<Vec<SearchResult>> {
        self.0.query(query, vector).await
    }

    async fn row_count(&mut self) -> Result<i64> {
        Err(AnnError::Database("statement timeout".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.0.close().await
    }
}

#[async_trait]
impl VectorStore for UncountableStore {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(UncountableSession(self.0.open(config).await?)))
    }

    async fn setup(&self, config: &SessionConfig) -> Result<()> {
        self.0.setup(config).await
    }

    async fn insert_chunks(&self, table: &TableSpec, chunks: &[Chunk]) -> Result<usize> {
        self.0.insert_chunks(table, chunks).await
    }

    async fn summary(&self) -> Result<Vec<TableSummary>> {
        self.0.summary().await
    }

    async fn drop_all_tables(&self) -> Result<Vec<String>> {
        self.0.drop_all_tables().await
    }
}

#[tokio::test]
async fn failed_row_count_keeps_completed_search() {
    let config = test_config(IndexFamily::None);
    let store = UncountableStore(seeded_store(&config).await);
    let pipeline = QueryPipeline::new(
        &config,
        Arc::new(FixedEmbedder::new(vec![0.8, 0.6])),
        Arc::new(store),
        ResourceSampler::new(Arc::new(SteadyMetrics)),
    );

    let outcome = pipeline
        .run(&QueryRequest::new("page two").with_target("guide.pdf", 2))
        .await
        .expect("pipeline should succeed");

    assert_eq!(outcome.num_of_rows, None);
    assert_eq!(outcome.response.results.len(), 3);
    assert_eq!(outcome.response.target_rank, Some(1));
    assert!(!outcome.after.is_empty());
    assert_eq!(outcome.record(Window::During).num_of_rows, None);
}

#[test]
fn request_accepts_page_as_string_or_number() {
    let from_text: QueryRequest = serde_json::from_str(
        r#"{"question": "q", "top_n": 5, "target_file": "a.pdf", "target_page": "4"}"#,
    )
    .expect("request should parse");
    let from_number: QueryRequest =
        serde_json::from_str(r#"{"question": "q", "file_name": "a.pdf", "page": 4}"#)
            .expect("request should parse");

    let expected = Some(RecallTarget::new("a.pdf", 4));
    assert_eq!(from_text.target().expect("target should parse"), expected);
    assert_eq!(from_number.target().expect("target should parse"), expected);
    assert_eq!(from_number.top_n, None);
}

#[test]
fn result_view_links() {
    let view = ResultView::from(crate::store::SearchResult {
        file_name: "report.pdf".to_string(),
        page: 12,
        chunk_no: 3,
        chunk_text: "text".to_string(),
        distance: -0.5,
    });

    assert_eq!(view.link_text, "report.pdf, p.12");
    assert_eq!(view.link, "/pdf/report.pdf?page=12");
}
