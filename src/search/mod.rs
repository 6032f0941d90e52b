// Search module
// Index-aware query execution, recall ranking and the measured query pipeline

pub mod pipeline;
pub mod protocol;
pub mod recall;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::store::{SearchQuery, SearchResult, StoreSession, VectorPrecision};
use crate::{AnnError, Result};

pub use pipeline::{QueryOutcome, QueryPipeline};
pub use protocol::{ErrorResponse, PageValue, QueryRequest, QueryResponse, ResultView};
pub use recall::{RecallTarget, parse_page, rank_of};

/// Check a requested result count
#[inline]
pub fn validate_top_n(top_n: i64) -> Result<usize> {
    if top_n <= 0 {
        return Err(AnnError::InvalidArgument(format!(
            "top_n must be greater than zero, got {}",
            top_n
        )));
    }

    usize::try_from(top_n)
        .map_err(|_| AnnError::InvalidArgument(format!("top_n {} is too large", top_n)))
}

/// Builds the similarity query for a session's index family and runs it
pub struct SearchExecutor;

impl SearchExecutor {
    /// The query a session answers for `top_n` results
    #[inline]
    pub fn query_for(session: &dyn StoreSession, top_n: usize) -> SearchQuery {
        let config = session.config();
        SearchQuery {
            table: config.table.name.clone(),
            dimension: config.table.dimension,
            precision: VectorPrecision::for_family(config.index.family),
            top_n,
        }
    }

    /// Run a similarity search, closest first, never more than `top_n` results
    ///
    /// Fails with `InvalidArgument` before touching the store when
    /// `top_n <= 0`.
    #[inline]
    pub async fn search(
        session: &mut dyn StoreSession,
        vector: &[f32],
        top_n: i64,
    ) -> Result<Vec<SearchResult>> {
        let top_n = validate_top_n(top_n)?;
        let query = Self::query_for(session, top_n);

        debug!(
            "Searching {} for top {} ({:?} precision)",
            query.table, query.top_n, query.precision
        );

        let mut results = session.query(&query, vector).await?;
        results.truncate(top_n);
        Ok(results)
    }
}
