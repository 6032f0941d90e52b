use serde::{Deserialize, Serialize};

use crate::store::SearchResult;

/// A known relevant (file, page) pair for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallTarget {
    pub file_name: String,
    pub page: i32,
}

impl RecallTarget {
    #[inline]
    pub fn new(file_name: impl Into<String>, page: i32) -> Self {
        Self {
            file_name: file_name.into(),
            page,
        }
    }

    #[inline]
    pub fn matches(&self, result: &SearchResult) -> bool {
        result.file_name == self.file_name && result.page == self.page
    }
}

/// 1-based position of the first result matching `target`, or `top_n + 1`
#[inline]
pub fn rank_of(results: &[SearchResult], target: &RecallTarget, top_n: usize) -> usize {
    results
        .iter()
        .position(|result| target.matches(result))
        .map_or(top_n + 1, |index| index + 1)
}

/// Read a page number written either as an integer or as text
///
/// Integral floats such as `"3.0"` are accepted since tabular tools often
/// widen integer columns.
#[inline]
pub fn parse_page(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if let Ok(page) = trimmed.parse::<i32>() {
        return Some(page);
    }

    let value = trimmed.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
        Some(value as i32)
    } else {
        None
    }
}
