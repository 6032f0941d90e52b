use serde::{Deserialize, Serialize};

use super::recall::{RecallTarget, parse_page};
use crate::store::SearchResult;
use crate::{AnnError, Result};

/// Page number as sent by clients, either a JSON number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageValue {
    Number(f64),
    Text(String),
}

impl PageValue {
    #[inline]
    pub fn to_page(&self) -> Option<i32> {
        match self {
            Self::Number(n) => parse_page(&n.to_string()),
            Self::Text(s) => parse_page(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<i64>,
    #[serde(
        default,
        alias = "target_file",
        alias = "filepath",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_name: Option<String>,
    #[serde(
        default,
        alias = "target_page",
        alias = "document_page",
        skip_serializing_if = "Option::is_none"
    )]
    pub page: Option<PageValue>,
}

impl QueryRequest {
    #[inline]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_n: None,
            file_name: None,
            page: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_top_n(mut self, top_n: i64) -> Self {
        self.top_n = Some(top_n);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_target(mut self, file_name: impl Into<String>, page: i32) -> Self {
        self.file_name = Some(file_name.into());
        self.page = Some(PageValue::Number(f64::from(page)));
        self
    }

    /// The known relevant item, present only when both file and page are given
    #[inline]
    pub fn target(&self) -> Result<Option<RecallTarget>> {
        let (Some(file_name), Some(page)) = (&self.file_name, &self.page) else {
            return Ok(None);
        };

        let page = page
            .to_page()
            .ok_or_else(|| AnnError::InvalidArgument(format!("invalid target page: {:?}", page)))?;

        Ok(Some(RecallTarget::new(file_name.clone(), page)))
    }
}

/// One result as presented to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub file_name: String,
    pub page: i32,
    pub chunk_no: i32,
    pub chunk_text: String,
    pub distance: f64,
    pub link_text: String,
    pub link: String,
}

impl From<SearchResult> for ResultView {
    #[inline]
    fn from(result: SearchResult) -> Self {
        Self {
            link_text: format!("{}, p.{}", result.file_name, result.page),
            link: format!("/pdf/{}?page={}", result.file_name, result.page),
            file_name: result.file_name,
            page: result.page,
            chunk_no: result.chunk_no,
            chunk_text: result.chunk_text,
            distance: result.distance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<ResultView>,
    /// Seconds spent in the similarity query alone
    pub search_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&AnnError> for ErrorResponse {
    #[inline]
    fn from(error: &AnnError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
