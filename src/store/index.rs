use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// ANN index algorithm backing the chunk table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndexFamily {
    /// Exact sequential scan
    #[default]
    None,
    Ivfflat,
    Hnsw,
}

impl IndexFamily {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ivfflat => "ivfflat",
            Self::Hnsw => "hnsw",
        }
    }

    /// Whether queries against this family run on half precision vectors
    #[inline]
    pub fn uses_half_precision(self) -> bool {
        matches!(self, Self::Ivfflat | Self::Hnsw)
    }
}

impl fmt::Display for IndexFamily {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexFamily {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "ivfflat" => Ok(Self::Ivfflat),
            "hnsw" => Ok(Self::Hnsw),
            _ => Err(ConfigError::InvalidIndexType(s.to_string())),
        }
    }
}

impl TryFrom<String> for IndexFamily {
    type Error = ConfigError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IndexFamily> for String {
    #[inline]
    fn from(family: IndexFamily) -> Self {
        family.as_str().to_string()
    }
}

/// Index family plus its build-time and query-time parameters
///
/// Build-time parameters are carried for every family so that measurement
/// rows record the full provenance of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfiguration {
    #[serde(rename = "type")]
    pub family: IndexFamily,
    pub hnsw_m: u32,
    pub hnsw_ef_construction: u32,
    pub hnsw_ef_search: u32,
    pub ivfflat_lists: u32,
    pub ivfflat_probes: u32,
}

impl Default for IndexConfiguration {
    fn default() -> Self {
        Self {
            family: IndexFamily::None,
            hnsw_m: 16,
            hnsw_ef_construction: 64,
            hnsw_ef_search: 40,
            ivfflat_lists: 100,
            ivfflat_probes: 1,
        }
    }
}

impl IndexConfiguration {
    #[inline]
    pub fn new(family: IndexFamily) -> Self {
        Self {
            family,
            ..Self::default()
        }
    }

    /// Session-scoped tuning statement issued right after a session opens
    #[inline]
    pub fn session_directive(&self) -> Option<String> {
        match self.family {
            IndexFamily::None => None,
            IndexFamily::Ivfflat => Some(format!("SET ivfflat.probes = {}", self.ivfflat_probes)),
            IndexFamily::Hnsw => Some(format!("SET hnsw.ef_search = {}", self.hnsw_ef_search)),
        }
    }

    /// Human readable key naming the family and the parameters that matter for it
    #[inline]
    pub fn label(&self) -> String {
        match self.family {
            IndexFamily::None => "none".to_string(),
            IndexFamily::Ivfflat => format!(
                "ivfflat(lists={}, probes={})",
                self.ivfflat_lists, self.ivfflat_probes
            ),
            IndexFamily::Hnsw => format!(
                "hnsw(m={}, ef_construction={}, ef_search={})",
                self.hnsw_m, self.hnsw_ef_construction, self.hnsw_ef_search
            ),
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=100).contains(&self.hnsw_m) {
            return Err(ConfigError::InvalidHnswM(self.hnsw_m));
        }

        let min_ef_construction = self.hnsw_m * 2;
        if self.hnsw_ef_construction < min_ef_construction || self.hnsw_ef_construction > 1000 {
            return Err(ConfigError::InvalidHnswEfConstruction(
                self.hnsw_ef_construction,
                min_ef_construction,
            ));
        }

        if !(1..=1000).contains(&self.hnsw_ef_search) {
            return Err(ConfigError::InvalidHnswEfSearch(self.hnsw_ef_search));
        }

        if !(1..=32768).contains(&self.ivfflat_lists) {
            return Err(ConfigError::InvalidIvfflatLists(self.ivfflat_lists));
        }

        if self.ivfflat_probes == 0 || self.ivfflat_probes > self.ivfflat_lists {
            return Err(ConfigError::InvalidIvfflatProbes(
                self.ivfflat_probes,
                self.ivfflat_lists,
            ));
        }

        Ok(())
    }
}
