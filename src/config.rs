//! Search configuration
//!
//! `SearcherParams` is the parsed configuration the factory consumes. The
//! back-end and analyzer names are closed enums so bad values fail at
//! construction with a message enumerating the accepted set.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{SearchError, SearchResult};

/// Which back end the factory wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Local per-site inverted indexes on disk.
    /// `"bleve"` is accepted as a legacy alias in configuration files.
    #[serde(alias = "bleve")]
    Tantivy,
    /// Remote Elasticsearch-compatible cluster
    Elastic,
}

impl BackendType {
    /// Static description of the query language available for this back
    /// end, served to users via the search-help endpoint.
    #[must_use]
    pub fn help_prompt(self) -> &'static str {
        match self {
            BackendType::Tantivy => TANTIVY_HELP_PROMPT,
            BackendType::Elastic => ELASTIC_HELP_PROMPT,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Tantivy => f.write_str("tantivy"),
            BackendType::Elastic => f.write_str("elastic"),
        }
    }
}

impl FromStr for BackendType {
    type Err = SearchError;

    fn from_str(s: &str) -> SearchResult<Self> {
        match s {
            "tantivy" | "bleve" => Ok(BackendType::Tantivy),
            "elastic" => Ok(BackendType::Elastic),
            other => Err(SearchError::Config(format!(
                "unknown search backend {other:?}, available backends: tantivy, elastic"
            ))),
        }
    }
}

/// Text analyzer applied to the comment body at index time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    /// Tokenize and lowercase, no language-specific processing
    #[default]
    Standard,
    English,
    Russian,
}

impl Analyzer {
    pub(crate) const AVAILABLE: &'static str = "standard, english, russian";
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::Standard => f.write_str("standard"),
            Analyzer::English => f.write_str("english"),
            Analyzer::Russian => f.write_str("russian"),
        }
    }
}

impl FromStr for Analyzer {
    type Err = SearchError;

    fn from_str(s: &str) -> SearchResult<Self> {
        match s {
            "standard" => Ok(Analyzer::Standard),
            "english" => Ok(Analyzer::English),
            "russian" => Ok(Analyzer::Russian),
            other => Err(SearchError::UnknownAnalyzer {
                analyzer: other.to_string(),
                available: Analyzer::AVAILABLE.to_string(),
            }),
        }
    }
}

/// Everything the factory needs to wire a search service.
///
/// `backend = tantivy` uses `index_path`, `analyzer` and `sites`;
/// `backend = elastic` uses `endpoint`, `secret` and `sites`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearcherParams {
    #[serde(rename = "type")]
    pub backend: BackendType,
    #[serde(default)]
    pub index_path: PathBuf,
    #[serde(default)]
    pub analyzer: Analyzer,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub sites: Vec<String>,
}

const TANTIVY_HELP_PROMPT: &str = "\
Query language: terms are matched against the comment text; \
quote \"a phrase\" for exact sequences, prefix a term with + to require it \
or with - to exclude it, combine clauses with AND/OR, and target a field \
with username:name or url:link. Results are ranked by relevance unless \
sort=timestamp (+timestamp ascending, -timestamp descending) is given.";

const ELASTIC_HELP_PROMPT: &str = "\
Queries are plain match text: all words are searched in the comment text \
and results are ranked by relevance.";
