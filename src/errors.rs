//! Error types for search operations
//!
//! A single crate-wide error enum with matchable sentinel variants for the
//! conditions the HTTP layer distinguishes (disabled search, not-ready
//! search, unknown site) and `#[from]` conversions for the underlying
//! engine, I/O and transport errors.

use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Error types for search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// Search is disabled by configuration
    #[error("search is not enabled")]
    NotEnabled,

    /// Search is enabled but the index is not initialized yet
    #[error("search is not ready yet")]
    NotReady,

    /// No shard is configured for the requested site
    #[error("index for site {0} does not found")]
    SiteNotFound(String),

    /// The indexer worker is shutting down or already stopped
    #[error("indexer closing")]
    IndexerClosing,

    /// Operation on a closed index
    #[error("search index is closed")]
    IndexClosed,

    /// WAL replay was cancelled between records
    #[error("reading ahead log interrupted")]
    ReplayInterrupted,

    /// Analyzer name not in the supported set
    #[error("unknown analyzer {analyzer:?}, available analyzers: {available}")]
    UnknownAnalyzer { analyzer: String, available: String },

    /// Invalid configuration (bad secret, missing endpoint, bad index path)
    #[error("{0}")]
    Config(String),

    /// Query could not be parsed by the back end
    #[error("invalid search query: {0}")]
    QueryParsing(String),

    /// The remote cluster answered with a non-success status
    #[error("search cluster responded an error {status}: {body}")]
    Remote { status: u16, body: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tantivy error wrapper
    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Document encode/decode failure
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// HTTP transport failure talking to the remote cluster
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    pub(crate) fn other(err: impl std::fmt::Display) -> Self {
        SearchError::Other(err.to_string())
    }
}
