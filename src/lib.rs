//! Full-text search for a threaded-comment platform
//!
//! Comments are projected into searchable documents and indexed per site,
//! either into local tantivy indexes on disk or into a remote
//! Elasticsearch-compatible cluster. The local path buffers writes in
//! memory, drains them through a single indexer worker per site, and
//! persists whatever did not reach the index to an ahead log on shutdown so
//! no accepted document is lost across restarts.
//!
//! The subsystem is a secondary, derived index: the comment store stays
//! authoritative, and a shard can always be rebuilt from it.

pub mod backend;
pub mod buffered;
pub mod config;
pub mod document;
pub mod elastic;
pub mod errors;
pub mod local;
pub mod multiplex;
pub mod service;
pub mod types;

pub use backend::{IndexBatch, SearchBackend};
pub use buffered::BufferedEngine;
pub use config::{Analyzer, BackendType, SearcherParams};
pub use document::{Comment, CommentStore, DocumentComment, Locator, User};
pub use elastic::ElasticSearcher;
pub use errors::{SearchError, SearchResult};
pub use local::TantivyIndexer;
pub use multiplex::Multiplexer;
pub use service::{create_service, SearchService, Searcher};
pub use types::{CancelToken, Request, ResultDoc, ResultPage, TokenMatch};
