//! Back-end contract for a single-site index
//!
//! A concrete back end owns one site's index and provides batched upserts,
//! queries and deletes. The engine APIs are synchronous; async layers above
//! move calls onto the blocking pool.

use crate::document::DocumentComment;
use crate::errors::SearchResult;
use crate::types::{Request, ResultPage};

/// A mutation set committed atomically from the reader's perspective.
pub trait IndexBatch: Send + 'static {
    /// Enqueue an upsert; may fail per-document.
    fn index(&mut self, id: &str, doc: &DocumentComment) -> SearchResult<()>;
}

/// A single-site index back end.
///
/// Reads are internally thread-safe; writes are serialized by the single
/// indexer worker sitting in front of the back end. Operations on a closed
/// instance return an error.
pub trait SearchBackend: Send + Sync + 'static {
    type Batch: IndexBatch;

    fn new_batch(&self) -> Self::Batch;

    /// Commit the batch; after return readers observe all of it or none.
    fn commit(&self, batch: Self::Batch) -> SearchResult<()>;

    fn search(&self, req: &Request) -> SearchResult<ResultPage>;

    fn delete(&self, id: &str) -> SearchResult<()>;

    /// Release back-end resources; subsequent reads fail.
    fn close(&self) -> SearchResult<()>;
}
