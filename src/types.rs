//! Shared value types of the search contract
//!
//! The request/response types exchanged with the rest of the platform and
//! the small helpers shared by both back ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// A search request, scoped to a single site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// Site whose shard the request is routed to
    pub site_id: String,
    /// Free-text query; the local back end accepts its full query-string
    /// syntax, the remote back end treats it as plain match text
    pub query: String,
    /// `""`, `"timestamp"`, or either of `"+timestamp"`/`"-timestamp"`.
    /// Unknown fields are logged and ignored.
    pub sort_by: String,
    /// Maximum number of documents returned. The HTTP edge enforces 1..100;
    /// the core tolerates any value including zero.
    pub limit: usize,
    /// Pagination offset
    pub from: usize,
}

/// One page of search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultPage {
    /// Total number of matches, not just the returned page
    pub total: u64,
    pub documents: Vec<ResultDoc>,
}

/// A single matched document, referencing the original comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDoc {
    pub id: String,
    pub post_url: String,
    /// Byte offsets of matched tokens within the indexed text, for
    /// highlighting. Empty for back ends that do not report locations.
    #[serde(default)]
    pub matches: Vec<TokenMatch>,
}

/// Byte offsets `[start, end)` of one matched token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMatch {
    pub start: usize,
    pub end: usize,
}

/// Parsed sort directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortSpec {
    pub field: String,
    pub ascending: bool,
}

/// Parse a `sort_by` value against the set of sortable fields.
///
/// Returns `None` for an empty value or a field outside `allowed`; callers
/// log unknown fields and fall back to default ordering.
pub(crate) fn parse_sort_by(sort_by: &str, allowed: &[&str]) -> Option<SortSpec> {
    if sort_by.is_empty() {
        return None;
    }
    let (field, ascending) = if let Some(rest) = sort_by.strip_prefix('-') {
        (rest, false)
    } else if let Some(rest) = sort_by.strip_prefix('+') {
        (rest, true)
    } else {
        (sort_by, true)
    };
    if allowed.contains(&field) {
        return Some(SortSpec { field: field.to_string(), ascending });
    }
    None
}

/// Cooperative cancellation flag threaded through long-running startup work.
///
/// Cloning shares the flag; once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
