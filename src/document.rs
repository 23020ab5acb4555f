//! Comment entities and their indexable projection
//!
//! The canonical comment lives in the platform's comment store; this module
//! carries the minimal slice of it the search subsystem consumes, plus the
//! pure projection into the document shape the back ends index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SearchResult;

/// Post reference a comment is attached to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Locator {
    pub site_id: String,
    /// Post permalink
    pub url: String,
}

/// Comment author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

/// The slice of the canonical comment entity the search subsystem reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub locator: Locator,
    /// Comment body as rendered HTML
    pub text: String,
    pub user: User,
    #[serde(default = "epoch")]
    pub timestamp: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Read access to the authoritative comment store, used as the rebuild hook
/// for cold starts.
pub trait CommentStore: Send + Sync {
    /// All comments of a site, in creation order.
    fn comments(&self, site_id: &str) -> SearchResult<Vec<Comment>>;
}

/// The indexable projection of a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentComment {
    /// Globally unique comment identifier
    pub id: String,
    /// Post permalink, indexed as a keyword so it round-trips exactly
    pub url: String,
    /// Comment body stripped to plain text
    pub text: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl DocumentComment {
    /// Project a comment into its indexable form. HTML markup is stripped
    /// from the body; `url` and `username` are carried verbatim (the
    /// keyword analyzer lowercases the username at index time).
    #[must_use]
    pub fn from_comment(comment: &Comment) -> Self {
        DocumentComment {
            id: comment.id.clone(),
            url: comment.locator.url.clone(),
            text: strip_html(&comment.text),
            username: comment.user.name.clone(),
            timestamp: comment.timestamp,
        }
    }
}

/// Strip rendered HTML down to whitespace-normalized plain text.
fn strip_html(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    let text: Vec<&str> = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect();
    text.join(" ")
}
