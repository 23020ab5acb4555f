//! Per-site routing over buffered shards
//!
//! A pure router: every request goes to the shard owning its site id, close
//! and init fan out across all shards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::SearchBackend;
use crate::buffered::BufferedEngine;
use crate::config::BackendType;
use crate::document::{Comment, CommentStore, DocumentComment};
use crate::errors::{SearchError, SearchResult};
use crate::service::SearchService;
use crate::types::{CancelToken, Request, ResultPage};

pub struct Multiplexer<B: SearchBackend> {
    shards: HashMap<String, BufferedEngine<B>>,
    backend: BackendType,
}

impl<B: SearchBackend> Multiplexer<B> {
    pub(crate) fn new(shards: HashMap<String, BufferedEngine<B>>, backend: BackendType) -> Self {
        Multiplexer { shards, backend }
    }

    fn shard(&self, site_id: &str) -> SearchResult<&BufferedEngine<B>> {
        self.shards
            .get(site_id)
            .ok_or_else(|| SearchError::SiteNotFound(site_id.to_string()))
    }
}

#[async_trait]
impl<B: SearchBackend> SearchService for Multiplexer<B> {
    async fn index_document(&self, comment: &Comment) -> SearchResult<()> {
        let shard = self.shard(&comment.locator.site_id)?;
        shard.index_document(DocumentComment::from_comment(comment))
    }

    async fn delete(&self, site_id: &str, comment_id: &str) -> SearchResult<()> {
        self.shard(site_id)?.delete(comment_id).await
    }

    async fn search(&self, req: Request) -> SearchResult<ResultPage> {
        self.shard(&req.site_id)?.search(req).await
    }

    async fn flush(&self, site_id: &str) -> SearchResult<()> {
        self.shard(site_id)?.flush().await
    }

    async fn init(
        &self,
        cancel: &CancelToken,
        _store: Option<Arc<dyn CommentStore>>,
    ) -> SearchResult<bool> {
        // TODO: rebuild shards from the comment store when no ahead log
        // exists on a cold start
        let mut warm = false;
        for shard in self.shards.values() {
            warm |= shard.init(cancel).await?;
        }
        Ok(warm)
    }

    fn ready(&self) -> bool {
        self.shards.values().all(|shard| shard.ready())
    }

    async fn close(&self) -> SearchResult<()> {
        let mut failures = Vec::new();
        for (site_id, shard) in &self.shards {
            if let Err(err) = shard.close().await {
                failures.push(format!("cannot close index for site {site_id}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SearchError::Other(failures.join("; ")))
        }
    }

    fn backend_type(&self) -> BackendType {
        self.backend
    }

    fn help(&self) -> &'static str {
        self.backend.help_prompt()
    }
}
