//! Service contract and the façade consumed by the platform
//!
//! `SearchService` is the uniform surface over both back ends; `Searcher`
//! wraps it for the HTTP layer, adding the disabled-search short circuit.
//! The factory picks the back end from configuration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendType, SearcherParams};
use crate::document::{Comment, CommentStore};
use crate::elastic::ElasticSearcher;
use crate::errors::{SearchError, SearchResult};
use crate::local;
use crate::types::{CancelToken, Request, ResultPage};

/// The search subsystem as the rest of the platform sees it.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Asynchronously index a comment; returns only immediate errors
    /// (unknown site, closed service).
    async fn index_document(&self, comment: &Comment) -> SearchResult<()>;

    async fn delete(&self, site_id: &str, comment_id: &str) -> SearchResult<()>;

    async fn search(&self, req: Request) -> SearchResult<ResultPage>;

    /// Synchronous barrier on one site's shard.
    async fn flush(&self, site_id: &str) -> SearchResult<()>;

    /// Recover state left by a previous run. Returns `true` when such state
    /// was found (warm start), `false` on a cold start. `store` is the
    /// rebuild hook for cold starts.
    async fn init(
        &self,
        cancel: &CancelToken,
        store: Option<Arc<dyn CommentStore>>,
    ) -> SearchResult<bool>;

    fn ready(&self) -> bool;

    async fn close(&self) -> SearchResult<()>;

    fn backend_type(&self) -> BackendType;

    /// Static description of the supported query language.
    fn help(&self) -> &'static str;
}

/// Build a fully wired service for the configured back end.
pub async fn create_service(params: SearcherParams) -> SearchResult<Arc<dyn SearchService>> {
    match params.backend {
        BackendType::Tantivy => Ok(Arc::new(local::new_service(&params).await?)),
        BackendType::Elastic => Ok(Arc::new(ElasticSearcher::new(&params)?)),
    }
}

/// Façade with a disabled-search mode.
///
/// When search is disabled by configuration, queries fail with
/// [`SearchError::NotEnabled`] while write-path calls silently succeed, so
/// the platform's ingest code needs no special casing. An enabled but not
/// yet initialized service answers queries with [`SearchError::NotReady`].
pub struct Searcher {
    service: Option<Arc<dyn SearchService>>,
}

impl Searcher {
    /// Wire up the configured back end, or a disabled façade for `None`.
    pub async fn new(params: Option<SearcherParams>) -> SearchResult<Self> {
        let service = match params {
            Some(params) => Some(create_service(params).await?),
            None => None,
        };
        Ok(Searcher { service })
    }

    fn enabled(&self) -> SearchResult<&Arc<dyn SearchService>> {
        self.service.as_ref().ok_or(SearchError::NotEnabled)
    }

    pub async fn search(&self, req: Request) -> SearchResult<ResultPage> {
        let service = self.enabled()?;
        if !service.ready() {
            return Err(SearchError::NotReady);
        }
        service.search(req).await
    }

    /// Query-language help for the active back end.
    pub fn help(&self) -> SearchResult<&'static str> {
        let service = self.enabled()?;
        if !service.ready() {
            return Err(SearchError::NotReady);
        }
        Ok(service.help())
    }

    pub async fn index_document(&self, comment: &Comment) -> SearchResult<()> {
        match &self.service {
            Some(service) => service.index_document(comment).await,
            None => Ok(()),
        }
    }

    pub async fn delete(&self, site_id: &str, comment_id: &str) -> SearchResult<()> {
        match &self.service {
            Some(service) => service.delete(site_id, comment_id).await,
            None => Ok(()),
        }
    }

    pub async fn flush(&self, site_id: &str) -> SearchResult<()> {
        match &self.service {
            Some(service) => service.flush(site_id).await,
            None => Ok(()),
        }
    }

    pub async fn init(
        &self,
        cancel: &CancelToken,
        store: Option<Arc<dyn CommentStore>>,
    ) -> SearchResult<bool> {
        match &self.service {
            Some(service) => service.init(cancel, store).await,
            None => Ok(false),
        }
    }

    pub fn ready(&self) -> bool {
        self.service.as_ref().is_some_and(|service| service.ready())
    }

    pub async fn close(&self) -> SearchResult<()> {
        match &self.service {
            Some(service) => service.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::config::Analyzer;
    use crate::document::{Locator, User};

    fn params(path: &Path) -> SearcherParams {
        SearcherParams {
            backend: BackendType::Tantivy,
            index_path: path.to_path_buf(),
            analyzer: Analyzer::Standard,
            endpoint: String::new(),
            secret: String::new(),
            sites: vec!["s1".to_string()],
        }
    }

    fn comment(text: &str) -> Comment {
        Comment {
            id: "c1".to_string(),
            locator: Locator {
                site_id: "s1".to_string(),
                url: "https://example.com/post".to_string(),
            },
            text: text.to_string(),
            user: User { name: "dev".to_string() },
            timestamp: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_searcher_rejects_queries_but_accepts_writes() {
        let searcher = Searcher::new(None).await.unwrap();

        let err = searcher.search(Request::default()).await.unwrap_err();
        assert!(matches!(err, SearchError::NotEnabled));
        let err = searcher.help().unwrap_err();
        assert!(matches!(err, SearchError::NotEnabled));

        searcher.index_document(&comment("ignored")).await.unwrap();
        searcher.delete("s1", "c1").await.unwrap();
        searcher.flush("s1").await.unwrap();
        assert!(!searcher.ready());
        assert!(!searcher.init(&CancelToken::new(), None).await.unwrap());
        searcher.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queries_fail_until_initialized() {
        let tmp = TempDir::new().unwrap();
        let searcher = Searcher::new(Some(params(tmp.path()))).await.unwrap();

        let err = searcher
            .search(Request { site_id: "s1".to_string(), limit: 10, ..Request::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::NotReady));
        assert!(matches!(searcher.help().unwrap_err(), SearchError::NotReady));

        searcher.init(&CancelToken::new(), None).await.unwrap();
        assert!(searcher.ready());

        searcher.index_document(&comment("<p>hello world</p>")).await.unwrap();
        searcher.flush("s1").await.unwrap();
        let page = searcher
            .search(Request {
                site_id: "s1".to_string(),
                query: "hello".to_string(),
                limit: 10,
                ..Request::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let help = searcher.help().unwrap();
        assert!(help.contains("phrase"));

        searcher.close().await.unwrap();
    }
}
