//! Remote Elasticsearch-compatible back end
//!
//! Implements the service contract directly rather than sitting behind the
//! buffered engine: bulk indexers already provide batching and backpressure
//! on the write path, so no extra housekeeping is needed.

mod bulk;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use url::Url;

use crate::config::{BackendType, SearcherParams};
use crate::document::{Comment, CommentStore, DocumentComment};
use crate::errors::{SearchError, SearchResult};
use crate::service::SearchService;
use crate::types::{CancelToken, Request, ResultDoc, ResultPage};

use bulk::{BulkAction, BulkIndexer, BulkItem};

const BODY_EXCERPT_LEN: usize = 256;

/// Cluster credentials, parsed from the configured secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Auth {
    Basic { user: String, password: String },
    Token(String),
}

impl Auth {
    /// Recognized secret forms: `basic:<user>:<pass>` and `token:<apiKey>`.
    pub(crate) fn parse(secret: &str) -> SearchResult<Auth> {
        if let Some(rest) = secret.strip_prefix("basic:") {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() != 2 {
                return Err(SearchError::Config(
                    "secret for basic auth should have format 'basic:user:pass'".to_string(),
                ));
            }
            return Ok(Auth::Basic {
                user: parts[0].to_string(),
                password: parts[1].to_string(),
            });
        }
        if let Some(key) = secret.strip_prefix("token:") {
            return Ok(Auth::Token(key.to_string()));
        }
        Err(SearchError::Config(
            r#"secret should start with one of prefixes: ["basic:", "token:"]"#.to_string(),
        ))
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
            Auth::Token(key) => {
                request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}"))
            }
        }
    }
}

/// Truncate a response body for error reporting.
pub(crate) fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[derive(Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Deserialize)]
struct EsHits {
    total: EsTotal,
    hits: Vec<EsHit>,
}

#[derive(Deserialize)]
struct EsTotal {
    value: u64,
}

#[derive(Deserialize)]
struct EsHit {
    #[serde(rename = "_source")]
    source: DocumentComment,
}

/// Remote cluster client with one bulk indexer per site.
#[derive(Debug)]
pub struct ElasticSearcher {
    client: reqwest::Client,
    endpoint: Url,
    auth: Auth,
    indexers: HashMap<String, BulkIndexer>,
    cancel: watch::Sender<bool>,
}

impl ElasticSearcher {
    pub(crate) fn new(params: &SearcherParams) -> SearchResult<Self> {
        if params.endpoint.is_empty() || params.secret.is_empty() {
            return Err(SearchError::Config(
                "elasticsearch endpoint and secret are required".to_string(),
            ));
        }
        let endpoint = Url::parse(&params.endpoint).map_err(|err| {
            SearchError::Config(format!("invalid endpoint {:?}: {err}", params.endpoint))
        })?;
        let auth = Auth::parse(&params.secret)?;
        let client = reqwest::Client::new();

        let (cancel, cancel_rx) = watch::channel(false);
        let mut indexers = HashMap::new();
        for site_id in &params.sites {
            indexers.insert(
                site_id.clone(),
                BulkIndexer::start(
                    client.clone(),
                    endpoint.clone(),
                    auth.clone(),
                    site_id.clone(),
                    cancel_rx.clone(),
                ),
            );
        }
        Ok(ElasticSearcher { client, endpoint, auth, indexers, cancel })
    }

    fn indexer(&self, site_id: &str) -> SearchResult<&BulkIndexer> {
        self.indexers
            .get(site_id)
            .ok_or_else(|| SearchError::SiteNotFound(site_id.to_string()))
    }

    fn search_body(req: &Request) -> serde_json::Value {
        serde_json::json!({
            "query": { "match": { "text": req.query } },
            "size": req.limit,
            "from": req.from,
        })
    }
}

#[async_trait]
impl SearchService for ElasticSearcher {
    async fn index_document(&self, comment: &Comment) -> SearchResult<()> {
        let doc = DocumentComment::from_comment(comment);
        let document = serde_json::to_value(&doc)?;
        let indexer = self.indexer(&comment.locator.site_id)?;

        let failed_id = doc.id.clone();
        indexer
            .add(BulkItem {
                action: BulkAction::Index { id: doc.id, document },
                on_failure: Box::new(move |reason| {
                    tracing::error!(id = %failed_id, error = %reason, "failed to index document");
                }),
            })
            .map_err(|err| SearchError::Other(format!("failed to add document to batch: {err}")))
    }

    async fn delete(&self, site_id: &str, comment_id: &str) -> SearchResult<()> {
        let indexer = self.indexer(site_id)?;
        let failed_id = comment_id.to_string();
        indexer
            .add(BulkItem {
                action: BulkAction::Delete { id: comment_id.to_string() },
                on_failure: Box::new(move |reason| {
                    tracing::error!(id = %failed_id, error = %reason, "failed to delete document");
                }),
            })
            .map_err(|err| SearchError::Other(format!("failed to add delete to batch: {err}")))
    }

    async fn search(&self, req: Request) -> SearchResult<ResultPage> {
        if !req.sort_by.is_empty() {
            tracing::warn!(sort_by = %req.sort_by, "sorting is not supported by the remote backend");
        }
        let url = self
            .endpoint
            .join(&format!("{}/_search", req.site_id))
            .map_err(|err| SearchError::Config(format!("invalid search url: {err}")))?;

        let response = self
            .auth
            .apply(self.client.post(url))
            .json(&Self::search_body(&req))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Remote { status: status.as_u16(), body: excerpt(&body) });
        }

        let parsed: EsSearchResponse = response.json().await?;
        Ok(ResultPage {
            total: parsed.hits.total.value,
            documents: parsed
                .hits
                .hits
                .into_iter()
                .map(|hit| ResultDoc {
                    id: hit.source.id,
                    post_url: hit.source.url,
                    matches: Vec::new(),
                })
                .collect(),
        })
    }

    async fn flush(&self, _site_id: &str) -> SearchResult<()> {
        // TODO: issue a _refresh on the site index so flush becomes a real
        // barrier instead of a stub
        Ok(())
    }

    async fn init(
        &self,
        _cancel: &CancelToken,
        _store: Option<Arc<dyn CommentStore>>,
    ) -> SearchResult<bool> {
        // TODO: rebuild missing site indices from the comment store
        Ok(false)
    }

    fn ready(&self) -> bool {
        // TODO: check cluster health instead of assuming readiness
        true
    }

    async fn close(&self) -> SearchResult<()> {
        // cancel before closing the indexers: queued bulk items are failed
        // through their handlers rather than flushed to a cluster we are
        // abandoning
        let _ = self.cancel.send(true);

        let mut failures = Vec::new();
        for (site_id, indexer) in &self.indexers {
            if let Err(err) = indexer.close().await {
                failures.push(format!("cannot close indexer for site {site_id}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SearchError::Other(failures.join("; ")))
        }
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Elastic
    }

    fn help(&self) -> &'static str {
        BackendType::Elastic.help_prompt()
    }
}
