//! Local inverted-index back end on tantivy
//!
//! One index directory per site under the configured index path. The site
//! id is hashed into a filesystem-safe directory name; the hash is stable
//! across runs so reopening finds the same index.

mod highlight;
mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{
    DateTime as TantivyDateTime, DocAddress, Index, IndexReader, IndexSettings, IndexWriter, Order,
    TantivyDocument, TantivyError, Term,
};

use crate::backend::{IndexBatch, SearchBackend};
use crate::buffered::BufferedEngine;
use crate::config::{Analyzer, BackendType, SearcherParams};
use crate::document::DocumentComment;
use crate::errors::{SearchError, SearchResult};
use crate::multiplex::Multiplexer;
use crate::types::{parse_sort_by, Request, ResultDoc, ResultPage};

use schema::{CommentSchema, TIMESTAMP_FIELD};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Tantivy-backed single-site index.
pub struct TantivyIndexer {
    index: Index,
    schema: CommentSchema,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    query_parser: QueryParser,
    closed: AtomicBool,
}

/// Pending mutation set; applied to the writer on commit.
pub struct TantivyBatch {
    schema: CommentSchema,
    ops: Vec<(Term, TantivyDocument)>,
}

impl TantivyIndexer {
    /// Open an existing index at `dir` or create a fresh one.
    pub fn open(dir: &Path, analyzer: Analyzer) -> SearchResult<Self> {
        if dir.exists() && !dir.is_dir() {
            return Err(SearchError::Config(format!(
                "index path {} should be a directory",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)?;

        let schema = schema::build(analyzer);
        let index = if dir.join("meta.json").exists() {
            tracing::info!(path = %dir.display(), "opening existing search index");
            Index::open_in_dir(dir)?
        } else {
            tracing::info!(path = %dir.display(), "creating new search index");
            let directory = MmapDirectory::open(dir).map_err(TantivyError::from)?;
            Index::create(directory, schema.schema.clone(), IndexSettings::default())?
        };
        schema::register_tokenizers(index.tokenizers());

        let mut writer: IndexWriter = index.writer(WRITER_MEMORY_BYTES)?;
        writer.commit()?;
        let reader = index.reader()?;
        let query_parser = QueryParser::for_index(&index, vec![schema.text]);

        Ok(TantivyIndexer {
            index,
            schema,
            writer: Mutex::new(writer),
            reader,
            query_parser,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> SearchResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SearchError::IndexClosed);
        }
        Ok(())
    }

    fn collect_page(
        &self,
        searcher: &tantivy::Searcher,
        query: &dyn tantivy::query::Query,
        req: &Request,
    ) -> SearchResult<Vec<DocAddress>> {
        if req.limit == 0 {
            return Ok(Vec::new());
        }
        match parse_sort_by(&req.sort_by, &[TIMESTAMP_FIELD]) {
            Some(spec) => {
                let order = if spec.ascending { Order::Asc } else { Order::Desc };
                let collector = TopDocs::with_limit(req.limit)
                    .and_offset(req.from)
                    .order_by_fast_field::<TantivyDateTime>(&spec.field, order);
                let hits = searcher.search(query, &collector)?;
                Ok(hits.into_iter().map(|(_, addr)| addr).collect())
            }
            None => {
                if !req.sort_by.is_empty() {
                    tracing::warn!(sort_by = %req.sort_by, "unknown sort field");
                }
                let collector = TopDocs::with_limit(req.limit).and_offset(req.from);
                let hits = searcher.search(query, &collector)?;
                Ok(hits.into_iter().map(|(_, addr)| addr).collect())
            }
        }
    }
}

fn stored_str(doc: &TantivyDocument, field: tantivy::schema::Field, name: &str) -> SearchResult<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SearchError::Other(format!("stored field {name:?} missing from hit")))
}

impl SearchBackend for TantivyIndexer {
    type Batch = TantivyBatch;

    fn new_batch(&self) -> TantivyBatch {
        TantivyBatch {
            schema: self.schema.clone(),
            ops: Vec::new(),
        }
    }

    fn commit(&self, batch: TantivyBatch) -> SearchResult<()> {
        self.ensure_open()?;
        {
            let mut writer = self.writer.lock();
            for (id_term, doc) in batch.ops {
                writer.delete_term(id_term);
                writer.add_document(doc)?;
            }
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    fn search(&self, req: &Request) -> SearchResult<ResultPage> {
        self.ensure_open()?;
        let started = Instant::now();

        let searcher = self.reader.searcher();
        let query = self
            .query_parser
            .parse_query(&req.query)
            .map_err(|e| SearchError::QueryParsing(e.to_string()))?;

        let total = searcher.search(&query, &Count)? as u64;
        let addresses = self.collect_page(&searcher, &*query, req)?;

        let terms = highlight::query_terms(&*query, self.schema.text);
        let mut analyzer = self.index.tokenizer_for_field(self.schema.text)?;

        let mut documents = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let id = stored_str(&doc, self.schema.id, schema::ID_FIELD)?;
            let post_url = stored_str(&doc, self.schema.url, schema::URL_FIELD)?;
            let text = doc
                .get_first(self.schema.text)
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let matches = highlight::token_matches(&mut analyzer, text, &terms);
            documents.push(ResultDoc { id, post_url, matches });
        }

        tracing::info!(
            total,
            query = %req.query,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(ResultPage { total, documents })
    }

    fn delete(&self, id: &str) -> SearchResult<()> {
        self.ensure_open()?;
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema.id, id));
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    fn close(&self) -> SearchResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl IndexBatch for TantivyBatch {
    fn index(&mut self, id: &str, doc: &DocumentComment) -> SearchResult<()> {
        let mut tdoc = TantivyDocument::default();
        tdoc.add_text(self.schema.id, id);
        tdoc.add_text(self.schema.url, &doc.url);
        tdoc.add_text(self.schema.username, &doc.username);
        tdoc.add_text(self.schema.text, &doc.text);
        tdoc.add_date(
            self.schema.timestamp,
            TantivyDateTime::from_timestamp_secs(doc.timestamp.timestamp()),
        );
        self.ops.push((Term::from_field_text(self.schema.id, id), tdoc));
        Ok(())
    }
}

/// Hash a site id into a stable filesystem-safe directory name.
pub(crate) fn encode_site_id(site_id: &str) -> String {
    format!("{:08x}", crc32fast::hash(site_id.as_bytes()))
}

/// Build the local service: one buffered engine per configured site behind
/// a multiplexer. Shards already constructed are released if a later one
/// fails.
pub(crate) async fn new_service(
    params: &SearcherParams,
) -> SearchResult<Multiplexer<TantivyIndexer>> {
    let mut shards = HashMap::new();
    for site_id in &params.sites {
        let dir = params.index_path.join(encode_site_id(site_id));
        match TantivyIndexer::open(&dir, params.analyzer) {
            Ok(index) => {
                shards.insert(site_id.clone(), BufferedEngine::start(index, dir));
            }
            Err(err) => {
                for (site, engine) in &shards {
                    if let Err(close_err) = engine.close().await {
                        tracing::error!(site = %site, error = %close_err, "failed to release shard");
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(Multiplexer::new(shards, BackendType::Tantivy))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;

    fn doc(id: &str, text: &str, ts: i64) -> DocumentComment {
        DocumentComment {
            id: id.to_string(),
            url: format!("https://example.com/post/{id}"),
            text: text.to_string(),
            username: "Tester".to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn index_docs(backend: &TantivyIndexer, docs: &[DocumentComment]) {
        let mut batch = backend.new_batch();
        for d in docs {
            batch.index(&d.id, d).unwrap();
        }
        backend.commit(batch).unwrap();
    }

    #[test]
    fn site_id_hash_is_stable_hex() {
        let first = encode_site_id("remark");
        assert_eq!(first, encode_site_id("remark"));
        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, encode_site_id("other site/with?chars"));
    }

    #[test]
    fn index_search_roundtrip_with_matches() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::English).unwrap();
        index_docs(
            &backend,
            &[doc("c1", "hello world", 1), doc("c2", "hello there", 2), doc("c3", "goodbye", 3)],
        );

        let page = backend
            .search(&Request {
                site_id: "s1".to_string(),
                query: "hello".to_string(),
                limit: 10,
                ..Request::default()
            })
            .unwrap();
        assert_eq!(page.total, 2);
        let mut ids: Vec<&str> = page.documents.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["c1", "c2"]);
        for hit in &page.documents {
            assert!(!hit.matches.is_empty());
            let m = hit.matches[0];
            assert_eq!(m.start, 0);
            assert_eq!(m.end, 5);
        }
    }

    #[test]
    fn upsert_replaces_previous_version() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::Standard).unwrap();
        index_docs(&backend, &[doc("c1", "alpha", 1)]);
        index_docs(&backend, &[doc("c1", "beta", 2)]);

        let alpha = backend
            .search(&Request { query: "alpha".to_string(), limit: 10, ..Request::default() })
            .unwrap();
        assert_eq!(alpha.total, 0);

        let beta = backend
            .search(&Request { query: "beta".to_string(), limit: 10, ..Request::default() })
            .unwrap();
        assert_eq!(beta.total, 1);
        assert_eq!(beta.documents[0].id, "c1");
    }

    #[test]
    fn sort_by_timestamp_orders_hits() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::Standard).unwrap();
        index_docs(
            &backend,
            &[doc("old", "carrot cake", 100), doc("new", "carrot soup", 200)],
        );

        let asc = backend
            .search(&Request {
                query: "carrot".to_string(),
                sort_by: "+timestamp".to_string(),
                limit: 10,
                ..Request::default()
            })
            .unwrap();
        let ids: Vec<&str> = asc.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        let desc = backend
            .search(&Request {
                query: "carrot".to_string(),
                sort_by: "-timestamp".to_string(),
                limit: 10,
                ..Request::default()
            })
            .unwrap();
        let ids: Vec<&str> = desc.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn zero_limit_returns_total_only() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::Standard).unwrap();
        index_docs(&backend, &[doc("c1", "needle", 1)]);

        let page = backend
            .search(&Request { query: "needle".to_string(), limit: 0, ..Request::default() })
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.documents.is_empty());
    }

    #[test]
    fn closed_backend_rejects_reads() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::Standard).unwrap();
        backend.close().unwrap();
        let err = backend
            .search(&Request { query: "anything".to_string(), limit: 10, ..Request::default() })
            .unwrap_err();
        assert!(matches!(err, SearchError::IndexClosed));
    }

    #[test]
    fn delete_removes_document() {
        let tmp = TempDir::new().unwrap();
        let backend = TantivyIndexer::open(tmp.path(), Analyzer::Standard).unwrap();
        index_docs(&backend, &[doc("c2", "carrot", 1)]);
        backend.delete("c2").unwrap();

        let page = backend
            .search(&Request { query: "carrot".to_string(), limit: 10, ..Request::default() })
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
