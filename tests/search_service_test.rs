//! End-to-end scenarios against the local back end
//!
//! Each test wires a full service through the factory and drives it the way
//! the platform does: index through the service surface, flush as the
//! durability barrier, search and assert on the returned page.

use std::path::Path;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use comment_search::{
    create_service, Analyzer, BackendType, CancelToken, Comment, Locator, Request, SearcherParams,
    User,
};

fn params(path: &Path, sites: &[&str]) -> SearcherParams {
    SearcherParams {
        backend: BackendType::Tantivy,
        index_path: path.to_path_buf(),
        analyzer: Analyzer::English,
        endpoint: String::new(),
        secret: String::new(),
        sites: sites.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn comment(site_id: &str, id: &str, html: &str) -> Comment {
    Comment {
        id: id.to_string(),
        locator: Locator {
            site_id: site_id.to_string(),
            url: format!("https://example.com/post/{id}"),
        },
        text: html.to_string(),
        user: User { name: "commenter".to_string() },
        timestamp: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
    }
}

fn request(site_id: &str, query: &str) -> Request {
    Request {
        site_id: site_id.to_string(),
        query: query.to_string(),
        limit: 10,
        ..Request::default()
    }
}

/// Count `unindexed.log` files anywhere under the index root.
fn ahead_log_count(root: &Path) -> usize {
    let mut count = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some("unindexed.log") {
                count += 1;
            }
        }
    }
    count
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn indexed_documents_are_searchable_after_flush() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    let warm = svc.init(&CancelToken::new(), None).await.unwrap();
    assert!(!warm, "fresh index path is a cold start");

    svc.index_document(&comment("s1", "c1", "<p>hello world</p>")).await.unwrap();
    svc.index_document(&comment("s1", "c2", "<p>hello there</p>")).await.unwrap();
    svc.index_document(&comment("s1", "c3", "<p>goodbye</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();

    let page = svc.search(request("s1", "hello")).await.unwrap();
    assert_eq!(page.total, 2);
    let mut ids: Vec<&str> = page.documents.iter().map(|d| d.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["c1", "c2"]);
    for hit in &page.documents {
        assert!(hit.post_url.starts_with("https://example.com/post/"));
        assert!(!hit.matches.is_empty(), "expected a highlight for {}", hit.id);
        // both stripped texts start with "hello"
        assert_eq!(hit.matches[0].start, 0);
        assert_eq!(hit.matches[0].end, 5);
    }

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffered_documents_survive_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
        svc.init(&CancelToken::new(), None).await.unwrap();
        for i in 0..5 {
            let c = comment("s1", &format!("c{i}"), &format!("<p>token{i} body</p>"));
            svc.index_document(&c).await.unwrap();
        }
        // no flush: the documents are still queued when the service stops
        svc.close().await.unwrap();
    }
    assert_eq!(ahead_log_count(tmp.path()), 1);

    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    let warm = svc.init(&CancelToken::new(), None).await.unwrap();
    assert!(warm, "ahead log marks a warm start");
    svc.flush("s1").await.unwrap();

    for i in 0..5 {
        let page = svc.search(request("s1", &format!("token{i}"))).await.unwrap();
        assert_eq!(page.total, 1, "document c{i} lost across restart");
        assert_eq!(page.documents[0].id, format!("c{i}"));
    }
    assert_eq!(ahead_log_count(tmp.path()), 0, "ahead log consumed after replay");

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reindexing_same_id_replaces_the_document() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    svc.index_document(&comment("s1", "c1", "<p>alpha</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();
    svc.index_document(&comment("s1", "c1", "<p>beta</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();

    let alpha = svc.search(request("s1", "alpha")).await.unwrap();
    assert_eq!(alpha.total, 0);

    let beta = svc.search(request("s1", "beta")).await.unwrap();
    assert_eq!(beta.total, 1);
    assert_eq!(beta.documents[0].id, "c1");

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_comment_disappears_from_results() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    svc.index_document(&comment("s1", "c2", "<p>carrot</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();
    assert_eq!(svc.search(request("s1", "carrot")).await.unwrap().total, 1);

    svc.delete("s1", "c2").await.unwrap();
    svc.flush("s1").await.unwrap();
    assert_eq!(svc.search(request("s1", "carrot")).await.unwrap().total, 0);

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sites_are_isolated_and_unknown_sites_rejected() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1", "s2"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    svc.index_document(&comment("s1", "c1", "<p>pumpkin</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();

    assert_eq!(svc.search(request("s1", "pumpkin")).await.unwrap().total, 1);
    assert_eq!(svc.search(request("s2", "pumpkin")).await.unwrap().total, 0);

    let err = svc.index_document(&comment("s3", "c9", "<p>x</p>")).await.unwrap_err();
    assert_eq!(err.to_string(), "index for site s3 does not found");
    assert!(svc.search(request("s3", "pumpkin")).await.is_err());

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_limit_reports_total_without_documents() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    svc.index_document(&comment("s1", "c1", "<p>needle</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();

    let mut req = request("s1", "needle");
    req.limit = 0;
    let page = svc.search(req).await.unwrap();
    assert_eq!(page.total, 1);
    assert!(page.documents.is_empty());

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_after_close_reports_closing() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();
    svc.close().await.unwrap();

    let err = svc.flush("s1").await.unwrap_err();
    assert_eq!(err.to_string(), "indexer closing");
    assert!(svc.search(request("s1", "anything")).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_sort_field_falls_back_to_relevance() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    svc.index_document(&comment("s1", "c1", "<p>durian fruit</p>")).await.unwrap();
    svc.flush("s1").await.unwrap();

    let mut req = request("s1", "durian");
    req.sort_by = "votes".to_string();
    let page = svc.search(req).await.unwrap();
    assert_eq!(page.total, 1);

    svc.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timestamp_sort_orders_pages() {
    let tmp = TempDir::new().unwrap();
    let svc = create_service(params(tmp.path(), &["s1"])).await.unwrap();
    svc.init(&CancelToken::new(), None).await.unwrap();

    let mut old = comment("s1", "old", "<p>fig tart</p>");
    old.timestamp = Utc.timestamp_opt(1_000, 0).unwrap();
    let mut new = comment("s1", "new", "<p>fig jam</p>");
    new.timestamp = Utc.timestamp_opt(2_000, 0).unwrap();
    svc.index_document(&old).await.unwrap();
    svc.index_document(&new).await.unwrap();
    svc.flush("s1").await.unwrap();

    let mut req = request("s1", "fig");
    req.sort_by = "+timestamp".to_string();
    let asc: Vec<String> =
        svc.search(req.clone()).await.unwrap().documents.into_iter().map(|d| d.id).collect();
    assert_eq!(asc, vec!["old", "new"]);

    req.sort_by = "-timestamp".to_string();
    let desc: Vec<String> =
        svc.search(req).await.unwrap().documents.into_iter().map(|d| d.id).collect();
    assert_eq!(desc, vec!["new", "old"]);

    svc.close().await.unwrap();
}
