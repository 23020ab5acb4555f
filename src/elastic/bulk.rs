//! Asynchronous bulk indexer
//!
//! One indexer per site: items queue on a channel and a worker task posts
//! them to the cluster's `_bulk` endpoint on a size or time trigger.
//! Failures never reach the caller of `add`; they go through the item's
//! failure handler.
//!
//! Cancellation is deterministic: once the shared cancel signal fires,
//! every queued-but-unflushed item is failed through its handler with
//! "bulk indexing cancelled" and nothing further is sent to the cluster,
//! regardless of which worker branch observes the shutdown first. Dropping
//! the sender without cancelling drains gracefully with a final flush.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;

use crate::errors::{SearchError, SearchResult};

use super::{excerpt, Auth};

const BULK_FLUSH_COUNT: usize = 100;
const BULK_FLUSH_EVERY: Duration = Duration::from_secs(5);

const CANCELLED_REASON: &str = "bulk indexing cancelled";

/// Called with the failure reason when an item does not make it into the
/// cluster.
pub(crate) type FailureHandler = Box<dyn FnOnce(String) + Send + 'static>;

pub(crate) enum BulkAction {
    Index { id: String, document: serde_json::Value },
    Delete { id: String },
}

pub(crate) struct BulkItem {
    pub action: BulkAction,
    pub on_failure: FailureHandler,
}

#[derive(Debug)]
pub(crate) struct BulkIndexer {
    sender: Mutex<Option<mpsc::UnboundedSender<BulkItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BulkIndexer {
    pub(crate) fn start(
        client: reqwest::Client,
        endpoint: Url,
        auth: Auth,
        site_id: String,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(client, endpoint, auth, site_id, receiver, cancel));
        BulkIndexer {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue an item; only fails when the indexer is closing.
    pub(crate) fn add(&self, item: BulkItem) -> SearchResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(SearchError::IndexerClosing);
        };
        sender.send(item).map_err(|_| SearchError::IndexerClosing)
    }

    /// Stop accepting items and wait for the worker to finish.
    pub(crate) async fn close(&self) -> SearchResult<()> {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.await.map_err(SearchError::other)?;
        }
        Ok(())
    }
}

async fn worker_loop(
    client: reqwest::Client,
    endpoint: Url,
    auth: Auth,
    site_id: String,
    mut items: mpsc::UnboundedReceiver<BulkItem>,
    mut cancel: watch::Receiver<bool>,
) {
    // second handle for flag checks: `changed` holds a mutable borrow
    // inside the select
    let cancel_flag = cancel.clone();
    let mut pending: Vec<BulkItem> = Vec::new();
    let mut ticker = interval_at(Instant::now() + BULK_FLUSH_EVERY, BULK_FLUSH_EVERY);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = items.recv() => match item {
                Some(item) => {
                    pending.push(item);
                    if pending.len() >= BULK_FLUSH_COUNT {
                        flush_or_abort(&client, &endpoint, &auth, &site_id, &cancel_flag, &mut pending).await;
                    }
                }
                None => {
                    flush_or_abort(&client, &endpoint, &auth, &site_id, &cancel_flag, &mut pending).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush_or_abort(&client, &endpoint, &auth, &site_id, &cancel_flag, &mut pending).await;
            }
            _ = cancel.changed() => {
                abort_pending(&mut items, &mut pending);
                break;
            }
        }
    }
}

/// Flush the batch, unless cancellation already fired; a cancelled batch
/// is failed through the item handlers instead of being sent.
async fn flush_or_abort(
    client: &reqwest::Client,
    endpoint: &Url,
    auth: &Auth,
    site_id: &str,
    cancel: &watch::Receiver<bool>,
    pending: &mut Vec<BulkItem>,
) {
    if *cancel.borrow() {
        fail_batch(std::mem::take(pending), CANCELLED_REASON.to_string());
        return;
    }
    flush(client, endpoint, auth, site_id, pending).await;
}

/// Fail everything buffered plus whatever is still sitting in the channel.
fn abort_pending(items: &mut mpsc::UnboundedReceiver<BulkItem>, pending: &mut Vec<BulkItem>) {
    let mut batch = std::mem::take(pending);
    while let Ok(item) = items.try_recv() {
        batch.push(item);
    }
    fail_batch(batch, CANCELLED_REASON.to_string());
}

/// Render a batch as the cluster's newline-delimited `_bulk` payload: an
/// action line per item, followed by the document source for index actions.
fn bulk_body(site_id: &str, batch: &[BulkItem]) -> String {
    let mut body = String::new();
    for item in batch {
        match &item.action {
            BulkAction::Index { id, document } => {
                body.push_str(
                    &serde_json::json!({"index": {"_index": site_id, "_id": id}}).to_string(),
                );
                body.push('\n');
                body.push_str(&document.to_string());
                body.push('\n');
            }
            BulkAction::Delete { id } => {
                body.push_str(
                    &serde_json::json!({"delete": {"_index": site_id, "_id": id}}).to_string(),
                );
                body.push('\n');
            }
        }
    }
    body
}

async fn flush(
    client: &reqwest::Client,
    endpoint: &Url,
    auth: &Auth,
    site_id: &str,
    pending: &mut Vec<BulkItem>,
) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    let body = bulk_body(site_id, &batch);

    let url = match endpoint.join("_bulk") {
        Ok(url) => url,
        Err(err) => {
            fail_batch(batch, format!("invalid bulk url: {err}"));
            return;
        }
    };
    let request = auth
        .apply(client.post(url))
        .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
        .body(body);

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            fail_batch(batch, format!("bulk request failed: {err}"));
            return;
        }
    };
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        fail_batch(
            batch,
            format!("cluster responded an error {}: {}", status.as_u16(), excerpt(&text)),
        );
        return;
    }

    let parsed: serde_json::Value = match response.json().await {
        Ok(parsed) => parsed,
        Err(err) => {
            fail_batch(batch, format!("cannot parse bulk response: {err}"));
            return;
        }
    };
    if !parsed.get("errors").and_then(serde_json::Value::as_bool).unwrap_or(false) {
        return;
    }
    let empty = Vec::new();
    let results = parsed
        .get("items")
        .and_then(serde_json::Value::as_array)
        .unwrap_or(&empty);
    for (item, result) in batch.into_iter().zip(results) {
        // each result is {"index": {...}} or {"delete": {...}}
        let error = result
            .as_object()
            .and_then(|entry| entry.values().next())
            .and_then(|op| op.get("error"));
        if let Some(error) = error {
            (item.on_failure)(error.to_string());
        }
    }
}

fn fail_batch(batch: Vec<BulkItem>, reason: String) {
    for item in batch {
        (item.on_failure)(reason.clone());
    }
}
