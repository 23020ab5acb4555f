//! Write buffering and crash recovery in front of a local back end
//!
//! A buffered engine decouples the caller's ingest rate from the back end's
//! commit latency. Accepted documents queue in memory; a single indexer
//! worker drains the queue into batches on a size or time trigger. On
//! shutdown any undrained entries are persisted to an ahead log which the
//! next startup replays.

mod wal;

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::backend::{IndexBatch, SearchBackend};
use crate::document::DocumentComment;
use crate::errors::{SearchError, SearchResult};
use crate::types::{CancelToken, Request, ResultPage};

pub(crate) use wal::WAL_FILE_NAME;

const FLUSH_EVERY: Duration = Duration::from_secs(2);
const FLUSH_COUNT: usize = 100;

/// One queued mutation: a document upsert or a flush barrier.
enum QueueEntry {
    Document(Box<DocumentComment>),
    /// Resolves once every document queued before it is committed
    Flusher(oneshot::Sender<SearchResult<()>>),
}

enum Signal {
    /// A document was enqueued; drain only if the queue is full
    Hint,
    /// Drain now
    Force,
    Shutdown,
}

struct Shared<B> {
    queue: RwLock<VecDeque<QueueEntry>>,
    index: B,
    flush_count: usize,
    index_path: PathBuf,
}

/// A per-site shard: one back end, one queue, one indexer worker.
pub struct BufferedEngine<B: SearchBackend> {
    shared: Arc<Shared<B>>,
    notifier: mpsc::UnboundedSender<Signal>,
    worker: Mutex<Option<JoinHandle<()>>>,
    inited: AtomicBool,
}

impl<B: SearchBackend> BufferedEngine<B> {
    /// Wrap a back end and start its indexer worker. `index_path` is the
    /// shard's on-disk directory, also home to the ahead log.
    pub fn start(index: B, index_path: PathBuf) -> Self {
        Self::start_with_policy(index, index_path, FLUSH_EVERY, FLUSH_COUNT)
    }

    pub(crate) fn start_with_policy(
        index: B,
        index_path: PathBuf,
        flush_every: Duration,
        flush_count: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: RwLock::new(VecDeque::new()),
            index,
            flush_count,
            index_path,
        });
        let (notifier, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(Arc::clone(&shared), receiver, flush_every));
        BufferedEngine {
            shared,
            notifier,
            worker: Mutex::new(Some(worker)),
            inited: AtomicBool::new(false),
        }
    }

    /// Accept a document for indexing. Never blocks on the back end; fails
    /// only once the engine is closing.
    pub fn index_document(&self, doc: DocumentComment) -> SearchResult<()> {
        self.shared
            .queue
            .write()
            .push_back(QueueEntry::Document(Box::new(doc)));
        self.notifier
            .send(Signal::Hint)
            .map_err(|_| SearchError::IndexerClosing)
    }

    /// Barrier: returns once every document accepted before this call is
    /// committed to the back end.
    pub async fn flush(&self) -> SearchResult<()> {
        let (sender, receiver) = oneshot::channel();
        self.shared
            .queue
            .write()
            .push_back(QueueEntry::Flusher(sender));
        self.notifier
            .send(Signal::Force)
            .map_err(|_| SearchError::IndexerClosing)?;
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(SearchError::IndexerClosing),
        }
    }

    pub async fn search(&self, req: Request) -> SearchResult<ResultPage> {
        tracing::info!(site = %req.site_id, query = %req.query, "searching");
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.index.search(&req))
            .await
            .map_err(SearchError::other)?
    }

    pub async fn delete(&self, comment_id: &str) -> SearchResult<()> {
        let shared = Arc::clone(&self.shared);
        let id = comment_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            shared.index.delete(&id).map_err(|err| (id, err))
        })
        .await
        .map_err(SearchError::other)?;
        result.map_err(|(id, err)| {
            SearchError::Other(format!("cannot delete comment {id:?} from search index: {err}"))
        })
    }

    /// Replay the ahead log left by a previous shutdown, if any.
    ///
    /// Returns `Ok(false)` on a cold start (no log), `Ok(true)` when a log
    /// was found and fully re-queued; the file is removed only after a
    /// clean read. A decode or read failure keeps the file in place for
    /// manual recovery.
    pub async fn init(&self, cancel: &CancelToken) -> SearchResult<bool> {
        let path = self.shared.index_path.join(WAL_FILE_NAME);
        let file = match File::open(&path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no ahead log, cold start");
                self.inited.store(true, Ordering::Release);
                return Ok(false);
            }
            other => other?,
        };

        let mut reader = BufReader::new(file);
        wal::replay(&mut reader, cancel, |doc| self.index_document(doc))?;

        if let Err(err) = std::fs::remove_file(&path) {
            tracing::error!(error = %err, path = %path.display(), "cannot remove ahead log");
        }
        self.inited.store(true, Ordering::Release);
        Ok(true)
    }

    pub fn ready(&self) -> bool {
        self.inited.load(Ordering::Acquire)
    }

    /// Stop the worker, close the back end and wait until the worker has
    /// drained the remaining queue into the ahead log.
    pub async fn close(&self) -> SearchResult<()> {
        let _ = self.notifier.send(Signal::Shutdown);
        let result = self.shared.index.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "indexer worker task failed");
            }
        }
        result
    }
}

async fn worker_loop<B: SearchBackend>(
    shared: Arc<Shared<B>>,
    mut notifier: mpsc::UnboundedReceiver<Signal>,
    flush_every: Duration,
) {
    tracing::info!("starting search indexer worker");
    let mut ticker = interval_at(Instant::now() + flush_every, flush_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => index_batch(&shared).await,
            signal = notifier.recv() => match signal {
                None | Some(Signal::Shutdown) => break,
                Some(Signal::Force) => index_batch(&shared).await,
                Some(Signal::Hint) => {
                    if shared.queue.read().len() >= shared.flush_count {
                        index_batch(&shared).await;
                    }
                }
            },
        }
    }
    tracing::info!("shutting down search indexer worker");

    write_ahead_log(&shared);
}

/// Drain the queue into a fresh batch and commit it.
///
/// The queue lock is released before the commit so callers keep enqueueing
/// while the batch is in flight. Flush barriers drained with the batch
/// resolve after the commit; a failed commit is logged and the drained
/// documents are lost (ingest is best-effort between barriers).
async fn index_batch<B: SearchBackend>(shared: &Arc<Shared<B>>) {
    let (batch, flushers) = {
        let mut queue = shared.queue.write();
        if queue.is_empty() {
            return;
        }
        let mut batch = shared.index.new_batch();
        let mut flushers = Vec::new();
        while let Some(entry) = queue.pop_front() {
            match entry {
                QueueEntry::Document(doc) => {
                    if let Err(err) = batch.index(&doc.id, &doc) {
                        tracing::error!(id = %doc.id, error = %err, "cannot add document to batch");
                    }
                }
                QueueEntry::Flusher(sender) => flushers.push(sender),
            }
        }
        (batch, flushers)
    };

    let committer = Arc::clone(shared);
    match tokio::task::spawn_blocking(move || committer.index.commit(batch)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "cannot commit index batch"),
        Err(err) => tracing::error!(error = %err, "index batch task failed"),
    }

    for flusher in flushers {
        let _ = flusher.send(Ok(()));
    }
}

/// Persist whatever is still queued after the worker stopped.
///
/// A write error stops further document writes, but the loop keeps running
/// so remaining flush barriers still resolve with a closing error.
fn write_ahead_log<B: SearchBackend>(shared: &Shared<B>) {
    let path = shared.index_path.join(WAL_FILE_NAME);
    if path.exists() {
        tracing::warn!(path = %path.display(), "ahead log already exists and will be rewritten");
    }
    let mut file = match File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(error = %err, path = %path.display(), "cannot create ahead log");
            return;
        }
    };

    let mut write_err = None;
    let mut queue = shared.queue.write();
    while let Some(entry) = queue.pop_front() {
        match entry {
            QueueEntry::Document(doc) => {
                if write_err.is_some() {
                    continue;
                }
                if let Err(err) = wal::append_record(&mut file, &doc) {
                    write_err = Some(err);
                }
            }
            QueueEntry::Flusher(sender) => {
                let _ = sender.send(Err(SearchError::IndexerClosing));
            }
        }
    }
    if let Some(err) = write_err {
        tracing::error!(error = %err, path = %path.display(), "error writing ahead log");
    }
}
