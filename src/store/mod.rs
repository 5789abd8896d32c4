//! Persistent SQLite store, time-partitioned.
//!
//! # Data Flow
//! ```text
//! provider methods (async)
//!     → bounded command channel (never blocks on disk I/O)
//!     → writer thread (writer.rs): one short transaction per command
//!     → partition tables (partitions.rs / schema.rs)
//!
//! readers (reader.rs) open their own read-only connections;
//! WAL mode keeps reads concurrent with the single writer
//! ```
//!
//! # Design Decisions
//! - Partitions are physical tables per time window: daily for the
//!   high-volume traces/spans/llm_calls tables, weekly for
//!   chat_messages/document_events; expiry drops whole tables
//! - Every command runs in its own unit of work, independent of whatever
//!   transaction the instrumented business operation holds
//! - A full queue drops the write and counts it; observability loss is
//!   always preferred over caller latency

pub mod partitions;
pub mod provider;
pub mod reader;
pub mod schema;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::provider::{ProviderError, ProviderResult};
pub use provider::SqliteProvider;
pub use reader::TraceReader;
pub use writer::{StoreCommand, SyncStatusSink};

/// Handle owning the writer thread and its command queue.
///
/// Construct once per process; hand out cheap [`SqliteProvider`] and
/// [`SyncStatusSink`] clones, and open [`TraceReader`]s as needed.
pub struct SqliteStore {
    path: PathBuf,
    tx: SyncSender<StoreCommand>,
    writer: Option<JoinHandle<()>>,
}

impl SqliteStore {
    /// Open the store, apply the base schema, and start the writer thread.
    pub fn open(path: impl AsRef<Path>, queue_depth: usize) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Validate the path and apply pragmas/base schema up front so a bad
        // path fails construction instead of silently failing every write.
        let conn = schema::open_connection(&path)?;
        drop(conn);

        let (tx, rx) = mpsc::sync_channel(queue_depth);
        let writer_path = path.clone();
        let writer = thread::spawn(move || writer::run_writer(writer_path, rx));

        tracing::info!(path = %path.display(), queue_depth, "sqlite store opened");

        Ok(Self {
            path,
            tx,
            writer: Some(writer),
        })
    }

    /// Provider facade over this store's write queue.
    pub fn provider(&self) -> SqliteProvider {
        SqliteProvider::new(self.sender())
    }

    /// Sink external providers use to record per-trace sync bookkeeping.
    pub fn sync_sink(&self) -> SyncStatusSink {
        SyncStatusSink::new(self.sender())
    }

    /// Open a fresh read-only reader.
    pub fn reader(&self) -> ProviderResult<TraceReader> {
        TraceReader::open(&self.path)
    }

    /// Database path this store was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability barrier: resolves once every previously enqueued command
    /// has been applied. Used at shutdown and by tests.
    pub async fn flush(&self) -> ProviderResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let tx = self.sender();
        let enqueue = tokio::task::spawn_blocking(move || tx.send(StoreCommand::Flush(ack_tx)));
        match enqueue.await {
            Ok(Ok(())) => {}
            _ => return Err(ProviderError::WriterClosed),
        }
        match tokio::time::timeout(Duration::from_secs(10), ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ProviderError::WriterClosed),
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    /// Stop accepting writes and wait for the writer to drain.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn sender(&self) -> SyncSender<StoreCommand> {
        self.tx.clone()
    }

    fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            // blocks until the shutdown marker fits in the queue, so every
            // command enqueued before it is applied first
            let _ = self.tx.send(StoreCommand::Shutdown);
            if writer.join().is_err() {
                tracing::error!("store writer thread panicked");
            }
        }
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
