//! Event store — durable, append-only, per-task event log.
//!
//! This is the hard part of the A2A server core: a log that preserves
//! ordering, survives process restarts, closes cleanly, and can be
//! replayed to subscribers that join after a task has already partially
//! emitted. See [`crate::server::event_subscriber`] for the pub/sub layer
//! built on top of it.
//!
//! Two backends are provided:
//! - [`InMemoryEventStore`] — per-task vector, lost on restart.
//! - [`FileEventStore`] — append-only `.log` file per task plus a
//!   `.closed` sentinel, replayed on construction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};

/// A single persisted event record.
///
/// `seq` is dense and 0-based per task. `kind` and `payload` are the
/// already-serialized discriminator and body of a [`crate::types::StreamResponse`]
/// variant — the store itself is agnostic to the wire schema, it just
/// orders and persists opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub seq: u64,
    pub kind: String,
    pub payload: Value,
    pub timestamp_ms: i64,
}

/// Append-only per-task event log.
///
/// Implementations must serialize concurrent appends to the same task
/// internally; callers may call `append` concurrently across different
/// tasks freely.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, assigning it the next dense sequence number.
    ///
    /// Fails with [`A2AError::UnsupportedOperation`] if the log for this
    /// task is already closed.
    async fn append(&self, task_id: &str, kind: &str, payload: Value) -> A2AResult<u64>;

    /// Read the entire log as it exists at call time, ordered by `seq`.
    async fn read_all(&self, task_id: &str) -> A2AResult<Vec<EventLogRecord>>;

    /// Tail the log starting at `from_seq`: yields buffered records
    /// immediately, then blocks for future appends until the log closes.
    async fn tail_from(&self, task_id: &str, from_seq: u64) -> A2AResult<EventTail>;

    /// Mark the log terminal. Idempotent. All open tailers drain
    /// outstanding records, then complete.
    async fn close(&self, task_id: &str) -> A2AResult<()>;

    /// Whether the task's log has been closed.
    async fn is_closed(&self, task_id: &str) -> A2AResult<bool>;
}

// ---------------------------------------------------------------------------
// Shared in-memory log primitive, used directly by InMemoryEventStore and
// as the live-tailing half of FileEventStore.
// ---------------------------------------------------------------------------

struct MemoryLog {
    records: Mutex<Vec<EventLogRecord>>,
    closed: AtomicBool,
    notify: Notify,
}

impl MemoryLog {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    async fn append(&self, kind: &str, payload: Value, timestamp_ms: i64) -> A2AResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(A2AError::unsupported_operation("cannot append to a closed event log"));
        }
        let mut records = self.records.lock().await;
        let seq = records.len() as u64;
        records.push(EventLogRecord {
            seq,
            kind: kind.to_string(),
            payload,
            timestamp_ms,
        });
        drop(records);
        self.notify.notify_waiters();
        Ok(seq)
    }

    async fn read_all(&self) -> Vec<EventLogRecord> {
        self.records.lock().await.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A cancellable, notify-driven stream over a task's event log.
///
/// Yields buffered records first, then awaits the log's notifier for more.
/// Terminates once the log is closed and fully drained. Dropping the
/// stream (or the task polling it) is the cancellation mechanism — no
/// separate token is needed since the producer never blocks on consumers.
pub struct EventTail {
    log: Arc<MemoryLog>,
    next_seq: u64,
}

impl Stream for EventTail {
    type Item = EventLogRecord;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Register for notification *before* re-checking the buffer/closed
            // state. Checking first and registering after would leave a window
            // where a producer's `notify_waiters()` lands between the check and
            // the registration and is lost forever; registering first means any
            // notify racing with this poll still wakes us.
            let notified = this.log.notify.notified();
            futures::pin_mut!(notified);
            let notified_poll = notified.as_mut().poll(cx);

            if let Ok(records) = this.log.records.try_lock() {
                if let Some(record) = records.iter().find(|r| r.seq == this.next_seq) {
                    let record = record.clone();
                    drop(records);
                    this.next_seq = record.seq + 1;
                    return Poll::Ready(Some(record));
                }
                let closed = this.log.is_closed();
                drop(records);
                if closed {
                    return Poll::Ready(None);
                }
            }

            match notified_poll {
                Poll::Ready(()) => continue,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryEventStore
// ---------------------------------------------------------------------------

/// In-memory event store. Per-task logs are lost on process restart.
#[derive(Default)]
pub struct InMemoryEventStore {
    logs: RwLock<HashMap<String, Arc<MemoryLog>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_for(&self, task_id: &str) -> Arc<MemoryLog> {
        if let Some(log) = self.logs.read().await.get(task_id) {
            return log.clone();
        }
        let mut logs = self.logs.write().await;
        logs.entry(task_id.to_string())
            .or_insert_with(|| Arc::new(MemoryLog::new()))
            .clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, task_id: &str, kind: &str, payload: Value) -> A2AResult<u64> {
        let log = self.log_for(task_id).await;
        let seq = log
            .append(kind, payload, crate::utils::task::now_millis())
            .await?;
        debug!(task_id, seq, kind, "event appended");
        Ok(seq)
    }

    async fn read_all(&self, task_id: &str) -> A2AResult<Vec<EventLogRecord>> {
        Ok(self.log_for(task_id).await.read_all().await)
    }

    async fn tail_from(&self, task_id: &str, from_seq: u64) -> A2AResult<EventTail> {
        Ok(EventTail {
            log: self.log_for(task_id).await,
            next_seq: from_seq,
        })
    }

    async fn close(&self, task_id: &str) -> A2AResult<()> {
        self.log_for(task_id).await.close();
        debug!(task_id, "event log closed");
        Ok(())
    }

    async fn is_closed(&self, task_id: &str) -> A2AResult<bool> {
        Ok(self.log_for(task_id).await.is_closed())
    }
}

// ---------------------------------------------------------------------------
// FileEventStore
// ---------------------------------------------------------------------------

/// File-backed event store.
///
/// Each task's log lives at `<dir>/<TaskId>.log`, one JSON record per
/// line, fsynced after every append. A zero-byte `<TaskId>.closed`
/// sentinel marks a closed log; it is created only after the closing
/// record's fsync has returned, so recovery never mistakes a log as
/// closed before its last record is durable.
pub struct FileEventStore {
    dir: PathBuf,
    logs: RwLock<HashMap<String, Arc<MemoryLog>>>,
}

impl FileEventStore {
    /// Open (or create) a file-backed event store rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> A2AResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to create event dir: {e}")))?;

        let store = Self {
            dir,
            logs: RwLock::new(HashMap::new()),
        };
        store.load_from_disk().await?;
        Ok(store)
    }

    fn log_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.log"))
    }

    fn closed_sentinel_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.closed"))
    }

    async fn load_from_disk(&self) -> A2AResult<()> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) => {
                return Err(A2AError::internal_error(format!(
                    "failed to read event dir: {e}"
                )))
            }
        };

        let mut logs = self.logs.write().await;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to scan event dir: {e}")))?
        {
            let path = entry.path();
            let Some(file_name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let is_log = path.extension().and_then(|e| e.to_str()) == Some("log");
            if !is_log {
                continue;
            }

            let contents = fs::read_to_string(&path)
                .await
                .map_err(|e| A2AError::internal_error(format!("failed to read event log: {e}")))?;

            let mut records = Vec::new();
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EventLogRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(task_id = file_name, error = %e, "skipping corrupt event record"),
                }
            }

            let log = Arc::new(MemoryLog::new());
            *log.records.lock().await = records;
            if self.closed_sentinel_path(file_name).exists() {
                log.closed.store(true, Ordering::Release);
            }
            logs.insert(file_name.to_string(), log);
        }

        Ok(())
    }

    async fn log_for(&self, task_id: &str) -> Arc<MemoryLog> {
        if let Some(log) = self.logs.read().await.get(task_id) {
            return log.clone();
        }
        let mut logs = self.logs.write().await;
        logs.entry(task_id.to_string())
            .or_insert_with(|| Arc::new(MemoryLog::new()))
            .clone()
    }

    async fn append_to_file(&self, task_id: &str, record: &EventLogRecord) -> A2AResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| A2AError::internal_error(format!("failed to serialize event record: {e}")))?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(task_id))
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to open event log: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to write event log: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to write event log: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to fsync event log: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, task_id: &str, kind: &str, payload: Value) -> A2AResult<u64> {
        let log = self.log_for(task_id).await;
        if log.is_closed() {
            return Err(A2AError::unsupported_operation("cannot append to a closed event log"));
        }

        let timestamp_ms = crate::utils::task::now_millis();
        let seq = {
            let mut records = log.records.lock().await;
            let seq = records.len() as u64;
            let record = EventLogRecord {
                seq,
                kind: kind.to_string(),
                payload,
                timestamp_ms,
            };
            self.append_to_file(task_id, &record).await?;
            records.push(record);
            seq
        };
        log.notify.notify_waiters();
        debug!(task_id, seq, kind, "event appended (file-backed)");
        Ok(seq)
    }

    async fn read_all(&self, task_id: &str) -> A2AResult<Vec<EventLogRecord>> {
        Ok(self.log_for(task_id).await.read_all().await)
    }

    async fn tail_from(&self, task_id: &str, from_seq: u64) -> A2AResult<EventTail> {
        Ok(EventTail {
            log: self.log_for(task_id).await,
            next_seq: from_seq,
        })
    }

    async fn close(&self, task_id: &str) -> A2AResult<()> {
        let log = self.log_for(task_id).await;
        if log.is_closed() {
            return Ok(());
        }
        log.close();

        // Sentinel is created only after the log is flagged closed in
        // memory and every prior append's fsync has already returned —
        // recovery never observes `.closed` before the last record.
        fs::File::create(self.closed_sentinel_path(task_id))
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to create closed sentinel: {e}")))?
            .sync_all()
            .await
            .map_err(|e| A2AError::internal_error(format!("failed to fsync closed sentinel: {e}")))?;

        debug!(task_id, "event log closed (file-backed)");
        Ok(())
    }

    async fn is_closed(&self, task_id: &str) -> A2AResult<bool> {
        Ok(self.log_for(task_id).await.is_closed())
    }
}
