//! Batched JSON-Lines event journal.

use axon_types::{Event, EventKind, JournalError, ThreadId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Buffering configuration for the journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Buffered line count that forces a flush.
    pub batch_size: usize,
    /// Flush interval for partially-filled buffers.
    pub flush_interval_ms: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 5_000,
        }
    }
}

impl From<&axon_types::EngineConfig> for JournalConfig {
    fn from(config: &axon_types::EngineConfig) -> Self {
        Self {
            batch_size: config.journal_batch_size,
            flush_interval_ms: config.journal_flush_interval_ms,
        }
    }
}

enum WriterMsg {
    Line(String),
    Flush(oneshot::Sender<Result<(), String>>),
}

struct WriterHandle {
    tx: mpsc::UnboundedSender<WriterMsg>,
    failure: Arc<StdMutex<Option<String>>>,
}

/// Append-only event journal: one `<thread_id>.jsonl` file per thread.
///
/// [`append`](Journal::append) hands the serialized event to a per-thread
/// background writer and returns immediately. The writer flushes when its
/// buffer reaches `batch_size` or `flush_interval_ms` elapses, whichever
/// comes first, and once more when the journal shuts down. A write that
/// still fails after in-task retries poisons the thread's writer; the next
/// append or flush for that thread reports [`JournalError::WriteFailed`].
pub struct Journal {
    root: PathBuf,
    config: JournalConfig,
    writers: Mutex<HashMap<ThreadId, WriterHandle>>,
}

impl Journal {
    /// Create a journal rooted at the given directory. The directory is
    /// created lazily on first write.
    pub fn new(root: impl Into<PathBuf>, config: JournalConfig) -> Self {
        Self {
            root: root.into(),
            config,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// The on-disk log file for a thread.
    pub fn path_for(&self, thread_id: &ThreadId) -> PathBuf {
        self.root
            .join(format!("{}.jsonl", sanitize(thread_id.as_str())))
    }

    /// Queue an event for its thread's log. Non-blocking and durable up
    /// to the batch interval.
    pub async fn append(&self, event: &Event) -> Result<(), JournalError> {
        let line = serde_json::to_string(event)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;

        let mut writers = self.writers.lock().await;
        let handle = match writers.entry(event.thread_id.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let handle = self.spawn_writer(&event.thread_id);
                entry.insert(handle)
            }
        };

        if let Some(message) = handle.failure.lock().unwrap().clone() {
            return Err(JournalError::WriteFailed(message));
        }
        handle
            .tx
            .send(WriterMsg::Line(line))
            .map_err(|_| JournalError::WriteFailed("journal writer stopped".into()))?;
        Ok(())
    }

    /// Await a durable flush of a thread's buffered events.
    pub async fn flush(&self, thread_id: &ThreadId) -> Result<(), JournalError> {
        let writers = self.writers.lock().await;
        let Some(handle) = writers.get(thread_id) else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        handle
            .tx
            .send(WriterMsg::Flush(ack_tx))
            .map_err(|_| JournalError::WriteFailed("journal writer stopped".into()))?;
        drop(writers);
        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(JournalError::WriteFailed(message)),
            Err(_) => Err(JournalError::WriteFailed("journal writer stopped".into())),
        }
    }

    /// Final-flush every writer and stop the background tasks.
    pub async fn shutdown(&self) -> Result<(), JournalError> {
        let mut writers = self.writers.lock().await;
        let mut first_failure = None;
        for (_, handle) in writers.iter() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if handle.tx.send(WriterMsg::Flush(ack_tx)).is_ok() {
                if let Ok(Err(message)) = ack_rx.await {
                    first_failure.get_or_insert(message);
                }
            }
        }
        // Dropping the senders ends each writer task after its own final flush.
        writers.clear();
        match first_failure {
            Some(message) => Err(JournalError::WriteFailed(message)),
            None => Ok(()),
        }
    }

    /// Read back all events for a thread in append order, optionally
    /// filtered by kind. Unknown event kinds and fields are tolerated;
    /// a torn trailing line (crash mid-write) is skipped with a warning.
    pub async fn replay(
        &self,
        thread_id: &ThreadId,
        kinds: Option<&[EventKind]>,
    ) -> Result<Vec<Event>, JournalError> {
        let path = self.path_for(thread_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(JournalError::ReplayFailed(e.to_string())),
        };

        let mut events = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    if kinds.is_none_or(|ks| ks.contains(&event.kind)) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "skipping unparseable journal line");
                }
            }
        }
        Ok(events)
    }

    fn spawn_writer(&self, thread_id: &ThreadId) -> WriterHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let failure = Arc::new(StdMutex::new(None));
        let path = self.path_for(thread_id);
        tokio::spawn(writer_task(
            path,
            self.config.batch_size.max(1),
            self.config.flush_interval_ms.max(1),
            rx,
            Arc::clone(&failure),
        ));
        WriterHandle { tx, failure }
    }
}

async fn writer_task(
    path: PathBuf,
    batch_size: usize,
    flush_interval_ms: u64,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
    failure: Arc<StdMutex<Option<String>>>,
) {
    let mut buffer: Vec<String> = Vec::new();
    let mut file: Option<File> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(flush_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WriterMsg::Line(line)) => {
                    buffer.push(line);
                    if buffer.len() >= batch_size {
                        let _ = flush_buffer(&path, &mut file, &mut buffer, &failure).await;
                    }
                }
                Some(WriterMsg::Flush(ack)) => {
                    let result = flush_buffer(&path, &mut file, &mut buffer, &failure).await;
                    let _ = ack.send(result);
                }
                None => {
                    // Journal dropped: final flush.
                    let _ = flush_buffer(&path, &mut file, &mut buffer, &failure).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    let _ = flush_buffer(&path, &mut file, &mut buffer, &failure).await;
                }
            }
        }
    }
}

/// Write the buffered lines, retrying with exponential backoff before
/// poisoning the writer.
async fn flush_buffer(
    path: &Path,
    file: &mut Option<File>,
    buffer: &mut Vec<String>,
    failure: &Arc<StdMutex<Option<String>>>,
) -> Result<(), String> {
    if buffer.is_empty() {
        return Ok(());
    }
    let mut payload = buffer.join("\n");
    payload.push('\n');

    let mut delay = Duration::from_millis(100);
    let mut last_error = String::new();
    for attempt in 0..3 {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        match write_payload(path, file, &payload).await {
            Ok(()) => {
                buffer.clear();
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(path = %path.display(), attempt, error = %last_error, "journal flush failed");
                // Reopen on the next attempt in case the handle went stale.
                file.take();
            }
        }
    }

    *failure.lock().unwrap() = Some(last_error.clone());
    Err(last_error)
}

async fn write_payload(
    path: &Path,
    file: &mut Option<File>,
    payload: &str,
) -> std::io::Result<()> {
    if file.is_none() {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let opened = OpenOptions::new().create(true).append(true).open(path).await?;
        *file = Some(opened);
    }
    // The handle was just installed if it was missing.
    if let Some(f) = file.as_mut() {
        f.write_all(payload.as_bytes()).await?;
        f.flush().await?;
    }
    Ok(())
}

/// Encode a thread id into a safe file stem.
fn sanitize(id: &str) -> String {
    let mut encoded = String::new();
    for ch in id.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}
