//! Batched, size-capped local journal of rendered records.

use crate::error::{Result, ShipperError};
use crate::journal_file::{write_batch, JournalFile};
use crate::record::{Level, LogRecord, Payload};
use crate::schedule::Ticker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::error;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// On-disk layout of the journal file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalFormat {
    /// One JSON array, rewritten on every flush.
    #[default]
    Json,
    /// `payload` header, then one quoted JSON payload per row.
    Csv,
    /// One human-readable line per record.
    Txt,
}

impl JournalFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalFormat::Json => "json",
            JournalFormat::Csv => "csv",
            JournalFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for JournalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(JournalFormat::Json),
            "csv" => Ok(JournalFormat::Csv),
            "txt" | "text" => Ok(JournalFormat::Txt),
            _ => Err(format!("invalid journal format: '{}'", s)),
        }
    }
}

/// Resolved journal settings.
///
/// **Fields**
/// - `enabled`: whether the journal transport is on.
/// - `format`: [`JournalFormat`] of the target file.
/// - `path`: configured file path; rotated files are created next to it.
/// - `flush_interval`: period of the background flush tick.
/// - `batch_size`: records written per flush; reaching it in the queue
///   triggers an immediate flush.
/// - `max_file_bytes`: size cap that triggers rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalOptions {
    pub enabled: bool,
    pub format: JournalFormat,
    pub path: PathBuf,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub max_file_bytes: u64,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            format: JournalFormat::Json,
            path: PathBuf::from("logs/shipper.json"),
            flush_interval: Duration::from_secs(5),
            batch_size: 50,
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

impl JournalOptions {
    /// Merge the fields set in `patch`, then clamp to usable minimums.
    pub fn apply(&mut self, patch: &JournalOptionsPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(format) = patch.format {
            self.format = format;
        }
        if let Some(path) = &patch.path {
            self.path = path.clone();
        }
        if let Some(flush_interval) = patch.flush_interval {
            self.flush_interval = flush_interval;
        }
        if let Some(batch_size) = patch.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_file_bytes) = patch.max_file_bytes {
            self.max_file_bytes = max_file_bytes;
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.batch_size = self.batch_size.max(1);
        self.max_file_bytes = self.max_file_bytes.max(1);
        self.flush_interval = self.flush_interval.max(MIN_FLUSH_INTERVAL);
    }
}

/// Partial [`JournalOptions`]; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalOptionsPatch {
    pub enabled: Option<bool>,
    pub format: Option<JournalFormat>,
    pub path: Option<PathBuf>,
    pub flush_interval: Option<Duration>,
    pub batch_size: Option<usize>,
    pub max_file_bytes: Option<u64>,
}

/// One record waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalItem {
    pub level: Level,
    pub payload: Payload,
    pub record: LogRecord,
    pub timestamp: String,
}

/// Snapshot returned by [`JournalQueue::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalStatus {
    pub pending: usize,
    /// File the next flush writes to (changes on rotation).
    pub file_path: PathBuf,
}

struct State {
    pending: VecDeque<JournalItem>,
    options: JournalOptions,
    file: JournalFile,
    ticker: Ticker,
}

struct Inner {
    state: Mutex<State>,
    /// Held for the whole of a flush so writes never interleave.
    write_guard: tokio::sync::Mutex<()>,
    runtime: Handle,
}

/// FIFO queue of [`JournalItem`]s written to disk in batches.
///
/// The journal path is owned exclusively by one queue; there is no file
/// locking. Dropping the queue discards unflushed items.
pub struct JournalQueue {
    inner: Arc<Inner>,
}

impl JournalQueue {
    pub fn new(mut options: JournalOptions, runtime: Handle) -> Self {
        options.clamp();
        let file = JournalFile::new(options.path.clone(), 0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    options,
                    file,
                    ticker: Ticker::new(runtime.clone()),
                }),
                write_guard: tokio::sync::Mutex::new(()),
                runtime,
            }),
        }
    }

    /// Append an item; a full batch is flushed right away in the background.
    pub fn enqueue(&self, item: JournalItem) {
        let mut state = self.inner.state.lock();
        state.pending.push_back(item);
        if state.pending.len() >= state.options.batch_size {
            Inner::spawn_flush(&self.inner);
        }
        Inner::ensure_ticker(&self.inner, &mut state);
    }

    /// Write up to one batch from the head of the queue.
    ///
    /// Items taken for a batch that fails to write are lost.
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// Stop the flush tick and discard everything not yet written.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.pending.clear();
        state.ticker.stop();
    }

    pub fn status(&self) -> JournalStatus {
        let state = self.inner.state.lock();
        JournalStatus {
            pending: state.pending.len(),
            file_path: state.file.path.clone(),
        }
    }

    pub fn options(&self) -> JournalOptions {
        self.inner.state.lock().options.clone()
    }

    /// Merge new options. A new path starts a fresh file; the flush tick is
    /// restarted with the current interval if items are pending.
    pub fn update_options(&self, patch: &JournalOptionsPatch) {
        let mut state = self.inner.state.lock();
        let path_changed = patch
            .path
            .as_ref()
            .is_some_and(|path| *path != state.options.path);
        state.options.apply(patch);
        if path_changed {
            let epoch = state.file.epoch + 1;
            state.file = JournalFile::new(state.options.path.clone(), epoch);
        }
        state.ticker.stop();
        Inner::ensure_ticker(&self.inner, &mut state);
    }
}

impl Drop for JournalQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Inner {
    fn ensure_ticker(inner: &Arc<Inner>, state: &mut State) {
        if state.pending.is_empty() || state.ticker.is_running() {
            return;
        }
        let weak = Arc::downgrade(inner);
        state.ticker.start(state.options.flush_interval, move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            Inner::tick(&inner)
        });
    }

    fn tick(inner: &Arc<Inner>) -> ControlFlow<()> {
        {
            let mut state = inner.state.lock();
            if state.pending.is_empty() {
                state.ticker.detach();
                return ControlFlow::Break(());
            }
        }

        let worker = Arc::clone(inner);
        inner.runtime.spawn(async move {
            // a tick never waits behind a flush that is still writing
            let Ok(_guard) = worker.write_guard.try_lock() else {
                return;
            };
            if let Err(e) = worker.flush_batch().await {
                error!(error = %e, "periodic journal flush failed");
            }
        });
        ControlFlow::Continue(())
    }

    fn spawn_flush(inner: &Arc<Inner>) {
        let worker = Arc::clone(inner);
        inner.runtime.spawn(async move {
            if let Err(e) = worker.flush().await {
                error!(error = %e, "journal flush failed");
            }
        });
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        self.flush_batch().await
    }

    /// Caller must hold `write_guard`.
    async fn flush_batch(&self) -> Result<()> {
        let (batch, options, mut file) = {
            let mut state = self.state.lock();
            let take = state.options.batch_size.min(state.pending.len());
            if take == 0 {
                return Ok(());
            }
            let batch: Vec<JournalItem> = state.pending.drain(..take).collect();
            (batch, state.options.clone(), state.file.clone())
        };

        let result = write_batch(&mut file, &options, &batch).await;

        // keep header/rotation state unless the path was switched meanwhile
        let mut state = self.state.lock();
        if state.file.epoch == file.epoch {
            state.file = file;
        }
        result
    }
}

/// Read a JSON journal back as a list of payloads; missing or empty files
/// read as an empty journal.
pub async fn read_json_journal(path: impl Into<PathBuf>) -> Result<Vec<Payload>> {
    let path = path.into();
    let items = crate::journal_file::read_json_array(&path).await?;
    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(payload) => Ok(payload),
            _ => Err(ShipperError::CorruptJournal { path: path.clone() }),
        })
        .collect()
}
