//! Per-sample trace capture for Gibbs runs.
//!
//! Sinks receive one [`SampleTrace`] per retained sample, in sample order.
//! The JSON-lines sink serializes on the sampler's thread, so a row that
//! cannot be encoded fails the run at once, and hands finished lines to a
//! writer thread over a bounded channel.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;

/// Lines buffered between the sampler and the writer thread before
/// `record` blocks.
const DEFAULT_BACKLOG: usize = 1024;

/// Snapshot of the chain at one retained sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTrace {
    /// Position among retained samples, starting at 0.
    pub sample_index: usize,
    /// Sweeps run so far, burn-in included.
    pub sweep: usize,
    /// Occupied DP clusters; equals the number of domains when uncoupled.
    pub number_of_clusters: usize,
    pub mean_label_prior: f64,
    pub mean_error_rate: f64,
    /// Complete-data log-likelihood of the current labels and outputs.
    pub log_likelihood: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode trace row: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace writer is gone")]
    Closed,
    #[error("trace writer panicked: {0}")]
    Join(String),
}

pub trait SampleTraceSink: Send + Sync {
    fn record(&self, event: SampleTrace) -> Result<(), TraceError>;
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<SampleTrace>>,
}

impl MemoryTraceSink {
    pub fn events(&self) -> Vec<SampleTrace> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SampleTraceSink for MemoryTraceSink {
    fn record(&self, event: SampleTrace) -> Result<(), TraceError> {
        let mut events = self.events.lock().map_err(|_| TraceError::Closed)?;
        events.push(event);
        Ok(())
    }
}

/// Streams serializable rows to a JSON-lines file from a background thread.
///
/// Clones share the same file. The file is complete once every clone has
/// been dropped and [`TraceWorker::join`] has returned.
pub struct JsonlWriter<T> {
    lines: mpsc::SyncSender<String>,
    rows: PhantomData<fn(T)>,
}

/// Sampler trace written as JSON lines.
pub type JsonlTraceSink = JsonlWriter<SampleTrace>;

impl<T> Clone for JsonlWriter<T> {
    fn clone(&self) -> Self {
        Self {
            lines: self.lines.clone(),
            rows: PhantomData,
        }
    }
}

/// Handle on the writer thread of a [`JsonlWriter`].
pub struct TraceWorker {
    handle: JoinHandle<Result<usize, TraceError>>,
}

impl TraceWorker {
    /// Wait until every queued line is on disk and return how many were
    /// written. Blocks while any writer clone is still alive.
    pub fn join(self) -> Result<usize, TraceError> {
        self.handle
            .join()
            .map_err(|panic| TraceError::Join(panic_message(panic.as_ref())))?
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        Self::with_backlog(path, DEFAULT_BACKLOG)
    }

    /// Like [`JsonlWriter::new`], with at most `backlog` lines queued ahead
    /// of the writer thread.
    pub fn with_backlog(
        path: impl AsRef<Path>,
        backlog: usize,
    ) -> Result<(Self, TraceWorker), TraceError> {
        let file = File::create(path)?;
        let (lines, queue) = mpsc::sync_channel(backlog.max(1));
        let handle = std::thread::spawn(move || drain_lines(file, queue));
        let writer = Self {
            lines,
            rows: PhantomData,
        };
        Ok((writer, TraceWorker { handle }))
    }

    pub fn write(&self, row: &T) -> Result<(), TraceError> {
        let line = serde_json::to_string(row)?;
        self.lines.send(line).map_err(|_| TraceError::Closed)
    }
}

impl SampleTraceSink for JsonlWriter<SampleTrace> {
    fn record(&self, event: SampleTrace) -> Result<(), TraceError> {
        self.write(&event)
    }
}

fn drain_lines(file: File, queue: mpsc::Receiver<String>) -> Result<usize, TraceError> {
    let mut out = BufWriter::new(file);
    let mut written = 0;
    for line in queue {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}
