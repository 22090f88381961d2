//! Progress reporting
//!
//! The processor reports progress through a [`ProgressReporter`], which
//! turns raw byte counters into percentages and forwards them to a
//! [`ProgressSink`]. The reporter guarantees that emitted values never
//! decrease and that `100` is emitted exactly once, when the download is
//! finished. Multi-stream downloads (separate video and audio) restart the
//! fetcher's own counters, so values below the last emitted one are dropped.

use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use crate::core::models::DownloadProgress;

/// Receives progress percentages in `0.0..=100.0`
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: f64);
}

/// Sink that drops every update
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _percent: f64) {}
}

/// Sink forwarding updates into a tokio channel
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<f64>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, percent: f64) {
        // Receiver gone means nobody is listening any more.
        let _ = self.sender.send(percent);
    }
}

#[derive(Serialize)]
struct ProgressRecord {
    progress: f64,
}

/// Writes one JSON document per line, flushing after each record
pub struct JsonLinesWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn write_record<T: Serialize>(&self, record: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "{}", line)?;
        out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> ProgressSink for JsonLinesWriter<W> {
    fn on_progress(&self, percent: f64) {
        if let Err(e) = self.write_record(&ProgressRecord { progress: percent }) {
            warn!("Failed to write progress record: {}", e);
        }
    }
}

#[derive(Debug, Default)]
struct ReporterState {
    last: Option<f64>,
    finished: bool,
}

/// Monotonic progress reporter shared between the processor and the fetcher
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState::default()),
        }
    }

    /// Report byte counters; ignored while the total is unknown
    pub fn update(&self, progress: DownloadProgress) {
        if let Some(percent) = progress.percent() {
            self.update_percent(percent);
        }
    }

    /// Report a percentage. Values at or above 100 are held back for
    /// [`finish`](Self::finish), values below the last emitted one dropped.
    pub fn update_percent(&self, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let percent = (percent.max(0.0) * 100.0).round() / 100.0;
        if percent >= 100.0 {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finished || state.last.is_some_and(|last| percent <= last) {
            return;
        }
        state.last = Some(percent);
        drop(state);

        self.sink.on_progress(percent);
    }

    /// Emit the final 100; later calls are no-ops
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finished {
            return;
        }
        state.finished = true;
        state.last = Some(100.0);
        drop(state);

        self.sink.on_progress(100.0);
    }

    pub fn last_emitted(&self) -> Option<f64> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).last
    }
}

/// Sink collecting every update, for assertions
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    values: Mutex<Vec<f64>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn on_progress(&self, percent: f64) {
        self.values.lock().unwrap().push(percent);
    }
}
