// src/progress.rs

//! Extraction progress
//!
//! The migration announces the entry count, then reports each archive entry
//! as it starts and as it lands on the medium. Implementations:
//! - [`CliProgress`]: a terminal progress bar using indicatif
//! - [`LogProgress`]: tracing lines at every tenth of the archive
//! - [`CallbackProgress`]: forwards [`ProgressEvent`]s to a closure
//! - [`SilentProgress`]: counts without output

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Receives per-entry updates from a running extraction
pub trait ProgressTracker {
    /// Extraction of `entries` archive entries is starting
    fn begin(&self, entries: u64);

    /// Entry `name` is about to be written
    fn entry_started(&self, name: &str);

    /// The current entry was written; `bytes` is zero for directories
    fn entry_done(&self, bytes: u64);

    /// Entries written so far
    fn completed(&self) -> u64;

    /// Every entry was written
    fn finish(&self, summary: &str);

    /// Extraction stopped at a failed entry
    fn fail(&self, reason: &str);

    fn is_finished(&self) -> bool;
}

/// Entry and byte counters shared by the trackers below
#[derive(Debug, Default)]
struct Tally {
    total: AtomicU64,
    entries: AtomicU64,
    bytes: AtomicU64,
    finished: AtomicBool,
}

impl Tally {
    /// Record one finished entry and return the new entry count
    fn record(&self, bytes: u64) -> u64 {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.entries.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn closed(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Counts entries and bytes without output
#[derive(Debug, Default)]
pub struct SilentProgress {
    tally: Tally,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry count announced by [`ProgressTracker::begin`]
    pub fn total(&self) -> u64 {
        self.tally.total()
    }

    /// File bytes written so far
    pub fn bytes(&self) -> u64 {
        self.tally.bytes()
    }
}

impl ProgressTracker for SilentProgress {
    fn begin(&self, entries: u64) {
        self.tally.total.store(entries, Ordering::Relaxed);
    }

    fn entry_started(&self, _name: &str) {}

    fn entry_done(&self, bytes: u64) {
        self.tally.record(bytes);
    }

    fn completed(&self) -> u64 {
        self.tally.entries()
    }

    fn finish(&self, _summary: &str) {
        self.tally.close();
    }

    fn fail(&self, _reason: &str) {
        self.tally.close();
    }

    fn is_finished(&self) -> bool {
        self.tally.closed()
    }
}

/// Logs a line each time another tenth of the archive is written
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    tally: Tally,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tally: Tally::default(),
        }
    }

    fn step(&self) -> u64 {
        (self.tally.total() / 10).max(1)
    }
}

impl ProgressTracker for LogProgress {
    fn begin(&self, entries: u64) {
        self.tally.total.store(entries, Ordering::Relaxed);
        info!("{}: {} entries", self.label, entries);
    }

    fn entry_started(&self, name: &str) {
        debug!("{}: {}", self.label, name);
    }

    fn entry_done(&self, bytes: u64) {
        let done = self.tally.record(bytes);
        let total = self.tally.total();
        let step = self.step();
        if total > 0 && (done % step == 0 || done == total) {
            info!(
                "{}: {}/{} entries, {} bytes",
                self.label,
                done,
                total,
                self.tally.bytes()
            );
        }
    }

    fn completed(&self) -> u64 {
        self.tally.entries()
    }

    fn finish(&self, summary: &str) {
        self.tally.close();
        info!("{}: {}", self.label, summary);
    }

    fn fail(&self, reason: &str) {
        self.tally.close();
        warn!("{}: stopped after {} entries: {}", self.label, self.tally.entries(), reason);
    }

    fn is_finished(&self) -> bool {
        self.tally.closed()
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin { entries: u64 },
    Entry(String),
    EntryDone { completed: u64, total: u64, bytes: u64 },
    Finished(String),
    Failed(String),
}

/// Forwards every update to a closure
pub struct CallbackProgress<F: Fn(ProgressEvent)> {
    emit: F,
    tally: Tally,
}

impl<F: Fn(ProgressEvent)> CallbackProgress<F> {
    pub fn new(emit: F) -> Self {
        Self {
            emit,
            tally: Tally::default(),
        }
    }
}

impl<F: Fn(ProgressEvent)> ProgressTracker for CallbackProgress<F> {
    fn begin(&self, entries: u64) {
        self.tally.total.store(entries, Ordering::Relaxed);
        (self.emit)(ProgressEvent::Begin { entries });
    }

    fn entry_started(&self, name: &str) {
        (self.emit)(ProgressEvent::Entry(name.to_string()));
    }

    fn entry_done(&self, bytes: u64) {
        let completed = self.tally.record(bytes);
        (self.emit)(ProgressEvent::EntryDone {
            completed,
            total: self.tally.total(),
            bytes,
        });
    }

    fn completed(&self) -> u64 {
        self.tally.entries()
    }

    fn finish(&self, summary: &str) {
        self.tally.close();
        (self.emit)(ProgressEvent::Finished(summary.to_string()));
    }

    fn fail(&self, reason: &str) {
        self.tally.close();
        (self.emit)(ProgressEvent::Failed(reason.to_string()));
    }

    fn is_finished(&self) -> bool {
        self.tally.closed()
    }
}

/// Terminal progress bar, one tick per entry
pub struct CliProgress {
    bar: ProgressBar,
    tally: Tally,
}

impl CliProgress {
    pub fn new(prefix: &str) -> Self {
        let style = ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.green/white}] {pos}/{len} entries {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        let bar = ProgressBar::new(0).with_style(style);
        bar.set_prefix(prefix.to_string());
        Self {
            bar,
            tally: Tally::default(),
        }
    }
}

impl ProgressTracker for CliProgress {
    fn begin(&self, entries: u64) {
        self.tally.total.store(entries, Ordering::Relaxed);
        self.bar.set_length(entries);
    }

    fn entry_started(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn entry_done(&self, bytes: u64) {
        self.tally.record(bytes);
        self.bar.inc(1);
    }

    fn completed(&self) -> u64 {
        self.tally.entries()
    }

    fn finish(&self, summary: &str) {
        self.tally.close();
        self.bar.finish_with_message(summary.to_string());
    }

    fn fail(&self, reason: &str) {
        self.tally.close();
        self.bar.abandon_with_message(reason.to_string());
    }

    fn is_finished(&self) -> bool {
        self.tally.closed()
    }
}
