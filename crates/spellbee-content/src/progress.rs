//! Generation progress side channel.

use std::sync::Mutex;

use tokio::sync::watch;

/// Percentage complete plus a human-readable stage label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub stage: String,
}

impl Progress {
    pub fn new(percent: u8, stage: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            stage: stage.into(),
        }
    }
}

/// Receives progress updates from a running pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: Progress);
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: Progress) {}
}

impl ProgressReporter for watch::Sender<Progress> {
    fn report(&self, progress: Progress) {
        // Keeps the latest value even with no receiver attached.
        self.send_replace(progress);
    }
}

/// Keeps every update, for tests and CLI summaries.
#[derive(Debug, Default)]
pub struct ProgressLog {
    entries: Mutex<Vec<Progress>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Progress> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Progress> {
        self.entries.lock().ok().and_then(|e| e.last().cloned())
    }
}

impl ProgressReporter for ProgressLog {
    fn report(&self, progress: Progress) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(progress);
        }
    }
}

/// Wraps a reporter so the percentage never goes backwards.
pub(crate) struct Monotonic<'a> {
    inner: &'a dyn ProgressReporter,
    last: u8,
}

impl<'a> Monotonic<'a> {
    pub(crate) fn new(inner: &'a dyn ProgressReporter) -> Self {
        Self { inner, last: 0 }
    }

    pub(crate) fn report(&mut self, percent: u8, stage: impl Into<String>) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        self.inner.report(Progress::new(percent, stage));
    }
}
