//! Event sink: where every watchdog state transition is reported
//!
//! Startup and shutdown milestones, config warnings, health-check failures and
//! every recovery state transition go to an injected `EventSink`, so tests can
//! capture exactly what was reported. Diagnostics that carry no event (loop
//! started/stopped totals, per-item debug lines) use `tracing` directly.

use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Severity of a reported event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "INFO"),
            EventLevel::Warning => write!(f, "WARNING"),
            EventLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Receiver for informational, warning and error messages.
///
/// Implementations must swallow their own failures: reporting an event can
/// never abort the caller.
pub trait EventSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Sink backed by `tracing`, tagging every record with the event source.
#[derive(Debug, Clone)]
pub struct TracingSink {
    source: String,
}

impl TracingSink {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl EventSink for TracingSink {
    fn info(&self, message: &str) {
        info!(source = %self.source, "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(source = %self.source, "{}", message);
    }

    fn error(&self, message: &str) {
        error!(source = %self.source, "{}", message);
    }
}

/// In-memory sink that keeps every event in order. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(EventLevel, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<(EventLevel, String)> {
        self.lock().clone()
    }

    /// Messages recorded at `level`, in order.
    pub fn messages(&self, level: EventLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|(_, m)| m.contains(needle))
    }

    fn record(&self, level: EventLevel, message: &str) {
        self.lock().push((level, message.to_string()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EventLevel, String)>> {
        self.events.lock().unwrap_or_else(|e| {
            warn!("RecordingSink mutex poisoned, recovering");
            e.into_inner()
        })
    }
}

impl EventSink for RecordingSink {
    fn info(&self, message: &str) {
        self.record(EventLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(EventLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(EventLevel::Error, message);
    }
}
