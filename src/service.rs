//! Service lifecycle: start and stop the watchdog on behalf of the host
//!
//! `start` applies the positional overrides, loads the configuration (a
//! failure aborts startup) and spawns the loop on the current tokio runtime.
//! `stop` raises the stop signal and returns at once; `join` is available to
//! hosts that want to wait for the loop to drain.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::background::{
    EventSink, HealthChecker, HealthReport, ProcessTable, RecoveryExecutor, RecoveryLauncher,
    StatusQuery, TracingSink, WatchdogLoop, WatchdogStats,
};
use crate::config::{
    defaults, executable_dir, resolve_config_path, sanitize_override, ConfigError,
    StartupOverrides, WatchdogConfig,
};
use crate::platform::{CommandStatusQuery, ShellLauncher, SystemProcessTable};

/// The external primitives the watchdog depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub processes: Arc<dyn ProcessTable>,
    pub status_query: Arc<dyn StatusQuery>,
    pub launcher: Arc<dyn RecoveryLauncher>,
}

impl Collaborators {
    /// OS-backed implementations for the host the watchdog runs on.
    pub fn system() -> Self {
        Self {
            processes: Arc::new(SystemProcessTable),
            status_query: Arc::new(CommandStatusQuery::new()),
            launcher: Arc::new(ShellLauncher),
        }
    }
}

/// Builder for a running watchdog.
pub struct WatchdogService {
    collaborators: Collaborators,
    config_dir: PathBuf,
    sink: Option<Arc<dyn EventSink>>,
}

impl WatchdogService {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            config_dir: executable_dir(),
            sink: None,
        }
    }

    /// Resolve relative config names against `dir` instead of the executable's directory.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Report events to `sink` instead of a `TracingSink` named after the event source.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn sink_for(&self, source: &str) -> Arc<dyn EventSink> {
        match &self.sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(TracingSink::new(source)),
        }
    }

    /// Load the configuration and spawn the watchdog loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, overrides: &StartupOverrides) -> Result<ServiceHandle, ConfigError> {
        let mut sink = self.sink_for(defaults::EVENT_SOURCE);
        sink.info("Batch watchdog has been started.");

        let mut config_file = defaults::CONFIG_FILE_NAME.to_string();
        if let Some(raw) = &overrides.config_file {
            config_file = sanitize_override(raw);
            sink.info(&format!("Config file updated to: {config_file}"));
        }
        if let Some(raw) = &overrides.event_source {
            let source = sanitize_override(raw);
            sink = self.sink_for(&source);
            sink.info(&format!("Event source updated to: {source}"));
        }

        let path = resolve_config_path(&config_file, &self.config_dir);
        sink.info(&format!("Reading configuration file: {}", path.display()));
        let config = match WatchdogConfig::load_with_warnings(&path) {
            Ok((config, warnings)) => {
                for w in warnings {
                    sink.warn(&w.to_string());
                }
                Arc::new(config)
            }
            Err(e) => {
                sink.error(&format!("Watchdog failed to start: {e}"));
                return Err(e);
            }
        };
        sink.info(&config.summary());

        let checker = HealthChecker::new(
            Arc::clone(&self.collaborators.processes),
            Arc::clone(&self.collaborators.status_query),
            config.status_query_program.clone(),
            Arc::clone(&sink),
        );
        let executor =
            RecoveryExecutor::new(Arc::clone(&self.collaborators.launcher), Arc::clone(&sink));
        let watchdog = WatchdogLoop::new(config, checker, executor, Arc::clone(&sink));
        let health = watchdog.health_handle();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watchdog.run(cancel.clone()));

        Ok(ServiceHandle {
            cancel,
            task,
            health,
            sink,
        })
    }
}

/// Control surface of a started watchdog.
pub struct ServiceHandle {
    cancel: CancellationToken,
    task: JoinHandle<WatchdogStats>,
    health: Arc<RwLock<HealthReport>>,
    sink: Arc<dyn EventSink>,
}

impl ServiceHandle {
    /// Raise the stop signal. Returns immediately; later calls are no-ops.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.sink.info("Batch watchdog has been signalled to stop.");
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shared view of the latest cycle's results.
    pub fn health_handle(&self) -> Arc<RwLock<HealthReport>> {
        Arc::clone(&self.health)
    }

    /// Wait for the loop to exit and return its totals.
    pub async fn join(self) -> Result<WatchdogStats, JoinError> {
        self.task.await
    }
}
