//! Recovery executor: launches an item's configured recovery action
//!
//! The executor only guarantees the action was launched. How long the launch
//! primitive waits for it is bounded by the effective timeout, which is
//! computed per call from the item and the config and never stored.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::events::EventSink;
use crate::config::{RecoveryItem, WatchdogConfig};

/// A recovery action that could not be run to completion.
#[derive(Debug, Error)]
pub enum RecoveryLaunchError {
    #[error("failed to start recovery action '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("recovery action '{command}' did not finish within {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
    #[error("failed waiting for recovery action '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the launch primitive needs to start a recovery action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Command line or script path
    pub command: String,
    /// Run without an attached console
    pub hide_console: bool,
    /// Upper bound on how long the launcher waits for the action
    pub timeout: Duration,
    /// Run with elevated rights
    pub elevated: bool,
}

/// How a launched recovery action finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Exit code, if the process reported one
    pub exit_code: Option<i32>,
}

/// Primitive that starts an external command with a timeout.
///
/// Lifecycle notifications ("started", "completed") go to `sink`.
#[async_trait]
pub trait RecoveryLauncher: Send + Sync {
    async fn launch(
        &self,
        request: &LaunchRequest,
        sink: &dyn EventSink,
    ) -> Result<LaunchOutcome, RecoveryLaunchError>;
}

/// Timeout for one recovery of `item`: its override when non-zero,
/// otherwise the config default.
pub fn effective_timeout(item: &RecoveryItem, config: &WatchdogConfig) -> Duration {
    item.recovery_timeout_override()
        .unwrap_or_else(|| config.default_recovery_execution_timeout())
}

/// Build the launch request for one recovery attempt.
pub fn launch_request(item: &RecoveryItem, config: &WatchdogConfig) -> LaunchRequest {
    LaunchRequest {
        command: item.recovery_batch.clone(),
        hide_console: config.no_console_for_recovery_script,
        timeout: effective_timeout(item, config),
        elevated: item.elevated,
    }
}

pub struct RecoveryExecutor {
    launcher: Arc<dyn RecoveryLauncher>,
    sink: Arc<dyn EventSink>,
}

impl RecoveryExecutor {
    pub fn new(launcher: Arc<dyn RecoveryLauncher>, sink: Arc<dyn EventSink>) -> Self {
        Self { launcher, sink }
    }

    /// Launch the recovery action for `item`. Launch failures are reported to
    /// the sink and returned; the caller re-checks health either way.
    pub async fn execute(
        &self,
        item: &RecoveryItem,
        config: &WatchdogConfig,
    ) -> Result<LaunchOutcome, RecoveryLaunchError> {
        let request = launch_request(item, config);
        let result = self.launcher.launch(&request, self.sink.as_ref()).await;
        if let Err(ref e) = result {
            self.sink.warn(&format!("Watchdog's recovery launch failed: {e}"));
        }
        result
    }
}
