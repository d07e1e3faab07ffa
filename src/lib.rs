//! Batch Watchdog: health checks and bounded recovery for managed workloads
//!
//! A background supervisor that periodically verifies a set of workloads are
//! alive and, when one is found unhealthy, launches its recovery action,
//! re-checks, and retries up to a configured budget.
//!
//! ## Architecture
//!
//! - **Config**: one immutable `WatchdogConfig` loaded at startup
//! - **HealthChecker**: required OS processes plus a status-query command
//! - **RecoveryExecutor**: launches the recovery action with a per-item timeout
//! - **RetryPolicy**: bounded-attempt state machine per unhealthy detection
//! - **WatchdogLoop**: sequential per-item processing on a cancellable interval
//! - **Service**: host-facing start/stop surface

pub mod background;
pub mod config;
pub mod platform;
pub mod service;

// Re-export configuration
pub use config::{ConfigError, RecoveryItem, StartupOverrides, WatchdogConfig};

// Re-export the watchdog core
pub use background::{
    CheckError, EventSink, HealthChecker, RecoveryExecutor, RecoveryLaunchError, RecoveryState,
    RetryPolicy, WatchdogLoop, WatchdogStats,
};

// Re-export lifecycle
pub use service::{Collaborators, ServiceHandle, WatchdogService};
