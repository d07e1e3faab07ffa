//! Background services: health checks and bounded recovery
//!
//! Runs as a single background tokio task that checks every recovery item on
//! a fixed interval and launches the item's recovery action when it is down.

pub mod events;
pub mod health_check;
pub mod recovery;
pub mod retry_policy;
pub mod watchdog_loop;

pub use events::{EventLevel, EventSink, RecordingSink, TracingSink};
pub use health_check::{CheckError, HealthChecker, ProcessTable, StatusQuery};
pub use recovery::{
    effective_timeout, launch_request, LaunchOutcome, LaunchRequest, RecoveryExecutor,
    RecoveryLaunchError, RecoveryLauncher,
};
pub use retry_policy::{RecoveryState, RetryPolicy};
pub use watchdog_loop::{HealthReport, ItemHealth, ItemOutcome, WatchdogLoop, WatchdogStats};
