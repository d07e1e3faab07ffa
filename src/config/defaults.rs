//! System-wide default constants.
//!
//! Every value here can be overridden from the config file; these are what a
//! missing key falls back to.

// ============================================================================
// Scheduling
// ============================================================================

/// Time between health-check cycles (milliseconds).
pub const HEALTH_CHECK_INTERVAL_MS: u64 = 10_000;

/// Cap on a single recovery action's execution (milliseconds). 300 000 = 5 min.
pub const RECOVERY_EXECUTION_TIMEOUT_MS: u64 = 300_000;

/// Attempt budget per unhealthy detection.
///
/// The budget-th increment terminates the sequence, so at most
/// `CRITICAL_COUNTS - 1` recovery actions are launched.
pub const CRITICAL_COUNTS: u32 = 10;

// ============================================================================
// Startup
// ============================================================================

/// Config file name looked up next to the executable when no override is given.
pub const CONFIG_FILE_NAME: &str = "watchdog.toml";

/// Event-sink identifier attached to every log record.
pub const EVENT_SOURCE: &str = "Batch Watchdog";

// ============================================================================
// Status Query
// ============================================================================

/// External executable that reports which sub-applications are running.
pub const STATUS_QUERY_PROGRAM: &str = "staradmin";

/// A status query still running after this long is killed and the item
/// counted as unhealthy (seconds).
pub const STATUS_QUERY_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Shutdown
// ============================================================================

/// How long the binary waits for the loop to drain after a stop request (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 5;
