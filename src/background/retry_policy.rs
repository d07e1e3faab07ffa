//! Retry policy: bounded recovery attempts per unhealthy detection
//!
//! ```text
//! Healthy ──(check fails)──► Unhealthy ──► Recovering(1) ──► ... ──► Recovering(k-1) ──► Exhausted
//!                                               │                          │
//!                                               └──(re-check passes)──► Healthy ◄┘
//! ```
//!
//! The attempt counter is incremented before each step and the step whose
//! counter reaches `critical_counts` ends the sequence instead of launching
//! a recovery. A budget of `k` therefore launches at most `k - 1` recoveries,
//! and a budget of 1 launches none.

/// Per-cycle state of one recovery item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Check passed, either initially or after a recovery
    Healthy,
    /// Initial check failed; no attempt made yet
    Unhealthy,
    /// Recovery attempt `attempt` has been (or is being) launched
    Recovering { attempt: u32 },
    /// Attempt budget used up for this cycle
    Exhausted,
}

impl RecoveryState {
    /// Whether the sequence for this cycle is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Healthy | Self::Exhausted)
    }
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryState::Healthy => write!(f, "HEALTHY"),
            RecoveryState::Unhealthy => write!(f, "UNHEALTHY"),
            RecoveryState::Recovering { attempt } => write!(f, "RECOVERING #{attempt}"),
            RecoveryState::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Decides what follows a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    critical_counts: u32,
}

impl RetryPolicy {
    /// A budget below 1 is treated as 1.
    pub fn new(critical_counts: u32) -> Self {
        Self {
            critical_counts: critical_counts.max(1),
        }
    }

    pub fn critical_counts(&self) -> u32 {
        self.critical_counts
    }

    /// Most recovery launches a single unhealthy detection can cause.
    pub fn max_recoveries(&self) -> u32 {
        self.critical_counts - 1
    }

    /// State after a failed check in `state`. Terminal states stay put.
    pub fn next(&self, state: RecoveryState) -> RecoveryState {
        match state {
            RecoveryState::Healthy | RecoveryState::Exhausted => state,
            RecoveryState::Unhealthy => self.advance(1),
            RecoveryState::Recovering { attempt } => self.advance(attempt.saturating_add(1)),
        }
    }

    fn advance(&self, attempt: u32) -> RecoveryState {
        if attempt >= self.critical_counts {
            RecoveryState::Exhausted
        } else {
            RecoveryState::Recovering { attempt }
        }
    }
}
