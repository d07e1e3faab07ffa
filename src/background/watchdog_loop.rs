//! Watchdog loop: periodic health checks with bounded recovery
//!
//! Every cycle walks the recovery items in configured order. An unhealthy
//! item is driven through the [`RetryPolicy`] until it is healthy again or its
//! attempt budget is spent, before the next item is looked at. Between cycles
//! the loop waits on the cancellation token, so a stop request ends the wait
//! immediately. A stop request never interrupts an item mid-sequence.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::events::EventSink;
use super::health_check::HealthChecker;
use super::recovery::RecoveryExecutor;
use super::retry_policy::{RecoveryState, RetryPolicy};
use crate::config::{RecoveryItem, WatchdogConfig};

/// Where one item's sequence ended this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Terminal state, `Healthy` or `Exhausted`
    pub state: RecoveryState,
    /// Recovery actions launched this cycle
    pub launches: u32,
}

/// Last known status of one item
#[derive(Debug, Clone)]
pub struct ItemHealth {
    /// Recovery action, used as the item's display name
    pub recovery_batch: String,
    pub outcome: ItemOutcome,
    pub last_checked: DateTime<Utc>,
}

/// Shared view of the most recent cycle
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    /// One entry per recovery item, in configured order
    pub items: Vec<ItemHealth>,
    /// Number of completed health check cycles
    pub check_cycles: u64,
}

/// Totals returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    pub cycles: u64,
    pub recoveries_launched: u64,
    pub exhaustions: u64,
}

/// Drives health checks and recovery for every configured item.
pub struct WatchdogLoop {
    config: Arc<WatchdogConfig>,
    checker: HealthChecker,
    executor: RecoveryExecutor,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
    report: Arc<RwLock<HealthReport>>,
}

impl WatchdogLoop {
    pub fn new(
        config: Arc<WatchdogConfig>,
        checker: HealthChecker,
        executor: RecoveryExecutor,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let policy = RetryPolicy::new(config.critical_counts);
        Self {
            config,
            checker,
            executor,
            policy,
            sink,
            report: Arc::new(RwLock::new(HealthReport::default())),
        }
    }

    /// Shared handle to the latest cycle's results.
    pub fn health_handle(&self) -> Arc<RwLock<HealthReport>> {
        Arc::clone(&self.report)
    }

    /// Run cycles until `cancel` fires. Call from `tokio::spawn`.
    pub async fn run(self, cancel: CancellationToken) -> WatchdogStats {
        let interval = self.config.health_check_interval();
        let mut stats = WatchdogStats::default();

        info!(
            items = self.config.recovery_items.len(),
            interval_ms = self.config.health_check_interval_ms,
            critical_counts = self.policy.critical_counts(),
            "Watchdog loop started"
        );

        while !cancel.is_cancelled() {
            for outcome in self.run_cycle().await {
                stats.recoveries_launched += u64::from(outcome.launches);
                if outcome.state == RecoveryState::Exhausted {
                    stats.exhaustions += 1;
                }
            }
            stats.cycles += 1;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!(
            cycles = stats.cycles,
            recoveries = stats.recoveries_launched,
            exhaustions = stats.exhaustions,
            "Watchdog loop stopped"
        );
        stats
    }

    /// One pass over all items, strictly in order.
    pub async fn run_cycle(&self) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(self.config.recovery_items.len());
        let mut items = Vec::with_capacity(self.config.recovery_items.len());

        for item in &self.config.recovery_items {
            let outcome = self.check_and_recover(item).await;
            debug!(
                item = %item.recovery_batch,
                state = %outcome.state,
                launches = outcome.launches,
                "Item check finished"
            );
            outcomes.push(outcome);
            items.push(ItemHealth {
                recovery_batch: item.recovery_batch.clone(),
                outcome,
                last_checked: Utc::now(),
            });
        }

        let mut report = self.report.write().await;
        report.items = items;
        report.check_cycles += 1;

        outcomes
    }

    /// Check one item and, if it is unhealthy, run its recovery sequence to a
    /// terminal state.
    pub async fn check_and_recover(&self, item: &RecoveryItem) -> ItemOutcome {
        if self.checker.is_healthy(item).await {
            return ItemOutcome {
                state: RecoveryState::Healthy,
                launches: 0,
            };
        }

        let batch = &item.recovery_batch;
        let mut state = RecoveryState::Unhealthy;
        let mut launches = 0;

        while !state.is_terminal() {
            state = self.policy.next(state);
            match state {
                RecoveryState::Recovering { attempt } => {
                    self.sink.info(&format!(
                        "Watchdog's recovery attempt #{attempt} procedure started: {batch}"
                    ));
                    launches += 1;
                    // A failed launch is already reported; the re-check decides.
                    let _ = self.executor.execute(item, &self.config).await;

                    if self.checker.is_healthy(item).await {
                        self.sink.info(&format!(
                            "Watchdog's recovery attempt #{attempt} SUCCESS: {batch}"
                        ));
                        state = RecoveryState::Healthy;
                    } else {
                        self.sink.info(&format!(
                            "Watchdog's recovery attempt #{attempt} FAILED: {batch}"
                        ));
                    }
                }
                RecoveryState::Exhausted => {
                    self.sink.info(&format!(
                        "{} recovery attempts for {batch} have been made, aborting further \
                         attempts and moving on with next recovery item",
                        self.policy.max_recoveries()
                    ));
                }
                RecoveryState::Healthy | RecoveryState::Unhealthy => {}
            }
        }

        ItemOutcome { state, launches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::events::RecordingSink;
    use crate::background::health_check::{CheckError, ProcessTable, StatusQuery};
    use crate::background::recovery::{
        LaunchOutcome, LaunchRequest, RecoveryLaunchError, RecoveryLauncher,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Process table that reports `worker` present once `healthy_after`
    /// enumerations have been answered without it.
    struct FlakyProcesses {
        healthy_after: u32,
        calls: AtomicU32,
    }

    impl ProcessTable for FlakyProcesses {
        fn running_process_names(&self) -> Result<HashSet<String>, CheckError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut names = HashSet::new();
            if n >= self.healthy_after {
                names.insert("worker".to_string());
            }
            Ok(names)
        }
    }

    struct NoStatus;

    #[async_trait]
    impl StatusQuery for NoStatus {
        async fn list_apps(&self, program: &Path, _db: &str) -> Result<String, CheckError> {
            Err(CheckError::StatusQueryFailed {
                program: program.to_path_buf(),
                status: "unused".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct CountingLauncher {
        launches: AtomicU32,
    }

    #[async_trait]
    impl RecoveryLauncher for CountingLauncher {
        async fn launch(
            &self,
            _request: &LaunchRequest,
            _sink: &dyn EventSink,
        ) -> Result<LaunchOutcome, RecoveryLaunchError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(LaunchOutcome { exit_code: Some(0) })
        }
    }

    fn build(
        critical_counts: u32,
        healthy_after: u32,
    ) -> (WatchdogLoop, Arc<CountingLauncher>, RecordingSink) {
        let config = Arc::new(WatchdogConfig {
            critical_counts,
            recovery_items: vec![RecoveryItem {
                recovery_batch: "/opt/recover.sh".to_string(),
                processes: vec!["worker".to_string()],
                ..RecoveryItem::default()
            }],
            ..WatchdogConfig::default()
        });
        let sink = RecordingSink::new();
        let shared_sink: Arc<dyn EventSink> = Arc::new(sink.clone());
        let launcher = Arc::new(CountingLauncher::default());
        let checker = HealthChecker::new(
            Arc::new(FlakyProcesses {
                healthy_after,
                calls: AtomicU32::new(0),
            }),
            Arc::new(NoStatus),
            "staradmin",
            Arc::clone(&shared_sink),
        );
        let executor = RecoveryExecutor::new(launcher.clone(), Arc::clone(&shared_sink));
        (
            WatchdogLoop::new(config, checker, executor, shared_sink),
            launcher,
            sink,
        )
    }

    #[tokio::test]
    async fn test_healthy_item_needs_no_recovery() {
        let (wd, launcher, sink) = build(3, 0);
        let outcomes = wd.run_cycle().await;
        assert_eq!(
            outcomes,
            vec![ItemOutcome {
                state: RecoveryState::Healthy,
                launches: 0
            }]
        );
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        // Absent on checks 1 and 2, present on check 3.
        let (wd, launcher, sink) = build(3, 2);
        let outcomes = wd.run_cycle().await;
        assert_eq!(outcomes[0].state, RecoveryState::Healthy);
        assert_eq!(outcomes[0].launches, 2);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert!(sink.contains("recovery attempt #1 FAILED"));
        assert!(sink.contains("recovery attempt #2 SUCCESS"));
    }

    #[tokio::test]
    async fn test_exhausts_after_budget() {
        let (wd, launcher, sink) = build(4, u32::MAX);
        let outcomes = wd.run_cycle().await;
        assert_eq!(outcomes[0].state, RecoveryState::Exhausted);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
        assert!(sink.contains("3 recovery attempts for /opt/recover.sh have been made"));
    }

    #[tokio::test]
    async fn test_report_updated_after_cycle() {
        let (wd, _launcher, _sink) = build(1, u32::MAX);
        let handle = wd.health_handle();
        wd.run_cycle().await;
        wd.run_cycle().await;

        let report = handle.read().await;
        assert_eq!(report.check_cycles, 2);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].recovery_batch, "/opt/recover.sh");
        assert_eq!(report.items[0].outcome.state, RecoveryState::Exhausted);
        assert_eq!(report.items[0].outcome.launches, 0);
    }
}
