//! Health checker: decides whether a recovery item is running
//!
//! An item is healthy when every required OS process is present and the
//! status query reports every required app as running in the item's database.
//! Any failure to find out counts as unhealthy; nothing here can crash the loop.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::events::EventSink;
use crate::config::RecoveryItem;

/// Failure to determine health. Always treated as "unhealthy".
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to enumerate running processes: {0}")]
    ProcessEnumeration(String),
    #[error("failed to launch status query '{}': {}", .program.display(), .source)]
    StatusQueryLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("status query '{}' exited with {}", .program.display(), .status)]
    StatusQueryFailed { program: PathBuf, status: String },
    #[error("status query '{}' did not finish within {}s", .program.display(), .secs)]
    StatusQueryTimedOut { program: PathBuf, secs: u64 },
}

/// Snapshot of the names of currently running OS processes.
pub trait ProcessTable: Send + Sync {
    fn running_process_names(&self) -> Result<HashSet<String>, CheckError>;
}

/// External command that lists the apps running in a database.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    /// Run `program` scoped to `database` and return its captured stdout.
    async fn list_apps(&self, program: &Path, database: &str) -> Result<String, CheckError>;
}

/// Evaluates recovery items against the process table and the status query.
pub struct HealthChecker {
    processes: Arc<dyn ProcessTable>,
    status_query: Arc<dyn StatusQuery>,
    status_query_program: String,
    sink: Arc<dyn EventSink>,
}

impl HealthChecker {
    pub fn new(
        processes: Arc<dyn ProcessTable>,
        status_query: Arc<dyn StatusQuery>,
        status_query_program: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            processes,
            status_query,
            status_query_program: status_query_program.into(),
            sink,
        }
    }

    /// Check one item.
    ///
    /// The process table is read once per call. The first missing process
    /// fails the check without running the status query. The status query
    /// only runs when the item names apps to look for.
    pub async fn is_healthy(&self, item: &RecoveryItem) -> bool {
        if !item.processes.is_empty() {
            let running = match self.processes.running_process_names() {
                Ok(names) => names,
                Err(e) => {
                    self.sink.warn(&format!("Watchdog couldn't check processes: {e}"));
                    return false;
                }
            };
            if let Some(missing) = item.processes.iter().find(|p| !running.contains(*p)) {
                self.sink
                    .warn(&format!("Watchdog couldn't find the process {missing}."));
                return false;
            }
        }

        if item.app_names.is_empty() {
            return true;
        }

        let program = self.status_query_path(item);
        let output = match self.status_query.list_apps(&program, &item.database).await {
            Ok(out) => out,
            Err(e) => {
                self.sink
                    .warn(&format!("Watchdog couldn't query app status: {e}"));
                return false;
            }
        };

        match item
            .app_names
            .iter()
            .find(|app| !output.contains(&item.app_marker(app)))
        {
            Some(app) => {
                self.sink.warn(&format!(
                    "Watchdog couldn't find the app {app} running in {}.",
                    item.database
                ));
                false
            }
            None => true,
        }
    }

    /// Location of the status-query executable for `item`.
    pub fn status_query_path(&self, item: &RecoveryItem) -> PathBuf {
        let file_name = executable_name(&self.status_query_program);
        match item.bin_directory() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// Add the platform executable suffix when the name has no extension.
fn executable_name(program: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || Path::new(program).extension().is_some() {
        program.to_string()
    } else {
        format!("{program}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::events::{EventLevel, RecordingSink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeProcesses(Result<HashSet<String>, String>);

    impl FakeProcesses {
        fn running(names: &[&str]) -> Self {
            Self(Ok(names.iter().map(|s| (*s).to_string()).collect()))
        }
    }

    impl ProcessTable for FakeProcesses {
        fn running_process_names(&self) -> Result<HashSet<String>, CheckError> {
            self.0.clone().map_err(CheckError::ProcessEnumeration)
        }
    }

    #[derive(Default)]
    struct FakeStatus {
        output: Option<String>,
        calls: AtomicUsize,
        last_program: Mutex<Option<PathBuf>>,
    }

    impl FakeStatus {
        fn printing(output: &str) -> Self {
            Self {
                output: Some(output.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl StatusQuery for FakeStatus {
        async fn list_apps(&self, program: &Path, _database: &str) -> Result<String, CheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_program.lock().unwrap() = Some(program.to_path_buf());
            self.output.clone().ok_or_else(|| CheckError::StatusQueryFailed {
                program: program.to_path_buf(),
                status: "exit status: 1".to_string(),
            })
        }
    }

    fn item(processes: &[&str], apps: &[&str], database: &str) -> RecoveryItem {
        RecoveryItem {
            recovery_batch: "/opt/recover.sh".to_string(),
            database: database.to_string(),
            processes: processes.iter().map(|s| (*s).to_string()).collect(),
            app_names: apps.iter().map(|s| (*s).to_string()).collect(),
            ..RecoveryItem::default()
        }
    }

    fn checker(
        processes: FakeProcesses,
        status: Arc<FakeStatus>,
        sink: &RecordingSink,
    ) -> HealthChecker {
        HealthChecker::new(
            Arc::new(processes),
            status,
            "staradmin",
            Arc::new(sink.clone()),
        )
    }

    #[tokio::test]
    async fn test_empty_item_is_healthy_even_when_checks_would_fail() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::default());
        let hc = checker(FakeProcesses(Err("no /proc".into())), status.clone(), &sink);

        assert!(hc.is_healthy(&item(&[], &[], "")).await);
        assert_eq!(status.calls.load(Ordering::SeqCst), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_process_fails_without_status_query() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::printing("Shop (in default)"));
        let hc = checker(FakeProcesses::running(&["alpha"]), status.clone(), &sink);

        assert!(!hc.is_healthy(&item(&["alpha", "beta"], &["Shop"], "default")).await);
        assert_eq!(status.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            sink.messages(EventLevel::Warning),
            vec!["Watchdog couldn't find the process beta.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_process_enumeration_error_is_unhealthy() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::default());
        let hc = checker(FakeProcesses(Err("denied".into())), status, &sink);

        assert!(!hc.is_healthy(&item(&["alpha"], &[], "")).await);
        assert!(sink.contains("denied"));
    }

    #[tokio::test]
    async fn test_all_apps_must_be_reported() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::printing(
            "Shop (in default)\nBlog (in default)\n",
        ));
        let hc = checker(FakeProcesses::running(&["scdata"]), status.clone(), &sink);

        assert!(hc.is_healthy(&item(&["scdata"], &["Shop", "Blog"], "default")).await);
        assert!(!hc.is_healthy(&item(&["scdata"], &["Shop", "Wiki"], "default")).await);
        assert_eq!(status.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_marker_match_is_exact_and_case_sensitive() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::printing("Shop (in staging)\nblog (in default)"));
        let hc = checker(FakeProcesses::running(&[]), status, &sink);

        // Same app, different database.
        assert!(!hc.is_healthy(&item(&[], &["Shop"], "default")).await);
        // Different case.
        assert!(!hc.is_healthy(&item(&[], &["Blog"], "default")).await);
        assert!(hc.is_healthy(&item(&[], &["Shop"], "staging")).await);
    }

    #[tokio::test]
    async fn test_status_query_error_is_unhealthy() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::default());
        let hc = checker(FakeProcesses::running(&[]), status, &sink);

        assert!(!hc.is_healthy(&item(&[], &["Shop"], "default")).await);
        assert_eq!(sink.messages(EventLevel::Warning).len(), 1);
        assert!(sink.contains("couldn't query app status"));
    }

    #[tokio::test]
    async fn test_status_query_located_via_bin_directory() {
        let sink = RecordingSink::new();
        let status = Arc::new(FakeStatus::printing("Shop (in default)"));
        let hc = checker(FakeProcesses::running(&[]), status.clone(), &sink);

        let mut it = item(&[], &["Shop"], "default");
        it.bin_directory = Some(PathBuf::from("/opt/starcounter"));
        assert!(hc.is_healthy(&it).await);

        let expected = PathBuf::from("/opt/starcounter").join(executable_name("staradmin"));
        assert_eq!(status.last_program.lock().unwrap().clone(), Some(expected));
    }

    #[test]
    fn test_status_query_path_without_bin_directory() {
        let sink = RecordingSink::new();
        let hc = checker(
            FakeProcesses::running(&[]),
            Arc::new(FakeStatus::default()),
            &sink,
        );
        assert_eq!(
            hc.status_query_path(&item(&[], &[], "")),
            PathBuf::from(executable_name("staradmin"))
        );
    }

    #[test]
    fn test_executable_name_keeps_existing_extension() {
        assert_eq!(executable_name("query.exe"), "query.exe");
    }
}
