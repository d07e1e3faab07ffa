//! Status-query command runner.
//!
//! Invokes `<program> --database=<db> list app` with stdout captured and
//! returns the text. Spawn failures, non-zero exits and hangs are all
//! `CheckError`s; the health checker turns them into "unhealthy".

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::background::{CheckError, StatusQuery};
use crate::config::defaults;

/// Runs the configured status-query executable.
#[derive(Debug, Clone)]
pub struct CommandStatusQuery {
    timeout: Duration,
}

impl CommandStatusQuery {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::STATUS_QUERY_TIMEOUT_SECS),
        }
    }

    /// Set how long one query may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CommandStatusQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusQuery for CommandStatusQuery {
    async fn list_apps(&self, program: &Path, database: &str) -> Result<String, CheckError> {
        let mut cmd = Command::new(program);
        cmd.arg(format!("--database={database}"))
            .args(["list", "app"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(super::CREATE_NO_WINDOW);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CheckError::StatusQueryLaunch {
                    program: program.to_path_buf(),
                    source,
                })
            }
            Err(_) => {
                return Err(CheckError::StatusQueryTimedOut {
                    program: program.to_path_buf(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(CheckError::StatusQueryFailed {
                program: program.to_path_buf(),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
