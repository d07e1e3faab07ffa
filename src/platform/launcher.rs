//! Recovery action launcher.
//!
//! Runs the action through the platform shell so a configured command line
//! may carry its own arguments. The launcher waits for the action up to the
//! request timeout; an action still running at that point is left running
//! and reported as timed out.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

use crate::background::{
    EventSink, LaunchOutcome, LaunchRequest, RecoveryLaunchError, RecoveryLauncher,
};

/// Launches recovery actions as child processes of the watchdog.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

impl ShellLauncher {
    fn command(request: &LaunchRequest, sink: &dyn EventSink) -> Command {
        let mut cmd = shell_command(request, sink);
        if request.hide_console {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            #[cfg(windows)]
            cmd.creation_flags(super::CREATE_NO_WINDOW);
        }
        cmd
    }
}

#[async_trait]
impl RecoveryLauncher for ShellLauncher {
    async fn launch(
        &self,
        request: &LaunchRequest,
        sink: &dyn EventSink,
    ) -> Result<LaunchOutcome, RecoveryLaunchError> {
        let mut child = Self::command(request, sink)
            .spawn()
            .map_err(|source| RecoveryLaunchError::Spawn {
                command: request.command.clone(),
                source,
            })?;

        let pid = child
            .id()
            .map_or_else(|| "unknown".to_string(), |p| p.to_string());
        sink.info(&format!(
            "Recovery process started (pid {pid}): {}",
            request.command
        ));

        match timeout(request.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                sink.info(&format!(
                    "Recovery process completed ({status}): {}",
                    request.command
                ));
                Ok(LaunchOutcome {
                    exit_code: status.code(),
                })
            }
            Ok(Err(source)) => Err(RecoveryLaunchError::Wait {
                command: request.command.clone(),
                source,
            }),
            Err(_) => Err(RecoveryLaunchError::TimedOut {
                command: request.command.clone(),
                timeout: request.timeout,
            }),
        }
    }
}

#[cfg(unix)]
fn shell_command(request: &LaunchRequest, _sink: &dyn EventSink) -> Command {
    if request.elevated && !running_as_root() {
        let mut cmd = Command::new("sudo");
        cmd.args(["-n", "sh", "-c", request.command.as_str()]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", request.command.as_str()]);
        cmd
    }
}

#[cfg(windows)]
fn shell_command(request: &LaunchRequest, sink: &dyn EventSink) -> Command {
    if request.elevated {
        sink.warn("Elevated recovery is not available to this launcher; running with the watchdog's identity");
    }
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", request.command.as_str()]);
    cmd
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn running_as_root() -> bool {
    // geteuid has no failure mode.
    unsafe { libc::geteuid() == 0 }
}
