//! Running-process enumeration.
//!
//! Linux reads `/proc` directly; other platforms ask the system's own process
//! listing tool. On Linux, processes that have exited but are not yet reaped
//! are left out. Names are compared exactly, so the table holds every spelling
//! a process can reasonably be known by (kernel `comm` and argv[0] basename on
//! Linux, image name without `.exe` on Windows).

use std::collections::HashSet;

use crate::background::{CheckError, ProcessTable};

/// Process table of the host the watchdog runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn running_process_names(&self) -> Result<HashSet<String>, CheckError> {
        enumerate()
    }
}

#[cfg(target_os = "linux")]
fn enumerate() -> Result<HashSet<String>, CheckError> {
    use std::fs;

    let entries = fs::read_dir("/proc")
        .map_err(|e| CheckError::ProcessEnumeration(format!("/proc: {e}")))?;

    let mut names = HashSet::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str() else { continue };
        if !pid.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        // Processes may exit between listing and reading; skip them quietly.
        match fs::read_to_string(entry.path().join("stat")) {
            Ok(stat) if !is_defunct(&stat) => {}
            _ => continue,
        }
        if let Ok(comm) = fs::read_to_string(entry.path().join("comm")) {
            let comm = comm.trim_end();
            if !comm.is_empty() {
                names.insert(comm.to_string());
            }
        }
        if let Ok(cmdline) = fs::read(entry.path().join("cmdline")) {
            if let Some(argv0) = cmdline.split(|b| *b == 0).next() {
                if let Some(base) = basename(&String::from_utf8_lossy(argv0)) {
                    names.insert(base);
                }
            }
        }
    }
    Ok(names)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn enumerate() -> Result<HashSet<String>, CheckError> {
    let stdout = run_listing("ps", &["-A", "-o", "comm="])?;
    Ok(stdout.lines().filter_map(basename).collect())
}

#[cfg(windows)]
fn enumerate() -> Result<HashSet<String>, CheckError> {
    let stdout = run_listing("tasklist", &["/FO", "CSV", "/NH"])?;
    Ok(parse_tasklist_csv(&stdout))
}

#[cfg(not(any(unix, windows)))]
fn enumerate() -> Result<HashSet<String>, CheckError> {
    Err(CheckError::ProcessEnumeration(
        "process enumeration is not supported on this platform".to_string(),
    ))
}

#[cfg(any(windows, all(unix, not(target_os = "linux"))))]
fn run_listing(program: &str, args: &[&str]) -> Result<String, CheckError> {
    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(super::CREATE_NO_WINDOW);
    }

    let output = cmd
        .output()
        .map_err(|e| CheckError::ProcessEnumeration(format!("{program}: {e}")))?;
    if !output.status.success() {
        return Err(CheckError::ProcessEnumeration(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether a `/proc/<pid>/stat` line describes a process that has exited
/// but not been reaped (`Z`) or is being torn down (`X`).
///
/// The state field follows the last `)`, since `comm` may itself contain one.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn is_defunct(stat: &str) -> bool {
    stat.rfind(')')
        .and_then(|i| stat[i + 1..].split_whitespace().next())
        .is_some_and(|state| matches!(state, "Z" | "X" | "x"))
}

/// Last path component of a command, or `None` if empty.
#[cfg_attr(windows, allow(dead_code))]
fn basename(command: &str) -> Option<String> {
    let trimmed = command.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    (!base.is_empty()).then(|| base.to_string())
}

/// Image names from `tasklist /FO CSV /NH` output, `.exe` stripped.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_tasklist_csv(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .filter_map(|line| line.split("\",\"").next())
        .map(|image| image.trim().trim_matches('"'))
        .filter(|image| !image.is_empty())
        .map(|image| {
            let lower = image.to_ascii_lowercase();
            if lower.ends_with(".exe") {
                image[..image.len() - 4].to_string()
            } else {
                image.to_string()
            }
        })
        .collect()
}
