//! Watchdog Configuration Module
//!
//! The config file is read once at startup and handed to the loop as an
//! immutable value. A load failure is fatal: the service refuses to start
//! rather than run with a partial configuration.
//!
//! ## Locating the file
//!
//! 1. Positional `CONFIG_FILE` override (`/` stripped)
//! 2. `watchdog.toml`
//!
//! A rooted name is used as-is; a relative one is resolved against the
//! directory holding the executable. Files ending in `.json` use the legacy
//! JSON layout.

mod watchdog_config;
pub mod defaults;
pub mod validation;

pub use watchdog_config::*;

use std::path::{Path, PathBuf};

/// Optional positional overrides supplied when the service is started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupOverrides {
    /// Config file name
    pub config_file: Option<String>,
    /// Event-sink identifier
    pub event_source: Option<String>,
}

impl StartupOverrides {
    /// Build from positional arguments; extra arguments are ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        Self {
            config_file: args.next(),
            event_source: args.next(),
        }
    }
}

/// Strip `/` from an override value.
///
/// Backslashes are kept, so a rooted Windows path such as
/// `C:\cfg\cbwatchdog.json` still names a file outside the executable's
/// directory.
pub fn sanitize_override(raw: &str) -> String {
    raw.chars().filter(|c| *c != '/').collect()
}

/// Resolve a config file name to the path that will be read.
///
/// `base_dir` is the directory relative names are resolved against,
/// normally the executable's directory (see [`executable_dir`]).
pub fn resolve_config_path(file_name: &str, base_dir: &Path) -> PathBuf {
    let candidate = Path::new(file_name);
    if candidate.has_root() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

/// Directory containing the running executable, falling back to the
/// working directory when it can't be determined.
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
