//! Operating-system backed collaborators
//!
//! Real implementations of the seams the watchdog loop talks to: the process
//! table, the status-query command and the recovery launcher.

mod launcher;
mod processes;
mod status_query;

pub use launcher::ShellLauncher;
pub use processes::SystemProcessTable;
pub use status_query::CommandStatusQuery;

/// `CREATE_NO_WINDOW` process creation flag.
#[cfg(windows)]
pub(crate) const CREATE_NO_WINDOW: u32 = 0x0800_0000;
