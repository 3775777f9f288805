//! The minibox supervisor: runs one child process under CPU, wall-clock,
//! memory, file-size and process-count limits, and reports what happened
//! through a meta-file and its exit code.
//!
//! This is an overrun guard for trusted-but-buggy programs (judges,
//! generators, contestant solutions already vetted by the pipeline), not a
//! security boundary.

pub mod child;
pub mod config;
pub mod keeper;
pub mod meta;
pub mod signal;

use std::io;

use thiserror::Error;

pub use config::{BoxConfig, EnvAction, EnvRule};
pub use keeper::supervise;

/// Verdict code written as `status:` to the meta-file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxStatus {
    /// The program exited with a nonzero code.
    RuntimeError,
    /// The program was terminated or stopped by a signal.
    Signalled,
    /// The program exceeded its CPU or wall-clock limit.
    TimedOut,
    /// The supervisor itself failed.
    InternalError,
}

impl BoxStatus {
    pub fn code(self) -> &'static str {
        match self {
            BoxStatus::RuntimeError => "RE",
            BoxStatus::Signalled => "SG",
            BoxStatus::TimedOut => "TO",
            BoxStatus::InternalError => "XX",
        }
    }
}

/// Supervisor-internal failures. Every one of them ends the run with
/// `status:XX` and exit code 2.
#[derive(Error, Debug)]
pub enum BoxError {
    #[error("Failed to open metafile '{path}': {source}")]
    MetaOpen { path: String, source: io::Error },

    #[error("{what}: {source}")]
    Sys { what: &'static str, source: io::Error },

    #[error("{0}")]
    Config(String),
}

impl BoxError {
    pub(crate) fn sys(what: &'static str, errno: nix::Error) -> Self {
        BoxError::Sys {
            what,
            source: io::Error::from_raw_os_error(errno as i32),
        }
    }
}
