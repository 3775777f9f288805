//! Judge runtime: verdict emission and the judge-side error type.
//!
//! Judges communicate through their exit code and a one-line stderr message.
//! Verdicts terminate the process immediately; there is nothing to unwind,
//! the grading driver only looks at the exit status.

use std::io;
use std::process;

use thiserror::Error;

use crate::exit::{EXIT_ACCEPT, EXIT_JUDGE_FAILURE, EXIT_REJECT};

/// Errors a judge can hit on its trusted inputs. All of them are fatal and
/// map to exit code 44.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Unable to open {name} for reading: {source}")]
    OpenRead { name: String, source: io::Error },

    #[error("Unable to open {name} for writing: {source}")]
    OpenWrite { name: String, source: io::Error },

    #[error("Error reading {name}: {source}")]
    Read { name: String, source: io::Error },

    #[error("Error writing {name}: {source}")]
    Write { name: String, source: io::Error },
}

pub type Result<T> = std::result::Result<T, JudgeError>;

/// Report a correct output and exit. Task-specific judges put their
/// acceptance message on stderr through this; the bundled comparators
/// accept silently with the bare exit code.
pub fn accept(msg: &str) -> ! {
    eprintln!("{msg}");
    process::exit(EXIT_ACCEPT);
}

/// Report a wrong output and exit.
pub fn reject(msg: &str) -> ! {
    eprintln!("{msg}");
    process::exit(EXIT_REJECT);
}

/// Report a failure of the judge itself and exit.
pub fn die(msg: &str) -> ! {
    eprintln!("{msg}");
    process::exit(EXIT_JUDGE_FAILURE);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The verdict sinks end the process, so the child half of this test
    // runs in a re-spawned copy of the test binary.
    #[test]
    fn accept_writes_its_message_and_exits_42() {
        if std::env::var_os("JUDGEBOX_VERDICT_ACCEPT").is_some() {
            accept("correct answer");
        }
        let out = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "verdict::tests::accept_writes_its_message_and_exits_42",
                "--exact",
                "--nocapture",
            ])
            .env("JUDGEBOX_VERDICT_ACCEPT", "1")
            .output()
            .unwrap();
        assert_eq!(out.status.code(), Some(EXIT_ACCEPT));
        assert!(String::from_utf8_lossy(&out.stderr).contains("correct answer"));
    }
}
