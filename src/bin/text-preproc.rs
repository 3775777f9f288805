//! text-preproc: normalize contestant-submitted text to plain ASCII.
//!
//! Reads stdin, writes the normalized text to stdout and a one-line error
//! message to stderr. Exit codes follow the judge convention: 42 for OK,
//! 43 for unacceptable input, other codes for internal errors.

use std::process;

use judgebox::exit::{EXIT_ACCEPT, EXIT_REJECT};
use judgebox::io::Stream;
use judgebox::preproc::{normalize, Outcome};

fn main() {
    let mut input = Stream::from_read_fd("stdin", 0, false);
    let mut output = Stream::from_write_fd("stdout", 1, false);

    match normalize(&mut input, &mut output) {
        Ok(Outcome::Clean) => process::exit(EXIT_ACCEPT),
        Ok(Outcome::Rejected(msg)) => {
            eprintln!("{msg}");
            process::exit(EXIT_REJECT);
        }
        Err(e) => {
            eprintln!("Internal error: {e}");
            process::exit(1);
        }
    }
}
