//! The meta-file: one `key:value` per line, in emission order.
//!
//! The grading driver parses this to learn what happened to the child, so
//! the format and key names are an external contract.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};

use super::BoxError;

#[derive(Debug)]
enum Sink {
    Stdout,
    File(File),
}

/// Meta-report writer. With no destination configured every write is a
/// no-op, so callers never need to guard.
#[derive(Debug)]
pub struct MetaFile {
    sink: Option<Sink>,
}

impl MetaFile {
    pub fn open(spec: Option<&str>) -> Result<MetaFile, BoxError> {
        let sink = match spec {
            None => None,
            Some("-") => Some(Sink::Stdout),
            Some(path) => {
                let file = File::create(path).map_err(|source| BoxError::MetaOpen {
                    path: path.to_string(),
                    source,
                })?;
                Some(Sink::File(file))
            }
        };
        Ok(MetaFile { sink })
    }

    /// Append one `key:value` line. Write errors are not recoverable at any
    /// call site, so they are reported once on close instead.
    pub fn pair(&mut self, key: &str, value: impl Display) {
        let _ = match &mut self.sink {
            None => Ok(()),
            Some(Sink::Stdout) => writeln!(io::stdout(), "{key}:{value}"),
            Some(Sink::File(f)) => writeln!(f, "{key}:{value}"),
        };
    }

    pub fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            let result = match sink {
                Sink::Stdout => io::stdout().flush(),
                Sink::File(mut f) => f.flush(),
            };
            if let Err(e) = result {
                log::warn!("flushing metafile: {e}");
            }
        }
    }
}

/// Milliseconds rendered as the `s.mmm` the meta format uses.
pub fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}
