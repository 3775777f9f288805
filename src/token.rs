//! Whitespace tokenization and strict numeric parsing.
//!
//! A token is a maximal run of non-whitespace bytes. With line reporting
//! enabled the tokenizer additionally yields an empty token for every
//! newline it consumes, except the newline that immediately precedes
//! end-of-input: a file-final newline does not open a new, empty line.

use std::path::Path;
use std::process;

use crate::exit::EXIT_REJECT;
use crate::io::Stream;
use crate::verdict::Result;

/// Tokens longer than this are rejected outright.
const DEFAULT_MAX_TOKEN: usize = 32 << 20;

pub fn is_white(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r' || c == b'\n'
}

pub struct Tokenizer {
    src: Stream,
    /// Report an empty token for each newline consumed.
    pub report_lines: bool,
    /// Maximal allowed token size in bytes.
    pub max_token: usize,
    token: Vec<u8>,
    line: u32,
}

impl Tokenizer {
    pub fn new(src: Stream) -> Self {
        Tokenizer {
            src,
            report_lines: false,
            max_token: DEFAULT_MAX_TOKEN,
            token: Vec::new(),
            line: 1,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Stream::open_read(path)?))
    }

    /// The token read by the last successful [`Tokenizer::next_token`].
    /// Empty means a line sentinel.
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// 1-based line number at the end of the current token.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Report wrong output at the current input position and exit.
    pub fn reject(&self, msg: &str) -> ! {
        eprintln!("Error at {} line {}: {}", self.src.name(), self.line, msg);
        process::exit(EXIT_REJECT);
    }

    /// Advance to the next token. Returns `false` at end of input.
    pub fn next_token(&mut self) -> Result<bool> {
        // Skip whitespace; newlines seen here may yield a line sentinel.
        let mut c;
        loop {
            match self.src.getc()? {
                None => return Ok(false),
                Some(b) => {
                    if b == b'\n' {
                        self.line += 1;
                        if self.report_lines && self.src.peekc()?.is_some() {
                            self.token.clear();
                            return Ok(true);
                        }
                    }
                    if !is_white(b) {
                        c = b;
                        break;
                    }
                }
            }
        }

        self.token.clear();
        loop {
            self.token.push(c);
            if self.token.len() > self.max_token {
                self.reject("Token too long");
            }
            match self.src.getc()? {
                None => return Ok(true),
                Some(b) if is_white(b) => {
                    self.src.ungetc();
                    return Ok(true);
                }
                Some(b) => c = b,
            }
        }
    }

    fn force_token(&mut self) {
        match self.next_token() {
            Ok(true) => {}
            Ok(false) => self.reject("Unexpected end of file"),
            Err(e) => crate::verdict::die(&e.to_string()),
        }
    }

    // Typed readers for task-specific judges: fetch the next token and
    // reject the run outright on malformed input.

    pub fn get_i32(&mut self) -> i32 {
        self.force_token();
        match parse_i32(&self.token) {
            Some(x) => x,
            None => self.reject("Expected integer"),
        }
    }

    pub fn get_u32(&mut self) -> u32 {
        self.force_token();
        match parse_u32(&self.token) {
            Some(x) => x,
            None => self.reject("Expected unsigned integer"),
        }
    }

    pub fn get_i64(&mut self) -> i64 {
        self.force_token();
        match parse_i64(&self.token) {
            Some(x) => x,
            None => self.reject("Expected integer"),
        }
    }

    pub fn get_u64(&mut self) -> u64 {
        self.force_token();
        match parse_u64(&self.token) {
            Some(x) => x,
            None => self.reject("Expected unsigned integer"),
        }
    }

    pub fn get_f64(&mut self) -> f64 {
        self.force_token();
        match parse_f64(&self.token) {
            Some(x) => x,
            None => self.reject("Expected real number"),
        }
    }

    /// Require the next token to be a line sentinel (or end of input).
    pub fn get_nl(&mut self) {
        match self.next_token() {
            Ok(true) if !self.token.is_empty() => self.reject("Expected end of line"),
            Ok(_) => {}
            Err(e) => crate::verdict::die(&e.to_string()),
        }
    }
}

/// Shared preconditions of all numeric parsers: the whole token must be
/// consumed, and a token never starts with whitespace.
fn checked_str(tok: &[u8]) -> Option<&str> {
    if tok.is_empty() || is_white(tok[0]) {
        return None;
    }
    std::str::from_utf8(tok).ok()
}

pub fn parse_i64(tok: &[u8]) -> Option<i64> {
    checked_str(tok)?.parse().ok()
}

pub fn parse_u64(tok: &[u8]) -> Option<u64> {
    // The integer parser tolerates a sign; unsigned values must not.
    if tok.first() == Some(&b'-') {
        return None;
    }
    checked_str(tok)?.parse().ok()
}

pub fn parse_i32(tok: &[u8]) -> Option<i32> {
    checked_str(tok)?.parse().ok()
}

pub fn parse_u32(tok: &[u8]) -> Option<u32> {
    if tok.first() == Some(&b'-') {
        return None;
    }
    checked_str(tok)?.parse().ok()
}

pub fn parse_f64(tok: &[u8]) -> Option<f64> {
    checked_str(tok)?.parse().ok()
}
