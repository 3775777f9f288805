//! judge-token: compare a contestant's output against the reference,
//! token by token.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use judgebox::compare::MatchRules;
use judgebox::exit::{EXIT_ACCEPT, EXIT_JUDGE_FAILURE};
use judgebox::token::Tokenizer;
use judgebox::verdict::{self, Result};

#[derive(Parser)]
#[command(name = "judge-token")]
#[command(about = "Compare two sequences of tokens")]
struct Cli {
    /// Ignore newlines
    #[arg(short = 'n')]
    ignore_nl: bool,

    /// Ignore newlines at the end of file
    #[arg(short = 't')]
    ignore_trailing_nl: bool,

    /// Ignore differences in letter case
    #[arg(short = 'i')]
    ignore_case: bool,

    /// Match tokens as real numbers and allow small differences
    #[arg(short = 'r')]
    real_mode: bool,

    /// Maximum allowed relative error
    #[arg(short = 'e', value_name = "EPSILON", default_value_t = 1e-5)]
    rel_eps: f64,

    /// Maximum allowed absolute error
    #[arg(short = 'E', value_name = "EPSILON", default_value_t = 1e-30)]
    abs_eps: f64,

    /// Contestant's output
    output: PathBuf,

    /// Reference output
    correct: PathBuf,
}

/// With `-t`, a stream that has reached its last real token may still hold
/// empty lines; consume them and report whether it is now exhausted.
fn only_trailing_empties(t: &mut Tokenizer, enabled: bool) -> Result<bool> {
    if !t.token().is_empty() || !enabled {
        return Ok(false);
    }
    t.report_lines = false;
    Ok(!t.next_token()?)
}

fn compare(cli: &Cli) -> Result<()> {
    let mut out = Tokenizer::open(&cli.output)?;
    let mut correct = Tokenizer::open(&cli.correct)?;
    out.report_lines = !cli.ignore_nl;
    correct.report_lines = !cli.ignore_nl;

    let rules = MatchRules {
        real_mode: cli.real_mode,
        rel_eps: cli.rel_eps,
        abs_eps: cli.abs_eps,
        ignore_case: cli.ignore_case,
    };

    loop {
        let a = out.next_token()?;
        let b = correct.next_token()?;
        if !a {
            if b && !only_trailing_empties(&mut correct, cli.ignore_trailing_nl)? {
                out.reject("Ends too early");
            }
            return Ok(());
        }
        if !b {
            if !only_trailing_empties(&mut out, cli.ignore_trailing_nl)? {
                correct.reject("Garbage at the end");
            }
            return Ok(());
        }
        if !rules.tokens_equal(out.token(), correct.token()) {
            out.reject(&format!(
                "Found <{}>, expected <{}>",
                String::from_utf8_lossy(out.token()),
                String::from_utf8_lossy(correct.token())
            ));
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version are not judge failures.
            process::exit(if e.use_stderr() { EXIT_JUDGE_FAILURE } else { 0 });
        }
    };
    match compare(&cli) {
        Ok(()) => process::exit(EXIT_ACCEPT),
        Err(e) => verdict::die(&e.to_string()),
    }
}
