//! judge-shuffle: compare two outputs while ignoring the order of lines,
//! of words within lines, or both.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use judgebox::exit::{EXIT_ACCEPT, EXIT_JUDGE_FAILURE};
use judgebox::shuffle::{slurp, Shuffler, TokenBuf};
use judgebox::token::Tokenizer;
use judgebox::verdict::{self, Result};

#[derive(Parser)]
#[command(name = "judge-shuffle")]
#[command(about = "Compare shuffled sequences of tokens")]
struct Cli {
    /// Ignore empty lines
    #[arg(short = 'e')]
    ignore_empty: bool,

    /// Ignore case
    #[arg(short = 'i')]
    ignore_case: bool,

    /// Shuffle lines (i.e., ignore their order)
    #[arg(short = 'l')]
    shuffle_lines: bool,

    /// Ignore newlines and match the whole input as a single line
    #[arg(short = 'n')]
    ignore_nl: bool,

    /// Shuffle words in each line
    #[arg(short = 'w')]
    shuffle_words: bool,

    /// Contestant's output
    output: PathBuf,

    /// Reference output
    correct: PathBuf,
}

fn read_input(cli: &Cli, path: &PathBuf) -> Result<TokenBuf> {
    let mut t = Tokenizer::open(path)?;
    t.report_lines = !cli.ignore_nl;
    slurp(&mut t, cli.ignore_case, cli.ignore_nl, cli.ignore_empty)
}

fn compare(cli: &Cli) -> Result<()> {
    let buf_out = read_input(cli, &cli.output)?;
    let buf_correct = read_input(cli, &cli.correct)?;

    let out = Shuffler::build(&buf_out, cli.shuffle_words, cli.shuffle_lines);
    let correct = Shuffler::build(&buf_correct, cli.shuffle_words, cli.shuffle_lines);

    if out.num_lines() != correct.num_lines() {
        verdict::reject(&format!(
            "Output has {} lines, expecting {}",
            out.num_lines(),
            correct.num_lines()
        ));
    }
    for i in 0..out.num_lines() {
        if !out.lines_equal(i, &correct, i) {
            verdict::reject(&format!("Line {} does not match", out.line(i).orig_line));
        }
    }
    Ok(())
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
