//! minibox: a stripped-down sandbox in the spirit of isolate. It does no
//! real isolation, but applies resource limits and kills processes that
//! overstep them, guarding against simple bugs in judges, generators and
//! already-vetted solutions.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, ArgGroup, Parser};
use log::LevelFilter;

use judgebox::supervisor::{self, BoxConfig, EnvRule};

#[derive(Parser)]
#[command(name = "minibox", disable_version_flag = true)]
#[command(about = "Run a command under resource limits and report what happened")]
#[command(group(ArgGroup::new("mode").required(true).args(["run", "version"])))]
struct Cli {
    /// Run the given command within the box
    #[arg(long)]
    run: bool,

    /// Display program version and exit
    #[arg(long)]
    version: bool,

    /// Change directory to <DIR> before executing the program
    #[arg(short = 'c', long = "chdir", value_name = "DIR")]
    chdir: Option<PathBuf>,

    /// Max size (in KB) of files that can be created
    #[arg(short = 'f', long = "fsize", value_name = "KB")]
    fsize: Option<u64>,

    /// Limit address space to <KB> kilobytes
    #[arg(short = 'm', long = "mem", value_name = "KB")]
    mem: Option<u64>,

    /// Limit stack size to <KB> kilobytes (default: 0=unlimited)
    #[arg(short = 'k', long = "stack", value_name = "KB")]
    stack: Option<u64>,

    /// Enable multiple processes (at most <MAX> of them, unlimited if omitted)
    #[arg(
        short = 'p',
        long = "processes",
        value_name = "MAX",
        num_args = 0..=1,
        default_missing_value = "0"
    )]
    processes: Option<u64>,

    /// Set run time limit (seconds, fractions allowed)
    #[arg(short = 't', long = "time", value_name = "SEC")]
    time: Option<f64>,

    /// Set wall clock time limit (seconds, fractions allowed)
    #[arg(short = 'w', long = "wall-time", value_name = "SEC")]
    wall_time: Option<f64>,

    /// Set extra timeout, before which a timing-out program is not yet
    /// killed, so that its real execution time is reported
    #[arg(short = 'x', long = "extra-time", value_name = "SEC")]
    extra_time: Option<f64>,

    /// Redirect stdin from <FILE>
    #[arg(short = 'i', long = "stdin", value_name = "FILE")]
    stdin: Option<PathBuf>,

    /// Redirect stdout to <FILE>
    #[arg(short = 'o', long = "stdout", value_name = "FILE")]
    stdout: Option<PathBuf>,

    /// Redirect stderr to <FILE>
    #[arg(
        short = 'r',
        long = "stderr",
        value_name = "FILE",
        overrides_with = "stderr_to_stdout"
    )]
    stderr: Option<PathBuf>,

    /// Redirect stderr to stdout
    #[arg(long = "stderr-to-stdout", overrides_with = "stderr")]
    stderr_to_stdout: bool,

    /// Inherit full environment of the parent process
    #[arg(short = 'e', long = "full-env")]
    full_env: bool,

    /// Inherit the environment variable <VAR>; with =<VAL> set it instead,
    /// with an empty <VAL> unset it
    #[arg(short = 'E', long = "env", value_name = "VAR[=VAL]", action = ArgAction::Append)]
    env: Vec<String>,

    /// Output process information to <FILE> (name:value); `-` means stdout
    #[arg(short = 'M', long = "meta", value_name = "FILE")]
    meta: Option<String>,

    /// Do not print status messages except for fatal errors
    #[arg(short = 's', long = "silent")]
    silent: bool,

    /// Be verbose (use multiple times for even more verbosity)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Command to run, after `--`
    #[arg(last = true, value_name = "CMD")]
    command: Vec<OsString>,
}

fn seconds_to_ms(sec: f64) -> u64 {
    (sec * 1000.0) as u64
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    if cli.version {
        println!("This is minibox {}, based on isolate", env!("CARGO_PKG_VERSION"));
        return;
    }

    if cli.command.is_empty() {
        eprintln!("--run mode requires a command to run");
        process::exit(2);
    }

    let mut env_rules = Vec::with_capacity(cli.env.len());
    for spec in &cli.env {
        match EnvRule::parse(spec) {
            Some(rule) => env_rules.push(rule),
            None => {
                eprintln!("Invalid environment specified: {spec}");
                process::exit(2);
            }
        }
    }

    let config = BoxConfig {
        command: cli.command,
        chdir: cli.chdir,
        mem_kb: cli.mem,
        fsize_kb: cli.fsize,
        stack_kb: cli.stack.filter(|&kb| kb > 0),
        max_processes: match cli.processes {
            None => Some(1),
            Some(0) => None,
            Some(n) => Some(n),
        },
        timeout_ms: cli.time.map(seconds_to_ms).filter(|&ms| ms > 0),
        wall_timeout_ms: cli.wall_time.map(seconds_to_ms).filter(|&ms| ms > 0),
        extra_timeout_ms: cli.extra_time.map(seconds_to_ms).unwrap_or(0),
        stdin_path: cli.stdin,
        stdout_path: cli.stdout,
        stderr_path: if cli.stderr_to_stdout { None } else { cli.stderr },
        stderr_to_stdout: cli.stderr_to_stdout,
        inherit_env: cli.full_env,
        env_rules,
        meta_path: cli.meta,
        silent: cli.silent,
    };

    // Redirection targets and child-created files get a fixed umask.
    unsafe {
        libc::umask(0o022);
    }

    supervisor::supervise(config)
}
