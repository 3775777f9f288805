//! The keeper: forks the child, watches it, and classifies the outcome.
//!
//! The loop blocks in `wait4` and re-enters it on `EINTR`; all limit and
//! interrupt checks run synchronously between returns, driven by the flags
//! the signal handlers set. CPU usage of the still-running child is sampled
//! from `/proc`, the final accounting comes from the `rusage` that `wait4`
//! returns.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::process;
use std::time::Instant;

use nix::unistd::{fork, ForkResult};

use super::child::{self, ChildSpec};
use super::config::BoxConfig;
use super::meta::{format_seconds, MetaFile};
use super::{signal, BoxError, BoxStatus};
use crate::exit::{BOX_EXIT_INTERNAL, BOX_EXIT_OK, BOX_EXIT_VIOLATION};

/// Run one supervised child and exit with the supervisor's verdict.
pub fn supervise(cfg: BoxConfig) -> ! {
    let mut meta = match MetaFile::open(cfg.meta_path.as_deref()) {
        Ok(meta) => meta,
        Err(e) => {
            eprintln!("{e}");
            process::exit(BOX_EXIT_INTERNAL);
        }
    };

    let setup = ChildSpec::prepare(&cfg)
        .and_then(|spec| Ok((spec, error_pipe()?)))
        .and_then(|ok| {
            signal::install_keeper_handlers()?;
            Ok(ok)
        });
    let (spec, (error_rx, error_tx)) = match setup {
        Ok(ok) => ok,
        Err(e) => fail_before_fork(&mut meta, &e.to_string()),
    };

    match unsafe { fork() } {
        Err(e) => fail_before_fork(&mut meta, &BoxError::sys("fork", e).to_string()),
        Ok(ForkResult::Child) => {
            drop(error_rx);
            child::run_child(&spec, error_tx.as_raw_fd())
        }
        Ok(ForkResult::Parent { child }) => {
            drop(error_tx);
            signal::set_box_pid(child.as_raw());
            Keeper {
                pid: child.as_raw(),
                start: Instant::now(),
                clk_tck: clock_ticks_per_sec(),
                meta,
                error_rx,
                timeout_ms: cfg.timeout_ms,
                wall_timeout_ms: cfg.wall_timeout_ms,
                extra_timeout_ms: cfg.extra_timeout_ms,
                silent: cfg.silent,
                total_ms: 0,
                wall_ms: 0,
            }
            .run()
        }
    }
}

fn fail_before_fork(meta: &mut MetaFile, msg: &str) -> ! {
    meta.pair("status", BoxStatus::InternalError.code());
    meta.pair("message", msg);
    eprintln!("{msg}");
    meta.close();
    process::exit(BOX_EXIT_INTERNAL);
}

/// The child-to-keeper error channel: non-blocking and close-on-exec on both
/// ends, so a successful exec leaves nothing behind in the child.
fn error_pipe() -> Result<(File, std::os::fd::OwnedFd), BoxError> {
    let (rx, tx) = nix::unistd::pipe().map_err(|e| BoxError::sys("pipe", e))?;
    for fd in [rx.as_raw_fd(), tx.as_raw_fd()] {
        let ok = unsafe {
            libc::fcntl(fd, libc::F_SETFD, libc::fcntl(fd, libc::F_GETFD) | libc::FD_CLOEXEC) >= 0
                && libc::fcntl(fd, libc::F_SETFL, libc::fcntl(fd, libc::F_GETFL) | libc::O_NONBLOCK)
                    >= 0
        };
        if !ok {
            return Err(BoxError::Sys {
                what: "fcntl on pipe",
                source: io::Error::last_os_error(),
            });
        }
    }
    Ok((File::from(rx), tx))
}

fn clock_ticks_per_sec() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

fn timeval_ms(tv: &libc::timeval) -> u64 {
    tv.tv_sec as u64 * 1000 + tv.tv_usec as u64 / 1000
}

/// CPU milliseconds (utime + stime) from the contents of
/// `/proc/<pid>/stat`. The command name may itself contain spaces and
/// parentheses, so fields are counted from the last `)`.
pub fn proc_stat_cpu_ms(stat: &str, clk_tck: u64) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some((utime + stime) * 1000 / clk_tck)
}

struct Keeper {
    pid: libc::pid_t,
    start: Instant,
    clk_tck: u64,
    meta: MetaFile,
    error_rx: File,
    timeout_ms: Option<u64>,
    wall_timeout_ms: Option<u64>,
    extra_timeout_ms: u64,
    silent: bool,
    total_ms: u64,
    wall_ms: u64,
}

impl Keeper {
    fn run(mut self) -> ! {
        if self.timeout_ms.is_some() || self.wall_timeout_ms.is_some() {
            if let Err(e) = signal::arm_timer() {
                self.fail_internal(&e.to_string());
            }
        }

        loop {
            if let Some(sig) = signal::pending_interrupt() {
                self.meta.pair("exitsig", sig);
                self.fail_run(BoxStatus::Signalled, "Interrupted");
            }
            if signal::take_timer_tick() {
                self.check_timeout();
            }

            let mut status: libc::c_int = 0;
            let mut rusage = MaybeUninit::<libc::rusage>::zeroed();
            let p = unsafe { libc::wait4(self.pid, &mut status, 0, rusage.as_mut_ptr()) };
            if p < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                self.fail_internal(&format!("wait4: {err}"));
            }
            if p != self.pid {
                self.fail_internal(&format!("wait4: unknown pid {p} exited!"));
            }
            self.pid = 0;
            signal::clear_box_pid();

            // A message on the error pipe means the child never reached
            // exec; its exit status is meaningless then.
            if let Some(msg) = self.read_child_error() {
                self.fail_internal(&msg);
            }

            let rusage = unsafe { rusage.assume_init() };
            if libc::WIFEXITED(status) {
                self.final_stats(&rusage);
                let code = libc::WEXITSTATUS(status);
                if code != 0 {
                    self.meta.pair("exitcode", code);
                    self.fail_run(
                        BoxStatus::RuntimeError,
                        &format!("Exited with error status {code}"),
                    );
                }
                if let Some(limit) = self.timeout_ms {
                    if self.total_ms > limit {
                        self.fail_run(BoxStatus::TimedOut, "Time limit exceeded");
                    }
                }
                if let Some(limit) = self.wall_timeout_ms {
                    if self.wall_ms > limit {
                        self.fail_run(BoxStatus::TimedOut, "Time limit exceeded (wall clock)");
                    }
                }
                if !self.silent {
                    eprintln!(
                        "OK ({} sec real, {} sec wall)",
                        format_seconds(self.total_ms),
                        format_seconds(self.wall_ms)
                    );
                }
                self.finish(BOX_EXIT_OK);
            } else if libc::WIFSIGNALED(status) {
                let sig = libc::WTERMSIG(status);
                self.meta.pair("exitsig", sig);
                self.final_stats(&rusage);
                self.fail_run(BoxStatus::Signalled, &format!("Caught fatal signal {sig}"));
            } else if libc::WIFSTOPPED(status) {
                let sig = libc::WSTOPSIG(status);
                self.meta.pair("exitsig", sig);
                self.final_stats(&rusage);
                self.fail_run(BoxStatus::Signalled, &format!("Stopped by signal {sig}"));
            } else {
                self.fail_internal(&format!("wait4: unknown status {status:#x}, giving up!"));
            }
        }
    }

    fn wall_time_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn cpu_time_ms(&mut self) -> u64 {
        let path = format!("/proc/{}/stat", self.pid);
        let stat = match std::fs::read_to_string(&path) {
            Ok(stat) => stat,
            Err(e) => self.fail_internal(&format!("read {path}: {e}")),
        };
        match proc_stat_cpu_ms(&stat, self.clk_tck) {
            Some(ms) => ms,
            None => self.fail_internal(&format!("unexpected syntax in {path}")),
        }
    }

    fn check_timeout(&mut self) {
        if let Some(limit) = self.wall_timeout_ms {
            let wall = self.wall_time_ms();
            log::debug!("[wall time check: {wall} msec]");
            if wall > limit {
                self.fail_run(BoxStatus::TimedOut, "Time limit exceeded (wall clock)");
            }
        }
        if let Some(limit) = self.timeout_ms {
            let cpu = self.cpu_time_ms();
            log::debug!("[time check: {cpu} msec]");
            // Within the grace window the program keeps running so its true
            // CPU usage can still be reported.
            if cpu > limit && cpu > self.extra_timeout_ms {
                self.fail_run(BoxStatus::TimedOut, "Time limit exceeded");
            }
        }
    }

    fn read_child_error(&mut self) -> Option<String> {
        let mut buf = [0u8; 1024];
        match self.error_rx.read(&mut buf) {
            Ok(n) if n > 0 => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
            _ => None,
        }
    }

    fn final_stats(&mut self, rusage: &libc::rusage) {
        self.total_ms = timeval_ms(&rusage.ru_utime) + timeval_ms(&rusage.ru_stime);
        self.wall_ms = self.wall_time_ms();
        self.meta.pair("time", format_seconds(self.total_ms));
        self.meta.pair("time-wall", format_seconds(self.wall_ms));
        self.meta.pair("max-rss", rusage.ru_maxrss);
        self.meta.pair("csw-voluntary", rusage.ru_nvcsw);
        self.meta.pair("csw-forced", rusage.ru_nivcsw);
    }

    /// The supervised program misbehaved: record the verdict and exit 1.
    fn fail_run(&mut self, status: BoxStatus, msg: &str) -> ! {
        self.meta.pair("status", status.code());
        self.meta.pair("message", msg);
        if !self.silent {
            eprintln!("{msg}");
        }
        self.finish(BOX_EXIT_VIOLATION);
    }

    /// The supervisor itself failed: record `status:XX` and exit 2.
    fn fail_internal(&mut self, msg: &str) -> ! {
        self.meta.pair("status", BoxStatus::InternalError.code());
        self.meta.pair("message", msg);
        eprintln!("{msg}");
        self.finish(BOX_EXIT_INTERNAL);
    }

    /// Common exit path. A still-running child is killed together with its
    /// process group and reaped so its statistics make it into the meta.
    fn finish(&mut self, rc: i32) -> ! {
        if self.pid > 0 {
            unsafe {
                libc::kill(-self.pid, libc::SIGKILL);
                libc::kill(self.pid, libc::SIGKILL);
            }
            self.meta.pair("killed", 1);

            let mut status: libc::c_int = 0;
            let mut rusage = MaybeUninit::<libc::rusage>::zeroed();
            let p = loop {
                let p = unsafe { libc::wait4(self.pid, &mut status, 0, rusage.as_mut_ptr()) };
                if p >= 0 || io::Error::last_os_error().kind() != ErrorKind::Interrupted {
                    break p;
                }
            };
            if p < 0 {
                eprintln!(
                    "UGH: Lost track of the process ({})",
                    io::Error::last_os_error()
                );
            } else {
                let rusage = unsafe { rusage.assume_init() };
                self.final_stats(&rusage);
            }
            self.pid = 0;
            signal::clear_box_pid();
        }
        self.meta.close();
        process::exit(rc);
    }
}
