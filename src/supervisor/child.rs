//! Post-fork child setup.
//!
//! Everything that allocates (argument, path and environment strings) is
//! prepared before the fork in [`ChildSpec`]. After the fork the child
//! only performs raw syscalls and either execs or reports its failure
//! through the error pipe and exits 2.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use super::config::BoxConfig;
use super::{signal, BoxError};

/// One rlimit to apply in the child.
pub struct Rlim {
    name: &'static str,
    resource: i32,
    limit: libc::rlim_t,
}

impl Rlim {
    fn new(name: &'static str, resource: i32, limit: libc::rlim_t) -> Self {
        Rlim {
            name,
            resource,
            limit,
        }
    }
}

/// Pre-computed child setup: no allocation needed after fork.
pub struct ChildSpec {
    exec: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    chdir: Option<CString>,
    stdin: Option<CString>,
    stdout: Option<CString>,
    stderr: Option<CString>,
    stderr_to_stdout: bool,
    rlimits: Vec<Rlim>,
}

fn path_cstring(path: &std::path::Path) -> Result<CString, BoxError> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| BoxError::Config(format!("Path contains a NUL byte: {}", path.display())))
}

impl ChildSpec {
    pub fn prepare(cfg: &BoxConfig) -> Result<ChildSpec, BoxError> {
        use std::os::unix::ffi::OsStrExt;

        if cfg.command.is_empty() {
            return Err(BoxError::Config("No command to run".to_string()));
        }
        let argv = cfg
            .command
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    BoxError::Config(format!(
                        "Command argument contains a NUL byte: {}",
                        arg.to_string_lossy()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rlimits = Vec::new();
        if let Some(mem) = cfg.mem_kb {
            rlimits.push(Rlim::new("RLIMIT_AS", libc::RLIMIT_AS as i32, mem * 1024));
        }
        if let Some(fsize) = cfg.fsize_kb {
            rlimits.push(Rlim::new(
                "RLIMIT_FSIZE",
                libc::RLIMIT_FSIZE as i32,
                fsize * 1024,
            ));
        }
        rlimits.push(Rlim::new(
            "RLIMIT_STACK",
            libc::RLIMIT_STACK as i32,
            cfg.stack_kb.map_or(libc::RLIM_INFINITY, |kb| kb * 1024),
        ));
        rlimits.push(Rlim::new("RLIMIT_NOFILE", libc::RLIMIT_NOFILE as i32, 64));
        rlimits.push(Rlim::new("RLIMIT_MEMLOCK", libc::RLIMIT_MEMLOCK as i32, 0));
        if let Some(procs) = cfg.max_processes {
            rlimits.push(Rlim::new("RLIMIT_NPROC", libc::RLIMIT_NPROC as i32, procs));
        }

        Ok(ChildSpec {
            exec: argv[0].clone(),
            argv,
            envp: super::config::build_environment(cfg.inherit_env, &cfg.env_rules)?,
            chdir: cfg.chdir.as_deref().map(path_cstring).transpose()?,
            stdin: cfg.stdin_path.as_deref().map(path_cstring).transpose()?,
            stdout: cfg.stdout_path.as_deref().map(path_cstring).transpose()?,
            stderr: cfg.stderr_path.as_deref().map(path_cstring).transpose()?,
            stderr_to_stdout: cfg.stderr_to_stdout,
            rlimits,
        })
    }
}

/// Report a setup failure to the keeper and exit. The message is assumed to
/// fit in PIPE_BUF, so the write is atomic.
fn child_die(error_fd: RawFd, msg: &str) -> ! {
    unsafe {
        libc::write(error_fd, msg.as_ptr().cast(), msg.len());
        libc::_exit(2);
    }
}

/// Reopen `target` (0, 1 or 2) from `path`. The descriptor is closed first,
/// so a successful open must land exactly on `target`.
fn redirect(error_fd: RawFd, target: RawFd, path: &CString, flags: libc::c_int) {
    unsafe {
        libc::close(target);
        if libc::open(path.as_ptr(), flags, 0o666 as libc::c_uint) != target {
            child_die(
                error_fd,
                &format!(
                    "open(\"{}\"): {}",
                    path.to_string_lossy(),
                    std::io::Error::last_os_error()
                ),
            );
        }
    }
}

/// The body of the forked child. Never returns.
pub fn run_child(spec: &ChildSpec, error_fd: RawFd) -> ! {
    signal::reset_child_signals();

    // The child leads its own process group so the keeper can kill the
    // whole tree with one signal.
    unsafe {
        libc::setpgid(0, 0);
    }

    if let Some(path) = &spec.stdin {
        redirect(error_fd, 0, path, libc::O_RDONLY);
    }
    if let Some(path) = &spec.stdout {
        redirect(error_fd, 1, path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);
    }
    if let Some(path) = &spec.stderr {
        redirect(error_fd, 2, path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);
    }
    if spec.stderr_to_stdout {
        if unsafe { libc::dup2(1, 2) } < 0 {
            child_die(
                error_fd,
                &format!(
                    "Cannot dup stdout to stderr: {}",
                    std::io::Error::last_os_error()
                ),
            );
        }
    }

    for rl in &spec.rlimits {
        let limit = libc::rlimit {
            rlim_cur: rl.limit,
            rlim_max: rl.limit,
        };
        if unsafe { libc::setrlimit(rl.resource as _, &limit) } < 0 {
            child_die(
                error_fd,
                &format!(
                    "setrlimit({}, {}): {}",
                    rl.name,
                    rl.limit,
                    std::io::Error::last_os_error()
                ),
            );
        }
    }

    if let Some(dir) = &spec.chdir {
        if unsafe { libc::chdir(dir.as_ptr()) } < 0 {
            child_die(
                error_fd,
                &format!("chdir: {}", std::io::Error::last_os_error()),
            );
        }
    }

    match nix::unistd::execve(&spec.exec, &spec.argv, &spec.envp) {
        Ok(infallible) => match infallible {},
        Err(e) => child_die(
            error_fd,
            &format!("execve(\"{}\"): {}", spec.exec.to_string_lossy(), e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn prepare_rejects_empty_command() {
        let cfg = BoxConfig::new(Vec::new());
        assert!(ChildSpec::prepare(&cfg).is_err());
    }

    #[test]
    fn prepare_rejects_nul_in_argument() {
        let cfg = BoxConfig::new(vec![OsString::from("/bin/true"), OsString::from("a\0b")]);
        assert!(ChildSpec::prepare(&cfg).is_err());
    }

    #[test]
    fn default_rlimit_plan_has_the_fixed_caps() {
        let cfg = BoxConfig::new(vec![OsString::from("/bin/true")]);
        let spec = ChildSpec::prepare(&cfg).unwrap();
        let names: Vec<&str> = spec.rlimits.iter().map(|r| r.name).collect();
        // Stack is unlimited by default but still set; NOFILE and MEMLOCK
        // are unconditional; one process is allowed by default.
        assert_eq!(
            names,
            vec!["RLIMIT_STACK", "RLIMIT_NOFILE", "RLIMIT_MEMLOCK", "RLIMIT_NPROC"]
        );
        assert_eq!(spec.rlimits[0].limit, libc::RLIM_INFINITY);
        assert_eq!(spec.rlimits[1].limit, 64);
        assert_eq!(spec.rlimits[2].limit, 0);
        assert_eq!(spec.rlimits[3].limit, 1);
    }

    #[test]
    fn limits_scale_from_kb() {
        let mut cfg = BoxConfig::new(vec![OsString::from("/bin/true")]);
        cfg.mem_kb = Some(1024);
        cfg.fsize_kb = Some(8);
        cfg.stack_kb = Some(256);
        cfg.max_processes = None;
        let spec = ChildSpec::prepare(&cfg).unwrap();
        let find = |name: &str| spec.rlimits.iter().find(|r| r.name == name);
        assert_eq!(find("RLIMIT_AS").unwrap().limit, 1024 * 1024);
        assert_eq!(find("RLIMIT_FSIZE").unwrap().limit, 8 * 1024);
        assert_eq!(find("RLIMIT_STACK").unwrap().limit, 256 * 1024);
        assert!(find("RLIMIT_NPROC").is_none());
    }
}
