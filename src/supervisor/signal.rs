//! Signal plumbing for the supervisor.
//!
//! Handlers only store into process-wide atomics and return; the keeper
//! loop polls the flags between `wait4` returns. The one exception is the
//! fatal-signal handler, which cannot return: it kills the child group with
//! async-signal-safe calls and exits.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use super::BoxError;

static TIMER_TICK: AtomicBool = AtomicBool::new(false);
static INTERRUPT: AtomicI32 = AtomicI32::new(0);
/// Child pid for the fatal handler; 0 while no child is alive.
static BOX_PID: AtomicI32 = AtomicI32::new(0);

const INTERRUPT_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
];
const FATAL_SIGNALS: [Signal; 5] = [
    Signal::SIGILL,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGSEGV,
    Signal::SIGBUS,
];
const IGNORED_SIGNALS: [Signal; 3] = [Signal::SIGPIPE, Signal::SIGUSR1, Signal::SIGUSR2];

extern "C" fn handle_interrupt(sig: libc::c_int) {
    INTERRUPT.store(sig, Ordering::Relaxed);
}

extern "C" fn handle_alarm(_sig: libc::c_int) {
    TIMER_TICK.store(true, Ordering::Relaxed);
    unsafe {
        libc::alarm(1);
    }
}

extern "C" fn handle_fatal(_sig: libc::c_int) {
    // Async-signal-safe only: kill(), write(), _exit().
    let pid = BOX_PID.load(Ordering::Relaxed);
    unsafe {
        if pid > 0 {
            libc::kill(-pid, libc::SIGKILL);
            libc::kill(pid, libc::SIGKILL);
        }
        let msg = b"minibox: caught fatal signal\n";
        libc::write(2, msg.as_ptr().cast(), msg.len());
        libc::_exit(2);
    }
}

/// Install the keeper's handlers. This must happen before the fork so an
/// early SIGINT cannot kill the keeper and orphan the child.
pub fn install_keeper_handlers() -> Result<(), BoxError> {
    let sa_interrupt = SigAction::new(
        SigHandler::Handler(handle_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let sa_fatal = SigAction::new(
        SigHandler::Handler(handle_fatal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        for sig in INTERRUPT_SIGNALS {
            signal::sigaction(sig, &sa_interrupt).map_err(|e| BoxError::sys("sigaction", e))?;
        }
        for sig in FATAL_SIGNALS {
            signal::sigaction(sig, &sa_fatal).map_err(|e| BoxError::sys("sigaction", e))?;
        }
        for sig in IGNORED_SIGNALS {
            signal::signal(sig, SigHandler::SigIgn).map_err(|e| BoxError::sys("signal", e))?;
        }
    }
    Ok(())
}

/// Arm the 1 Hz timer used for limit checks.
pub fn arm_timer() -> Result<(), BoxError> {
    let sa_alarm = SigAction::new(
        SigHandler::Handler(handle_alarm),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGALRM, &sa_alarm).map_err(|e| BoxError::sys("sigaction", e))?;
        libc::alarm(1);
    }
    Ok(())
}

/// Restore default dispositions in the child after fork.
pub fn reset_child_signals() {
    unsafe {
        for sig in INTERRUPT_SIGNALS
            .iter()
            .chain(&FATAL_SIGNALS)
            .chain(&IGNORED_SIGNALS)
        {
            let _ = signal::signal(*sig, SigHandler::SigDfl);
        }
    }
}

pub fn set_box_pid(pid: i32) {
    BOX_PID.store(pid, Ordering::Relaxed);
}

pub fn clear_box_pid() {
    BOX_PID.store(0, Ordering::Relaxed);
}

/// Consume a pending timer tick.
pub fn take_timer_tick() -> bool {
    TIMER_TICK.swap(false, Ordering::Relaxed)
}

/// Signal number of a pending interrupt, if any.
pub fn pending_interrupt() -> Option<i32> {
    let sig = INTERRUPT.load(Ordering::Relaxed);
    (sig != 0).then_some(sig)
}
