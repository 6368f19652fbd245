use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

use libc::{c_int, pid_t};

/// `mio::Token` the self-pipe's read end is registered under. Reserved away
/// from the service tokens, which run `0..services.len()`.
pub const TOKEN: mio::Token = mio::Token(usize::MAX);

static SIGNAL_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Installs the `SIGCHLD` handler and returns the read end of a self-pipe
/// that becomes readable every time a child is reaped.
///
/// A single preallocated `(pid, status)` slot handed off from the handler to
/// the main thread only on `poll` returning `Interrupted` has two failure
/// modes: a second child dying before the main thread drains the slot
/// overwrites the first reap, and a `SIGCHLD` that is delivered and fully
/// handled in the window between `dispatch_ready` returning and the next
/// `poll` call being entered is never observed at all, because by the time
/// `poll` is called the signal has already been consumed and there is
/// nothing left to interrupt. The self-pipe closes both gaps: the handler
/// does only the one async-signal-safe `write` a byte to the pipe requires,
/// the read end is registered with the same `Poll` the Dispatch Loop already
/// blocks on (so the wakeup survives regardless of timing), and [`drain`]
/// reaps every exited child with `WNOHANG` in a loop instead of stopping
/// after the first.
pub fn install() -> io::Result<RawFd> {
    let mut fds: [c_int; 2] = [0, 0];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    SIGNAL_WRITE_FD.store(write_fd, Ordering::SeqCst);

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sigchld as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;

        if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(read_fd)
}

/// `SIGCHLD` handler. `write` on a pipe is on the POSIX async-signal-safe
/// list, unlike `waitpid` combined with logging or collection mutation. A
/// short or `EAGAIN` write is not retried: [`drain`] only needs the pipe to
/// be non-empty, not to count how many signals arrived.
extern "C" fn handle_sigchld(_signal: c_int) {
    let fd = SIGNAL_WRITE_FD.load(Ordering::SeqCst);
    if fd < 0 {
        return;
    }
    let byte: u8 = 1;
    unsafe {
        libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
    }
}

/// Drains the self-pipe, then reaps every exited child with `WNOHANG`,
/// returning one `(pid, status)` pair per child so a burst of exits (e.g. a
/// `nowait` service's short-lived children alongside a `wait` service) is
/// never collapsed into a single reap.
pub fn drain(read_fd: RawFd) -> Vec<(pid_t, c_int)> {
    let mut discard = [0u8; 64];
    loop {
        let n = unsafe { libc::read(read_fd, discard.as_mut_ptr() as *mut libc::c_void, discard.len()) };
        if n <= 0 {
            break;
        }
    }

    let mut reaped = Vec::new();
    loop {
        let mut status: c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        reaped.push((pid, status));
    }
    reaped
}

/// Did the child exit normally (as opposed to being killed by a signal)?
/// Replicates glibc's `WIFEXITED` macro, which `libc` does not expose as a
/// function.
pub fn exited_normally(status: c_int) -> bool {
    status & 0x7f == 0
}

/// The exit code a normally-exited child reported. Replicates `WEXITSTATUS`.
pub fn exit_status(status: c_int) -> c_int {
    (status >> 8) & 0xff
}
