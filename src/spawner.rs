use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;

use crate::descriptor::ServiceDescriptor;
use crate::error::{ChildFailure, SuperserverError};
use crate::readiness::ReadinessSet;

/// Dispatches one ready `descriptor`: accepts (TCP) or reuses (UDP) the
/// pending I/O as a connection socket, forks, and in the child replaces the
/// process image with the service executable. Returns once the parent's
/// half of the dance is done; the child never returns from this function.
///
/// For TCP the listening socket is non-blocking (`initializer.rs`), so this
/// loops accepting and forking until `accept` reports `EWOULDBLOCK` — a
/// single readiness edge can carry more than one already-queued connection,
/// and without draining the backlog here a second client stays stranded
/// until an unrelated new connection produces a fresh edge.
pub fn spawn(descriptor: &mut ServiceDescriptor, readiness: &ReadinessSet) -> Result<(), SuperserverError> {
    let listening_fd = descriptor.socket.expect("descriptor not initialized");

    if !descriptor.is_tcp() {
        return dispatch_connection(descriptor, listening_fd, listening_fd, readiness);
    }

    loop {
        let fd = unsafe { libc::accept(listening_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(SuperserverError::Accept(err));
        }

        dispatch_connection(descriptor, listening_fd, fd, readiness)?;

        if descriptor.is_wait() {
            // Dispatch is now suppressed until the Reaper reinstates the
            // socket; whatever is left in the backlog stays queued.
            return Ok(());
        }
    }
}

/// Forks to handle one already-obtained `connection_fd`, and applies the
/// parent's half of the wait/nowait bookkeeping.
fn dispatch_connection(
    descriptor: &mut ServiceDescriptor,
    listening_fd: RawFd,
    connection_fd: RawFd,
    readiness: &ReadinessSet,
) -> Result<(), SuperserverError> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(SuperserverError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        run_child(descriptor, listening_fd, connection_fd);
    }

    // Parent.
    if descriptor.is_tcp() {
        if unsafe { libc::close(connection_fd) } < 0 {
            return Err(SuperserverError::Close(io::Error::last_os_error()));
        }
    }

    log::trace!(
        "spawned pid {} for {} ({}/{})",
        pid,
        descriptor.name,
        descriptor.protocol,
        descriptor.port
    );

    if descriptor.is_wait() {
        readiness
            .remove(listening_fd)
            .map_err(SuperserverError::Close)?;
        descriptor.pending_pid = Some(pid);
    }

    Ok(())
}

/// Runs in the forked child. Never returns: either `execve` replaces the
/// process image, or a distinct nonzero exit code reports which step
/// failed, for the Reaper to observe and log.
fn run_child(descriptor: &ServiceDescriptor, listening_fd: RawFd, connection_fd: RawFd) -> ! {
    if descriptor.is_tcp() && unsafe { libc::close(listening_fd) } < 0 {
        std::process::exit(ChildFailure::Close.exit_code());
    }

    // Explicit-target duplication (`dup2`) rather than "close 0/1/2 then
    // `dup`", which silently assumed no other fd had been allocated
    // in between (see SPEC_FULL.md DESIGN NOTES).
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(connection_fd, target) } < 0 {
            std::process::exit(ChildFailure::Dup.exit_code());
        }
    }

    if connection_fd > libc::STDERR_FILENO && unsafe { libc::close(connection_fd) } < 0 {
        std::process::exit(ChildFailure::Close.exit_code());
    }

    exec_service(descriptor)
}

fn exec_service(descriptor: &ServiceDescriptor) -> ! {
    let path = match CString::new(descriptor.path.as_str()) {
        Ok(path) => path,
        Err(_) => std::process::exit(ChildFailure::Exec.exit_code()),
    };
    let name = match CString::new(descriptor.name.as_str()) {
        Ok(name) => name,
        Err(_) => std::process::exit(ChildFailure::Exec.exit_code()),
    };

    let argv: [*const libc::c_char; 2] = [name.as_ptr(), std::ptr::null()];

    let env_strings: Vec<CString> = std::env::vars_os()
        .filter_map(|(key, value)| {
            let mut entry = key.into_string().ok()?;
            entry.push('=');
            entry.push_str(&value.into_string().ok()?);
            CString::new(entry).ok()
        })
        .collect();
    let mut envp: Vec<*const libc::c_char> = env_strings.iter().map(|s| s.as_ptr()).collect();
    envp.push(std::ptr::null());

    unsafe {
        libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr());
    }

    // execve only returns on failure.
    std::process::exit(ChildFailure::Exec.exit_code());
}
