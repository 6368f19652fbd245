use std::io;
use std::os::fd::RawFd;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

/// The set of socket handles currently eligible for dispatch.
///
/// Backed by a single shared `mio::Poll` registry. Descriptors are wrapped
/// with `SourceFd` rather than `mio::net::{TcpListener, UdpSocket}` because
/// the supervisor owns plain blocking file descriptors obtained directly
/// from `libc::socket`/`bind`/`listen` (the Spawner needs a blocking
/// `accept` and the ability to `dup2` the raw fd across `fork`); `SourceFd`
/// lets an externally-owned, blocking fd still participate in readiness
/// polling, which is all the Dispatch Loop needs from it.
pub struct ReadinessSet {
    poll: Poll,
}

impl ReadinessSet {
    pub fn new() -> io::Result<ReadinessSet> {
        Ok(ReadinessSet { poll: Poll::new()? })
    }

    /// Registers `fd` under `token` for read-readiness. Used by the Service
    /// Initializer at startup and by the Reaper when reinstating a
    /// `wait`-mode socket.
    pub fn insert(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, Interest::READABLE)
    }

    /// Removes `fd` from the registry. Used by the Spawner when dispatching
    /// a `wait`-mode service, suppressing further dispatch until the Reaper
    /// reinstates it.
    pub fn remove(&self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    /// Blocks until at least one registered socket is read-ready, filling
    /// `events` with the ready set. A caller-owned `Events` buffer stands in
    /// for the "scratch copy" a `select()`-based design needs, since `poll`
    /// never mutates the registry itself (see SPEC_FULL.md §4.3).
    ///
    /// Signal interruption surfaces as `io::ErrorKind::Interrupted`; the
    /// Dispatch Loop treats that as a no-op iteration, per §4.4.
    pub fn wait(&mut self, events: &mut Events) -> io::Result<()> {
        self.poll.poll(events, None)
    }
}
