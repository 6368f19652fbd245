use std::collections::HashSet;
use std::io;
use std::os::fd::RawFd;
use std::path::Path;

use mio::{Events, Token};

use crate::config::{self, ServiceList};
use crate::error::{die, SuperserverError};
use crate::initializer;
use crate::reaper;
use crate::readiness::ReadinessSet;
use crate::spawner;

/// Owns the Service List and Readiness Set for the lifetime of the process
/// and runs the Dispatch Loop. Modeled as a struct rather than the original
/// C source's file-scope globals (and the teacher's `static ... RwLock`)
/// so the main flow and the Reaper share state explicitly.
pub struct Supervisor {
    services: ServiceList,
    readiness: ReadinessSet,
    signal_fd: RawFd,
}

impl Supervisor {
    /// Loads the configuration file at `config_path`, binds every
    /// service's socket, and installs the `SIGCHLD` handler. Any failure
    /// here is fatal (see SPEC_FULL.md §7) and is returned to the caller,
    /// which terminates the process via [`crate::error::die`].
    pub fn bootstrap(config_path: &Path) -> Result<Supervisor, SuperserverError> {
        let mut services = config::load_config_file(config_path)?;
        let readiness = ReadinessSet::new().map_err(SuperserverError::SocketCreate)?;

        initializer::initialize_all(&mut services, &readiness)?;

        let signal_fd = reaper::install().map_err(SuperserverError::Fork)?;
        readiness
            .insert(signal_fd, reaper::TOKEN)
            .map_err(SuperserverError::SocketBind)?;

        Ok(Supervisor { services, readiness, signal_fd })
    }

    /// Runs the Dispatch Loop forever. Each iteration blocks on the
    /// readiness primitive; a signal interruption is a no-op iteration that
    /// just restarts the wait — reaping itself happens off the self-pipe
    /// token inside `dispatch_ready`, not off `Interrupted`, since a
    /// `SIGCHLD` that is delivered and fully handled before `poll` is
    /// (re-)entered never surfaces as `Interrupted` at all.
    pub fn run(&mut self) -> ! {
        let mut events = Events::with_capacity(self.services.len() + 1);

        loop {
            match self.readiness.wait(&mut events) {
                Ok(()) => self.dispatch_ready(&events),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => die(SuperserverError::Poll(err)),
            }
        }
    }

    /// Drains any reaped children if the self-pipe is among the ready
    /// tokens, then invokes the Spawner for every ready descriptor, in
    /// service-list order — `mio`'s event order is not otherwise guaranteed
    /// to match configuration order (SPEC_FULL.md §4.4, §5).
    fn dispatch_ready(&mut self, events: &Events) {
        let ready: HashSet<Token> = events.iter().map(|event| event.token()).collect();

        if ready.contains(&reaper::TOKEN) {
            self.drain_reaped();
        }

        for service in &mut self.services {
            let Some(token) = service.token else { continue };
            if !ready.contains(&token) {
                continue;
            }

            if let Err(err) = spawner::spawn(service, &self.readiness) {
                die(err);
            }
        }
    }

    /// Reaps every child the Reaper's self-pipe has signaled since the last
    /// drain, logs each, and, for any that belonged to a `wait`-mode
    /// descriptor, clears `pending_pid` and reinstates the socket in the
    /// Readiness Set.
    fn drain_reaped(&mut self) {
        for (pid, status) in reaper::drain(self.signal_fd) {
            if reaper::exited_normally(status) {
                log::info!("child {pid} exited with code {}", reaper::exit_status(status));
            } else {
                log::warn!("child {pid} terminated abnormally (raw status {status})");
            }

            for service in &mut self.services {
                if service.pending_pid != Some(pid) {
                    continue;
                }

                service.pending_pid = None;
                let fd = service.socket.expect("descriptor not initialized");
                let token = service.token.expect("descriptor not initialized");
                if let Err(err) = self.readiness.insert(fd, token) {
                    die(SuperserverError::SocketBind(err));
                }
                log::info!(
                    "reinstated {} ({}/{}) after reaping pid {pid}",
                    service.name,
                    service.protocol,
                    service.port
                );
                break;
            }
        }
    }
}
