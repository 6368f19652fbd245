use std::io;
use std::mem;
use std::os::fd::RawFd;

use mio::Token;

use crate::config::ServiceList;
use crate::descriptor::Protocol;
use crate::error::SuperserverError;
use crate::readiness::ReadinessSet;

const LISTEN_BACKLOG: i32 = 8;

/// Binds every descriptor's socket (stream for TCP, datagram for UDP) on
/// the wildcard address, `listen`s TCP sockets, and registers each with
/// `readiness` under a unique, stable `Token`.
///
/// Sockets are created with `SOCK_CLOEXEC` so that, when the Spawner forks a
/// child to service one descriptor, every *other* service's listening
/// socket is closed automatically at `execve` rather than leaking into the
/// child; the one socket the child does need is deliberately `dup2`'d onto
/// 0/1/2 first (see `spawner.rs`), which yields fresh, non-`CLOEXEC`
/// descriptors regardless of the source fd's flags.
pub fn initialize_all(services: &mut ServiceList, readiness: &ReadinessSet) -> Result<(), SuperserverError> {
    for (index, service) in services.iter_mut().enumerate() {
        let fd = create_socket(service.protocol)?;

        bind(fd, service.port)?;

        if service.is_tcp() {
            listen(fd)?;
        }

        let token = Token(index);
        readiness
            .insert(fd, token)
            .map_err(SuperserverError::SocketBind)?;

        service.socket = Some(fd);
        service.token = Some(token);

        log::info!(
            "listening on {} port {} for {} ({})",
            service.protocol,
            service.port,
            service.name,
            service.mode
        );
    }
    Ok(())
}

fn create_socket(protocol: Protocol) -> Result<RawFd, SuperserverError> {
    let (socket_type, ip_protocol) = match protocol {
        Protocol::Tcp => (libc::SOCK_STREAM, libc::IPPROTO_TCP),
        Protocol::Udp => (libc::SOCK_DGRAM, libc::IPPROTO_UDP),
    };

    let mut flags = socket_type | libc::SOCK_CLOEXEC;
    if protocol == Protocol::Tcp {
        // Non-blocking so the Spawner can accept-loop until EWOULDBLOCK and
        // drain an entire backlog on one readiness edge instead of stranding
        // a second already-queued connection until an unrelated new one
        // produces a fresh edge. `accept` never carries O_NONBLOCK over to
        // the connection fd it returns, so this has no effect on the child.
        flags |= libc::SOCK_NONBLOCK;
    }

    let fd = unsafe { libc::socket(libc::AF_INET, flags, ip_protocol) };
    if fd < 0 {
        return Err(SuperserverError::SocketCreate(io::Error::last_os_error()));
    }

    let reuse: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &reuse as *const _ as *const libc::c_void,
            mem::size_of_val(&reuse) as libc::socklen_t,
        );
    }

    Ok(fd)
}

fn bind(fd: RawFd, port: u16) -> Result<(), SuperserverError> {
    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr { s_addr: libc::INADDR_ANY.to_be() },
        sin_zero: [0; 8],
        #[cfg(target_os = "macos")]
        sin_len: 0,
    };

    let result = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if result < 0 {
        return Err(SuperserverError::SocketBind(io::Error::last_os_error()));
    }
    Ok(())
}

fn listen(fd: RawFd) -> Result<(), SuperserverError> {
    if unsafe { libc::listen(fd, LISTEN_BACKLOG) } < 0 {
        return Err(SuperserverError::Listen(io::Error::last_os_error()));
    }
    Ok(())
}
