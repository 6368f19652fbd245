use std::fmt;

/// Transport protocol a service listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn parse(token: &str) -> Option<Protocol> {
        match token {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

/// Dispatch mode: whether the supervisor suppresses further dispatch on a
/// service's socket while a handler for it is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Wait,
    NoWait,
}

impl Mode {
    fn parse(token: &str) -> Option<Mode> {
        match token {
            "wait" => Some(Mode::Wait),
            "nowait" => Some(Mode::NoWait),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Wait => "wait",
            Mode::NoWait => "nowait",
        })
    }
}

const MAX_PATH_LEN: usize = 255;
const MAX_PORT_DIGITS: usize = 5;

/// One validated record out of the configuration file.
///
/// Fields mirror the original `ServiceData` struct: `socket`/`poll_token`
/// are populated later by the Service Initializer, and `pending_pid` is
/// mutated only by the Spawner (sets it) and the Reaper (clears it).
#[derive(Debug)]
pub struct ServiceDescriptor {
    pub path: String,
    pub name: String,
    pub protocol: Protocol,
    pub mode: Mode,
    pub port: u16,

    /// Blocking listening socket fd, valid after the Service Initializer runs.
    pub socket: Option<std::os::fd::RawFd>,
    /// `mio` registration token for this descriptor's socket, if currently
    /// (or formerly) registered with the shared `Poll`.
    pub token: Option<mio::Token>,
    /// PID of the in-flight handler for a `wait`-mode service, or `None` if
    /// idle. Always `None` for `nowait` services.
    pub pending_pid: Option<libc::pid_t>,
}

impl ServiceDescriptor {
    /// Parses one non-blank configuration line of the form
    /// `PATH PROTOCOL PORT MODE`.
    pub fn parse_line(line: &str) -> Result<ServiceDescriptor, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [path, protocol, port, mode] = tokens.as_slice() else {
            return Err(format!(
                "expected 4 whitespace-separated fields, found {}: {line:?}",
                tokens.len()
            ));
        };

        if path.is_empty() || path.len() > MAX_PATH_LEN {
            return Err(format!("invalid path (empty or over {MAX_PATH_LEN} bytes): {path:?}"));
        }

        let protocol = Protocol::parse(protocol)
            .ok_or_else(|| format!("protocol must be 'tcp' or 'udp', got {protocol:?}"))?;
        let mode = Mode::parse(mode)
            .ok_or_else(|| format!("mode must be 'wait' or 'nowait', got {mode:?}"))?;

        if port.len() > MAX_PORT_DIGITS || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("port must be a decimal integer of up to {MAX_PORT_DIGITS} digits, got {port:?}"));
        }
        let port: u32 = port.parse().map_err(|_| format!("port is not a valid integer: {port:?}"))?;
        if port == 0 || port > 65535 {
            return Err(format!("port out of range [1, 65535]: {port}"));
        }
        let port = port as u16;

        let name = match path.rfind('/') {
            Some(idx) => path[idx + 1..].to_string(),
            None => path.to_string(),
        };

        Ok(ServiceDescriptor {
            path: path.to_string(),
            name,
            protocol,
            mode,
            port,
            socket: None,
            token: None,
            pending_pid: None,
        })
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol == Protocol::Tcp
    }

    pub fn is_wait(&self) -> bool {
        self.mode == Mode::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let d = ServiceDescriptor::parse_line("/usr/local/bin/echo  tcp  7    nowait").unwrap();
        assert_eq!(d.path, "/usr/local/bin/echo");
        assert_eq!(d.name, "echo");
        assert_eq!(d.protocol, Protocol::Tcp);
        assert_eq!(d.mode, Mode::NoWait);
        assert_eq!(d.port, 7);
    }

    #[test]
    fn derives_name_without_slash_from_whole_path() {
        let d = ServiceDescriptor::parse_line("udp-daytime udp 13 wait").unwrap();
        assert_eq!(d.name, "udp-daytime");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(ServiceDescriptor::parse_line("/x tcp 7").is_err());
        assert!(ServiceDescriptor::parse_line("/x tcp 7 wait extra").is_err());
    }

    #[test]
    fn rejects_unknown_protocol_and_mode() {
        assert!(ServiceDescriptor::parse_line("/x sctp 7 wait").is_err());
        assert!(ServiceDescriptor::parse_line("/x tcp 7 maybe").is_err());
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(ServiceDescriptor::parse_line("/x tcp 0 wait").is_err());
        assert!(ServiceDescriptor::parse_line("/x tcp 70000 wait").is_err());
        assert!(ServiceDescriptor::parse_line("/x tcp 123456 wait").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(ServiceDescriptor::parse_line("/x tcp notaport wait").is_err());
    }
}
