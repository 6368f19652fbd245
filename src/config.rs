use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::descriptor::ServiceDescriptor;
use crate::error::SuperserverError;

/// The ordered list of validated service descriptors, preserving
/// configuration-file order so that dispatch is deterministic when several
/// sockets are ready at once.
pub type ServiceList = Vec<ServiceDescriptor>;

/// Default configuration file name, resolved relative to the supervisor's
/// working directory unless overridden with `--config`.
///
/// The original source material carries both `conf.txt` and
/// `superserver.conf` across different revisions; this implementation picks
/// `superserver.conf`, matching the most complete surviving revision (see
/// DESIGN.md).
pub const DEFAULT_CONFIG_FILE: &str = "superserver.conf";

/// Opens `path` and loads it as a configuration file.
///
/// Distinguishes a missing/unopenable file (`MissingConfig`) from an error
/// while reading an already-open stream (`ConfigRead`), matching the
/// original source's separate exit codes for the two failure modes.
pub fn load_config_file(path: &Path) -> Result<ServiceList, SuperserverError> {
    let file = File::open(path).map_err(SuperserverError::MissingConfig)?;
    load_config(BufReader::new(file))
}

/// Reads and validates every non-blank line of `reader` as a service
/// record, returning the resulting [`ServiceList`].
///
/// Fails with [`SuperserverError::ConfigRead`] if the stream itself errors,
/// and [`SuperserverError::ConfigFormat`] on any validation violation
/// (malformed record or a duplicate `(protocol, port)` key).
pub fn load_config<R: BufRead>(reader: R) -> Result<ServiceList, SuperserverError> {
    let mut services = ServiceList::new();
    let mut seen = HashSet::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(SuperserverError::ConfigRead)?;
        if line.trim().is_empty() {
            continue;
        }

        let descriptor = ServiceDescriptor::parse_line(&line)
            .map_err(|msg| SuperserverError::ConfigFormat(format!("line {}: {msg}", lineno + 1)))?;

        let key = (descriptor.protocol, descriptor.port);
        if !seen.insert(key) {
            return Err(SuperserverError::ConfigFormat(format!(
                "line {}: duplicate service for {} port {}",
                lineno + 1,
                descriptor.protocol,
                descriptor.port
            )));
        }

        services.push(descriptor);
    }

    Ok(services)
}

/// Convenience used by tests and by callers that already have an in-memory
/// configuration string (e.g. the echo/measurement example in SPEC_FULL.md).
#[allow(dead_code)]
pub fn load_config_str(text: &str) -> Result<ServiceList, SuperserverError> {
    load_config(io::Cursor::new(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_ordered_services_and_ignores_blank_lines() {
        let services = load_config_str(
            "\n   \n/usr/local/bin/echo  tcp  7    nowait\n./udp-daytime        udp  13   wait\n",
        )
        .unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "echo");
        assert_eq!(services[1].name, "udp-daytime");
    }

    #[test]
    fn rejects_duplicate_protocol_port_pairs() {
        let err = load_config_str("/a tcp 80 wait\n/b tcp 80 nowait\n").unwrap_err();
        assert!(matches!(err, SuperserverError::ConfigFormat(_)));
    }

    #[test]
    fn allows_same_port_on_different_protocols() {
        let services = load_config_str("/a tcp 80 wait\n/b udp 80 nowait\n").unwrap();
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn propagates_format_errors_with_line_numbers() {
        let err = load_config_str("/a tcp 7 wait\n/b tcp 70000 wait\n").unwrap_err();
        match err {
            SuperserverError::ConfigFormat(msg) => assert!(msg.starts_with("line 2:")),
            other => panic!("expected ConfigFormat, got {other:?}"),
        }
    }

    #[test]
    fn loading_the_same_file_twice_is_idempotent() {
        let text = "/a tcp 7 wait\n/b udp 13 nowait\n";
        let first = load_config_str(text).unwrap();
        let second = load_config_str(text).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.protocol, b.protocol);
            assert_eq!(a.mode, b.mode);
            assert_eq!(a.port, b.port);
        }
    }

    #[test]
    fn missing_file_is_a_missing_config_error() {
        let err = load_config_file(Path::new("/nonexistent/path/to/superserver.conf")).unwrap_err();
        assert!(matches!(err, SuperserverError::MissingConfig(_)));
    }
}
