//! Illustrative service child: a line-oriented, three-phase echo and
//! measurement protocol run over the socket the supervisor hands it as
//! standard input/output (SPEC_FULL.md §4.7).
//!
//! Never bound directly to a configuration file's `PATH` field by this
//! crate's own tests: it is meant to be launched *by* `superserver`, which
//! dup2's an accepted connection onto fd 0/1/2 before exec'ing it.

use std::io::{BufRead, BufReader, Write};
use std::os::fd::FromRawFd;
use std::time::Duration;

const HELLO_OK: &str = "200 OK - Ready\n";
const HELLO_ERROR: &str = "404 ERROR - Invalid Hello message\n";
const MEASUREMENT_ERROR: &str = "404 ERROR - Invalid Measurement message\n";
const BYE_OK: &str = "200 OK - Closing\n";
const BYE_ERROR: &str = "404 ERROR - Invalid Bye message\n";

const MAX_PROBE_FIELD: u64 = 100_000_000;

fn main() {
    env_logger::init();

    // The supervisor dup2's the accepted connection onto 0, 1 and 2; two
    // independent fds over the same socket, each closed on drop of its own
    // handle.
    let input = unsafe { std::fs::File::from_raw_fd(0) };
    let output = unsafe { std::fs::File::from_raw_fd(1) };

    let mut reader = BufReader::new(input);
    let mut writer = output;

    if let Err(err) = serve(&mut reader, &mut writer) {
        log::warn!("connection ended with an I/O error: {err}");
    }
}

struct Hello {
    n_probes: u64,
    msg_size: u64,
    server_delay_ms: u64,
}

fn serve<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> std::io::Result<()> {
    let hello = match read_line(reader)? {
        Some(line) => match parse_hello(&line) {
            Some(hello) => {
                writer.write_all(HELLO_OK.as_bytes())?;
                hello
            }
            None => {
                writer.write_all(HELLO_ERROR.as_bytes())?;
                return Ok(());
            }
        },
        None => return Ok(()),
    };

    for i in 1..=hello.n_probes {
        let Some(raw_line) = read_line(reader)? else {
            return Ok(());
        };
        if !probe_is_valid(&raw_line, i, hello.msg_size) {
            writer.write_all(MEASUREMENT_ERROR.as_bytes())?;
            return Ok(());
        }
        if hello.server_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(hello.server_delay_ms));
        }
        writer.write_all(&raw_line)?;
    }

    match read_line(reader)? {
        Some(line) if line.as_slice() == b"b\n" || line.as_slice() == b"b" => {
            writer.write_all(BYE_OK.as_bytes())?;
        }
        Some(_) => {
            writer.write_all(BYE_ERROR.as_bytes())?;
        }
        None => {}
    }
    Ok(())
}

/// Reads one `\n`-framed line, trailing newline included. Loops on short
/// reads, as stream sockets require. Returns `None` at a clean EOF with no
/// bytes read.
fn read_line<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf))
}

fn parse_hello(line: &[u8]) -> Option<Hello> {
    let text = std::str::from_utf8(line).ok()?.trim_end_matches('\n');
    let mut tokens = text.split_whitespace();

    if tokens.next()? != "h" {
        return None;
    }
    let measurement_type = tokens.next()?;
    if measurement_type != "rtt" && measurement_type != "thput" {
        return None;
    }
    let n_probes = parse_positive_probe_field(tokens.next()?)?;
    let msg_size = parse_positive_probe_field(tokens.next()?)?;
    let server_delay_ms: u64 = tokens.next()?.parse().ok()?;
    if server_delay_ms > MAX_PROBE_FIELD {
        return None;
    }
    if tokens.next().is_some() {
        return None;
    }

    Some(Hello { n_probes, msg_size, server_delay_ms })
}

fn parse_positive_probe_field(token: &str) -> Option<u64> {
    let value: u64 = token.parse().ok()?;
    if value == 0 || value > MAX_PROBE_FIELD {
        return None;
    }
    Some(value)
}

/// Validates `m <seq> <payload>\n`: sequence number must match `expected_seq`
/// and the payload must be exactly `expected_size` bytes of cyclic
/// lowercase letters.
fn probe_is_valid(raw_line: &[u8], expected_seq: u64, expected_size: u64) -> bool {
    let Ok(text) = std::str::from_utf8(raw_line) else { return false };
    let text = text.trim_end_matches('\n');
    let mut tokens = text.splitn(3, ' ');

    if tokens.next() != Some("m") {
        return false;
    }
    let Some(seq_token) = tokens.next() else { return false };
    let Ok(seq) = seq_token.parse::<u64>() else { return false };
    if seq != expected_seq {
        return false;
    }
    let Some(payload) = tokens.next() else { return false };
    if payload.len() as u64 != expected_size {
        return false;
    }
    payload.bytes().enumerate().all(|(i, b)| b == cyclic_letter(i))
}

fn cyclic_letter(index: usize) -> u8 {
    b'a' + (index % 26) as u8
}

#[allow(dead_code)]
fn make_cyclic_payload(size: usize) -> String {
    (0..size).map(|i| cyclic_letter(i) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(input: &str) -> String {
        let mut reader = BufReader::new(Cursor::new(input.as_bytes().to_vec()));
        let mut output = Vec::new();
        serve(&mut reader, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn full_session_round_trips_every_probe() {
        let payload = make_cyclic_payload(16);
        let input = format!(
            "h rtt 3 16 0\nm 1 {payload}\nm 2 {payload}\nm 3 {payload}\nb\n"
        );
        let output = run(&input);
        assert_eq!(
            output,
            format!(
                "{HELLO_OK}m 1 {payload}\nm 2 {payload}\nm 3 {payload}\n{BYE_OK}"
            )
        );
    }

    #[test]
    fn rejects_malformed_hello() {
        assert_eq!(run("h bogus 3 16 0\n"), HELLO_ERROR);
        assert_eq!(run("hello rtt 3 16 0\n"), HELLO_ERROR);
        assert_eq!(run("h rtt 0 16 0\n"), HELLO_ERROR);
    }

    #[test]
    fn rejects_probe_with_wrong_sequence_number() {
        let payload = make_cyclic_payload(4);
        let input = format!("h rtt 2 4 0\nm 2 {payload}\n");
        assert_eq!(run(&input), format!("{HELLO_OK}{MEASUREMENT_ERROR}"));
    }

    #[test]
    fn rejects_probe_with_wrong_payload_size() {
        let input = "h rtt 1 4 0\nm 1 ab\n";
        assert_eq!(run(input), format!("{HELLO_OK}{MEASUREMENT_ERROR}"));
    }

    #[test]
    fn rejects_bye_with_trailing_garbage() {
        let input = "h rtt 0 4 0\nnotbye\n";
        assert_eq!(run(input), format!("{HELLO_OK}{BYE_ERROR}"));
    }

    #[test]
    fn single_probe_session() {
        let input = "h thput 1 1 0\nm 1 a\nb\n";
        let payload_line = "m 1 a\n";
        assert_eq!(run(input), format!("{HELLO_OK}{payload_line}{BYE_OK}"));
    }
}
