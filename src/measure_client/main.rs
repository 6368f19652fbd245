//! Manual smoke-test client for the echo/measurement service
//! (SPEC_FULL.md §4.7), grounded in the original reference client. Talks
//! directly to a TCP port; does not go through the supervisor's config
//! file.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MeasurementType {
    Rtt,
    Thput,
}

impl std::fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MeasurementType::Rtt => "rtt",
            MeasurementType::Thput => "thput",
        })
    }
}

/// Drives a Hello / Measurement / Bye session against a running
/// echo/measurement service and prints a timing summary.
#[derive(Parser, Debug)]
struct Cli {
    /// Host:port of the running service.
    address: String,

    #[arg(long, value_enum, default_value = "rtt")]
    measurement_type: MeasurementType,

    #[arg(long, default_value_t = 10)]
    probes: u64,

    #[arg(long, default_value_t = 64)]
    msg_size: u64,

    #[arg(long, default_value_t = 0)]
    server_delay_ms: u64,
}

fn main() {
    let cli = Cli::parse();

    let stream = TcpStream::connect(&cli.address).expect("connect to service");
    let mut writer = stream.try_clone().expect("clone stream for writing");
    let mut reader = BufReader::new(stream);

    send_hello(&mut writer, &cli);
    expect_line(&mut reader, "200 OK - Ready\n");

    let payload = cyclic_payload(cli.msg_size as usize);
    let start = Instant::now();
    for i in 1..=cli.probes {
        let line = format!("m {i} {payload}\n");
        writer.write_all(line.as_bytes()).expect("send probe");
        let echoed = read_line(&mut reader).expect("read probe echo");
        assert_eq!(echoed, line, "probe {i} was not echoed back verbatim");
    }
    let elapsed = start.elapsed();

    writer.write_all(b"b\n").expect("send bye");
    expect_line(&mut reader, "200 OK - Closing\n");

    print_summary(&cli, elapsed);
}

fn send_hello(writer: &mut impl Write, cli: &Cli) {
    let hello = format!(
        "h {} {} {} {}\n",
        cli.measurement_type, cli.probes, cli.msg_size, cli.server_delay_ms
    );
    writer.write_all(hello.as_bytes()).expect("send hello");
}

fn expect_line(reader: &mut impl BufRead, expected: &str) {
    let line = read_line(reader).expect("read response line");
    assert_eq!(line, expected, "unexpected server response");
}

fn read_line(reader: &mut impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line)
}

fn cyclic_payload(size: usize) -> String {
    (0..size).map(|i| (b'a' + (i % 26) as u8) as char).collect()
}

fn print_summary(cli: &Cli, elapsed: Duration) {
    match cli.measurement_type {
        MeasurementType::Rtt => {
            let per_probe = elapsed / cli.probes.max(1) as u32;
            println!(
                "RTT measured with {} probes of {} bytes: {:.3}ms per probe",
                cli.probes,
                cli.msg_size,
                per_probe.as_secs_f64() * 1000.0
            );
        }
        MeasurementType::Thput => {
            let bytes = cli.probes * cli.msg_size;
            let kbps = (bytes as f64 * 8.0 / 1000.0) / elapsed.as_secs_f64().max(1e-9);
            println!(
                "Throughput measured with {} probes of {} bytes: {kbps:.3}kbps",
                cli.probes, cli.msg_size
            );
        }
    }
}
