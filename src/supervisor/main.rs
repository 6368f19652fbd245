use std::path::PathBuf;

use clap::Parser;
use superserver::error::die;
use superserver::supervisor::Supervisor;

/// Configuration-driven TCP/UDP super-server.
#[derive(Parser, Debug)]
#[command(name = "superserver", about = "Binds configured service ports and spawns handlers on demand")]
struct Cli {
    /// Path to the configuration file. Keep in sync with
    /// `config::DEFAULT_CONFIG_FILE`.
    #[arg(long, value_name = "PATH", default_value = "superserver.conf")]
    config: PathBuf,

    /// Increase log verbosity (-v for debug, -vv for trace). Ignored if
    /// `RUST_LOG` is already set in the environment.
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("loading configuration from {}", cli.config.display());

    let mut supervisor = match Supervisor::bootstrap(&cli.config) {
        Ok(supervisor) => supervisor,
        Err(err) => die(err),
    };

    log::info!("all services bound, entering dispatch loop");
    supervisor.run();
}

fn init_logging(verbose: u8) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    env_logger::init();
}
