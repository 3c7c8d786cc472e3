//! # keybusd
//!
//! Keybus keypad emulator daemon.
//!
//! Loads the TOML configuration, performs real-time setup and runs the
//! sampler, decoder, predictor and command responder until it receives
//! SIGINT or SIGTERM. With `--simulate` the sampler runs against a
//! built-in panel instead of the GPIO block.

use clap::Parser;
use keybus_common::config::{ConfigError, ConfigLoader, KeybusConfig, LogLevel};
use keybus_common::consts::DEFAULT_CONFIG_PATH;
use keybus_transceiver::runtime::{self, BusMode};
use std::path::PathBuf;
use std::process;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Keybus keypad emulator
#[derive(Parser, Debug)]
#[command(name = "keybusd")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Real-time keybus keypad emulator with a TCP command interface")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Responder port (overrides `[responder] port`).
    #[arg(long)]
    port: Option<u16>,

    /// Run against the simulated panel instead of GPIO.
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let (mut config, missing) = match KeybusConfig::load(&args.config) {
        Ok(config) => (config, false),
        Err(ConfigError::FileNotFound) => (KeybusConfig::default(), true),
        Err(e) => {
            setup_tracing(&args, LogLevel::Info);
            error!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, config.shared.log_level);

    info!("keybusd v{} starting...", env!("CARGO_PKG_VERSION"));
    if missing {
        warn!(
            "No configuration at {}; using defaults",
            args.config.display()
        );
    }

    if let Some(port) = args.port {
        config.responder.port = port;
    }

    if let Err(e) = ctrlc::set_handler(|| {
        info!("Received shutdown signal");
        process::exit(0);
    }) {
        error!("FATAL: signal handler: {e}");
        process::exit(1);
    }

    let mode = if args.simulate {
        BusMode::Simulated
    } else {
        BusMode::Hardware
    };
    info!(
        service = %config.shared.service_name,
        port = config.responder.port,
        ?mode,
        "configuration loaded"
    );

    if let Err(e) = runtime::run(&config, mode) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = EnvFilter::from_default_env();
    let filter = if args.verbose {
        filter.add_directive(Level::DEBUG.into())
    } else {
        match configured.as_directive().parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter.add_directive(Level::INFO.into()),
        }
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
