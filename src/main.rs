//! nandump - Host receiver for raw NAND dumps
//!
//! Talks to the NAND dump firmware over a serial link (or a TCP bridge),
//! starts a full dump and writes the received page payloads to a file.
//!
//! # Architecture
//!
//! - `nandump-core` decodes the dump stream and drives the capture session
//! - `nandump-serial` provides the serial and TCP links and port probing
//! - `nandump-dummy` emulates the device for dry runs (`--port dummy`)
//!
//! This binary only picks the link, renders progress and prints the summary.

mod cli;
mod commands;
mod links;

use std::time::Duration;

use clap::Parser;
use cli::Cli;
use nandump_core::{CancelToken, CaptureConfig};

/// Capture settings from the command line
fn capture_config(cli: &Cli) -> CaptureConfig {
    CaptureConfig {
        start_timeout: Duration::from_secs(cli.start_timeout),
        idle_timeout: match cli.idle_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if cli.list_ports {
        return commands::list_serial_ports();
    }

    let spec = match links::resolve(cli.port.as_deref(), cli.baud) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let mut link = links::open_link(&spec)?;

    if cli.interactive {
        return commands::terminal::run(link);
    }

    if !cli.no_version_check && links::is_interactive(&spec) {
        commands::capture::check_version(&mut link);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupted, stopping capture...");
            cancel.cancel();
        })?;
    }

    if let Err(e) =
        commands::capture::run_dump(link, &cli.output, capture_config(&cli), cancel)
    {
        eprintln!("\nERROR: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
