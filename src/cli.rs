//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Parse a duration given in whole seconds
fn parse_seconds(s: &str) -> Result<u64, String> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| format!("Invalid number of seconds: {}", e))
}

#[derive(Parser)]
#[command(name = "nandump")]
#[command(author, version, about = "Capture raw NAND dumps streamed over a serial link", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Serial port or connection string (dev=<port>[:baud], ip=<host:port>,
    /// replay=<file>, dummy); auto-detected if not specified
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = 921_600)]
    pub baud: u32,

    /// Output file for the dump
    #[arg(short, long, default_value = "nand_raw_dump.bin")]
    pub output: PathBuf,

    /// Interactive terminal mode (no dump capture)
    #[arg(short, long)]
    pub interactive: bool,

    /// Skip the version query before the dump
    #[arg(long)]
    pub no_version_check: bool,

    /// Seconds to wait for DUMP_START
    #[arg(long, default_value = "10", value_parser = parse_seconds)]
    pub start_timeout: u64,

    /// Seconds without any data before giving up (0 waits forever)
    #[arg(long, default_value = "60", value_parser = parse_seconds)]
    pub idle_timeout: u64,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}
