//! Dump capture command

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use nandump_core::protocol::{parse_version_word, FPGA_VERSION};
use nandump_core::{
    query_version, ByteLink, CancelToken, CaptureConfig, CaptureError, CaptureObserver,
    CaptureSession, CaptureStats, PageHeader,
};

use crate::links::BoxedLink;

/// Time given to the device to answer the version query
const VERSION_SETTLE: Duration = Duration::from_millis(500);

/// Pages between two row updates of the status line
const ROW_UPDATE_INTERVAL: u64 = 100;

const MIB: f64 = 1024.0 * 1024.0;

/// Create the status spinner style
fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

/// Pages, size and rate
fn summary(stats: &CaptureStats) -> String {
    format!(
        "{} pages | {:.1} MB | {:.1} KB/s",
        stats.pages_captured,
        stats.bytes_captured as f64 / MIB,
        stats.throughput() / 1024.0
    )
}

/// Capture observer showing a live status line
pub struct IndicatifObserver {
    bar: ProgressBar,
}

impl IndicatifObserver {
    /// Start the spinner in the waiting state
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        bar.set_message("Waiting for DUMP_START...");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for IndicatifObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureObserver for IndicatifObserver {
    fn handshake_complete(&mut self, geometry: Option<&str>) {
        if let Some(geometry) = geometry {
            self.bar.println(format!("  Geometry: {}", geometry));
        }
        self.bar.set_message("Receiving pages...");
    }

    fn page_captured(&mut self, header: &PageHeader, stats: &CaptureStats) {
        if stats.pages_captured % ROW_UPDATE_INTERVAL == 0 {
            self.bar
                .set_message(format!("Row 0x{:06X} | {}", header.row_address, summary(stats)));
        }
    }

    fn device_error(&mut self, _diagnostic: u32, _stats: &CaptureStats) {}

    fn invalid_header(&mut self, _header: &PageHeader) {}

    fn unrecognized(&mut self, _text: &str) {}

    fn progress(&mut self, block: u32, stats: &CaptureStats) {
        self.bar
            .set_message(format!("Block {} | {}", block, summary(stats)));
    }

    fn completed(&mut self, _stats: &CaptureStats) {
        self.bar.finish_and_clear();
    }

    fn failed(&mut self, _error: &CaptureError) {
        self.bar.abandon();
    }
}

/// Ask the device for its version and report it
///
/// A missing or unexpected answer is only reported; the dump is attempted
/// anyway.
pub fn check_version<L: ByteLink + ?Sized>(link: &mut L) {
    match query_version(link, VERSION_SETTLE) {
        Ok(answer) => {
            println!("  Version response: {}", answer);
            match parse_version_word(&answer) {
                Some(FPGA_VERSION) => log::debug!("FPGA version OK"),
                Some(other) => log::warn!(
                    "Unexpected FPGA version 0x{:08X} (expected 0x{:08X})",
                    other,
                    FPGA_VERSION
                ),
                None => log::warn!("No version in device answer"),
            }
        }
        Err(e) => log::warn!("Version query failed: {}", e),
    }
}

fn print_summary(title: &str, stats: &CaptureStats, output: &Path) {
    let output = std::fs::canonicalize(output).unwrap_or_else(|_| output.to_path_buf());
    println!();
    println!("{}:", title);
    println!("  Pages:    {}", stats.pages_captured);
    println!("  Size:     {:.1} MB", stats.bytes_captured as f64 / MIB);
    println!("  Time:     {:.1} seconds", stats.elapsed_secs());
    println!("  Rate:     {:.1} KB/s", stats.throughput() / 1024.0);
    if stats.error_count > 0 {
        println!("  Errors:   {} unreadable pages", stats.error_count);
    }
    if stats.invalid_headers + stats.unrecognized_frames > 0 {
        println!(
            "  Skipped:  {} invalid headers, {} unrecognized frames",
            stats.invalid_headers, stats.unrecognized_frames
        );
    }
    println!("  Output:   {}", output.display());
}

/// Capture a full dump from `link` into `output`
///
/// Cancelling `cancel` stops the capture after the current unit; the pages
/// received so far stay in the file.
pub fn run_dump(
    link: BoxedLink,
    output: &Path,
    config: CaptureConfig,
    cancel: CancelToken,
) -> Result<(), CaptureError> {
    let mut observer = IndicatifObserver::new();
    let mut session = CaptureSession::new(link, config).with_cancel(cancel);

    match session.capture_to_file(output, &mut observer) {
        Ok(stats) => {
            print_summary("Dump complete", &stats, output);
            Ok(())
        }
        Err(e) => {
            if e.stats.bytes_captured > 0 {
                print_summary("Partial dump", &e.stats, output);
            }
            Err(e)
        }
    }
}
