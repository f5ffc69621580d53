//! Capture counters

use std::time::Duration;

/// Totals accumulated by a capture session
///
/// Returned on success and attached to every [`CaptureError`](crate::error::CaptureError).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Pages appended to the output
    pub pages_captured: u64,
    /// Payload bytes appended to the output
    pub bytes_captured: u64,
    /// Error records reported by the device
    pub error_count: u64,
    /// Headers rejected by the length check
    pub invalid_headers: u64,
    /// Units that were neither a header nor a known text line
    pub unrecognized_frames: u64,
    /// Last block index seen in a progress line
    pub last_block: Option<u32>,
    /// Row address of the last captured page
    pub last_row: Option<u32>,
    /// Time spent streaming
    pub elapsed: Duration,
}

impl CaptureStats {
    /// Elapsed streaming time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Average payload throughput in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed_secs();
        if secs > 0.0 {
            self.bytes_captured as f64 / secs
        } else {
            0.0
        }
    }
}
