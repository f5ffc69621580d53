//! Capture session configuration

use std::time::Duration;

use crate::protocol::MAX_PAGE_BYTES;

/// Timeouts and limits of a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// How long to wait for `DUMP_START` after sending the dump command
    pub start_timeout: Duration,
    /// How long to wait for the geometry line (a timeout is tolerated)
    pub geometry_timeout: Duration,
    /// Window for a single header, text or payload read
    pub read_timeout: Duration,
    /// Extra bytes read after a short header read to look for text
    pub text_window: usize,
    /// Largest single read while pulling a page payload
    pub payload_chunk: usize,
    /// Pause before retrying an empty payload read
    pub payload_retry_delay: Duration,
    /// Give up on a payload when no byte arrives for this long
    pub payload_stall_timeout: Duration,
    /// Give up when the device sends nothing at all for this long (`None` waits forever)
    pub idle_timeout: Option<Duration>,
    /// Largest accepted page length
    pub max_page_bytes: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(10),
            geometry_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            text_window: 64,
            payload_chunk: 4096,
            payload_retry_delay: Duration::from_millis(1),
            payload_stall_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(60)),
            max_page_bytes: MAX_PAGE_BYTES,
        }
    }
}
