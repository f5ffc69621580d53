//! Capture progress reporting
//!
//! The session never prints; everything a user might want to see is passed
//! to a [`CaptureObserver`].

use crate::error::CaptureError;
use crate::protocol::PageHeader;
use crate::stats::CaptureStats;

/// Callbacks invoked by a capture session
pub trait CaptureObserver {
    /// `DUMP_START` was received; `geometry` is the geometry line if one arrived
    fn handshake_complete(&mut self, geometry: Option<&str>);

    /// A page was appended to the output
    fn page_captured(&mut self, header: &PageHeader, stats: &CaptureStats);

    /// The device reported a page read error
    fn device_error(&mut self, diagnostic: u32, stats: &CaptureStats);

    /// A header failed the length check and was skipped
    fn invalid_header(&mut self, header: &PageHeader);

    /// Text that could not be classified
    fn unrecognized(&mut self, text: &str);

    /// A `BLK=` progress line
    fn progress(&mut self, block: u32, stats: &CaptureStats);

    /// `DUMP_END` was received
    fn completed(&mut self, stats: &CaptureStats);

    /// The session failed
    fn failed(&mut self, error: &CaptureError);
}

/// A no-op observer
pub struct NoObserver;

impl CaptureObserver for NoObserver {
    fn handshake_complete(&mut self, _geometry: Option<&str>) {}
    fn page_captured(&mut self, _header: &PageHeader, _stats: &CaptureStats) {}
    fn device_error(&mut self, _diagnostic: u32, _stats: &CaptureStats) {}
    fn invalid_header(&mut self, _header: &PageHeader) {}
    fn unrecognized(&mut self, _text: &str) {}
    fn progress(&mut self, _block: u32, _stats: &CaptureStats) {}
    fn completed(&mut self, _stats: &CaptureStats) {}
    fn failed(&mut self, _error: &CaptureError) {}
}
