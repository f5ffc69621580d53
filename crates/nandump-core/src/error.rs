//! Error types for link and capture operations

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::stats::CaptureStats;

/// Errors raised by a [`ByteLink`](crate::link::ByteLink)
#[derive(Debug, Error)]
pub enum LinkError {
    /// Failed to open or connect to the device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The device accepted fewer bytes than were written
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes handed to the link
        expected: usize,
        /// Bytes the link accepted
        written: usize,
    },

    /// The device or peer went away
    #[error("Link closed")]
    Closed,

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result type for link operations
pub type LinkResult<T> = core::result::Result<T, LinkError>;

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => LinkError::Closed,
            _ => LinkError::IoError(e.to_string()),
        }
    }
}

/// Reason a capture session ended in the `Failed` state
#[derive(Debug, Error)]
pub enum CaptureFailure {
    /// `DUMP_START` was not seen in time
    #[error("no device response: DUMP_START not received within {timeout:?}")]
    HandshakeTimeout {
        /// The start timeout that expired
        timeout: Duration,
    },

    /// The stream stopped before `DUMP_END`
    #[error("stream ended before DUMP_END: {0}")]
    PrematureEndOfStream(&'static str),

    /// The caller cancelled the session
    #[error("capture cancelled")]
    Cancelled,

    /// The session already ran once
    #[error("session already used")]
    SessionReused,

    /// Link failure other than the peer going away
    #[error("link error: {0}")]
    Link(#[source] LinkError),

    /// Writing the output file failed
    #[error("output error: {0}")]
    Output(#[from] io::Error),
}

impl From<LinkError> for CaptureFailure {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Closed => CaptureFailure::PrematureEndOfStream("link closed"),
            other => CaptureFailure::Link(other),
        }
    }
}

/// Fatal capture error with the totals reached before the failure
#[derive(Debug, Error)]
#[error(
    "{} (after {} pages, {} bytes)",
    .reason,
    .stats.pages_captured,
    .stats.bytes_captured
)]
pub struct CaptureError {
    /// What went wrong
    #[source]
    pub reason: CaptureFailure,
    /// Partial totals
    pub stats: CaptureStats,
}

/// Result type for capture operations
pub type Result<T> = core::result::Result<T, CaptureError>;
