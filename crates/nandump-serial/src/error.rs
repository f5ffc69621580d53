//! Error types for port discovery and connection strings

use nandump_core::LinkError;
use thiserror::Error;

/// Serial-side errors outside of a running link
#[derive(Debug, Error)]
pub enum SerialError {
    /// Malformed connection string
    #[error("Invalid connection string: {0}")]
    InvalidSpec(String),

    /// None of the probed ports could be opened
    #[error("No serial port found, use --port")]
    NoPortFound,

    /// Opening the link failed
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
}

/// Result type for serial operations
pub type Result<T> = core::result::Result<T, SerialError>;

/// Map an open-time port error to a link error
pub(crate) fn open_failed(device: &str, e: serialport::Error) -> LinkError {
    LinkError::ConnectionFailed(format!("{}: {}", device, e))
}

/// Map a port error raised on an open link
pub(crate) fn port_failed(e: serialport::Error) -> LinkError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => LinkError::Closed,
        serialport::ErrorKind::Io(kind) => LinkError::from(std::io::Error::new(kind, e.description)),
        _ => LinkError::IoError(e.to_string()),
    }
}
