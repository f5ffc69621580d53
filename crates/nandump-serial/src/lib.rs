//! nandump-serial - Serial and network links to the dump device
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyUSB0`, `/dev/ttyACM0`, `COM3`, etc.
//! - TCP socket: `ip=host:port`, for serial-to-network bridges
//!
//! # Example
//!
//! ```no_run
//! use nandump_core::ByteLink;
//! use nandump_serial::SerialLink;
//!
//! let mut link = SerialLink::open("/dev/ttyUSB0", Some(921_600))?;
//! link.write(b"V")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod connection;
pub mod error;
pub mod probe;
pub mod transport;

// Re-exports
pub use connection::LinkSpec;
pub use error::{Result, SerialError};
pub use probe::{list_ports, probe_port, PortSummary, PROBE_CANDIDATES};
pub use transport::serial::{SerialLink, DEFAULT_BAUD};
pub use transport::tcp::TcpLink;
