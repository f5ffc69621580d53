//! Connection strings
//!
//! Formats:
//! - `dev=/dev/ttyUSB0` - serial port at the default baud rate
//! - `dev=/dev/ttyUSB0:921600` - serial port at the given baud rate
//! - `ip=host:port` - TCP bridge
//! - `replay=capture.raw` - recorded raw serial stream
//! - `dummy` - built-in emulator
//! - anything else is taken as a serial device path

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, SerialError};

/// Where to get the dump stream from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSpec {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyUSB0" or "COM3")
        device: String,
        /// Baud rate (None for the firmware default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
    /// Raw stream recorded to a file
    Replay {
        /// Recording path
        path: PathBuf,
    },
    /// Built-in device emulator
    Dummy,
}

impl LinkSpec {
    /// Parse a connection string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SerialError::InvalidSpec("empty connection string".into()));
        }

        if let Some(dev) = s.strip_prefix("dev=") {
            match dev.rsplit_once(':') {
                // keep Windows-style "COM3" and paths with colons intact
                Some((device, baud_str))
                    if !device.is_empty() && baud_str.chars().all(|c| c.is_ascii_digit()) =>
                {
                    let baud = baud_str
                        .parse()
                        .map_err(|_| SerialError::InvalidSpec(format!("Invalid baud rate: {}", baud_str)))?;
                    Ok(LinkSpec::Serial {
                        device: device.to_string(),
                        baud: Some(baud),
                    })
                }
                _ if dev.is_empty() => Err(SerialError::InvalidSpec("Missing device in dev= parameter".into())),
                _ => Ok(LinkSpec::Serial {
                    device: dev.to_string(),
                    baud: None,
                }),
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = ip
                .rsplit_once(':')
                .ok_or_else(|| SerialError::InvalidSpec("Missing port in ip= parameter".into()))?;
            let port = port_str
                .parse()
                .map_err(|_| SerialError::InvalidSpec(format!("Invalid port: {}", port_str)))?;
            Ok(LinkSpec::Tcp {
                host: host.to_string(),
                port,
            })
        } else if let Some(path) = s.strip_prefix("replay=") {
            if path.is_empty() {
                return Err(SerialError::InvalidSpec("Missing file in replay= parameter".into()));
            }
            Ok(LinkSpec::Replay {
                path: PathBuf::from(path),
            })
        } else if s == "dummy" {
            Ok(LinkSpec::Dummy)
        } else if s.contains('=') {
            Err(SerialError::InvalidSpec(format!(
                "{}. Use dev=..., ip=..., replay=..., dummy or a device path",
                s
            )))
        } else {
            Ok(LinkSpec::Serial {
                device: s.to_string(),
                baud: None,
            })
        }
    }

    /// Use `baud` when the string did not name one
    pub fn with_default_baud(self, baud: u32) -> Self {
        match self {
            LinkSpec::Serial { device, baud: None } => LinkSpec::Serial {
                device,
                baud: Some(baud),
            },
            other => other,
        }
    }
}

impl FromStr for LinkSpec {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSpec::Serial { device, baud: None } => write!(f, "dev={}", device),
            LinkSpec::Serial {
                device,
                baud: Some(baud),
            } => write!(f, "dev={}:{}", device, baud),
            LinkSpec::Tcp { host, port } => write!(f, "ip={}:{}", host, port),
            LinkSpec::Replay { path } => write!(f, "replay={}", path.display()),
            LinkSpec::Dummy => write!(f, "dummy"),
        }
    }
}
