//! Link selection
//!
//! Turns the `--port` argument (or the auto-probe result) into an open
//! [`ByteLink`].

use nandump_core::{ByteLink, ReplayLink};
use nandump_serial::{probe_port, LinkSpec, SerialLink, TcpLink, DEFAULT_BAUD};

/// A link that can be moved to another thread
pub type BoxedLink = Box<dyn ByteLink + Send>;

/// Work out which link to open
///
/// Without a port the serial ports are probed and the first one that opens
/// is used.
pub fn resolve(port: Option<&str>, baud: u32) -> Result<LinkSpec, Box<dyn std::error::Error>> {
    match port {
        Some(s) => Ok(LinkSpec::parse(s)?.with_default_baud(baud)),
        None => {
            let device = probe_port(baud)?;
            println!("Auto-detected serial port: {}", device);
            Ok(LinkSpec::Serial {
                device,
                baud: Some(baud),
            })
        }
    }
}

/// Whether the other end of `spec` answers commands
///
/// A replayed recording only plays back what was captured.
pub fn is_interactive(spec: &LinkSpec) -> bool {
    !matches!(spec, LinkSpec::Replay { .. })
}

/// Open the link described by `spec`
pub fn open_link(spec: &LinkSpec) -> Result<BoxedLink, Box<dyn std::error::Error>> {
    match spec {
        LinkSpec::Serial { device, baud } => {
            println!(
                "Opening {} at {} baud...",
                device,
                baud.unwrap_or(DEFAULT_BAUD)
            );
            Ok(Box::new(SerialLink::open(device, *baud)?))
        }
        LinkSpec::Tcp { host, port } => Ok(Box::new(TcpLink::connect(host, *port)?)),
        LinkSpec::Replay { path } => Ok(Box::new(ReplayLink::from_file(path)?)),
        #[cfg(feature = "dummy")]
        LinkSpec::Dummy => {
            log::info!("Using the built-in dummy device");
            Ok(Box::new(nandump_dummy::DummyNand::new_default()))
        }
        #[cfg(not(feature = "dummy"))]
        LinkSpec::Dummy => Err("dummy device support not compiled in".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_applies_baud() {
        let spec = resolve(Some("/dev/ttyUSB3"), 115_200).unwrap();
        assert_eq!(
            spec,
            LinkSpec::Serial {
                device: "/dev/ttyUSB3".into(),
                baud: Some(115_200)
            }
        );
        assert!(is_interactive(&spec));
    }

    #[test]
    fn test_replay_link() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("capture.raw");
        std::fs::write(&path, b"DUMP_START\r\n").unwrap();

        let spec = resolve(Some(&format!("replay={}", path.display())), DEFAULT_BAUD).unwrap();
        assert!(!is_interactive(&spec));
        let link = open_link(&spec).unwrap();
        assert!(link.description().starts_with("replay:"));

        let missing = LinkSpec::Replay {
            path: PathBuf::from("/nonexistent/capture.raw"),
        };
        assert!(open_link(&missing).is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_link() {
        let link = open_link(&resolve(Some("dummy"), DEFAULT_BAUD).unwrap()).unwrap();
        assert_eq!(link.description(), "dummy");
    }
}
