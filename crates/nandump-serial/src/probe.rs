//! Serial port discovery

use std::time::Duration;

use serialport::SerialPortType;

use crate::error::{Result, SerialError};

/// Ports tried first, in order, when no port is given
pub const PROBE_CANDIDATES: &[&str] = &["/dev/ttyUSB1", "/dev/ttyUSB0", "/dev/ttyACM0", "COM4", "COM3"];

/// Timeout used while test-opening a port
const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// A port reported by the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSummary {
    /// Device path or name
    pub name: String,
    /// Human-readable port type
    pub kind: String,
}

/// List the serial ports the system knows about
pub fn list_ports() -> Result<Vec<PortSummary>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortSummary {
            kind: match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    let mut kind = format!("USB {:04x}:{:04x}", usb.vid, usb.pid);
                    if let Some(product) = usb.product {
                        kind.push(' ');
                        kind.push_str(&product);
                    }
                    kind
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "unknown".to_string(),
            },
            name: p.port_name,
        })
        .collect())
}

/// Order in which ports are probed: the fixed candidates, then everything
/// else the system reports
fn probe_order(available: &[String]) -> Vec<String> {
    let mut order: Vec<String> = PROBE_CANDIDATES.iter().map(|s| s.to_string()).collect();
    for name in available {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }
    order
}

/// Find the first port that can be opened at `baud`
///
/// Each port is opened briefly and closed again; nothing is sent.
pub fn probe_port(baud: u32) -> Result<String> {
    let available: Vec<String> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            log::debug!("Port enumeration failed: {}", e);
            Vec::new()
        }
    };

    for name in probe_order(&available) {
        match serialport::new(&name, baud).timeout(PROBE_TIMEOUT).open() {
            Ok(port) => {
                drop(port);
                log::info!("Found serial port {}", name);
                return Ok(name);
            }
            Err(e) => log::trace!("Probe {}: {}", name, e),
        }
    }

    Err(SerialError::NoPortFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_order() {
        let available = vec!["/dev/ttyUSB0".to_string(), "/dev/ttyS0".to_string()];
        let order = probe_order(&available);
        assert_eq!(&order[..5], PROBE_CANDIDATES);
        assert_eq!(order[5..], ["/dev/ttyS0".to_string()]);
    }
}
