//! List commands implementation

use nandump_serial::{list_ports, PROBE_CANDIDATES};

/// List the serial ports known to the system
pub fn list_serial_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = list_ports()?;

    println!("Serial ports:");
    println!();
    if ports.is_empty() {
        println!("  (none found)");
    }
    for port in &ports {
        let probed = if PROBE_CANDIDATES.contains(&port.name.as_str()) {
            " *"
        } else {
            ""
        };
        println!("  {:<20} {}{}", port.name, port.kind, probed);
    }
    println!();
    println!("Auto-detection tries {} first (marked *), then the rest.", PROBE_CANDIDATES.join(", "));
    println!("Other links: dev=<port>[:baud], ip=<host:port>, replay=<file>, dummy");

    Ok(())
}
