//! CLI command implementations
//!
//! - `capture`: the dump itself, with a live status line and a summary
//! - `terminal`: interactive pass-through to the device
//! - `list`: serial port listing

pub mod capture;
mod list;
pub mod terminal;

pub use list::list_serial_ports;
