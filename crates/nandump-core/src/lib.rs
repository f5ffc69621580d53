//! nandump-core - NAND dump stream decoding and capture sessions
//!
//! This crate receives a raw NAND image streamed by the dump firmware over a
//! byte link and writes the page payloads to an output file.
//!
//! # Stream Overview
//!
//! After the host sends `D`, the device answers with text lines up to
//! `DUMP_START` and a geometry line, then sends page records back to back:
//!
//! ```text
//! [len u32 LE][row u24 LE][payload: len bytes]      page record
//! [FF FF FF FF]['E' 'R' 'R']                       page read error
//! \r\nBLK=XXXXXXXX\r\n                             progress, every 64 blocks
//! DUMP_END\r\n                                     end of dump
//! ```
//!
//! Text and binary data are not framed apart; see [`frame`] for how units
//! are told apart.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use nandump_core::{run_capture, CaptureConfig, NoObserver, ReplayLink};
//!
//! let link = ReplayLink::from_file(Path::new("serial_capture.raw"))?;
//! let stats = run_capture(link, Path::new("nand.bin"), CaptureConfig::default(), &mut NoObserver)?;
//! println!("{} pages, {} bytes", stats.pages_captured, stats.bytes_captured);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod frame;
pub mod line;
pub mod link;
pub mod observer;
pub mod protocol;
pub mod reader;
pub mod session;
pub mod sink;
pub mod stats;

// Re-exports
pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureFailure, LinkError, LinkResult, Result};
pub use frame::{Frame, FrameDecoder};
pub use link::{ByteLink, EndOfScript, ReplayLink};
pub use observer::{CaptureObserver, NoObserver};
pub use protocol::{ControlLine, PageHeader, PageRecord};
pub use reader::StreamReader;
pub use session::{query_version, run_capture, CancelToken, CaptureSession, SessionState};
pub use sink::{FileSink, OutputSink};
pub use stats::CaptureStats;
