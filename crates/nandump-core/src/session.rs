//! Capture session state machine
//!
//! A [`CaptureSession`] drives one dump attempt over a link:
//!
//! ```text
//! Idle -> AwaitingStart -> AwaitingGeometry -> Streaming -> Completed
//!              |                                   |
//!              +------------> Failed <-------------+
//! ```
//!
//! There is no retry inside the session; a caller wanting another attempt
//! creates a new session.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureFailure, LinkResult, Result};
use crate::frame::{Frame, FrameDecoder};
use crate::line::wait_for_line;
use crate::link::ByteLink;
use crate::observer::CaptureObserver;
use crate::protocol::{CMD_DUMP, CMD_VERSION, DUMP_START, GEOMETRY_PREFIX};
use crate::reader::StreamReader;
use crate::sink::{FileSink, OutputSink};
use crate::stats::CaptureStats;

/// Read window for the version answer
const VERSION_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    Idle,
    /// Dump command sent, waiting for `DUMP_START`
    AwaitingStart,
    /// Waiting for the geometry line
    AwaitingGeometry,
    /// Decoding page records
    Streaming,
    /// `DUMP_END` received
    Completed,
    /// Ended with a fatal error
    Failed,
}

/// Cooperative cancellation flag, checked between decoded units
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One dump attempt over a link
pub struct CaptureSession<L: ByteLink> {
    reader: StreamReader<L>,
    decoder: FrameDecoder,
    config: CaptureConfig,
    state: SessionState,
    stats: CaptureStats,
    geometry: Option<String>,
    cancel: Option<CancelToken>,
}

impl<L: ByteLink> CaptureSession<L> {
    /// Create a session; nothing is sent until it is run
    pub fn new(link: L, config: CaptureConfig) -> Self {
        Self {
            reader: StreamReader::new(link),
            decoder: FrameDecoder::new(config.clone()),
            config,
            state: SessionState::Idle,
            stats: CaptureStats::default(),
            geometry: None,
            cancel: None,
        }
    }

    /// Abort the session when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Totals so far
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Geometry line sent by the device, if any
    pub fn geometry(&self) -> Option<&str> {
        self.geometry.as_deref()
    }

    /// Give the link back
    pub fn into_link(self) -> L {
        self.reader.into_inner()
    }

    /// Run the whole dump, appending payloads to `sink`
    pub fn run<S, O>(&mut self, sink: &mut S, observer: &mut O) -> Result<CaptureStats>
    where
        S: OutputSink + ?Sized,
        O: CaptureObserver + ?Sized,
    {
        if let Err(err) = self.handshake(observer) {
            if let Err(e) = sink.finish() {
                log::warn!("Failed to flush output: {}", e);
            }
            return Err(err);
        }
        let result = self.stream(sink, observer);
        if let Err(e) = sink.finish() {
            return match result {
                Ok(_) => Err(self.fail(CaptureFailure::Output(e), observer)),
                Err(err) => {
                    log::warn!("Failed to flush output: {}", e);
                    Err(err)
                }
            };
        }
        result
    }

    /// Run the whole dump into a file
    ///
    /// The file is only created once `DUMP_START` has been received, so a
    /// failed handshake leaves the file system untouched. The file is
    /// flushed and closed on every exit path.
    pub fn capture_to_file<O>(&mut self, output: &Path, observer: &mut O) -> Result<CaptureStats>
    where
        O: CaptureObserver + ?Sized,
    {
        self.handshake(observer)?;
        let mut sink = match FileSink::create(output) {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail(CaptureFailure::Output(e), observer)),
        };
        self.run(&mut sink, observer)
    }

    /// Send the dump command and wait for `DUMP_START` and the geometry line
    fn handshake<O: CaptureObserver + ?Sized>(&mut self, observer: &mut O) -> Result<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Streaming => return Ok(()),
            _ => return Err(self.fail(CaptureFailure::SessionReused, observer)),
        }

        match self.negotiate() {
            Ok(()) => {
                observer.handshake_complete(self.geometry.as_deref());
                Ok(())
            }
            Err(reason) => Err(self.fail(reason, observer)),
        }
    }

    fn negotiate(&mut self) -> core::result::Result<(), CaptureFailure> {
        self.state = SessionState::AwaitingStart;
        log::info!("Sending '{}' command to start dump...", CMD_DUMP as char);
        self.reader.write(&[CMD_DUMP])?;

        if wait_for_line(&mut self.reader, DUMP_START, self.config.start_timeout)?.is_none() {
            log::error!("Did not receive {}. Is the NAND connected?", DUMP_START);
            return Err(CaptureFailure::HandshakeTimeout {
                timeout: self.config.start_timeout,
            });
        }

        self.state = SessionState::AwaitingGeometry;
        self.geometry = wait_for_line(
            &mut self.reader,
            GEOMETRY_PREFIX,
            self.config.geometry_timeout,
        )?;
        match &self.geometry {
            Some(geometry) => log::debug!("Device geometry: {}", geometry),
            None => log::warn!("No geometry line received, continuing"),
        }

        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Decode units until `DUMP_END`
    fn stream<S, O>(&mut self, sink: &mut S, observer: &mut O) -> Result<CaptureStats>
    where
        S: OutputSink + ?Sized,
        O: CaptureObserver + ?Sized,
    {
        if self.state != SessionState::Streaming {
            return Err(self.fail(CaptureFailure::SessionReused, observer));
        }

        let start = Instant::now();
        let result = self.stream_frames(sink, observer, start);
        self.stats.elapsed = start.elapsed();

        match result {
            Ok(()) => {
                self.state = SessionState::Completed;
                log::info!(
                    "Dump complete: {} pages, {} bytes, {} page errors in {:.1} s",
                    self.stats.pages_captured,
                    self.stats.bytes_captured,
                    self.stats.error_count,
                    self.stats.elapsed_secs()
                );
                observer.completed(&self.stats);
                Ok(self.stats.clone())
            }
            Err(reason) => Err(self.fail(reason, observer)),
        }
    }

    fn stream_frames<S, O>(
        &mut self,
        sink: &mut S,
        observer: &mut O,
        start: Instant,
    ) -> core::result::Result<(), CaptureFailure>
    where
        S: OutputSink + ?Sized,
        O: CaptureObserver + ?Sized,
    {
        let mut last_activity = Instant::now();

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(CaptureFailure::Cancelled);
            }

            let frame = self.decoder.next_frame(&mut self.reader)?;
            self.stats.elapsed = start.elapsed();
            if frame != Frame::Idle {
                last_activity = Instant::now();
            }

            match frame {
                Frame::Page(record) => {
                    sink.append(&record.payload)?;
                    self.stats.pages_captured += 1;
                    self.stats.bytes_captured += record.payload.len() as u64;
                    self.stats.last_row = Some(record.header.row_address);
                    log::trace!(
                        "Row 0x{:06X}: {} bytes",
                        record.header.row_address,
                        record.payload.len()
                    );
                    observer.page_captured(&record.header, &self.stats);
                }
                Frame::DeviceError(header) => {
                    self.stats.error_count += 1;
                    let diagnostic = header.payload_length;
                    log::warn!("Page read error (row data = 0x{:08X})", diagnostic);
                    observer.device_error(diagnostic, &self.stats);
                }
                Frame::InvalidHeader(header) => {
                    self.stats.invalid_headers += 1;
                    log::warn!(
                        "Invalid page_bytes={}, skipping...",
                        header.payload_length
                    );
                    observer.invalid_header(&header);
                }
                Frame::Progress(blocks) => {
                    for block in blocks {
                        self.stats.last_block = Some(block);
                        log::debug!("Block {}", block);
                        observer.progress(block, &self.stats);
                    }
                }
                Frame::Unrecognized(text) => {
                    self.stats.unrecognized_frames += 1;
                    let preview: String = text.chars().take(80).collect();
                    log::warn!("Unexpected data: {:?}", preview);
                    observer.unrecognized(&text);
                }
                Frame::EndSentinel => {
                    log::info!("DUMP_END received.");
                    return Ok(());
                }
                Frame::Idle => {
                    if let Some(limit) = self.config.idle_timeout {
                        if last_activity.elapsed() >= limit {
                            log::error!("No data from device for {:?}", limit);
                            return Err(CaptureFailure::PrematureEndOfStream(
                                "device stopped sending",
                            ));
                        }
                    }
                }
            }
        }
    }

    fn fail<O: CaptureObserver + ?Sized>(
        &mut self,
        reason: CaptureFailure,
        observer: &mut O,
    ) -> CaptureError {
        self.state = SessionState::Failed;
        let error = CaptureError {
            reason,
            stats: self.stats.clone(),
        };
        log::error!("Capture failed: {}", error);
        observer.failed(&error);
        error
    }
}

/// Capture a full dump from `link` into the file at `output`
pub fn run_capture<L, O>(
    link: L,
    output: &Path,
    config: CaptureConfig,
    observer: &mut O,
) -> Result<CaptureStats>
where
    L: ByteLink,
    O: CaptureObserver + ?Sized,
{
    CaptureSession::new(link, config).capture_to_file(output, observer)
}

/// Ask the device for its version string
///
/// Sends `V`, waits `settle` for the answer to arrive and returns whatever
/// text was received, trimmed.
pub fn query_version<L: ByteLink + ?Sized>(link: &mut L, settle: Duration) -> LinkResult<String> {
    link.write(&[CMD_VERSION])?;
    link.flush()?;
    thread::sleep(settle);

    let mut buf = [0u8; 256];
    let n = link.read_up_to(&mut buf, VERSION_READ_TIMEOUT)?;
    Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{EndOfScript, ReplayLink};
    use crate::observer::NoObserver;
    use crate::protocol::{PageHeader, PageRecord};
    use tempfile::TempDir;

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            start_timeout: Duration::from_millis(50),
            geometry_timeout: Duration::from_millis(50),
            read_timeout: Duration::from_millis(20),
            payload_stall_timeout: Duration::from_millis(30),
            idle_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        }
    }

    fn record(len: u32, row: u32, fill: u8) -> PageRecord {
        PageRecord {
            header: PageHeader::page(len, row),
            payload: vec![fill; len as usize],
        }
    }

    fn push_record(stream: &mut Vec<u8>, record: &PageRecord) {
        stream.extend_from_slice(&record.header.encode());
        stream.extend_from_slice(&record.payload);
    }

    fn preamble() -> Vec<u8> {
        b"D\r\nDUMP_START\r\n  page_data=00000800 spare=00000040 pages/blk=00000040 blocks=00001000\r\n"
            .to_vec()
    }

    #[derive(Default)]
    struct Recorder {
        geometry: Option<String>,
        rows: Vec<u32>,
        blocks: Vec<u32>,
        device_errors: usize,
        invalid: usize,
        unrecognized: Vec<String>,
        completed: bool,
        failed: bool,
    }

    impl CaptureObserver for Recorder {
        fn handshake_complete(&mut self, geometry: Option<&str>) {
            self.geometry = geometry.map(str::to_string);
        }
        fn page_captured(&mut self, header: &PageHeader, _stats: &CaptureStats) {
            self.rows.push(header.row_address);
        }
        fn device_error(&mut self, _diagnostic: u32, _stats: &CaptureStats) {
            self.device_errors += 1;
        }
        fn invalid_header(&mut self, _header: &PageHeader) {
            self.invalid += 1;
        }
        fn unrecognized(&mut self, text: &str) {
            self.unrecognized.push(text.to_string());
        }
        fn progress(&mut self, block: u32, _stats: &CaptureStats) {
            self.blocks.push(block);
        }
        fn completed(&mut self, _stats: &CaptureStats) {
            self.completed = true;
        }
        fn failed(&mut self, _error: &CaptureError) {
            self.failed = true;
        }
    }

    #[test]
    fn test_two_page_dump() {
        let first = record(2048, 0x000001, 0x11);
        let second = record(2048, 0x000002, 0x22);
        let mut stream = preamble();
        push_record(&mut stream, &first);
        stream.extend_from_slice(b"BLK=1\n");
        push_record(&mut stream, &second);
        stream.extend_from_slice(b"DUMP_END\r\n");

        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config());
        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let stats = session.run(&mut out, &mut recorder).unwrap();

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(stats.pages_captured, 2);
        assert_eq!(stats.bytes_captured, 4096);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.last_block, Some(1));
        assert_eq!(out[..2048], first.payload[..]);
        assert_eq!(out[2048..], second.payload[..]);
        assert_eq!(recorder.rows, vec![1, 2]);
        assert_eq!(recorder.blocks, vec![1]);
        assert!(recorder.completed);
        assert_eq!(
            recorder.geometry.as_deref(),
            Some("page_data=00000800 spare=00000040 pages/blk=00000040 blocks=00001000")
        );
        assert_eq!(session.into_link().written(), b"D");
    }

    #[test]
    fn test_error_records_add_no_bytes() {
        let page = record(512, 9, 0x77);
        let mut stream = preamble();
        stream.extend_from_slice(&PageHeader::error(0xFFFF_FFFF).encode());
        push_record(&mut stream, &page);
        stream.extend_from_slice(&PageHeader::error(0xFFFF_FFFF).encode());
        stream.extend_from_slice(b"DUMP_END\r\n");

        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config());
        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let stats = session.run(&mut out, &mut recorder).unwrap();

        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.pages_captured, 1);
        assert_eq!(out, page.payload);
        assert_eq!(recorder.device_errors, 2);
    }

    #[test]
    fn test_invalid_header_skipped() {
        let page = record(128, 4, 0x01);
        let mut stream = preamble();
        stream.extend_from_slice(&PageHeader::page(0, 3).encode());
        push_record(&mut stream, &page);
        stream.extend_from_slice(b"DUMP_END\r\n");

        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config());
        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let stats = session.run(&mut out, &mut recorder).unwrap();

        assert_eq!(stats.invalid_headers, 1);
        assert_eq!(stats.pages_captured, 1);
        assert_eq!(recorder.invalid, 1);
        assert_eq!(out, page.payload);
    }

    #[test]
    fn test_handshake_timeout() {
        let link = ReplayLink::from_bytes(*b"D\r\nERR:DUMP_ID_FAIL\r\n> ")
            .end_with(EndOfScript::Silence);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.bin");

        let mut session = CaptureSession::new(link, test_config());
        let mut recorder = Recorder::default();
        let err = session.capture_to_file(&path, &mut recorder).unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::HandshakeTimeout { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(err.stats, CaptureStats::default());
        assert!(recorder.failed);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_geometry_is_tolerated() {
        let link = ReplayLink::from_bytes(*b"D\r\nDUMP_START\r\n").end_with(EndOfScript::Silence);

        let mut session = CaptureSession::new(link, test_config());
        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let err = session.run(&mut out, &mut recorder).unwrap_err();

        // handshake went through, then the silent device hit the idle bound
        assert_eq!(session.geometry(), None);
        assert_eq!(recorder.geometry, None);
        assert!(matches!(err.reason, CaptureFailure::PrematureEndOfStream(_)));
        assert_eq!(err.stats.pages_captured, 0);
    }

    #[test]
    fn test_truncated_payload_leaves_no_fragment() {
        let first = record(1024, 1, 0x10);
        let second = record(1024, 2, 0x20);
        let mut stream = preamble();
        push_record(&mut stream, &first);
        stream.extend_from_slice(&second.header.encode());
        stream.extend_from_slice(&second.payload[..600]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.bin");
        let err = run_capture(
            ReplayLink::from_bytes(stream),
            &path,
            test_config(),
            &mut NoObserver,
        )
        .unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::PrematureEndOfStream(_)));
        assert_eq!(err.stats.pages_captured, 1);
        assert_eq!(err.stats.bytes_captured, 1024);
        assert_eq!(std::fs::read(&path).unwrap(), first.payload);
    }

    #[test]
    fn test_idle_timeout() {
        let mut stream = preamble();
        push_record(&mut stream, &record(32, 1, 0));
        let link = ReplayLink::from_bytes(stream).end_with(EndOfScript::Silence);

        let mut session = CaptureSession::new(link, test_config());
        let mut out = Vec::new();
        let err = session.run(&mut out, &mut NoObserver).unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::PrematureEndOfStream(_)));
        assert_eq!(err.stats.pages_captured, 1);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_cancel_between_units() {
        let mut stream = preamble();
        push_record(&mut stream, &record(32, 1, 0));
        stream.extend_from_slice(b"DUMP_END\r\n");

        let token = CancelToken::new();
        token.cancel();
        let mut session =
            CaptureSession::new(ReplayLink::from_bytes(stream), test_config()).with_cancel(token);
        let mut out = Vec::new();
        let err = session.run(&mut out, &mut NoObserver).unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::Cancelled));
        assert!(out.is_empty());
    }

    #[test]
    fn test_cancel_keeps_completed_pages_in_file() {
        let mut stream = preamble();
        for row in 1..=3 {
            push_record(&mut stream, &record(512, row, row as u8));
        }
        stream.extend_from_slice(b"DUMP_END\r\n");

        struct CancelAfterFirst(CancelToken);
        impl CaptureObserver for CancelAfterFirst {
            fn handshake_complete(&mut self, _geometry: Option<&str>) {}
            fn page_captured(&mut self, _header: &PageHeader, _stats: &CaptureStats) {
                self.0.cancel();
            }
            fn device_error(&mut self, _diagnostic: u32, _stats: &CaptureStats) {}
            fn invalid_header(&mut self, _header: &PageHeader) {}
            fn unrecognized(&mut self, _text: &str) {}
            fn progress(&mut self, _block: u32, _stats: &CaptureStats) {}
            fn completed(&mut self, _stats: &CaptureStats) {}
            fn failed(&mut self, _error: &CaptureError) {}
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.bin");
        let token = CancelToken::new();
        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config())
            .with_cancel(token.clone());
        let err = session
            .capture_to_file(&path, &mut CancelAfterFirst(token))
            .unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::Cancelled));
        assert_eq!(err.stats.pages_captured, 1);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 512]);
    }

    #[test]
    fn test_sink_finished_after_handshake_timeout() {
        #[derive(Default)]
        struct CountingSink {
            finished: usize,
        }
        impl OutputSink for CountingSink {
            fn append(&mut self, _payload: &[u8]) -> std::io::Result<()> {
                Ok(())
            }
            fn finish(&mut self) -> std::io::Result<()> {
                self.finished += 1;
                Ok(())
            }
        }

        let link = ReplayLink::from_bytes(*b"D\r\n> ").end_with(EndOfScript::Silence);
        let mut sink = CountingSink::default();
        let err = CaptureSession::new(link, test_config())
            .run(&mut sink, &mut NoObserver)
            .unwrap_err();

        assert!(matches!(err.reason, CaptureFailure::HandshakeTimeout { .. }));
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn test_printable_invalid_header_keeps_next_page() {
        let page = record(16, 0x000010, 0x5C);
        let mut stream = preamble();
        stream.extend_from_slice(&PageHeader::page(0x2020_2020, 0x202020).encode());
        push_record(&mut stream, &page);
        stream.extend_from_slice(b"DUMP_END\r\n");

        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config());
        let mut recorder = Recorder::default();
        let mut out = Vec::new();
        let stats = session.run(&mut out, &mut recorder).unwrap();

        assert_eq!(stats.invalid_headers, 1);
        assert_eq!(stats.pages_captured, 1);
        assert_eq!(recorder.rows, vec![0x000010]);
        assert_eq!(out, page.payload);
    }

    #[test]
    fn test_session_is_single_use() {
        let mut stream = preamble();
        stream.extend_from_slice(b"DUMP_END\r\n");
        let mut session = CaptureSession::new(ReplayLink::from_bytes(stream), test_config());
        let mut out = Vec::new();
        session.run(&mut out, &mut NoObserver).unwrap();

        let err = session.run(&mut out, &mut NoObserver).unwrap_err();
        assert!(matches!(err.reason, CaptureFailure::SessionReused));
    }

    #[test]
    fn test_query_version() {
        let mut link = ReplayLink::from_bytes(*b"V\r\nVERSION=0x4E414E44\r\n> ");
        let answer = query_version(&mut link, Duration::ZERO).unwrap();
        assert_eq!(answer, "V\r\nVERSION=0x4E414E44\r\n>");
        assert_eq!(link.written(), b"V");
    }
}
