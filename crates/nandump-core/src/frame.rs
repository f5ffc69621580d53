//! Frame decoder
//!
//! The dump stream has no framing byte separating binary page records from
//! text lines. Each unit is classified from a 7-byte lookahead window:
//!
//! 1. Read up to [`HEADER_LEN`] bytes within the read timeout.
//! 2. A full window whose last three bytes are `ERR` is an error record; no
//!    payload follows. Otherwise it is a header candidate.
//! 3. A short window means the stream paused, which happens around text
//!    lines: the rest of the line is read (bounded) and decoded as text.
//! 4. A header candidate whose length is outside `(0, max_page_bytes]` is
//!    rejected and never used to size a read. Only a rejected window that
//!    opens a `BLK=` or `DUMP_END` line (after optional CR/LF) is decoded as
//!    text; the firmware sends those back to back with binary data.
//! 5. An accepted header is trusted: exactly `payload_length` bytes are
//!    read, accumulating short reads.

use std::thread;
use std::time::Instant;

use crate::config::CaptureConfig;
use crate::error::{CaptureFailure, LinkError};
use crate::link::ByteLink;
use crate::protocol::{
    ControlLine, PageHeader, PageRecord, DUMP_END, HEADER_LEN, PROGRESS_MARKER,
};
use crate::reader::StreamReader;

/// One decoded unit of the dump stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A page header followed by its complete payload
    Page(PageRecord),
    /// The device could not read a page
    DeviceError(PageHeader),
    /// A header with an out-of-bound length; nothing more was consumed
    InvalidHeader(PageHeader),
    /// Progress lines, one block index per `BLK=` line
    Progress(Vec<u32>),
    /// `DUMP_END` was seen
    EndSentinel,
    /// Text that is neither a sentinel nor a progress line
    Unrecognized(String),
    /// Nothing arrived within the read windows
    Idle,
}

/// Where a window of bytes stands as text
#[derive(Debug, PartialEq, Eq)]
enum TextPrefix {
    /// A complete non-blank line ends before this offset
    Line(usize),
    /// Text so far, without a completed line
    Open,
}

/// Classifies stream units and pulls page payloads
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    config: CaptureConfig,
}

impl FrameDecoder {
    /// Create a decoder using the timeouts and limits of `config`
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Decode the next unit from `reader`
    ///
    /// Only fatal conditions are returned as errors: the link closing before
    /// a unit starts, or a payload that never completes.
    pub fn next_frame<L: ByteLink>(
        &self,
        reader: &mut StreamReader<L>,
    ) -> Result<Frame, CaptureFailure> {
        let window = reader.read_within(HEADER_LEN, self.config.read_timeout)?;

        if window.len() == HEADER_LEN {
            let mut raw = [0u8; HEADER_LEN];
            raw.copy_from_slice(&window);
            let header = PageHeader::decode(&raw);

            if header.is_error {
                return Ok(Frame::DeviceError(header));
            }

            if header.is_valid_within(self.config.max_page_bytes) {
                let payload = self.read_payload(reader, header.payload_length as usize)?;
                return Ok(Frame::Page(PageRecord { header, payload }));
            }

            if !is_inband_line_start(&window) {
                return Ok(Frame::InvalidHeader(header));
            }

            match text_prefix(&window) {
                None => return Ok(Frame::InvalidHeader(header)),
                Some(TextPrefix::Line(end)) => {
                    reader.unread(&window[end..]);
                    return Ok(classify_text(&window[..end]));
                }
                Some(TextPrefix::Open) => {
                    log::trace!("Rejected header is text, reading rest of line");
                }
            }
        } else if let Some(TextPrefix::Line(end)) = text_prefix(&window) {
            reader.unread(&window[end..]);
            return Ok(classify_text(&window[..end]));
        }

        let mut text = window;
        self.read_line_tail(reader, &mut text)?;
        Ok(classify_text(&text))
    }

    /// Read until a non-blank line is complete, at most `text_window` more
    /// bytes or one read timeout
    ///
    /// Bytes are pulled one at a time so nothing after the line end is
    /// consumed.
    fn read_line_tail<L: ByteLink>(
        &self,
        reader: &mut StreamReader<L>,
        text: &mut Vec<u8>,
    ) -> Result<(), CaptureFailure> {
        let limit = text.len() + self.config.text_window;
        let deadline = Instant::now() + self.config.read_timeout;
        let mut byte = [0u8; 1];

        while text.len() < limit && line_end(text).is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match reader.read_up_to(&mut byte, remaining) {
                Ok(0) => break,
                Ok(_) => text.push(byte[0]),
                Err(LinkError::Closed) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Read exactly `len` payload bytes
    ///
    /// Empty reads are retried after a short pause until the stall timeout.
    fn read_payload<L: ByteLink>(
        &self,
        reader: &mut StreamReader<L>,
        len: usize,
    ) -> Result<Vec<u8>, CaptureFailure> {
        let mut payload = Vec::with_capacity(len);
        let mut chunk = vec![0u8; self.config.payload_chunk.clamp(1, len)];
        let mut last_data = Instant::now();

        while payload.len() < len {
            let want = chunk.len().min(len - payload.len());
            let n = match reader.read_up_to(&mut chunk[..want], self.config.read_timeout) {
                Ok(n) => n,
                Err(LinkError::Closed) => {
                    log::debug!(
                        "Link closed after {} of {} payload bytes",
                        payload.len(),
                        len
                    );
                    return Err(CaptureFailure::PrematureEndOfStream(
                        "link closed inside a page payload",
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if last_data.elapsed() >= self.config.payload_stall_timeout {
                    return Err(CaptureFailure::PrematureEndOfStream(
                        "page payload stalled",
                    ));
                }
                thread::sleep(self.config.payload_retry_delay);
                continue;
            }

            payload.extend_from_slice(&chunk[..n]);
            last_data = Instant::now();
        }

        Ok(payload)
    }
}

/// Printable ASCII or line whitespace
fn is_text_byte(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | b'\t' | 0x20..=0x7E)
}

/// Offset just past the first LF that ends a non-blank line
fn line_end(bytes: &[u8]) -> Option<usize> {
    let mut content = false;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' && content {
            return Some(i + 1);
        }
        content |= !b.is_ascii_whitespace();
    }
    None
}

/// Whether `window` opens a control line sent without a pause
///
/// Leading CR/LF are skipped; what follows must agree with `BLK=` or
/// `DUMP_END` over their common length.
fn is_inband_line_start(window: &[u8]) -> bool {
    let start = window
        .iter()
        .position(|&b| b != b'\r' && b != b'\n')
        .unwrap_or(window.len());
    let rest = &window[start..];

    [PROGRESS_MARKER, DUMP_END].iter().any(|marker| {
        let n = rest.len().min(marker.len());
        rest[..n] == marker.as_bytes()[..n]
    })
}

/// Classify `bytes` as the start of a text line, if it is one
fn text_prefix(bytes: &[u8]) -> Option<TextPrefix> {
    let mut content = false;
    for (i, &b) in bytes.iter().enumerate() {
        if !is_text_byte(b) {
            return None;
        }
        if b == b'\n' && content {
            return Some(TextPrefix::Line(i + 1));
        }
        content |= !b.is_ascii_whitespace();
    }
    Some(TextPrefix::Open)
}

/// Decode a text unit
///
/// Any line carrying `DUMP_END` ends the dump; otherwise every `BLK=` line
/// contributes a block index.
fn classify_text(bytes: &[u8]) -> Frame {
    if bytes.is_empty() {
        return Frame::Idle;
    }

    let text = String::from_utf8_lossy(bytes);
    let mut blocks = Vec::new();
    for line in text.split('\n') {
        match ControlLine::classify(line) {
            ControlLine::EndSentinel => return Frame::EndSentinel,
            ControlLine::ProgressUpdate(block) => blocks.push(block),
            _ => {}
        }
    }

    if blocks.is_empty() {
        Frame::Unrecognized(text.into_owned())
    } else {
        Frame::Progress(blocks)
    }
}
