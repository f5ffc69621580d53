//! Line waiter
//!
//! Reassembles link bytes into LF-terminated text lines and waits for one
//! starting with a given prefix.

use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::error::LinkResult;
use crate::link::ByteLink;
use crate::reader::StreamReader;

/// Read size while waiting for a line
const LINE_READ_CHUNK: usize = 256;
/// Upper bound for a single link read so the deadline is honored
const LINE_POLL: Duration = Duration::from_millis(100);

/// Wait for a line starting with `prefix`
///
/// Every completed line is trimmed, logged as diagnostic output and
/// discarded unless it matches. Bytes following the matching line are
/// pushed back into `reader`. A partial line still buffered when the
/// timeout expires is dropped.
///
/// Returns `None` on timeout.
pub fn wait_for_line<L: ByteLink>(
    reader: &mut StreamReader<L>,
    prefix: &str,
    timeout: Duration,
) -> LinkResult<Option<String>> {
    let deadline = Instant::now() + timeout;
    let mut buf = BytesMut::with_capacity(LINE_READ_CHUNK);
    let mut chunk = [0u8; LINE_READ_CHUNK];

    loop {
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let raw = buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]).trim().to_string();
            log::info!("  < {}", line);
            if line.starts_with(prefix) {
                reader.unread(&buf);
                return Ok(Some(line));
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if !buf.is_empty() {
                log::debug!("Dropping {} bytes of incomplete line", buf.len());
            }
            return Ok(None);
        }

        let n = reader.read_up_to(&mut chunk, remaining.min(LINE_POLL))?;
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::link::{EndOfScript, ReplayLink};

    const T: Duration = Duration::from_millis(50);

    #[test]
    fn test_waits_for_prefix() {
        let link = ReplayLink::from_bytes(
            *b"D\r\nStarting full dump. Ensure host receiver is running.\r\nDUMP_START\r\n",
        );
        let mut reader = StreamReader::new(link);
        let line = wait_for_line(&mut reader, "DUMP_START", T).unwrap();
        assert_eq!(line.as_deref(), Some("DUMP_START"));
    }

    #[test]
    fn test_lines_split_across_reads() {
        let link = ReplayLink::new()
            .data(*b"  page_da")
            .pause()
            .data(*b"ta=00000800 spare=00000040\r")
            .data(*b"\n")
            .max_chunk(5);
        let mut reader = StreamReader::new(link);
        let line = wait_for_line(&mut reader, "page_data=", T).unwrap();
        assert_eq!(line.as_deref(), Some("page_data=00000800 spare=00000040"));
    }

    #[test]
    fn test_leftover_is_pushed_back() {
        let mut stream = b"DUMP_START\r\n".to_vec();
        stream.extend_from_slice(&[0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x00]);
        let mut reader = StreamReader::new(ReplayLink::from_bytes(stream));
        wait_for_line(&mut reader, "DUMP_START", T).unwrap().unwrap();
        assert_eq!(reader.pending_len(), 7);
        assert_eq!(
            reader.read_within(7, T).unwrap(),
            [0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_timeout_returns_none() {
        let link = ReplayLink::from_bytes(*b"Ready.\r\npartial").end_with(EndOfScript::Silence);
        let mut reader = StreamReader::new(link);
        assert_eq!(wait_for_line(&mut reader, "DUMP_START", T).unwrap(), None);
        // the partial line is not carried over
        assert_eq!(reader.pending_len(), 0);
    }

    #[test]
    fn test_closed_link_is_reported() {
        let mut reader = StreamReader::new(ReplayLink::from_bytes(*b"no newline"));
        assert!(matches!(
            wait_for_line(&mut reader, "DUMP_START", T),
            Err(LinkError::Closed)
        ));
    }
}
