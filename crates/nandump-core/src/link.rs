//! Byte link abstraction
//!
//! A [`ByteLink`] is a duplex byte stream to the dump device. Reads never
//! block indefinitely: every read carries a timeout, and returning fewer
//! bytes than requested (including zero) only means nothing more arrived in
//! that window.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{LinkError, LinkResult};

/// Duplex byte stream to the device
///
/// A link is owned by exactly one user at a time; every operation takes
/// `&mut self`.
pub trait ByteLink {
    /// Write all bytes to the link
    fn write(&mut self, data: &[u8]) -> LinkResult<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns the number of bytes read, or 0 if nothing arrived in time.
    /// Returns [`LinkError::Closed`] once the device has gone away.
    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize>;

    /// Flush any buffered output
    fn flush(&mut self) -> LinkResult<()> {
        Ok(())
    }

    /// Release the link; further operations may fail
    fn close(&mut self) -> LinkResult<()> {
        self.flush()
    }

    /// Human-readable name of the link (device path, address, ...)
    fn description(&self) -> String {
        String::from("link")
    }
}

impl<L: ByteLink + ?Sized> ByteLink for &mut L {
    fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        (**self).write(data)
    }

    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
        (**self).read_up_to(buf, timeout)
    }

    fn flush(&mut self) -> LinkResult<()> {
        (**self).flush()
    }

    fn close(&mut self) -> LinkResult<()> {
        (**self).close()
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

impl<L: ByteLink + ?Sized> ByteLink for Box<L> {
    fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        (**self).write(data)
    }

    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
        (**self).read_up_to(buf, timeout)
    }

    fn flush(&mut self) -> LinkResult<()> {
        (**self).flush()
    }

    fn close(&mut self) -> LinkResult<()> {
        (**self).close()
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

/// One step of a replay script
#[derive(Debug, Clone)]
enum Segment {
    Data(Bytes),
    /// A read that times out without data
    Pause,
}

/// What a [`ReplayLink`] does once its script is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfScript {
    /// Report [`LinkError::Closed`]
    #[default]
    Close,
    /// Keep timing out
    Silence,
}

/// In-memory link replaying a scripted device stream
///
/// Used to re-decode a recorded raw serial capture and to drive sessions in
/// tests. Data segments are handed out in reads of at most `max_chunk`
/// bytes; a pause makes exactly one read time out. Everything written to
/// the link is recorded.
#[derive(Debug, Clone)]
pub struct ReplayLink {
    segments: VecDeque<Segment>,
    written: Vec<u8>,
    end: EndOfScript,
    max_chunk: usize,
    name: String,
}

impl ReplayLink {
    /// Create an empty script
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            written: Vec::new(),
            end: EndOfScript::Close,
            max_chunk: usize::MAX,
            name: String::from("replay"),
        }
    }

    /// Create a script delivering `data` and then closing
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let mut link = Self::new();
        link.push_data(data);
        link
    }

    /// Load a recorded raw stream from a file
    pub fn from_file(path: &Path) -> LinkResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            LinkError::ConnectionFailed(format!("{}: {}", path.display(), e))
        })?;
        log::info!("Replaying {} bytes from {}", data.len(), path.display());
        let mut link = Self::from_bytes(data);
        link.name = format!("replay:{}", path.display());
        Ok(link)
    }

    /// Append data to the script
    pub fn push_data(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        let data = data.into();
        if !data.is_empty() {
            self.segments.push_back(Segment::Data(Bytes::from(data)));
        }
        self
    }

    /// Append a read timeout to the script
    pub fn push_pause(&mut self) -> &mut Self {
        self.segments.push_back(Segment::Pause);
        self
    }

    /// Builder form of [`push_data`](Self::push_data)
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.push_data(data);
        self
    }

    /// Builder form of [`push_pause`](Self::push_pause)
    pub fn pause(mut self) -> Self {
        self.push_pause();
        self
    }

    /// Limit the number of bytes returned by a single read
    pub fn max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    /// Choose what happens after the last segment
    pub fn end_with(mut self, end: EndOfScript) -> Self {
        self.end = end;
        self
    }

    /// Bytes written to the link so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Scripted bytes not yet read
    pub fn remaining(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Data(d) => d.len(),
                Segment::Pause => 0,
            })
            .sum()
    }
}

impl Default for ReplayLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteLink for ReplayLink {
    fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read_up_to(&mut self, buf: &mut [u8], _timeout: Duration) -> LinkResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.segments.front_mut() {
            None => match self.end {
                EndOfScript::Close => Err(LinkError::Closed),
                EndOfScript::Silence => Ok(0),
            },
            Some(Segment::Pause) => {
                self.segments.pop_front();
                Ok(0)
            }
            Some(Segment::Data(data)) => {
                let n = buf.len().min(data.len()).min(self.max_chunk);
                let chunk = data.split_to(n);
                buf[..n].copy_from_slice(&chunk);
                if data.is_empty() {
                    self.segments.pop_front();
                }
                Ok(n)
            }
        }
    }

    fn description(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_replay_chunks_and_pauses() {
        let mut link = ReplayLink::new().data(*b"abcdef").pause().data(*b"gh").max_chunk(4);
        let mut buf = [0u8; 16];

        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 0);
        assert_eq!(link.remaining(), 2);
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 2);
        assert!(matches!(
            link.read_up_to(&mut buf, T),
            Err(LinkError::Closed)
        ));
    }

    #[test]
    fn test_replay_silence_and_writes() {
        let mut link = ReplayLink::from_bytes(vec![1u8]).end_with(EndOfScript::Silence);
        let mut buf = [0u8; 4];
        link.write(b"D").unwrap();
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 1);
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 0);
        assert_eq!(link.read_up_to(&mut buf, T).unwrap(), 0);
        assert_eq!(link.written(), b"D");
    }

    #[test]
    fn test_replay_from_missing_file() {
        let err = ReplayLink::from_file(Path::new("/nonexistent/stream.bin")).unwrap_err();
        assert!(matches!(err, LinkError::ConnectionFailed(_)));
    }
}
