//! Buffered reading on top of a [`ByteLink`]
//!
//! [`StreamReader`] owns the link and a small pushback buffer. Bytes that
//! the line waiter reads past the end of a matched line are pushed back and
//! served before any new link read, so the first binary record after the
//! handshake is never lost.

use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};

use crate::error::{LinkError, LinkResult};
use crate::link::ByteLink;

/// Link wrapper with pushback
pub struct StreamReader<L: ByteLink> {
    link: L,
    pending: BytesMut,
}

impl<L: ByteLink> StreamReader<L> {
    /// Wrap a link
    pub fn new(link: L) -> Self {
        Self {
            link,
            pending: BytesMut::new(),
        }
    }

    /// Access the underlying link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Unwrap the link, discarding pushed-back bytes
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Number of pushed-back bytes waiting to be read
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Write to the link
    pub fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        self.link.write(data)?;
        self.link.flush()
    }

    /// Return bytes to the front of the stream
    pub fn unread(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut pending = BytesMut::with_capacity(data.len() + self.pending.len());
        pending.extend_from_slice(data);
        pending.extend_from_slice(&self.pending);
        self.pending = pending;
    }

    /// Read up to `buf.len()` bytes
    ///
    /// Pushed-back bytes are returned immediately; otherwise the link is
    /// read with `timeout`.
    pub fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            return Ok(n);
        }
        self.link.read_up_to(buf, timeout)
    }

    /// Read until `want` bytes are collected or `timeout` elapses
    ///
    /// Short reads are accumulated. A read that returns nothing ends the
    /// attempt early, since the link already waited out its window. The
    /// result may be shorter than `want`; [`LinkError::Closed`] is only
    /// returned when the link closed before a single byte arrived.
    pub fn read_within(&mut self, want: usize, timeout: Duration) -> LinkResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut data = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && filled > 0 {
                break;
            }
            match self.read_up_to(&mut data[filled..], remaining) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(LinkError::Closed) if filled > 0 => break,
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        data.truncate(filled);
        Ok(data)
    }
}
