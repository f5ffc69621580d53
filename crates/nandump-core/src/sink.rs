//! Output sinks for captured page payloads

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only destination for page payloads
///
/// Payloads are appended whole, in arrival order; nothing else is written.
pub trait OutputSink {
    /// Append one complete payload
    fn append(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Flush everything to its final destination
    fn finish(&mut self) -> io::Result<()>;
}

/// Buffered output file
pub struct FileSink {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// Create (or truncate) the output file
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        log::info!("Capturing dump to: {}", path.display());
        Ok(Self {
            writer: BufWriter::with_capacity(1 << 20, file),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for FileSink {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload)?;
        self.written += payload.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        log::debug!("Flushed {} bytes to {}", self.written, self.path.display());
        Ok(())
    }
}

impl OutputSink for Vec<u8> {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        self.extend_from_slice(payload);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        (**self).append(payload)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}
