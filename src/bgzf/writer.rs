use std::io::{self, Write};

use flate2::Compression;

use super::{BLOCK_DATA_SIZE, EOF_MARKER, VirtualOffset, compress_block};
use crate::Result;

/// A writer producing a BGZF stream.
///
/// Payload is accumulated until a block is full, at which point the block is
/// compressed and written to the inner writer. The block is flushed as soon as it
/// reaches capacity so that [`BgzfWriter::virtual_offset`] never points at the end
/// of a full block.
pub struct BgzfWriter<W: Write> {
    /// Internal writer for the compressed stream
    inner: W,

    /// Uncompressed payload of the open block
    ubuf: Vec<u8>,

    /// Reusable buffer for the compressed block
    zbuf: Vec<u8>,

    /// Number of compressed bytes written so far
    compressed_offset: u64,

    /// Compression level used for every block
    level: Compression,
}
impl<W: Write> BgzfWriter<W> {
    /// Creates a writer with the default compression level
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, Compression::default())
    }

    /// Creates a writer with a specific compression level
    pub fn with_level(inner: W, level: Compression) -> Self {
        Self {
            inner,
            ubuf: Vec::with_capacity(BLOCK_DATA_SIZE),
            zbuf: Vec::new(),
            compressed_offset: 0,
            level,
        }
    }

    /// The virtual offset the next written byte will occupy
    #[must_use]
    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::new(self.compressed_offset, self.ubuf.len() as u16)
    }

    /// Number of compressed bytes written to the inner writer
    #[must_use]
    pub fn compressed_offset(&self) -> u64 {
        self.compressed_offset
    }

    /// Compresses `payload` as a standalone block
    ///
    /// Any buffered payload is flushed first. Returns the compressed size of the block.
    pub fn write_block(&mut self, payload: &[u8]) -> Result<usize> {
        self.flush_block()?;
        compress_block(&mut self.zbuf, payload, self.level)?;
        self.inner.write_all(&self.zbuf)?;
        self.compressed_offset += self.zbuf.len() as u64;
        Ok(self.zbuf.len())
    }

    /// Compresses and writes the open block, if it holds any payload
    pub fn flush_block(&mut self) -> Result<()> {
        if self.ubuf.is_empty() {
            return Ok(());
        }
        compress_block(&mut self.zbuf, &self.ubuf, self.level)?;
        self.inner.write_all(&self.zbuf)?;
        self.compressed_offset += self.zbuf.len() as u64;
        self.ubuf.clear();
        Ok(())
    }

    /// Flushes all payload, appends the EOF marker block and returns the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.flush_block()?;
        self.inner.write_all(&EOF_MARKER)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let space = BLOCK_DATA_SIZE - self.ubuf.len();
        let n = space.min(buf.len());
        self.ubuf.extend_from_slice(&buf[..n]);
        if self.ubuf.len() == BLOCK_DATA_SIZE {
            self.flush_block().map_err(io::Error::other)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block().map_err(io::Error::other)?;
        self.inner.flush()
    }
}
