use std::io::{self, BufRead, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::block::{decompress_block, read_raw_block};
use super::{BlockHeader, BlockInfo, EOF_MARKER, SIZE_BLOCK_HEADER, VirtualOffset};
use crate::{Result, error::BgzfError};

/// A seekable reader over a BGZF stream.
///
/// Positions are expressed as [`VirtualOffset`]s. When the current block is fully
/// consumed the reported offset moves to the start of the following block, so an
/// offset taken after a record always equals the offset of the next record.
pub struct BgzfReader<R: Read + Seek> {
    inner: R,

    /// Compressed offset of the loaded block
    block_start: u64,

    /// Compressed offset of the block following the loaded one
    next_block: u64,

    /// Whether `data` holds the payload of the block at `block_start`
    loaded: bool,

    /// Decompressed payload of the loaded block
    data: Vec<u8>,

    /// Read position within `data`
    pos: usize,

    /// Reusable buffer for the raw compressed block
    raw: Vec<u8>,

    /// Current position of `inner` if known
    stream_pos: Option<u64>,
}
impl<R: Read + Seek> BgzfReader<R> {
    /// Creates a reader positioned at the start of the stream
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block_start: 0,
            next_block: 0,
            loaded: false,
            data: Vec::new(),
            pos: 0,
            raw: Vec::new(),
            stream_pos: None,
        }
    }

    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Loads the block at compressed offset `offset`
    ///
    /// Returns `false` if the stream ends exactly at `offset`.
    fn load_block_at(&mut self, offset: u64) -> Result<bool> {
        if self.stream_pos != Some(offset) {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.stream_pos = Some(offset);
        }
        self.pos = 0;
        self.block_start = offset;
        let Some(header) = read_raw_block(&mut self.inner, offset, &mut self.raw)? else {
            self.data.clear();
            self.next_block = offset;
            self.loaded = false;
            return Ok(false);
        };
        let block_size = header.block_size() as u64;
        self.stream_pos = Some(offset + block_size);
        self.next_block = offset + block_size;

        if let Err(e) = decompress_block(&self.raw, offset, &mut self.data) {
            self.data.clear();
            self.loaded = false;
            return Err(e);
        }
        self.loaded = true;
        tracing::trace!(
            offset,
            compressed = block_size,
            decompressed = self.data.len(),
            "loaded BGZF block"
        );
        Ok(true)
    }

    /// Reads the block at `offset`, returning its payload and compressed size
    ///
    /// Returns `None` at the end of the stream.
    pub fn read_block_at(&mut self, offset: u64) -> Result<Option<(&[u8], usize)>> {
        if self.load_block_at(offset)? {
            let size = (self.next_block - self.block_start) as usize;
            Ok(Some((&self.data, size)))
        } else {
            Ok(None)
        }
    }

    /// The virtual offset of the next byte to be read
    #[must_use]
    pub fn virtual_offset(&self) -> VirtualOffset {
        if self.loaded && self.pos < self.data.len() {
            VirtualOffset::new(self.block_start, self.pos as u16)
        } else {
            VirtualOffset::new(self.next_block, 0)
        }
    }

    /// Moves the reader to `offset`
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> Result<()> {
        let (block_start, within) = offset.split();
        if !(self.loaded && self.block_start == block_start) {
            if !self.load_block_at(block_start)? && within == 0 {
                return Ok(());
            }
        }
        if within as usize > self.data.len() {
            return Err(BgzfError::InvalidVirtualOffset(offset.as_raw()).into());
        }
        self.pos = within as usize;
        Ok(())
    }

    /// Returns the unread part of the current block, loading blocks as required
    ///
    /// An empty slice signals the end of the stream.
    fn fill(&mut self) -> Result<&[u8]> {
        while !self.loaded || self.pos >= self.data.len() {
            if !self.load_block_at(self.next_block)? {
                return Ok(&[]);
            }
        }
        Ok(&self.data[self.pos..])
    }

    /// Appends the next line (without its terminating newline) to `buf`
    ///
    /// Returns the number of bytes consumed from the stream, zero at end of stream.
    pub fn read_line_into(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut consumed = 0;
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                break;
            }
            if let Some(i) = memchr::memchr(b'\n', available) {
                buf.extend_from_slice(&available[..i]);
                self.pos += i + 1;
                consumed += i + 1;
                break;
            }
            let n = available.len();
            buf.extend_from_slice(available);
            self.pos += n;
            consumed += n;
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(consumed)
    }

    /// Appends the remainder of the decompressed stream to `buf`
    pub fn read_to_end_into(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut total = 0;
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                return Ok(total);
            }
            let n = available.len();
            buf.extend_from_slice(available);
            self.pos += n;
            total += n;
        }
    }

    /// Walks every block header of the stream without inflating any payload
    pub fn scan_blocks(&mut self) -> Result<Vec<BlockInfo>> {
        let mut blocks = Vec::new();
        let mut offset = 0;
        self.inner.seek(SeekFrom::Start(0))?;
        self.stream_pos = None;
        self.loaded = false;
        self.next_block = 0;
        self.pos = 0;
        loop {
            let mut header_buf = [0u8; SIZE_BLOCK_HEADER];
            match self.inner.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let header = BlockHeader::from_bytes(&header_buf, offset)?;
            let block_size = header.block_size();
            self.inner
                .seek(SeekFrom::Current((block_size - SIZE_BLOCK_HEADER - 4) as i64))?;
            let decompressed_size = self
                .inner
                .read_u32::<LittleEndian>()
                .map_err(|_| BgzfError::corrupt(offset, "truncated block"))?
                as usize;
            blocks.push(BlockInfo {
                offset,
                compressed_size: block_size,
                decompressed_size,
            });
            offset += block_size as u64;
        }
        Ok(blocks)
    }

    /// Checks whether the stream ends with the BGZF EOF marker block
    pub fn has_eof_marker(&mut self) -> Result<bool> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.stream_pos = None;
        if len < EOF_MARKER.len() as u64 {
            return Ok(false);
        }
        self.inner
            .seek(SeekFrom::End(-(EOF_MARKER.len() as i64)))?;
        let mut tail = [0u8; EOF_MARKER.len()];
        self.inner.read_exact(&mut tail)?;
        Ok(tail == EOF_MARKER)
    }
}

impl<R: Read + Seek> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read + Seek> BufRead for BgzfReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}
