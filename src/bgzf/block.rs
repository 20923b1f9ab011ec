use std::io::{self, Read, Write};

use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian};
use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};

use super::{
    BGZF_SUBFIELD, BLOCK_DATA_SIZE, GZIP_MAGIC, MAX_BLOCK_SIZE, SIZE_BLOCK_FOOTER,
    SIZE_BLOCK_HEADER,
};
use crate::{Result, error::BgzfError};

/// The empty block terminating every well-formed BGZF stream
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Compression method field for deflate
const CM_DEFLATE: u8 = 8;

/// Flag bit announcing the extra field
const FLG_FEXTRA: u8 = 0x04;

/// Operating system field (unknown)
const OS_UNKNOWN: u8 = 0xff;

/// The fixed gzip header of a BGZF block.
///
/// This is stored identically in memory and on disk.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BlockHeader {
    magic: [u8; 2],
    cm: u8,
    flg: u8,
    mtime: [u8; 4],
    xfl: u8,
    os: u8,
    xlen: [u8; 2],
    subfield: [u8; 2],
    slen: [u8; 2],

    /// total block size minus one
    bsize: [u8; 2],
}
impl BlockHeader {
    /// Creates a header for a block of `block_size` total bytes
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        let mut header = Self {
            magic: GZIP_MAGIC,
            cm: CM_DEFLATE,
            flg: FLG_FEXTRA,
            mtime: [0; 4],
            xfl: 0,
            os: OS_UNKNOWN,
            xlen: [0; 2],
            subfield: BGZF_SUBFIELD,
            slen: [0; 2],
            bsize: [0; 2],
        };
        LittleEndian::write_u16(&mut header.xlen, 6);
        LittleEndian::write_u16(&mut header.slen, 2);
        LittleEndian::write_u16(&mut header.bsize, (block_size - 1) as u16);
        header
    }

    /// Total size of the block on disk (header, payload and footer)
    #[must_use]
    pub fn block_size(&self) -> usize {
        LittleEndian::read_u16(&self.bsize) as usize + 1
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Validates the header found at compressed offset `offset`
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < SIZE_BLOCK_HEADER {
            return Err(BgzfError::corrupt(offset, "truncated block header").into());
        }
        let header: Self = *bytemuck::from_bytes(&bytes[..SIZE_BLOCK_HEADER]);
        if header.magic != GZIP_MAGIC {
            return Err(BgzfError::corrupt(offset, "missing gzip magic").into());
        }
        if header.cm != CM_DEFLATE || header.flg & FLG_FEXTRA == 0 {
            return Err(BgzfError::corrupt(offset, "not a BGZF block header").into());
        }
        if LittleEndian::read_u16(&header.xlen) != 6
            || header.subfield != BGZF_SUBFIELD
            || LittleEndian::read_u16(&header.slen) != 2
        {
            return Err(BgzfError::corrupt(offset, "missing BC extra subfield").into());
        }
        if header.block_size() < SIZE_BLOCK_HEADER + SIZE_BLOCK_FOOTER {
            return Err(BgzfError::corrupt(offset, "block size smaller than framing").into());
        }
        Ok(header)
    }
}

/// Location and sizes of a block, as found by a header-only scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Compressed offset of the block
    pub offset: u64,
    /// Total on-disk size of the block
    pub compressed_size: usize,
    /// Size of the decompressed payload (ISIZE)
    pub decompressed_size: usize,
}
impl BlockInfo {
    /// Whether this block carries no payload (e.g. the EOF marker)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decompressed_size == 0
    }
}

/// Compresses `src` into a complete BGZF block written to `dst`
///
/// Returns the compressed size of the block.
pub fn compress_block(dst: &mut Vec<u8>, src: &[u8], level: Compression) -> Result<usize> {
    if src.len() > BLOCK_DATA_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "block payload of {} bytes exceeds maximum of {BLOCK_DATA_SIZE}",
                src.len()
            ),
        )
        .into());
    }

    deflate_framed(dst, src, level)?;

    // incompressible data can inflate past the 64KiB ceiling
    if dst.len() + SIZE_BLOCK_FOOTER > MAX_BLOCK_SIZE {
        deflate_framed(dst, src, Compression::none())?;
    }
    if dst.len() + SIZE_BLOCK_FOOTER > MAX_BLOCK_SIZE {
        return Err(io::Error::other("stored block exceeds maximum BGZF block size").into());
    }

    let mut footer = [0u8; SIZE_BLOCK_FOOTER];
    LittleEndian::write_u32(&mut footer[..4], crc32fast::hash(src));
    LittleEndian::write_u32(&mut footer[4..], src.len() as u32);
    dst.extend_from_slice(&footer);

    let header = BlockHeader::new(dst.len());
    dst[..SIZE_BLOCK_HEADER].copy_from_slice(header.as_bytes());
    Ok(dst.len())
}

/// Writes a placeholder header followed by the raw deflate stream of `src`
fn deflate_framed(dst: &mut Vec<u8>, src: &[u8], level: Compression) -> Result<()> {
    dst.clear();
    dst.resize(SIZE_BLOCK_HEADER, 0);
    let mut encoder = DeflateEncoder::new(&mut *dst, level);
    encoder.write_all(src)?;
    encoder.finish()?;
    Ok(())
}

/// Decompresses a complete block (header through footer) found at `offset` into `dst`
///
/// The previous contents of `dst` are discarded.
pub fn decompress_block(block: &[u8], offset: u64, dst: &mut Vec<u8>) -> Result<()> {
    let header = BlockHeader::from_bytes(block, offset)?;
    if header.block_size() != block.len() {
        return Err(BgzfError::corrupt(
            offset,
            format!(
                "BSIZE declares {} bytes but block holds {}",
                header.block_size(),
                block.len()
            ),
        )
        .into());
    }

    let footer = &block[block.len() - SIZE_BLOCK_FOOTER..];
    let crc = LittleEndian::read_u32(&footer[..4]);
    let isize = LittleEndian::read_u32(&footer[4..]) as usize;
    if isize > MAX_BLOCK_SIZE {
        return Err(BgzfError::corrupt(offset, format!("ISIZE {isize} exceeds 64KiB")).into());
    }

    dst.clear();
    dst.reserve(isize);
    let cdata = &block[SIZE_BLOCK_HEADER..block.len() - SIZE_BLOCK_FOOTER];
    DeflateDecoder::new(cdata)
        .take(MAX_BLOCK_SIZE as u64 + 1)
        .read_to_end(dst)
        .map_err(|e| BgzfError::corrupt(offset, format!("inflate failed: {e}")))?;

    if dst.len() != isize {
        return Err(BgzfError::corrupt(
            offset,
            format!("ISIZE declares {isize} bytes but block inflated to {}", dst.len()),
        )
        .into());
    }
    if crc32fast::hash(dst) != crc {
        return Err(BgzfError::corrupt(offset, "CRC32 mismatch").into());
    }
    Ok(())
}

/// Reads the next complete block from `reader` into `dst`
///
/// Returns `None` if the reader is exhausted exactly on a block boundary.
pub(crate) fn read_raw_block<R: Read>(
    reader: &mut R,
    offset: u64,
    dst: &mut Vec<u8>,
) -> Result<Option<BlockHeader>> {
    let mut header_buf = [0u8; SIZE_BLOCK_HEADER];
    match read_fully(reader, &mut header_buf)? {
        0 => return Ok(None),
        n if n < SIZE_BLOCK_HEADER => {
            return Err(BgzfError::corrupt(offset, "truncated block header").into());
        }
        _ => {}
    }
    let header = BlockHeader::from_bytes(&header_buf, offset)?;

    dst.clear();
    dst.extend_from_slice(&header_buf);
    dst.resize(header.block_size(), 0);
    if read_fully(reader, &mut dst[SIZE_BLOCK_HEADER..])? < header.block_size() - SIZE_BLOCK_HEADER
    {
        return Err(BgzfError::corrupt(offset, "truncated block").into());
    }
    Ok(Some(header))
}

/// Fills `buf` as far as the reader allows, returning the number of bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    #[test]
    fn test_header_size() {
        assert_eq!(SIZE_BLOCK_HEADER, 18);
    }

    #[test]
    fn test_eof_marker_is_valid_empty_block() -> Result<()> {
        let mut buf = Vec::new();
        decompress_block(&EOF_MARKER, 0, &mut buf)?;
        assert!(buf.is_empty());
        Ok(())
    }

    #[test]
    fn test_compress_decompress() -> Result<()> {
        let payload = b"chr1\t100\t200\nchr1\t150\t300\n".repeat(100);
        let mut block = Vec::new();
        let size = compress_block(&mut block, &payload, Compression::default())?;
        assert_eq!(size, block.len());
        assert_eq!(BlockHeader::from_bytes(&block, 0)?.block_size(), size);
        assert_eq!(
            LittleEndian::read_u32(&block[size - 4..]) as usize,
            payload.len()
        );

        let mut out = Vec::new();
        decompress_block(&block, 0, &mut out)?;
        assert_eq!(out, payload);
        Ok(())
    }

    #[test]
    fn test_incompressible_payload_fits() -> Result<()> {
        // xorshift noise does not deflate
        let mut state = 0x2545_f491_u32;
        let payload: Vec<u8> = (0..BLOCK_DATA_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let mut block = Vec::new();
        let size = compress_block(&mut block, &payload, Compression::best())?;
        assert!(size <= MAX_BLOCK_SIZE);

        let mut out = Vec::new();
        decompress_block(&block, 0, &mut out)?;
        assert_eq!(out, payload);
        Ok(())
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![b'A'; BLOCK_DATA_SIZE + 1];
        let mut block = Vec::new();
        assert!(compress_block(&mut block, &payload, Compression::default()).is_err());
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut block = EOF_MARKER;
        block[0] = 0x00;
        let mut out = Vec::new();
        let err = decompress_block(&block, 77, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::BgzfError(BgzfError::CorruptBlock { offset: 77, .. })
        ));
    }

    #[test]
    fn test_isize_mismatch_is_corrupt() -> Result<()> {
        let mut block = Vec::new();
        compress_block(&mut block, b"some payload", Compression::default())?;
        let len = block.len();
        LittleEndian::write_u32(&mut block[len - 4..], 3);
        let mut out = Vec::new();
        assert!(decompress_block(&block, 0, &mut out).is_err());
        Ok(())
    }

    #[test]
    fn test_crc_mismatch_is_corrupt() -> Result<()> {
        let mut block = Vec::new();
        compress_block(&mut block, b"some payload", Compression::default())?;
        let len = block.len();
        block[len - 8] ^= 0xff;
        let mut out = Vec::new();
        assert!(decompress_block(&block, 0, &mut out).is_err());
        Ok(())
    }

    #[test]
    fn test_read_raw_block_clean_eof() -> Result<()> {
        let mut reader: &[u8] = &[];
        let mut buf = Vec::new();
        assert!(read_raw_block(&mut reader, 0, &mut buf)?.is_none());
        Ok(())
    }

    #[test]
    fn test_read_raw_block_truncated() {
        let mut reader: &[u8] = &EOF_MARKER[..20];
        let mut buf = Vec::new();
        assert!(read_raw_block(&mut reader, 0, &mut buf).is_err());
    }
}
