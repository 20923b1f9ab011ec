//! Binary layout of `.tbi` files.
//!
//! ```text
//! magic      "TBI\1"
//! n_ref      i32
//! preset     i32   format code, 0x10000 if zero-based
//! sc bc ec   i32   sequence, begin and end columns (1-based)
//! meta       i32   comment character
//! skip       i32   number of header lines
//! l_nm       i32   length of the name block
//! names      NUL-terminated sequence names
//! per ref:
//!   n_bin    i32
//!   per bin: bin u32, n_chunk i32, n_chunk x (begin u64, end u64)
//!   n_intv   i32
//!   intv     n_intv x u64
//! ```
//!
//! Every integer is little-endian. The whole payload is stored BGZF-compressed.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use super::config::IndexConfig;
use super::core::{Chunk, Index, ReferenceIndex};
use crate::{
    Result,
    bgzf::{BgzfReader, BgzfWriter, GZIP_MAGIC, VirtualOffset},
    error::IndexError,
};

/// Magic token of a tabix index
pub const TBI_MAGIC: [u8; 4] = *b"TBI\x01";

/// Extension appended to the data file path
pub const INDEX_EXTENSION: &str = "tbi";

/// Location of the index belonging to a data file
#[must_use]
pub fn index_path<P: AsRef<Path>>(data_path: P) -> PathBuf {
    let mut path = data_path.as_ref().as_os_str().to_owned();
    path.push(".");
    path.push(INDEX_EXTENSION);
    PathBuf::from(path)
}

/// Serializes an index into its uncompressed binary form
#[must_use]
pub fn encode(index: &Index) -> Vec<u8> {
    let config = index.config();
    let names_len = index.sequences().iter().map(|n| n.len() + 1).sum::<usize>();

    let mut buf = Vec::new();
    buf.extend_from_slice(&TBI_MAGIC);
    let header = [
        index.num_sequences() as i32,
        config.preset(),
        config.seq_col as i32,
        config.begin_col as i32,
        config.end_col as i32,
        i32::from(config.meta_char),
        config.line_skip as i32,
        names_len as i32,
    ];
    for value in header {
        push_i32(&mut buf, value);
    }
    for name in index.sequences() {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }

    for reference in index.references() {
        push_i32(&mut buf, reference.bins().len() as i32);
        for (&bin, chunks) in reference.bins() {
            push_u32(&mut buf, bin);
            push_i32(&mut buf, chunks.len() as i32);
            for chunk in chunks {
                push_u64(&mut buf, chunk.begin.as_raw());
                push_u64(&mut buf, chunk.end.as_raw());
            }
        }
        push_i32(&mut buf, reference.linear().len() as i32);
        for offset in reference.linear() {
            push_u64(&mut buf, offset.as_raw());
        }
    }
    buf
}

fn push_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Bounds-checked little-endian cursor over the decompressed index
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}
impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        if needed > self.remaining() {
            return Err(IndexError::TruncatedIndex {
                needed,
                available: self.remaining(),
            }
            .into());
        }
        let bytes = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    fn i32(&mut self) -> Result<i32> {
        self.take(4).map(LittleEndian::read_i32)
    }

    fn u32(&mut self) -> Result<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    fn u64(&mut self) -> Result<u64> {
        self.take(8).map(LittleEndian::read_u64)
    }

    /// Reads a non-negative count and checks that `count * item_size` bytes remain
    fn count(&mut self, field: &'static str, item_size: usize) -> Result<usize> {
        let value = self.i32()?;
        let count =
            usize::try_from(value).map_err(|_| IndexError::NegativeLength { field, value })?;
        let needed = count.saturating_mul(item_size);
        if needed > self.remaining() {
            return Err(IndexError::TruncatedIndex {
                needed,
                available: self.remaining(),
            }
            .into());
        }
        Ok(count)
    }
}

/// Parses the uncompressed binary form of an index
pub fn decode(bytes: &[u8]) -> Result<Index> {
    let mut decoder = Decoder::new(bytes);
    let magic = decoder.take(4)?;
    if magic != TBI_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(IndexError::BadMagic(found).into());
    }

    // each reference needs at least its two counts
    let n_ref = decoder.count("reference count", 0)?;
    let preset = decoder.i32()?;
    let seq_col = decoder.i32()?;
    let begin_col = decoder.i32()?;
    let end_col = decoder.i32()?;
    let meta = decoder.i32()?;
    let skip = decoder.i32()?;
    let config = IndexConfig::from_raw(preset, seq_col, begin_col, end_col, meta, skip)?;

    let names_len = decoder.count("name block length", 1)?;
    let names = decoder
        .take(names_len)?
        .split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| std::str::from_utf8(name).map(str::to_string))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if names.len() != n_ref {
        return Err(IndexError::InvalidSequenceNames {
            declared: n_ref,
            found: names.len(),
        }
        .into());
    }

    let mut references = Vec::with_capacity(n_ref);
    for _ in 0..n_ref {
        let n_bin = decoder.count("bin count", 8)?;
        let mut bins = BTreeMap::new();
        for _ in 0..n_bin {
            let bin = decoder.u32()?;
            let n_chunk = decoder.count("chunk count", 16)?;
            let mut chunks = Vec::with_capacity(n_chunk);
            for _ in 0..n_chunk {
                let begin = VirtualOffset::from_raw(decoder.u64()?);
                let end = VirtualOffset::from_raw(decoder.u64()?);
                chunks.push(Chunk::new(begin, end));
            }
            bins.insert(bin, chunks);
        }
        let n_intv = decoder.count("linear index size", 8)?;
        let linear = (0..n_intv)
            .map(|_| decoder.u64().map(VirtualOffset::from_raw))
            .collect::<Result<Vec<_>>>()?;
        references.push(ReferenceIndex::new(bins, linear));
    }
    // anything left (such as a count of unplaced records) is ignored

    Index::new(config, names, references)
}

/// Writes `index` BGZF-compressed to `path`
///
/// The file is written next to its destination and renamed into place, so a failed
/// write never leaves a partial index behind.
pub fn write_index<P: AsRef<Path>>(index: &Index, path: P) -> Result<()> {
    let path = path.as_ref();
    let tmp = stage_index(index, path)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })?;
    Ok(())
}

/// Writes the index to a temporary file next to `path` and returns its location
///
/// Nothing is left behind on failure.
pub(crate) fn stage_index(index: &Index, path: &Path) -> Result<PathBuf> {
    let tmp = temp_path(path);
    let result = (|| -> Result<()> {
        let mut writer = BgzfWriter::new(BufWriter::new(File::create(&tmp)?));
        writer.write_all(&encode(index))?;
        writer.finish()?.flush()?;
        Ok(())
    })();
    match result {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// `<path>.tmp`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Reads an index from `path`, accepting both BGZF-compressed and raw payloads
pub fn read_index<P: AsRef<Path>>(path: P) -> Result<Index> {
    let path = path.as_ref();
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::IndexMissing(path.display().to_string()).into());
        }
        Err(e) => return Err(e.into()),
    };
    if raw.starts_with(&GZIP_MAGIC) {
        let mut bytes = Vec::new();
        BgzfReader::new(std::io::Cursor::new(raw)).read_to_end_into(&mut bytes)?;
        decode(&bytes)
    } else {
        decode(&raw)
    }
}
