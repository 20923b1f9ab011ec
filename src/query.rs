use std::io::{Read, Seek};

use crate::{
    Result,
    bgzf::{BgzfReader, VirtualOffset},
    error::{BgzfError, QueryError},
    index::{Chunk, IndexConfig},
};

/// A record line returned by a query, without its trailing newline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    line: Vec<u8>,
    start: u64,
    end: u64,
    offset: VirtualOffset,
}
impl Record {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.line
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.line
    }

    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.line)?)
    }

    /// Tab-delimited fields of the line
    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.line.split(|&b| b == b'\t')
    }

    /// 0-based start of the record interval
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive end of the record interval
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Virtual offset at which the line begins
    #[must_use]
    pub fn offset(&self) -> VirtualOffset {
        self.offset
    }
}

/// Scan progress of a [`Records`] iterator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// No chunk has been entered yet
    Init,
    /// Reading lines of the chunk at this position of the plan
    Scanning(usize),
    Done,
}

/// Iterator over the records overlapping a query interval.
///
/// Borrows the underlying reader for its whole lifetime; the reader is usable for
/// another query once the iterator is dropped. The first error ends the iteration.
pub struct Records<'r, R: Read + Seek> {
    reader: &'r mut BgzfReader<R>,
    config: IndexConfig,
    name: String,
    start: u64,
    end: u64,
    chunks: Vec<Chunk>,
    state: State,
    buf: Vec<u8>,
}
impl<'r, R: Read + Seek> Records<'r, R> {
    pub(crate) fn new(
        reader: &'r mut BgzfReader<R>,
        config: IndexConfig,
        name: String,
        start: u64,
        end: u64,
        chunks: Vec<Chunk>,
    ) -> Self {
        let state = if chunks.is_empty() || start >= end {
            State::Done
        } else {
            State::Init
        };
        Self {
            reader,
            config,
            name,
            start,
            end,
            chunks,
            state,
            buf: Vec::new(),
        }
    }

    /// Number of chunks planned for this query
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Moves to the chunk at `idx`, seeking unless the reader is already there
    fn enter_chunk(&mut self, idx: usize) -> Result<bool> {
        let Some(chunk) = self.chunks.get(idx) else {
            self.state = State::Done;
            return Ok(false);
        };
        if self.state == State::Init || self.reader.virtual_offset() != chunk.begin {
            self.reader.seek_virtual(chunk.begin)?;
        }
        self.state = State::Scanning(idx);
        Ok(true)
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        loop {
            let idx = match self.state {
                State::Done => return Ok(None),
                State::Init => {
                    self.enter_chunk(0)?;
                    continue;
                }
                State::Scanning(idx) => idx,
            };
            let offset = self.reader.virtual_offset();
            if offset >= self.chunks[idx].end {
                self.enter_chunk(idx + 1)?;
                continue;
            }

            self.buf.clear();
            if self.reader.read_line_into(&mut self.buf)? == 0 {
                // the index still references data past the end of the stream
                return Err(BgzfError::corrupt(
                    offset.block_start(),
                    format!(
                        "stream ends before the end of chunk {}-{}",
                        self.chunks[idx].begin, self.chunks[idx].end
                    ),
                )
                .into());
            }
            if self.buf.is_empty() || self.config.is_meta(&self.buf) {
                continue;
            }
            let interval =
                self.config
                    .parse_interval(&self.buf)
                    .map_err(|e| QueryError::MalformedRecord {
                        offset: offset.as_raw(),
                        reason: e.to_string(),
                    })?;

            // records are sorted, so nothing further can overlap
            if interval.name != self.name.as_bytes() || interval.start >= self.end {
                self.state = State::Done;
                return Ok(None);
            }
            if interval.overlaps(self.start, self.end) {
                let (start, end) = (interval.start, interval.end);
                return Ok(Some(Record {
                    line: std::mem::take(&mut self.buf),
                    start,
                    end,
                    offset,
                }));
            }
        }
    }
}

impl<R: Read + Seek> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}
