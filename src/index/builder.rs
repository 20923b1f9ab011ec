use std::collections::{BTreeMap, HashMap};

use super::bins::{bin_of, window_of};
use super::config::IndexConfig;
use super::core::{Chunk, Index, ReferenceIndex};
use crate::{Result, bgzf::VirtualOffset, error::BuildError};

/// The chunk currently being extended
#[derive(Clone, Copy, Debug)]
struct OpenChunk {
    tid: usize,
    bin: u32,
    begin: VirtualOffset,
    end: VirtualOffset,
}

/// Per-sequence accumulator
#[derive(Debug, Default)]
struct ReferenceBuilder {
    bins: BTreeMap<u32, Vec<Chunk>>,
    linear: Vec<Option<VirtualOffset>>,
}
impl ReferenceBuilder {
    fn add_chunk(&mut self, bin: u32, chunk: Chunk) {
        self.bins.entry(bin).or_default().push(chunk);
    }

    fn mark_windows(&mut self, start: u64, end: u64, offset: VirtualOffset) {
        let first = window_of(start);
        let last = window_of(end - 1);
        if self.linear.len() <= last {
            self.linear.resize(last + 1, None);
        }
        for slot in &mut self.linear[first..=last] {
            slot.get_or_insert(offset);
        }
    }

    fn finish(self) -> ReferenceIndex {
        let bins = self
            .bins
            .into_iter()
            .map(|(bin, chunks)| (bin, merge_adjacent(chunks)))
            .collect();

        let mut linear = Vec::with_capacity(self.linear.len());
        let mut previous = VirtualOffset::default();
        for slot in self.linear {
            let offset = slot.unwrap_or(previous);
            linear.push(offset);
            previous = offset;
        }
        ReferenceIndex::new(bins, linear)
    }
}

/// Joins consecutive chunks of one bin when the first ends in the block the next begins in
fn merge_adjacent(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(prev) if prev.end.same_block(chunk.begin) => prev.end = chunk.end,
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Accumulates an [`Index`] from record lines in file order.
///
/// Each line is pushed with the virtual offsets at which it begins and ends in the
/// compressed stream. Records must be grouped by sequence and sorted by start
/// within each sequence.
#[derive(Debug)]
pub struct Indexer {
    config: IndexConfig,
    names: Vec<String>,
    name_map: HashMap<Vec<u8>, usize>,
    references: Vec<ReferenceBuilder>,

    /// Number of lines seen so far, including skipped and meta lines
    line_no: usize,

    /// Number of indexed records
    num_records: usize,

    /// Start of the last record
    last_start: u64,

    open: Option<OpenChunk>,
}
impl Indexer {
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            names: Vec::new(),
            name_map: HashMap::new(),
            references: Vec::new(),
            line_no: 0,
            num_records: 0,
            last_start: 0,
            open: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Records the line spanning `[begin, end)` of the compressed stream
    ///
    /// Header lines within `line_skip`, comment lines and empty lines are not indexed.
    pub fn push_line(&mut self, line: &[u8], begin: VirtualOffset, end: VirtualOffset) -> Result<()> {
        self.line_no += 1;
        if self.line_no <= self.config.line_skip as usize
            || line.is_empty()
            || self.config.is_meta(line)
        {
            return Ok(());
        }
        let interval = self
            .config
            .parse_interval(line)
            .map_err(|e| e.at_line(self.line_no))?;

        let tid = self.sequence_for(interval.name)?;
        if let Some(open) = self.open.filter(|open| open.tid == tid) {
            if interval.start < self.last_start {
                return Err(BuildError::UnsortedInput {
                    line: self.line_no,
                    reason: format!(
                        "start {} follows start {} on {}",
                        interval.start + 1,
                        self.last_start + 1,
                        self.names[tid]
                    ),
                }
                .into());
            }
            debug_assert!(open.end <= begin);
        }
        self.last_start = interval.start;

        let bin = bin_of(interval.start, interval.end);
        match &mut self.open {
            Some(open) if open.tid == tid && open.bin == bin => open.end = end,
            open => {
                if let Some(closed) = open.replace(OpenChunk {
                    tid,
                    bin,
                    begin,
                    end,
                }) {
                    self.references[closed.tid]
                        .add_chunk(closed.bin, Chunk::new(closed.begin, closed.end));
                }
            }
        }
        self.references[tid].mark_windows(interval.start, interval.end, begin);
        self.num_records += 1;
        Ok(())
    }

    /// Resolves a sequence name, registering it if it starts a new group
    fn sequence_for(&mut self, name: &[u8]) -> Result<usize> {
        if let Some(&tid) = self.name_map.get(name) {
            return match self.open {
                Some(open) if open.tid != tid => Err(BuildError::UnsortedInput {
                    line: self.line_no,
                    reason: format!(
                        "sequence {} reappears after {}",
                        self.names[tid], self.names[open.tid]
                    ),
                }
                .into()),
                _ => Ok(tid),
            };
        }
        let tid = self.names.len();
        self.names.push(std::str::from_utf8(name)?.to_string());
        self.name_map.insert(name.to_vec(), tid);
        self.references.push(ReferenceBuilder::default());
        Ok(tid)
    }

    /// Moves the end of the open chunk from `from` to `to`
    ///
    /// A writer flushing its last block renormalizes the position after the final
    /// line to the start of the next block.
    pub(crate) fn relocate_end(&mut self, from: VirtualOffset, to: VirtualOffset) {
        if let Some(open) = self.open.as_mut().filter(|open| open.end == from) {
            open.end = to;
        }
    }

    /// Closes the open chunk and produces the final index
    pub fn finish(mut self) -> Result<Index> {
        if let Some(closed) = self.open.take() {
            self.references[closed.tid].add_chunk(closed.bin, Chunk::new(closed.begin, closed.end));
        }
        let references = self
            .references
            .into_iter()
            .map(ReferenceBuilder::finish)
            .collect();
        tracing::debug!(
            sequences = self.names.len(),
            records = self.num_records,
            lines = self.line_no,
            "built index"
        );
        Index::new(self.config, self.names, references)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::index::bins::MAX_COORDINATE;

    /// Pushes lines with synthetic offsets laid out as if every line were 100 bytes
    /// in a single uncompressed stream of 600-byte blocks
    fn index_lines(config: IndexConfig, lines: &[&str]) -> Result<Index> {
        let offset = |i: usize| {
            let pos = (i * 100) as u64;
            VirtualOffset::new(pos / 600 * 1000, (pos % 600) as u16)
        };
        let mut indexer = Indexer::new(config);
        for (i, line) in lines.iter().enumerate() {
            indexer.push_line(line.as_bytes(), offset(i), offset(i + 1))?;
        }
        indexer.finish()
    }

    #[test]
    fn test_sequence_order() -> Result<()> {
        let index = index_lines(
            IndexConfig::default(),
            &["#header", "chr2\t1\t10", "chr2\t5\t10", "chr1\t1\t10", ""],
        )?;
        assert_eq!(index.sequences(), ["chr2", "chr1"]);
        Ok(())
    }

    #[test]
    fn test_line_skip() -> Result<()> {
        let config = IndexConfig::builder().line_skip(1).build()?;
        let index = index_lines(config, &["not\ta\trecord", "chr1\t1\t10"])?;
        assert_eq!(index.sequences(), ["chr1"]);
        Ok(())
    }

    #[test]
    fn test_unsorted_start() {
        let err = index_lines(
            IndexConfig::default(),
            &["chr1\t100\t200", "chr1\t50\t60"],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuildError(BuildError::UnsortedInput { line: 2, .. })
        ));
    }

    #[test]
    fn test_sequence_reappears() {
        let err = index_lines(
            IndexConfig::default(),
            &["chr1\t1\t2", "chr2\t1\t2", "chr1\t5\t6"],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuildError(BuildError::UnsortedInput { line: 3, .. })
        ));
    }

    #[test]
    fn test_overflow_and_malformed() {
        let too_far = format!("chr1\t1\t{}", MAX_COORDINATE + 1);
        let err = index_lines(IndexConfig::default(), &[too_far.as_str()]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuildError(BuildError::CoordinateOverflow { line: 1, .. })
        ));

        let err = index_lines(IndexConfig::default(), &["chr1\tx\t5"]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuildError(BuildError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_chunks_follow_bin_runs() -> Result<()> {
        let index = index_lines(
            IndexConfig::default(),
            &[
                "chr1\t1\t100",
                "chr1\t50\t150",
                "chr1\t100\t40000",
                "chr1\t20000\t20010",
            ],
        )?;
        let reference = index.reference(0).unwrap();
        // the first two share a bin and are joined into one chunk
        assert_eq!(
            reference.bins()[&4681],
            vec![Chunk::new(VirtualOffset::new(0, 0), VirtualOffset::new(0, 200))]
        );
        assert_eq!(reference.bins()[&585].len(), 1);
        assert_eq!(reference.bins()[&4682].len(), 1);
        Ok(())
    }

    #[test]
    fn test_linear_index_filled() -> Result<()> {
        let index = index_lines(
            IndexConfig::default(),
            &["chr1\t1\t10", "chr1\t50000\t50010"],
        )?;
        let linear = index.reference(0).unwrap().linear();
        assert_eq!(linear.len(), 4);
        assert_eq!(linear[0], VirtualOffset::new(0, 0));
        // windows 1 and 2 hold no records and inherit window 0
        assert_eq!(linear[1], linear[0]);
        assert_eq!(linear[2], linear[0]);
        assert_eq!(linear[3], VirtualOffset::new(0, 100));
        Ok(())
    }

    #[test]
    fn test_merge_adjacent() {
        let vo = VirtualOffset::new;
        let merged = merge_adjacent(vec![
            Chunk::new(vo(0, 0), vo(100, 10)),
            Chunk::new(vo(100, 40), vo(200, 0)),
            Chunk::new(vo(900, 0), vo(900, 10)),
        ]);
        assert_eq!(
            merged,
            vec![
                Chunk::new(vo(0, 0), vo(200, 0)),
                Chunk::new(vo(900, 0), vo(900, 10)),
            ]
        );
    }
}
