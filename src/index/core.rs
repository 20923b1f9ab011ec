use std::collections::{BTreeMap, HashMap};

use super::bins::{MAX_COORDINATE, bins_overlapping, window_of};
use super::config::IndexConfig;
use crate::{
    Region, Result,
    bgzf::VirtualOffset,
    error::{IndexError, QueryError},
};

/// A contiguous run of the compressed stream holding records of one bin
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    pub begin: VirtualOffset,
    pub end: VirtualOffset,
}
impl Chunk {
    #[must_use]
    pub fn new(begin: VirtualOffset, end: VirtualOffset) -> Self {
        Self { begin, end }
    }
}

/// Binning and linear index of a single sequence
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Chunks per bin identifier
    pub(crate) bins: BTreeMap<u32, Vec<Chunk>>,

    /// Smallest record offset per 16 Kbp window
    pub(crate) linear: Vec<VirtualOffset>,
}
impl ReferenceIndex {
    #[must_use]
    pub fn new(bins: BTreeMap<u32, Vec<Chunk>>, linear: Vec<VirtualOffset>) -> Self {
        Self { bins, linear }
    }

    #[must_use]
    pub fn bins(&self) -> &BTreeMap<u32, Vec<Chunk>> {
        &self.bins
    }

    #[must_use]
    pub fn linear(&self) -> &[VirtualOffset] {
        &self.linear
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Lower bound on the offset of any record overlapping `position` or later
    ///
    /// Positions past the last window use the last window.
    #[must_use]
    pub fn min_offset(&self, position: u64) -> VirtualOffset {
        let window = window_of(position);
        self.linear
            .get(window)
            .or_else(|| self.linear.last())
            .copied()
            .unwrap_or_default()
    }
}

/// An in-memory tabix index.
///
/// Holds the column configuration used to build it, the sequence dictionary in
/// first-seen order, and a [`ReferenceIndex`] for every sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    config: IndexConfig,
    names: Vec<String>,
    name_map: HashMap<String, usize>,
    references: Vec<ReferenceIndex>,
}
impl Index {
    /// Assembles an index from its parts
    ///
    /// Fails if the dictionary and the reference list differ in length.
    pub fn new(
        config: IndexConfig,
        names: Vec<String>,
        references: Vec<ReferenceIndex>,
    ) -> Result<Self> {
        if names.len() != references.len() {
            return Err(IndexError::InvalidSequenceNames {
                declared: references.len(),
                found: names.len(),
            }
            .into());
        }
        let name_map = names
            .iter()
            .enumerate()
            .map(|(tid, name)| (name.clone(), tid))
            .collect::<HashMap<_, _>>();
        if name_map.len() != names.len() {
            return Err(IndexError::InvalidSequenceNames {
                declared: names.len(),
                found: name_map.len(),
            }
            .into());
        }
        Ok(Self {
            config,
            names,
            name_map,
            references,
        })
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Sequence names in the order they first appeared in the data file
    #[must_use]
    pub fn sequences(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn num_sequences(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    #[must_use]
    pub fn reference(&self, tid: usize) -> Option<&ReferenceIndex> {
        self.references.get(tid)
    }

    /// Numeric identifier of a sequence name
    pub fn sequence_id(&self, name: &str) -> Result<usize> {
        self.name_map
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::UnknownSequence(name.to_string()).into())
    }

    /// Resolves a region to a sequence identifier and a clamped half-open interval
    pub fn resolve(&self, region: &Region) -> Result<(usize, u64, u64)> {
        let tid = self.sequence_id(region.name())?;
        let start = region.start();
        let end = region.end().min(MAX_COORDINATE);
        if start > region.end() {
            return Err(QueryError::InvalidRange {
                start,
                end: region.end(),
            }
            .into());
        }
        Ok((tid, start, end))
    }

    /// Plans the chunks to scan for records of `tid` overlapping `[start, end)`
    ///
    /// Candidate chunks come from every bin overlapping the interval. Chunks ending
    /// before the linear index bound are dropped, the rest are sorted and merged
    /// when they overlap or touch the same compressed block.
    #[must_use]
    pub fn chunks(&self, tid: usize, start: u64, end: u64) -> Vec<Chunk> {
        let Some(reference) = self.references.get(tid) else {
            return Vec::new();
        };
        let min_offset = reference.min_offset(start);
        let mut candidates = bins_overlapping(start, end)
            .iter()
            .filter_map(|bin| reference.bins.get(bin))
            .flatten()
            .filter(|chunk| chunk.end > min_offset)
            .copied()
            .collect::<Vec<_>>();
        let num_candidates = candidates.len();
        candidates.sort_unstable();

        let mut merged: Vec<Chunk> = Vec::with_capacity(candidates.len());
        for chunk in candidates {
            match merged.last_mut() {
                Some(prev) if chunk.begin <= prev.end || prev.end.same_block(chunk.begin) => {
                    prev.end = prev.end.max(chunk.end);
                }
                _ => merged.push(chunk),
            }
        }
        tracing::debug!(
            tid,
            start,
            end,
            candidates = num_candidates,
            chunks = merged.len(),
            "planned query"
        );
        merged
    }
}
