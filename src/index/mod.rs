//! # Tabix Index
//!
//! A tabix index maps genomic intervals to the regions of a BGZF-compressed text
//! file that may contain overlapping records. Two structures are kept per sequence:
//!
//! * a binning index, assigning every record to the smallest bin of a fixed
//!   hierarchy that fully contains it and storing the chunks of the compressed
//!   stream holding each bin's records
//! * a linear index, storing for every 16 Kbp window the smallest virtual offset of
//!   any record overlapping it, which lets a query skip chunks that end too early
//!
//! Indices are built in a single pass over sorted input with [`Indexer`] and stored
//! next to the data file with the `.tbi` extension.

pub mod bins;
mod builder;
pub mod codec;
mod config;
mod core;

pub use builder::Indexer;
pub use codec::{INDEX_EXTENSION, TBI_MAGIC, decode, encode, index_path, read_index, write_index};
pub use config::{FLAG_ZERO_BASED, Format, IndexConfig, IndexConfigBuilder, Interval, IntervalError};
pub use self::core::{Chunk, Index, ReferenceIndex};
