//! # tabix
//!
//! Random access to sorted, tab-delimited interval files (GFF, BED, VCF, SAM and
//! anything with a sequence column and coordinate columns).
//!
//! Data files are stored as BGZF, a series of independently compressed blocks, and
//! accompanied by a `.tbi` index mapping genomic intervals to the compressed regions
//! that may hold overlapping records. A query seeks straight to those regions instead
//! of decompressing the whole file.
//!
//! ## Overview
//!
//! - [`bgzf`]: the block codec, with a seekable [`BgzfReader`] and a [`BgzfWriter`]
//! - [`index`]: binning, the [`Index`] model, its builder and `.tbi` serialization
//! - [`IndexedReader`]: an engine handle answering [`Region`] queries with a lazy
//!   iterator of raw record lines
//! - [`IndexedWriter`] / [`compress_file`]: compress and index in one pass
//! - [`build_index`]: index an existing BGZF file
//! - [`IndexCache`]: an opt-in cache of loaded indices shared across handles
//! - [`ParallelReader`]: multi-threaded region processing over a memory-mapped file
//!
//! ## Example
//!
//! ```no_run
//! use tabix::{IndexConfig, IndexedReader, Region, Result, compress_file};
//!
//! fn main() -> Result<()> {
//!     compress_file("genes.gff", "genes.gff.gz", &IndexConfig::gff())?;
//!
//!     let mut reader = IndexedReader::from_path("genes.gff.gz")?;
//!     for record in reader.query(&Region::parse("chr1:2090-3000")?)? {
//!         println!("{}", record?.as_str()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bgzf;
mod cache;
pub mod error;
pub mod index;
mod parallel;
mod query;
mod reader;
mod region;
mod write;

pub use bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
pub use cache::IndexCache;
pub use error::{Error, IntoTabixError, Result};
pub use index::{Format, Index, IndexConfig, IndexConfigBuilder};
pub use parallel::{ParallelProcessor, ParallelReader};
pub use query::{Record, Records};
pub use reader::{IndexedReader, MappedBytes, MmapReader, build_index, index_stream};
pub use region::Region;
pub use write::{IndexedWriter, compress_file};
