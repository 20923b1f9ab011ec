//! # BGZF Block Codec
//!
//! BGZF is a series of concatenated gzip members, each of which is an independently
//! decompressible block of at most 64 KiB of payload.
//! Every block advertises its own compressed size in a gzip `FEXTRA` subfield, which
//! allows a reader to walk the file block-by-block without inflating skipped blocks.
//!
//! ## Block Structure
//!
//! ```text
//! ┌───────────────────┐
//! │   Block Header    │ 18 bytes (gzip header + `BC` subfield carrying BSIZE)
//! ├───────────────────┤
//! │                   │
//! │  Deflate Payload  │ Variable size
//! │                   │
//! ├───────────────────┤
//! │   Block Footer    │ 8 bytes (CRC32 + ISIZE)
//! └───────────────────┘
//! ```
//!
//! A well-formed stream ends with a fixed 28-byte empty block ([`EOF_MARKER`]).
//!
//! ## Virtual Offsets
//!
//! Any byte of the decompressed stream is addressed by a [`VirtualOffset`]: the
//! compressed offset of its block in the upper 48 bits and the position inside the
//! decompressed block in the lower 16 bits.

mod block;
mod reader;
mod virtual_offset;
mod writer;

pub use block::{BlockHeader, BlockInfo, EOF_MARKER, compress_block, decompress_block};
pub use reader::BgzfReader;
pub use virtual_offset::VirtualOffset;
pub use writer::BgzfWriter;

/// The gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Identifier of the BGZF extra subfield (`BC`)
pub const BGZF_SUBFIELD: [u8; 2] = *b"BC";

/// Maximum size of a block, compressed or decompressed
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Maximum payload accepted into a single block by the writer
pub const BLOCK_DATA_SIZE: usize = 0xff00;

/// Size of the block header in bytes
pub const SIZE_BLOCK_HEADER: usize = size_of::<BlockHeader>();

/// Size of the block footer (CRC32 + ISIZE) in bytes
pub const SIZE_BLOCK_FOOTER: usize = 8;
