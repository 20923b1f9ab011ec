use std::error::Error as StdError;

/// Custom Result type for tabix operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the tabix library, encompassing all possible error cases
/// that can occur while compressing, indexing, or querying a file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the BGZF block container
    #[error("Error processing BGZF: {0}")]
    BgzfError(#[from] BgzfError),

    /// Errors related to loading or decoding an index
    #[error("Error processing Index: {0}")]
    IndexError(#[from] IndexError),

    /// Errors that occur while building an index
    #[error("Error building index: {0}")]
    BuildError(#[from] BuildError),

    /// Errors that occur while resolving or running a query
    #[error("Error querying file: {0}")]
    QueryError(#[from] QueryError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Conversion errors from anyhow errors (typically raised by user processors)
    #[error("Generic error: {0}")]
    AnyhowError(#[from] anyhow::Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error means the index (or the data it points into) can no longer be trusted
    ///
    /// Callers typically respond by rebuilding the index from the data file.
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        match self {
            Self::BgzfError(_) => true,
            Self::IndexError(err) => err.needs_rebuild(),
            _ => false,
        }
    }

    /// Checks if the error is a query against a sequence the index does not know
    #[must_use]
    pub fn is_unknown_sequence(&self) -> bool {
        matches!(self, Self::QueryError(QueryError::UnknownSequence(_)))
    }
}

/// Errors raised by the BGZF block codec
#[derive(thiserror::Error, Debug)]
pub enum BgzfError {
    /// A block failed validation (header, subfield, trailer sizes or checksum)
    #[error("Corrupt BGZF block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },

    /// A virtual offset points past the end of the decompressed block
    #[error("Virtual offset {0:#x} is outside of its block")]
    InvalidVirtualOffset(u64),
}
impl BgzfError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            offset,
            reason: reason.into(),
        }
    }
}

/// Errors related to tabix index files
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The leading magic token of the index does not match `TBI\1`
    #[error("Invalid index magic: {0:?}")]
    BadMagic([u8; 4]),

    /// Fewer bytes remain than a preceding length field declared
    #[error("Index truncated: needed {needed} bytes but only {available} remain")]
    TruncatedIndex { needed: usize, available: usize },

    /// No index file was found next to the data file
    #[error("Index missing for file: {0}")]
    IndexMissing(String),

    /// The preset word names a format this library does not know
    #[error("Unknown index format code: {0}")]
    InvalidFormat(i32),

    /// The sequence name dictionary does not match the declared reference count
    #[error("Sequence dictionary declares {declared} names but contains {found}")]
    InvalidSequenceNames { declared: usize, found: usize },

    /// A length or count field holds a negative value
    #[error("Negative {field} ({value}) in index")]
    NegativeLength { field: &'static str, value: i32 },
}
impl IndexError {
    /// Checks if this error indicates the index must be rebuilt
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Self::IndexMissing(_))
    }
}

/// Errors that abort an index build
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// Records are not grouped by sequence or not sorted by start within a sequence
    #[error("Unsorted input at line {line}: {reason}")]
    UnsortedInput { line: usize, reason: String },

    /// A record extends beyond the largest coordinate the binning scheme can represent
    #[error("Coordinate {end} at line {line} exceeds the maximum of {max}")]
    CoordinateOverflow { line: usize, end: u64, max: u64 },

    /// A record could not be parsed with the configured columns
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// The column configuration is not usable
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that occur while resolving regions and reading records
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// The sequence name is not present in the index dictionary
    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    /// The requested end lies before the requested start
    #[error("Invalid range specified: start ({start}) is greater than end ({end})")]
    InvalidRange { start: u64, end: u64 },

    /// A record reached during a scan could not be parsed with the index columns
    #[error("Malformed record at virtual offset {offset:#x}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    /// The region expression does not follow `NAME[:START[-END]]`
    #[error("Malformed region expression: {0}")]
    MalformedRegion(String),

    /// The reader has been closed
    #[error("Reader has been closed")]
    ReaderClosed,
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoTabixError {
    fn into_tabix_error(self) -> Error;
}

impl<E> IntoTabixError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_tabix_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}
