use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::{
    Region, Result,
    bgzf::{BgzfReader, EOF_MARKER, VirtualOffset},
    cache::IndexCache,
    error::QueryError,
    index::{Index, IndexConfig, Indexer, index_path, read_index, write_index},
    query::Records,
};

/// A BGZF data file paired with its index.
///
/// Each handle owns a single stream position; open further handles with
/// [`IndexedReader::try_clone_handle`] (file-backed) or [`MmapReader::reader`] to query
/// from several threads at once. The index itself is shared.
pub struct IndexedReader<R: Read + Seek> {
    /// Stream handle, `None` once closed
    inner: Option<BgzfReader<R>>,

    index: Arc<Index>,

    /// Backing file for file-opened handles
    path: Option<PathBuf>,
}
impl IndexedReader<BufReader<File>> {
    /// Opens `path` and loads the index stored at `<path>.tbi`
    ///
    /// Fails with `IndexMissing` when no index exists; see [`build_index`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let index = read_index(index_path(path))?;
        Self::with_index(path, Arc::new(index))
    }

    /// Opens `path`, taking the index from `cache`
    pub fn from_path_cached<P: AsRef<Path>>(path: P, cache: &IndexCache) -> Result<Self> {
        let path = path.as_ref();
        let index = cache.get(path)?;
        Self::with_index(path, index)
    }

    /// Opens `path` with an already loaded index
    pub fn with_index<P: AsRef<Path>>(path: P, index: Arc<Index>) -> Result<Self> {
        let path = path.as_ref();
        let mut inner = BgzfReader::new(BufReader::new(File::open(path)?));
        if !inner.has_eof_marker()? {
            tracing::warn!(path = %path.display(), "BGZF EOF marker missing, file may be truncated");
        }
        Ok(Self {
            inner: Some(inner),
            index,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a second stream on the same file, sharing the loaded index
    pub fn try_clone_handle(&self) -> Result<Self> {
        if self.is_closed() {
            return Err(QueryError::ReaderClosed.into());
        }
        let Some(path) = self.path.as_deref() else {
            return Err(std::io::Error::other("reader has no backing file").into());
        };
        let inner = BgzfReader::new(BufReader::new(File::open(path)?));
        Ok(Self {
            inner: Some(inner),
            index: self.index.clone(),
            path: self.path.clone(),
        })
    }
}

impl<R: Read + Seek> IndexedReader<R> {
    /// Wraps a seekable BGZF stream described by `index`
    pub fn new(inner: R, index: Arc<Index>) -> Self {
        Self {
            inner: Some(BgzfReader::new(inner)),
            index,
            path: None,
        }
    }

    /// Sequence names in the order they appear in the data file
    #[must_use]
    pub fn sequences(&self) -> &[String] {
        self.index.sequences()
    }

    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the records overlapping `region`
    pub fn query(&mut self, region: &Region) -> Result<Records<'_, R>> {
        let reader = self.inner.as_mut().ok_or(QueryError::ReaderClosed)?;
        let (tid, start, end) = self.index.resolve(region)?;
        let chunks = self.index.chunks(tid, start, end);
        Ok(Records::new(
            reader,
            *self.index.config(),
            region.name().to_string(),
            start,
            end,
            chunks,
        ))
    }

    /// Parses a `NAME[:START[-END]]` expression and runs the query
    pub fn query_str(&mut self, expr: &str) -> Result<Records<'_, R>> {
        let region = Region::parse(expr)?;
        self.query(&region)
    }

    /// Queries `[start, end)` of `name`, defaulting to the whole sequence
    pub fn fetch(
        &mut self,
        name: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<Records<'_, R>> {
        let region = match (start, end) {
            (None, None) => Region::whole(name),
            (start, end) => Region::new(
                name,
                start.unwrap_or(0),
                end.unwrap_or(crate::index::bins::MAX_COORDINATE),
            )?,
        };
        self.query(&region)
    }

    /// Releases the stream handle; further queries fail with `ReaderClosed`
    pub fn close(&mut self) {
        self.inner = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// Reads every line of a BGZF stream from the start, producing its index
pub fn index_stream<R: Read + Seek>(reader: &mut BgzfReader<R>, config: &IndexConfig) -> Result<Index> {
    reader.seek_virtual(VirtualOffset::default())?;
    let mut indexer = Indexer::new(*config);
    let mut line = Vec::new();
    loop {
        let begin = reader.virtual_offset();
        line.clear();
        if reader.read_line_into(&mut line)? == 0 {
            break;
        }
        indexer.push_line(&line, begin, reader.virtual_offset())?;
    }
    indexer.finish()
}

/// Builds the index of an existing BGZF data file and stores it at `<path>.tbi`
///
/// Nothing is written if the build fails.
pub fn build_index<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Result<Index> {
    let path = path.as_ref();
    let mut reader = BgzfReader::new(BufReader::new(File::open(path)?));
    if !reader.has_eof_marker()? {
        tracing::warn!(path = %path.display(), "BGZF EOF marker missing, file may be truncated");
    }
    let index = index_stream(&mut reader, config)?;
    write_index(&index, index_path(path))?;
    Ok(index)
}

/// Shared view of a memory-mapped file
#[derive(Clone)]
pub struct MappedBytes(Arc<Mmap>);
impl AsRef<[u8]> for MappedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A memory-mapped data file with its index
///
/// Cloning is cheap: the map and the index are shared. Every call to
/// [`MmapReader::reader`] produces an independent handle with its own position.
#[derive(Clone)]
pub struct MmapReader {
    inner: Arc<Mmap>,
    index: Arc<Index>,
}
impl MmapReader {
    /// Maps `path` and loads the index stored at `<path>.tbi`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let index = read_index(index_path(path))?;
        Self::with_index(path, Arc::new(index))
    }

    /// Maps `path` using an already loaded index
    pub fn with_index<P: AsRef<Path>>(path: P, index: Arc<Index>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;
        if !inner.ends_with(&EOF_MARKER) {
            tracing::warn!(path = %path.display(), "BGZF EOF marker missing, file may be truncated");
        }
        Ok(Self {
            inner: Arc::new(inner),
            index,
        })
    }

    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    #[must_use]
    pub fn sequences(&self) -> &[String] {
        self.index.sequences()
    }

    /// Size of the compressed file in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A new query handle over the shared map
    #[must_use]
    pub fn reader(&self) -> IndexedReader<Cursor<MappedBytes>> {
        IndexedReader::new(
            Cursor::new(MappedBytes(self.inner.clone())),
            self.index.clone(),
        )
    }
}
