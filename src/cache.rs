use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::{
    Error, Result,
    error::IndexError,
    index::{Index, IndexConfig, index_path, read_index},
    reader::build_index,
};

/// Modification times of a data file and its index when the entry was loaded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Stamp {
    data: SystemTime,
    index: SystemTime,
}

/// An opt-in cache of loaded indices shared across reader handles.
///
/// Entries are keyed by the canonical data file path and remain valid only while
/// the modification times of both the data file and the index are unchanged. A stale
/// entry is replaced on the next lookup.
#[derive(Debug, Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<PathBuf, (Stamp, Arc<Index>)>>,
}
impl IndexCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `data_path`, loading it if absent or stale
    pub fn get<P: AsRef<Path>>(&self, data_path: P) -> Result<Arc<Index>> {
        let canonical = fs::canonicalize(data_path.as_ref())?;
        let idx_path = index_path(&canonical);
        let index_meta = match fs::metadata(&idx_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.entries.lock().remove(&canonical);
                return Err(IndexError::IndexMissing(idx_path.display().to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        let stamp = Stamp {
            data: fs::metadata(&canonical)?.modified()?,
            index: index_meta.modified()?,
        };

        if let Some((cached, index)) = self.entries.lock().get(&canonical) {
            if *cached == stamp {
                tracing::trace!(path = %canonical.display(), "index cache hit");
                return Ok(index.clone());
            }
        }

        let index = Arc::new(read_index(&idx_path)?);
        tracing::debug!(path = %canonical.display(), "loaded index into cache");
        self.entries
            .lock()
            .insert(canonical, (stamp, index.clone()));
        Ok(index)
    }

    /// Like [`IndexCache::get`], building and storing the index first if none exists
    pub fn get_or_build<P: AsRef<Path>>(&self, data_path: P, config: &IndexConfig) -> Result<Arc<Index>> {
        let data_path = data_path.as_ref();
        match self.get(data_path) {
            Err(Error::IndexError(IndexError::IndexMissing(_))) => {
                build_index(data_path, config)?;
                self.get(data_path)
            }
            other => other,
        }
    }

    /// Drops the entry of `data_path`, if any
    pub fn invalidate<P: AsRef<Path>>(&self, data_path: P) {
        let path = fs::canonicalize(data_path.as_ref())
            .unwrap_or_else(|_| data_path.as_ref().to_path_buf());
        self.entries.lock().remove(&path);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod testing {
    use std::io::Write;
    use std::time::Duration;

    use super::*;
    use crate::{IndexedReader, bgzf::BgzfWriter};

    fn write_bed(path: &Path, lines: &[&str]) -> Result<()> {
        let mut writer = BgzfWriter::new(fs::File::create(path)?);
        for line in lines {
            writeln!(writer, "{line}")?;
        }
        writer.finish()?;
        Ok(())
    }

    #[test]
    fn test_cache_hit_shares_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.bed.gz");
        write_bed(&path, &["chr1\t0\t10"])?;

        let cache = IndexCache::new();
        let first = cache.get_or_build(&path, &IndexConfig::bed())?;
        let second = cache.get(&path)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let reader = IndexedReader::from_path_cached(&path, &cache)?;
        assert!(Arc::ptr_eq(reader.index(), &first));
        Ok(())
    }

    #[test]
    fn test_stale_entry_reloaded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("b.bed.gz");
        write_bed(&path, &["chr1\t0\t10"])?;

        let cache = IndexCache::new();
        let first = cache.get_or_build(&path, &IndexConfig::bed())?;
        assert_eq!(first.sequences(), ["chr1"]);

        write_bed(&path, &["chr1\t0\t10", "chr2\t0\t10"])?;
        crate::build_index(&path, &IndexConfig::bed())?;
        let later = SystemTime::now() + Duration::from_secs(10);
        fs::File::options()
            .write(true)
            .open(index_path(&path))?
            .set_modified(later)?;

        let second = cache.get(&path)?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.sequences(), ["chr1", "chr2"]);
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_index_evicts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.bed.gz");
        write_bed(&path, &["chr1\t0\t10"])?;

        let cache = IndexCache::new();
        cache.get_or_build(&path, &IndexConfig::bed())?;
        fs::remove_file(index_path(&path))?;
        let err = cache.get(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexError(IndexError::IndexMissing(_))
        ));
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalidate_and_clear() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("d.bed.gz");
        write_bed(&path, &["chr1\t0\t10"])?;

        let cache = IndexCache::new();
        cache.get_or_build(&path, &IndexConfig::bed())?;
        cache.invalidate(&path);
        assert!(cache.is_empty());
        cache.get(&path)?;
        cache.clear();
        assert!(cache.is_empty());
        Ok(())
    }
}
