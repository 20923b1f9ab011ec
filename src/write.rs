use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use flate2::Compression;

use crate::{
    Result,
    bgzf::BgzfWriter,
    index::{
        Index, IndexConfig, Indexer,
        codec::{stage_index, temp_path},
        index_path,
    },
};

/// Compresses record lines into BGZF while indexing them in the same pass
pub struct IndexedWriter<W: Write> {
    writer: BgzfWriter<W>,
    indexer: Indexer,
}
impl<W: Write> IndexedWriter<W> {
    pub fn new(inner: W, config: IndexConfig) -> Self {
        Self::with_level(inner, config, Compression::default())
    }

    pub fn with_level(inner: W, config: IndexConfig, level: Compression) -> Self {
        Self {
            writer: BgzfWriter::with_level(inner, level),
            indexer: Indexer::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        self.indexer.config()
    }

    /// Number of indexed records written so far
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.indexer.num_records()
    }

    /// Writes one line, which must not contain its terminating newline
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let begin = self.writer.virtual_offset();
        self.writer.write_all(line)?;
        self.writer.write_all(b"\n")?;
        self.indexer
            .push_line(line, begin, self.writer.virtual_offset())
    }

    /// Terminates the stream and returns the inner writer with the finished index
    pub fn finish(mut self) -> Result<(W, Index)> {
        let before = self.writer.virtual_offset();
        self.writer.flush_block()?;
        self.indexer
            .relocate_end(before, self.writer.virtual_offset());
        let index = self.indexer.finish()?;
        let inner = self.writer.finish()?;
        Ok((inner, index))
    }
}

/// Compresses the text file `src` into `dst` and stores its index at `<dst>.tbi`
///
/// Data and index are staged in temporary files and moved into place only once both
/// are complete. A previous index is removed before the new data replaces `dst`, so
/// it is never left paired with data it does not describe.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dst: Q,
    config: &IndexConfig,
) -> Result<Index> {
    let dst = dst.as_ref();
    let idx = index_path(dst);
    let tmp = temp_path(dst);
    let mut staged_index = None;

    let result = (|| -> Result<Index> {
        let mut reader = BufReader::new(File::open(src.as_ref())?);
        let mut writer = IndexedWriter::new(BufWriter::new(File::create(&tmp)?), *config);
        let mut line = Vec::new();
        while reader.read_until(b'\n', &mut line)? > 0 {
            if line.last() == Some(&b'\n') {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            }
            writer.write_line(&line)?;
            line.clear();
        }
        let (mut inner, index) = writer.finish()?;
        inner.flush()?;
        let idx_tmp = staged_index.insert(stage_index(&index, &idx)?);

        // drop the old index first so the new data is never read through it
        match fs::remove_file(&idx) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::rename(&tmp, dst)?;
        fs::rename(idx_tmp, &idx)?;
        Ok(index)
    })();

    match result {
        Ok(index) => {
            tracing::debug!(
                path = %dst.display(),
                sequences = index.num_sequences(),
                "compressed and indexed"
            );
            Ok(index)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            if let Some(idx_tmp) = staged_index {
                let _ = fs::remove_file(idx_tmp);
            }
            Err(e)
        }
    }
}
