use std::sync::Arc;
use std::thread;

use crate::{MmapReader, Record, Region, Result};

/// Trait for readers that can answer many region queries in parallel
///
/// This is implemented by the **reader** not by the **processor**.
/// For the **processor**, see the [`ParallelProcessor`] trait.
pub trait ParallelReader {
    /// Process every record of every sequence
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()>;

    /// Process the records overlapping each region
    ///
    /// Regions are distributed across `num_threads` threads in contiguous runs; each
    /// thread receives its own clone of the processor and its own read position. A
    /// thread count of zero uses all available CPUs.
    ///
    /// Every region is resolved before any thread starts, so an unknown sequence
    /// fails the call without processing anything.
    fn process_regions<P: ParallelProcessor + Clone + 'static>(
        self,
        regions: Vec<Region>,
        processor: P,
        num_threads: usize,
    ) -> Result<()>;
}

/// Trait for types that can process records in parallel.
///
/// This is implemented by the **processor** not by the **reader**.
/// For the **reader**, see the [`ParallelReader`] trait.
pub trait ParallelProcessor: Send + Clone {
    /// Process a single record
    fn process_record(&mut self, record: &Record) -> Result<()>;

    /// Called when a thread finishes the records of one region
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    ///
    /// Each thread should call this method with its own unique ID.
    fn set_tid(&mut self, _tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}

impl ParallelReader for MmapReader {
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let regions = self
            .sequences()
            .iter()
            .map(Region::whole)
            .collect::<Vec<_>>();
        self.process_regions(regions, processor, num_threads)
    }

    fn process_regions<P: ParallelProcessor + Clone + 'static>(
        self,
        regions: Vec<Region>,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };

        for region in &regions {
            self.index().resolve(region)?;
        }
        if regions.is_empty() {
            return Ok(()); // nothing to do
        }

        let regions = Arc::new(regions);
        let regions_per_thread = regions.len().div_ceil(num_threads);

        let mut handles = Vec::new();
        for tid in 0..num_threads {
            let start = tid * regions_per_thread;
            let end = (start + regions_per_thread).min(regions.len());
            if start >= end {
                break;
            }

            let mut t_reader = self.reader();
            let mut t_proc = processor.clone();
            t_proc.set_tid(tid);
            let regions = regions.clone();

            let handle = thread::spawn(move || -> Result<()> {
                for region in &regions[start..end] {
                    for record in t_reader.query(region)? {
                        t_proc.process_record(&record?)?;
                    }
                    t_proc.on_batch_complete()?;
                }
                Ok(())
            });
            handles.push(handle);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("region worker thread panicked"))??;
        }
        Ok(())
    }
}
