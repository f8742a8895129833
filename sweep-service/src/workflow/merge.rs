// Merge Accumulator
// Groups processed batches into merge jobs under a fixed fan-in limit

use crate::workflow::models::{FileRef, MergeJob};

/// Running state of merge batching across a graph build.
///
/// At most one merge job is open at a time. `push_pair` hands back the job
/// it seals when the fan-in limit is reached; `flush` seals a partial job.
/// Merge indices keep increasing across flushes so archive names never
/// collide within a graph.
#[derive(Debug, Clone)]
pub struct MergeAccumulator {
    limit: usize,
    next_index: usize,
    bundled_inputs: Vec<FileRef>,
    open: Option<MergeJob>,
}

impl MergeAccumulator {
    /// `limit` is clamped to at least one pair per merge
    pub fn new(limit: usize, bundled_inputs: Vec<FileRef>) -> Self {
        Self {
            limit: limit.max(1),
            next_index: 0,
            bundled_inputs,
            open: None,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Index the next opened merge job will receive
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Pairs routed into the currently open merge job
    pub fn open_pairs(&self) -> usize {
        self.open.as_ref().map(MergeJob::pair_count).unwrap_or(0)
    }

    /// Route one (histogram, peak-area) pair, sealing the job once it is full
    pub fn push_pair(&mut self, histogram: FileRef, peak_areas: FileRef) -> Option<MergeJob> {
        let index = self.next_index;
        let bundled = &self.bundled_inputs;
        let job = self
            .open
            .get_or_insert_with(|| MergeJob::new(index, bundled.clone()));
        job.add_pair(histogram, peak_areas);

        if job.pair_count() >= self.limit {
            self.seal()
        } else {
            None
        }
    }

    /// Seal the open merge job even if it holds fewer than `limit` pairs
    pub fn flush(&mut self) -> Option<MergeJob> {
        self.seal()
    }

    fn seal(&mut self) -> Option<MergeJob> {
        let job = self.open.take()?;
        self.next_index += 1;
        Some(job)
    }
}
