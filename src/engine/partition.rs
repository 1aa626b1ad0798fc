//! Work partitioning

use crate::config::schema::EngineConfig;
use std::ops::Range;
use std::thread;

/// Bounds on parallel work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Worker threads, 0 = available parallelism
    pub max_workers: usize,
    /// Cells per chunk, 0 = derived from the grid size
    pub chunk_size: usize,
    /// Chunks per worker when the chunk size is derived
    pub chunks_per_worker: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            max_workers: 0,
            chunk_size: 0,
            chunks_per_worker: 4,
        }
    }
}

impl From<&EngineConfig> for Capacity {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            chunk_size: config.chunk_size,
            chunks_per_worker: config.chunks_per_worker,
        }
    }
}

impl Capacity {
    /// Number of worker threads to run
    pub fn workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Split of `hsize` grid cells into contiguous, equally sized chunks
/// (the last one may be shorter)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    hsize: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(hsize: usize, capacity: &Capacity) -> Self {
        let chunk_size = if capacity.chunk_size > 0 {
            capacity.chunk_size
        } else {
            let chunks = capacity.workers() * capacity.chunks_per_worker.max(1);
            hsize.div_ceil(chunks)
        };
        Self::with_chunk_size(hsize, chunk_size)
    }

    pub fn with_chunk_size(hsize: usize, chunk_size: usize) -> Self {
        Self {
            hsize,
            chunk_size: chunk_size.clamp(1, hsize.max(1)),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.hsize.div_ceil(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.hsize == 0
    }

    /// Cell range of every chunk, in dispatch order
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.hsize)
            .step_by(self.chunk_size)
            .map(|start| start..(start + self.chunk_size).min(self.hsize))
    }

    /// Workers that can be busy at once
    pub fn active_workers(&self, workers: usize) -> usize {
        workers.min(self.len())
    }
}
