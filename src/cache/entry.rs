//! Cached responses

use std::mem::size_of;

/// Fixed cost added to every entry on top of its payload
pub const ENTRY_OVERHEAD: usize = size_of::<CacheEntry>();

/// A computed response: JSON metadata followed by one data block per attribute.
///
/// Entries are immutable once built and shared through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    metadata: Vec<u8>,
    data: Vec<Vec<u8>>,
}

impl CacheEntry {
    pub fn new(metadata: Vec<u8>, data: Vec<Vec<u8>>) -> Self {
        Self { metadata, data }
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn data(&self) -> &[Vec<u8>] {
        &self.data
    }

    /// Bytes charged against the cache budget
    pub fn cost(&self) -> usize {
        self.metadata.len() + self.data.iter().map(Vec::len).sum::<usize>() + ENTRY_OVERHEAD
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
