//! Response cache
//!
//! Computed attribute responses are cached in memory, keyed by a fingerprint
//! of the request. The cache lives for the life of the process and is handed
//! to request handlers as an `Arc<dyn ResultCache>`.
//!
//! # Costs
//!
//! | Part | Charged |
//! |------|---------|
//! | Metadata | length in bytes |
//! | Data blocks | sum of lengths |
//! | Overhead | [`ENTRY_OVERHEAD`], once per entry |

pub mod entry;
pub mod fingerprint;
pub mod store;

pub use entry::{format_bytes, CacheEntry, ENTRY_OVERHEAD};
pub use fingerprint::{CacheKey, Fingerprint};
pub use store::{new_cache, MemoryCache, NoCache, ResultCache};
