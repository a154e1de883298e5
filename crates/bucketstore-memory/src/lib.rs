//! In-memory bucket store
//!
//! Implements [`bucketstore_core::PersistenceProvider`] entirely in process
//! memory. Each bucket keeps a timestamp-ordered log of document versions and
//! tombstones plus an identity index pointing at every document's newest
//! version.
//!
//! Key features:
//! - Incrementally maintained bucket checksums, recomputed lazily when a
//!   version is superseded or erased
//! - Resumable, byte-budgeted iteration with version and selection filters
//! - Bucket split and join driven by a pluggable bucket-id factory
//! - Writer exclusivity asserted per bucket; violations abort

pub mod content;
pub mod guard;
pub mod iterator;
pub mod store;

pub use content::{BucketContent, BucketEntry};
pub use guard::{BucketHandle, ExclusiveGuard};
pub use iterator::BucketIterator;
pub use store::MemoryBucketStore;
