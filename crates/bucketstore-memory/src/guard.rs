//! Per-bucket access guards
//!
//! Every bucket lives behind a [`BucketHandle`]. Readers take a shared guard;
//! writers take an [`ExclusiveGuard`], which additionally asserts that no
//! other writer is inside the bucket. Callers are expected to serialize
//! mutations of one bucket themselves, so a second concurrent writer is a
//! contract violation and aborts instead of waiting.

use crate::content::BucketContent;
use bucketstore_core::types::BucketId;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct BucketHandle {
    id: BucketId,
    in_use: AtomicBool,
    content: RwLock<BucketContent>,
}

impl BucketHandle {
    pub fn new(id: BucketId) -> Self {
        Self::with_content(id, BucketContent::new())
    }

    pub fn with_content(id: BucketId, content: BucketContent) -> Self {
        Self {
            id,
            in_use: AtomicBool::new(false),
            content: RwLock::new(content),
        }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Whether a writer currently holds the bucket.
    pub fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BucketContent> {
        self.content.read()
    }

    /// Take the bucket for mutation.
    ///
    /// # Panics
    ///
    /// Panics if another exclusive guard for this bucket is alive.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        if self.in_use.swap(true, Ordering::AcqRel) {
            tracing::error!(bucket = %self.id, "Bucket is already held by another writer");
            panic!("bucket {} is already in use by another writer", self.id);
        }
        ExclusiveGuard {
            handle: self,
            content: self.content.write(),
        }
    }

    /// Write access that does not participate in the in-use assertion.
    /// Used for node-wide state changes that may race with regular writers.
    pub(crate) fn write_unchecked(&self) -> RwLockWriteGuard<'_, BucketContent> {
        self.content.write()
    }
}

/// Exclusive access to one bucket; releases the in-use flag on drop.
pub struct ExclusiveGuard<'a> {
    handle: &'a BucketHandle,
    content: RwLockWriteGuard<'a, BucketContent>,
}

impl ExclusiveGuard<'_> {
    pub fn bucket(&self) -> BucketId {
        self.handle.id
    }
}

impl Deref for ExclusiveGuard<'_> {
    type Target = BucketContent;

    fn deref(&self) -> &BucketContent {
        &self.content
    }
}

impl DerefMut for ExclusiveGuard<'_> {
    fn deref_mut(&mut self) -> &mut BucketContent {
        &mut self.content
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.handle.in_use.store(false, Ordering::Release);
    }
}
