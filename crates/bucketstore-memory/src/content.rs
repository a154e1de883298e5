//! Physical state of a single bucket.
//!
//! The log is a timestamp-sorted vector that owns its entries through `Arc`;
//! the identity index aliases them through `Weak` so both views always refer
//! to the same record without duplicating document data.

use bucketstore_core::types::{
    ActiveState, BucketChecksum, BucketInfo, DocEntry, GlobalId, ReadyState, Timestamp,
};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};

/// A log record paired with its identity key.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub entry: Arc<DocEntry>,
    pub gid: GlobalId,
}

/// Cached aggregate plus the raw XOR fold it was derived from.
#[derive(Debug, Clone, Copy)]
struct InfoCache {
    info: BucketInfo,
    fold: u32,
    outdated: bool,
}

impl InfoCache {
    fn empty() -> Self {
        Self {
            info: BucketInfo::empty(),
            fold: 0,
            outdated: false,
        }
    }

    /// Account for an entry whose identity was not in the bucket before.
    fn add_new_identity(&mut self, entry: &DocEntry, gid: &GlobalId) {
        if self.outdated {
            return;
        }
        let size = u64::from(entry.size());
        self.info.entry_count += 1;
        self.info.used_size += size;
        if !entry.is_remove() {
            self.fold ^= BucketChecksum::for_entry(gid, entry.timestamp());
            self.info.document_count += 1;
            self.info.document_size += size;
        }
        self.info.checksum = BucketChecksum::from_fold(self.fold, self.info.document_count);
    }
}

#[derive(Debug)]
pub struct BucketContent {
    entries: Vec<BucketEntry>,
    gid_index: HashMap<GlobalId, Weak<DocEntry>>,
    cache: Mutex<InfoCache>,
    active: bool,
}

impl Default for BucketContent {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketContent {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            gid_index: HashMap::new(),
            cache: Mutex::new(InfoCache::empty()),
            active: false,
        }
    }

    fn position(&self, timestamp: Timestamp) -> Result<usize, usize> {
        self.entries
            .binary_search_by_key(&timestamp, |e| e.entry.timestamp())
    }

    /// Insert `entry` at its timestamp position.
    ///
    /// # Panics
    ///
    /// Panics if a different entry already occupies the same timestamp: two
    /// writers disagree about history and the aggregate can no longer be
    /// trusted.
    pub fn insert(&mut self, entry: Arc<DocEntry>) {
        let timestamp = entry.timestamp();
        let gid = entry.global_id();

        let appends = self
            .entries
            .last()
            .map_or(true, |last| last.entry.timestamp() < timestamp);
        if appends {
            self.entries.push(BucketEntry {
                entry: Arc::clone(&entry),
                gid,
            });
        } else {
            match self.position(timestamp) {
                Ok(pos) => {
                    let existing = &self.entries[pos].entry;
                    if **existing == *entry {
                        tracing::debug!(timestamp, "Ignoring duplicate entry");
                        return;
                    }
                    tracing::error!(
                        timestamp,
                        existing = ?existing,
                        incoming = ?entry,
                        "Conflicting entry at an occupied timestamp"
                    );
                    panic!(
                        "entry {:?} already present at timestamp {}, refusing to insert {:?}",
                        existing, timestamp, entry
                    );
                }
                Err(pos) => self.entries.insert(
                    pos,
                    BucketEntry {
                        entry: Arc::clone(&entry),
                        gid,
                    },
                ),
            }
        }

        let cache = self.cache.get_mut();
        match self.gid_index.entry(gid) {
            Entry::Occupied(mut slot) => {
                let newer = slot
                    .get()
                    .upgrade()
                    .map_or(true, |current| current.timestamp() < timestamp);
                if newer {
                    slot.insert(Arc::downgrade(&entry));
                }
                // The replaced version's contribution cannot be subtracted.
                cache.outdated = true;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&entry));
                cache.add_new_identity(&entry, &gid);
            }
        }
    }

    pub fn has_timestamp(&self, timestamp: Timestamp) -> bool {
        self.position(timestamp).is_ok()
    }

    pub fn entry_at(&self, timestamp: Timestamp) -> Option<Arc<DocEntry>> {
        self.position(timestamp)
            .ok()
            .map(|pos| Arc::clone(&self.entries[pos].entry))
    }

    /// Newest entry for an identity.
    pub fn entry_for(&self, gid: &GlobalId) -> Option<Arc<DocEntry>> {
        self.gid_index.get(gid).and_then(Weak::upgrade)
    }

    fn is_current(&self, bucket_entry: &BucketEntry) -> bool {
        self.gid_index
            .get(&bucket_entry.gid)
            .is_some_and(|alias| alias.as_ptr() == Arc::as_ptr(&bucket_entry.entry))
    }

    /// Physically remove the entry at `timestamp`.
    ///
    /// When it was its identity's newest version, the index moves to the
    /// next-newest surviving version, or forgets the identity if none is left.
    pub fn erase_entry(&mut self, timestamp: Timestamp) -> Option<Arc<DocEntry>> {
        let pos = self.position(timestamp).ok()?;
        let was_current = self.is_current(&self.entries[pos]);
        let removed = self.entries.remove(pos);
        self.cache.get_mut().outdated = true;

        if was_current {
            let replacement = self
                .entries
                .iter()
                .rev()
                .find(|e| e.gid == removed.gid)
                .map(|e| Arc::downgrade(&e.entry));
            match replacement {
                Some(alias) => {
                    self.gid_index.insert(removed.gid, alias);
                }
                None => {
                    self.gid_index.remove(&removed.gid);
                }
            }
        }

        Some(removed.entry)
    }

    /// Aggregate metadata, recomputed from the full log when outdated.
    pub fn bucket_info(&self) -> BucketInfo {
        let mut cache = self.cache.lock();
        if !cache.outdated {
            return cache.info;
        }

        let mut fold = 0u32;
        let mut info = BucketInfo {
            ready: ReadyState::Ready,
            active: ActiveState::from(self.active),
            ..BucketInfo::empty()
        };
        for bucket_entry in &self.entries {
            let entry = &bucket_entry.entry;
            let size = u64::from(entry.size());
            info.entry_count += 1;
            info.used_size += size;
            if entry.is_remove() || !self.is_current(bucket_entry) {
                continue;
            }
            info.document_count += 1;
            info.document_size += size;
            fold ^= BucketChecksum::for_entry(&bucket_entry.gid, entry.timestamp());
        }
        info.checksum = BucketChecksum::from_fold(fold, info.document_count);

        *cache = InfoCache {
            info,
            fold,
            outdated: false,
        };
        info
    }

    /// Whether the cached aggregate must be recomputed before use.
    pub fn is_outdated(&self) -> bool {
        self.cache.lock().outdated
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.cache.get_mut().info.active = ActiveState::from(active);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log entries in ascending timestamp order.
    pub fn entries(&self) -> &[BucketEntry] {
        &self.entries
    }

    /// Whether `bucket_entry` is the newest version of its identity.
    pub fn is_newest(&self, bucket_entry: &BucketEntry) -> bool {
        self.is_current(bucket_entry)
    }

    /// Remove and return the whole log, leaving an empty bucket that keeps
    /// its active flag.
    pub fn take_entries(&mut self) -> Vec<BucketEntry> {
        self.gid_index.clear();
        *self.cache.get_mut() = InfoCache::empty();
        self.cache.get_mut().info.active = ActiveState::from(self.active);
        std::mem::take(&mut self.entries)
    }

    /// One line per entry, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for bucket_entry in &self.entries {
            let entry = &bucket_entry.entry;
            let marker = if self.is_current(bucket_entry) { '*' } else { ' ' };
            let kind = if entry.is_remove() { "Remove" } else { "Put" };
            let _ = writeln!(
                out,
                "{marker} {:>20} {kind:<6} {} {} ({} bytes)",
                entry.timestamp(),
                entry.document_id(),
                bucket_entry.gid,
                entry.size()
            );
        }
        out
    }
}
