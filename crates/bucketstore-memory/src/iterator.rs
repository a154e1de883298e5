//! Resumable bucket visitation
//!
//! An iterator is a snapshot of *which* timestamps to visit, taken when it is
//! created. Entry payloads are read lazily from the live bucket on each batch,
//! so entries erased in between are skipped and each batch sees the bucket as
//! it is at that moment.

use crate::content::{BucketContent, BucketEntry};
use bucketstore_core::traits::{DocumentSelection, FieldProjector, SelectionResult};
use bucketstore_core::types::{
    BucketId, DocEntry, EntryKind, FieldSet, IncludedVersions, IterateResult, Selection, Timestamp,
};
use std::collections::VecDeque;

#[derive(Debug)]
pub struct BucketIterator {
    bucket: BucketId,
    fields: FieldSet,
    pending: VecDeque<Timestamp>,
}

impl BucketIterator {
    /// Plan a visitation of `content`.
    ///
    /// An explicit timestamp subset is used verbatim. Otherwise the log is
    /// scanned newest-first, keeping entries inside the selection's time
    /// window that pass the version policy and the predicate.
    pub fn plan(
        bucket: BucketId,
        content: &BucketContent,
        fields: FieldSet,
        selection: &Selection,
        predicate: Option<&dyn DocumentSelection>,
        versions: IncludedVersions,
    ) -> Self {
        let pending = if selection.timestamp_subset.is_empty() {
            content
                .entries()
                .iter()
                .rev()
                .filter(|e| {
                    let ts = e.entry.timestamp();
                    ts >= selection.from_timestamp && ts <= selection.to_timestamp
                })
                .filter(|e| passes_version_policy(content, e, versions))
                .filter(|e| predicate.map_or(true, |p| matches_predicate(p, e)))
                .map(|e| e.entry.timestamp())
                .collect()
        } else {
            selection.timestamp_subset.iter().copied().collect()
        };

        Self {
            bucket,
            fields,
            pending,
        }
    }

    pub fn bucket(&self) -> BucketId {
        self.bucket
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_completed(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain entries until the next one would push the batch past
    /// `max_byte_size`. The first entry of a batch is taken whatever its
    /// size so a single oversized entry cannot stall the iterator.
    pub fn next_batch(
        &mut self,
        content: &BucketContent,
        projector: &dyn FieldProjector,
        max_byte_size: u64,
    ) -> IterateResult {
        let mut entries = Vec::new();
        let mut bytes = 0u64;

        while let Some(timestamp) = self.pending.pop_front() {
            let Some(entry) = content.entry_at(timestamp) else {
                tracing::debug!(bucket = %self.bucket, timestamp, "Skipping vanished entry");
                continue;
            };
            let size = u64::from(entry.size());
            if !entries.is_empty() && bytes + size > max_byte_size {
                self.pending.push_front(timestamp);
                break;
            }
            bytes += size;
            entries.push(match entry.kind() {
                EntryKind::Put(doc) => {
                    DocEntry::put(timestamp, projector.project(doc, &self.fields))
                }
                EntryKind::Remove(_) => DocEntry::clone(&entry),
            });
        }

        IterateResult {
            entries,
            completed: self.pending.is_empty(),
        }
    }
}

fn passes_version_policy(
    content: &BucketContent,
    entry: &BucketEntry,
    versions: IncludedVersions,
) -> bool {
    match versions {
        IncludedVersions::AllVersions => true,
        IncludedVersions::NewestDocumentOrRemove => content.is_newest(entry),
        IncludedVersions::NewestDocumentOnly => {
            !entry.entry.is_remove() && content.is_newest(entry)
        }
    }
}

/// Documents must match outright. Tombstones carry no fields, so they are
/// only dropped when the id alone rules them out.
fn matches_predicate(predicate: &dyn DocumentSelection, entry: &BucketEntry) -> bool {
    match entry.entry.kind() {
        EntryKind::Put(doc) => predicate.contains_document(doc).is_true(),
        EntryKind::Remove(id) => predicate.contains_id(id) != SelectionResult::False,
    }
}
