use bucketstore_core::{
    error::{Result, StoreError},
    observe,
    traits::{
        BucketIdFactory, DefaultBucketIdFactory, DefaultFieldProjector, DocumentSelection,
        FieldProjector, PersistenceProvider, SelectionParser,
    },
    types::{
        ActiveState, BucketId, BucketInfo, ClusterState, DocEntry, Document, DocumentId,
        DocumentUpdate, EntryKind, FieldSet, GetResult, IncludedVersions, IterateResult,
        IteratorId, RemoveResult, Selection, Timestamp, UpdateResult,
    },
    SimpleSelectionParser, StoreConfig,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::content::BucketContent;
use crate::guard::{BucketHandle, ExclusiveGuard};
use crate::iterator::BucketIterator;

/// In-memory bucket store
///
/// Buckets live in a directory map guarded by a single mutex that is only
/// held for lookups and structural changes. Content is guarded per bucket;
/// see [`crate::guard`] for the exclusivity contract writers must respect.
pub struct MemoryBucketStore {
    config: StoreConfig,
    buckets: Mutex<BTreeMap<BucketId, Arc<BucketHandle>>>,
    iterators: Mutex<HashMap<IteratorId, Arc<Mutex<BucketIterator>>>>,
    next_iterator_id: AtomicU64,
    cluster_state: RwLock<Option<ClusterState>>,
    modified: Mutex<Vec<BucketId>>,
    selection_parser: Arc<dyn SelectionParser>,
    field_projector: Arc<dyn FieldProjector>,
    bucket_id_factory: Arc<dyn BucketIdFactory>,
}

impl MemoryBucketStore {
    /// Create an empty store using the built-in collaborators.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let bucket_id_factory = Arc::new(DefaultBucketIdFactory::new(config.distribution_bits));

        tracing::debug!(
            node_index = config.node_index,
            max_open_iterators = config.max_open_iterators,
            "Created memory bucket store"
        );

        Ok(Self {
            config,
            buckets: Mutex::new(BTreeMap::new()),
            iterators: Mutex::new(HashMap::new()),
            next_iterator_id: AtomicU64::new(1),
            cluster_state: RwLock::new(None),
            modified: Mutex::new(Vec::new()),
            selection_parser: Arc::new(SimpleSelectionParser),
            field_projector: Arc::new(DefaultFieldProjector),
            bucket_id_factory,
        })
    }

    pub fn with_selection_parser(mut self, parser: Arc<dyn SelectionParser>) -> Self {
        self.selection_parser = parser;
        self
    }

    pub fn with_field_projector(mut self, projector: Arc<dyn FieldProjector>) -> Self {
        self.field_projector = projector;
        self
    }

    pub fn with_bucket_id_factory(mut self, factory: Arc<dyn BucketIdFactory>) -> Self {
        self.bucket_id_factory = factory;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Last cluster state installed through `set_cluster_state`
    pub fn cluster_state(&self) -> Option<ClusterState> {
        self.cluster_state.read().clone()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn open_iterator_count(&self) -> usize {
        self.iterators.lock().len()
    }

    /// Record buckets changed behind the provider's back; reported (once) by
    /// the next `get_modified_buckets` call.
    pub fn set_modified_buckets(&self, buckets: impl IntoIterator<Item = BucketId>) {
        let mut modified = self.modified.lock();
        for bucket in buckets {
            if !modified.contains(&bucket) {
                modified.push(bucket);
            }
        }
    }

    /// Drain the next batch using the configured default byte budget.
    pub fn iterate_default(&self, id: IteratorId) -> Result<IterateResult> {
        self.iterate(id, self.config.default_iterate_bytes)
    }

    /// Human-readable listing of a bucket's log, newest version marked `*`.
    pub fn dump_bucket(&self, bucket: BucketId) -> Result<String> {
        let handle = self.handle(bucket)?;
        let content = handle.read();
        Ok(format!("{bucket} {}\n{}", content.bucket_info(), content.dump()))
    }

    fn handle(&self, bucket: BucketId) -> Result<Arc<BucketHandle>> {
        self.buckets
            .lock()
            .get(&bucket)
            .cloned()
            .ok_or(StoreError::BucketNotFound(bucket))
    }

    fn handle_or_create(&self, bucket: BucketId) -> Arc<BucketHandle> {
        let mut buckets = self.buckets.lock();
        let handle = buckets.entry(bucket).or_insert_with(|| {
            tracing::debug!(%bucket, "Creating bucket on demand");
            Arc::new(BucketHandle::new(bucket))
        });
        let handle = Arc::clone(handle);
        observe::set_bucket_count(buckets.len());
        handle
    }

    fn is_registered(&self, handle: &Arc<BucketHandle>) -> bool {
        self.buckets
            .lock()
            .get(&handle.id())
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Run `f` under an exclusive guard, creating the bucket if it is absent.
    ///
    /// A bucket deleted between lookup and guard acquisition is recreated and
    /// the guard is retaken, so `f` never mutates an orphaned bucket.
    fn with_bucket_or_create<T>(
        &self,
        bucket: BucketId,
        f: impl FnOnce(&mut ExclusiveGuard<'_>) -> T,
    ) -> T {
        loop {
            let handle = self.handle_or_create(bucket);
            let mut guard = handle.exclusive();
            if self.is_registered(&handle) {
                return f(&mut guard);
            }
            tracing::debug!(%bucket, "Bucket was deleted while acquiring it, retrying");
        }
    }

    fn with_bucket<T>(
        &self,
        bucket: BucketId,
        f: impl FnOnce(&mut ExclusiveGuard<'_>) -> T,
    ) -> Result<T> {
        let handle = self.handle(bucket)?;
        let mut guard = handle.exclusive();
        Ok(f(&mut guard))
    }

    fn read_bucket<T>(&self, bucket: BucketId, f: impl FnOnce(&BucketContent) -> T) -> Result<T> {
        let handle = self.handle(bucket)?;
        let content = handle.read();
        Ok(f(&content))
    }

    fn parse_selection(&self, selection: &Selection) -> Result<Option<Arc<dyn DocumentSelection>>> {
        let expr = selection.document_selection.trim();
        if expr.is_empty() {
            return Ok(None);
        }
        self.selection_parser.parse(expr).map(Some)
    }

    /// Replace whatever occupies `timestamp` with a tombstone for `id`.
    fn write_tombstone(content: &mut BucketContent, timestamp: Timestamp, id: &DocumentId) {
        if let Some(erased) = content.erase_entry(timestamp) {
            tracing::debug!(
                timestamp,
                replaced = %erased.document_id(),
                "Tombstone replaces entry at the same timestamp"
            );
        }
        content.insert(Arc::new(DocEntry::remove(timestamp, id.clone())));
    }

    /// Decide for every entry of `source` whether it moves to `target1`
    /// (true) or `target2` (false). Fails on the first entry whose document
    /// belongs to neither.
    fn split_placement(
        &self,
        source: &BucketContent,
        target1: BucketId,
        target2: BucketId,
    ) -> Result<Vec<bool>> {
        let mut to_first = Vec::with_capacity(source.len());
        for bucket_entry in source.entries() {
            let doc_id = bucket_entry.entry.document_id();
            let placed = self.bucket_id_factory.bucket_id(doc_id);
            if placed.with_used_bits(target1.used_bits()) == target1 {
                to_first.push(true);
            } else if placed.with_used_bits(target2.used_bits()) == target2 {
                to_first.push(false);
            } else {
                return Err(StoreError::SplitTargetMismatch {
                    id: doc_id.clone(),
                    target1,
                    target2,
                });
            }
        }
        Ok(to_first)
    }

    /// Move every entry of `source` to the target chosen by `placement`.
    fn redistribute(
        source: &mut BucketContent,
        placement: Vec<bool>,
        first: &mut BucketContent,
        second: &mut BucketContent,
    ) -> usize {
        let entries = source.take_entries();
        let moved = entries.len();
        for (bucket_entry, first_target) in entries.into_iter().zip(placement) {
            if first_target {
                first.insert(bucket_entry.entry);
            } else {
                second.insert(bucket_entry.entry);
            }
        }
        moved
    }
}

impl PersistenceProvider for MemoryBucketStore {
    fn list_buckets(&self) -> Result<Vec<BucketId>> {
        Ok(self.buckets.lock().keys().copied().collect())
    }

    fn set_cluster_state(&self, state: &ClusterState) -> Result<()> {
        let node_up = state.node_up(self.config.node_index);
        tracing::info!(
            version = state.version,
            node_index = self.config.node_index,
            node_up,
            "Installing cluster state"
        );
        *self.cluster_state.write() = Some(state.clone());

        if !node_up {
            let handles: Vec<_> = self.buckets.lock().values().cloned().collect();
            for handle in &handles {
                handle.write_unchecked().set_active(false);
            }
            tracing::info!("Deactivated {} buckets, node is no longer up", handles.len());
        }
        Ok(())
    }

    fn set_active_state(&self, bucket: BucketId, state: ActiveState) -> Result<()> {
        self.with_bucket(bucket, |content| content.set_active(state.is_active()))?;
        tracing::debug!(%bucket, ?state, "Set active state");
        Ok(())
    }

    fn get_bucket_info(&self, bucket: BucketId) -> Result<BucketInfo> {
        self.read_bucket(bucket, BucketContent::bucket_info)
    }

    fn put(&self, bucket: BucketId, timestamp: Timestamp, doc: Document) -> Result<()> {
        let start = Instant::now();
        let result = self.with_bucket_or_create(bucket, |content| {
            if let Some(existing) = content.entry_at(timestamp) {
                if existing.global_id() == doc.id().global_id() {
                    tracing::debug!(%bucket, timestamp, "Put already applied");
                    return Ok(());
                }
                tracing::debug!(
                    %bucket,
                    timestamp,
                    existing = %existing.document_id(),
                    incoming = %doc.id(),
                    "Put collides with another document"
                );
                return Err(StoreError::TimestampExists(timestamp));
            }
            tracing::debug!(%bucket, timestamp, id = %doc.id(), "Put");
            content.insert(Arc::new(DocEntry::put(timestamp, doc)));
            Ok(())
        });
        observe::record_write("put", start.elapsed());
        result
    }

    fn remove(&self, bucket: BucketId, ids: &[(DocumentId, Timestamp)]) -> Result<RemoveResult> {
        let start = Instant::now();
        let removed = self.with_bucket_or_create(bucket, |content| {
            let mut removed = 0u32;
            for (id, timestamp) in ids {
                let newer = content
                    .entry_for(&id.global_id())
                    .filter(|current| current.timestamp() > *timestamp);
                if let Some(newer) = newer {
                    tracing::debug!(
                        %bucket,
                        %id,
                        timestamp,
                        newer = newer.timestamp(),
                        "Ignoring remove superseded by a newer entry"
                    );
                    continue;
                }
                Self::write_tombstone(content, *timestamp, id);
                removed += 1;
            }
            removed
        });
        tracing::debug!(%bucket, requested = ids.len(), removed, "Remove");
        observe::record_write("remove", start.elapsed());
        observe::record_tombstones(removed);
        Ok(RemoveResult { removed })
    }

    fn remove_if_found(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        id: &DocumentId,
    ) -> Result<RemoveResult> {
        let start = Instant::now();
        let removed = self.with_bucket_or_create(bucket, |content| {
            let live = content
                .entry_for(&id.global_id())
                .is_some_and(|current| !current.is_remove() && current.timestamp() <= timestamp);
            if !live {
                tracing::debug!(%bucket, %id, timestamp, "No live document to remove");
                return 0;
            }
            Self::write_tombstone(content, timestamp, id);
            1
        });
        observe::record_write("remove", start.elapsed());
        observe::record_tombstones(removed);
        Ok(RemoveResult { removed })
    }

    fn update(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        update: &DocumentUpdate,
    ) -> Result<UpdateResult> {
        let start = Instant::now();
        let occupied = self
            .read_bucket(bucket, |content| content.has_timestamp(timestamp))
            .unwrap_or(false);
        if occupied {
            tracing::debug!(
                %bucket,
                timestamp,
                id = %update.id(),
                "Update timestamp already taken"
            );
            return Err(StoreError::TimestampExists(timestamp));
        }
        let (mut doc, existing_timestamp) = match self.get(bucket, &FieldSet::All, update.id())? {
            GetResult::Found {
                document,
                timestamp,
            } => (document, Some(timestamp)),
            _ if update.creates_if_non_existent() => (Document::new(update.id().clone()), None),
            _ => {
                tracing::debug!(%bucket, id = %update.id(), "Nothing to update");
                return Ok(UpdateResult {
                    existing_timestamp: None,
                    applied: false,
                });
            }
        };

        update.apply_to(&mut doc)?;
        self.put(bucket, timestamp, doc)?;
        observe::record_write("update", start.elapsed());
        Ok(UpdateResult {
            existing_timestamp,
            applied: true,
        })
    }

    fn get(&self, bucket: BucketId, fields: &FieldSet, id: &DocumentId) -> Result<GetResult> {
        let Ok(handle) = self.handle(bucket) else {
            return Ok(GetResult::NotFound);
        };
        let content = handle.read();
        let Some(entry) = content.entry_for(&id.global_id()) else {
            return Ok(GetResult::NotFound);
        };
        Ok(match entry.kind() {
            EntryKind::Remove(_) => GetResult::Tombstone {
                timestamp: entry.timestamp(),
            },
            EntryKind::Put(doc) => GetResult::Found {
                document: self.field_projector.project(doc, fields),
                timestamp: entry.timestamp(),
            },
        })
    }

    fn create_iterator(
        &self,
        bucket: BucketId,
        fields: FieldSet,
        selection: &Selection,
        versions: IncludedVersions,
    ) -> Result<IteratorId> {
        let predicate = self.parse_selection(selection)?;
        let iterator = self.read_bucket(bucket, |content| {
            BucketIterator::plan(
                bucket,
                content,
                fields,
                selection,
                predicate.as_deref(),
                versions,
            )
        })?;

        let mut iterators = self.iterators.lock();
        if iterators.len() >= self.config.max_open_iterators {
            tracing::warn!(
                limit = self.config.max_open_iterators,
                "Refusing to open another iterator"
            );
            return Err(StoreError::IteratorLimit {
                limit: self.config.max_open_iterators,
            });
        }
        let id = IteratorId(self.next_iterator_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%bucket, %id, pending = iterator.remaining(), ?versions, "Created iterator");
        iterators.insert(id, Arc::new(Mutex::new(iterator)));
        observe::set_open_iterators(iterators.len());
        Ok(id)
    }

    fn iterate(&self, id: IteratorId, max_byte_size: u64) -> Result<IterateResult> {
        let iterator = self
            .iterators
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownIterator(id))?;
        let mut iterator = iterator.lock();

        let handle = self.handle(iterator.bucket())?;
        let content = handle.read();
        let result = iterator.next_batch(&content, self.field_projector.as_ref(), max_byte_size);

        tracing::debug!(
            %id,
            entries = result.entries.len(),
            completed = result.completed,
            "Iterated"
        );
        observe::record_iterate(result.entries.len(), result.byte_size());
        Ok(result)
    }

    fn destroy_iterator(&self, id: IteratorId) -> Result<()> {
        let mut iterators = self.iterators.lock();
        if iterators.remove(&id).is_none() {
            tracing::debug!(%id, "Destroying unknown iterator");
        }
        observe::set_open_iterators(iterators.len());
        Ok(())
    }

    fn create_bucket(&self, bucket: BucketId) -> Result<()> {
        let mut buckets = self.buckets.lock();
        if let Some(handle) = buckets.get(&bucket) {
            if handle.in_use() {
                tracing::error!(%bucket, "Creating a bucket that is in use");
                panic!("cannot create bucket {bucket} while it is in use");
            }
            return Ok(());
        }
        tracing::debug!(%bucket, "Created bucket");
        buckets.insert(bucket, Arc::new(BucketHandle::new(bucket)));
        observe::set_bucket_count(buckets.len());
        Ok(())
    }

    fn delete_bucket(&self, bucket: BucketId) -> Result<()> {
        let mut buckets = self.buckets.lock();
        if let Some(handle) = buckets.get(&bucket) {
            if handle.in_use() {
                tracing::error!(%bucket, "Deleting a bucket that is in use");
                panic!("cannot delete bucket {bucket} while it is in use");
            }
            buckets.remove(&bucket);
            tracing::debug!(%bucket, "Deleted bucket");
        }
        observe::set_bucket_count(buckets.len());
        Ok(())
    }

    fn get_modified_buckets(&self) -> Result<Vec<BucketId>> {
        Ok(std::mem::take(&mut *self.modified.lock()))
    }

    fn split(&self, source: BucketId, target1: BucketId, target2: BucketId) -> Result<()> {
        if target1 == target2 || source == target1 || source == target2 {
            return Err(anyhow::anyhow!(
                "split of {source} needs two distinct targets, got {target1} and {target2}"
            )
            .into());
        }
        let source_handle = self.handle(source)?;

        let moved = {
            let mut src = source_handle.exclusive();
            // Targets are only registered once every entry has a home.
            let placement = self.split_placement(&src, target1, target2)?;
            let first_handle = self.handle_or_create(target1);
            let second_handle = self.handle_or_create(target2);
            let mut first = first_handle.exclusive();
            let mut second = second_handle.exclusive();

            let active = src.is_active();
            let moved = Self::redistribute(&mut src, placement, &mut first, &mut second);
            first.set_active(active);
            second.set_active(active);
            moved
        };
        self.delete_bucket(source)?;

        tracing::info!(
            %source,
            %target1,
            %target2,
            moved,
            "Split bucket"
        );
        observe::record_maintenance("split", moved);
        Ok(())
    }

    fn join(&self, source1: BucketId, source2: BucketId, target: BucketId) -> Result<()> {
        let target_handle = self.handle_or_create(target);
        let mut sources = vec![source1];
        if source2 != source1 {
            sources.push(source2);
        }

        let mut moved = 0;
        {
            let mut dest = target_handle.exclusive();
            let mut active = false;
            for source in sources {
                if source == target {
                    active |= dest.is_active();
                    continue;
                }
                let Ok(handle) = self.handle(source) else {
                    tracing::debug!(%source, "Join source does not exist");
                    continue;
                };
                {
                    let mut src = handle.exclusive();
                    active |= src.is_active();
                    for bucket_entry in src.take_entries() {
                        dest.insert(bucket_entry.entry);
                        moved += 1;
                    }
                }
                self.delete_bucket(source)?;
            }
            dest.set_active(active);
        }

        tracing::info!(%source1, %source2, %target, moved, "Joined buckets");
        observe::record_maintenance("join", moved);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucketStore")
            .field("config", &self.config)
            .field("buckets", &self.bucket_count())
            .field("open_iterators", &self.open_iterator_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryBucketStore {
        MemoryBucketStore::new(StoreConfig::default()).unwrap()
    }

    fn bucket() -> BucketId {
        BucketId::new(16, 0x42)
    }

    fn doc(key: &str) -> Document {
        Document::new(DocumentId::parse(&format!("id:ns:t::{key}")).unwrap())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = StoreConfig::default().with_max_open_iterators(0);
        assert!(matches!(
            MemoryBucketStore::new(config),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_put_creates_bucket_on_demand() {
        let store = store();
        store.put(bucket(), 10, doc("a")).unwrap();
        assert_eq!(store.list_buckets().unwrap(), [bucket()]);
        assert_eq!(store.get_bucket_info(bucket()).unwrap().document_count, 1);
    }

    #[test]
    fn test_with_bucket_or_create_recovers_from_concurrent_delete() {
        let store = store();
        store.create_bucket(bucket()).unwrap();
        let stale = store.handle(bucket()).unwrap();
        store.delete_bucket(bucket()).unwrap();
        assert!(!store.is_registered(&stale));

        store.with_bucket_or_create(bucket(), |content| {
            content.insert(Arc::new(DocEntry::put(1, doc("a"))));
        });
        assert!(stale.read().is_empty());
        assert_eq!(store.handle(bucket()).unwrap().read().len(), 1);
    }

    #[test]
    fn test_degenerate_split_is_rejected() {
        let store = store();
        store.create_bucket(bucket()).unwrap();
        let err = store.split(bucket(), bucket(), BucketId::new(17, 0x42)).unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));
        assert_eq!(store.bucket_count(), 1);
    }

    #[test]
    #[should_panic(expected = "while it is in use")]
    fn test_delete_in_use_bucket_panics() {
        let store = store();
        store.create_bucket(bucket()).unwrap();
        let handle = store.handle(bucket()).unwrap();
        let _guard = handle.exclusive();
        let _ = store.delete_bucket(bucket());
    }

    #[test]
    #[should_panic(expected = "while it is in use")]
    fn test_create_in_use_bucket_panics() {
        let store = store();
        store.create_bucket(bucket()).unwrap();
        let handle = store.handle(bucket()).unwrap();
        let _guard = handle.exclusive();
        let _ = store.create_bucket(bucket());
    }

    #[test]
    fn test_modified_buckets_are_reported_once() {
        let store = store();
        store.set_modified_buckets([bucket(), bucket(), BucketId::new(16, 1)]);
        assert_eq!(
            store.get_modified_buckets().unwrap(),
            [bucket(), BucketId::new(16, 1)]
        );
        assert!(store.get_modified_buckets().unwrap().is_empty());
    }

    #[test]
    fn test_dump_bucket() {
        let store = store();
        store.put(bucket(), 10, doc("a")).unwrap();
        let dump = store.dump_bucket(bucket()).unwrap();
        assert!(dump.contains("id:ns:t::a"));
        assert!(matches!(
            store.dump_bucket(BucketId::new(16, 7)),
            Err(StoreError::BucketNotFound(_))
        ));
    }
}
