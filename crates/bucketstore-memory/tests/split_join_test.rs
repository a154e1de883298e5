//! Bucket split and join

use bucketstore_core::{
    ActiveState, BucketId, DocEntry, Document, DocumentId, FieldSet, GetResult, IncludedVersions,
    PersistenceProvider, Selection, StoreConfig, StoreError, Timestamp,
};
use bucketstore_memory::MemoryBucketStore;

const LOW_LOCATION: u64 = 0x10;
const HIGH_LOCATION: u64 = 0x10 | (1 << 16);

fn source() -> BucketId {
    BucketId::new(16, LOW_LOCATION)
}

fn children() -> (BucketId, BucketId) {
    source().split_children()
}

fn id(location: u64, key: &str) -> DocumentId {
    DocumentId::parse(&format!("id:ns:t:n={location}:{key}")).unwrap()
}

fn doc(location: u64, key: &str) -> Document {
    Document::new(id(location, key)).with_field("key", key)
}

/// Three documents per child, one of them removed and one rewritten.
fn populated_store() -> MemoryBucketStore {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    let mut ts = 0;
    for location in [LOW_LOCATION, HIGH_LOCATION] {
        for key in ["a", "b", "c"] {
            ts += 10;
            store.put(source(), ts, doc(location, key)).unwrap();
        }
        ts += 10;
        store.remove(source(), &[(id(location, "a"), ts)]).unwrap();
        ts += 10;
        store
            .put(source(), ts, doc(location, "b").with_field("rev", 2))
            .unwrap();
    }
    store
}

fn all_entries(store: &MemoryBucketStore, bucket: BucketId) -> Vec<DocEntry> {
    let it = store
        .create_iterator(
            bucket,
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    let entries = store.iterate(it, u64::MAX).unwrap().entries;
    store.destroy_iterator(it).unwrap();
    entries
}

fn timestamps(entries: &[DocEntry]) -> Vec<Timestamp> {
    entries.iter().map(DocEntry::timestamp).collect()
}

#[test]
fn test_split_partitions_by_location() {
    let store = populated_store();
    let (low, high) = children();
    store.split(source(), low, high).unwrap();

    assert_eq!(store.list_buckets().unwrap(), [low, high]);

    for (bucket, location) in [(low, LOW_LOCATION), (high, HIGH_LOCATION)] {
        let entries = all_entries(&store, bucket);
        assert_eq!(entries.len(), 5);
        assert!(entries
            .iter()
            .all(|e| e.document_id().location() == location));

        let info = store.get_bucket_info(bucket).unwrap();
        assert_eq!(info.document_count, 2);
        assert_eq!(info.entry_count, 5);

        assert!(store
            .get(bucket, &FieldSet::All, &id(location, "a"))
            .unwrap()
            .is_tombstone());
        let rewritten = store
            .get(bucket, &FieldSet::All, &id(location, "b"))
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(rewritten.field("rev"), Some(&serde_json::json!(2)));
    }
}

#[test]
fn test_split_then_join_restores_source() {
    let store = populated_store();
    let before_info = store.get_bucket_info(source()).unwrap();
    let before_entries = all_entries(&store, source());

    let (low, high) = children();
    store.split(source(), low, high).unwrap();
    store.join(low, high, source()).unwrap();

    assert_eq!(store.list_buckets().unwrap(), [source()]);
    assert_eq!(store.get_bucket_info(source()).unwrap(), before_info);
    assert_eq!(all_entries(&store, source()), before_entries);
}

#[test]
fn test_split_propagates_active_state() {
    let store = populated_store();
    store.set_active_state(source(), ActiveState::Active).unwrap();

    let (low, high) = children();
    store.split(source(), low, high).unwrap();
    assert!(store.get_bucket_info(low).unwrap().is_active());
    assert!(store.get_bucket_info(high).unwrap().is_active());
}

#[test]
fn test_split_of_empty_source() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    store.create_bucket(source()).unwrap();
    let (low, high) = children();
    store.split(source(), low, high).unwrap();
    assert_eq!(store.list_buckets().unwrap(), [low, high]);
    assert_eq!(store.get_bucket_info(low).unwrap().entry_count, 0);
}

#[test]
fn test_split_of_missing_source() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    let (low, high) = children();
    let err = store.split(source(), low, high).unwrap_err();
    assert!(matches!(err, StoreError::BucketNotFound(b) if b == source()));
    assert!(store.list_buckets().unwrap().is_empty());
}

#[test]
fn test_split_rejects_misplaced_document() {
    let store = populated_store();
    let stray = id(0x11, "stray");
    store.put(source(), 1000, Document::new(stray.clone())).unwrap();
    let before = store.get_bucket_info(source()).unwrap();

    let (low, high) = children();
    let err = store.split(source(), low, high).unwrap_err();
    match err {
        StoreError::SplitTargetMismatch { id, .. } => assert_eq!(id, stray),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.get_bucket_info(source()).unwrap(), before);
    assert_eq!(store.list_buckets().unwrap(), [source()]);
}

#[test]
fn test_join_ors_active_state() {
    let store = populated_store();
    let (low, high) = children();
    store.split(source(), low, high).unwrap();
    store.set_active_state(low, ActiveState::NotActive).unwrap();
    store.set_active_state(high, ActiveState::Active).unwrap();

    store.join(low, high, source()).unwrap();
    assert!(store.get_bucket_info(source()).unwrap().is_active());

    let (low, high) = children();
    store.split(source(), low, high).unwrap();
    store.set_active_state(low, ActiveState::NotActive).unwrap();
    store.set_active_state(high, ActiveState::NotActive).unwrap();
    store.join(low, high, source()).unwrap();
    assert!(!store.get_bucket_info(source()).unwrap().is_active());
}

#[test]
fn test_join_skips_missing_sources() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    let (low, high) = children();
    store.put(low, 10, doc(LOW_LOCATION, "a")).unwrap();

    store.join(low, high, source()).unwrap();
    assert_eq!(store.list_buckets().unwrap(), [source()]);
    assert!(matches!(
        store
            .get(source(), &FieldSet::All, &id(LOW_LOCATION, "a"))
            .unwrap(),
        GetResult::Found { timestamp: 10, .. }
    ));
}

#[test]
fn test_join_same_source_twice() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    let (low, _) = children();
    store.put(low, 10, doc(LOW_LOCATION, "a")).unwrap();
    store.put(low, 20, doc(LOW_LOCATION, "b")).unwrap();

    store.join(low, low, source()).unwrap();
    assert_eq!(timestamps(&all_entries(&store, source())), [20, 10]);
    assert_eq!(store.list_buckets().unwrap(), [source()]);
}

#[test]
fn test_join_into_existing_source() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    let (low, _) = children();
    store.put(source(), 5, doc(HIGH_LOCATION, "x")).unwrap();
    store.put(low, 10, doc(LOW_LOCATION, "a")).unwrap();

    store.join(low, source(), source()).unwrap();
    assert_eq!(timestamps(&all_entries(&store, source())), [10, 5]);
    assert_eq!(store.list_buckets().unwrap(), [source()]);
}

#[test]
fn test_async_split_and_join() {
    let store = populated_store();
    let (low, high) = children();
    let (tx, rx) = std::sync::mpsc::channel();

    let sender = tx.clone();
    store.split_async(
        source(),
        low,
        high,
        Box::new(move |result: bucketstore_core::Result<()>| sender.send(result.is_ok()).unwrap()),
    );
    store.join_async(
        low,
        high,
        source(),
        Box::new(move |result: bucketstore_core::Result<()>| tx.send(result.is_ok()).unwrap()),
    );

    assert_eq!(rx.iter().take(2).collect::<Vec<_>>(), [true, true]);
    assert_eq!(store.get_bucket_info(source()).unwrap().entry_count, 10);
}
