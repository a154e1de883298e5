//! Bucket visitation through create_iterator / iterate / destroy_iterator

use bucketstore_core::{
    BucketId, DocEntry, Document, DocumentId, DocumentSelection, FieldSet, IncludedVersions,
    IteratorId, PersistenceProvider, Result, Selection, SelectionParser, SelectionResult,
    StoreConfig, StoreError, Timestamp,
};
use bucketstore_memory::MemoryBucketStore;
use std::sync::Arc;

fn bucket() -> BucketId {
    BucketId::new(16, 0x0303)
}

fn id(key: &str) -> DocumentId {
    DocumentId::parse(&format!("id:music:song::{key}")).unwrap()
}

fn song(key: &str, year: i64) -> Document {
    Document::new(id(key))
        .with_field("title", format!("title-{key}"))
        .with_field("year", year)
}

/// a@10, b@20, a removed @30, c@40, b@50 (new version)
fn populated_store() -> MemoryBucketStore {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    store.put(bucket(), 10, song("a", 1990)).unwrap();
    store.put(bucket(), 20, song("b", 2000)).unwrap();
    store.remove(bucket(), &[(id("a"), 30)]).unwrap();
    store.put(bucket(), 40, song("c", 2010)).unwrap();
    store.put(bucket(), 50, song("b", 2001)).unwrap();
    store
}

fn drain(store: &MemoryBucketStore, iterator: IteratorId) -> Vec<DocEntry> {
    let result = store.iterate(iterator, u64::MAX).unwrap();
    assert!(result.completed);
    result.entries
}

fn timestamps(entries: &[DocEntry]) -> Vec<Timestamp> {
    entries.iter().map(DocEntry::timestamp).collect()
}

#[test]
fn test_newest_document_only() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    let entries = drain(&store, it);
    assert_eq!(timestamps(&entries), [50, 40]);
    assert!(entries.iter().all(|e| !e.is_remove()));
}

#[test]
fn test_newest_document_or_remove() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOrRemove,
        )
        .unwrap();
    let entries = drain(&store, it);
    assert_eq!(timestamps(&entries), [50, 40, 30]);
    assert!(entries[2].is_remove());
    assert_eq!(entries[2].document_id(), &id("a"));
}

#[test]
fn test_all_versions() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    assert_eq!(timestamps(&drain(&store, it)), [50, 40, 30, 20, 10]);
}

#[test]
fn test_put_put_remove_visits_only_live_document() {
    let store = MemoryBucketStore::new(StoreConfig::default()).unwrap();
    store.put(bucket(), 10, song("a", 1990)).unwrap();
    store.put(bucket(), 20, song("b", 2000)).unwrap();
    store.remove(bucket(), &[(id("a"), 30)]).unwrap();

    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    let entries = drain(&store, it);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].document_id(), &id("b"));
}

#[test]
fn test_document_selection_filters_entries() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::matching("song.year >= 2001"),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    // The tombstone at 30 cannot be judged on its id alone and is kept.
    assert_eq!(timestamps(&drain(&store, it)), [50, 40, 30]);

    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::matching("id == \"id:music:song::a\""),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    assert_eq!(timestamps(&drain(&store, it)), [30, 10]);
}

#[test]
fn test_time_window() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all().with_time_range(20, 40),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    assert_eq!(timestamps(&drain(&store, it)), [40, 30, 20]);
}

#[test]
fn test_timestamp_subset_is_visited_as_given() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all().with_timestamp_subset(vec![20, 10, 35]),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    // 35 does not exist and is skipped; 20 and 10 are superseded but requested.
    assert_eq!(timestamps(&drain(&store, it)), [20, 10]);
}

#[test]
fn test_field_set_applies_to_documents() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::fields(["year"]),
            &Selection::all(),
            IncludedVersions::NewestDocumentOrRemove,
        )
        .unwrap();
    for entry in drain(&store, it) {
        if let Some(doc) = entry.document() {
            assert_eq!(doc.field_count(), 1);
            assert!(doc.field("year").is_some());
        }
    }
}

#[test]
fn test_byte_budget_batches() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::AllVersions,
        )
        .unwrap();

    // Smaller than any entry: still makes progress one entry at a time.
    let mut visited = Vec::new();
    loop {
        let batch = store.iterate(it, 1).unwrap();
        if batch.completed && batch.entries.is_empty() {
            break;
        }
        assert_eq!(batch.entries.len(), 1);
        visited.extend(timestamps(&batch.entries));
        if batch.completed {
            break;
        }
    }
    assert_eq!(visited, [50, 40, 30, 20, 10]);

    let after = store.iterate(it, u64::MAX).unwrap();
    assert!(after.entries.is_empty());
    assert!(after.completed);
}

#[test]
fn test_budget_fits_multiple_entries() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    let first_two = store.get_bucket_info(bucket()).unwrap().document_size;
    let batch = store.iterate(it, first_two).unwrap();
    assert_eq!(timestamps(&batch.entries), [50, 40]);
    assert_eq!(batch.byte_size(), first_two);
    assert!(batch.completed);
}

#[test]
fn test_iteration_sees_later_erasure() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    let first = store.iterate(it, 1).unwrap();
    assert_eq!(timestamps(&first.entries), [50]);

    // Replacing the put at 40 with a tombstone changes what the next batch sees.
    store.remove(bucket(), &[(id("c"), 40)]).unwrap();
    let rest = drain(&store, it);
    assert_eq!(timestamps(&rest), [40, 30, 20, 10]);
    assert!(rest[0].is_remove());
}

#[test]
fn test_malformed_selection_is_rejected() {
    let store = populated_store();
    let err = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::matching("song.year =="),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidSelection(_)));
    assert_eq!(store.open_iterator_count(), 0);
}

#[test]
fn test_iterator_on_missing_bucket() {
    let store = populated_store();
    let err = store
        .create_iterator(
            BucketId::new(16, 0x0404),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::BucketNotFound(_)));

    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    store.delete_bucket(bucket()).unwrap();
    assert!(matches!(
        store.iterate(it, u64::MAX),
        Err(StoreError::BucketNotFound(_))
    ));
}

#[test]
fn test_destroy_iterator() {
    let store = populated_store();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();
    assert_eq!(store.open_iterator_count(), 1);

    store.destroy_iterator(it).unwrap();
    assert_eq!(store.open_iterator_count(), 0);
    assert!(matches!(
        store.iterate(it, u64::MAX),
        Err(StoreError::UnknownIterator(missing)) if missing == it
    ));
    store.destroy_iterator(it).unwrap();
    assert_eq!(store.get_bucket_info(bucket()).unwrap().document_count, 2);
}

#[test]
fn test_open_iterator_limit() {
    let store = MemoryBucketStore::new(StoreConfig::default().with_max_open_iterators(2)).unwrap();
    store.put(bucket(), 10, song("a", 1990)).unwrap();

    let open = |store: &MemoryBucketStore| {
        store.create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
    };
    let first = open(&store).unwrap();
    let _second = open(&store).unwrap();

    let err = open(&store).unwrap_err();
    assert!(matches!(err, StoreError::IteratorLimit { limit: 2 }));
    assert!(err.is_transient());

    store.destroy_iterator(first).unwrap();
    open(&store).unwrap();
}

/// Selects documents whose title ends with a given suffix.
struct TitleSuffix(String);

impl DocumentSelection for TitleSuffix {
    fn contains_document(&self, doc: &Document) -> SelectionResult {
        match doc.field("title").and_then(|v| v.as_str()) {
            Some(title) => title.ends_with(&self.0).into(),
            None => SelectionResult::Invalid,
        }
    }

    fn contains_id(&self, _id: &DocumentId) -> SelectionResult {
        SelectionResult::False
    }
}

struct SuffixParser;

impl SelectionParser for SuffixParser {
    fn parse(&self, expr: &str) -> Result<Arc<dyn DocumentSelection>> {
        match expr.strip_prefix("suffix:") {
            Some(suffix) => Ok(Arc::new(TitleSuffix(suffix.to_string()))),
            None => Err(StoreError::InvalidSelection(expr.to_string())),
        }
    }
}

#[test]
fn test_custom_selection_parser() {
    let store = populated_store().with_selection_parser(Arc::new(SuffixParser));
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::matching("suffix:-b"),
            IncludedVersions::AllVersions,
        )
        .unwrap();
    assert_eq!(timestamps(&drain(&store, it)), [50, 20]);

    assert!(store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::matching("song"),
            IncludedVersions::AllVersions,
        )
        .is_err());
}

#[test]
fn test_default_budget_comes_from_config() {
    let store = MemoryBucketStore::new(StoreConfig::default().with_default_iterate_bytes(1)).unwrap();
    store.put(bucket(), 10, song("a", 1990)).unwrap();
    store.put(bucket(), 20, song("b", 2000)).unwrap();
    let it = store
        .create_iterator(
            bucket(),
            FieldSet::All,
            &Selection::all(),
            IncludedVersions::NewestDocumentOnly,
        )
        .unwrap();

    let first = store.iterate_default(it).unwrap();
    assert_eq!(timestamps(&first.entries), [20]);
    assert!(!first.completed);
    let second = store.iterate_default(it).unwrap();
    assert_eq!(timestamps(&second.entries), [10]);
    assert!(second.completed);
}
