use crate::error::Result;
use crate::traits::completion::OperationComplete;
use crate::types::{
    ActiveState, BucketId, BucketInfo, ClusterState, Document, DocumentId, DocumentUpdate,
    FieldSet, GetResult, IncludedVersions, IterateResult, IteratorId, RemoveResult, Selection,
    Timestamp, UpdateResult,
};

/// Callback receiving the result of an asynchronous provider operation.
pub type Completion<T> = Box<dyn OperationComplete<Result<T>>>;

/// Per-node persistence provider: the contract higher storage layers call
/// to read and mutate the buckets this node owns.
///
/// Contract violations (diverging writes at one timestamp, concurrent
/// mutation of one bucket, deleting a bucket that is being mutated) abort
/// instead of returning an error. Expected outcomes are typed results.
pub trait PersistenceProvider: Send + Sync {
    /// All buckets currently stored on this node
    fn list_buckets(&self) -> Result<Vec<BucketId>>;

    /// Install a new cluster state. Buckets are deactivated when this node
    /// is no longer up.
    fn set_cluster_state(&self, state: &ClusterState) -> Result<()>;

    fn set_active_state(&self, bucket: BucketId, state: ActiveState) -> Result<()>;

    fn get_bucket_info(&self, bucket: BucketId) -> Result<BucketInfo>;

    /// Store `doc` at `timestamp`, creating the bucket if needed.
    ///
    /// Re-putting the same identity at the same timestamp succeeds without
    /// effect; a different identity fails with `TimestampExists`.
    fn put(&self, bucket: BucketId, timestamp: Timestamp, doc: Document) -> Result<()>;

    /// Write a tombstone for each `(id, timestamp)` unless a newer entry for
    /// the identity already exists.
    fn remove(&self, bucket: BucketId, ids: &[(DocumentId, Timestamp)]) -> Result<RemoveResult>;

    /// Write a tombstone only when a live document currently exists for `id`.
    fn remove_if_found(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        id: &DocumentId,
    ) -> Result<RemoveResult>;

    /// Apply `update` to the current version and store the result at
    /// `timestamp`.
    ///
    /// Fails with `TimestampExists` if any entry already occupies `timestamp`.
    fn update(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        update: &DocumentUpdate,
    ) -> Result<UpdateResult>;

    fn get(&self, bucket: BucketId, fields: &FieldSet, id: &DocumentId) -> Result<GetResult>;

    fn create_iterator(
        &self,
        bucket: BucketId,
        fields: FieldSet,
        selection: &Selection,
        versions: IncludedVersions,
    ) -> Result<IteratorId>;

    /// Drain the next batch of at most `max_byte_size` bytes. The first entry
    /// of a batch is always returned regardless of its size.
    fn iterate(&self, id: IteratorId, max_byte_size: u64) -> Result<IterateResult>;

    fn destroy_iterator(&self, id: IteratorId) -> Result<()>;

    fn create_bucket(&self, bucket: BucketId) -> Result<()>;

    fn delete_bucket(&self, bucket: BucketId) -> Result<()>;

    /// Buckets changed by means other than this interface since the last call
    fn get_modified_buckets(&self) -> Result<Vec<BucketId>>;

    fn split(&self, source: BucketId, target1: BucketId, target2: BucketId) -> Result<()>;

    fn join(&self, source1: BucketId, source2: BucketId, target: BucketId) -> Result<()>;

    fn put_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        doc: Document,
        on_complete: Completion<()>,
    ) {
        on_complete.on_complete(self.put(bucket, timestamp, doc));
    }

    fn remove_async(
        &self,
        bucket: BucketId,
        ids: Vec<(DocumentId, Timestamp)>,
        on_complete: Completion<RemoveResult>,
    ) {
        on_complete.on_complete(self.remove(bucket, &ids));
    }

    fn remove_if_found_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        id: DocumentId,
        on_complete: Completion<RemoveResult>,
    ) {
        on_complete.on_complete(self.remove_if_found(bucket, timestamp, &id));
    }

    fn update_async(
        &self,
        bucket: BucketId,
        timestamp: Timestamp,
        update: DocumentUpdate,
        on_complete: Completion<UpdateResult>,
    ) {
        on_complete.on_complete(self.update(bucket, timestamp, &update));
    }

    fn set_active_state_async(
        &self,
        bucket: BucketId,
        state: ActiveState,
        on_complete: Completion<()>,
    ) {
        on_complete.on_complete(self.set_active_state(bucket, state));
    }

    fn create_bucket_async(&self, bucket: BucketId, on_complete: Completion<()>) {
        on_complete.on_complete(self.create_bucket(bucket));
    }

    fn delete_bucket_async(&self, bucket: BucketId, on_complete: Completion<()>) {
        on_complete.on_complete(self.delete_bucket(bucket));
    }

    fn split_async(
        &self,
        source: BucketId,
        target1: BucketId,
        target2: BucketId,
        on_complete: Completion<()>,
    ) {
        on_complete.on_complete(self.split(source, target1, target2));
    }

    fn join_async(
        &self,
        source1: BucketId,
        source2: BucketId,
        target: BucketId,
        on_complete: Completion<()>,
    ) {
        on_complete.on_complete(self.join(source1, source2, target));
    }
}
