pub mod bucket;
pub mod cluster;
pub mod document;
pub mod entry;
pub mod info;
pub mod request;
pub mod update;

pub use bucket::{BucketId, Timestamp};
pub use cluster::{ClusterState, NodeState};
pub use document::{Document, DocumentId, GlobalId, IdLocation};
pub use entry::{DocEntry, EntryKind};
pub use info::{ActiveState, BucketChecksum, BucketInfo, ReadyState};
pub use request::{
    FieldSet, GetResult, IncludedVersions, IterateResult, IteratorId, RemoveResult, Selection,
    UpdateResult,
};
pub use update::{DocumentUpdate, FieldUpdate};
