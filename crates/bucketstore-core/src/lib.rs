//! Bucketstore Core: data model and provider interface for per-node bucket storage
//!
//! A bucket is one partition of the document-id space. Each bucket holds a
//! timestamp-ordered log of document puts and tombstones, an index from
//! document identity to its newest version, and aggregate metadata
//! ([`BucketInfo`]) that replicas compare to detect divergence.
//!
//! This crate defines:
//! - The data model: bucket ids, documents, updates, log entries, bucket info
//! - [`PersistenceProvider`]: the operation set a storage engine implements
//! - Collaborator traits: selection predicates, field projection, bucket-id derivation
//! - A small default selection parser for standalone use and tests

pub mod config;
pub mod error;
pub mod observe;
pub mod select;
pub mod traits;
pub mod types;

pub use config::StoreConfig;
pub use error::{ErrorKind, Result, StoreError};
pub use select::{SelectionNode, SimpleSelectionParser};
pub use traits::{
    BucketIdFactory, Completion, DefaultBucketIdFactory, DefaultFieldProjector, DocumentSelection,
    FieldProjector, OperationComplete, PersistenceProvider, SelectionParser, SelectionResult,
};
pub use types::{
    ActiveState, BucketChecksum, BucketId, BucketInfo, ClusterState, DocEntry, Document,
    DocumentId, DocumentUpdate, EntryKind, FieldSet, FieldUpdate, GetResult, GlobalId,
    IncludedVersions, IterateResult, IteratorId, NodeState, ReadyState, RemoveResult, Selection,
    Timestamp, UpdateResult,
};
