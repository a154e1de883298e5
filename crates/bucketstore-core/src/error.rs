use crate::types::{BucketId, DocumentId, IteratorId, Timestamp};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(BucketId),

    #[error("Timestamp {0} already exists for a different document")]
    TimestampExists(Timestamp),

    #[error("Invalid document selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    #[error("Invalid field set: {0}")]
    InvalidFieldSet(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Unknown iterator: {0}")]
    UnknownIterator(IteratorId),

    #[error("Too many open iterators (limit {limit})")]
    IteratorLimit { limit: usize },

    #[error("Document {id} does not belong in split target {target1} or {target2}")]
    SplitTargetMismatch {
        id: DocumentId,
        target1: BucketId,
        target2: BucketId,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`StoreError`], used by callers that decide
/// whether to retry, report a conflict, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed bucket or document does not exist.
    NotFound,
    /// A put collided with a different document at the same timestamp.
    TimestampConflict,
    /// The operation may succeed if retried (e.g. racing bucket lifecycle).
    Transient,
    /// The request itself was malformed and will never succeed.
    MalformedInput,
    /// Any other failure that retrying will not fix.
    Permanent,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::BucketNotFound(_) => ErrorKind::NotFound,
            StoreError::TimestampExists(_) => ErrorKind::TimestampConflict,
            StoreError::IteratorLimit { .. } => ErrorKind::Transient,
            StoreError::InvalidSelection(_)
            | StoreError::InvalidDocumentId(_)
            | StoreError::InvalidFieldSet(_)
            | StoreError::InvalidUpdate(_)
            | StoreError::Config(_) => ErrorKind::MalformedInput,
            StoreError::UnknownIterator(_)
            | StoreError::SplitTargetMismatch { .. }
            | StoreError::Serialization(_)
            | StoreError::Other(_) => ErrorKind::Permanent,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// A missing bucket counts as transient: it usually means the request
    /// raced a create, delete, split or join of that bucket.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// Collaborator errors:
//
// Selection parsers, field projectors and bucket-id factories supplied by the
// embedding application can surface their own failures through the
// `#[from] anyhow::Error` variant, which classifies as `Permanent`.
//
// Implement `From<YourError> for StoreError` directly when a more specific
// classification is needed.
