use crate::types::bucket::Timestamp;
use crate::types::document::GlobalId;
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Aggregate checksum over a bucket's live document versions.
///
/// Zero always means "no live documents"; a non-empty bucket whose fold
/// happens to be zero reports [`BucketChecksum::ZERO_SENTINEL`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BucketChecksum(u32);

impl BucketChecksum {
    pub const EMPTY: BucketChecksum = BucketChecksum(0);
    pub const ZERO_SENTINEL: u32 = 1;

    /// Checksum contribution of a single version, derived from its identity
    /// and timestamp only (not from document content).
    pub fn for_entry(gid: &GlobalId, timestamp: Timestamp) -> u32 {
        let mut buf = [0u8; GlobalId::LENGTH + 8];
        buf[..GlobalId::LENGTH].copy_from_slice(gid.as_bytes());
        buf[GlobalId::LENGTH..].copy_from_slice(&timestamp.to_le_bytes());
        let hash = xxh3_64(&buf);
        (hash as u32) ^ ((hash >> 32) as u32)
    }

    /// Turn an XOR fold of entry contributions into the reported checksum.
    pub fn from_fold(fold: u32, document_count: u32) -> Self {
        match (document_count, fold) {
            (0, _) => Self::EMPTY,
            (_, 0) => Self(Self::ZERO_SENTINEL),
            (_, fold) => Self(fold),
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BucketChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActiveState {
    #[default]
    NotActive,
    Active,
}

impl ActiveState {
    pub fn is_active(self) -> bool {
        self == ActiveState::Active
    }
}

impl From<bool> for ActiveState {
    fn from(active: bool) -> Self {
        if active {
            ActiveState::Active
        } else {
            ActiveState::NotActive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadyState {
    NotReady,
    #[default]
    Ready,
}

/// Aggregate metadata of one bucket, compared across replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketInfo {
    /// XOR fold over the newest non-removed version of each identity
    pub checksum: BucketChecksum,

    /// Number of identities whose newest version is a document
    pub document_count: u32,

    /// Bytes used by those newest document versions
    pub document_size: u64,

    /// Every log entry, including tombstones and superseded versions
    pub entry_count: u32,

    /// Bytes used by every log entry
    pub used_size: u64,

    pub ready: ReadyState,

    pub active: ActiveState,
}

impl BucketInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    pub fn is_ready(&self) -> bool {
        self.ready == ReadyState::Ready
    }
}

impl fmt::Display for BucketInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BucketInfo(crc {}, docs {}/{}B, entries {}/{}B, {:?}, {:?})",
            self.checksum,
            self.document_count,
            self.document_size,
            self.entry_count,
            self.used_size,
            self.ready,
            self.active
        )
    }
}
