use crate::types::{BucketId, DocumentId};
use xxhash_rust::xxh3::xxh3_64;

/// Maps a document identity to the bucket it belongs to.
pub trait BucketIdFactory: Send + Sync {
    /// Bucket id of `id` at full resolution. Callers truncate it with
    /// [`BucketId::with_used_bits`] to test membership at coarser levels.
    fn bucket_id(&self, id: &DocumentId) -> BucketId;
}

/// Places the low 32 location bits in the low half of the raw id and a hash
/// of the full id above them, so co-located documents stay together until a
/// bucket has been split past 32 bits.
#[derive(Debug, Clone, Copy)]
pub struct DefaultBucketIdFactory {
    used_bits: u8,
}

impl DefaultBucketIdFactory {
    pub fn new(used_bits: u8) -> Self {
        Self {
            used_bits: used_bits.min(BucketId::MAX_USED_BITS),
        }
    }

    pub fn used_bits(&self) -> u8 {
        self.used_bits
    }
}

impl Default for DefaultBucketIdFactory {
    fn default() -> Self {
        Self::new(BucketId::MAX_USED_BITS)
    }
}

impl BucketIdFactory for DefaultBucketIdFactory {
    fn bucket_id(&self, id: &DocumentId) -> BucketId {
        let location = id.location() & 0xFFFF_FFFF;
        let gid_bits = xxh3_64(id.to_string().as_bytes()) << 32;
        BucketId::new(self.used_bits, gid_bits | location)
    }
}
