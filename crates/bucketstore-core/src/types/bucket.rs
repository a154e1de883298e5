use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical write time of a bucket entry. Unique within a bucket and the
/// primary ordering key of its log.
pub type Timestamp = u64;

/// Identifier of a bucket: the low `used_bits` bits of a 64-bit location.
///
/// A bucket with `n` used bits contains every bucket id whose low `n` bits
/// match it, so splitting a bucket yields two children with `n + 1` bits and
/// joining two siblings yields their common parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketId {
    used_bits: u8,
    raw: u64,
}

impl BucketId {
    /// Largest supported number of used bits. The remaining top bits of the
    /// key form hold the used-bit count.
    pub const MAX_USED_BITS: u8 = 58;

    /// Create a bucket id, clamping `used_bits` to [`Self::MAX_USED_BITS`] and
    /// discarding raw bits above it.
    pub fn new(used_bits: u8, raw: u64) -> Self {
        let used_bits = used_bits.min(Self::MAX_USED_BITS);
        Self {
            used_bits,
            raw: raw & Self::mask(used_bits),
        }
    }

    fn mask(bits: u8) -> u64 {
        if bits == 0 {
            0
        } else {
            u64::MAX >> (64 - u32::from(bits))
        }
    }

    pub fn used_bits(&self) -> u8 {
        self.used_bits
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Packed form with the used-bit count in the top six bits.
    pub fn key(&self) -> u64 {
        (u64::from(self.used_bits) << Self::MAX_USED_BITS) | self.raw
    }

    /// Re-express this id with a different number of used bits.
    pub fn with_used_bits(&self, used_bits: u8) -> Self {
        Self::new(used_bits, self.raw)
    }

    /// Whether `other` lies inside this bucket.
    pub fn contains(&self, other: &BucketId) -> bool {
        other.used_bits >= self.used_bits && other.raw & Self::mask(self.used_bits) == self.raw
    }

    /// The two buckets produced by splitting this one on its next bit.
    ///
    /// At [`Self::MAX_USED_BITS`] both children equal `self`.
    pub fn split_children(&self) -> (BucketId, BucketId) {
        if self.used_bits >= Self::MAX_USED_BITS {
            return (*self, *self);
        }
        let bits = self.used_bits + 1;
        (
            Self::new(bits, self.raw),
            Self::new(bits, self.raw | (1u64 << self.used_bits)),
        )
    }

    /// The bucket this one was split from.
    pub fn parent(&self) -> BucketId {
        Self::new(self.used_bits.saturating_sub(1), self.raw)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId(0x{:016x})", self.key())
    }
}
