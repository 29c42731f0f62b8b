//! A 64-bit Bloom filter over key types.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Three-bit Bloom filter used by the persistent lists to skip subtrees that cannot contain a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BloomFilter {
    value: u64,
}

impl BloomFilter {
    pub const EMPTY: BloomFilter = BloomFilter { value: 0 };

    pub fn from_hash(hash: u64) -> BloomFilter {
        BloomFilter {
            value: (1 << ((hash >> 16) & 63))
                | (1 << ((hash >> 10) & 63))
                | (1 << ((hash >> 4) & 63)),
        }
    }

    /// The filter for a single key type.
    pub fn for_type(type_id: TypeId) -> BloomFilter {
        let mut hasher = DefaultHasher::new();
        type_id.hash(&mut hasher);
        BloomFilter::from_hash(hasher.finish())
    }

    pub fn value(self) -> u64 {
        self.value
    }

    pub fn is_empty(self) -> bool {
        self.value == 0
    }

    pub fn union(self, other: BloomFilter) -> BloomFilter {
        BloomFilter {
            value: self.value | other.value,
        }
    }

    pub fn form_union(&mut self, other: BloomFilter) {
        self.value |= other.value;
    }

    /// Returns false if `other` is definitely not contained in this filter.
    pub fn may_contain(self, other: BloomFilter) -> bool {
        self.value & other.value == other.value
    }
}
