//! Version seeds: 32-bit change-detection tokens.

use std::fmt;

/// An opaque token that changes whenever the value it stamps changes.
///
/// Two sentinels are reserved: [`VersionSeed::EMPTY`] is the identity of [`merge`] and
/// [`VersionSeed::INVALID`] absorbs everything it is merged with.
///
/// [`merge`]: VersionSeed::merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionSeed(u32);

impl VersionSeed {
    pub const EMPTY: VersionSeed = VersionSeed(0);
    pub const INVALID: VersionSeed = VersionSeed(u32::MAX);

    pub const fn new(value: u32) -> VersionSeed {
        VersionSeed(value)
    }

    /// Builds a seed for a preference node from its node id and the producing view's seed.
    pub fn from_node(node_id: u32, view_seed: u32) -> VersionSeed {
        VersionSeed(merge32(node_id, view_seed))
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self == VersionSeed::EMPTY
    }

    pub fn is_invalid(self) -> bool {
        self == VersionSeed::INVALID
    }

    /// Returns true if both seeds are valid and equal.
    pub fn matches(self, other: VersionSeed) -> bool {
        if self.is_invalid() || other.is_invalid() {
            return false;
        }
        self.0 == other.0
    }

    /// Mixes `other` into this seed.
    pub fn merge(&mut self, other: VersionSeed) {
        *self = self.merged(other);
    }

    /// Returns the result of mixing `other` into this seed.
    pub fn merged(self, other: VersionSeed) -> VersionSeed {
        if self.is_invalid() || other.is_empty() {
            self
        } else if self.is_empty() || other.is_invalid() {
            other
        } else {
            VersionSeed(merge32(self.0, other.0))
        }
    }
}

impl Default for VersionSeed {
    fn default() -> VersionSeed {
        VersionSeed::EMPTY
    }
}

impl fmt::Display for VersionSeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else if self.is_invalid() {
            write!(f, "invalid")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// 64-bit avalanche mix of two 32-bit values, truncated to 32 bits.
fn merge32(a: u32, b: u32) -> u32 {
    let a = a as u64;
    let mut c = b as u64;
    c = c.wrapping_add(!(c << 32));
    c = c.wrapping_add(a << 32);
    c ^= c >> 22;
    c = c.wrapping_add(!(c << 13));
    c ^= c >> 8;
    c = c.wrapping_add(c << 3);
    c ^= c >> 15;
    c = c.wrapping_add(!(c << 27));
    c ^= c >> 31;
    c as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_mixes_known_values() {
        assert_eq!(merge32(1, 2), 547159728);
        assert_eq!(VersionSeed::new(1).merged(VersionSeed::new(2)).value(), 547159728);
    }

    #[test]
    fn sentinels() {
        let seed = VersionSeed::new(42);
        assert_eq!(VersionSeed::EMPTY.merged(seed), seed);
        assert_eq!(seed.merged(VersionSeed::EMPTY), seed);
        assert!(VersionSeed::INVALID.merged(seed).is_invalid());
        assert!(seed.merged(VersionSeed::INVALID).is_invalid());
        assert!(!VersionSeed::INVALID.matches(VersionSeed::INVALID));
        assert!(seed.matches(VersionSeed::new(42)));
    }

    #[test]
    fn description() {
        assert_eq!(VersionSeed::EMPTY.to_string(), "empty");
        assert_eq!(VersionSeed::INVALID.to_string(), "invalid");
        assert_eq!(VersionSeed::new(7).to_string(), "7");
    }
}
