//! Process-wide identity stamps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque identity, unique for the lifetime of the process.
///
/// Used wherever two values can be compared by identity instead of structure, e.g. property list
/// nodes and tracker bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniqueId(u64);

impl UniqueId {
    /// The id that is never handed out.
    pub const INVALID: UniqueId = UniqueId(0);

    /// Returns a fresh id.
    ///
    /// The counter is 64 bits wide and never wraps back to [`UniqueId::INVALID`].
    pub fn new() -> UniqueId {
        UniqueId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_valid(self) -> bool {
        self != UniqueId::INVALID
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for UniqueId {
    fn default() -> UniqueId {
        UniqueId::INVALID
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_fresh_and_increasing() {
        let a = UniqueId::new();
        let b = UniqueId::new();
        assert!(a.is_valid() && b.is_valid());
        assert_ne!(a, b, "two calls must not hand out the same id");
        assert!(b > a, "ids are handed out in increasing order");
        assert!(!UniqueId::default().is_valid());
    }

    #[test]
    fn ids_do_not_wrap_at_32_bits() {
        let start = NEXT_ID.load(Ordering::Relaxed);
        NEXT_ID.fetch_max(u64::from(u32::MAX), Ordering::Relaxed);
        let a = UniqueId::new();
        let b = UniqueId::new();
        assert!(a.raw() >= u64::from(u32::MAX));
        assert!(b.is_valid());
        assert!(b > a);
        assert!(b.raw() > start);
    }
}
