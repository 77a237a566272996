//! Interned string identifier.
//!
//! `Name` is a 32-bit handle into the [`StringInterner`](crate::StringInterner).
//! Two names compare equal iff their strings are identical, so name
//! comparison is a u32 compare everywhere in the compiler.

use std::fmt;

/// Interned string identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from a raw u32 value.
    ///
    /// Only meaningful for values previously produced by the same interner.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    /// True for the pre-interned empty string.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Name::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert!(Name::EMPTY.is_empty());
        assert_eq!(Name::EMPTY.raw(), 0);
    }

    #[test]
    fn raw_round_trip() {
        let n = Name::from_raw(42);
        assert_eq!(n.raw(), 42);
        assert!(!n.is_empty());
    }
}
