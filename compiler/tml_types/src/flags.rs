//! Precomputed per-type property flags.
//!
//! Computed once at intern time from the children's flags, so property
//! queries and traversal guards are O(1).

use bitflags::bitflags;

bitflags! {
    /// Structural properties of an interned type.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u8 {
        /// Contains an inference variable somewhere.
        const HAS_VAR = 1 << 0;
        /// Contains an unresolved generic parameter somewhere.
        const HAS_GENERIC = 1 << 1;
        /// Contains the error sentinel somewhere.
        const HAS_ERROR = 1 << 2;
    }
}

impl TypeFlags {
    #[inline]
    pub fn has_var(self) -> bool {
        self.contains(TypeFlags::HAS_VAR)
    }

    #[inline]
    pub fn has_generic(self) -> bool {
        self.contains(TypeFlags::HAS_GENERIC)
    }

    #[inline]
    pub fn has_error(self) -> bool {
        self.contains(TypeFlags::HAS_ERROR)
    }

    /// Fully concrete: safe to hand to layout/codegen.
    #[inline]
    pub fn is_concrete(self) -> bool {
        !self.intersects(TypeFlags::HAS_VAR | TypeFlags::HAS_GENERIC | TypeFlags::HAS_ERROR)
    }
}
