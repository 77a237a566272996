//! Stable, searchable error codes.
//!
//! Bands follow the pipeline tiers:
//! - `E1xxx` name resolution and imports
//! - `E2xxx` type checking
//! - `E3xxx` borrow checking
//! - `E4xxx` monomorphization
//! - `E5xxx` backend / codegen
//! - `E9xxx` internal compiler bugs

use std::fmt;

/// Diagnostic tier, ordered by display priority: internal bugs first,
/// then name, type, borrow, monomorphization and backend errors.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ErrorTier {
    Bug,
    Name,
    Type,
    Borrow,
    Mono,
    Backend,
}

/// Stable error code.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[allow(clippy::upper_case_acronyms)]
pub enum ErrorCode {
    // === Name / import (E1xxx) ===
    /// Unknown identifier.
    E1001,
    /// Unknown type name.
    E1002,
    /// Duplicate definition with an incompatible signature.
    E1003,
    /// Cyclic import.
    E1004,
    /// Unknown module.
    E1005,
    /// Unknown enum variant.
    E1006,

    // === Type (E2xxx) ===
    /// Mismatched types.
    E2001,
    /// Wrong number of arguments.
    E2002,
    /// No such method on receiver type.
    E2003,
    /// Unresolved inference variable.
    E2004,
    /// Unsatisfied where-clause constraint.
    E2005,
    /// Behavior is not object-safe.
    E2006,
    /// Operator not defined for operand types.
    E2007,
    /// Unknown or missing struct field.
    E2008,
    /// Missing return on some path of a non-Unit function.
    E2009,
    /// Call of a deprecated function (warning).
    E2010,
    /// Ambiguous overload.
    E2011,
    /// No overload matches the argument types.
    E2012,
    /// Value is not callable.
    E2013,

    // === Borrow (E3xxx) ===
    /// Use of moved value.
    E3001,
    /// Conflicting borrow.
    E3002,
    /// Assignment to an immutable binding or through a shared reference.
    E3003,
    /// Use of a possibly-uninitialized value.
    E3004,
    /// Returning a reference to a function-local value.
    E3005,
    /// Use of a partially moved value.
    E3006,
    /// Stored closure borrows data it must own.
    E3007,

    // === Monomorphization (E4xxx) ===
    /// Instantiation recursion limit exceeded.
    E4001,
    /// Placeholder type reached code generation.
    E4002,

    // === Backend (E5xxx) ===
    /// IR emission failure.
    E5001,
    /// FFI invocation failure.
    E5002,
    /// Object file write failure.
    E5003,
    /// Backend capability not supported.
    E5004,

    // === Internal (E9xxx) ===
    /// Internal compiler invariant violated.
    E9001,
}

impl ErrorCode {
    /// Which pipeline tier this code belongs to.
    pub fn tier(self) -> ErrorTier {
        match self.as_str().as_bytes()[1] {
            b'1' => ErrorTier::Name,
            b'2' => ErrorTier::Type,
            b'3' => ErrorTier::Borrow,
            b'4' => ErrorTier::Mono,
            b'5' => ErrorTier::Backend,
            _ => ErrorTier::Bug,
        }
    }

    /// The canonical `Ennnn` string.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E2006 => "E2006",
            ErrorCode::E2007 => "E2007",
            ErrorCode::E2008 => "E2008",
            ErrorCode::E2009 => "E2009",
            ErrorCode::E2010 => "E2010",
            ErrorCode::E2011 => "E2011",
            ErrorCode::E2012 => "E2012",
            ErrorCode::E2013 => "E2013",
            ErrorCode::E3001 => "E3001",
            ErrorCode::E3002 => "E3002",
            ErrorCode::E3003 => "E3003",
            ErrorCode::E3004 => "E3004",
            ErrorCode::E3005 => "E3005",
            ErrorCode::E3006 => "E3006",
            ErrorCode::E3007 => "E3007",
            ErrorCode::E4001 => "E4001",
            ErrorCode::E4002 => "E4002",
            ErrorCode::E5001 => "E5001",
            ErrorCode::E5002 => "E5002",
            ErrorCode::E5003 => "E5003",
            ErrorCode::E5004 => "E5004",
            ErrorCode::E9001 => "E9001",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_bands() {
        assert_eq!(ErrorCode::E1001.tier(), ErrorTier::Name);
        assert_eq!(ErrorCode::E2001.tier(), ErrorTier::Type);
        assert_eq!(ErrorCode::E3002.tier(), ErrorTier::Borrow);
        assert_eq!(ErrorCode::E4001.tier(), ErrorTier::Mono);
        assert_eq!(ErrorCode::E5004.tier(), ErrorTier::Backend);
        assert_eq!(ErrorCode::E9001.tier(), ErrorTier::Bug);
    }

    #[test]
    fn tier_display_priority() {
        // Bug outranks everything; name outranks type; backend is last.
        assert!(ErrorTier::Bug < ErrorTier::Name);
        assert!(ErrorTier::Name < ErrorTier::Type);
        assert!(ErrorTier::Type < ErrorTier::Borrow);
        assert!(ErrorTier::Borrow < ErrorTier::Mono);
        assert!(ErrorTier::Mono < ErrorTier::Backend);
    }
}
