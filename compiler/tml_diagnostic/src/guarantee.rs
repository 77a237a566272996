//! Type-level proof that an error was emitted.
//!
//! `ErrorGuaranteed` can only be constructed inside this crate, by the
//! queue, when an error-severity diagnostic is actually recorded. A
//! phase returning `Result<T, ErrorGuaranteed>` therefore cannot fail
//! without having reported something to the user.

/// Zero-sized proof that at least one error diagnostic was emitted.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ErrorGuaranteed(pub(crate) ());
