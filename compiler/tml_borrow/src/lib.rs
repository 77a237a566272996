//! Borrow checker for the TML compiler.
//!
//! Runs after type checking and proves the ownership and aliasing
//! discipline:
//!
//! - each variable introduces a **place**; projections form a tree, and
//!   disjoint fields are independent resources
//! - borrows follow the pigeonhole rule: all shared, or exactly one
//!   mutable
//! - method calls use **two-phase borrows**
//!   (`Shared | MutableReserved | MutableActive`): the receiver's
//!   mutable borrow is reserved before argument evaluation and
//!   activates at the call, so `v.push(v.len())` is accepted
//! - **non-lexical lifetimes**: a borrow held by a reference binding is
//!   released after the binding's last use
//! - **partial moves** are tracked per field
//! - returning a reference to a function-local is a dangling-reference
//!   error, and a returned closure must own its captures

mod checker;
mod place;
mod state;

#[cfg(test)]
mod tests;

pub use checker::borrow_check;
pub use place::{Place, PlaceId, Projection};
pub use state::{Borrow, BorrowEnv, BorrowId, BorrowKind, PlaceState};
