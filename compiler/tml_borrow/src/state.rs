//! Borrow-checker state: per-place ownership data and the live borrow
//! set.

use rustc_hash::{FxHashMap, FxHashSet};
use tml_ir::{Name, Span};
use tml_types::TypeId;

use crate::place::{Place, PlaceId};

/// Borrow kind, with the two-phase mutable states.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BorrowKind {
    Shared,
    /// Reserved mutable borrow: shared borrows of the same place are
    /// still permitted (argument-evaluation window of a method call).
    MutableReserved,
    MutableActive,
}

impl BorrowKind {
    pub fn is_mutable(self) -> bool {
        matches!(self, BorrowKind::MutableReserved | BorrowKind::MutableActive)
    }
}

/// Identity of a live borrow.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct BorrowId(pub u32);

/// A live borrow.
#[derive(Clone, Debug)]
pub struct Borrow {
    pub id: BorrowId,
    pub kind: BorrowKind,
    pub place: Place,
    pub created_span: Span,
    /// The reference variable holding this borrow, if any. Anonymous
    /// borrows (method receivers) are released explicitly.
    pub holder: Option<Name>,
    /// Scope depth at creation; released at scope exit.
    pub scope_depth: usize,
}

/// Ownership state of one binding.
#[derive(Clone, Debug)]
pub struct PlaceState {
    pub name: Name,
    pub ty: TypeId,
    pub is_mut: bool,
    pub initialized: bool,
    pub moved: Option<Span>,
    /// Per-field move map for partial moves.
    pub moved_fields: FxHashMap<Name, Span>,
    pub decl_span: Span,
    /// If this binding holds a reference, the place it points at.
    pub points_at: Option<PlaceId>,
}

/// The borrow environment for one function.
#[derive(Default)]
pub struct BorrowEnv {
    places: Vec<PlaceState>,
    /// Name → place, one frame per lexical scope.
    scopes: Vec<FxHashMap<Name, PlaceId>>,
    /// Live borrows.
    borrows: Vec<Borrow>,
    next_borrow: u32,
}

impl BorrowEnv {
    pub fn new() -> Self {
        BorrowEnv {
            scopes: vec![FxHashMap::default()],
            ..BorrowEnv::default()
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Pop the scope, dropping its places and releasing their borrows
    /// (both borrows they hold and borrows created at this depth).
    pub fn pop_scope(&mut self) {
        let depth = self.scopes.len();
        if let Some(frame) = self.scopes.pop() {
            let dropped: FxHashSet<PlaceId> = frame.values().copied().collect();
            self.borrows.retain(|b| {
                b.scope_depth < depth && !dropped.contains(&b.place.base)
            });
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn define(&mut self, name: Name, ty: TypeId, is_mut: bool, initialized: bool, span: Span) -> PlaceId {
        let id = PlaceId(self.places.len() as u32);
        self.places.push(PlaceState {
            name,
            ty,
            is_mut,
            initialized,
            moved: None,
            moved_fields: FxHashMap::default(),
            decl_span: span,
            points_at: None,
        });
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name, id);
        }
        id
    }

    pub fn lookup(&self, name: Name) -> Option<PlaceId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(&name).copied())
    }

    pub fn place(&self, id: PlaceId) -> &PlaceState {
        &self.places[id.index()]
    }

    pub fn place_mut(&mut self, id: PlaceId) -> &mut PlaceState {
        &mut self.places[id.index()]
    }

    // === Borrows ===

    pub fn create_borrow(
        &mut self,
        place: Place,
        kind: BorrowKind,
        holder: Option<Name>,
        span: Span,
    ) -> BorrowId {
        let id = BorrowId(self.next_borrow);
        self.next_borrow += 1;
        self.borrows.push(Borrow {
            id,
            kind,
            place,
            created_span: span,
            holder,
            scope_depth: self.scopes.len(),
        });
        id
    }

    pub fn release_borrow(&mut self, id: BorrowId) {
        self.borrows.retain(|b| b.id != id);
    }

    /// Release every borrow whose holder is `name`.
    pub fn release_holder(&mut self, name: Name) {
        self.borrows.retain(|b| b.holder != Some(name));
    }

    pub fn borrows(&self) -> &[Borrow] {
        &self.borrows
    }

    /// Live borrows overlapping `place`.
    pub fn borrows_of<'a>(&'a self, place: &'a Place) -> impl Iterator<Item = &'a Borrow> + 'a {
        self.borrows.iter().filter(move |b| b.place.overlaps(place))
    }

    /// Transition a reserved borrow to active (two-phase activation).
    pub fn activate(&mut self, id: BorrowId) {
        if let Some(borrow) = self.borrows.iter_mut().find(|b| b.id == id) {
            if borrow.kind == BorrowKind::MutableReserved {
                borrow.kind = BorrowKind::MutableActive;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_exit_releases_borrows_on_dropped_places() {
        let mut env = BorrowEnv::new();
        let x = env.define(Name::from_raw(1), TypeId::I64, true, true, Span::DUMMY);
        env.push_scope();
        env.create_borrow(Place::base(x), BorrowKind::Shared, None, Span::DUMMY);
        assert_eq!(env.borrows().len(), 1);
        env.pop_scope();
        // Borrow was created at inner depth, so it dies with the scope.
        assert_eq!(env.borrows().len(), 0);
    }

    #[test]
    fn release_holder_removes_only_its_borrows() {
        let mut env = BorrowEnv::new();
        let x = env.define(Name::from_raw(1), TypeId::I64, true, true, Span::DUMMY);
        let r = Name::from_raw(2);
        env.create_borrow(Place::base(x), BorrowKind::Shared, Some(r), Span::DUMMY);
        env.create_borrow(Place::base(x), BorrowKind::Shared, None, Span::DUMMY);
        env.release_holder(r);
        assert_eq!(env.borrows().len(), 1);
    }

    #[test]
    fn activation_flips_reserved_only() {
        let mut env = BorrowEnv::new();
        let x = env.define(Name::from_raw(1), TypeId::I64, true, true, Span::DUMMY);
        let id = env.create_borrow(
            Place::base(x),
            BorrowKind::MutableReserved,
            None,
            Span::DUMMY,
        );
        env.activate(id);
        assert_eq!(env.borrows()[0].kind, BorrowKind::MutableActive);
    }
}
