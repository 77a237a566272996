//! Places: base variable plus projection path.
//!
//! A place is an l-value decomposed into a base binding and an ordered
//! list of projections (`.field`, `[index]`, `*deref`). Two places
//! conflict iff one's projection path is a prefix of the other's;
//! disjoint fields of the same struct are independent resources.

use smallvec::SmallVec;
use tml_ir::Name;

/// Index of a place's base binding in the borrow environment.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct PlaceId(pub u32);

impl PlaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One projection step.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Projection {
    /// `.field` (tuple indices arrive as digit names).
    Field(Name),
    /// `[index]`; indices are not tracked individually, so any two
    /// index projections overlap.
    Index,
    /// `*deref`.
    Deref,
}

impl Projection {
    /// Whether two steps can refer to the same memory.
    fn overlaps(self, other: Projection) -> bool {
        match (self, other) {
            (Projection::Field(a), Projection::Field(b)) => a == b,
            (Projection::Index, Projection::Index) => true,
            (Projection::Deref, Projection::Deref) => true,
            _ => false,
        }
    }
}

/// A base binding plus projection path.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Place {
    pub base: PlaceId,
    pub projections: SmallVec<[Projection; 4]>,
}

impl Place {
    pub fn base(base: PlaceId) -> Self {
        Place {
            base,
            projections: SmallVec::new(),
        }
    }

    pub fn field(base: PlaceId, field: Name) -> Self {
        let mut place = Place::base(base);
        place.projections.push(Projection::Field(field));
        place
    }

    /// True when borrows of `self` and `other` can alias: same base and
    /// one projection path is an (overlapping) prefix of the other.
    pub fn overlaps(&self, other: &Place) -> bool {
        if self.base != other.base {
            return false;
        }
        self.projections
            .iter()
            .zip(other.projections.iter())
            .all(|(&a, &b)| a.overlaps(b))
    }

    /// First projected field name, if the path starts with one.
    pub fn first_field(&self) -> Option<Name> {
        match self.projections.first() {
            Some(Projection::Field(name)) => Some(*name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_fields_do_not_overlap() {
        let base = PlaceId(0);
        let x = Place::field(base, Name::from_raw(1));
        let y = Place::field(base, Name::from_raw(2));
        assert!(!x.overlaps(&y));
        assert!(x.overlaps(&x));
    }

    #[test]
    fn whole_overlaps_its_fields() {
        let base = PlaceId(0);
        let whole = Place::base(base);
        let field = Place::field(base, Name::from_raw(1));
        assert!(whole.overlaps(&field));
        assert!(field.overlaps(&whole));
    }

    #[test]
    fn different_bases_never_overlap() {
        let a = Place::base(PlaceId(0));
        let b = Place::base(PlaceId(1));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn index_projections_overlap_conservatively() {
        let base = PlaceId(0);
        let mut a = Place::base(base);
        a.projections.push(Projection::Index);
        let mut b = Place::base(base);
        b.projections.push(Projection::Index);
        assert!(a.overlaps(&b));
    }
}
