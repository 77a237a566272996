//! String interner producing [`Name`] handles.
//!
//! The interner is shared between the parser (an external collaborator),
//! the type checker and codegen, so it sits behind a lock. Lookups of
//! already-interned strings take the read path.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

#[derive(Default)]
struct InternerInner {
    map: FxHashMap<Arc<str>, Name>,
    strings: Vec<Arc<str>>,
}

/// String interner. Index 0 is always the empty string.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned as [`Name::EMPTY`].
    pub fn new() -> Self {
        let mut inner = InternerInner::default();
        let empty: Arc<str> = Arc::from("");
        inner.map.insert(empty.clone(), Name::EMPTY);
        inner.strings.push(empty);
        StringInterner {
            inner: RwLock::new(inner),
        }
    }

    /// Intern a string, returning its stable handle.
    pub fn intern(&self, s: &str) -> Name {
        {
            let inner = self.inner.read();
            if let Some(&name) = inner.map.get(s) {
                return name;
            }
        }
        let mut inner = self.inner.write();
        // Re-check: another thread may have interned between the locks.
        if let Some(&name) = inner.map.get(s) {
            return name;
        }
        let idx = u32::try_from(inner.strings.len())
            .unwrap_or_else(|_| panic!("interner capacity exceeded: {} strings", inner.strings.len()));
        let name = Name::from_raw(idx);
        let arc: Arc<str> = Arc::from(s);
        inner.map.insert(arc.clone(), name);
        inner.strings.push(arc);
        name
    }

    /// Resolve a handle back to its string.
    pub fn lookup(&self, name: Name) -> Arc<str> {
        let inner = self.inner.read();
        inner.strings[name.raw() as usize].clone()
    }

    /// Number of interned strings (including the empty string).
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// Always false: the empty string is pre-interned.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheaply clonable handle to a [`StringInterner`].
#[derive(Clone)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Default for SharedInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &StringInterner {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedups() {
        let interner = StringInterner::new();
        let a = interner.intern("push");
        let b = interner.intern("push");
        let c = interner.intern("pop");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*interner.lookup(a), "push");
    }

    #[test]
    fn empty_string_is_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
    }

    #[test]
    fn shared_handle_sees_same_table() {
        let shared = SharedInterner::new();
        let other = shared.clone();
        let a = shared.intern("len");
        assert_eq!(other.intern("len"), a);
    }
}
