//! Lexical scopes for local variable bindings.
//!
//! Scopes are LIFO: `push` at block entry, `pop` at exit. Lookup walks
//! from the innermost frame outwards.

use rustc_hash::FxHashMap;
use tml_ir::{Name, Span};

use crate::{Symbol, TypeId};

/// The scope stack.
#[derive(Clone, Debug)]
pub struct Scopes {
    frames: Vec<FxHashMap<Name, Symbol>>,
}

impl Scopes {
    /// A scope stack with the root (function-level) frame in place.
    pub fn new() -> Self {
        Scopes {
            frames: vec![FxHashMap::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    /// Pop the innermost frame. The root frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Define a symbol in the innermost frame, shadowing outer bindings.
    pub fn define(&mut self, name: Name, ty: TypeId, is_mutable: bool, span: Span) {
        let symbol = Symbol {
            name,
            ty,
            is_mutable,
            span,
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, symbol);
        }
    }

    /// Look up a symbol in this scope or any parent scope.
    pub fn lookup(&self, name: Name) -> Option<&Symbol> {
        self.frames.iter().rev().find_map(|frame| frame.get(&name))
    }

    /// Look up only in the innermost frame.
    pub fn lookup_local(&self, name: Name) -> Option<&Symbol> {
        self.frames.last().and_then(|frame| frame.get(&name))
    }

    /// All names visible from the current scope (for suggestions).
    pub fn visible_names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self
            .frames
            .iter()
            .flat_map(|frame| frame.keys().copied())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_and_popping() {
        let mut scopes = Scopes::new();
        let x = Name::from_raw(1);
        scopes.define(x, TypeId::I32, false, Span::DUMMY);
        scopes.push();
        scopes.define(x, TypeId::STR, true, Span::DUMMY);
        assert_eq!(scopes.lookup(x).map(|s| s.ty), Some(TypeId::STR));
        scopes.pop();
        assert_eq!(scopes.lookup(x).map(|s| s.ty), Some(TypeId::I32));
    }

    #[test]
    fn root_frame_survives_extra_pops() {
        let mut scopes = Scopes::new();
        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn lookup_local_ignores_parents() {
        let mut scopes = Scopes::new();
        let x = Name::from_raw(1);
        scopes.define(x, TypeId::I32, false, Span::DUMMY);
        scopes.push();
        assert!(scopes.lookup_local(x).is_none());
        assert!(scopes.lookup(x).is_some());
    }
}
