//! The unified type pool.
//!
//! Stores every type in the compilation exactly once:
//! - O(1) equality (index comparison)
//! - automatic deduplication on intern
//! - precomputed [`TypeFlags`] per item
//! - primitives pre-interned at fixed indices

use rustc_hash::FxHashMap;
use tml_ir::{Name, StringInterner};

use crate::{ArraySize, Capture, PrimKind, TypeData, TypeFlags, TypeId, TypeVar};

/// State of a type variable.
#[derive(Clone, Debug)]
pub enum VarState {
    /// Unbound - waiting to be unified.
    Unbound,
    /// Linked to another type - follow the link.
    Link(TypeId),
}

/// The type pool - single source of truth for all types.
pub struct TypePool {
    items: Vec<TypeData>,
    flags: Vec<TypeFlags>,
    intern_map: FxHashMap<TypeData, TypeId>,
    var_states: Vec<VarState>,
}

impl TypePool {
    /// Create a pool with all primitives and the error sentinel
    /// pre-interned at their fixed [`TypeId`] constants.
    pub fn new() -> Self {
        let mut pool = TypePool {
            items: Vec::with_capacity(64),
            flags: Vec::with_capacity(64),
            intern_map: FxHashMap::default(),
            var_states: Vec::new(),
        };
        for kind in PrimKind::ALL {
            let id = pool.intern(TypeData::Prim(kind));
            debug_assert_eq!(id, TypeId::of_prim(kind));
        }
        let err = pool.intern(TypeData::Error);
        debug_assert_eq!(err, TypeId::ERROR);
        debug_assert_eq!(pool.items.len() as u32, TypeId::PREINTERNED);
        pool
    }

    /// Intern a type, returning its stable id.
    pub fn intern(&mut self, data: TypeData) -> TypeId {
        if let Some(&id) = self.intern_map.get(&data) {
            return id;
        }
        let flags = self.compute_flags(&data);
        let id = TypeId::new(
            u32::try_from(self.items.len())
                .unwrap_or_else(|_| panic!("type pool capacity exceeded")),
        );
        self.intern_map.insert(data.clone(), id);
        self.items.push(data);
        self.flags.push(flags);
        id
    }

    fn compute_flags(&self, data: &TypeData) -> TypeFlags {
        let child = |id: TypeId| self.flags[id.index()];
        match data {
            TypeData::Prim(_) => TypeFlags::empty(),
            TypeData::Error => TypeFlags::HAS_ERROR,
            TypeData::Var(_) => TypeFlags::HAS_VAR,
            TypeData::Generic(_) => TypeFlags::HAS_GENERIC,
            TypeData::Named { args, .. } | TypeData::DynBehavior { args, .. } => {
                args.iter().fold(TypeFlags::empty(), |acc, &a| acc | child(a))
            }
            TypeData::Ref { inner, .. } | TypeData::Ptr { inner, .. } | TypeData::Slice(inner) => {
                child(*inner)
            }
            TypeData::Array { element, size } => {
                let mut acc = child(*element);
                if matches!(size, ArraySize::Param(_)) {
                    acc |= TypeFlags::HAS_GENERIC;
                }
                acc
            }
            TypeData::ConstValue(_) => TypeFlags::empty(),
            TypeData::Tuple(elements) => elements
                .iter()
                .fold(TypeFlags::empty(), |acc, &e| acc | child(e)),
            TypeData::Func { params, ret, .. } => params
                .iter()
                .fold(child(*ret), |acc, &p| acc | child(p)),
            TypeData::Closure {
                params,
                ret,
                captures,
            } => {
                let mut acc = child(*ret);
                for &p in params.iter() {
                    acc |= child(p);
                }
                for c in captures.iter() {
                    acc |= child(c.ty);
                }
                acc
            }
        }
    }

    #[inline]
    pub fn data(&self, id: TypeId) -> &TypeData {
        &self.items[id.index()]
    }

    #[inline]
    pub fn flags(&self, id: TypeId) -> TypeFlags {
        self.flags[id.index()]
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Never true: primitives are pre-interned.
    pub fn is_empty(&self) -> bool {
        false
    }

    // === Constructors ===

    pub fn named(&mut self, name: Name, args: &[TypeId]) -> TypeId {
        self.named_in(name, Name::EMPTY, args)
    }

    pub fn named_in(&mut self, name: Name, module_path: Name, args: &[TypeId]) -> TypeId {
        self.intern(TypeData::Named {
            name,
            module_path,
            args: args.into(),
        })
    }

    pub fn generic(&mut self, name: Name) -> TypeId {
        self.intern(TypeData::Generic(name))
    }

    pub fn reference(&mut self, is_mut: bool, inner: TypeId) -> TypeId {
        self.intern(TypeData::Ref { is_mut, inner })
    }

    pub fn pointer(&mut self, is_mut: bool, inner: TypeId) -> TypeId {
        self.intern(TypeData::Ptr { is_mut, inner })
    }

    pub fn array(&mut self, element: TypeId, size: ArraySize) -> TypeId {
        self.intern(TypeData::Array { element, size })
    }

    pub fn const_value(&mut self, value: u64) -> TypeId {
        self.intern(TypeData::ConstValue(value))
    }

    pub fn slice(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeData::Slice(element))
    }

    pub fn tuple(&mut self, elements: &[TypeId]) -> TypeId {
        self.intern(TypeData::Tuple(elements.into()))
    }

    pub fn func(&mut self, params: &[TypeId], ret: TypeId, is_async: bool) -> TypeId {
        self.intern(TypeData::Func {
            params: params.into(),
            ret,
            is_async,
        })
    }

    pub fn closure(&mut self, params: &[TypeId], ret: TypeId, captures: Vec<Capture>) -> TypeId {
        self.intern(TypeData::Closure {
            params: params.into(),
            ret,
            captures: captures.into(),
        })
    }

    pub fn dyn_behavior(&mut self, behavior: Name, args: &[TypeId], is_mut: bool) -> TypeId {
        self.intern(TypeData::DynBehavior {
            behavior,
            args: args.into(),
            is_mut,
        })
    }

    // === Type variables ===

    /// Allocate a fresh unbound inference variable.
    pub fn fresh_var(&mut self) -> TypeId {
        let var = TypeVar(
            u32::try_from(self.var_states.len())
                .unwrap_or_else(|_| panic!("type variable capacity exceeded")),
        );
        self.var_states.push(VarState::Unbound);
        self.intern(TypeData::Var(var))
    }

    pub fn var_state(&self, var: TypeVar) -> &VarState {
        &self.var_states[var.0 as usize]
    }

    pub(crate) fn link_var(&mut self, var: TypeVar, target: TypeId) {
        self.var_states[var.0 as usize] = VarState::Link(target);
    }

    /// Count of allocated inference variables.
    pub fn var_count(&self) -> usize {
        self.var_states.len()
    }

    // === Resolution ===

    /// Follow top-level variable links, with path compression.
    pub fn resolve_shallow(&mut self, id: TypeId) -> TypeId {
        let var_of = |pool: &TypePool, id: TypeId| match pool.items[id.index()] {
            TypeData::Var(var) => Some(var),
            _ => None,
        };
        // First pass: find the representative. Link chains are acyclic
        // by the occurs check; the hop bound stays defensive against
        // pool misuse.
        let mut current = id;
        let mut hops = 0usize;
        while let Some(var) = var_of(self, current) {
            match self.var_states[var.0 as usize] {
                VarState::Link(target) => {
                    current = target;
                    hops += 1;
                    if hops > self.var_states.len() {
                        return current;
                    }
                }
                VarState::Unbound => break,
            }
        }
        // Second pass: compress the chain.
        let mut walk = id;
        while let Some(var) = var_of(self, walk) {
            match self.var_states[var.0 as usize] {
                VarState::Link(target) if target != current => {
                    self.var_states[var.0 as usize] = VarState::Link(current);
                    walk = target;
                }
                _ => break,
            }
        }
        current
    }

    /// Deep resolution: rebuild the type with every bound variable
    /// replaced by its target, to a fixed point. Unbound variables and
    /// generics are left in place. Skips the walk entirely when the
    /// flags say there is nothing to substitute.
    pub fn resolve(&mut self, id: TypeId) -> TypeId {
        let top = self.resolve_shallow(id);
        if !self.flags(top).has_var() {
            return top;
        }
        self.resolve_deep(top, 0)
    }

    fn resolve_deep(&mut self, id: TypeId, depth: usize) -> TypeId {
        // Bounded visited depth: the occurs check keeps the graph
        // acyclic, so this limit only trips on internal corruption.
        const MAX_DEPTH: usize = 256;
        if depth > MAX_DEPTH {
            return TypeId::ERROR;
        }
        let id = self.resolve_shallow(id);
        if !self.flags(id).has_var() {
            return id;
        }
        let data = self.data(id).clone();
        match data {
            TypeData::Var(_) => id, // unbound after shallow resolve
            TypeData::Named {
                name,
                module_path,
                args,
            } => {
                let args: Vec<TypeId> = args
                    .iter()
                    .map(|&a| self.resolve_deep(a, depth + 1))
                    .collect();
                self.named_in(name, module_path, &args)
            }
            TypeData::Ref { is_mut, inner } => {
                let inner = self.resolve_deep(inner, depth + 1);
                self.reference(is_mut, inner)
            }
            TypeData::Ptr { is_mut, inner } => {
                let inner = self.resolve_deep(inner, depth + 1);
                self.pointer(is_mut, inner)
            }
            TypeData::Array { element, size } => {
                let element = self.resolve_deep(element, depth + 1);
                self.array(element, size)
            }
            TypeData::Slice(element) => {
                let element = self.resolve_deep(element, depth + 1);
                self.slice(element)
            }
            TypeData::Tuple(elements) => {
                let elements: Vec<TypeId> = elements
                    .iter()
                    .map(|&e| self.resolve_deep(e, depth + 1))
                    .collect();
                self.tuple(&elements)
            }
            TypeData::Func {
                params,
                ret,
                is_async,
            } => {
                let params: Vec<TypeId> = params
                    .iter()
                    .map(|&p| self.resolve_deep(p, depth + 1))
                    .collect();
                let ret = self.resolve_deep(ret, depth + 1);
                self.func(&params, ret, is_async)
            }
            TypeData::Closure {
                params,
                ret,
                captures,
            } => {
                let params: Vec<TypeId> = params
                    .iter()
                    .map(|&p| self.resolve_deep(p, depth + 1))
                    .collect();
                let ret = self.resolve_deep(ret, depth + 1);
                let captures: Vec<Capture> = captures
                    .iter()
                    .map(|c| Capture {
                        name: c.name,
                        ty: self.resolve_deep(c.ty, depth + 1),
                        is_mut: c.is_mut,
                    })
                    .collect();
                self.closure(&params, ret, captures)
            }
            TypeData::DynBehavior {
                behavior,
                args,
                is_mut,
            } => {
                let args: Vec<TypeId> = args
                    .iter()
                    .map(|&a| self.resolve_deep(a, depth + 1))
                    .collect();
                self.dyn_behavior(behavior, &args, is_mut)
            }
            TypeData::Prim(_)
            | TypeData::Generic(_)
            | TypeData::ConstValue(_)
            | TypeData::Error => id,
        }
    }

    /// Occurs check: does `var` occur inside `ty` (after resolution)?
    pub fn occurs(&mut self, var: TypeVar, ty: TypeId) -> bool {
        let ty = self.resolve_shallow(ty);
        if !self.flags(ty).has_var() {
            return false;
        }
        match self.data(ty).clone() {
            TypeData::Var(v) => v == var,
            TypeData::Named { args, .. } | TypeData::DynBehavior { args, .. } => {
                args.iter().any(|&a| self.occurs(var, a))
            }
            TypeData::Ref { inner, .. } | TypeData::Ptr { inner, .. } | TypeData::Slice(inner) => {
                self.occurs(var, inner)
            }
            TypeData::Array { element, .. } => self.occurs(var, element),
            TypeData::Tuple(elements) => elements.iter().any(|&e| self.occurs(var, e)),
            TypeData::Func { params, ret, .. } => {
                params.iter().any(|&p| self.occurs(var, p)) || self.occurs(var, ret)
            }
            TypeData::Closure {
                params,
                ret,
                captures,
            } => {
                params.iter().any(|&p| self.occurs(var, p))
                    || self.occurs(var, ret)
                    || captures.iter().any(|c| self.occurs(var, c.ty))
            }
            TypeData::Prim(_)
            | TypeData::Generic(_)
            | TypeData::ConstValue(_)
            | TypeData::Error => false,
        }
    }

    // === Display ===

    /// Human-readable type text for diagnostics: `List[I32]`,
    /// `ref Str`, `(I32, Bool)`.
    pub fn display(&self, id: TypeId, interner: &StringInterner) -> String {
        let mut out = String::new();
        self.write_display(id, interner, &mut out);
        out
    }

    fn write_display(&self, id: TypeId, interner: &StringInterner, out: &mut String) {
        let join = |pool: &TypePool, ids: &[TypeId], interner: &StringInterner, out: &mut String| {
            for (i, &child) in ids.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                pool.write_display(child, interner, out);
            }
        };
        match self.data(id) {
            TypeData::Prim(kind) => out.push_str(kind.name()),
            TypeData::Error => out.push_str("{error}"),
            TypeData::Var(var) => {
                out.push('?');
                out.push_str(&var.0.to_string());
            }
            TypeData::Generic(name) => out.push_str(&interner.lookup(*name)),
            TypeData::Named { name, args, .. } => {
                out.push_str(&interner.lookup(*name));
                if !args.is_empty() {
                    out.push('[');
                    join(self, args, interner, out);
                    out.push(']');
                }
            }
            TypeData::Ref { is_mut, inner } => {
                out.push_str(if *is_mut { "mut ref " } else { "ref " });
                self.write_display(*inner, interner, out);
            }
            TypeData::Ptr { is_mut, inner } => {
                out.push_str(if *is_mut { "*mut " } else { "*" });
                self.write_display(*inner, interner, out);
            }
            TypeData::Array { element, size } => {
                out.push('[');
                self.write_display(*element, interner, out);
                out.push_str("; ");
                match size {
                    ArraySize::Fixed(n) => out.push_str(&n.to_string()),
                    ArraySize::Param(name) => out.push_str(&interner.lookup(*name)),
                }
                out.push(']');
            }
            TypeData::ConstValue(value) => out.push_str(&value.to_string()),
            TypeData::Slice(element) => {
                out.push('[');
                self.write_display(*element, interner, out);
                out.push(']');
            }
            TypeData::Tuple(elements) => {
                out.push('(');
                join(self, elements, interner, out);
                out.push(')');
            }
            TypeData::Func {
                params,
                ret,
                is_async,
            } => {
                if *is_async {
                    out.push_str("async ");
                }
                out.push_str("func(");
                join(self, params, interner, out);
                out.push_str(") -> ");
                self.write_display(*ret, interner, out);
            }
            TypeData::Closure { params, ret, .. } => {
                out.push_str("do(");
                join(self, params, interner, out);
                out.push_str(") -> ");
                self.write_display(*ret, interner, out);
            }
            TypeData::DynBehavior {
                behavior,
                args,
                is_mut,
            } => {
                if *is_mut {
                    out.push_str("mut ");
                }
                out.push_str("dyn ");
                out.push_str(&interner.lookup(*behavior));
                if !args.is_empty() {
                    out.push('[');
                    join(self, args, interner, out);
                    out.push(']');
                }
            }
        }
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_preinterned() {
        let pool = TypePool::new();
        assert_eq!(pool.data(TypeId::I32), &TypeData::Prim(PrimKind::I32));
        assert_eq!(pool.data(TypeId::STR), &TypeData::Prim(PrimKind::Str));
        assert!(pool.data(TypeId::ERROR).is_error());
    }

    #[test]
    fn interning_dedups() {
        let mut pool = TypePool::new();
        let a = pool.reference(false, TypeId::I32);
        let b = pool.reference(false, TypeId::I32);
        let c = pool.reference(true, TypeId::I32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn flags_propagate() {
        let mut pool = TypePool::new();
        let var = pool.fresh_var();
        let tup = pool.tuple(&[TypeId::I32, var]);
        assert!(pool.flags(tup).has_var());
        assert!(!pool.flags(TypeId::I32).has_var());
    }

    #[test]
    fn shallow_resolve_compresses() {
        let mut pool = TypePool::new();
        let v1 = pool.fresh_var();
        let v2 = pool.fresh_var();
        let (TypeData::Var(var1), TypeData::Var(var2)) =
            (pool.data(v1).clone(), pool.data(v2).clone())
        else {
            panic!("expected vars");
        };
        pool.link_var(var1, v2);
        pool.link_var(var2, TypeId::BOOL);
        assert_eq!(pool.resolve_shallow(v1), TypeId::BOOL);
        // Compressed: v1 now links directly to BOOL.
        match pool.var_state(var1) {
            VarState::Link(target) => assert_eq!(*target, TypeId::BOOL),
            VarState::Unbound => panic!("expected link"),
        }
    }

    #[test]
    fn deep_resolve_rebuilds() {
        let mut pool = TypePool::new();
        let var = pool.fresh_var();
        let list = pool.tuple(&[var]);
        let TypeData::Var(v) = pool.data(var).clone() else {
            panic!("expected var");
        };
        pool.link_var(v, TypeId::I64);
        let resolved = pool.resolve(list);
        let expected = pool.tuple(&[TypeId::I64]);
        assert_eq!(resolved, expected);
    }

    #[test]
    fn occurs_detects_self_reference() {
        let mut pool = TypePool::new();
        let var = pool.fresh_var();
        let TypeData::Var(v) = pool.data(var).clone() else {
            panic!("expected var");
        };
        let tup = pool.tuple(&[var, TypeId::I32]);
        assert!(pool.occurs(v, tup));
        assert!(!pool.occurs(v, TypeId::I32));
    }
}
