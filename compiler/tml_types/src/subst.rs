//! Generic parameter substitution.
//!
//! The homomorphic walk that replaces `Generic` parameters (and bare
//! `Named` references to a parameter, which the parser cannot tell apart
//! from type names) using a substitution map.

use rustc_hash::FxHashMap;
use tml_ir::Name;

use crate::{ArraySize, Capture, TypeData, TypeId, TypePool};

/// Substitution map from generic parameter name to concrete type.
pub type Subst = FxHashMap<Name, TypeId>;

impl TypePool {
    /// Apply `subst` to `ty`, interning the rebuilt type.
    ///
    /// Skips the walk when the flags say no generic occurs.
    pub fn substitute(&mut self, ty: TypeId, subst: &Subst) -> TypeId {
        if subst.is_empty() || !self.flags(ty).has_generic() {
            return ty;
        }
        match self.data(ty).clone() {
            TypeData::Generic(name) => subst.get(&name).copied().unwrap_or(ty),
            TypeData::Named {
                name,
                module_path,
                args,
            } => {
                // `Point[T]` written inside a generic declaration parses
                // as Named with a Generic argument; a bare parameter may
                // also arrive as Named with no args.
                if args.is_empty() && module_path.is_empty() {
                    if let Some(&replacement) = subst.get(&name) {
                        return replacement;
                    }
                }
                let args: Vec<TypeId> =
                    args.iter().map(|&a| self.substitute(a, subst)).collect();
                self.named_in(name, module_path, &args)
            }
            TypeData::Ref { is_mut, inner } => {
                let inner = self.substitute(inner, subst);
                self.reference(is_mut, inner)
            }
            TypeData::Ptr { is_mut, inner } => {
                let inner = self.substitute(inner, subst);
                self.pointer(is_mut, inner)
            }
            TypeData::Array { element, size } => {
                let element = self.substitute(element, subst);
                let size = match size {
                    ArraySize::Param(name) => match subst.get(&name).copied() {
                        Some(bound) => match *self.data(bound) {
                            TypeData::ConstValue(value) => ArraySize::Fixed(value),
                            _ => size,
                        },
                        None => size,
                    },
                    ArraySize::Fixed(_) => size,
                };
                self.array(element, size)
            }
            TypeData::Slice(element) => {
                let element = self.substitute(element, subst);
                self.slice(element)
            }
            TypeData::Tuple(elements) => {
                let elements: Vec<TypeId> = elements
                    .iter()
                    .map(|&e| self.substitute(e, subst))
                    .collect();
                self.tuple(&elements)
            }
            TypeData::Func {
                params,
                ret,
                is_async,
            } => {
                let params: Vec<TypeId> =
                    params.iter().map(|&p| self.substitute(p, subst)).collect();
                let ret = self.substitute(ret, subst);
                self.func(&params, ret, is_async)
            }
            TypeData::Closure {
                params,
                ret,
                captures,
            } => {
                let params: Vec<TypeId> =
                    params.iter().map(|&p| self.substitute(p, subst)).collect();
                let ret = self.substitute(ret, subst);
                let captures: Vec<Capture> = captures
                    .iter()
                    .map(|c| Capture {
                        name: c.name,
                        ty: self.substitute(c.ty, subst),
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
                let args: Vec<TypeId> =
                    args.iter().map(|&a| self.substitute(a, subst)).collect();
                self.dyn_behavior(behavior, &args, is_mut)
            }
            TypeData::Prim(_) | TypeData::Var(_) | TypeData::ConstValue(_) | TypeData::Error => {
                ty
            }
        }
    }

    /// Build a substitution by structurally matching a parameter type
    /// pattern against a concrete argument type, binding every generic
    /// parameter encountered. Returns false on shape mismatch.
    ///
    /// This is the one-directional "unification" used for generic call
    /// inference: the pattern side may contain `Generic`, the
    /// argument side is what the caller supplied.
    pub fn match_generic(&mut self, pattern: TypeId, arg: TypeId, subst: &mut Subst) -> bool {
        let pattern = self.resolve_shallow(pattern);
        let arg = self.resolve(arg);
        if pattern == arg {
            return true;
        }
        match (self.data(pattern).clone(), self.data(arg).clone()) {
            (TypeData::Generic(name), _) => match subst.get(&name) {
                // First binding wins; later occurrences must agree.
                Some(&bound) => bound == arg || self.unify(bound, arg).is_ok(),
                None => {
                    subst.insert(name, arg);
                    true
                }
            },
            (TypeData::Named { name, args, module_path }, _)
                if args.is_empty() && module_path.is_empty() && !subst.contains_key(&name) =>
            {
                // Bare named pattern: either a real type (must be equal,
                // handled above) or an undeclared parameter spelling.
                match self.data(arg) {
                    TypeData::Named { name: an, .. } if *an == name => true,
                    _ => false,
                }
            }
            (
                TypeData::Named {
                    name: pn,
                    args: pa,
                    ..
                },
                TypeData::Named {
                    name: an,
                    args: aa,
                    ..
                },
            ) => {
                pn == an
                    && pa.len() == aa.len()
                    && pa
                        .iter()
                        .zip(aa.iter())
                        .all(|(&p, &a)| self.match_generic(p, a, subst))
            }
            (
                TypeData::Ref {
                    is_mut: pm,
                    inner: pi,
                },
                TypeData::Ref {
                    is_mut: am,
                    inner: ai,
                },
            ) => (pm == am || am) && self.match_generic(pi, ai, subst),
            (
                TypeData::Ptr {
                    is_mut: pm,
                    inner: pi,
                },
                TypeData::Ptr {
                    is_mut: am,
                    inner: ai,
                },
            ) => pm == am && self.match_generic(pi, ai, subst),
            (
                TypeData::Array {
                    element: pe,
                    size: ps,
                },
                TypeData::Array {
                    element: ae,
                    size: asz,
                },
            ) => {
                let sizes_ok = match (ps, asz) {
                    (ArraySize::Param(name), ArraySize::Fixed(value)) => {
                        let bound = self.const_value(value);
                        match subst.get(&name) {
                            Some(&prev) => prev == bound,
                            None => {
                                subst.insert(name, bound);
                                true
                            }
                        }
                    }
                    (p, a) => p == a,
                };
                sizes_ok && self.match_generic(pe, ae, subst)
            }
            (TypeData::Slice(pe), TypeData::Slice(ae)) => self.match_generic(pe, ae, subst),
            (TypeData::Tuple(pe), TypeData::Tuple(ae)) => {
                pe.len() == ae.len()
                    && pe
                        .iter()
                        .zip(ae.iter())
                        .all(|(&p, &a)| self.match_generic(p, a, subst))
            }
            (
                TypeData::Func {
                    params: pp,
                    ret: pr,
                    ..
                },
                TypeData::Func {
                    params: ap,
                    ret: ar,
                    ..
                },
            )
            | (
                TypeData::Func {
                    params: pp,
                    ret: pr,
                    ..
                },
                TypeData::Closure {
                    params: ap,
                    ret: ar,
                    ..
                },
            ) => {
                pp.len() == ap.len()
                    && pp
                        .iter()
                        .zip(ap.iter())
                        .all(|(&p, &a)| self.match_generic(p, a, subst))
                    && self.match_generic(pr, ar, subst)
            }
            (TypeData::Var(_), _) | (_, TypeData::Var(_)) => self.unify(pattern, arg).is_ok(),
            (TypeData::Error, _) | (_, TypeData::Error) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tml_ir::SharedInterner;

    #[test]
    fn substitute_replaces_generic() {
        let interner = SharedInterner::new();
        let mut pool = TypePool::new();
        let t = interner.intern("T");
        let generic = pool.generic(t);
        let list = interner.intern("List");
        let list_t = pool.named(list, &[generic]);

        let mut subst = Subst::default();
        subst.insert(t, TypeId::I32);
        let result = pool.substitute(list_t, &subst);
        let expected = pool.named(list, &[TypeId::I32]);
        assert_eq!(result, expected);
    }

    #[test]
    fn substitute_is_identity_without_generics() {
        let mut pool = TypePool::new();
        let tup = pool.tuple(&[TypeId::I32, TypeId::STR]);
        let mut subst = Subst::default();
        subst.insert(tml_ir::Name::from_raw(7), TypeId::BOOL);
        assert_eq!(pool.substitute(tup, &subst), tup);
    }

    #[test]
    fn match_generic_binds_parameters() {
        let interner = SharedInterner::new();
        let mut pool = TypePool::new();
        let t = interner.intern("T");
        let generic = pool.generic(t);
        let pattern = pool.reference(false, generic);
        let arg = pool.reference(false, TypeId::STR);

        let mut subst = Subst::default();
        assert!(pool.match_generic(pattern, arg, &mut subst));
        assert_eq!(subst.get(&t), Some(&TypeId::STR));
    }

    #[test]
    fn match_generic_rejects_conflicting_bindings() {
        let interner = SharedInterner::new();
        let mut pool = TypePool::new();
        let t = interner.intern("T");
        let generic = pool.generic(t);
        let pattern = pool.tuple(&[generic, generic]);
        let arg = pool.tuple(&[TypeId::I32, TypeId::STR]);

        let mut subst = Subst::default();
        assert!(!pool.match_generic(pattern, arg, &mut subst));
    }
}
