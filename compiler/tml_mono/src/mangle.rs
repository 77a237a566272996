//! Name mangling for monomorphized instances.
//!
//! The mangling is unambiguous for every type expressible in the
//! surface language: primitives by their name, instantiated types as
//! `Base__Arg1__Arg2`, references as `ref_T`/`mutref_T`, arrays as
//! `arr_T_N`, and so on. Every instance's mangled name is its
//! cache key, so two structurally identical instantiations collide
//! into one definition.

use tml_ir::StringInterner;
use tml_types::{ArraySize, TypeData, TypeId, TypePool};

/// Mangle one type.
pub fn mangle_type(pool: &TypePool, interner: &StringInterner, ty: TypeId) -> String {
    match pool.data(ty) {
        TypeData::Prim(kind) => kind.name().to_string(),
        TypeData::Named { name, args, .. } => {
            let base = interner.lookup(*name).to_string();
            if args.is_empty() {
                base
            } else {
                let mut out = base;
                for &arg in args.iter() {
                    out.push_str("__");
                    out.push_str(&mangle_type(pool, interner, arg));
                }
                out
            }
        }
        TypeData::Generic(name) => interner.lookup(*name).to_string(),
        TypeData::Ref { is_mut, inner } => {
            let prefix = if *is_mut { "mutref_" } else { "ref_" };
            format!("{prefix}{}", mangle_type(pool, interner, *inner))
        }
        TypeData::Ptr { is_mut, inner } => {
            let prefix = if *is_mut { "mutptr_" } else { "ptr_" };
            format!("{prefix}{}", mangle_type(pool, interner, *inner))
        }
        TypeData::Array { element, size } => {
            let size = match size {
                ArraySize::Fixed(n) => n.to_string(),
                ArraySize::Param(name) => interner.lookup(*name).to_string(),
            };
            format!("arr_{}_{size}", mangle_type(pool, interner, *element))
        }
        TypeData::Slice(element) => {
            format!("slice_{}", mangle_type(pool, interner, *element))
        }
        TypeData::Tuple(elements) => {
            let mut out = format!("tup{}", elements.len());
            for &elem in elements.iter() {
                out.push('_');
                out.push_str(&mangle_type(pool, interner, elem));
            }
            out
        }
        TypeData::Func { params, ret, .. } => {
            let mut out = String::from("fn");
            for &param in params.iter() {
                out.push('_');
                out.push_str(&mangle_type(pool, interner, param));
            }
            out.push_str("_ret_");
            out.push_str(&mangle_type(pool, interner, *ret));
            out
        }
        TypeData::Closure { params, ret, .. } => {
            let mut out = String::from("closure");
            for &param in params.iter() {
                out.push('_');
                out.push_str(&mangle_type(pool, interner, param));
            }
            out.push_str("_ret_");
            out.push_str(&mangle_type(pool, interner, *ret));
            out
        }
        TypeData::DynBehavior { behavior, args, .. } => {
            let mut out = format!("dyn_{}", interner.lookup(*behavior));
            for &arg in args.iter() {
                out.push_str("__");
                out.push_str(&mangle_type(pool, interner, arg));
            }
            out
        }
        TypeData::ConstValue(value) => value.to_string(),
        TypeData::Var(var) => format!("var{}", var.0),
        TypeData::Error => "err".to_string(),
    }
}

/// `Base__Arg1__Arg2`, or just `Base` for empty argument lists.
pub fn mangle_struct_name(
    pool: &TypePool,
    interner: &StringInterner,
    base: &str,
    args: &[TypeId],
) -> String {
    let mut out = base.to_string();
    for &arg in args {
        out.push_str("__");
        out.push_str(&mangle_type(pool, interner, arg));
    }
    out
}

/// Function instances mangle the same way as structs: the base name
/// followed by each type argument in declaration order.
pub fn mangle_func_name(
    pool: &TypePool,
    interner: &StringInterner,
    base: &str,
    args: &[TypeId],
) -> String {
    mangle_struct_name(pool, interner, base, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tml_ir::SharedInterner;

    #[test]
    fn primitives_mangle_to_their_names() {
        let pool = TypePool::new();
        let interner = SharedInterner::new();
        assert_eq!(mangle_type(&pool, &interner, TypeId::I32), "I32");
        assert_eq!(mangle_type(&pool, &interner, TypeId::STR), "Str");
    }

    #[test]
    fn named_types_join_args_with_double_underscore() {
        let mut pool = TypePool::new();
        let interner = SharedInterner::new();
        let list = interner.intern("List");
        let list_i64 = pool.named(list, &[TypeId::I64]);
        assert_eq!(mangle_type(&pool, &interner, list_i64), "List__I64");

        let map = interner.intern("HashMap");
        let map_ty = pool.named(map, &[TypeId::STR, list_i64]);
        assert_eq!(
            mangle_type(&pool, &interner, map_ty),
            "HashMap__Str__List__I64"
        );
    }

    #[test]
    fn references_arrays_and_tuples() {
        let mut pool = TypePool::new();
        let interner = SharedInterner::new();
        let shared = pool.reference(false, TypeId::I32);
        let exclusive = pool.reference(true, TypeId::I32);
        assert_eq!(mangle_type(&pool, &interner, shared), "ref_I32");
        assert_eq!(mangle_type(&pool, &interner, exclusive), "mutref_I32");

        let arr = pool.array(TypeId::U8, ArraySize::Fixed(16));
        assert_eq!(mangle_type(&pool, &interner, arr), "arr_U8_16");

        let tup = pool.tuple(&[TypeId::I32, TypeId::BOOL]);
        assert_eq!(mangle_type(&pool, &interner, tup), "tup2_I32_Bool");
    }

    #[test]
    fn func_name_mangling() {
        let pool = TypePool::new();
        let interner = SharedInterner::new();
        assert_eq!(
            mangle_func_name(&pool, &interner, "id", &[TypeId::I32]),
            "id__I32"
        );
        assert_eq!(
            mangle_func_name(&pool, &interner, "id", &[TypeId::STR]),
            "id__Str"
        );
    }

    #[test]
    fn distinct_types_never_collide() {
        let mut pool = TypePool::new();
        let interner = SharedInterner::new();
        let list = interner.intern("List");
        let a = pool.named(list, &[TypeId::I32]);
        let shared = pool.reference(false, TypeId::I32);
        let b = pool.named(list, &[shared]);
        assert_ne!(
            mangle_type(&pool, &interner, a),
            mangle_type(&pool, &interner, b)
        );
    }
}
