//! Builtin types, behaviors and function families.
//!
//! Registered once at environment construction: primitive type names,
//! the `Copy`/`Drop` marker behaviors, and the lowlevel function
//! families (I/O, string, time, memory, atomics, sync, math,
//! collections, async). The same tables back the native `std::*`
//! modules served by [`native_module`].

use tml_ir::Name;

use crate::{BehaviorDef, FuncSig, ModuleDef, PrimKind, StructDef, TypeEnv, TypeId};

fn def(env: &mut TypeEnv, sig: FuncSig) {
    // Builtin tables are registered before any user code; conflicts
    // here are a compiler bug, not a user error.
    let result = env.define_func(sig);
    debug_assert!(result.is_ok());
}

fn lowlevel(env: &TypeEnv, name: &str, params: &[TypeId], ret: TypeId) -> FuncSig {
    let name = env.interner().intern(name);
    let mut sig = FuncSig::new(name, params.to_vec(), ret);
    sig.is_lowlevel = true;
    sig
}

pub(crate) fn install(env: &mut TypeEnv) {
    install_types(env);
    install_io(env);
    install_string(env);
    install_time(env);
    install_mem(env);
    install_atomic(env);
    install_sync(env);
    install_math(env);
    install_collections(env);
    install_async(env);
}

fn install_types(env: &mut TypeEnv) {
    for kind in PrimKind::ALL {
        let name = env.interner().intern(kind.name());
        env.register_builtin_type(name, TypeId::of_prim(kind));
    }

    // Marker behaviors the checker's predicates consult.
    let copy = env.well_known().copy_behavior;
    let _ = env.define_behavior(BehaviorDef {
        name: copy,
        type_params: Vec::new(),
        const_params: Vec::new(),
        associated_types: Vec::new(),
        methods: Vec::new(),
        super_behaviors: Vec::new(),
        methods_with_defaults: Vec::new(),
        span: tml_ir::Span::DUMMY,
    });

    let drop_name = env.well_known().drop_behavior;
    let this = env.well_known().this_type;
    let this_ty = env.pool_mut().generic(this);
    let recv = env.pool_mut().reference(true, this_ty);
    let drop_method = {
        let name = env.interner().intern("drop");
        FuncSig::new(name, vec![recv], TypeId::UNIT)
    };
    let _ = env.define_behavior(BehaviorDef {
        name: drop_name,
        type_params: Vec::new(),
        const_params: Vec::new(),
        associated_types: Vec::new(),
        methods: vec![drop_method],
        super_behaviors: Vec::new(),
        methods_with_defaults: Vec::new(),
        span: tml_ir::Span::DUMMY,
    });
}

fn io_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    let byte_ptr = env.pool_mut().pointer(false, TypeId::U8);
    vec![
        lowlevel(env, "print", &[], TypeId::UNIT),
        lowlevel(env, "println", &[], TypeId::UNIT),
        lowlevel(env, "eprint", &[], TypeId::UNIT),
        lowlevel(env, "eprintln", &[], TypeId::UNIT),
        lowlevel(env, "read_line", &[], TypeId::STR),
        lowlevel(env, "file_open", &[TypeId::STR, TypeId::STR], TypeId::I64),
        lowlevel(env, "file_read", &[TypeId::I64, TypeId::I64], TypeId::STR),
        lowlevel(env, "file_write", &[TypeId::I64, TypeId::STR], TypeId::I64),
        lowlevel(env, "file_read_raw", &[TypeId::I64, byte_ptr, TypeId::I64], TypeId::I64),
        lowlevel(env, "file_close", &[TypeId::I64], TypeId::UNIT),
    ]
}

fn install_io(env: &mut TypeEnv) {
    for name in ["print", "println", "eprint", "eprintln"] {
        let name = env.interner().intern(name);
        env.register_variadic_builtin(name);
    }
    for sig in io_sigs(env) {
        def(env, sig);
    }
}

fn string_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    vec![
        lowlevel(env, "str_len", &[TypeId::STR], TypeId::I64),
        lowlevel(env, "str_concat", &[TypeId::STR, TypeId::STR], TypeId::STR),
        lowlevel(env, "str_sub", &[TypeId::STR, TypeId::I64, TypeId::I64], TypeId::STR),
        lowlevel(env, "str_contains", &[TypeId::STR, TypeId::STR], TypeId::BOOL),
        lowlevel(env, "str_eq", &[TypeId::STR, TypeId::STR], TypeId::BOOL),
        lowlevel(env, "str_char_at", &[TypeId::STR, TypeId::I64], TypeId::CHAR),
        lowlevel(env, "str_from_int", &[TypeId::I64], TypeId::STR),
        lowlevel(env, "str_from_float", &[TypeId::F64], TypeId::STR),
        lowlevel(env, "str_parse_int", &[TypeId::STR], TypeId::I64),
        lowlevel(env, "str_parse_float", &[TypeId::STR], TypeId::F64),
    ]
}

fn install_string(env: &mut TypeEnv) {
    for sig in string_sigs(env) {
        def(env, sig);
    }
}

fn time_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    vec![
        lowlevel(env, "time_now_millis", &[], TypeId::I64),
        lowlevel(env, "time_now_nanos", &[], TypeId::I64),
        lowlevel(env, "sleep_millis", &[TypeId::I64], TypeId::UNIT),
    ]
}

fn install_time(env: &mut TypeEnv) {
    for sig in time_sigs(env) {
        def(env, sig);
    }
}

fn mem_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    let byte_ptr = env.pool_mut().pointer(true, TypeId::U8);
    vec![
        lowlevel(env, "mem_alloc", &[TypeId::I64], byte_ptr),
        lowlevel(env, "mem_free", &[byte_ptr], TypeId::UNIT),
        lowlevel(env, "mem_copy", &[byte_ptr, byte_ptr, TypeId::I64], TypeId::UNIT),
        lowlevel(env, "mem_set", &[byte_ptr, TypeId::U8, TypeId::I64], TypeId::UNIT),
    ]
}

fn install_mem(env: &mut TypeEnv) {
    for sig in mem_sigs(env) {
        def(env, sig);
    }
}

fn atomic_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    let word_ptr = env.pool_mut().pointer(true, TypeId::I64);
    vec![
        lowlevel(env, "atomic_load", &[word_ptr], TypeId::I64),
        lowlevel(env, "atomic_store", &[word_ptr, TypeId::I64], TypeId::UNIT),
        lowlevel(env, "atomic_add", &[word_ptr, TypeId::I64], TypeId::I64),
        lowlevel(env, "atomic_cas", &[word_ptr, TypeId::I64, TypeId::I64], TypeId::BOOL),
    ]
}

fn install_atomic(env: &mut TypeEnv) {
    for sig in atomic_sigs(env) {
        def(env, sig);
    }
}

fn sync_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    vec![
        lowlevel(env, "sync_mutex_new", &[], TypeId::I64),
        lowlevel(env, "sync_mutex_lock", &[TypeId::I64], TypeId::UNIT),
        lowlevel(env, "sync_mutex_unlock", &[TypeId::I64], TypeId::UNIT),
        lowlevel(env, "sync_cond_new", &[], TypeId::I64),
        lowlevel(env, "sync_cond_wait", &[TypeId::I64, TypeId::I64], TypeId::UNIT),
        lowlevel(env, "sync_cond_signal", &[TypeId::I64], TypeId::UNIT),
    ]
}

fn install_sync(env: &mut TypeEnv) {
    for sig in sync_sigs(env) {
        def(env, sig);
    }
    // Mutex[T] is the canonical single-handle wrapper type; the
    // monomorphizer reuses its layout for deferred placeholders.
    register_handle_struct(env, "Mutex", &["T"]);
}

fn math_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    let unary_f64 = [
        "sin", "cos", "tan", "sqrt", "abs", "floor", "ceil", "round", "ln", "log10", "exp",
    ];
    let mut sigs: Vec<FuncSig> = unary_f64
        .iter()
        .map(|name| lowlevel(env, name, &[TypeId::F64], TypeId::F64))
        .collect();
    sigs.push(lowlevel(env, "pow", &[TypeId::F64, TypeId::F64], TypeId::F64));
    // min/max carry both integer and float overloads.
    sigs.push(lowlevel(env, "min", &[TypeId::I64, TypeId::I64], TypeId::I64));
    sigs.push(lowlevel(env, "min", &[TypeId::F64, TypeId::F64], TypeId::F64));
    sigs.push(lowlevel(env, "max", &[TypeId::I64, TypeId::I64], TypeId::I64));
    sigs.push(lowlevel(env, "max", &[TypeId::F64, TypeId::F64], TypeId::F64));
    sigs.push(lowlevel(
        env,
        "clamp",
        &[TypeId::I64, TypeId::I64, TypeId::I64],
        TypeId::I64,
    ));
    sigs
}

fn install_math(env: &mut TypeEnv) {
    for sig in math_sigs(env) {
        def(env, sig);
    }
}

/// Register a runtime-backed `{ handle: *U8 }` wrapper type.
fn register_handle_struct(env: &mut TypeEnv, name: &str, type_params: &[&str]) {
    let name = env.interner().intern(name);
    let params: Vec<Name> = type_params
        .iter()
        .map(|p| env.interner().intern(p))
        .collect();
    let handle = env.interner().intern("handle");
    let byte_ptr = env.pool_mut().pointer(false, TypeId::U8);
    env.register_runtime_collection(name);
    let _ = env.define_struct(StructDef {
        name,
        type_params: params,
        const_params: Vec::new(),
        fields: vec![(handle, byte_ptr)],
        span: tml_ir::Span::DUMMY,
    });
}

fn collection_method(
    env: &mut TypeEnv,
    type_name: &str,
    method: &str,
    type_params: &[&str],
    params: &[TypeId],
    ret: TypeId,
) -> FuncSig {
    let base = env.interner().intern(type_name);
    let method = env.interner().intern(method);
    let qualified = env.qualify(base, method);
    let mut sig = FuncSig::new(qualified, params.to_vec(), ret);
    sig.type_params = type_params
        .iter()
        .map(|p| env.interner().intern(p))
        .collect();
    sig.is_lowlevel = true;
    sig
}

fn install_collections(env: &mut TypeEnv) {
    for name in ["List", "Vec", "HashSet", "Buffer"] {
        register_handle_struct(env, name, &["T"]);
    }
    register_handle_struct(env, "HashMap", &["K", "V"]);

    let t_name = env.interner().intern("T");
    let t = env.pool_mut().generic(t_name);
    let k_name = env.interner().intern("K");
    let k = env.pool_mut().generic(k_name);
    let v_name = env.interner().intern("V");
    let v = env.pool_mut().generic(v_name);

    for coll in ["List", "Vec"] {
        let base = env.interner().intern(coll);
        let coll_ty = env.pool_mut().named(base, &[t]);
        let ref_coll = env.pool_mut().reference(false, coll_ty);
        let mutref_coll = env.pool_mut().reference(true, coll_ty);
        let sigs = vec![
            collection_method(env, coll, "new", &["T"], &[], coll_ty),
            collection_method(env, coll, "push", &["T"], &[mutref_coll, t], TypeId::UNIT),
            collection_method(env, coll, "pop", &["T"], &[mutref_coll], t),
            collection_method(env, coll, "len", &["T"], &[ref_coll], TypeId::I64),
            collection_method(env, coll, "get", &["T"], &[ref_coll, TypeId::I64], t),
            collection_method(env, coll, "set", &["T"], &[mutref_coll, TypeId::I64, t], TypeId::UNIT),
            collection_method(env, coll, "clear", &["T"], &[mutref_coll], TypeId::UNIT),
        ];
        for sig in sigs {
            def(env, sig);
        }
    }

    let map_base = env.interner().intern("HashMap");
    let map_ty = env.pool_mut().named(map_base, &[k, v]);
    let ref_map = env.pool_mut().reference(false, map_ty);
    let mutref_map = env.pool_mut().reference(true, map_ty);
    let map_sigs = vec![
        collection_method(env, "HashMap", "new", &["K", "V"], &[], map_ty),
        collection_method(env, "HashMap", "insert", &["K", "V"], &[mutref_map, k, v], TypeId::UNIT),
        collection_method(env, "HashMap", "get", &["K", "V"], &[ref_map, k], v),
        collection_method(env, "HashMap", "contains", &["K", "V"], &[ref_map, k], TypeId::BOOL),
        collection_method(env, "HashMap", "remove", &["K", "V"], &[mutref_map, k], TypeId::BOOL),
        collection_method(env, "HashMap", "len", &["K", "V"], &[ref_map], TypeId::I64),
    ];
    for sig in map_sigs {
        def(env, sig);
    }

    let set_base = env.interner().intern("HashSet");
    let set_ty = env.pool_mut().named(set_base, &[t]);
    let ref_set = env.pool_mut().reference(false, set_ty);
    let mutref_set = env.pool_mut().reference(true, set_ty);
    let set_sigs = vec![
        collection_method(env, "HashSet", "new", &["T"], &[], set_ty),
        collection_method(env, "HashSet", "insert", &["T"], &[mutref_set, t], TypeId::BOOL),
        collection_method(env, "HashSet", "contains", &["T"], &[ref_set, t], TypeId::BOOL),
        collection_method(env, "HashSet", "len", &["T"], &[ref_set], TypeId::I64),
    ];
    for sig in set_sigs {
        def(env, sig);
    }

    // Range is a plain value type (produced by `a..b` expressions),
    // not a runtime-backed handle.
    let range_name = env.interner().intern("Range");
    let start = env.interner().intern("start");
    let end = env.interner().intern("end");
    let inclusive = env.interner().intern("inclusive");
    let _ = env.define_struct(StructDef {
        name: range_name,
        type_params: vec![t_name],
        const_params: Vec::new(),
        fields: vec![(start, t), (end, t), (inclusive, TypeId::BOOL)],
        span: tml_ir::Span::DUMMY,
    });

    let mutex_base = env.interner().intern("Mutex");
    let mutex_ty = env.pool_mut().named(mutex_base, &[t]);
    let ref_mutex = env.pool_mut().reference(false, mutex_ty);
    let mutex_sigs = vec![
        collection_method(env, "Mutex", "new", &["T"], &[t], mutex_ty),
        collection_method(env, "Mutex", "lock", &["T"], &[ref_mutex], t),
        collection_method(env, "Mutex", "unlock", &["T"], &[ref_mutex], TypeId::UNIT),
    ];
    for sig in mutex_sigs {
        def(env, sig);
    }
}

fn async_sigs(env: &mut TypeEnv) -> Vec<FuncSig> {
    let task_fn = env.pool_mut().func(&[], TypeId::UNIT, false);
    vec![
        lowlevel(env, "async_spawn", &[task_fn], TypeId::I64),
        lowlevel(env, "async_join", &[TypeId::I64], TypeId::UNIT),
        lowlevel(env, "async_yield", &[], TypeId::UNIT),
    ]
}

fn install_async(env: &mut TypeEnv) {
    for sig in async_sigs(env) {
        def(env, sig);
    }
}

/// Build the table for a native `std::*` module, or `None` if `path`
/// names no native module.
pub(crate) fn native_module(env: &mut TypeEnv, path: Name) -> Option<ModuleDef> {
    let path_str = env.interner().lookup(path);
    let sigs = match &*path_str {
        "std::io" => io_sigs(env),
        "std::string" => string_sigs(env),
        "std::time" => time_sigs(env),
        "std::mem" => mem_sigs(env),
        "std::atomic" => atomic_sigs(env),
        "std::sync" => sync_sigs(env),
        "std::math" => math_sigs(env),
        "std::async" => async_sigs(env),
        _ => return None,
    };
    let mut module = ModuleDef::new(path);
    for sig in sigs {
        module.functions.entry(sig.name).or_default().push(sig);
    }
    Some(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tml_ir::SharedInterner;

    #[test]
    fn builtin_families_registered() {
        let env = TypeEnv::new(SharedInterner::new());
        for name in ["println", "str_len", "mem_alloc", "sin", "List::push"] {
            let name = env.interner().intern(name);
            assert!(env.lookup_func(name).is_some(), "missing builtin");
        }
    }

    #[test]
    fn primitive_type_names_resolve() {
        let env = TypeEnv::new(SharedInterner::new());
        let i32_name = env.interner().intern("I32");
        assert_eq!(env.builtin_type(i32_name), Some(TypeId::I32));
    }

    #[test]
    fn collections_are_runtime_backed() {
        let env = TypeEnv::new(SharedInterner::new());
        for name in ["List", "HashMap", "Mutex"] {
            let name = env.interner().intern(name);
            assert!(env.is_runtime_collection(name));
            assert!(env.lookup_struct(name).is_some());
        }
    }

    #[test]
    fn native_math_module_loads() {
        let mut env = TypeEnv::new(SharedInterner::new());
        let math = env.interner().intern("std::math");
        assert!(env.load_native_module(math));
        let sin = env.interner().intern("sin");
        assert!(env.get_module(math).is_some_and(|m| m.exports(sin)));
        let nowhere = env.interner().intern("std::nope");
        assert!(!env.load_native_module(nowhere));
    }
}
