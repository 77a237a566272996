//! The instantiation engine.
//!
//! A worklist with memoization: codegen requests instances as it
//! discovers references to them, the engine drains the queues to
//! fixpoint before emission ends. Every instance is keyed by its
//! mangled name and generated at most once.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tml_diagnostic::{Diagnostic, ErrorCode};
use tml_ir::{CancelToken, Cancelled, Name};
use tml_types::{Subst, TypeData, TypeEnv, TypeId};

use crate::mangle::{mangle_func_name, mangle_struct_name, mangle_type};

/// Limits for instantiation recursion.
#[derive(Copy, Clone, Debug)]
pub struct MonoLimits {
    /// Maximum instantiation nesting before a cycle is assumed.
    pub max_depth: usize,
}

impl Default for MonoLimits {
    fn default() -> Self {
        MonoLimits { max_depth: 64 }
    }
}

/// A specialized struct: concrete field layout under its mangled name.
#[derive(Clone, Debug)]
pub struct StructInstance {
    pub mangled: String,
    pub base: Name,
    pub args: Vec<TypeId>,
    pub fields: Vec<(Name, TypeId)>,
    /// Runtime-backed collection: layout is the one-pointer handle.
    pub is_handle: bool,
    /// Deferred: the arguments still contained unresolved generics, so
    /// the reserved one-pointer layout stands in. Reaching codegen in
    /// this state is a compiler bug.
    pub is_placeholder: bool,
}

/// A specialized enum with its payload layout.
#[derive(Clone, Debug)]
pub struct EnumInstance {
    pub mangled: String,
    pub base: Name,
    pub args: Vec<TypeId>,
    pub variants: Vec<(Name, Vec<TypeId>)>,
}

/// A specialized function: the base signature plus the bindings the
/// body is re-checked under at emission time.
#[derive(Clone, Debug)]
pub struct FuncInstance {
    pub mangled: String,
    pub base: Name,
    pub args: Vec<TypeId>,
    pub subst: Subst,
    pub params: Vec<TypeId>,
    pub ret: TypeId,
}

/// A pending impl-method instantiation request.
#[derive(Clone, Debug)]
pub struct ImplMethodRequest {
    pub mangled_type: String,
    pub base_type: Name,
    pub method: Name,
    pub subst: Subst,
    /// Overload suffix for behavior methods mangled by argument type.
    pub suffix: Option<String>,
    pub is_library: bool,
}

/// The monomorphization engine.
pub struct Monomorphizer<'env> {
    env: &'env mut TypeEnv,
    limits: MonoLimits,

    struct_instances: FxHashMap<String, StructInstance>,
    enum_instances: FxHashMap<String, EnumInstance>,
    func_instances: FxHashMap<String, FuncInstance>,
    /// Emission order: first-requested first, dependencies before
    /// dependents (requests recurse before caching the parent).
    struct_order: Vec<String>,
    enum_order: Vec<String>,
    func_order: Vec<String>,

    pending_impl_methods: VecDeque<ImplMethodRequest>,
    generated_impl_methods: FxHashSet<String>,
    /// Mangled names currently being instantiated (cycle safety).
    in_flight: FxHashSet<String>,

    errors: Vec<Diagnostic>,
}

impl<'env> Monomorphizer<'env> {
    pub fn new(env: &'env mut TypeEnv) -> Self {
        Monomorphizer::with_limits(env, MonoLimits::default())
    }

    pub fn with_limits(env: &'env mut TypeEnv, limits: MonoLimits) -> Self {
        Monomorphizer {
            env,
            limits,
            struct_instances: FxHashMap::default(),
            enum_instances: FxHashMap::default(),
            func_instances: FxHashMap::default(),
            struct_order: Vec::new(),
            enum_order: Vec::new(),
            func_order: Vec::new(),
            pending_impl_methods: VecDeque::new(),
            generated_impl_methods: FxHashSet::default(),
            in_flight: FxHashSet::default(),
            errors: Vec::new(),
        }
    }

    pub fn env(&self) -> &TypeEnv {
        self.env
    }

    pub fn env_mut(&mut self) -> &mut TypeEnv {
        self.env
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    // === Instance access (emission order) ===

    pub fn struct_instances(&self) -> impl Iterator<Item = &StructInstance> {
        self.struct_order
            .iter()
            .filter_map(|name| self.struct_instances.get(name))
    }

    pub fn enum_instances(&self) -> impl Iterator<Item = &EnumInstance> {
        self.enum_order
            .iter()
            .filter_map(|name| self.enum_instances.get(name))
    }

    pub fn func_instances(&self) -> impl Iterator<Item = &FuncInstance> {
        self.func_order
            .iter()
            .filter_map(|name| self.func_instances.get(name))
    }

    pub fn struct_instance(&self, mangled: &str) -> Option<&StructInstance> {
        self.struct_instances.get(mangled)
    }

    /// Placeholders that survived to the end of instantiation. Codegen
    /// reports each as an internal bug.
    pub fn placeholder_leaks(&self) -> Vec<&StructInstance> {
        self.struct_order
            .iter()
            .filter_map(|name| self.struct_instances.get(name))
            .filter(|inst| inst.is_placeholder)
            .collect()
    }

    // === Requests ===

    /// Request a struct specialization; returns the mangled name
    ///.
    pub fn require_struct_instantiation(&mut self, base: Name, args: &[TypeId]) -> String {
        self.require_struct_inner(base, args, 0)
    }

    fn require_struct_inner(&mut self, base: Name, args: &[TypeId], depth: usize) -> String {
        let args: Vec<TypeId> = args.iter().map(|&a| self.env.resolve(a)).collect();
        let base_str = self.env.interner().lookup(base).to_string();
        let interner = self.env.interner().clone();
        let mangled = mangle_struct_name(self.env.pool(), &interner, &base_str, &args);

        if self.struct_instances.contains_key(&mangled) || self.in_flight.contains(&mangled) {
            return mangled;
        }
        if depth > self.limits.max_depth {
            self.report_cycle(&mangled);
            return mangled;
        }
        self.in_flight.insert(mangled.clone());

        // 1. Arguments still generic: reserve the one-pointer layout
        //    and defer (safe when the type is only touched by pointer).
        let unresolved = args
            .iter()
            .any(|&a| self.env.pool().flags(a).has_generic() || self.env.pool().flags(a).has_var());
        // 2. Runtime-backed collections always take the handle layout.
        let is_handle = self.env.is_runtime_collection(base);

        let instance = if is_handle || unresolved {
            let handle = interner.intern("handle");
            let byte_ptr = self.env.pool_mut().pointer(false, TypeId::U8);
            StructInstance {
                mangled: mangled.clone(),
                base,
                args: args.clone(),
                fields: vec![(handle, byte_ptr)],
                is_handle,
                is_placeholder: unresolved && !is_handle,
            }
        } else if let Some(def) = self.env.lookup_struct(base).cloned() {
            // 3. A non-generic base under this name: alias to its layout.
            // 4. Otherwise substitute each field type.
            let mut subst = Subst::default();
            for (&param, &arg) in def.type_params.iter().zip(args.iter()) {
                subst.insert(param, arg);
            }
            let fields: Vec<(Name, TypeId)> = def
                .fields
                .iter()
                .map(|&(name, ty)| (name, self.env.substitute(ty, &subst)))
                .collect();
            let fields: Vec<(Name, TypeId)> = fields
                .into_iter()
                .map(|(name, ty)| (name, self.env.resolve(ty)))
                .collect();
            // 5. Recurse into nested generic instantiations.
            for &(_, field_ty) in &fields {
                self.require_nested(field_ty, depth + 1);
            }
            for &arg in &args {
                self.require_nested(arg, depth + 1);
            }
            StructInstance {
                mangled: mangled.clone(),
                base,
                args,
                fields,
                is_handle: false,
                is_placeholder: false,
            }
        } else {
            // Unknown base: checker already reported it; emit the
            // reserved layout so codegen can continue.
            let handle = interner.intern("handle");
            let byte_ptr = self.env.pool_mut().pointer(false, TypeId::U8);
            StructInstance {
                mangled: mangled.clone(),
                base,
                args,
                fields: vec![(handle, byte_ptr)],
                is_handle: false,
                is_placeholder: true,
            }
        };

        self.in_flight.remove(&mangled);
        self.struct_order.push(mangled.clone());
        self.struct_instances.insert(mangled.clone(), instance);
        tracing::trace!(instance = %mangled, "instantiated struct");
        mangled
    }

    /// Request an enum specialization (payload layout computed once per
    /// instance).
    pub fn require_enum_instantiation(&mut self, base: Name, args: &[TypeId]) -> String {
        self.require_enum_inner(base, args, 0)
    }

    fn require_enum_inner(&mut self, base: Name, args: &[TypeId], depth: usize) -> String {
        let args: Vec<TypeId> = args.iter().map(|&a| self.env.resolve(a)).collect();
        let base_str = self.env.interner().lookup(base).to_string();
        let interner = self.env.interner().clone();
        let mangled = mangle_struct_name(self.env.pool(), &interner, &base_str, &args);

        if self.enum_instances.contains_key(&mangled) || self.in_flight.contains(&mangled) {
            return mangled;
        }
        if depth > self.limits.max_depth {
            self.report_cycle(&mangled);
            return mangled;
        }
        let Some(def) = self.env.lookup_enum(base).cloned() else {
            return mangled;
        };
        self.in_flight.insert(mangled.clone());

        let mut subst = Subst::default();
        for (&param, &arg) in def.type_params.iter().zip(args.iter()) {
            subst.insert(param, arg);
        }
        let variants: Vec<(Name, Vec<TypeId>)> = def
            .variants
            .iter()
            .map(|(name, payload)| {
                let payload = payload
                    .iter()
                    .map(|&ty| {
                        let substituted = self.env.substitute(ty, &subst);
                        self.env.resolve(substituted)
                    })
                    .collect();
                (*name, payload)
            })
            .collect();
        for (_, payload) in &variants {
            for &ty in payload {
                self.require_nested(ty, depth + 1);
            }
        }

        self.in_flight.remove(&mangled);
        self.enum_order.push(mangled.clone());
        self.enum_instances.insert(
            mangled.clone(),
            EnumInstance {
                mangled: mangled.clone(),
                base,
                args,
                variants,
            },
        );
        tracing::trace!(instance = %mangled, "instantiated enum");
        mangled
    }

    /// Request a function specialization for the given type arguments
    /// (declaration order).
    pub fn require_func_instantiation(&mut self, base: Name, args: &[TypeId]) -> String {
        let args: Vec<TypeId> = args.iter().map(|&a| self.env.resolve(a)).collect();
        let base_str = self.env.interner().lookup(base).to_string();
        let interner = self.env.interner().clone();
        let mangled = mangle_func_name(self.env.pool(), &interner, &base_str, &args);

        if self.func_instances.contains_key(&mangled) || self.in_flight.contains(&mangled) {
            return mangled;
        }
        let Some(sig) = self.env.lookup_func(base).cloned() else {
            return mangled;
        };
        self.in_flight.insert(mangled.clone());

        let mut subst = Subst::default();
        for (&param, &arg) in sig.type_params.iter().zip(args.iter()) {
            subst.insert(param, arg);
        }
        let params: Vec<TypeId> = sig
            .params
            .iter()
            .map(|&p| {
                let substituted = self.env.substitute(p, &subst);
                self.env.resolve(substituted)
            })
            .collect();
        let ret = {
            let substituted = self.env.substitute(sig.ret, &subst);
            self.env.resolve(substituted)
        };
        for &p in &params {
            self.require_nested(p, 1);
        }
        self.require_nested(ret, 1);

        self.in_flight.remove(&mangled);
        self.func_order.push(mangled.clone());
        self.func_instances.insert(
            mangled.clone(),
            FuncInstance {
                mangled: mangled.clone(),
                base,
                args,
                subst,
                params,
                ret,
            },
        );
        tracing::trace!(instance = %mangled, "instantiated function");
        mangled
    }

    /// Instantiate every generic `Named` a type mentions (used by
    /// codegen when it encounters a type in a signature or body).
    pub fn require_type(&mut self, ty: TypeId) {
        self.require_nested(ty, 0);
    }

    /// Instantiate through a type: every generic `Named` it mentions is
    /// requested as a struct or enum instance.
    fn require_nested(&mut self, ty: TypeId, depth: usize) {
        if depth > self.limits.max_depth {
            let interner = self.env.interner().clone();
            let mangled = mangle_type(self.env.pool(), &interner, ty);
            self.report_cycle(&mangled);
            return;
        }
        match self.env.pool().data(ty).clone() {
            TypeData::Named { name, args, .. } => {
                if args.is_empty() {
                    return;
                }
                if self.env.lookup_enum(name).is_some() {
                    self.require_enum_inner(name, &args, depth);
                } else {
                    self.require_struct_inner(name, &args, depth);
                }
            }
            TypeData::Ref { inner, .. }
            | TypeData::Ptr { inner, .. }
            | TypeData::Slice(inner) => self.require_nested(inner, depth + 1),
            TypeData::Array { element, .. } => self.require_nested(element, depth + 1),
            TypeData::Tuple(elements) => {
                for &e in elements.iter() {
                    self.require_nested(e, depth + 1);
                }
            }
            TypeData::Func { params, ret, .. } => {
                for &p in params.iter() {
                    self.require_nested(p, depth + 1);
                }
                self.require_nested(ret, depth + 1);
            }
            _ => {}
        }
    }

    // === Impl methods ===

    /// Queue a method instantiation discovered during emission; drained
    /// at end of module.
    pub fn enqueue_impl_method(&mut self, request: ImplMethodRequest) {
        let key = request_key(&request);
        if self.generated_impl_methods.contains(&key) {
            return;
        }
        self.pending_impl_methods.push_back(request);
    }

    /// Drain pending impl-method requests to fixpoint. Returns the
    /// deduplicated requests in emission order; cancellation is
    /// honoured between drain iterations.
    pub fn drain_impl_methods(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<Vec<ImplMethodRequest>, Cancelled> {
        let mut emitted = Vec::new();
        while let Some(request) = self.pending_impl_methods.pop_front() {
            cancel.checkpoint()?;
            let key = request_key(&request);
            if !self.generated_impl_methods.insert(key) {
                continue;
            }
            // Instantiate the types the method mentions.
            let qualified = self.env.qualify(request.base_type, request.method);
            if let Some(sig) = self.env.lookup_func(qualified).cloned() {
                for &param in &sig.params {
                    let substituted = self.env.substitute(param, &request.subst);
                    self.require_nested(substituted, 0);
                }
                let ret = self.env.substitute(sig.ret, &request.subst);
                self.require_nested(ret, 0);
            }
            emitted.push(request);
        }
        Ok(emitted)
    }

    fn report_cycle(&mut self, mangled: &str) {
        self.errors.push(
            Diagnostic::error(ErrorCode::E4001)
                .with_message(format!(
                    "type instantiation recursion limit ({}) exceeded while expanding `{mangled}`",
                    self.limits.max_depth
                ))
                .with_note("self-referential generic instantiations like `T = List[T]` are not supported"),
        );
    }
}

fn request_key(request: &ImplMethodRequest) -> String {
    let suffix = request.suffix.as_deref().unwrap_or("");
    format!("{}::{:?}{}", request.mangled_type, request.method, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tml_ir::SharedInterner;

    fn env() -> TypeEnv {
        TypeEnv::new(SharedInterner::new())
    }

    #[test]
    fn struct_instantiation_is_cached_and_unique() {
        let mut env = env();
        let list = env.interner().intern("List");
        let mut mono = Monomorphizer::new(&mut env);
        let a = mono.require_struct_instantiation(list, &[TypeId::I64]);
        let b = mono.require_struct_instantiation(list, &[TypeId::I64]);
        assert_eq!(a, "List__I64");
        assert_eq!(a, b);
        assert_eq!(mono.struct_instances().count(), 1);
    }

    #[test]
    fn collection_instances_use_handle_layout() {
        let mut env = env();
        let list = env.interner().intern("List");
        let mut mono = Monomorphizer::new(&mut env);
        let mangled = mono.require_struct_instantiation(list, &[TypeId::STR]);
        let instance = mono.struct_instance(&mangled).expect("cached");
        assert!(instance.is_handle);
        assert_eq!(instance.fields.len(), 1);
    }

    #[test]
    fn user_struct_fields_are_substituted() {
        let mut env = env();
        let point = env.interner().intern("Point");
        let t = env.interner().intern("T");
        let x = env.interner().intern("x");
        let y = env.interner().intern("y");
        let t_ty = env.pool_mut().generic(t);
        env.define_struct(tml_types::StructDef {
            name: point,
            type_params: vec![t],
            const_params: Vec::new(),
            fields: vec![(x, t_ty), (y, t_ty)],
            span: tml_ir::Span::DUMMY,
        })
        .expect("fresh struct");

        let mut mono = Monomorphizer::new(&mut env);
        let mangled = mono.require_struct_instantiation(point, &[TypeId::F64]);
        assert_eq!(mangled, "Point__F64");
        let instance = mono.struct_instance(&mangled).expect("cached");
        assert_eq!(instance.fields, vec![(x, TypeId::F64), (y, TypeId::F64)]);
        assert!(!instance.is_placeholder);
    }

    #[test]
    fn unresolved_arguments_defer_to_placeholder() {
        let mut env = env();
        let point = env.interner().intern("Point");
        let t = env.interner().intern("T");
        let t_ty = env.pool_mut().generic(t);
        let mut mono = Monomorphizer::new(&mut env);
        let mangled = mono.require_struct_instantiation(point, &[t_ty]);
        let instance = mono.struct_instance(&mangled).expect("cached");
        assert!(instance.is_placeholder);
        assert_eq!(mono.placeholder_leaks().len(), 1);
    }

    #[test]
    fn function_instances_resolve_signatures() {
        let mut env = env();
        let id = env.interner().intern("id");
        let t = env.interner().intern("T");
        let t_ty = env.pool_mut().generic(t);
        let mut sig = tml_types::FuncSig::new(id, vec![t_ty], t_ty);
        sig.type_params = vec![t];
        env.define_func(sig).expect("fresh func");

        let mut mono = Monomorphizer::new(&mut env);
        let a = mono.require_func_instantiation(id, &[TypeId::I32]);
        let b = mono.require_func_instantiation(id, &[TypeId::STR]);
        let again = mono.require_func_instantiation(id, &[TypeId::I32]);
        assert_eq!(a, "id__I32");
        assert_eq!(b, "id__Str");
        assert_eq!(a, again);
        assert_eq!(mono.func_instances().count(), 2);

        let inst = mono.func_instances().next().expect("first instance");
        assert_eq!(inst.params, vec![TypeId::I32]);
        assert_eq!(inst.ret, TypeId::I32);
    }

    #[test]
    fn recursion_limit_reports_cycle() {
        let mut env = env();
        let node = env.interner().intern("Node");
        let t = env.interner().intern("T");
        let next = env.interner().intern("next");
        // struct Node[T] { next: Node[Node[T]] } - expansion never
        // terminates; the depth limit must trip.
        let t_ty = env.pool_mut().generic(t);
        let node_t = env.pool_mut().named(node, &[t_ty]);
        let node_node_t = env.pool_mut().named(node, &[node_t]);
        env.define_struct(tml_types::StructDef {
            name: node,
            type_params: vec![t],
            const_params: Vec::new(),
            fields: vec![(next, node_node_t)],
            span: tml_ir::Span::DUMMY,
        })
        .expect("fresh struct");

        let mut mono = Monomorphizer::with_limits(&mut env, MonoLimits { max_depth: 8 });
        mono.require_struct_instantiation(node, &[TypeId::I64]);
        assert!(mono
            .errors()
            .iter()
            .any(|d| d.code == ErrorCode::E4001));
    }

    #[test]
    fn impl_method_requests_deduplicate() {
        let mut env = env();
        let list = env.interner().intern("List");
        let push = env.interner().intern("push");
        let mut mono = Monomorphizer::new(&mut env);
        let request = ImplMethodRequest {
            mangled_type: "List__I64".into(),
            base_type: list,
            method: push,
            subst: Subst::default(),
            suffix: None,
            is_library: true,
        };
        mono.enqueue_impl_method(request.clone());
        mono.enqueue_impl_method(request.clone());
        let drained = mono
            .drain_impl_methods(&CancelToken::new())
            .expect("not cancelled");
        assert_eq!(drained.len(), 1);
        // Re-enqueueing after generation is also a no-op.
        mono.enqueue_impl_method(request);
        let drained = mono
            .drain_impl_methods(&CancelToken::new())
            .expect("not cancelled");
        assert!(drained.is_empty());
    }
}
