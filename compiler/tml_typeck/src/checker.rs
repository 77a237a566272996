//! The type checker: declaration registration, signature resolution,
//! and per-function body checking.
//!
//! Checking is best-effort: every error is accumulated and checking
//! continues with the error sentinel type, so one mistake does not hide
//! the rest of the module's diagnostics.

use rustc_hash::{FxHashMap, FxHashSet};
use tml_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use tml_ir::ast::{
    ArrayLen, BehaviorDecl, Decorator, EnumDecl, Function, ImplDecl, Module, ParsedTypeKind,
    StructDecl,
};
use tml_ir::{
    AstArena, CancelToken, Cancelled, ExprId, Name, ParsedTypeId, SharedInterner, Span,
};
use tml_types::{
    ArraySize, AssociatedTypeDef, BehaviorDef, ConstGenericParam, EnumDef, FuncSig, StabilityLevel,
    StructDef, Subst, TypeEnv, TypeId, WhereConstraint,
};

use crate::suggest;

/// Resolution of a call site, recorded for the MIR builder and codegen.
#[derive(Clone, Debug)]
pub struct CallTarget {
    /// Qualified callee name (`add`, `List::push`).
    pub name: Name,
    /// The selected signature (pre-substitution).
    pub sig: FuncSig,
    /// Generic bindings inferred at this call site.
    pub subst: Subst,
}

/// Output side tables of a checked module.
#[derive(Clone, Debug, Default)]
pub struct TypedModule {
    /// Type per expression, indexed by `ExprId`.
    pub expr_types: Vec<TypeId>,
    /// Resolved call targets per call/method-call expression.
    pub call_targets: FxHashMap<ExprId, CallTarget>,
}

impl TypedModule {
    pub fn type_of(&self, id: ExprId) -> TypeId {
        self.expr_types
            .get(id.index())
            .copied()
            .unwrap_or(TypeId::ERROR)
    }
}

/// Everything type checking produces.
pub struct TypeCheckResult {
    pub typed: TypedModule,
    pub env: TypeEnv,
    pub diagnostics: Vec<Diagnostic>,
}

impl TypeCheckResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A loop context while checking its body.
pub(crate) struct LoopCtx {
    pub(crate) break_ty: TypeId,
    pub(crate) saw_value_break: bool,
}

pub(crate) struct TypeChecker<'a> {
    pub(crate) module: &'a Module,
    pub(crate) arena: &'a AstArena,
    pub(crate) env: TypeEnv,
    pub(crate) diags: DiagnosticQueue,
    pub(crate) expr_types: Vec<TypeId>,
    pub(crate) call_targets: FxHashMap<ExprId, CallTarget>,
    /// Return type of the function currently being checked.
    pub(crate) fn_ret: TypeId,
    /// Generic type parameters in scope (function + enclosing impl).
    pub(crate) fn_type_params: FxHashSet<Name>,
    /// Where-clauses of the function being checked (method resolution
    /// on generic receivers consults these).
    pub(crate) fn_where: Vec<WhereConstraint>,
    pub(crate) loop_stack: Vec<LoopCtx>,
    /// Names declared by this module, visible before registration
    /// completes (forward references between declarations).
    pub(crate) local_type_names: FxHashSet<Name>,
}

/// Type check a parsed module against a fresh environment.
pub fn type_check(
    module: &Module,
    arena: &AstArena,
    interner: SharedInterner,
    cancel: &CancelToken,
) -> Result<TypeCheckResult, Cancelled> {
    let env = TypeEnv::new(interner);
    type_check_with_env(module, arena, env, cancel)
}

/// Type check against a caller-provided environment (used when the
/// driver pre-registers other modules).
pub fn type_check_with_env(
    module: &Module,
    arena: &AstArena,
    env: TypeEnv,
    cancel: &CancelToken,
) -> Result<TypeCheckResult, Cancelled> {
    let mut checker = TypeChecker {
        module,
        arena,
        env,
        diags: DiagnosticQueue::new(),
        expr_types: vec![TypeId::ERROR; arena.expr_count()],
        call_targets: FxHashMap::default(),
        fn_ret: TypeId::UNIT,
        fn_type_params: FxHashSet::default(),
        fn_where: Vec::new(),
        loop_stack: Vec::new(),
        local_type_names: FxHashSet::default(),
    };
    checker.run(cancel)?;
    Ok(checker.finish())
}

impl<'a> TypeChecker<'a> {
    fn run(&mut self, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.collect_local_type_names();
        self.register_imports();
        self.register_structs();
        self.register_enums();
        self.register_behaviors();
        self.register_functions();
        self.register_impls();

        // Bodies: top-level functions, then impl methods, then behavior
        // default methods. Cancellation is honoured between functions.
        for func in &self.module.functions {
            cancel.checkpoint()?;
            self.check_function(func, None);
        }
        for imp in &self.module.impls {
            for method in &imp.methods {
                cancel.checkpoint()?;
                self.check_function(method, Some(imp));
            }
        }
        for behavior in &self.module.behaviors {
            for method in &behavior.methods {
                if method.is_signature_only() {
                    continue;
                }
                cancel.checkpoint()?;
                self.check_function(method, None);
            }
        }

        self.audit_unresolved();
        Ok(())
    }

    fn finish(mut self) -> TypeCheckResult {
        TypeCheckResult {
            typed: TypedModule {
                expr_types: self.expr_types,
                call_targets: self.call_targets,
            },
            env: self.env,
            diagnostics: self.diags.take(),
        }
    }

    // === Helpers ===

    pub(crate) fn record(&mut self, id: ExprId, ty: TypeId) -> TypeId {
        if let Some(slot) = self.expr_types.get_mut(id.index()) {
            *slot = ty;
        }
        ty
    }

    pub(crate) fn error(&mut self, code: ErrorCode, span: Span, message: String) -> TypeId {
        self.diags
            .push(Diagnostic::error(code).with_message(message).with_label(span, "here"));
        TypeId::ERROR
    }

    pub(crate) fn error_diag(&mut self, diag: Diagnostic) -> TypeId {
        self.diags.push(diag);
        TypeId::ERROR
    }

    pub(crate) fn name_str(&self, name: Name) -> String {
        self.env.interner().lookup(name).to_string()
    }

    pub(crate) fn display(&mut self, ty: TypeId) -> String {
        let resolved = self.env.pool_mut().resolve(ty);
        let interner = self.env.interner().clone();
        self.env.pool().display(resolved, &interner)
    }

    // === Declaration collection ===

    fn collect_local_type_names(&mut self) {
        for s in &self.module.structs {
            self.local_type_names.insert(s.name);
        }
        for e in &self.module.enums {
            self.local_type_names.insert(e.name);
        }
        for b in &self.module.behaviors {
            self.local_type_names.insert(b.name);
        }
    }

    fn register_imports(&mut self) {
        for import in &self.module.imports {
            let result = if import.glob {
                self.env.import_all_from(import.module_path)
            } else if let Some(symbol) = import.symbol {
                self.env.import_symbol(import.module_path, symbol, import.alias)
            } else {
                Ok(())
            };
            if let Err(err) = result {
                let diag = match err {
                    tml_types::ModuleError::ImportCycle(chain) => {
                        let chain_str: Vec<String> =
                            chain.iter().map(|&p| self.name_str(p)).collect();
                        Diagnostic::error(ErrorCode::E1004)
                            .with_message(format!(
                                "cyclic import: {}",
                                chain_str.join(" -> ")
                            ))
                            .with_label(import.span, "import closes the cycle here")
                    }
                    tml_types::ModuleError::UnknownModule(path) => {
                        Diagnostic::error(ErrorCode::E1005)
                            .with_message(format!("unknown module `{}`", self.name_str(path)))
                            .with_label(import.span, "not found")
                    }
                    tml_types::ModuleError::UnknownSymbol { module, symbol } => {
                        Diagnostic::error(ErrorCode::E1001)
                            .with_message(format!(
                                "module `{}` has no symbol `{}`",
                                self.name_str(module),
                                self.name_str(symbol)
                            ))
                            .with_label(import.span, "unknown symbol")
                    }
                };
                self.diags.push(diag);
            }
        }
    }

    fn const_params_of(&mut self, params: &[tml_ir::ast::ConstParam]) -> Vec<ConstGenericParam> {
        params
            .iter()
            .map(|p| {
                let value_type = self.resolve_type_opt(p.value_type, TypeId::U64);
                ConstGenericParam {
                    name: p.name,
                    value_type,
                }
            })
            .collect()
    }

    fn register_structs(&mut self) {
        for decl in &self.module.structs.to_vec() {
            let def = self.struct_def_from_decl(decl);
            if let Err(err) = self.env.define_struct(def) {
                self.report_conflict(decl.name, decl.span, err);
            }
        }
    }

    fn struct_def_from_decl(&mut self, decl: &StructDecl) -> StructDef {
        let saved = self.enter_type_params(&decl.type_params);
        let fields = decl
            .fields
            .iter()
            .map(|f| (f.name, self.resolve_type_opt(f.ty, TypeId::UNIT)))
            .collect();
        let const_params = self.const_params_of(&decl.const_params);
        self.fn_type_params = saved;
        StructDef {
            name: decl.name,
            type_params: decl.type_params.clone(),
            const_params,
            fields,
            span: decl.span,
        }
    }

    fn register_enums(&mut self) {
        for decl in &self.module.enums.to_vec() {
            let def = self.enum_def_from_decl(decl);
            if let Err(err) = self.env.define_enum(def) {
                self.report_conflict(decl.name, decl.span, err);
            }
        }
    }

    fn enum_def_from_decl(&mut self, decl: &EnumDecl) -> EnumDef {
        let saved = self.enter_type_params(&decl.type_params);
        let variants = decl
            .variants
            .iter()
            .map(|v| {
                let payload = v
                    .payload
                    .iter()
                    .map(|&ty| self.resolve_type_opt(ty, TypeId::UNIT))
                    .collect();
                (v.name, payload)
            })
            .collect();
        let const_params = self.const_params_of(&decl.const_params);
        self.fn_type_params = saved;
        EnumDef {
            name: decl.name,
            type_params: decl.type_params.clone(),
            const_params,
            variants,
            span: decl.span,
        }
    }

    fn register_behaviors(&mut self) {
        for decl in &self.module.behaviors.to_vec() {
            let def = self.behavior_def_from_decl(decl);
            if let Err(err) = self.env.define_behavior(def) {
                self.report_conflict(decl.name, decl.span, err);
            }
        }
    }

    fn behavior_def_from_decl(&mut self, decl: &BehaviorDecl) -> BehaviorDef {
        let saved = self.enter_type_params(&decl.type_params);
        // `This` and associated type names are usable inside method
        // signatures.
        self.fn_type_params.insert(self.env.well_known().this_type);
        for assoc in &decl.assoc_types {
            self.fn_type_params.insert(assoc.name);
        }

        let associated_types = decl
            .assoc_types
            .iter()
            .map(|a| AssociatedTypeDef {
                name: a.name,
                type_params: a.type_params.clone(),
                bounds: a.bounds.clone(),
                default_type: a
                    .default
                    .is_valid()
                    .then(|| self.resolve_type_opt(a.default, TypeId::UNIT)),
            })
            .collect();

        let methods: Vec<FuncSig> = decl
            .methods
            .iter()
            .map(|m| self.sig_from_function(m))
            .collect();
        let methods_with_defaults = decl
            .methods
            .iter()
            .filter(|m| !m.is_signature_only())
            .map(|m| m.name)
            .collect();
        let const_params = self.const_params_of(&decl.const_params);
        self.fn_type_params = saved;

        BehaviorDef {
            name: decl.name,
            type_params: decl.type_params.clone(),
            const_params,
            associated_types,
            methods,
            super_behaviors: decl.super_behaviors.clone(),
            methods_with_defaults,
            span: decl.span,
        }
    }

    fn register_functions(&mut self) {
        for func in &self.module.functions.to_vec() {
            let sig = self.sig_from_function(func);
            if let Err(err) = self.env.define_func(sig) {
                self.report_conflict(func.name, func.span, err);
            }
        }
        for konst in &self.module.constants.to_vec() {
            let ty = self.resolve_type_opt(konst.ty, TypeId::UNIT);
            self.env.define(konst.name, ty, false, konst.span);
        }
    }

    /// Register impl methods under `Type::method` qualified names, the
    /// impl table entry, and associated type bindings.
    fn register_impls(&mut self) {
        for imp in &self.module.impls.to_vec() {
            if let Some(behavior) = imp.behavior {
                self.env.register_impl(imp.type_name, behavior);
                self.register_assoc_bindings(imp, behavior);
                self.check_impl_completeness(imp, behavior);
            }
            let saved = self.enter_type_params(&imp.type_params);
            for method in &imp.methods {
                let mut sig = self.sig_from_function(method);
                sig.name = self.env.qualify(imp.type_name, method.name);
                // Impl type params are visible in the method signature.
                for &p in &imp.type_params {
                    if !sig.type_params.contains(&p) {
                        sig.type_params.push(p);
                    }
                }
                if let Err(err) = self.env.define_func(sig) {
                    self.report_conflict(method.name, method.span, err);
                }
            }
            self.fn_type_params = saved;
        }
    }

    fn register_assoc_bindings(&mut self, imp: &ImplDecl, behavior: Name) {
        for &(assoc, parsed) in &imp.assoc_bindings {
            let ty = self.resolve_type_opt(parsed, TypeId::UNIT);
            self.env.set_assoc_binding(imp.type_name, behavior, assoc, ty);
        }
    }

    /// Every required (non-default) behavior method must be provided.
    fn check_impl_completeness(&mut self, imp: &ImplDecl, behavior: Name) {
        let Some(def) = self.env.lookup_behavior(behavior).cloned() else {
            let name = self.name_str(behavior);
            self.error(
                ErrorCode::E1002,
                imp.span,
                format!("unknown behavior `{name}`"),
            );
            return;
        };
        for method in &def.methods {
            let required = !def.methods_with_defaults.contains(&method.name);
            let provided = imp.methods.iter().any(|m| m.name == method.name);
            if required && !provided {
                let behavior_name = self.name_str(behavior);
                let method_name = self.name_str(method.name);
                let type_name = self.name_str(imp.type_name);
                self.error_diag(
                    Diagnostic::error(ErrorCode::E2003)
                        .with_message(format!(
                            "missing method `{method_name}` in impl of `{behavior_name}` for `{type_name}`"
                        ))
                        .with_label(imp.span, "impl is incomplete")
                        .with_note_at(def.span, "behavior declared here"),
                );
            }
        }
    }

    fn report_conflict(&mut self, name: Name, span: Span, err: tml_types::DefineError) {
        let tml_types::DefineError::Conflict { previous, .. } = err;
        let name = self.name_str(name);
        self.error_diag(
            Diagnostic::error(ErrorCode::E1003)
                .with_message(format!("conflicting definition of `{name}`"))
                .with_label(span, "redefined here")
                .with_secondary(previous, "previous definition"),
        );
    }

    // === Signatures ===

    pub(crate) fn enter_type_params(&mut self, params: &[Name]) -> FxHashSet<Name> {
        let saved = self.fn_type_params.clone();
        for &p in params {
            self.fn_type_params.insert(p);
        }
        saved
    }

    /// Build a `FuncSig` from a declaration, interpreting decorators
    /// (`@extern`, `@link`, `@stable`, `@deprecated`, `@lowlevel`).
    pub(crate) fn sig_from_function(&mut self, func: &Function) -> FuncSig {
        let saved = self.enter_type_params(&func.type_params);
        for p in &func.const_params {
            self.fn_type_params.insert(p.name);
        }

        let params = func
            .params
            .iter()
            .map(|p| self.resolve_type_opt(p.ty, TypeId::UNIT))
            .collect();
        let ret = self.resolve_type_opt(func.ret, TypeId::UNIT);

        let mut sig = FuncSig::new(func.name, params, ret);
        sig.ret = ret;
        sig.span = func.span;
        sig.is_async = func.is_async;
        sig.type_params = func.type_params.clone();
        sig.const_params = self.const_params_of(&func.const_params);
        sig.where_constraints = func
            .where_clauses
            .iter()
            .map(|w| WhereConstraint {
                type_param: w.type_param,
                required_behaviors: w.behaviors.clone(),
            })
            .collect();
        self.apply_decorators(&mut sig, &func.decorators);

        self.fn_type_params = saved;
        sig
    }

    fn apply_decorators(&mut self, sig: &mut FuncSig, decorators: &[Decorator]) {
        let interner = self.env.interner().clone();
        for decorator in decorators {
            let name = interner.lookup(decorator.name);
            match &*name {
                "extern" => {
                    sig.extern_abi = decorator.args.first().copied();
                    sig.extern_name = decorator.args.get(1).copied();
                }
                "link" => {
                    sig.link_libs.extend(decorator.args.iter().copied());
                    if sig.ffi_module.is_none() {
                        sig.ffi_module = decorator.args.first().copied();
                    }
                }
                "stable" => {
                    sig.stability = StabilityLevel::Stable;
                    sig.since_version = decorator.args.first().copied();
                }
                "deprecated" => {
                    sig.stability = StabilityLevel::Deprecated;
                    sig.deprecated_message = decorator.args.first().copied();
                }
                "lowlevel" => sig.is_lowlevel = true,
                _ => {
                    // Unknown decorators are preserved by the parser for
                    // other tools; the checker ignores them.
                }
            }
        }
    }

    // === Parsed type resolution ===

    /// Resolve with a default for `ParsedTypeId::NONE` (omitted
    /// annotations: Unit returns, inferred lets).
    pub(crate) fn resolve_type_opt(&mut self, id: ParsedTypeId, default: TypeId) -> TypeId {
        if !id.is_valid() {
            return default;
        }
        self.resolve_type(id)
    }

    pub(crate) fn resolve_type(&mut self, id: ParsedTypeId) -> TypeId {
        let parsed = *self.arena.parsed_type(id);
        match parsed.kind {
            ParsedTypeKind::Unit => TypeId::UNIT,
            ParsedTypeKind::Infer => self.env.fresh_type_var(),
            ParsedTypeKind::Named { segments, args } => {
                self.resolve_named_type(segments, args, parsed.span)
            }
            ParsedTypeKind::Ref { is_mut, inner } => {
                let inner = self.resolve_type(inner);
                self.env.pool_mut().reference(is_mut, inner)
            }
            ParsedTypeKind::Ptr { is_mut, inner } => {
                let inner = self.resolve_type(inner);
                self.env.pool_mut().pointer(is_mut, inner)
            }
            ParsedTypeKind::Array { element, len } => {
                let element = self.resolve_type(element);
                let size = match len {
                    ArrayLen::Lit(n) => ArraySize::Fixed(n),
                    ArrayLen::ConstParam(name) => {
                        if self.fn_type_params.contains(&name) {
                            ArraySize::Param(name)
                        } else {
                            let name = self.name_str(name);
                            self.error(
                                ErrorCode::E1001,
                                parsed.span,
                                format!("unknown const parameter `{name}` in array length"),
                            );
                            ArraySize::Fixed(0)
                        }
                    }
                };
                self.env.pool_mut().array(element, size)
            }
            ParsedTypeKind::Slice(element) => {
                let element = self.resolve_type(element);
                self.env.pool_mut().slice(element)
            }
            ParsedTypeKind::Tuple(elements) => {
                let elements: Vec<TypeId> = self
                    .arena
                    .parsed_types(elements)
                    .to_vec()
                    .iter()
                    .map(|&e| self.resolve_type(e))
                    .collect();
                self.env.pool_mut().tuple(&elements)
            }
            ParsedTypeKind::Func {
                params,
                ret,
                is_async,
            } => {
                let params: Vec<TypeId> = self
                    .arena
                    .parsed_types(params)
                    .to_vec()
                    .iter()
                    .map(|&p| self.resolve_type(p))
                    .collect();
                let ret = self.resolve_type_opt(ret, TypeId::UNIT);
                self.env.pool_mut().func(&params, ret, is_async)
            }
            ParsedTypeKind::Dyn {
                behavior,
                args,
                is_mut,
            } => self.resolve_dyn_type(behavior, args, is_mut, parsed.span),
        }
    }

    fn resolve_named_type(
        &mut self,
        segments: tml_ir::NameRange,
        args: tml_ir::ParsedTypeRange,
        span: Span,
    ) -> TypeId {
        let segments = self.arena.names(segments).to_vec();
        let args: Vec<TypeId> = self
            .arena
            .parsed_types(args)
            .to_vec()
            .iter()
            .map(|&a| self.resolve_type(a))
            .collect();

        let Some(&name) = segments.last() else {
            return TypeId::ERROR;
        };

        // Qualified path: everything before the last segment is the
        // module path.
        if segments.len() > 1 {
            let module_path = self.join_path(&segments[..segments.len() - 1]);
            return self.env.pool_mut().named_in(name, module_path, &args);
        }

        // Generic parameter in scope.
        if self.fn_type_params.contains(&name) {
            if !args.is_empty() {
                // GAT-style application of a parameter is not a type the
                // pool can name; treat as a named type for now.
                return self.env.pool_mut().named(name, &args);
            }
            return self.env.pool_mut().generic(name);
        }

        // Builtin primitive.
        if let Some(ty) = self.env.builtin_type(name) {
            if !args.is_empty() {
                let name = self.name_str(name);
                return self.error(
                    ErrorCode::E2002,
                    span,
                    format!("primitive type `{name}` takes no type arguments"),
                );
            }
            return ty;
        }

        // Alias.
        if let Some(ty) = self.env.lookup_type_alias(name) {
            return ty;
        }

        // Struct or enum (registered or declared later in this module).
        let arity = self
            .env
            .lookup_struct(name)
            .map(|d| d.type_params.len())
            .or_else(|| self.env.lookup_enum(name).map(|d| d.type_params.len()));
        if let Some(arity) = arity {
            if arity != args.len() {
                let name = self.name_str(name);
                return self.error(
                    ErrorCode::E2002,
                    span,
                    format!(
                        "wrong number of type arguments for `{name}`: expected {arity}, found {}",
                        args.len()
                    ),
                );
            }
            return self.env.pool_mut().named(name, &args);
        }
        if self.local_type_names.contains(&name) {
            return self.env.pool_mut().named(name, &args);
        }

        // Imported type.
        if let Some(imported) = self.env.resolve_imported_symbol(name) {
            let module_path = imported.module_path;
            let symbol = imported.symbol_name;
            return self.env.pool_mut().named_in(symbol, module_path, &args);
        }

        // Unknown: suggest the closest known type name.
        let known = self.env.all_type_names();
        let interner = self.env.interner().clone();
        let mut diag = Diagnostic::error(ErrorCode::E1002)
            .with_message(format!("unknown type `{}`", self.name_str(name)))
            .with_label(span, "not found");
        if let Some(suggestion) = suggest::closest_match(name, &known, &interner) {
            diag = diag.with_suggestion(format!(
                "did you mean `{}`?",
                self.name_str(suggestion)
            ));
        }
        self.error_diag(diag)
    }

    fn resolve_dyn_type(
        &mut self,
        behavior: Name,
        args: tml_ir::ParsedTypeRange,
        is_mut: bool,
        span: Span,
    ) -> TypeId {
        let args: Vec<TypeId> = self
            .arena
            .parsed_types(args)
            .to_vec()
            .iter()
            .map(|&a| self.resolve_type(a))
            .collect();
        let Some(def) = self.env.lookup_behavior(behavior).cloned() else {
            let name = self.name_str(behavior);
            return self.error(
                ErrorCode::E1002,
                span,
                format!("unknown behavior `{name}` in dyn type"),
            );
        };
        // Object safety: generic methods cannot live in a vtable.
        if let Some(method) = def.object_safety_violation() {
            let behavior_name = self.name_str(behavior);
            let method_name = self.name_str(method.name);
            return self.error_diag(
                Diagnostic::error(ErrorCode::E2006)
                    .with_message(format!(
                        "behavior `{behavior_name}` is not object-safe: method `{method_name}` has generic type parameters"
                    ))
                    .with_label(span, "cannot be made into a behavior object")
                    .with_note(
                        "generic methods require monomorphization, which is incompatible with dynamic dispatch",
                    ),
            );
        }
        self.env.pool_mut().dyn_behavior(behavior, &args, is_mut)
    }

    pub(crate) fn join_path(&self, segments: &[Name]) -> Name {
        let interner = self.env.interner();
        let joined = segments
            .iter()
            .map(|&s| interner.lookup(s).to_string())
            .collect::<Vec<_>>()
            .join("::");
        interner.intern(&joined)
    }

    // === Function bodies ===

    fn check_function(&mut self, func: &Function, imp: Option<&ImplDecl>) {
        if !func.body.is_valid() {
            // Signature-only (extern or required behavior method).
            return;
        }
        tracing::debug!(func = %self.name_str(func.name), "type checking function");

        let saved_params = self.enter_type_params(&func.type_params);
        if let Some(imp) = imp {
            for &p in &imp.type_params {
                self.fn_type_params.insert(p);
            }
        }
        for p in &func.const_params {
            self.fn_type_params.insert(p.name);
        }

        let ret = self.resolve_type_opt(func.ret, TypeId::UNIT);
        let saved_ret = std::mem::replace(&mut self.fn_ret, ret);
        let where_clauses: Vec<WhereConstraint> = func
            .where_clauses
            .iter()
            .map(|w| WhereConstraint {
                type_param: w.type_param,
                required_behaviors: w.behaviors.clone(),
            })
            .collect();
        let saved_where = std::mem::replace(&mut self.fn_where, where_clauses);

        self.env.push_scope();
        for param in &func.params {
            let ty = self.resolve_type_opt(param.ty, TypeId::UNIT);
            self.env.define(param.name, ty, param.is_mut, param.span);
        }

        let body_ty = self.infer_expr_with(func.body, Some(ret));
        // The trailing expression must match the declared return type
        //; Unit functions may end with any statement.
        if ret != TypeId::UNIT {
            if self.expr_guarantees_value(func.body) {
                self.unify_expect(ret, body_ty, self.arena.expr(func.body).span);
            } else {
                self.report_missing_return(func, ret);
            }
        }

        self.env.pop_scope();
        self.fn_ret = saved_ret;
        self.fn_where = saved_where;
        self.fn_type_params = saved_params;
    }

    pub(crate) fn unify_expect(&mut self, expected: TypeId, found: TypeId, span: Span) {
        if let Err(err) = self.env.unify(expected, found) {
            let interner = self.env.interner().clone();
            let message = err.message(self.env.pool(), &interner);
            let expected_str = self.display(err.expected);
            self.error_diag(
                Diagnostic::error(ErrorCode::E2001)
                    .with_message(message)
                    .with_label(span, format!("expected `{expected_str}`")),
            );
        }
    }

    /// Where-clause checking: for each constraint, every listed
    /// behavior must be implemented by the substituted type. Multiple
    /// clauses on one parameter union their requirements and are checked
    /// in declaration order.
    pub(crate) fn check_where_constraints(
        &mut self,
        sig: &FuncSig,
        subst: &Subst,
        span: Span,
    ) {
        for constraint in &sig.where_constraints {
            let Some(&bound_ty) = subst.get(&constraint.type_param) else {
                continue;
            };
            let bound_ty = self.env.pool_mut().resolve(bound_ty);
            for &behavior in &constraint.required_behaviors {
                if !self.type_satisfies(bound_ty, behavior) {
                    let ty_str = self.display(bound_ty);
                    let behavior_str = self.name_str(behavior);
                    let param_str = self.name_str(constraint.type_param);
                    self.error_diag(
                        Diagnostic::error(ErrorCode::E2005)
                            .with_message(format!(
                                "type `{ty_str}` does not satisfy `{param_str}: {behavior_str}`"
                            ))
                            .with_label(span, format!("`{behavior_str}` is required here"))
                            .with_note_at(sig.span, "constraint declared here"),
                    );
                    // First unsatisfied behavior is reported; remaining
                    // behaviors of the same constraint would cascade.
                    break;
                }
            }
        }
    }

    fn type_satisfies(&mut self, ty: TypeId, behavior: Name) -> bool {
        use tml_types::TypeData;
        match self.env.pool().data(ty).clone() {
            TypeData::Named { name, .. } => self.env.type_implements(name, behavior),
            TypeData::Prim(kind) => {
                let behavior_str = self.env.interner().lookup(behavior);
                primitive_implements(kind, &behavior_str)
            }
            TypeData::Error => true,
            _ => false,
        }
    }

    // === Final audits ===

    /// : unresolved type variables after checking are errors.
    fn audit_unresolved(&mut self) {
        for index in 0..self.expr_types.len() {
            let ty = self.expr_types[index];
            let resolved = self.env.pool_mut().resolve(ty);
            self.expr_types[index] = resolved;
            if self.env.pool().flags(resolved).has_var() {
                let span = self.arena.expr(ExprId::new(index as u32)).span;
                self.error_diag(
                    Diagnostic::error(ErrorCode::E2004)
                        .with_message("cannot infer type: insufficient context")
                        .with_label(span, "type annotation needed"),
                );
            }
        }
    }
}

/// Behaviors primitives implement out of the box.
pub fn primitive_implements(kind: tml_types::PrimKind, behavior: &str) -> bool {
    use tml_types::PrimKind;
    match behavior {
        "Copy" | "Clone" => kind != PrimKind::Str || behavior == "Clone",
        "Eq" | "Ord" | "Hash" => !kind.is_float(),
        "Display" | "Debug" => true,
        _ => false,
    }
}
