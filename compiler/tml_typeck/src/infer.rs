//! Expression type inference.
//!
//! One handler per `ExprKind` variant. Every expression's final type is
//! recorded in the side table; errors record the sentinel and checking
//! continues.

use tml_diagnostic::{Diagnostic, ErrorCode};
use tml_ir::ast::{ExprKind, PatternKind, StmtKind};
use tml_ir::{ExprId, Name, PatternId, Span, StmtId};
use tml_types::{FuncSig, PrimKind, Subst, TypeData, TypeId};

use crate::checker::{CallTarget, LoopCtx, TypeChecker};
use crate::suggest;

impl TypeChecker<'_> {
    pub(crate) fn infer_expr(&mut self, id: ExprId) -> TypeId {
        self.infer_expr_with(id, None)
    }

    pub(crate) fn infer_expr_with(&mut self, id: ExprId, expected: Option<TypeId>) -> TypeId {
        let expr = *self.arena.expr(id);
        let span = expr.span;
        let ty = match expr.kind {
            // === Literals ===
            ExprKind::Int(value) => self.int_literal_type(value, expected),
            ExprKind::Float(_) => self.float_literal_type(expected),
            ExprKind::Bool(_) => TypeId::BOOL,
            ExprKind::Str(_) => TypeId::STR,
            ExprKind::Char(_) => TypeId::CHAR,
            ExprKind::Unit => TypeId::UNIT,

            // === Names ===
            ExprKind::Ident(name) => self.infer_ident(name, span),
            ExprKind::Path { segments } => {
                let segments = self.arena.names(segments).to_vec();
                self.infer_path(&segments, span)
            }

            // === Operators ===
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => self.check_unary(op, operand, span),

            // === Calls and access ===
            ExprKind::Call { callee, args } => self.infer_call(id, callee, args, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.infer_method_call(id, receiver, method, args, span),
            ExprKind::Field { object, field } => self.infer_field(object, field, span),
            ExprKind::Index { object, index } => self.infer_index(object, index, span),

            // === Control flow ===
            ExprKind::Block { stmts, tail } => self.infer_block(stmts, tail, expected),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.infer_if(cond, then_branch, else_branch, expected),
            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => self.infer_if_let(pattern, value, then_branch, else_branch, expected),
            ExprKind::When { scrutinee, arms } => self.infer_when(scrutinee, arms, expected),
            ExprKind::Loop { body } => self.infer_loop(body),
            ExprKind::While { cond, body } => {
                let cond_ty = self.infer_expr(cond);
                self.unify_expect(TypeId::BOOL, cond_ty, self.arena.expr(cond).span);
                self.infer_expr(body);
                TypeId::UNIT
            }
            ExprKind::For {
                pattern,
                iter,
                body,
            } => self.infer_for(pattern, iter, body),

            ExprKind::Return(value) => {
                let found = if value.is_valid() {
                    self.infer_expr_with(value, Some(self.fn_ret))
                } else {
                    TypeId::UNIT
                };
                self.unify_expect(self.fn_ret, found, span);
                TypeId::NEVER
            }
            ExprKind::Break(value) => {
                let value_ty = if value.is_valid() {
                    Some(self.infer_expr(value))
                } else {
                    None
                };
                match self.loop_stack.last_mut() {
                    Some(ctx) => {
                        if let Some(value_ty) = value_ty {
                            ctx.saw_value_break = true;
                            let break_ty = ctx.break_ty;
                            self.unify_expect(break_ty, value_ty, span);
                        }
                    }
                    None => {
                        self.error(
                            ErrorCode::E2001,
                            span,
                            "`break` outside of a loop".to_string(),
                        );
                    }
                }
                TypeId::NEVER
            }
            ExprKind::Continue => {
                if self.loop_stack.is_empty() {
                    self.error(
                        ErrorCode::E2001,
                        span,
                        "`continue` outside of a loop".to_string(),
                    );
                }
                TypeId::NEVER
            }

            // === Aggregates ===
            ExprKind::Tuple(elements) => {
                let elements = self.arena.exprs(elements).to_vec();
                let expected_elems = expected.and_then(|e| {
                    let resolved = self.env.pool_mut().resolve(e);
                    match self.env.pool().data(resolved).clone() {
                        TypeData::Tuple(elems) if elems.len() == elements.len() => {
                            Some(elems.to_vec())
                        }
                        _ => None,
                    }
                });
                let types: Vec<TypeId> = elements
                    .iter()
                    .enumerate()
                    .map(|(i, &e)| {
                        let hint = expected_elems.as_ref().map(|v| v[i]);
                        self.infer_expr_with(e, hint)
                    })
                    .collect();
                self.env.pool_mut().tuple(&types)
            }
            ExprKind::Array(elements) => self.infer_array(elements, expected),
            ExprKind::ArrayRepeat { elem, count } => self.infer_array_repeat(elem, count, span),
            ExprKind::StructLit {
                name,
                type_args,
                fields,
                base,
            } => self.infer_struct_lit(name, type_args, fields, base, span),
            ExprKind::Closure { params, body } => self.infer_closure(params, body, expected),
            ExprKind::Cast { expr: value, ty } => self.infer_cast(value, ty, span),
            ExprKind::Range {
                start,
                end,
                inclusive: _,
            } => self.infer_range(start, end),
            ExprKind::InterpStr { leading: _, parts } => {
                let parts = self.arena.interp_part_list(parts).to_vec();
                for part in parts {
                    let part_ty = self.infer_expr(part.expr);
                    self.check_formattable(part_ty, self.arena.expr(part.expr).span);
                }
                TypeId::STR
            }
        };
        self.record(id, ty)
    }

    /// Argument checking with the behavior-object coercion: a value (or
    /// reference) of a nominal type flows into a `dyn B` parameter when
    /// the type implements `B`; codegen builds the fat pointer.
    pub(crate) fn coercible_unify(&mut self, expected: TypeId, found: TypeId, span: Span) {
        let resolved = self.env.pool_mut().resolve_shallow(expected);
        if let TypeData::DynBehavior { behavior, .. } = self.env.pool().data(resolved).clone() {
            let base = self.strip_refs(found);
            if let TypeData::Named { name, .. } = self.env.pool().data(base).clone() {
                if self.env.type_implements(name, behavior) {
                    return;
                }
                let ty_str = self.name_str(name);
                let behavior_str = self.name_str(behavior);
                self.error_diag(
                    Diagnostic::error(ErrorCode::E2005)
                        .with_message(format!(
                            "type `{ty_str}` does not implement behavior `{behavior_str}`"
                        ))
                        .with_label(span, format!("`dyn {behavior_str}` required here")),
                );
                return;
            }
        }
        self.unify_expect(expected, found, span);
    }

    /// Auto-deref: peel reference layers off a receiver/object type.
    pub(crate) fn strip_refs(&mut self, ty: TypeId) -> TypeId {
        let mut ty = ty;
        loop {
            ty = self.env.pool_mut().resolve_shallow(ty);
            let inner = match self.env.pool().data(ty) {
                TypeData::Ref { inner, .. } => Some(*inner),
                _ => None,
            };
            match inner {
                Some(inner) => ty = inner,
                None => return ty,
            }
        }
    }

    // === Literals ===

    fn int_literal_type(&mut self, value: i64, expected: Option<TypeId>) -> TypeId {
        // Narrow to the context type when it is an integer primitive
        // that fits.
        if let Some(expected) = expected {
            let expected = self.env.pool_mut().resolve_shallow(expected);
            if let TypeData::Prim(kind) = *self.env.pool().data(expected) {
                if kind.is_integer() && kind.fits_value(value) {
                    return expected;
                }
            }
        }
        TypeId::I64
    }

    fn float_literal_type(&mut self, expected: Option<TypeId>) -> TypeId {
        if let Some(expected) = expected {
            let expected = self.env.pool_mut().resolve_shallow(expected);
            if let TypeData::Prim(kind) = *self.env.pool().data(expected) {
                if kind.is_float() {
                    return expected;
                }
            }
        }
        TypeId::F64
    }

    // === Names ===

    fn infer_ident(&mut self, name: Name, span: Span) -> TypeId {
        // 1. Local binding.
        if let Some(symbol) = self.env.lookup(name) {
            return symbol.ty;
        }
        // 2. Function reference as a value.
        if let Some(sig) = self.env.lookup_func(name).cloned() {
            let is_async = sig.is_async;
            let ret = sig.ret;
            return self.env.pool_mut().func(&sig.params, ret, is_async);
        }
        // 3. Unqualified payload-less enum constructor.
        if let Some((enum_name, def)) = self.find_enum_with_variant(name) {
            if def
                .variant(name)
                .is_some_and(|(_, payload)| payload.is_empty())
            {
                let args: Vec<TypeId> = def
                    .type_params
                    .iter()
                    .map(|_| self.env.fresh_type_var())
                    .collect();
                return self.env.pool_mut().named(enum_name, &args);
            }
        }
        // 4. Imported function.
        if let Some(imported) = self.env.resolve_imported_symbol(name).cloned() {
            if let Some(module) = self.env.get_module(imported.module_path) {
                if let Some(sig) = module
                    .functions
                    .get(&imported.symbol_name)
                    .and_then(|v| v.first())
                    .cloned()
                {
                    let is_async = sig.is_async;
                    let ret = sig.ret;
                    return self.env.pool_mut().func(&sig.params, ret, is_async);
                }
            }
        }

        self.unknown_ident(name, span)
    }

    fn unknown_ident(&mut self, name: Name, span: Span) -> TypeId {
        let mut candidates = self.env.scopes().visible_names();
        candidates.extend(self.env.all_func_names());
        candidates.extend(self.env.all_type_names());
        let interner = self.env.interner().clone();
        let mut diag = Diagnostic::error(ErrorCode::E1001)
            .with_message(format!("unknown identifier `{}`", self.name_str(name)))
            .with_label(span, "not found in this scope");
        if let Some(suggestion) = suggest::closest_match(name, &candidates, &interner) {
            diag = diag.with_suggestion(format!("did you mean `{}`?", self.name_str(suggestion)));
        }
        self.error_diag(diag)
    }

    fn find_enum_with_variant(&self, variant: Name) -> Option<(Name, tml_types::EnumDef)> {
        self.env
            .all_enums()
            .iter()
            .find(|(_, def)| def.variant(variant).is_some())
            .map(|(&name, def)| (name, def.clone()))
    }

    /// `Base::member` used as a value: unit enum variant or a function
    /// reference.
    fn infer_path(&mut self, segments: &[Name], span: Span) -> TypeId {
        if let [base, member] = *segments {
            if let Some(def) = self.env.lookup_enum(base).cloned() {
                return self.enum_ctor_type(base, &def, member, &[], span);
            }
            let qualified = self.env.qualify(base, member);
            if let Some(sig) = self.env.lookup_func(qualified).cloned() {
                let is_async = sig.is_async;
                let ret = sig.ret;
                return self.env.pool_mut().func(&sig.params, ret, is_async);
            }
        }
        if segments.len() > 2 {
            let module_path = self.join_path(&segments[..segments.len() - 1]);
            let symbol = segments[segments.len() - 1];
            if let Some(sig) = self
                .env
                .get_module(module_path)
                .and_then(|m| m.functions.get(&symbol))
                .and_then(|v| v.first())
                .cloned()
            {
                let is_async = sig.is_async;
                let ret = sig.ret;
                return self.env.pool_mut().func(&sig.params, ret, is_async);
            }
        }
        let path = segments
            .iter()
            .map(|&s| self.name_str(s))
            .collect::<Vec<_>>()
            .join("::");
        self.error(ErrorCode::E1001, span, format!("unknown path `{path}`"))
    }

    // === Calls ===

    fn infer_call(
        &mut self,
        call_id: ExprId,
        callee: ExprId,
        args: tml_ir::ExprRange,
        span: Span,
    ) -> TypeId {
        let arg_ids = self.arena.exprs(args).to_vec();
        let callee_expr = *self.arena.expr(callee);

        match callee_expr.kind {
            ExprKind::Ident(name) => {
                // A local binding holding a function value shadows the
                // global function namespace.
                if let Some(symbol) = self.env.lookup(name) {
                    let callee_ty = symbol.ty;
                    self.record(callee, callee_ty);
                    return self.call_value(callee_ty, &arg_ids, span);
                }
                // Variadic builtins accept anything.
                if self.env.is_variadic_builtin(name) {
                    for &arg in &arg_ids {
                        self.infer_expr(arg);
                    }
                    self.record(callee, TypeId::UNIT);
                    return TypeId::UNIT;
                }
                self.resolve_named_call(call_id, callee, name, &arg_ids, span)
            }
            ExprKind::Path { segments } => {
                let segments = self.arena.names(segments).to_vec();
                if let [base, member] = *segments {
                    if let Some(def) = self.env.lookup_enum(base).cloned() {
                        self.record(callee, TypeId::UNIT);
                        return self.enum_ctor_type(base, &def, member, &arg_ids, span);
                    }
                    let qualified = self.env.qualify(base, member);
                    return self.resolve_named_call(call_id, callee, qualified, &arg_ids, span);
                }
                if segments.len() > 2 {
                    let module_path = self.join_path(&segments[..segments.len() - 1]);
                    let symbol = segments[segments.len() - 1];
                    if let Some(sig) = self
                        .env
                        .get_module(module_path)
                        .and_then(|m| m.functions.get(&symbol))
                        .and_then(|v| v.first())
                        .cloned()
                    {
                        return self.check_call_against(call_id, callee, &sig, &arg_ids, span);
                    }
                }
                let callee_ty = self.infer_expr(callee);
                self.call_value(callee_ty, &arg_ids, span)
            }
            _ => {
                let callee_ty = self.infer_expr(callee);
                self.call_value(callee_ty, &arg_ids, span)
            }
        }
    }

    /// Call through a function-typed value (closure, function ref).
    fn call_value(&mut self, callee_ty: TypeId, arg_ids: &[ExprId], span: Span) -> TypeId {
        let callee_ty = self.env.pool_mut().resolve_shallow(callee_ty);
        match self.env.pool().data(callee_ty).clone() {
            TypeData::Func { params, ret, .. } | TypeData::Closure { params, ret, .. } => {
                if params.len() != arg_ids.len() {
                    return self.arity_error(params.len(), arg_ids.len(), span);
                }
                for (&param, &arg) in params.iter().zip(arg_ids.iter()) {
                    let arg_ty = self.infer_expr_with(arg, Some(param));
                    self.coercible_unify(param, arg_ty, self.arena.expr(arg).span);
                }
                ret
            }
            TypeData::Error => TypeId::ERROR,
            _ => {
                let ty_str = self.display(callee_ty);
                self.error(
                    ErrorCode::E2013,
                    span,
                    format!("value of type `{ty_str}` is not callable"),
                )
            }
        }
    }

    pub(crate) fn arity_error(&mut self, expected: usize, found: usize, span: Span) -> TypeId {
        let plural = if expected == 1 { "" } else { "s" };
        self.error_diag(
            Diagnostic::error(ErrorCode::E2002)
                .with_message(format!(
                    "wrong number of arguments: expected {expected}, found {found}"
                ))
                .with_label(span, format!("expected {expected} argument{plural}"))
                .with_suggestion(if found > expected {
                    "remove extra arguments"
                } else {
                    "add missing arguments"
                }),
        )
    }

    /// Resolve a call to a (possibly overloaded, possibly generic)
    /// named function.
    fn resolve_named_call(
        &mut self,
        call_id: ExprId,
        callee: ExprId,
        name: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        let overloads = self.env.all_overloads(name).to_vec();
        if overloads.is_empty() {
            return self.unknown_ident(name, span);
        }

        // Single overload: check directly for precise diagnostics.
        if let [sig] = &overloads[..] {
            let sig = sig.clone();
            return self.check_call_against(call_id, callee, &sig, arg_ids, span);
        }

        let arg_types: Vec<TypeId> = arg_ids.iter().map(|&a| self.infer_expr(a)).collect();
        match self.env.lookup_func_overload(name, &arg_types) {
            tml_types::OverloadResolution::Found(sig) => {
                self.finish_call(call_id, callee, &sig, arg_ids, &arg_types, span)
            }
            tml_types::OverloadResolution::Ambiguous(candidates) => {
                let name = self.name_str(name);
                self.error_diag(
                    Diagnostic::error(ErrorCode::E2011)
                        .with_message(format!(
                            "ambiguous call to `{name}`: {} overloads match",
                            candidates.len()
                        ))
                        .with_label(span, "ambiguous call")
                        .with_note("annotate the arguments to select one overload"),
                )
            }
            tml_types::OverloadResolution::NotFound => {
                let name = self.name_str(name);
                self.error_diag(
                    Diagnostic::error(ErrorCode::E2012)
                        .with_message(format!(
                            "no overload of `{name}` matches the argument types"
                        ))
                        .with_label(span, "no matching overload")
                        .with_note(format!("{} overload(s) exist", overloads.len())),
                )
            }
        }
    }

    /// Arity + per-argument checking against one signature, inferring
    /// generic bindings as we go.
    fn check_call_against(
        &mut self,
        call_id: ExprId,
        callee: ExprId,
        sig: &FuncSig,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        if sig.params.len() != arg_ids.len() {
            return self.arity_error(sig.params.len(), arg_ids.len(), span);
        }
        let mut arg_types = Vec::with_capacity(arg_ids.len());
        for (&param, &arg) in sig.params.iter().zip(arg_ids.iter()) {
            let hint = if sig.is_generic() { None } else { Some(param) };
            arg_types.push(self.infer_expr_with(arg, hint));
        }
        self.finish_call(call_id, callee, sig, arg_ids, &arg_types, span)
    }

    /// Common tail of call checking: generic substitution, where
    /// clauses, deprecation, call-target recording.
    fn finish_call(
        &mut self,
        call_id: ExprId,
        callee: ExprId,
        sig: &FuncSig,
        arg_ids: &[ExprId],
        arg_types: &[TypeId],
        span: Span,
    ) -> TypeId {
        let mut subst = Subst::default();
        if sig.is_generic() {
            // Build the substitution by structurally unifying parameter
            // patterns with argument types.
            for (&param, &arg_ty) in sig.params.iter().zip(arg_types.iter()) {
                self.env.pool_mut().match_generic(param, arg_ty, &mut subst);
            }
            // Unbound parameters stay as inference variables so the
            // result type can still be pinned by context.
            for &param in &sig.type_params {
                if !subst.contains_key(&param) {
                    let var = self.env.fresh_type_var();
                    subst.insert(param, var);
                }
            }
        }

        for ((&param, &arg_ty), &arg) in sig.params.iter().zip(arg_types.iter()).zip(arg_ids.iter())
        {
            let expected = self.env.substitute(param, &subst);
            self.coercible_unify(expected, arg_ty, self.arena.expr(arg).span);
        }

        self.check_where_constraints(sig, &subst, span);
        self.warn_if_deprecated(sig, span);

        let ret = self.env.substitute(sig.ret, &subst);
        let callee_ty = {
            let is_async = sig.is_async;
            self.env.pool_mut().func(&sig.params, sig.ret, is_async)
        };
        self.record(callee, callee_ty);
        self.call_targets.insert(
            call_id,
            CallTarget {
                name: sig.name,
                sig: sig.clone(),
                subst,
            },
        );
        ret
    }

    pub(crate) fn warn_if_deprecated(&mut self, sig: &FuncSig, span: Span) {
        if !sig.is_deprecated() {
            return;
        }
        let name = self.name_str(sig.name);
        let mut diag = Diagnostic::warning(ErrorCode::E2010)
            .with_message(format!("use of deprecated function `{name}`"))
            .with_label(span, "deprecated");
        if let Some(message) = sig.deprecated_message {
            diag = diag.with_note(self.name_str(message));
        }
        if let Some(since) = sig.since_version {
            diag = diag.with_note(format!("deprecated since {}", self.name_str(since)));
        }
        self.diags.push(diag);
    }

    /// Enum constructor application: `Maybe::Just(x)`.
    fn enum_ctor_type(
        &mut self,
        enum_name: Name,
        def: &tml_types::EnumDef,
        variant: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        let Some((_, payload)) = def.variant(variant).cloned() else {
            let variant_str = self.name_str(variant);
            let enum_str = self.name_str(enum_name);
            let variant_names: Vec<Name> = def.variants.iter().map(|(n, _)| *n).collect();
            let interner = self.env.interner().clone();
            let mut diag = Diagnostic::error(ErrorCode::E1006)
                .with_message(format!("enum `{enum_str}` has no variant `{variant_str}`"))
                .with_label(span, "unknown variant");
            if let Some(suggestion) = suggest::closest_match(variant, &variant_names, &interner) {
                diag =
                    diag.with_suggestion(format!("did you mean `{}`?", self.name_str(suggestion)));
            }
            return self.error_diag(diag);
        };
        if payload.len() != arg_ids.len() {
            return self.arity_error(payload.len(), arg_ids.len(), span);
        }

        let mut subst = Subst::default();
        let mut arg_types = Vec::with_capacity(arg_ids.len());
        for (&pattern, &arg) in payload.iter().zip(arg_ids.iter()) {
            let arg_ty = self.infer_expr(arg);
            self.env.pool_mut().match_generic(pattern, arg_ty, &mut subst);
            arg_types.push(arg_ty);
        }
        for &param in &def.type_params {
            if !subst.contains_key(&param) {
                let var = self.env.fresh_type_var();
                subst.insert(param, var);
            }
        }
        for ((&pattern, &arg_ty), &arg) in payload.iter().zip(arg_types.iter()).zip(arg_ids.iter())
        {
            let expected = self.env.substitute(pattern, &subst);
            self.unify_expect(expected, arg_ty, self.arena.expr(arg).span);
        }

        let args: Vec<TypeId> = def
            .type_params
            .iter()
            .map(|p| subst[p])
            .collect();
        self.env.pool_mut().named(enum_name, &args)
    }

    // === Method calls ===

    fn infer_method_call(
        &mut self,
        call_id: ExprId,
        receiver: ExprId,
        method: Name,
        args: tml_ir::ExprRange,
        span: Span,
    ) -> TypeId {
        let arg_ids = self.arena.exprs(args).to_vec();
        let receiver_ty = self.infer_expr(receiver);
        let receiver_ty = self.env.pool_mut().resolve(receiver_ty);

        // Auto-deref through references.
        let base_ty = self.strip_refs(receiver_ty);

        match self.env.pool().data(base_ty).clone() {
            TypeData::Named {
                name, module_path, ..
            } => self.named_method_call(
                call_id, name, module_path, base_ty, method, &arg_ids, span,
            ),
            TypeData::DynBehavior { behavior, .. } => {
                self.dyn_method_call(call_id, behavior, method, &arg_ids, span)
            }
            TypeData::Generic(param) => {
                self.generic_method_call(call_id, param, method, &arg_ids, span)
            }
            TypeData::Prim(_) | TypeData::Array { .. } | TypeData::Slice(_) => {
                self.builtin_method_call(base_ty, method, &arg_ids, span)
            }
            TypeData::Error => TypeId::ERROR,
            _ => {
                let ty_str = self.display(base_ty);
                let method_str = self.name_str(method);
                self.error(
                    ErrorCode::E2003,
                    span,
                    format!("no method `{method_str}` on type `{ty_str}`"),
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn named_method_call(
        &mut self,
        call_id: ExprId,
        type_name: Name,
        module_path: Name,
        receiver_ty: TypeId,
        method: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        let qualified = self.env.qualify(type_name, method);
        let mut candidates = self.env.all_overloads(qualified).to_vec();

        // Imported type: its methods live in the defining module.
        if candidates.is_empty() && !module_path.is_empty() {
            if let Some(module) = self.env.get_module(module_path) {
                if let Some(sigs) = module.functions.get(&qualified) {
                    candidates = sigs.clone();
                }
            }
        }

        if candidates.is_empty() {
            let ty_str = self.name_str(type_name);
            let method_str = self.name_str(method);
            return self.error(
                ErrorCode::E2003,
                span,
                format!("no method `{method_str}` on type `{ty_str}`"),
            );
        }

        // Pick the first candidate with matching arity (receiver is
        // params[0]); overloaded methods with identical arity fall back
        // to the first and report mismatches per-argument.
        let sig = candidates
            .iter()
            .find(|s| s.params.len() == arg_ids.len() + 1)
            .cloned();
        let Some(sig) = sig else {
            let expected = candidates[0].params.len().saturating_sub(1);
            return self.arity_error(expected, arg_ids.len(), span);
        };

        let mut subst = Subst::default();
        // Adjust the receiver to the declared receiver shape before
        // matching, so `List[I32]` binds `T` through `mut ref List[T]`.
        let receiver_pattern = sig.params[0];
        let receiver_ref_mut = match self.env.pool().data(receiver_pattern) {
            TypeData::Ref { is_mut, .. } => Some(*is_mut),
            _ => None,
        };
        let adjusted = match receiver_ref_mut {
            Some(is_mut) => self.env.pool_mut().reference(is_mut, receiver_ty),
            None => receiver_ty,
        };
        self.env
            .pool_mut()
            .match_generic(receiver_pattern, adjusted, &mut subst);

        let mut arg_types = Vec::with_capacity(arg_ids.len());
        for (&param, &arg) in sig.params[1..].iter().zip(arg_ids.iter()) {
            let arg_ty = self.infer_expr(arg);
            self.env.pool_mut().match_generic(param, arg_ty, &mut subst);
            arg_types.push(arg_ty);
        }
        for &param in &sig.type_params {
            if !subst.contains_key(&param) {
                let var = self.env.fresh_type_var();
                subst.insert(param, var);
            }
        }
        for ((&param, &arg_ty), &arg) in
            sig.params[1..].iter().zip(arg_types.iter()).zip(arg_ids.iter())
        {
            let expected = self.env.substitute(param, &subst);
            self.coercible_unify(expected, arg_ty, self.arena.expr(arg).span);
        }

        self.check_where_constraints(&sig, &subst, span);
        self.warn_if_deprecated(&sig, span);

        let ret = self.env.substitute(sig.ret, &subst);
        self.call_targets.insert(
            call_id,
            CallTarget {
                name: qualified,
                sig,
                subst,
            },
        );
        ret
    }

    /// Virtual call through a behavior object; the slot is selected by
    /// declaration order at codegen time.
    fn dyn_method_call(
        &mut self,
        call_id: ExprId,
        behavior: Name,
        method: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        let Some(def) = self.env.lookup_behavior(behavior).cloned() else {
            let name = self.name_str(behavior);
            return self.error(ErrorCode::E1002, span, format!("unknown behavior `{name}`"));
        };
        let Some(sig) = def.method(method).cloned() else {
            let behavior_str = self.name_str(behavior);
            let method_str = self.name_str(method);
            return self.error(
                ErrorCode::E2003,
                span,
                format!("behavior `{behavior_str}` has no method `{method_str}`"),
            );
        };

        let declared_args = sig.params.len().saturating_sub(1);
        if declared_args != arg_ids.len() {
            return self.arity_error(declared_args, arg_ids.len(), span);
        }
        for (&param, &arg) in sig.params[1..].iter().zip(arg_ids.iter()) {
            let arg_ty = self.infer_expr_with(arg, Some(param));
            self.unify_expect(param, arg_ty, self.arena.expr(arg).span);
        }

        let qualified = self.env.qualify(behavior, method);
        let ret = sig.ret;
        self.call_targets.insert(
            call_id,
            CallTarget {
                name: qualified,
                sig,
                subst: Subst::default(),
            },
        );
        ret
    }

    /// Method on a generic receiver: resolved through the enclosing
    /// function's where-clauses.
    fn generic_method_call(
        &mut self,
        call_id: ExprId,
        param: Name,
        method: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        let behaviors: Vec<Name> = self
            .fn_where
            .iter()
            .filter(|w| w.type_param == param)
            .flat_map(|w| w.required_behaviors.iter().copied())
            .collect();
        for behavior in behaviors {
            let has_method = self
                .env
                .lookup_behavior(behavior)
                .is_some_and(|def| def.method(method).is_some());
            if has_method {
                return self.dyn_method_call(call_id, behavior, method, arg_ids, span);
            }
        }
        let param_str = self.name_str(param);
        let method_str = self.name_str(method);
        self.error_diag(
            Diagnostic::error(ErrorCode::E2003)
                .with_message(format!(
                    "no method `{method_str}` on type parameter `{param_str}`"
                ))
                .with_label(span, "method not found")
                .with_suggestion(format!(
                    "add a `where {param_str}: <behavior>` clause declaring the method"
                )),
        )
    }

    /// The small builtin method surface on primitives and arrays.
    fn builtin_method_call(
        &mut self,
        receiver_ty: TypeId,
        method: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> TypeId {
        for &arg in arg_ids {
            self.infer_expr(arg);
        }
        let method_str = self.name_str(method);
        let data = self.env.pool().data(receiver_ty).clone();
        match (&data, &*method_str) {
            (TypeData::Prim(PrimKind::Str), "len") => TypeId::I64,
            (TypeData::Array { .. } | TypeData::Slice(_), "len") => TypeId::I64,
            (TypeData::Prim(kind), "to_str") if kind.is_numeric() => TypeId::STR,
            (TypeData::Prim(PrimKind::Bool | PrimKind::Char), "to_str") => TypeId::STR,
            _ => {
                let ty_str = self.display(receiver_ty);
                self.error(
                    ErrorCode::E2003,
                    span,
                    format!("no method `{method_str}` on type `{ty_str}`"),
                )
            }
        }
    }

    // === Field and index access ===

    fn infer_field(&mut self, object: ExprId, field: Name, span: Span) -> TypeId {
        let object_ty = self.infer_expr(object);
        let object_ty = self.env.pool_mut().resolve(object_ty);
        let base_ty = self.strip_refs(object_ty);

        match self.env.pool().data(base_ty).clone() {
            TypeData::Named { name, args, .. } => {
                let Some(def) = self.env.lookup_struct(name).cloned() else {
                    let ty_str = self.name_str(name);
                    return self.error(
                        ErrorCode::E2008,
                        span,
                        format!("type `{ty_str}` has no fields"),
                    );
                };
                let Some(field_ty) = def.field(field) else {
                    let field_names: Vec<Name> = def.fields.iter().map(|(n, _)| *n).collect();
                    let interner = self.env.interner().clone();
                    let mut diag = Diagnostic::error(ErrorCode::E2008)
                        .with_message(format!(
                            "no field `{}` on struct `{}`",
                            self.name_str(field),
                            self.name_str(name)
                        ))
                        .with_label(span, "unknown field");
                    if let Some(suggestion) =
                        suggest::closest_match(field, &field_names, &interner)
                    {
                        diag = diag.with_suggestion(format!(
                            "did you mean `{}`?",
                            self.name_str(suggestion)
                        ));
                    }
                    return self.error_diag(diag);
                };
                // Apply type-argument substitution.
                let mut subst = Subst::default();
                for (&param, &arg) in def.type_params.iter().zip(args.iter()) {
                    subst.insert(param, arg);
                }
                self.env.substitute(field_ty, &subst)
            }
            TypeData::Tuple(elements) => {
                let field_str = self.name_str(field);
                match field_str.parse::<usize>() {
                    Ok(index) if index < elements.len() => elements[index],
                    _ => self.error(
                        ErrorCode::E2008,
                        span,
                        format!(
                            "no field `{field_str}` on a {}-element tuple",
                            elements.len()
                        ),
                    ),
                }
            }
            TypeData::Error => TypeId::ERROR,
            _ => {
                let ty_str = self.display(base_ty);
                self.error(
                    ErrorCode::E2008,
                    span,
                    format!("type `{ty_str}` has no fields"),
                )
            }
        }
    }

    fn infer_index(&mut self, object: ExprId, index: ExprId, span: Span) -> TypeId {
        let object_ty = self.infer_expr(object);
        let object_ty = self.env.pool_mut().resolve(object_ty);
        let base_ty = self.strip_refs(object_ty);

        let index_ty = self.infer_expr_with(index, Some(TypeId::I64));
        let index_span = self.arena.expr(index).span;

        match self.env.pool().data(base_ty).clone() {
            TypeData::Array { element, .. } | TypeData::Slice(element) => {
                self.unify_expect(TypeId::I64, index_ty, index_span);
                element
            }
            TypeData::Prim(PrimKind::Str) => {
                self.unify_expect(TypeId::I64, index_ty, index_span);
                TypeId::CHAR
            }
            TypeData::Named { name, args, .. } => {
                let name_str = self.name_str(name);
                match (&*name_str, args.len()) {
                    ("List" | "Vec" | "Buffer", 1) => {
                        self.unify_expect(TypeId::I64, index_ty, index_span);
                        args[0]
                    }
                    ("HashMap", 2) => {
                        self.unify_expect(args[0], index_ty, index_span);
                        args[1]
                    }
                    _ => self.error(
                        ErrorCode::E2007,
                        span,
                        format!("type `{name_str}` cannot be indexed"),
                    ),
                }
            }
            TypeData::Error => TypeId::ERROR,
            _ => {
                let ty_str = self.display(base_ty);
                self.error(
                    ErrorCode::E2007,
                    span,
                    format!("type `{ty_str}` cannot be indexed"),
                )
            }
        }
    }

    // === Control flow ===

    fn infer_block(
        &mut self,
        stmts: tml_ir::StmtRange,
        tail: ExprId,
        expected: Option<TypeId>,
    ) -> TypeId {
        self.env.push_scope();
        let stmt_ids = self.arena.stmts(stmts).to_vec();
        for stmt in stmt_ids {
            self.check_stmt(stmt);
        }
        let ty = if tail.is_valid() {
            self.infer_expr_with(tail, expected)
        } else {
            TypeId::UNIT
        };
        self.env.pop_scope();
        ty
    }

    fn check_stmt(&mut self, id: StmtId) {
        let stmt = *self.arena.stmt(id);
        match stmt.kind {
            StmtKind::Let {
                name,
                is_mut,
                ty,
                init,
            } => {
                let annotation = ty.is_valid().then(|| self.resolve_type(ty));
                // Declarations without an initializer take their
                // annotation (or a fresh variable pinned by later
                // assignments); the borrow checker proves definite
                // initialization.
                let bound_ty = if init.is_valid() {
                    let init_ty = self.infer_expr_with(init, annotation);
                    match annotation {
                        Some(annotation) => {
                            self.unify_expect(annotation, init_ty, self.arena.expr(init).span);
                            annotation
                        }
                        None => init_ty,
                    }
                } else {
                    annotation.unwrap_or_else(|| self.env.fresh_type_var())
                };
                self.env.define(name, bound_ty, is_mut, stmt.span);
            }
            StmtKind::Expr(expr) => {
                self.infer_expr(expr);
            }
        }
    }

    fn infer_if(
        &mut self,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
        expected: Option<TypeId>,
    ) -> TypeId {
        let cond_ty = self.infer_expr_with(cond, Some(TypeId::BOOL));
        self.unify_expect(TypeId::BOOL, cond_ty, self.arena.expr(cond).span);

        let then_ty = self.infer_expr_with(then_branch, expected);
        if !else_branch.is_valid() {
            return TypeId::UNIT;
        }
        let else_ty = self.infer_expr_with(else_branch, expected);
        self.join_branches(then_ty, else_ty, self.arena.expr(else_branch).span)
    }

    /// Arms must converge; diverging (`Never`) arms adopt the other
    /// arm's type.
    pub(crate) fn join_branches(&mut self, a: TypeId, b: TypeId, span: Span) -> TypeId {
        let ra = self.env.pool_mut().resolve_shallow(a);
        let rb = self.env.pool_mut().resolve_shallow(b);
        if ra == TypeId::NEVER {
            return rb;
        }
        if rb == TypeId::NEVER {
            return ra;
        }
        self.unify_expect(ra, rb, span);
        ra
    }

    fn infer_if_let(
        &mut self,
        pattern: PatternId,
        value: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
        expected: Option<TypeId>,
    ) -> TypeId {
        let value_ty = self.infer_expr(value);
        self.env.push_scope();
        self.check_pattern(pattern, value_ty);
        let then_ty = self.infer_expr_with(then_branch, expected);
        self.env.pop_scope();

        if !else_branch.is_valid() {
            return TypeId::UNIT;
        }
        let else_ty = self.infer_expr_with(else_branch, expected);
        self.join_branches(then_ty, else_ty, self.arena.expr(else_branch).span)
    }

    fn infer_when(
        &mut self,
        scrutinee: ExprId,
        arms: tml_ir::ArmRange,
        expected: Option<TypeId>,
    ) -> TypeId {
        let scrutinee_ty = self.infer_expr(scrutinee);
        let arm_list = self.arena.arm_list(arms).to_vec();
        let mut result = TypeId::NEVER;
        for arm in arm_list {
            self.env.push_scope();
            self.check_pattern(arm.pattern, scrutinee_ty);
            if arm.guard.is_valid() {
                let guard_ty = self.infer_expr_with(arm.guard, Some(TypeId::BOOL));
                self.unify_expect(TypeId::BOOL, guard_ty, self.arena.expr(arm.guard).span);
            }
            let body_ty = self.infer_expr_with(arm.body, expected);
            self.env.pop_scope();
            result = self.join_branches(result, body_ty, arm.span);
        }
        result
    }

    fn infer_loop(&mut self, body: ExprId) -> TypeId {
        let break_ty = self.env.fresh_type_var();
        self.loop_stack.push(LoopCtx {
            break_ty,
            saw_value_break: false,
        });
        self.infer_expr(body);
        let ctx = self
            .loop_stack
            .pop()
            .unwrap_or(LoopCtx {
                break_ty,
                saw_value_break: false,
            });
        if ctx.saw_value_break {
            ctx.break_ty
        } else {
            // No `break value`: the loop never produces one.
            TypeId::NEVER
        }
    }

    fn infer_for(&mut self, pattern: PatternId, iter: ExprId, body: ExprId) -> TypeId {
        let iter_ty = self.infer_expr(iter);
        let iter_ty = self.env.pool_mut().resolve(iter_ty);
        let base_ty = self.strip_refs(iter_ty);

        let element = match self.env.pool().data(base_ty).clone() {
            TypeData::Array { element, .. } | TypeData::Slice(element) => element,
            TypeData::Prim(PrimKind::Str) => TypeId::CHAR,
            TypeData::Named { name, args, .. } => {
                let name_str = self.name_str(name);
                match (&*name_str, args.len()) {
                    ("List" | "Vec" | "HashSet" | "Range", 1) => args[0],
                    _ => {
                        let span = self.arena.expr(iter).span;
                        self.error(
                            ErrorCode::E2001,
                            span,
                            format!("type `{name_str}` is not iterable"),
                        )
                    }
                }
            }
            TypeData::Error => TypeId::ERROR,
            _ => {
                let ty_str = self.display(base_ty);
                let span = self.arena.expr(iter).span;
                self.error(
                    ErrorCode::E2001,
                    span,
                    format!("type `{ty_str}` is not iterable"),
                )
            }
        };

        self.loop_stack.push(LoopCtx {
            break_ty: TypeId::UNIT,
            saw_value_break: false,
        });
        self.env.push_scope();
        self.check_pattern(pattern, element);
        self.infer_expr(body);
        self.env.pop_scope();
        self.loop_stack.pop();
        TypeId::UNIT
    }

    // === Aggregates ===

    fn infer_array(&mut self, elements: tml_ir::ExprRange, expected: Option<TypeId>) -> TypeId {
        let element_ids = self.arena.exprs(elements).to_vec();
        let expected_elem = expected.and_then(|e| {
            let resolved = self.env.pool_mut().resolve_shallow(e);
            match *self.env.pool().data(resolved) {
                TypeData::Array { element, .. } | TypeData::Slice(element) => Some(element),
                _ => None,
            }
        });
        let element_ty = match element_ids.split_first() {
            None => expected_elem.unwrap_or_else(|| self.env.fresh_type_var()),
            Some((&first, rest)) => {
                let first_ty = self.infer_expr_with(first, expected_elem);
                for &elem in rest {
                    let elem_ty = self.infer_expr_with(elem, Some(first_ty));
                    self.unify_expect(first_ty, elem_ty, self.arena.expr(elem).span);
                }
                first_ty
            }
        };
        self.env
            .pool_mut()
            .array(element_ty, tml_types::ArraySize::Fixed(element_ids.len() as u64))
    }

    fn infer_array_repeat(&mut self, elem: ExprId, count: ExprId, span: Span) -> TypeId {
        let element_ty = self.infer_expr(elem);
        let count_ty = self.infer_expr_with(count, Some(TypeId::I64));
        self.unify_expect(TypeId::I64, count_ty, self.arena.expr(count).span);
        let size = match self.arena.expr(count).kind {
            ExprKind::Int(n) if n >= 0 => tml_types::ArraySize::Fixed(n as u64),
            _ => {
                self.error(
                    ErrorCode::E2001,
                    span,
                    "array repeat count must be a constant integer".to_string(),
                );
                tml_types::ArraySize::Fixed(0)
            }
        };
        self.env.pool_mut().array(element_ty, size)
    }

    fn infer_struct_lit(
        &mut self,
        name: Name,
        type_args: tml_ir::ParsedTypeRange,
        fields: tml_ir::FieldInitRange,
        base: ExprId,
        span: Span,
    ) -> TypeId {
        let Some(def) = self.env.lookup_struct(name).cloned() else {
            let known = self.env.all_type_names();
            let interner = self.env.interner().clone();
            let mut diag = Diagnostic::error(ErrorCode::E1002)
                .with_message(format!("unknown struct `{}`", self.name_str(name)))
                .with_label(span, "not found");
            if let Some(suggestion) = suggest::closest_match(name, &known, &interner) {
                diag =
                    diag.with_suggestion(format!("did you mean `{}`?", self.name_str(suggestion)));
            }
            return self.error_diag(diag);
        };

        let mut subst = Subst::default();
        let explicit_args: Vec<TypeId> = self
            .arena
            .parsed_types(type_args)
            .to_vec()
            .iter()
            .map(|&a| self.resolve_type(a))
            .collect();
        if !explicit_args.is_empty() {
            if explicit_args.len() != def.type_params.len() {
                return self.arity_error(def.type_params.len(), explicit_args.len(), span);
            }
            for (&param, &arg) in def.type_params.iter().zip(explicit_args.iter()) {
                subst.insert(param, arg);
            }
        }

        let field_inits = self.arena.field_init_list(fields).to_vec();

        // First pass: infer values and bind type parameters.
        let mut provided = Vec::with_capacity(field_inits.len());
        for init in &field_inits {
            let value_ty = self.infer_expr(init.value);
            if let Some(field_ty) = def.field(init.name) {
                self.env
                    .pool_mut()
                    .match_generic(field_ty, value_ty, &mut subst);
            }
            provided.push((init.name, value_ty, init.span));
        }
        for &param in &def.type_params {
            if !subst.contains_key(&param) {
                let var = self.env.fresh_type_var();
                subst.insert(param, var);
            }
        }

        // Second pass: precise per-field checking.
        for (field_name, value_ty, field_span) in &provided {
            match def.field(*field_name) {
                Some(field_ty) => {
                    let expected = self.env.substitute(field_ty, &subst);
                    self.unify_expect(expected, *value_ty, *field_span);
                }
                None => {
                    let field_str = self.name_str(*field_name);
                    let name_str = self.name_str(name);
                    self.error(
                        ErrorCode::E2008,
                        *field_span,
                        format!("no field `{field_str}` on struct `{name_str}`"),
                    );
                }
            }
        }

        let args: Vec<TypeId> = def.type_params.iter().map(|p| subst[p]).collect();
        let result = self.env.pool_mut().named(name, &args);

        // `..base` supplies the remaining fields; without it they must
        // all be present.
        if base.is_valid() {
            let base_ty = self.infer_expr_with(base, Some(result));
            self.unify_expect(result, base_ty, self.arena.expr(base).span);
        } else {
            for (field_name, _) in &def.fields {
                if !provided.iter().any(|(n, _, _)| n == field_name) {
                    let field_str = self.name_str(*field_name);
                    let name_str = self.name_str(name);
                    self.error(
                        ErrorCode::E2008,
                        span,
                        format!("missing field `{field_str}` in literal of `{name_str}`"),
                    );
                }
            }
        }

        result
    }

    fn infer_cast(&mut self, value: ExprId, target: tml_ir::ParsedTypeId, span: Span) -> TypeId {
        let value_ty = self.infer_expr(value);
        let value_ty = self.env.pool_mut().resolve(value_ty);
        let target_ty = self.resolve_type(target);

        let ok = match (
            self.env.pool().data(value_ty).clone(),
            self.env.pool().data(target_ty).clone(),
        ) {
            (TypeData::Prim(from), TypeData::Prim(to)) => {
                (from.is_numeric() && to.is_numeric())
                    || (from.is_integer() && to == PrimKind::Char)
                    || (from == PrimKind::Char && to.is_integer())
                    || (from == PrimKind::Bool && to.is_integer())
            }
            (TypeData::Ptr { .. }, TypeData::Ptr { .. }) => true,
            (TypeData::Ptr { .. }, TypeData::Prim(to)) => to.is_integer(),
            (TypeData::Prim(from), TypeData::Ptr { .. }) => from.is_integer(),
            (TypeData::Error, _) | (_, TypeData::Error) => true,
            _ => false,
        };
        if !ok {
            let from = self.display(value_ty);
            let to = self.display(target_ty);
            self.error(
                ErrorCode::E2001,
                span,
                format!("invalid cast from `{from}` to `{to}`"),
            );
        }
        target_ty
    }

    fn infer_range(&mut self, start: ExprId, end: ExprId) -> TypeId {
        let element = match (start.is_valid(), end.is_valid()) {
            (true, true) => {
                let start_ty = self.infer_expr(start);
                let end_ty = self.infer_expr_with(end, Some(start_ty));
                self.unify_expect(start_ty, end_ty, self.arena.expr(end).span);
                start_ty
            }
            (true, false) => self.infer_expr(start),
            (false, true) => self.infer_expr(end),
            (false, false) => TypeId::I64,
        };
        let range = self.env.interner().intern("Range");
        self.env.pool_mut().named(range, &[element])
    }

    fn check_formattable(&mut self, ty: TypeId, span: Span) {
        let ty = self.env.pool_mut().resolve(ty);
        let display = self.env.interner().intern("Display");
        let ok = match self.env.pool().data(ty).clone() {
            TypeData::Prim(_) => true,
            TypeData::Named { name, .. } => self.env.type_implements(name, display),
            TypeData::Error | TypeData::Var(_) => true,
            _ => false,
        };
        if !ok {
            let ty_str = self.display(ty);
            self.error(
                ErrorCode::E2001,
                span,
                format!("`{ty_str}` cannot be formatted in an interpolated string"),
            );
        }
    }

    // === Patterns ===

    pub(crate) fn check_pattern(&mut self, id: PatternId, scrutinee: TypeId) {
        let pattern = *self.arena.pattern(id);
        match pattern.kind {
            PatternKind::Wildcard => {}
            PatternKind::Binding { name, is_mut } => {
                self.env.define(name, scrutinee, is_mut, pattern.span);
            }
            PatternKind::Literal(expr) => {
                let literal_ty = self.infer_expr_with(expr, Some(scrutinee));
                self.unify_expect(scrutinee, literal_ty, pattern.span);
            }
            PatternKind::Tuple(sub_patterns) => {
                let sub = self.arena.patterns(sub_patterns).to_vec();
                let resolved = self.env.pool_mut().resolve(scrutinee);
                match self.env.pool().data(resolved).clone() {
                    TypeData::Tuple(elements) if elements.len() == sub.len() => {
                        for (&p, &e) in sub.iter().zip(elements.iter()) {
                            self.check_pattern(p, e);
                        }
                    }
                    TypeData::Var(_) => {
                        let vars: Vec<TypeId> =
                            sub.iter().map(|_| self.env.fresh_type_var()).collect();
                        let tuple = self.env.pool_mut().tuple(&vars);
                        self.unify_expect(tuple, scrutinee, pattern.span);
                        for (&p, &v) in sub.iter().zip(vars.iter()) {
                            self.check_pattern(p, v);
                        }
                    }
                    TypeData::Error => {
                        for &p in &sub {
                            self.check_pattern(p, TypeId::ERROR);
                        }
                    }
                    _ => {
                        let ty_str = self.display(scrutinee);
                        self.error(
                            ErrorCode::E2001,
                            pattern.span,
                            format!("tuple pattern cannot match type `{ty_str}`"),
                        );
                    }
                }
            }
            PatternKind::Variant {
                enum_name,
                variant,
                fields,
            } => self.check_variant_pattern(enum_name, variant, fields, scrutinee, pattern.span),
        }
    }

    fn check_variant_pattern(
        &mut self,
        enum_name: Name,
        variant: Name,
        fields: tml_ir::PatternRange,
        scrutinee: TypeId,
        span: Span,
    ) {
        let resolved = self.env.pool_mut().resolve(scrutinee);
        // Unqualified variant patterns take the enum from the scrutinee.
        let (def_name, scrutinee_args) = match self.env.pool().data(resolved).clone() {
            TypeData::Named { name, args, .. } => (name, args.to_vec()),
            TypeData::Error => return,
            _ if !enum_name.is_empty() => (enum_name, Vec::new()),
            _ => {
                let ty_str = self.display(scrutinee);
                self.error(
                    ErrorCode::E2001,
                    span,
                    format!("variant pattern cannot match type `{ty_str}`"),
                );
                return;
            }
        };

        let Some(def) = self.env.lookup_enum(def_name).cloned() else {
            let name = self.name_str(def_name);
            self.error(ErrorCode::E1002, span, format!("unknown enum `{name}`"));
            return;
        };
        let Some((_, payload)) = def.variant(variant).cloned() else {
            let variant_str = self.name_str(variant);
            let enum_str = self.name_str(def_name);
            self.error(
                ErrorCode::E1006,
                span,
                format!("enum `{enum_str}` has no variant `{variant_str}`"),
            );
            return;
        };

        let sub = self.arena.patterns(fields).to_vec();
        if payload.len() != sub.len() {
            self.arity_error(payload.len(), sub.len(), span);
            return;
        }

        let mut subst = Subst::default();
        for (&param, &arg) in def.type_params.iter().zip(scrutinee_args.iter()) {
            subst.insert(param, arg);
        }
        for (&sub_pattern, &payload_ty) in sub.iter().zip(payload.iter()) {
            let bound = self.env.substitute(payload_ty, &subst);
            self.check_pattern(sub_pattern, bound);
        }
    }
}
