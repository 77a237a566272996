//! Closure typing and capture analysis.
//!
//! Captures are the identifiers used by the body that are not bound by
//! the closure's parameters (or its own locals) and are visible in the
//! enclosing scope. A write or `mut ref` use escalates the
//! capture to mutable; method-call receivers are treated as mutable
//! conservatively, since the receiver may take `mut ref this`.

use rustc_hash::FxHashSet;
use tml_ir::ast::{BinaryOp, ClosureParam, ExprKind, PatternKind, StmtKind, UnaryOp};
use tml_ir::{ExprId, Name, ParamRange, PatternId};
use tml_types::{Capture, TypeId};

use crate::checker::TypeChecker;

impl TypeChecker<'_> {
    pub(crate) fn infer_closure(
        &mut self,
        params: ParamRange,
        body: ExprId,
        expected: Option<TypeId>,
    ) -> TypeId {
        let params: Vec<ClosureParam> = self.arena.closure_params(params).to_vec();

        // Context hints: an expected function/closure type supplies
        // parameter and return hints for unannotated closures.
        let hint = expected.and_then(|e| {
            let resolved = self.env.pool_mut().resolve(e);
            match self.env.pool().data(resolved).clone() {
                tml_types::TypeData::Func { params: p, ret, .. }
                | tml_types::TypeData::Closure { params: p, ret, .. }
                    if p.len() == params.len() =>
                {
                    Some((p.to_vec(), ret))
                }
                _ => None,
            }
        });

        // Captures are resolved against the scopes as they are *now*,
        // before the closure's own scope is pushed.
        let captures = self.collect_captures(&params, body);

        self.env.push_scope();
        let mut param_types = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let ty = if param.ty.is_valid() {
                self.resolve_type(param.ty)
            } else if let Some((ref hints, _)) = hint {
                hints[index]
            } else {
                self.env.fresh_type_var()
            };
            self.env.define(param.name, ty, param.is_mut, param.span);
            param_types.push(ty);
        }

        let ret_hint = hint.map(|(_, ret)| ret);
        let ret = self.infer_expr_with(body, ret_hint);
        self.env.pop_scope();

        self.env.pool_mut().closure(&param_types, ret, captures)
    }

    /// Walk the body collecting free identifiers present in the
    /// enclosing scope.
    pub(crate) fn collect_captures(
        &mut self,
        params: &[ClosureParam],
        body: ExprId,
    ) -> Vec<Capture> {
        let mut bound: FxHashSet<Name> = params.iter().map(|p| p.name).collect();
        let mut captures: Vec<Capture> = Vec::new();
        self.walk_free(body, &mut bound, &mut captures, false);
        captures
    }

    fn capture_use(&mut self, name: Name, needs_mut: bool, captures: &mut Vec<Capture>) {
        let Some(symbol) = self.env.lookup(name) else {
            // Globals (functions, constants from other scopes) are not
            // environment captures.
            return;
        };
        let ty = symbol.ty;
        let mutable = needs_mut && symbol.is_mutable;
        if let Some(existing) = captures.iter_mut().find(|c| c.name == name) {
            existing.is_mut |= mutable;
        } else {
            captures.push(Capture {
                name,
                ty,
                is_mut: mutable,
            });
        }
    }

    fn bind_pattern_names(&self, pattern: PatternId, bound: &mut FxHashSet<Name>) {
        match self.arena.pattern(pattern).kind {
            PatternKind::Wildcard | PatternKind::Literal(_) => {}
            PatternKind::Binding { name, .. } => {
                bound.insert(name);
            }
            PatternKind::Tuple(sub) | PatternKind::Variant { fields: sub, .. } => {
                for &p in self.arena.patterns(sub) {
                    self.bind_pattern_names(p, bound);
                }
            }
        }
    }

    fn walk_free(
        &mut self,
        id: ExprId,
        bound: &mut FxHashSet<Name>,
        captures: &mut Vec<Capture>,
        needs_mut: bool,
    ) {
        if !id.is_valid() {
            return;
        }
        let expr = *self.arena.expr(id);
        match expr.kind {
            ExprKind::Ident(name) => {
                if !bound.contains(&name) {
                    self.capture_use(name, needs_mut, captures);
                }
            }

            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Char(_)
            | ExprKind::Unit
            | ExprKind::Continue
            | ExprKind::Path { .. } => {}

            ExprKind::Binary { op, lhs, rhs } => {
                let writes_lhs = matches!(
                    op,
                    BinaryOp::Assign
                        | BinaryOp::AddAssign
                        | BinaryOp::SubAssign
                        | BinaryOp::MulAssign
                        | BinaryOp::DivAssign
                        | BinaryOp::RemAssign
                );
                self.walk_free(lhs, bound, captures, needs_mut || writes_lhs);
                self.walk_free(rhs, bound, captures, false);
            }
            ExprKind::Unary { op, operand } => {
                self.walk_free(operand, bound, captures, op == UnaryOp::RefMut);
            }

            ExprKind::Call { callee, args } => {
                self.walk_free(callee, bound, captures, false);
                for &arg in self.arena.exprs(args).to_vec().iter() {
                    self.walk_free(arg, bound, captures, false);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                // The method may take `mut ref this`.
                self.walk_free(receiver, bound, captures, true);
                for &arg in self.arena.exprs(args).to_vec().iter() {
                    self.walk_free(arg, bound, captures, false);
                }
            }
            ExprKind::Field { object, .. } => self.walk_free(object, bound, captures, needs_mut),
            ExprKind::Index { object, index } => {
                self.walk_free(object, bound, captures, needs_mut);
                self.walk_free(index, bound, captures, false);
            }

            ExprKind::Block { stmts, tail } => {
                let mut inner = bound.clone();
                for &stmt in self.arena.stmts(stmts).to_vec().iter() {
                    match self.arena.stmt(stmt).kind {
                        StmtKind::Let { name, init, .. } => {
                            self.walk_free(init, &mut inner, captures, false);
                            inner.insert(name);
                        }
                        StmtKind::Expr(e) => self.walk_free(e, &mut inner, captures, false),
                    }
                }
                self.walk_free(tail, &mut inner, captures, false);
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.walk_free(cond, bound, captures, false);
                self.walk_free(then_branch, bound, captures, false);
                self.walk_free(else_branch, bound, captures, false);
            }
            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.walk_free(value, bound, captures, false);
                let mut inner = bound.clone();
                self.bind_pattern_names(pattern, &mut inner);
                self.walk_free(then_branch, &mut inner, captures, false);
                self.walk_free(else_branch, bound, captures, false);
            }
            ExprKind::When { scrutinee, arms } => {
                self.walk_free(scrutinee, bound, captures, false);
                for arm in self.arena.arm_list(arms).to_vec() {
                    let mut inner = bound.clone();
                    self.bind_pattern_names(arm.pattern, &mut inner);
                    self.walk_free(arm.guard, &mut inner, captures, false);
                    self.walk_free(arm.body, &mut inner, captures, false);
                }
            }
            ExprKind::Loop { body } => self.walk_free(body, bound, captures, false),
            ExprKind::While { cond, body } => {
                self.walk_free(cond, bound, captures, false);
                self.walk_free(body, bound, captures, false);
            }
            ExprKind::For {
                pattern,
                iter,
                body,
            } => {
                self.walk_free(iter, bound, captures, false);
                let mut inner = bound.clone();
                self.bind_pattern_names(pattern, &mut inner);
                self.walk_free(body, &mut inner, captures, false);
            }

            ExprKind::Return(value) | ExprKind::Break(value) => {
                self.walk_free(value, bound, captures, false);
            }

            ExprKind::Tuple(elements) | ExprKind::Array(elements) => {
                for &e in self.arena.exprs(elements).to_vec().iter() {
                    self.walk_free(e, bound, captures, false);
                }
            }
            ExprKind::ArrayRepeat { elem, count } => {
                self.walk_free(elem, bound, captures, false);
                self.walk_free(count, bound, captures, false);
            }
            ExprKind::StructLit { fields, base, .. } => {
                for init in self.arena.field_init_list(fields).to_vec() {
                    self.walk_free(init.value, bound, captures, false);
                }
                self.walk_free(base, bound, captures, false);
            }
            ExprKind::Closure { params, body } => {
                // Nested closure: its params shadow; its free uses are
                // still captures of the outer environment.
                let mut inner = bound.clone();
                for param in self.arena.closure_params(params).to_vec() {
                    inner.insert(param.name);
                }
                self.walk_free(body, &mut inner, captures, false);
            }
            ExprKind::Cast { expr: value, .. } => self.walk_free(value, bound, captures, false),
            ExprKind::Range { start, end, .. } => {
                self.walk_free(start, bound, captures, false);
                self.walk_free(end, bound, captures, false);
            }
            ExprKind::InterpStr { parts, .. } => {
                for part in self.arena.interp_part_list(parts).to_vec() {
                    self.walk_free(part.expr, bound, captures, false);
                }
            }
        }
    }
}
