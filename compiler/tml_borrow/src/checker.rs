//! Borrow checking for all expression forms.
//!
//! Runs after type checking: each expression category has specific
//! ownership and borrowing rules.
//!
//! | Category  | Expressions              | Rules                                |
//! |-----------|--------------------------|--------------------------------------|
//! | Values    | Literals, tuples, arrays | No borrows, create owned values      |
//! | Variables | Identifiers              | Use requires owned or borrowed state |
//! | Operations| Binary, unary            | `ref` creates a borrow               |
//! | Calls     | Call, method call        | Arguments may move or borrow         |
//! | Access    | Field, index             | May move sub-parts (partial moves)   |
//! | Control   | Block, if, when, loops   | Scopes bound borrow lifetimes        |
//! | Transfer  | Return, break            | Checked for dangling references      |

use rustc_hash::FxHashMap;
use tml_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use tml_ir::ast::{BinaryOp, ExprKind, Function, Module, PatternKind, StmtKind, UnaryOp};
use tml_ir::{AstArena, CancelToken, Cancelled, ExprId, Name, PatternId, Span, StmtId};
use tml_typeck::TypedModule;
use tml_types::{TypeData, TypeEnv, TypeId};

use crate::place::{Place, Projection};
use crate::state::{BorrowEnv, BorrowId, BorrowKind};

/// Borrow check every function body of a checked module. Diagnostics
/// are accumulated per module; cancellation is honoured between
/// functions.
pub fn borrow_check(
    module: &Module,
    arena: &AstArena,
    typed: &TypedModule,
    env: &mut TypeEnv,
    cancel: &CancelToken,
) -> Result<Vec<Diagnostic>, Cancelled> {
    let mut diags = DiagnosticQueue::new();
    for func in &module.functions {
        cancel.checkpoint()?;
        check_one(func, None, arena, typed, env, &mut diags);
    }
    for imp in &module.impls {
        for method in &imp.methods {
            cancel.checkpoint()?;
            check_one(method, Some(imp.type_name), arena, typed, env, &mut diags);
        }
    }
    Ok(diags.take())
}

fn check_one(
    func: &Function,
    impl_type: Option<Name>,
    arena: &AstArena,
    typed: &TypedModule,
    env: &mut TypeEnv,
    diags: &mut DiagnosticQueue,
) {
    if !func.body.is_valid() {
        return;
    }
    tracing::debug!("borrow checking function");

    let sig = match impl_type {
        Some(ty) => {
            let qualified = env.qualify(ty, func.name);
            env.lookup_func(qualified).cloned()
        }
        None => env.lookup_func(func.name).cloned(),
    };

    let mut checker = BorrowChecker {
        arena,
        typed,
        env,
        benv: BorrowEnv::new(),
        diags,
        last_mention: FxHashMap::default(),
        anonymous: Vec::new(),
        loop_depth: 0,
        ret_is_ref: false,
    };
    checker.collect_last_mentions(func.body);

    let param_types: Vec<TypeId> = sig
        .as_ref()
        .map(|s| s.params.clone())
        .unwrap_or_else(|| vec![TypeId::ERROR; func.params.len()]);
    for (param, ty) in func.params.iter().zip(
        param_types
            .into_iter()
            .chain(std::iter::repeat(TypeId::ERROR)),
    ) {
        checker
            .benv
            .define(param.name, ty, param.is_mut, true, param.span);
    }
    checker.ret_is_ref = sig.as_ref().is_some_and(|s| {
        matches!(checker.env.pool().data(s.ret), TypeData::Ref { .. })
    });

    checker.check_expr(func.body);
}

struct BorrowChecker<'a> {
    arena: &'a AstArena,
    typed: &'a TypedModule,
    env: &'a mut TypeEnv,
    benv: BorrowEnv,
    diags: &'a mut DiagnosticQueue,
    /// Last source position mentioning each name (NLL release points).
    last_mention: FxHashMap<Name, u32>,
    /// Anonymous borrows released at the next statement boundary.
    anonymous: Vec<BorrowId>,
    loop_depth: usize,
    ret_is_ref: bool,
}

impl BorrowChecker<'_> {
    // === Pre-pass: last mentions for NLL ===

    fn collect_last_mentions(&mut self, id: ExprId) {
        if !id.is_valid() {
            return;
        }
        let expr = *self.arena.expr(id);
        if let ExprKind::Ident(name) = expr.kind {
            let entry = self.last_mention.entry(name).or_insert(0);
            *entry = (*entry).max(expr.span.start);
        }
        // Children.
        match expr.kind {
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Index {
                object: lhs,
                index: rhs,
            } => {
                self.collect_last_mentions(lhs);
                self.collect_last_mentions(rhs);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { expr: operand, .. } => {
                self.collect_last_mentions(operand);
            }
            ExprKind::Call { callee, args } => {
                self.collect_last_mentions(callee);
                for &arg in self.arena.exprs(args) {
                    self.collect_last_mentions(arg);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.collect_last_mentions(receiver);
                for &arg in self.arena.exprs(args) {
                    self.collect_last_mentions(arg);
                }
            }
            ExprKind::Field { object, .. } => self.collect_last_mentions(object),
            ExprKind::Block { stmts, tail } => {
                for &stmt in self.arena.stmts(stmts) {
                    match self.arena.stmt(stmt).kind {
                        StmtKind::Let { init, .. } => self.collect_last_mentions(init),
                        StmtKind::Expr(e) => self.collect_last_mentions(e),
                    }
                }
                self.collect_last_mentions(tail);
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.collect_last_mentions(cond);
                self.collect_last_mentions(then_branch);
                self.collect_last_mentions(else_branch);
            }
            ExprKind::IfLet {
                value,
                then_branch,
                else_branch,
                ..
            } => {
                self.collect_last_mentions(value);
                self.collect_last_mentions(then_branch);
                self.collect_last_mentions(else_branch);
            }
            ExprKind::When { scrutinee, arms } => {
                self.collect_last_mentions(scrutinee);
                for arm in self.arena.arm_list(arms).to_vec() {
                    self.collect_last_mentions(arm.guard);
                    self.collect_last_mentions(arm.body);
                }
            }
            ExprKind::Loop { body } => self.collect_last_mentions(body),
            ExprKind::While { cond, body } => {
                self.collect_last_mentions(cond);
                self.collect_last_mentions(body);
            }
            ExprKind::For { iter, body, .. } => {
                self.collect_last_mentions(iter);
                self.collect_last_mentions(body);
            }
            ExprKind::Return(value) | ExprKind::Break(value) => {
                self.collect_last_mentions(value);
            }
            ExprKind::Tuple(elements) | ExprKind::Array(elements) => {
                for &e in self.arena.exprs(elements) {
                    self.collect_last_mentions(e);
                }
            }
            ExprKind::ArrayRepeat { elem, count } => {
                self.collect_last_mentions(elem);
                self.collect_last_mentions(count);
            }
            ExprKind::StructLit { fields, base, .. } => {
                for init in self.arena.field_init_list(fields).to_vec() {
                    self.collect_last_mentions(init.value);
                }
                self.collect_last_mentions(base);
            }
            ExprKind::Closure { body, .. } => self.collect_last_mentions(body),
            ExprKind::Range { start, end, .. } => {
                self.collect_last_mentions(start);
                self.collect_last_mentions(end);
            }
            ExprKind::InterpStr { parts, .. } => {
                for part in self.arena.interp_part_list(parts).to_vec() {
                    self.collect_last_mentions(part.expr);
                }
            }
            _ => {}
        }
    }

    // === Shared helpers ===

    fn name_str(&self, name: Name) -> String {
        self.env.interner().lookup(name).to_string()
    }

    fn is_copy(&mut self, id: ExprId) -> bool {
        let ty = self.typed.type_of(id);
        self.env.type_is_copy(ty)
    }

    /// NLL: before any new use or borrow, release borrows whose holder
    /// reference has no further mentions. A holder that is never
    /// mentioned again after creation keeps its borrow to scope end.
    fn apply_nll(&mut self, loc: u32) {
        let last_mention = &self.last_mention;
        let dead: Vec<BorrowId> = self
            .benv
            .borrows()
            .iter()
            .filter(|b| {
                b.holder.is_some_and(|h| {
                    last_mention.get(&h).is_some_and(|&last| last < loc)
                })
            })
            .map(|b| b.id)
            .collect();
        for id in dead {
            self.benv.release_borrow(id);
        }
    }

    /// Decompose an l-value expression into base + projections.
    fn extract_place(&self, id: ExprId) -> Option<Place> {
        match self.arena.expr(id).kind {
            ExprKind::Ident(name) => self.benv.lookup(name).map(Place::base),
            ExprKind::Field { object, field } => {
                let mut place = self.extract_place(object)?;
                place.projections.push(Projection::Field(field));
                Some(place)
            }
            ExprKind::Index { object, .. } => {
                let mut place = self.extract_place(object)?;
                place.projections.push(Projection::Index);
                Some(place)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let mut place = self.extract_place(operand)?;
                place.projections.push(Projection::Deref);
                Some(place)
            }
            _ => None,
        }
    }

    // === Core checks ===

    fn check_can_use(&mut self, place: &Place, span: Span) {
        let state = self.benv.place(place.base).clone();

        if !state.initialized {
            self.diags.push(
                Diagnostic::error(ErrorCode::E3004)
                    .with_message(format!(
                        "use of possibly-uninitialized variable `{}`",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "used here before initialization")
                    .with_secondary(state.decl_span, "declared here without a value"),
            );
            return;
        }

        if let Some(moved_at) = state.moved {
            let copy = {
                let ty = state.ty;
                self.env.type_is_copy(ty)
            };
            if !copy {
                self.diags.push(
                    Diagnostic::error(ErrorCode::E3001)
                        .with_message(format!(
                            "use of moved value `{}`",
                            self.name_str(state.name)
                        ))
                        .with_label(span, "value used here after move")
                        .with_secondary(moved_at, "value moved here"),
                );
                return;
            }
        }

        // Partial moves: a moved field blocks itself and the whole.
        if let Some(field) = place.first_field() {
            if let Some(&moved_at) = state.moved_fields.get(&field) {
                self.diags.push(
                    Diagnostic::error(ErrorCode::E3006)
                        .with_message(format!(
                            "use of moved field `{}.{}`",
                            self.name_str(state.name),
                            self.name_str(field)
                        ))
                        .with_label(span, "field used here after move")
                        .with_secondary(moved_at, "field moved here"),
                );
                return;
            }
        } else if place.projections.is_empty() && !state.moved_fields.is_empty() {
            let fields: Vec<String> = state
                .moved_fields
                .keys()
                .map(|&f| self.name_str(f))
                .collect();
            self.diags.push(
                Diagnostic::error(ErrorCode::E3006)
                    .with_message(format!(
                        "use of partially moved value `{}`",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "value used here after partial move")
                    .with_note(format!("moved field(s): {}", fields.join(", "))),
            );
            return;
        }

        // Reading through a live shared borrow is fine; an *active*
        // mutable borrow excludes all other access.
        let conflict = self
            .benv
            .borrows_of(place)
            .find(|b| b.kind == BorrowKind::MutableActive)
            .map(|b| b.created_span);
        if let Some(borrow_span) = conflict {
            self.diags.push(
                Diagnostic::error(ErrorCode::E3002)
                    .with_message(format!(
                        "cannot use `{}` while it is mutably borrowed",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "use occurs here")
                    .with_secondary(borrow_span, "mutable borrow created here"),
            );
        }
    }

    fn check_can_mutate(&mut self, place: &Place, span: Span) {
        let state = self.benv.place(place.base).clone();

        if !state.is_mut && state.initialized {
            self.diags.push(
                Diagnostic::error(ErrorCode::E3003)
                    .with_message(format!(
                        "cannot assign to `{}`: not declared mutable",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "assignment here")
                    .with_secondary(state.decl_span, "binding declared here")
                    .with_suggestion(format!(
                        "declare it as `let mut {}`",
                        self.name_str(state.name)
                    )),
            );
            return;
        }

        // Assignment conflicts with every live borrow, shared included.
        let conflict = self
            .benv
            .borrows_of(place)
            .next()
            .map(|b| (b.kind, b.created_span));
        if let Some((kind, borrow_span)) = conflict {
            let what = if kind.is_mutable() { "mutably " } else { "" };
            self.diags.push(
                Diagnostic::error(ErrorCode::E3002)
                    .with_message(format!(
                        "cannot assign to `{}` while it is {what}borrowed",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "assignment here")
                    .with_secondary(borrow_span, "borrow created here"),
            );
            return;
        }

        // Assignment (re)initializes the assigned path.
        let state = self.benv.place_mut(place.base);
        match place.first_field() {
            Some(field) => {
                state.moved_fields.remove(&field);
            }
            None => {
                state.initialized = true;
                state.moved = None;
                state.moved_fields.clear();
            }
        }
    }

    fn check_can_borrow(&mut self, place: &Place, kind: BorrowKind, span: Span) {
        let state = self.benv.place(place.base).clone();
        if kind.is_mutable() && !state.is_mut {
            self.diags.push(
                Diagnostic::error(ErrorCode::E3003)
                    .with_message(format!(
                        "cannot borrow `{}` as mutable: not declared mutable",
                        self.name_str(state.name)
                    ))
                    .with_label(span, "mutable borrow here")
                    .with_secondary(state.decl_span, "binding declared here"),
            );
            return;
        }
        let conflict = self
            .benv
            .borrows_of(place)
            .find(|b| {
                if kind.is_mutable() {
                    // A new mutable borrow conflicts with everything.
                    true
                } else {
                    // A new shared borrow conflicts only with an active
                    // mutable borrow; reservations admit it.
                    b.kind == BorrowKind::MutableActive
                }
            })
            .map(|b| (b.kind, b.created_span));
        if let Some((existing, borrow_span)) = conflict {
            let existing_str = if existing.is_mutable() {
                "mutable"
            } else {
                "shared"
            };
            let new_str = if kind.is_mutable() { "mutable" } else { "shared" };
            self.diags.push(
                Diagnostic::error(ErrorCode::E3002)
                    .with_message(format!(
                        "cannot create a {new_str} borrow of `{}`: conflicting {existing_str} borrow is live",
                        self.name_str(state.name)
                    ))
                    .with_label(span, format!("{new_str} borrow here"))
                    .with_secondary(borrow_span, format!("{existing_str} borrow created here")),
            );
        }
    }

    /// Mark a value context: moves the place (or its field) unless the
    /// type is Copy-like.
    fn consume_expr(&mut self, id: ExprId) {
        if !id.is_valid() {
            return;
        }
        let expr = *self.arena.expr(id);
        match expr.kind {
            ExprKind::Ident(name) => {
                self.check_expr(id);
                if !self.is_copy(id) {
                    if let Some(place) = self.benv.lookup(name) {
                        self.benv.place_mut(place).moved = Some(expr.span);
                    }
                }
            }
            ExprKind::Field { object, field } => {
                self.check_expr(id);
                if !self.is_copy(id) {
                    // Partial move of a directly named base.
                    if let Some(place) = self.extract_place(object) {
                        if place.projections.is_empty() {
                            self.benv
                                .place_mut(place.base)
                                .moved_fields
                                .insert(field, expr.span);
                        }
                    }
                }
            }
            _ => self.check_expr(id),
        }
    }

    // === Expression dispatch ===

    fn check_expr(&mut self, id: ExprId) {
        if !id.is_valid() {
            return;
        }
        let expr = *self.arena.expr(id);
        let span = expr.span;
        match expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Char(_)
            | ExprKind::Unit
            | ExprKind::Path { .. }
            | ExprKind::Continue => {}

            ExprKind::Ident(name) => self.check_ident(name, span),

            ExprKind::Binary { op, lhs, rhs } => self.check_binary(op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => self.check_unary(op, operand, span),

            ExprKind::Call { callee, args } => {
                self.check_expr(callee);
                for &arg in self.arena.exprs(args).to_vec().iter() {
                    self.check_arg(arg);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.check_method_call(id, receiver, args, span);
            }

            ExprKind::Field { object, .. } => {
                // The base is only touched through this projection:
                // checking the projected place keeps disjoint fields
                // independent and does not trip the whole-value
                // partial-move rule.
                match self.extract_place(id) {
                    Some(place) => {
                        self.apply_nll(span.start);
                        self.check_can_use(&place, span);
                    }
                    None => self.check_expr(object),
                }
            }
            ExprKind::Index { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
            }

            ExprKind::Block { stmts, tail } => {
                self.benv.push_scope();
                for &stmt in self.arena.stmts(stmts).to_vec().iter() {
                    self.check_stmt(stmt);
                    self.release_anonymous();
                }
                self.check_expr(tail);
                self.benv.pop_scope();
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond);
                self.check_expr(then_branch);
                self.check_expr(else_branch);
            }
            ExprKind::IfLet {
                pattern,
                value,
                then_branch,
                else_branch,
            } => {
                self.check_expr(value);
                self.benv.push_scope();
                self.bind_pattern(pattern);
                self.check_expr(then_branch);
                self.benv.pop_scope();
                self.check_expr(else_branch);
            }
            ExprKind::When { scrutinee, arms } => {
                self.check_expr(scrutinee);
                for arm in self.arena.arm_list(arms).to_vec() {
                    self.benv.push_scope();
                    self.bind_pattern(arm.pattern);
                    self.check_expr(arm.guard);
                    self.check_expr(arm.body);
                    self.benv.pop_scope();
                }
            }
            ExprKind::Loop { body } => {
                self.loop_depth += 1;
                self.benv.push_scope();
                self.check_expr(body);
                self.benv.pop_scope();
                self.loop_depth -= 1;
            }
            ExprKind::While { cond, body } => {
                self.check_expr(cond);
                self.loop_depth += 1;
                self.benv.push_scope();
                self.check_expr(body);
                self.benv.pop_scope();
                self.loop_depth -= 1;
            }
            ExprKind::For {
                pattern,
                iter,
                body,
            } => {
                self.check_expr(iter);
                self.loop_depth += 1;
                self.benv.push_scope();
                self.bind_pattern(pattern);
                self.check_expr(body);
                self.benv.pop_scope();
                self.loop_depth -= 1;
            }

            ExprKind::Return(value) => self.check_return(value, span),
            ExprKind::Break(value) => self.check_expr(value),

            ExprKind::Tuple(elements) | ExprKind::Array(elements) => {
                for &e in self.arena.exprs(elements).to_vec().iter() {
                    self.consume_expr(e);
                }
            }
            ExprKind::ArrayRepeat { elem, count } => {
                self.consume_expr(elem);
                self.check_expr(count);
            }
            ExprKind::StructLit { fields, base, .. } => {
                for init in self.arena.field_init_list(fields).to_vec() {
                    self.consume_expr(init.value);
                }
                // `..base` moves the remaining fields of the base.
                if base.is_valid() {
                    self.consume_expr(base);
                }
            }
            ExprKind::Closure { params, body } => {
                self.check_closure(id, params, body);
            }
            ExprKind::Cast { expr: value, .. } => self.check_expr(value),
            ExprKind::Range { start, end, .. } => {
                self.check_expr(start);
                self.check_expr(end);
            }
            ExprKind::InterpStr { parts, .. } => {
                for part in self.arena.interp_part_list(parts).to_vec() {
                    self.check_expr(part.expr);
                }
            }
        }
    }

    fn check_ident(&mut self, name: Name, span: Span) {
        let Some(place) = self.benv.lookup(name) else {
            // Not a local binding: functions and globals are not the
            // borrow checker's concern.
            return;
        };
        self.apply_nll(span.start);
        self.check_can_use(&Place::base(place), span);
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) {
        if op.is_assignment() {
            self.consume_expr(rhs);
            if let Some(place) = self.extract_place(lhs) {
                self.apply_nll(span.start);
                self.check_can_mutate(&place, span);
            }
            return;
        }
        self.check_expr(lhs);
        self.check_expr(rhs);
    }

    fn check_unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) {
        self.check_expr(operand);
        if matches!(op, UnaryOp::Ref | UnaryOp::RefMut) {
            self.apply_nll(span.start);
            let kind = if op == UnaryOp::RefMut {
                BorrowKind::MutableActive
            } else {
                BorrowKind::Shared
            };
            if let Some(place) = self.extract_place(operand) {
                self.check_can_borrow(&place, kind, span);
                // Anonymous borrow: the enclosing `let` adopts it as a
                // named borrow, otherwise it dies at the statement end.
                let id = self.benv.create_borrow(place, kind, None, span);
                self.anonymous.push(id);
            }
        }
    }

    fn check_arg(&mut self, arg: ExprId) {
        // `ref x` arguments borrow; everything else is passed by value
        // and may move.
        match self.arena.expr(arg).kind {
            ExprKind::Unary {
                op: UnaryOp::Ref | UnaryOp::RefMut,
                ..
            } => self.check_expr(arg),
            _ => self.consume_expr(arg),
        }
    }

    /// Two-phase borrows: reserve the receiver borrow before
    /// argument evaluation, activate at the call, release after.
    fn check_method_call(
        &mut self,
        call_id: ExprId,
        receiver: ExprId,
        args: tml_ir::ExprRange,
        span: Span,
    ) {
        self.check_expr(receiver);

        // The receiver's declared mutability comes from the resolved
        // signature's first parameter.
        let receiver_mut = self
            .typed
            .call_targets
            .get(&call_id)
            .and_then(|target| target.sig.params.first())
            .is_some_and(|&p| matches!(self.env.pool().data(p), TypeData::Ref { is_mut: true, .. }));

        let reservation = self.extract_place(receiver).map(|place| {
            self.apply_nll(span.start);
            let kind = if receiver_mut {
                BorrowKind::MutableReserved
            } else {
                BorrowKind::Shared
            };
            self.check_can_borrow(&place, kind, span);
            (self.benv.create_borrow(place.clone(), kind, None, span), place)
        });

        for &arg in self.arena.exprs(args).to_vec().iter() {
            self.check_arg(arg);
        }

        if let Some((borrow, place)) = reservation {
            // Activation: the reservation becomes a real mutable borrow;
            // by now argument-transient borrows have been released, and
            // anything still live conflicts per the normal rules.
            self.benv.activate(borrow);
            if receiver_mut {
                let conflict = self
                    .benv
                    .borrows_of(&place)
                    .find(|b| b.id != borrow)
                    .map(|b| b.created_span);
                if let Some(borrow_span) = conflict {
                    let name = self.benv.place(place.base).name;
                    self.diags.push(
                        Diagnostic::error(ErrorCode::E3002)
                            .with_message(format!(
                                "cannot mutably borrow `{}` for the call: another borrow is live",
                                self.name_str(name)
                            ))
                            .with_label(span, "mutable borrow activates here")
                            .with_secondary(borrow_span, "other borrow created here"),
                    );
                }
            }
            self.benv.release_borrow(borrow);
        }
    }

    fn check_stmt(&mut self, id: StmtId) {
        let stmt = *self.arena.stmt(id);
        match stmt.kind {
            StmtKind::Let {
                name,
                is_mut,
                init,
                ..
            } => {
                let initialized = init.is_valid();
                let init_is_borrow = initialized
                    && matches!(
                        self.arena.expr(init).kind,
                        ExprKind::Unary {
                            op: UnaryOp::Ref | UnaryOp::RefMut,
                            ..
                        }
                    );
                if initialized {
                    if init_is_borrow {
                        self.check_expr(init);
                    } else {
                        self.consume_expr(init);
                    }
                }
                let ty = if initialized {
                    self.typed.type_of(init)
                } else {
                    TypeId::ERROR
                };
                let place = self.benv.define(name, ty, is_mut, initialized, stmt.span);

                // A `ref`/`mut ref` initializer: the binding adopts the
                // borrow, which then lives until the binding's last use
                // (NLL) or scope end.
                if init_is_borrow {
                    if let ExprKind::Unary { operand, .. } = self.arena.expr(init).kind {
                        if let Some(target) = self.extract_place(operand) {
                            self.benv.place_mut(place).points_at = Some(target.base);
                        }
                    }
                    if let Some(borrow) = self.anonymous.pop() {
                        self.adopt_borrow(borrow, name);
                    }
                }
            }
            StmtKind::Expr(expr) => self.check_expr(expr),
        }
    }

    /// The anonymous borrow created by a `ref` initializer becomes held
    /// by the new binding. (Its id was already popped from the
    /// anonymous list, so statement-end release no longer touches it.)
    fn adopt_borrow(&mut self, id: BorrowId, holder: Name) {
        let Some(existing) = self.benv.borrows().iter().find(|b| b.id == id).cloned() else {
            return;
        };
        self.benv.release_borrow(id);
        self.benv
            .create_borrow(existing.place, existing.kind, Some(holder), existing.created_span);
    }

    fn release_anonymous(&mut self) {
        for id in std::mem::take(&mut self.anonymous) {
            self.benv.release_borrow(id);
        }
    }

    fn check_return(&mut self, value: ExprId, span: Span) {
        if !value.is_valid() {
            return;
        }
        self.check_expr(value);

        // Dangling references: returning a borrow of a local.
        let dangling = match self.arena.expr(value).kind {
            ExprKind::Unary {
                op: UnaryOp::Ref | UnaryOp::RefMut,
                operand,
            } => self.extract_place(operand).map(|p| p.base),
            ExprKind::Ident(name) => self
                .benv
                .lookup(name)
                .and_then(|p| self.benv.place(p).points_at),
            _ => None,
        };
        if self.ret_is_ref {
            if let Some(target) = dangling {
                let target_name = self.benv.place(target).name;
                let target_span = self.benv.place(target).decl_span;
                self.diags.push(
                    Diagnostic::error(ErrorCode::E3005)
                        .with_message(format!(
                            "returning a reference to local variable `{}`",
                            self.name_str(target_name)
                        ))
                        .with_label(span, "reference to a local escapes the function")
                        .with_secondary(target_span, "local declared here")
                        .with_note("the local is dropped when the function returns"),
                );
            }
        }

        // A closure that borrows its environment cannot escape: a
        // returned closure must own its captures.
        let value_ty = self.typed.type_of(value);
        if let TypeData::Closure { captures, .. } = self.env.pool().data(value_ty) {
            if !captures.is_empty() {
                let names: Vec<String> = captures
                    .iter()
                    .map(|c| self.env.interner().lookup(c.name).to_string())
                    .collect();
                self.diags.push(
                    Diagnostic::error(ErrorCode::E3007)
                        .with_message(
                            "closure borrowing its environment cannot escape the function",
                        )
                        .with_label(span, "returned here")
                        .with_note(format!("captured: {}", names.join(", "))),
                );
            }
        }
    }

    fn check_closure(&mut self, closure_id: ExprId, params: tml_ir::ParamRange, body: ExprId) {
        // Captured places must be live at closure creation; mutable
        // captures require mutable bindings.
        let closure_ty = self.typed.type_of(closure_id);
        let captures = match self.env.pool().data(closure_ty) {
            TypeData::Closure { captures, .. } => captures.to_vec(),
            _ => Vec::new(),
        };
        let span = self.arena.expr(closure_id).span;
        for capture in captures {
            if let Some(place) = self.benv.lookup(capture.name) {
                self.apply_nll(span.start);
                self.check_can_use(&Place::base(place), span);
            }
        }

        self.benv.push_scope();
        for param in self.arena.closure_params(params).to_vec() {
            self.benv
                .define(param.name, TypeId::ERROR, param.is_mut, true, param.span);
        }
        self.check_expr(body);
        self.benv.pop_scope();
    }

    fn bind_pattern(&mut self, id: PatternId) {
        let pattern = *self.arena.pattern(id);
        match pattern.kind {
            PatternKind::Wildcard | PatternKind::Literal(_) => {}
            PatternKind::Binding { name, is_mut } => {
                self.benv
                    .define(name, TypeId::ERROR, is_mut, true, pattern.span);
            }
            PatternKind::Tuple(sub) | PatternKind::Variant { fields: sub, .. } => {
                for &p in self.arena.patterns(sub).to_vec().iter() {
                    self.bind_pattern(p);
                }
            }
        }
    }
}
