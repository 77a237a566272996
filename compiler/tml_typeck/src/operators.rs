//! Binary and unary operator checking.
//!
//! Arithmetic requires structurally compatible numeric operands; for
//! mixed widths the smaller operand is extended per signedness.
//! Comparison and boolean operators produce `Bool`; assignment requires
//! a place on the left and produces `Unit`.

use tml_diagnostic::ErrorCode;
use tml_ir::ast::{BinaryOp, ExprKind, UnaryOp};
use tml_ir::{ExprId, Span};
use tml_types::{PrimKind, TypeData, TypeId};

use crate::checker::TypeChecker;

impl TypeChecker<'_> {
    pub(crate) fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> TypeId {
        if op.is_assignment() {
            return self.check_assignment(op, lhs, rhs, span);
        }

        let lhs_ty = self.infer_expr(lhs);
        let rhs_ty = self.infer_expr_with(rhs, Some(lhs_ty));

        if op.is_boolean() {
            self.unify_expect(TypeId::BOOL, lhs_ty, self.arena.expr(lhs).span);
            self.unify_expect(TypeId::BOOL, rhs_ty, self.arena.expr(rhs).span);
            return TypeId::BOOL;
        }

        if op.is_comparison() {
            // Operands must agree (numeric widening applies); the result
            // is always Bool.
            self.binary_operand_type(op, lhs_ty, rhs_ty, span);
            return TypeId::BOOL;
        }

        self.binary_operand_type(op, lhs_ty, rhs_ty, span)
    }

    /// The common operand type of a binary operation, applying the
    /// mixed-width extension rule.
    fn binary_operand_type(
        &mut self,
        op: BinaryOp,
        lhs_ty: TypeId,
        rhs_ty: TypeId,
        span: Span,
    ) -> TypeId {
        let lhs_res = self.env.pool_mut().resolve(lhs_ty);
        let rhs_res = self.env.pool_mut().resolve(rhs_ty);

        let lhs_prim = self.env.pool().data(lhs_res).as_prim();
        let rhs_prim = self.env.pool().data(rhs_res).as_prim();

        match (lhs_prim, rhs_prim) {
            (Some(l), Some(r)) => {
                if let Some(joined) = join_numeric(l, r) {
                    // String concatenation and Char/Bool equality ride
                    // through the same-kind case.
                    return TypeId::of_prim(joined);
                }
                if l == r && binary_defined_on(op, l) {
                    return lhs_res;
                }
                let l_str = self.display(lhs_res);
                let r_str = self.display(rhs_res);
                self.error(
                    ErrorCode::E2007,
                    span,
                    format!("operator `{op}` is not defined for `{l_str}` and `{r_str}`"),
                )
            }
            _ => {
                // Inference variables, generics, error recovery: fall
                // back to unification.
                if self.env.pool().data(lhs_res).is_error()
                    || self.env.pool().data(rhs_res).is_error()
                {
                    return TypeId::ERROR;
                }
                self.unify_expect(lhs_res, rhs_res, span);
                lhs_res
            }
        }
    }

    fn check_assignment(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> TypeId {
        // The left side must be a place expression; mutability and
        // borrow conflicts are the borrow checker's to prove.
        let lhs_kind = self.arena.expr(lhs).kind;
        let is_place = matches!(
            lhs_kind,
            ExprKind::Ident(_)
                | ExprKind::Field { .. }
                | ExprKind::Index { .. }
                | ExprKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        );
        if !is_place {
            self.error(
                ErrorCode::E2007,
                span,
                format!("left side of `{op}` is not assignable"),
            );
        }

        let lhs_ty = self.infer_expr(lhs);
        let rhs_ty = self.infer_expr_with(rhs, Some(lhs_ty));
        if op == BinaryOp::Assign {
            self.unify_expect(lhs_ty, rhs_ty, self.arena.expr(rhs).span);
        } else {
            // Compound assignment: the operator itself must be defined.
            self.binary_operand_type(op, lhs_ty, rhs_ty, span);
        }
        TypeId::UNIT
    }

    pub(crate) fn check_unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> TypeId {
        match op {
            UnaryOp::Neg => {
                let ty = self.infer_expr(operand);
                let resolved = self.env.pool_mut().resolve(ty);
                match self.env.pool().data(resolved).as_prim() {
                    Some(kind) if kind.is_numeric() && !kind.is_unsigned_int() => resolved,
                    Some(_) => {
                        let ty_str = self.display(resolved);
                        self.error(
                            ErrorCode::E2007,
                            span,
                            format!("cannot negate a value of type `{ty_str}`"),
                        )
                    }
                    None => {
                        self.unify_expect(TypeId::I64, resolved, span);
                        resolved
                    }
                }
            }
            UnaryOp::Not => {
                let ty = self.infer_expr_with(operand, Some(TypeId::BOOL));
                self.unify_expect(TypeId::BOOL, ty, span);
                TypeId::BOOL
            }
            UnaryOp::Deref => {
                let ty = self.infer_expr(operand);
                let resolved = self.env.pool_mut().resolve(ty);
                let inner = match self.env.pool().data(resolved) {
                    TypeData::Ref { inner, .. } | TypeData::Ptr { inner, .. } => Some(*inner),
                    TypeData::Error => return TypeId::ERROR,
                    _ => None,
                };
                match inner {
                    Some(inner) => inner,
                    None => {
                        let ty_str = self.display(resolved);
                        self.error(
                            ErrorCode::E2007,
                            span,
                            format!("cannot dereference a value of type `{ty_str}`"),
                        )
                    }
                }
            }
            UnaryOp::Ref => {
                let ty = self.infer_expr(operand);
                self.env.pool_mut().reference(false, ty)
            }
            UnaryOp::RefMut => {
                let ty = self.infer_expr(operand);
                self.env.pool_mut().reference(true, ty)
            }
        }
    }
}

/// The mixed-width rule: same class and signedness join to the
/// wider width; everything else is rejected.
fn join_numeric(l: PrimKind, r: PrimKind) -> Option<PrimKind> {
    if l == r && l.is_numeric() {
        return Some(l);
    }
    let wider = |a: PrimKind, b: PrimKind| {
        if a.bit_width() >= b.bit_width() {
            a
        } else {
            b
        }
    };
    if l.is_signed_int() && r.is_signed_int() {
        return Some(wider(l, r));
    }
    if l.is_unsigned_int() && r.is_unsigned_int() {
        return Some(wider(l, r));
    }
    if l.is_float() && r.is_float() {
        return Some(wider(l, r));
    }
    None
}

/// Non-numeric primitive pairs a binary operator still accepts.
fn binary_defined_on(op: BinaryOp, kind: PrimKind) -> bool {
    match kind {
        PrimKind::Str => matches!(op, BinaryOp::Add | BinaryOp::Eq | BinaryOp::Ne),
        PrimKind::Bool | PrimKind::Char => op.is_comparison(),
        _ => false,
    }
}
