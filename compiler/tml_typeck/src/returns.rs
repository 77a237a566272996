//! Return-path audit.
//!
//! A non-Unit function must produce a value on every path: an explicit
//! `return`, a trailing tail expression, or divergence. The
//! audit is structural; type agreement is checked separately.

use tml_diagnostic::{Diagnostic, ErrorCode};
use tml_ir::ast::{ExprKind, Function, StmtKind};
use tml_ir::ExprId;
use tml_types::TypeId;

use crate::checker::TypeChecker;

impl TypeChecker<'_> {
    /// True when evaluating `id` always produces a value (or diverges)
    /// rather than falling through with Unit.
    pub(crate) fn expr_guarantees_value(&self, id: ExprId) -> bool {
        let expr = self.arena.expr(id);
        match expr.kind {
            ExprKind::Return(_) | ExprKind::Break(_) | ExprKind::Continue => true,

            ExprKind::Block { stmts, tail } => {
                let diverging_stmt = self.arena.stmts(stmts).iter().any(|&s| {
                    match self.arena.stmt(s).kind {
                        StmtKind::Expr(e) => self.expr_diverges(e),
                        StmtKind::Let { init, .. } => self.expr_diverges(init),
                    }
                });
                diverging_stmt || (tail.is_valid() && self.expr_guarantees_value(tail))
            }

            ExprKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                else_branch.is_valid()
                    && self.expr_guarantees_value(then_branch)
                    && self.expr_guarantees_value(else_branch)
            }

            ExprKind::IfLet {
                then_branch,
                else_branch,
                ..
            } => {
                else_branch.is_valid()
                    && self.expr_guarantees_value(then_branch)
                    && self.expr_guarantees_value(else_branch)
            }

            ExprKind::When { arms, .. } => {
                let arms = self.arena.arm_list(arms);
                !arms.is_empty()
                    && arms.iter().all(|arm| self.expr_guarantees_value(arm.body))
            }

            // An infinite loop diverges; one with `break value` produces
            // the break value. Either way control does not fall through
            // with Unit.
            ExprKind::Loop { .. } => true,

            ExprKind::While { .. } | ExprKind::For { .. } | ExprKind::Unit => false,

            _ => true,
        }
    }

    /// Divergence by recorded type: `return`/`break`/infinite loops
    /// check as `Never`.
    fn expr_diverges(&self, id: ExprId) -> bool {
        self.expr_types.get(id.index()).copied() == Some(TypeId::NEVER)
    }

    /// Report the missing-return structural error.
    pub(crate) fn report_missing_return(&mut self, func: &Function, ret: TypeId) {
        let name = self.name_str(func.name);
        let ret_str = self.display(ret);
        let diag = Diagnostic::error(ErrorCode::E2009)
            .with_message(format!(
                "function `{name}` returns `{ret_str}` but not all paths return a value"
            ))
            .with_label(func.span, "missing return on some path")
            .with_suggestion("add a `return` or a trailing expression to every path");
        self.error_diag(diag);
    }
}
