//! Flat arena storage for the AST.
//!
//! All expressions, statements, patterns and parsed types of a module
//! live in contiguous vectors; child references are u32 indices and
//! lists are `(start, len)` ranges into flattened side arrays.
//!
//! # Capacity Limits
//! - Max nodes per kind: 4 billion (`u32::MAX`, the id sentinel)
//! - Max list length: 65,535 (`u16::MAX`)

use crate::ast::{
    Arm, ClosureParam, Expr, FieldInit, InterpPart, ParsedType, Pattern, Stmt,
};
use crate::{
    ArmRange, ExprId, ExprRange, FieldInitRange, InterpPartRange, Name, NameRange, ParamRange,
    ParsedTypeId, ParsedTypeRange, PatternId, PatternRange, StmtId, StmtRange,
};

#[cold]
#[inline(never)]
fn panic_capacity_exceeded(value: usize, context: &str) -> ! {
    panic!("arena capacity exceeded: {context} has {value} elements")
}

#[inline]
fn to_u32(value: usize, context: &str) -> u32 {
    // u32::MAX is reserved for the NONE sentinel.
    if value >= u32::MAX as usize {
        panic_capacity_exceeded(value, context);
    }
    value as u32
}

#[inline]
fn to_u16(value: usize, context: &str) -> u16 {
    u16::try_from(value).unwrap_or_else(|_| panic_capacity_exceeded(value, context))
}

/// Contiguous storage for one module's AST.
#[derive(Clone, Default)]
pub struct AstArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    patterns: Vec<Pattern>,
    parsed_types: Vec<ParsedType>,

    // Flattened lists.
    expr_lists: Vec<ExprId>,
    stmt_lists: Vec<StmtId>,
    pattern_lists: Vec<PatternId>,
    name_lists: Vec<Name>,
    parsed_type_lists: Vec<ParsedTypeId>,
    params: Vec<ClosureParam>,
    field_inits: Vec<FieldInit>,
    arms: Vec<Arm>,
    interp_parts: Vec<InterpPart>,
}

impl AstArena {
    pub fn new() -> Self {
        AstArena::default()
    }

    // === Node allocation ===

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(to_u32(self.exprs.len(), "exprs"));
        self.exprs.push(expr);
        id
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId::new(to_u32(self.stmts.len(), "stmts"));
        self.stmts.push(stmt);
        id
    }

    pub fn alloc_pattern(&mut self, pattern: Pattern) -> PatternId {
        let id = PatternId::new(to_u32(self.patterns.len(), "patterns"));
        self.patterns.push(pattern);
        id
    }

    pub fn alloc_parsed_type(&mut self, ty: ParsedType) -> ParsedTypeId {
        let id = ParsedTypeId::new(to_u32(self.parsed_types.len(), "parsed types"));
        self.parsed_types.push(ty);
        id
    }

    // === Node access ===

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id.index()]
    }

    #[inline]
    pub fn parsed_type(&self, id: ParsedTypeId) -> &ParsedType {
        &self.parsed_types[id.index()]
    }

    /// Number of expressions allocated so far.
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    // === List allocation ===

    pub fn alloc_expr_list(&mut self, items: &[ExprId]) -> ExprRange {
        let start = to_u32(self.expr_lists.len(), "expr lists");
        let len = to_u16(items.len(), "expr list");
        self.expr_lists.extend_from_slice(items);
        ExprRange::new(start, len)
    }

    pub fn alloc_stmt_list(&mut self, items: &[StmtId]) -> StmtRange {
        let start = to_u32(self.stmt_lists.len(), "stmt lists");
        let len = to_u16(items.len(), "stmt list");
        self.stmt_lists.extend_from_slice(items);
        StmtRange::new(start, len)
    }

    pub fn alloc_pattern_list(&mut self, items: &[PatternId]) -> PatternRange {
        let start = to_u32(self.pattern_lists.len(), "pattern lists");
        let len = to_u16(items.len(), "pattern list");
        self.pattern_lists.extend_from_slice(items);
        PatternRange::new(start, len)
    }

    pub fn alloc_name_list(&mut self, items: &[Name]) -> NameRange {
        let start = to_u32(self.name_lists.len(), "name lists");
        let len = to_u16(items.len(), "name list");
        self.name_lists.extend_from_slice(items);
        NameRange::new(start, len)
    }

    pub fn alloc_parsed_type_list(&mut self, items: &[ParsedTypeId]) -> ParsedTypeRange {
        let start = to_u32(self.parsed_type_lists.len(), "parsed type lists");
        let len = to_u16(items.len(), "parsed type list");
        self.parsed_type_lists.extend_from_slice(items);
        ParsedTypeRange::new(start, len)
    }

    pub fn alloc_params(&mut self, items: &[ClosureParam]) -> ParamRange {
        let start = to_u32(self.params.len(), "closure params");
        let len = to_u16(items.len(), "closure param list");
        self.params.extend_from_slice(items);
        ParamRange::new(start, len)
    }

    pub fn alloc_field_inits(&mut self, items: &[FieldInit]) -> FieldInitRange {
        let start = to_u32(self.field_inits.len(), "field inits");
        let len = to_u16(items.len(), "field init list");
        self.field_inits.extend_from_slice(items);
        FieldInitRange::new(start, len)
    }

    pub fn alloc_arms(&mut self, items: &[Arm]) -> ArmRange {
        let start = to_u32(self.arms.len(), "arms");
        let len = to_u16(items.len(), "arm list");
        self.arms.extend_from_slice(items);
        ArmRange::new(start, len)
    }

    pub fn alloc_interp_parts(&mut self, items: &[InterpPart]) -> InterpPartRange {
        let start = to_u32(self.interp_parts.len(), "interp parts");
        let len = to_u16(items.len(), "interp part list");
        self.interp_parts.extend_from_slice(items);
        InterpPartRange::new(start, len)
    }

    // === List access ===

    #[inline]
    pub fn exprs(&self, range: ExprRange) -> &[ExprId] {
        &self.expr_lists[range.as_usize()]
    }

    #[inline]
    pub fn stmts(&self, range: StmtRange) -> &[StmtId] {
        &self.stmt_lists[range.as_usize()]
    }

    #[inline]
    pub fn patterns(&self, range: PatternRange) -> &[PatternId] {
        &self.pattern_lists[range.as_usize()]
    }

    #[inline]
    pub fn names(&self, range: NameRange) -> &[Name] {
        &self.name_lists[range.as_usize()]
    }

    #[inline]
    pub fn parsed_types(&self, range: ParsedTypeRange) -> &[ParsedTypeId] {
        &self.parsed_type_lists[range.as_usize()]
    }

    #[inline]
    pub fn closure_params(&self, range: ParamRange) -> &[ClosureParam] {
        &self.params[range.as_usize()]
    }

    #[inline]
    pub fn field_init_list(&self, range: FieldInitRange) -> &[FieldInit] {
        &self.field_inits[range.as_usize()]
    }

    #[inline]
    pub fn arm_list(&self, range: ArmRange) -> &[Arm] {
        &self.arms[range.as_usize()]
    }

    #[inline]
    pub fn interp_part_list(&self, range: InterpPartRange) -> &[InterpPart] {
        &self.interp_parts[range.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind};
    use crate::Span;

    #[test]
    fn alloc_and_read_back() {
        let mut arena = AstArena::new();
        let a = arena.alloc_expr(Expr::new(ExprKind::Int(1), Span::DUMMY));
        let b = arena.alloc_expr(Expr::new(ExprKind::Int(2), Span::DUMMY));
        assert_ne!(a, b);
        assert_eq!(arena.expr(a).kind, ExprKind::Int(1));
        assert_eq!(arena.expr(b).kind, ExprKind::Int(2));
    }

    #[test]
    fn list_ranges_are_contiguous() {
        let mut arena = AstArena::new();
        let a = arena.alloc_expr(Expr::new(ExprKind::Int(1), Span::DUMMY));
        let b = arena.alloc_expr(Expr::new(ExprKind::Int(2), Span::DUMMY));
        let range = arena.alloc_expr_list(&[a, b]);
        assert_eq!(arena.exprs(range), &[a, b]);
    }

    #[test]
    fn stmt_round_trip() {
        let mut arena = AstArena::new();
        let init = arena.alloc_expr(Expr::new(ExprKind::Int(5), Span::DUMMY));
        let s = arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name: Name::EMPTY,
                is_mut: true,
                ty: ParsedTypeId::NONE,
                init,
            },
            Span::DUMMY,
        ));
        match arena.stmt(s).kind {
            StmtKind::Let { is_mut, init: i, .. } => {
                assert!(is_mut);
                assert_eq!(i, init);
            }
            StmtKind::Expr(_) => panic!("expected let"),
        }
    }
}
