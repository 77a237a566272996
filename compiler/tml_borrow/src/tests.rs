//! Borrow-checker tests over programmatically built ASTs.

use pretty_assertions::assert_eq;
use tml_diagnostic::{Diagnostic, ErrorCode};
use tml_ir::ast::{
    BinaryOp, Expr, ExprKind, FieldDecl, Function, Module, ParsedType, ParsedTypeKind, Stmt,
    StmtKind, StructDecl, UnaryOp,
};
use tml_ir::{AstArena, CancelToken, ExprId, Name, ParsedTypeId, SharedInterner, Span, StmtId};

use crate::borrow_check;

struct Builder {
    arena: AstArena,
    interner: SharedInterner,
    next_pos: u32,
}

impl Builder {
    fn new() -> Self {
        Builder {
            arena: AstArena::new(),
            interner: SharedInterner::new(),
            next_pos: 0,
        }
    }

    fn span(&mut self) -> Span {
        let start = self.next_pos;
        self.next_pos += 4;
        Span::new(start, start + 3)
    }

    fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    fn expr(&mut self, kind: ExprKind) -> ExprId {
        let span = self.span();
        self.arena.alloc_expr(Expr::new(kind, span))
    }

    fn int(&mut self, value: i64) -> ExprId {
        self.expr(ExprKind::Int(value))
    }

    fn string(&mut self, value: &str) -> ExprId {
        let name = self.name(value);
        self.expr(ExprKind::Str(name))
    }

    fn ident(&mut self, name: &str) -> ExprId {
        let name = self.name(name);
        self.expr(ExprKind::Ident(name))
    }

    fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.expr(ExprKind::Unary { op, operand })
    }

    fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr(ExprKind::Binary {
            op: BinaryOp::Assign,
            lhs,
            rhs,
        })
    }

    fn field(&mut self, object: ExprId, name: &str) -> ExprId {
        let field = self.name(name);
        self.expr(ExprKind::Field { object, field })
    }

    fn call_named(&mut self, name: &str, args: &[ExprId]) -> ExprId {
        let callee = self.ident(name);
        let args = self.arena.alloc_expr_list(args);
        self.expr(ExprKind::Call { callee, args })
    }

    fn call_path(&mut self, base: &str, member: &str, args: &[ExprId]) -> ExprId {
        let segments = [self.name(base), self.name(member)];
        let segments = self.arena.alloc_name_list(&segments);
        let callee = self.expr(ExprKind::Path { segments });
        let args = self.arena.alloc_expr_list(args);
        self.expr(ExprKind::Call { callee, args })
    }

    fn method(&mut self, receiver: ExprId, name: &str, args: &[ExprId]) -> ExprId {
        let method = self.name(name);
        let args = self.arena.alloc_expr_list(args);
        self.expr(ExprKind::MethodCall {
            receiver,
            method,
            args,
        })
    }

    fn let_stmt(&mut self, name: &str, is_mut: bool, init: ExprId) -> StmtId {
        let name = self.name(name);
        let span = self.span();
        self.arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name,
                is_mut,
                ty: ParsedTypeId::NONE,
                init,
            },
            span,
        ))
    }

    fn let_typed(&mut self, name: &str, is_mut: bool, ty: ParsedTypeId, init: ExprId) -> StmtId {
        let name = self.name(name);
        let span = self.span();
        self.arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name,
                is_mut,
                ty,
                init,
            },
            span,
        ))
    }

    fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        let span = self.span();
        self.arena.alloc_stmt(Stmt::new(StmtKind::Expr(expr), span))
    }

    fn block(&mut self, stmts: &[StmtId], tail: ExprId) -> ExprId {
        let stmts = self.arena.alloc_stmt_list(stmts);
        self.expr(ExprKind::Block { stmts, tail })
    }

    fn named_type(&mut self, name: &str) -> ParsedTypeId {
        let segments = [self.name(name)];
        let segments = self.arena.alloc_name_list(&segments);
        let span = self.span();
        self.arena.alloc_parsed_type(ParsedType::new(
            ParsedTypeKind::Named {
                segments,
                args: tml_ir::ParsedTypeRange::EMPTY,
            },
            span,
        ))
    }

    fn ref_type(&mut self, inner: ParsedTypeId) -> ParsedTypeId {
        let span = self.span();
        self.arena.alloc_parsed_type(ParsedType::new(
            ParsedTypeKind::Ref {
                is_mut: false,
                inner,
            },
            span,
        ))
    }

    fn main_fn(&mut self, body: ExprId) -> Function {
        Function {
            name: self.name("main"),
            type_params: Vec::new(),
            const_params: Vec::new(),
            params: Vec::new(),
            ret: ParsedTypeId::NONE,
            where_clauses: Vec::new(),
            decorators: Vec::new(),
            is_async: false,
            body,
            span: self.span(),
        }
    }

    fn run(self, module: &Module) -> Vec<Diagnostic> {
        let cancel = CancelToken::new();
        let result =
            tml_typeck::type_check(module, &self.arena, self.interner.clone(), &cancel)
                .unwrap_or_else(|_| panic!("not cancelled"));
        assert!(
            !result.has_errors(),
            "type errors before borrow check: {:?}",
            result.diagnostics
        );
        let mut env = result.env;
        borrow_check(module, &self.arena, &result.typed, &mut env, &cancel)
            .unwrap_or_else(|_| panic!("not cancelled"))
    }
}

fn codes(diags: &[Diagnostic]) -> Vec<ErrorCode> {
    diags.iter().map(|d| d.code).collect()
}

#[test]
fn assignment_while_mutably_borrowed_conflicts() {
    // let mut x = 1; let r = mut ref x; x = 2
    let mut b = Builder::new();
    let one = b.int(1);
    let let_x = b.let_stmt("x", true, one);
    let x1 = b.ident("x");
    let borrow = b.unary(UnaryOp::RefMut, x1);
    let let_r = b.let_stmt("r", false, borrow);
    let x2 = b.ident("x");
    let two = b.int(2);
    let assign = b.assign(x2, two);
    let s3 = b.expr_stmt(assign);
    let body = b.block(&[let_x, let_r, s3], ExprId::NONE);
    let func = b.main_fn(body);

    let borrow_span = b.arena.expr(borrow).span;
    let assign_span = b.arena.expr(assign).span;

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3002]);
    // Primary span covers the assignment, secondary covers the borrow.
    assert_eq!(diags[0].span(), Some(assign_span));
    assert_eq!(diags[0].secondary[0].span, borrow_span);
}

#[test]
fn two_phase_borrow_accepts_push_of_len() {
    // let mut v = List::new(); v.push(v.len())
    let mut b = Builder::new();
    let new_call = b.call_path("List", "new", &[]);
    let let_v = b.let_stmt("v", true, new_call);
    let v_inner = b.ident("v");
    let len = b.method(v_inner, "len", &[]);
    let v_outer = b.ident("v");
    let push = b.method(v_outer, "push", &[len]);
    let s = b.expr_stmt(push);
    let body = b.block(&[let_v, s], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![]);
}

#[test]
fn use_after_move_is_rejected() {
    // let s = "hello"; let t = s; println(s)
    let mut b = Builder::new();
    let lit = b.string("hello");
    let let_s = b.let_stmt("s", false, lit);
    let s1 = b.ident("s");
    let let_t = b.let_stmt("t", false, s1);
    let s2 = b.ident("s");
    let print = b.call_named("println", &[s2]);
    let stmt = b.expr_stmt(print);
    let body = b.block(&[let_s, let_t, stmt], ExprId::NONE);
    let func = b.main_fn(body);

    let move_span = b.arena.expr(s1).span;

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3001]);
    assert_eq!(diags[0].secondary[0].span, move_span);
}

#[test]
fn partial_move_blocks_moved_field_only() {
    // struct Pair { a: Str, b: Str }
    // let p = Pair { a: "x", b: "y" }; let s = p.a;
    // println(p.b);   // ok
    // println(p.a);   // error
    let mut b = Builder::new();
    let str_ty = b.named_type("Str");
    let pair = StructDecl {
        name: b.name("Pair"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        fields: vec![
            FieldDecl {
                name: b.name("a"),
                ty: str_ty,
                span: Span::DUMMY,
            },
            FieldDecl {
                name: b.name("b"),
                ty: str_ty,
                span: Span::DUMMY,
            },
        ],
        decorators: Vec::new(),
        span: Span::DUMMY,
    };

    let ax = b.string("x");
    let by = b.string("y");
    let a_name = b.name("a");
    let b_name = b.name("b");
    let fields = b.arena.alloc_field_inits(&[
        tml_ir::ast::FieldInit {
            name: a_name,
            value: ax,
            span: Span::DUMMY,
        },
        tml_ir::ast::FieldInit {
            name: b_name,
            value: by,
            span: Span::DUMMY,
        },
    ]);
    let pair_name = b.name("Pair");
    let lit = b.expr(ExprKind::StructLit {
        name: pair_name,
        type_args: tml_ir::ParsedTypeRange::EMPTY,
        fields,
        base: ExprId::NONE,
    });
    let let_p = b.let_stmt("p", false, lit);

    let p1 = b.ident("p");
    let pa = b.field(p1, "a");
    let let_s = b.let_stmt("s", false, pa);

    let p2 = b.ident("p");
    let pb = b.field(p2, "b");
    let ok_print = b.call_named("println", &[pb]);
    let s_ok = b.expr_stmt(ok_print);

    let p3 = b.ident("p");
    let pa2 = b.field(p3, "a");
    let bad_print = b.call_named("println", &[pa2]);
    let s_bad = b.expr_stmt(bad_print);

    let body = b.block(&[let_p, let_s, s_ok, s_bad], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.structs.push(pair);
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3006]);
}

#[test]
fn nll_releases_borrow_after_last_use() {
    // let mut x = 1; let r = ref x; let y = r; x = 2   (accepted)
    let mut b = Builder::new();
    let one = b.int(1);
    let let_x = b.let_stmt("x", true, one);
    let x1 = b.ident("x");
    let borrow = b.unary(UnaryOp::Ref, x1);
    let let_r = b.let_stmt("r", false, borrow);
    let r_use = b.ident("r");
    let let_y = b.let_stmt("y", false, r_use);
    let x2 = b.ident("x");
    let two = b.int(2);
    let assign = b.assign(x2, two);
    let s = b.expr_stmt(assign);
    let body = b.block(&[let_x, let_r, let_y, s], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![]);
}

#[test]
fn returning_reference_to_local_dangles() {
    // func f() -> ref I64 { let x = 1; return ref x }
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let ref_i64 = b.ref_type(i64_ty);
    let one = b.int(1);
    let let_x = b.let_stmt("x", false, one);
    let x = b.ident("x");
    let borrow = b.unary(UnaryOp::Ref, x);
    let ret = b.expr(ExprKind::Return(borrow));
    let body = b.block(&[let_x], ret);
    let func = Function {
        name: b.name("f"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: Vec::new(),
        ret: ref_i64,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body,
        span: Span::DUMMY,
    };

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3005]);
}

#[test]
fn assignment_to_immutable_binding_is_rejected() {
    // let x = 1; x = 2
    let mut b = Builder::new();
    let one = b.int(1);
    let let_x = b.let_stmt("x", false, one);
    let x = b.ident("x");
    let two = b.int(2);
    let assign = b.assign(x, two);
    let s = b.expr_stmt(assign);
    let body = b.block(&[let_x, s], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3003]);
}

#[test]
fn use_of_uninitialized_variable_is_rejected() {
    // let x: I64; println(x)
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let let_x = b.let_typed("x", false, i64_ty, ExprId::NONE);
    let x = b.ident("x");
    let print = b.call_named("println", &[x]);
    let s = b.expr_stmt(print);
    let body = b.block(&[let_x, s], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![ErrorCode::E3004]);
}

#[test]
fn disjoint_field_borrows_coexist() {
    // struct Point { x: I64, y: I64 }
    // let mut p = Point { x: 1, y: 2 }
    // let rx = mut ref p.x; let ry = mut ref p.y; println(rx, ry)
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let point = StructDecl {
        name: b.name("Point"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        fields: vec![
            FieldDecl {
                name: b.name("x"),
                ty: i64_ty,
                span: Span::DUMMY,
            },
            FieldDecl {
                name: b.name("y"),
                ty: i64_ty,
                span: Span::DUMMY,
            },
        ],
        decorators: Vec::new(),
        span: Span::DUMMY,
    };

    let one = b.int(1);
    let two = b.int(2);
    let x_name = b.name("x");
    let y_name = b.name("y");
    let fields = b.arena.alloc_field_inits(&[
        tml_ir::ast::FieldInit {
            name: x_name,
            value: one,
            span: Span::DUMMY,
        },
        tml_ir::ast::FieldInit {
            name: y_name,
            value: two,
            span: Span::DUMMY,
        },
    ]);
    let point_name = b.name("Point");
    let lit = b.expr(ExprKind::StructLit {
        name: point_name,
        type_args: tml_ir::ParsedTypeRange::EMPTY,
        fields,
        base: ExprId::NONE,
    });
    let let_p = b.let_stmt("p", true, lit);

    let p1 = b.ident("p");
    let px = b.field(p1, "x");
    let bx = b.unary(UnaryOp::RefMut, px);
    let let_rx = b.let_stmt("rx", false, bx);

    let p2 = b.ident("p");
    let py = b.field(p2, "y");
    let by = b.unary(UnaryOp::RefMut, py);
    let let_ry = b.let_stmt("ry", false, by);

    let rx = b.ident("rx");
    let ry = b.ident("ry");
    let print = b.call_named("println", &[rx, ry]);
    let s = b.expr_stmt(print);

    let body = b.block(&[let_p, let_rx, let_ry, s], ExprId::NONE);
    let func = b.main_fn(body);

    let mut module = Module::new(b.name("demo"));
    module.structs.push(point);
    module.functions.push(func);

    let diags = b.run(&module);
    assert_eq!(codes(&diags), vec![]);
}
