//! Checker tests over programmatically built ASTs (the parser lives
//! outside this workspace).

use pretty_assertions::assert_eq;
use tml_diagnostic::ErrorCode;
use tml_ir::ast::{
    BehaviorDecl, BinaryOp, ClosureParam, Expr, ExprKind, Function, Module, Param, ParsedType,
    ParsedTypeKind, Stmt, StmtKind, WhereClause,
};
use tml_ir::{AstArena, CancelToken, ExprId, Name, ParsedTypeId, SharedInterner, Span, StmtId};
use tml_types::TypeId;

use crate::{type_check, TypeCheckResult};

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
        self.next_pos += 2;
        Span::new(start, start + 1)
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

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.expr(ExprKind::Binary { op, lhs, rhs })
    }

    fn ret(&mut self, value: ExprId) -> ExprId {
        self.expr(ExprKind::Return(value))
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

    fn let_stmt(&mut self, name: &str, is_mut: bool, ty: ParsedTypeId, init: ExprId) -> StmtId {
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

    fn dyn_type(&mut self, behavior: &str) -> ParsedTypeId {
        let behavior = self.name(behavior);
        let span = self.span();
        self.arena.alloc_parsed_type(ParsedType::new(
            ParsedTypeKind::Dyn {
                behavior,
                args: tml_ir::ParsedTypeRange::EMPTY,
                is_mut: false,
            },
            span,
        ))
    }

    fn param(&mut self, name: &str, ty: ParsedTypeId) -> Param {
        Param {
            name: self.name(name),
            is_mut: false,
            ty,
            span: self.span(),
        }
    }

    fn function(&mut self, name: &str, params: Vec<Param>, ret: ParsedTypeId, body: ExprId) -> Function {
        Function {
            name: self.name(name),
            type_params: Vec::new(),
            const_params: Vec::new(),
            params,
            ret,
            where_clauses: Vec::new(),
            decorators: Vec::new(),
            is_async: false,
            body,
            span: self.span(),
        }
    }

    fn check(self, module: &Module) -> TypeCheckResult {
        type_check(module, &self.arena, self.interner.clone(), &CancelToken::new())
            .unwrap_or_else(|_| panic!("not cancelled"))
    }
}

fn codes(result: &TypeCheckResult) -> Vec<ErrorCode> {
    result.diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn primitive_add_function_checks_clean() {
    // func add(a: I32, b: I32) -> I32 { return a + b }
    let mut b = Builder::new();
    let i32_ty = b.named_type("I32");
    let a = b.ident("a");
    let bb = b.ident("b");
    let sum = b.binary(BinaryOp::Add, a, bb);
    let ret = b.ret(sum);
    let body = b.block(&[], ret);
    let params = vec![b.param("a", i32_ty), b.param("b", i32_ty)];
    let func = b.function("add", params, i32_ty, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let result = b.check(&module);
    assert_eq!(codes(&result), vec![]);
    assert_eq!(result.typed.type_of(sum), TypeId::I32);
}

#[test]
fn generic_identity_instantiates_per_call() {
    // func id[T](x: T) -> T { return x }
    // func main() { let a: I32 = 1; id(a); id("s") }
    let mut b = Builder::new();
    let t_ty = b.named_type("T");
    let x = b.ident("x");
    let ret = b.ret(x);
    let id_body = b.block(&[], ret);
    let x_param = b.param("x", t_ty);
    let mut id_func = b.function("id", vec![x_param], t_ty, id_body);
    id_func.type_params = vec![b.name("T")];

    let i32_ty = b.named_type("I32");
    let one = b.int(1);
    let let_a = b.let_stmt("a", false, i32_ty, one);
    let a_ref = b.ident("a");
    let call_int = b.call_named("id", &[a_ref]);
    let s1 = b.expr_stmt(call_int);
    let lit = b.string("s");
    let call_str = b.call_named("id", &[lit]);
    let s2 = b.expr_stmt(call_str);
    let main_body = b.block(&[let_a, s1, s2], ExprId::NONE);
    let main = b.function("main", Vec::new(), ParsedTypeId::NONE, main_body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(id_func);
    module.functions.push(main);

    let result = b.check(&module);
    assert_eq!(codes(&result), vec![]);
    assert_eq!(result.typed.type_of(call_int), TypeId::I32);
    assert_eq!(result.typed.type_of(call_str), TypeId::STR);
    // Both call sites resolved to `id` with their own substitutions.
    assert!(result.typed.call_targets.contains_key(&call_int));
    assert!(result.typed.call_targets.contains_key(&call_str));
}

#[test]
fn unknown_identifier_gets_suggestion() {
    // func main() { let count = 1; return cuont }
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let one = b.int(1);
    let let_count = b.let_stmt("count", false, ParsedTypeId::NONE, one);
    let typo = b.ident("cuont");
    let ret = b.ret(typo);
    let body = b.block(&[let_count], ret);
    let func = b.function("main", Vec::new(), i64_ty, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let result = b.check(&module);
    let unknown = result
        .diagnostics
        .iter()
        .find(|d| d.code == ErrorCode::E1001)
        .unwrap_or_else(|| panic!("expected E1001"));
    assert!(unknown.suggestions.iter().any(|s| s.contains("count")));
}

#[test]
fn annotation_mismatch_is_reported() {
    // let x: I32 = "s"
    let mut b = Builder::new();
    let i32_ty = b.named_type("I32");
    let lit = b.string("s");
    let let_x = b.let_stmt("x", false, i32_ty, lit);
    let body = b.block(&[let_x], ExprId::NONE);
    let func = b.function("main", Vec::new(), ParsedTypeId::NONE, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let result = b.check(&module);
    assert!(codes(&result).contains(&ErrorCode::E2001));
}

#[test]
fn where_clause_rejects_non_copy_argument() {
    // func dup[T](x: T) -> T where T: Copy { return x }
    // main: dup(1) ok; dup("s") violates.
    let mut b = Builder::new();
    let t_ty = b.named_type("T");
    let x = b.ident("x");
    let ret = b.ret(x);
    let dup_body = b.block(&[], ret);
    let x_param = b.param("x", t_ty);
    let mut dup = b.function("dup", vec![x_param], t_ty, dup_body);
    dup.type_params = vec![b.name("T")];
    dup.where_clauses = vec![WhereClause {
        type_param: b.name("T"),
        behaviors: vec![b.name("Copy")],
        span: Span::DUMMY,
    }];

    let one = b.int(1);
    let ok_call = b.call_named("dup", &[one]);
    let s1 = b.expr_stmt(ok_call);
    let lit = b.string("s");
    let bad_call = b.call_named("dup", &[lit]);
    let s2 = b.expr_stmt(bad_call);
    let main_body = b.block(&[s1, s2], ExprId::NONE);
    let main = b.function("main", Vec::new(), ParsedTypeId::NONE, main_body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(dup);
    module.functions.push(main);

    let result = b.check(&module);
    assert_eq!(codes(&result), vec![ErrorCode::E2005]);
}

#[test]
fn missing_return_path_is_flagged() {
    // func f() -> I64 { let x = 1 }   (no trailing value, no return)
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let one = b.int(1);
    let let_x = b.let_stmt("x", false, ParsedTypeId::NONE, one);
    let body = b.block(&[let_x], ExprId::NONE);
    let func = b.function("f", Vec::new(), i64_ty, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let result = b.check(&module);
    assert_eq!(codes(&result), vec![ErrorCode::E2009]);
}

#[test]
fn non_object_safe_behavior_rejected_in_dyn() {
    // behavior Mapper { func map[U](ref this, x: U) -> U }
    // func f(m: dyn Mapper) {}
    let mut b = Builder::new();
    let u_ty = b.named_type("U");
    let x_param = b.param("x", u_ty);
    let mut map_sig = b.function("map", vec![x_param], u_ty, ExprId::NONE);
    map_sig.type_params = vec![b.name("U")];
    let behavior = BehaviorDecl {
        name: b.name("Mapper"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        assoc_types: Vec::new(),
        methods: vec![map_sig],
        super_behaviors: Vec::new(),
        decorators: Vec::new(),
        span: Span::DUMMY,
    };

    let dyn_ty = b.dyn_type("Mapper");
    let unit = b.expr(ExprKind::Unit);
    let body = b.block(&[], unit);
    let m_param = b.param("m", dyn_ty);
    let func = b.function("f", vec![m_param], ParsedTypeId::NONE, body);

    let mut module = Module::new(b.name("demo"));
    module.behaviors.push(behavior);
    module.functions.push(func);

    let result = b.check(&module);
    assert!(codes(&result).contains(&ErrorCode::E2006));
}

#[test]
fn list_push_then_len_infers_element_type() {
    // let mut v = List::new(); v.push(1); let n = v.len()
    let mut b = Builder::new();
    let new_call = b.call_path("List", "new", &[]);
    let let_v = b.let_stmt("v", true, ParsedTypeId::NONE, new_call);
    let v1 = b.ident("v");
    let one = b.int(1);
    let push = b.method(v1, "push", &[one]);
    let s1 = b.expr_stmt(push);
    let v2 = b.ident("v");
    let len = b.method(v2, "len", &[]);
    let let_n = b.let_stmt("n", false, ParsedTypeId::NONE, len);
    let body = b.block(&[let_v, s1, let_n], ExprId::NONE);
    let func = b.function("main", Vec::new(), ParsedTypeId::NONE, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let mut result = b.check(&module);
    assert_eq!(codes(&result), vec![]);
    assert_eq!(result.typed.type_of(len), TypeId::I64);
    // v: List[I64] after `push(1)` pins the element type.
    let v_ty = result.typed.type_of(new_call);
    let interner = result.env.interner().clone();
    let display = {
        let resolved = result.env.pool_mut().resolve(v_ty);
        result.env.pool().display(resolved, &interner)
    };
    assert_eq!(display, "List[I64]");
}

#[test]
fn closure_captures_enclosing_binding() {
    // let base = 10; let f = do(x) { x + base }
    let mut b = Builder::new();
    let ten = b.int(10);
    let let_base = b.let_stmt("base", false, ParsedTypeId::NONE, ten);
    let x = b.ident("x");
    let base_ref = b.ident("base");
    let sum = b.binary(BinaryOp::Add, x, base_ref);
    let closure_body = b.block(&[], sum);
    let x_name = b.name("x");
    let params = b.arena.alloc_params(&[ClosureParam {
        name: x_name,
        is_mut: false,
        ty: ParsedTypeId::NONE,
        span: Span::DUMMY,
    }]);
    let closure = b.expr(ExprKind::Closure {
        params,
        body: closure_body,
    });
    let let_f = b.let_stmt("f", false, ParsedTypeId::NONE, closure);
    let f_ref = b.ident("f");
    let two = b.int(2);
    let args = b.arena.alloc_expr_list(&[two]);
    let apply = b.expr(ExprKind::Call {
        callee: f_ref,
        args,
    });
    let let_y = b.let_stmt("y", false, ParsedTypeId::NONE, apply);
    let body = b.block(&[let_base, let_f, let_y], ExprId::NONE);
    let func = b.function("main", Vec::new(), ParsedTypeId::NONE, body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let result = b.check(&module);
    assert_eq!(codes(&result), vec![]);
    let closure_ty = result.typed.type_of(closure);
    match result.env.pool().data(closure_ty) {
        tml_types::TypeData::Closure { captures, .. } => {
            assert_eq!(captures.len(), 1);
            assert_eq!(captures[0].ty, TypeId::I64);
        }
        other => panic!("expected closure type, got {other:?}"),
    }
}
