//! Lowering tests: typed AST in, MIR out.

use pretty_assertions::assert_eq;
use tml_ir::ast::{
    BinaryOp, Expr, ExprKind, Function, Module, Param, ParsedType, ParsedTypeKind, Stmt, StmtKind,
};
use tml_ir::{AstArena, CancelToken, ExprId, Name, ParsedTypeId, SharedInterner, Span};

use crate::model::{Inst, MirType, Operand, Terminator, ValueId};
use crate::{lower_module, MirModule};

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

    fn lower(self, module: &Module) -> Result<MirModule, crate::LowerError> {
        let cancel = CancelToken::new();
        let result =
            tml_typeck::type_check(module, &self.arena, self.interner.clone(), &cancel)
                .unwrap_or_else(|_| panic!("not cancelled"));
        assert!(
            !result.has_errors(),
            "type errors before lowering: {:?}",
            result.diagnostics
        );
        let mut env = result.env;
        lower_module(module, &self.arena, &result.typed, &mut env)
    }
}

#[test]
fn add_function_lowers_to_binary_and_ret() {
    // func add(a: I32, b: I32) -> I32 { return a + b }
    let mut b = Builder::new();
    let i32_ty = b.named_type("I32");
    let a_name = b.name("a");
    let b_name = b.name("b");
    let a = b.expr(ExprKind::Ident(a_name));
    let bb = b.expr(ExprKind::Ident(b_name));
    let sum = b.expr(ExprKind::Binary {
        op: BinaryOp::Add,
        lhs: a,
        rhs: bb,
    });
    let ret = b.expr(ExprKind::Return(sum));
    let stmts = b.arena.alloc_stmt_list(&[]);
    let body = b.expr(ExprKind::Block { stmts, tail: ret });
    let func = Function {
        name: b.name("add"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: vec![
            Param {
                name: a_name,
                is_mut: false,
                ty: i32_ty,
                span: Span::DUMMY,
            },
            Param {
                name: b_name,
                is_mut: false,
                ty: i32_ty,
                span: Span::DUMMY,
            },
        ],
        ret: i32_ty,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body,
        span: Span::DUMMY,
    };

    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let mir = b.lower(&module).expect("lowers");
    let func = mir.function("add").expect("emitted");
    assert_eq!(func.ret, MirType::I32);
    assert_eq!(func.params.len(), 2);

    // One entry block with param spills, loads, one add, and a return.
    let entry = &func.blocks[0];
    let adds: Vec<&Inst> = entry
        .instructions
        .iter()
        .filter(|inst| matches!(inst, Inst::Binary { .. }))
        .collect();
    assert_eq!(adds.len(), 1);
    match &entry.terminator {
        Terminator::Ret(Some(Operand::Value(_))) => {}
        other => panic!("expected value return, got {other:?}"),
    }

    // MIR round-trips through the binary format untouched.
    let bytes = crate::serialize_binary(&mir);
    let restored = crate::deserialize_binary(&bytes).expect("round trip");
    assert_eq!(restored, mir);
}

#[test]
fn while_loop_produces_header_body_exit_blocks() {
    // func count() -> I64 { let mut i = 0; while i < 10 { i = i + 1 }; return i }
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let i_name = b.name("i");

    let zero = b.expr(ExprKind::Int(0));
    let let_i = {
        let span = b.span();
        b.arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name: i_name,
                is_mut: true,
                ty: ParsedTypeId::NONE,
                init: zero,
            },
            span,
        ))
    };

    let i1 = b.expr(ExprKind::Ident(i_name));
    let ten = b.expr(ExprKind::Int(10));
    let cond = b.expr(ExprKind::Binary {
        op: BinaryOp::Lt,
        lhs: i1,
        rhs: ten,
    });

    let i2 = b.expr(ExprKind::Ident(i_name));
    let one = b.expr(ExprKind::Int(1));
    let plus = b.expr(ExprKind::Binary {
        op: BinaryOp::Add,
        lhs: i2,
        rhs: one,
    });
    let i3 = b.expr(ExprKind::Ident(i_name));
    let assign = b.expr(ExprKind::Binary {
        op: BinaryOp::Assign,
        lhs: i3,
        rhs: plus,
    });
    let assign_stmt = {
        let span = b.span();
        b.arena.alloc_stmt(Stmt::new(StmtKind::Expr(assign), span))
    };
    let body_stmts = b.arena.alloc_stmt_list(&[assign_stmt]);
    let while_body = b.expr(ExprKind::Block {
        stmts: body_stmts,
        tail: ExprId::NONE,
    });
    let while_expr = b.expr(ExprKind::While {
        cond,
        body: while_body,
    });
    let while_stmt = {
        let span = b.span();
        b.arena
            .alloc_stmt(Stmt::new(StmtKind::Expr(while_expr), span))
    };

    let i4 = b.expr(ExprKind::Ident(i_name));
    let ret = b.expr(ExprKind::Return(i4));
    let stmts = b.arena.alloc_stmt_list(&[let_i, while_stmt]);
    let body = b.expr(ExprKind::Block { stmts, tail: ret });

    let func = Function {
        name: b.name("count"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: Vec::new(),
        ret: i64_ty,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body,
        span: Span::DUMMY,
    };
    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let mir = b.lower(&module).expect("lowers");
    let func = mir.function("count").expect("emitted");
    // entry + header + body + exit
    assert!(func.blocks.len() >= 4, "blocks: {:?}", func.blocks.len());
    let has_cond_br = func
        .blocks
        .iter()
        .any(|block| matches!(block.terminator, Terminator::CondBr { .. }));
    assert!(has_cond_br);
}

#[test]
fn non_capturing_closure_lifts_with_null_env() {
    // func f() { let g = do() { 1 }; }
    let mut b = Builder::new();
    let one = b.expr(ExprKind::Int(1));
    let stmts = b.arena.alloc_stmt_list(&[]);
    let closure_body = b.expr(ExprKind::Block { stmts, tail: one });
    let params = b.arena.alloc_params(&[]);
    let closure = b.expr(ExprKind::Closure {
        params,
        body: closure_body,
    });
    let g = b.name("g");
    let let_g = {
        let span = b.span();
        b.arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name: g,
                is_mut: false,
                ty: ParsedTypeId::NONE,
                init: closure,
            },
            span,
        ))
    };
    let stmts = b.arena.alloc_stmt_list(&[let_g]);
    let body = b.expr(ExprKind::Block {
        stmts,
        tail: ExprId::NONE,
    });
    let func = Function {
        name: b.name("f"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: Vec::new(),
        ret: ParsedTypeId::NONE,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body,
        span: Span::DUMMY,
    };
    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let mir = b.lower(&module).expect("lowers");
    // The closure body lifted into its own function.
    let lifted = mir.function("f__closure0").expect("lifted closure");
    // First parameter is the environment pointer.
    assert_eq!(lifted.params[0].0, "env");
    assert_eq!(lifted.params[0].1, MirType::ptr_to(MirType::U8));

    // The enclosing function builds the fat pair with a null env
    // (non-capturing closure).
    let f = mir.function("f").expect("emitted");
    let fat = f
        .blocks
        .iter()
        .flat_map(|block| &block.instructions)
        .find_map(|inst| match inst {
            Inst::MakeTuple { elements, .. } => Some(elements.clone()),
            _ => None,
        })
        .expect("fat pair");
    assert_eq!(fat.len(), 2);
    assert_eq!(fat[1], Operand::Const(crate::Constant::Int(0)));
}

#[test]
fn generic_calls_lower_to_mangled_names() {
    // func id[T](x: T) -> T { return x }
    // func main() -> I64 { let a: I64 = 1; return id(a) }
    let mut b = Builder::new();
    let t_ty = b.named_type("T");
    let x_name = b.name("x");
    let x = b.expr(ExprKind::Ident(x_name));
    let ret_x = b.expr(ExprKind::Return(x));
    let stmts = b.arena.alloc_stmt_list(&[]);
    let id_body = b.expr(ExprKind::Block {
        stmts,
        tail: ret_x,
    });
    let id_func = Function {
        name: b.name("id"),
        type_params: vec![b.name("T")],
        const_params: Vec::new(),
        params: vec![Param {
            name: x_name,
            is_mut: false,
            ty: t_ty,
            span: Span::DUMMY,
        }],
        ret: t_ty,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body: id_body,
        span: Span::DUMMY,
    };

    let i64_ty = b.named_type("I64");
    let one = b.expr(ExprKind::Int(1));
    let a_name = b.name("a");
    let let_a = {
        let span = b.span();
        b.arena.alloc_stmt(Stmt::new(
            StmtKind::Let {
                name: a_name,
                is_mut: false,
                ty: i64_ty,
                init: one,
            },
            span,
        ))
    };
    let a_ref = b.expr(ExprKind::Ident(a_name));
    let callee = {
        let id = b.name("id");
        b.expr(ExprKind::Ident(id))
    };
    let args = b.arena.alloc_expr_list(&[a_ref]);
    let call = b.expr(ExprKind::Call { callee, args });
    let ret = b.expr(ExprKind::Return(call));
    let stmts = b.arena.alloc_stmt_list(&[let_a]);
    let main_body = b.expr(ExprKind::Block { stmts, tail: ret });
    let main = Function {
        name: b.name("main"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: Vec::new(),
        ret: i64_ty,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body: main_body,
        span: Span::DUMMY,
    };

    let mut module = Module::new(b.name("demo"));
    module.functions.push(id_func);
    module.functions.push(main);

    let mir = b.lower(&module).expect("lowers");
    let main = mir.function("main").expect("emitted");
    let call = main
        .blocks
        .iter()
        .flat_map(|block| &block.instructions)
        .find_map(|inst| match inst {
            Inst::Call { func, .. } => Some(func.clone()),
            _ => None,
        })
        .expect("call emitted");
    assert_eq!(call, "id__I64");
}

#[test]
fn param_values_bind_before_instruction_results() {
    let mut b = Builder::new();
    let i64_ty = b.named_type("I64");
    let x_name = b.name("x");
    let x = b.expr(ExprKind::Ident(x_name));
    let ret = b.expr(ExprKind::Return(x));
    let stmts = b.arena.alloc_stmt_list(&[]);
    let body = b.expr(ExprKind::Block { stmts, tail: ret });
    let func = Function {
        name: b.name("echo"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        params: vec![Param {
            name: x_name,
            is_mut: false,
            ty: i64_ty,
            span: Span::DUMMY,
        }],
        ret: i64_ty,
        where_clauses: Vec::new(),
        decorators: Vec::new(),
        is_async: false,
        body,
        span: Span::DUMMY,
    };
    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);

    let mir = b.lower(&module).expect("lowers");
    let func = mir.function("echo").expect("emitted");
    // The param spill stores value id 0 (the parameter itself).
    let spill = func
        .blocks[0]
        .instructions
        .iter()
        .find_map(|inst| match inst {
            Inst::Store { value, .. } => Some(value.clone()),
            _ => None,
        })
        .expect("param spill");
    assert_eq!(spill, Operand::Value(ValueId(0)));
}
