//! End-to-end backend tests: AST in, LLVM-syntax text out.

use pretty_assertions::assert_eq;
use tml_ir::ast::{
    BehaviorDecl, BinaryOp, Expr, ExprKind, FieldDecl, FieldInit, Function, ImplDecl, Module,
    Param, ParsedType, ParsedTypeKind, Stmt, StmtKind, StructDecl,
};
use tml_ir::{
    AstArena, CancelToken, ExprId, Name, ParsedTypeId, ParsedTypeRange, SharedInterner, Span,
    StmtId,
};
use tml_mir::{lower_module, MirModule};
use tml_typeck::TypeCheckResult;

use crate::{
    compile_cgus_parallel, create_backend, partition_functions, Backend, BackendCapabilities,
    BackendError, BackendKind, CodegenOptions, CodegenResult,
};

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

    fn ident(&mut self, name: &str) -> ExprId {
        let name = self.name(name);
        self.expr(ExprKind::Ident(name))
    }

    fn named_type(&mut self, name: &str) -> ParsedTypeId {
        let segments = [self.name(name)];
        let segments = self.arena.alloc_name_list(&segments);
        let span = self.span();
        self.arena.alloc_parsed_type(ParsedType::new(
            ParsedTypeKind::Named {
                segments,
                args: ParsedTypeRange::EMPTY,
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

    fn dyn_type(&mut self, behavior: &str) -> ParsedTypeId {
        let behavior = self.name(behavior);
        let span = self.span();
        self.arena.alloc_parsed_type(ParsedType::new(
            ParsedTypeKind::Dyn {
                behavior,
                args: ParsedTypeRange::EMPTY,
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

    fn function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        ret: ParsedTypeId,
        body: ExprId,
    ) -> Function {
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

    fn check(&self, module: &Module) -> TypeCheckResult {
        let result = tml_typeck::type_check(
            module,
            &self.arena,
            self.interner.clone(),
            &CancelToken::new(),
        )
        .unwrap_or_else(|_| panic!("not cancelled"));
        assert!(
            !result.has_errors(),
            "type errors before codegen: {:?}",
            result.diagnostics
        );
        result
    }
}

/// `func add(a: I32, b: I32) -> I32 { return a + b }` (scenario 1).
fn add_module(b: &mut Builder) -> Module {
    let i32_ty = b.named_type("I32");
    let a = b.ident("a");
    let bb = b.ident("b");
    let sum = b.expr(ExprKind::Binary {
        op: BinaryOp::Add,
        lhs: a,
        rhs: bb,
    });
    let ret = b.expr(ExprKind::Return(sum));
    let body = b.block(&[], ret);
    let params = vec![b.param("a", i32_ty), b.param("b", i32_ty)];
    let func = b.function("add", params, i32_ty, body);
    let mut module = Module::new(b.name("demo"));
    module.functions.push(func);
    module
}

#[test]
fn primitive_pipeline_emits_i32_add() {
    let mut b = Builder::new();
    let module = add_module(&mut b);
    let result = b.check(&module);
    let mut env = result.env;
    let mir = lower_module(&module, &b.arena, &result.typed, &mut env).expect("lowers");

    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let out = backend
        .compile_mir(&mir, &CodegenOptions::default())
        .expect("compiles");
    assert!(out.success);
    assert!(out.ir_text.contains("define i32 @add(i32 %v0, i32 %v1)"));
    assert!(out.ir_text.contains("add i32"));
    assert!(out.ir_text.contains("ret i32"));
}

#[test]
fn compilation_is_deterministic() {
    // Identical inputs and options produce bitwise identical IR text
    // and binary MIR.
    let mut b = Builder::new();
    let module = add_module(&mut b);
    let result = b.check(&module);
    let mut env = result.env;
    let mir = lower_module(&module, &b.arena, &result.typed, &mut env).expect("lowers");

    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let opts = CodegenOptions::default();
    let first = backend.compile_mir(&mir, &opts).expect("compiles");
    let second = backend.compile_mir(&mir, &opts).expect("compiles");
    assert_eq!(first.ir_text, second.ir_text);
    assert_eq!(tml_mir::serialize_binary(&mir), tml_mir::serialize_binary(&mir));
}

#[test]
fn generic_instances_are_emitted_exactly_once() {
    // Scenario 2: id(a) and id("x") specialize id__I64 and id__Str.
    let mut b = Builder::new();
    let t_ty = b.named_type("T");
    let x = b.ident("x");
    let ret = b.expr(ExprKind::Return(x));
    let id_body = b.block(&[], ret);
    let x_param = b.param("x", t_ty);
    let mut id_func = b.function("id", vec![x_param], t_ty, id_body);
    id_func.type_params = vec![b.name("T")];

    let i64_ty = b.named_type("I64");
    let one = b.expr(ExprKind::Int(1));
    let let_a = b.let_stmt("a", false, i64_ty, one);
    let a1 = b.ident("a");
    let id_ref1 = b.ident("id");
    let args1 = b.arena.alloc_expr_list(&[a1]);
    let call1 = b.expr(ExprKind::Call {
        callee: id_ref1,
        args: args1,
    });
    let s1 = b.expr_stmt(call1);
    // Two calls at the same instantiation plus one at another.
    let a2 = b.ident("a");
    let id_ref2 = b.ident("id");
    let args2 = b.arena.alloc_expr_list(&[a2]);
    let call2 = b.expr(ExprKind::Call {
        callee: id_ref2,
        args: args2,
    });
    let s2 = b.expr_stmt(call2);
    let lit = {
        let name = b.name("x");
        b.expr(ExprKind::Str(name))
    };
    let id_ref3 = b.ident("id");
    let args3 = b.arena.alloc_expr_list(&[lit]);
    let call3 = b.expr(ExprKind::Call {
        callee: id_ref3,
        args: args3,
    });
    let s3 = b.expr_stmt(call3);
    let main_body = b.block(&[let_a, s1, s2, s3], ExprId::NONE);
    let main = b.function("main", Vec::new(), ParsedTypeId::NONE, main_body);

    let mut module = Module::new(b.name("demo"));
    module.functions.push(id_func);
    module.functions.push(main);

    let result = b.check(&module);
    let mut env = result.env;
    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let out = backend
        .compile_ast(
            &module,
            &b.arena,
            &result.typed,
            &mut env,
            &CodegenOptions::default(),
        )
        .expect("compiles");
    assert!(out.success, "{}", out.error_message);

    let define_i64 = out.ir_text.matches("define i64 @id__I64").count();
    let define_str = out.ir_text.matches("define i8* @id__Str").count();
    assert_eq!(define_i64, 1, "ir:\n{}", out.ir_text);
    assert_eq!(define_str, 1, "ir:\n{}", out.ir_text);
    // Calls reference the mangled instances.
    assert!(out.ir_text.contains("call i64 @id__I64"));
}

#[test]
fn dyn_behavior_emits_vtable_and_virtual_call() {
    // Scenario 5: behavior Describable, struct Item implementing it,
    // a function taking `dyn Describable`.
    let mut b = Builder::new();
    let str_ty = b.named_type("Str");

    // behavior Describable { func describe(this: ref This) -> Str }
    let this_ty = b.named_type("This");
    let ref_this = b.ref_type(this_ty);
    let this_param = b.param("this", ref_this);
    let describe_sig = b.function("describe", vec![this_param], str_ty, ExprId::NONE);
    let behavior = BehaviorDecl {
        name: b.name("Describable"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        assoc_types: Vec::new(),
        methods: vec![describe_sig],
        super_behaviors: Vec::new(),
        decorators: Vec::new(),
        span: Span::DUMMY,
    };

    // struct Item { tag: I64 }
    let i64_ty = b.named_type("I64");
    let item = StructDecl {
        name: b.name("Item"),
        type_params: Vec::new(),
        const_params: Vec::new(),
        fields: vec![FieldDecl {
            name: b.name("tag"),
            ty: i64_ty,
            span: Span::DUMMY,
        }],
        decorators: Vec::new(),
        span: Span::DUMMY,
    };

    // impl Describable for Item { func describe(this: ref Item) -> Str { return "item" } }
    let item_ty = b.named_type("Item");
    let ref_item = b.ref_type(item_ty);
    let this_param = b.param("this", ref_item);
    let lit = {
        let name = b.name("item");
        b.expr(ExprKind::Str(name))
    };
    let ret = b.expr(ExprKind::Return(lit));
    let describe_body = b.block(&[], ret);
    let describe_impl = b.function("describe", vec![this_param], str_ty, describe_body);
    let imp = ImplDecl {
        type_name: b.name("Item"),
        type_params: Vec::new(),
        behavior: Some(b.name("Describable")),
        assoc_bindings: Vec::new(),
        methods: vec![describe_impl],
        span: Span::DUMMY,
    };

    // func show(d: dyn Describable) -> Str { return d.describe() }
    let dyn_ty = b.dyn_type("Describable");
    let d_param = b.param("d", dyn_ty);
    let d = b.ident("d");
    let describe_name = b.name("describe");
    let no_args = b.arena.alloc_expr_list(&[]);
    let virtual_call = b.expr(ExprKind::MethodCall {
        receiver: d,
        method: describe_name,
        args: no_args,
    });
    let ret = b.expr(ExprKind::Return(virtual_call));
    let show_body = b.block(&[], ret);
    let show = b.function("show", vec![d_param], str_ty, show_body);

    // func main() { let it = Item { tag: 7 }; show(ref it); }
    let seven = b.expr(ExprKind::Int(7));
    let tag_name = b.name("tag");
    let fields = b.arena.alloc_field_inits(&[FieldInit {
        name: tag_name,
        value: seven,
        span: Span::DUMMY,
    }]);
    let item_name = b.name("Item");
    let item_lit = b.expr(ExprKind::StructLit {
        name: item_name,
        type_args: ParsedTypeRange::EMPTY,
        fields,
        base: ExprId::NONE,
    });
    let let_it = b.let_stmt("it", false, ParsedTypeId::NONE, item_lit);
    let it = b.ident("it");
    let borrow = b.expr(ExprKind::Unary {
        op: tml_ir::ast::UnaryOp::Ref,
        operand: it,
    });
    let show_ref = b.ident("show");
    let args = b.arena.alloc_expr_list(&[borrow]);
    let call_show = b.expr(ExprKind::Call {
        callee: show_ref,
        args,
    });
    let s = b.expr_stmt(call_show);
    let main_body = b.block(&[let_it, s], ExprId::NONE);
    let main = b.function("main", Vec::new(), ParsedTypeId::NONE, main_body);

    let mut module = Module::new(b.name("demo"));
    module.behaviors.push(behavior);
    module.structs.push(item);
    module.impls.push(imp);
    module.functions.push(show);
    module.functions.push(main);

    let result = b.check(&module);
    let mut env = result.env;
    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let out = backend
        .compile_ast(
            &module,
            &b.arena,
            &result.typed,
            &mut env,
            &CodegenOptions::default(),
        )
        .expect("compiles");
    assert!(out.success, "{}", out.error_message);

    // Vtable global for the (Item, Describable) pair.
    assert!(
        out.ir_text.contains("@\"vtable$Item$Describable\""),
        "ir:\n{}",
        out.ir_text
    );
    // The impl method body is emitted under its qualified symbol.
    assert!(out.ir_text.contains("define i8* @\"Item::describe\""));
    // The call site builds the fat pair from the vtable global.
    assert!(out.ir_text.contains("vtable$Item$Describable"));
}

#[test]
fn cgu_partitions_compile_in_parallel() {
    let mut b = Builder::new();
    let module = add_module(&mut b);
    let result = b.check(&module);
    let mut env = result.env;
    let mir = lower_module(&module, &b.arena, &result.typed, &mut env).expect("lowers");

    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let partitions = partition_functions(&mir, 2);
    let results = compile_cgus_parallel(
        backend.as_ref(),
        &mir,
        &partitions,
        &CodegenOptions::default(),
        &CancelToken::new(),
    )
    .expect("compiles");
    assert_eq!(results.len(), partitions.len());
    for result in &results {
        assert!(result.success);
        let path = result.object_file.as_ref().expect("temp output path");
        assert!(path.exists());
        std::fs::remove_file(path).expect("driver consumes the file");
    }
}

#[test]
fn cancelled_cgu_batch_fails_without_partial_output() {
    let mut b = Builder::new();
    let module = add_module(&mut b);
    let result = b.check(&module);
    let mut env = result.env;
    let mir = lower_module(&module, &b.arena, &result.typed, &mut env).expect("lowers");

    let cancel = CancelToken::new();
    cancel.cancel();
    let backend = create_backend(BackendKind::LlvmText).expect("available");
    let partitions = partition_functions(&mir, 2);
    let err = compile_cgus_parallel(
        backend.as_ref(),
        &mir,
        &partitions,
        &CodegenOptions::default(),
        &cancel,
    )
    .expect_err("cancelled");
    assert!(matches!(err, BackendError::Cancelled(_)));
}

/// A backend without AST support must reject `compile_ast` with a
/// well-defined error, not panic.
struct MirOnlyBackend;

impl Backend for MirOnlyBackend {
    fn name(&self) -> &'static str {
        "mir-only"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_mir: true,
            ..BackendCapabilities::default()
        }
    }

    fn compile_mir(
        &self,
        _module: &MirModule,
        _opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        Ok(CodegenResult::success_ir(String::new()))
    }

    fn compile_mir_cgu(
        &self,
        _module: &MirModule,
        _func_indices: &[usize],
        _opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        Err(BackendError::Unsupported {
            backend: "mir-only",
            operation: "CGU codegen",
        })
    }

    fn compile_ast(
        &self,
        _module: &Module,
        _arena: &AstArena,
        _typed: &tml_typeck::TypedModule,
        _env: &mut tml_types::TypeEnv,
        _opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        Err(BackendError::Unsupported {
            backend: "mir-only",
            operation: "AST codegen",
        })
    }

    fn generate_ir(
        &self,
        _module: &MirModule,
        _opts: &CodegenOptions,
    ) -> Result<String, BackendError> {
        Ok(String::new())
    }
}

#[test]
fn backend_without_ast_support_rejects_cleanly() {
    let mut b = Builder::new();
    let module = add_module(&mut b);
    let result = b.check(&module);
    let mut env = result.env;

    let backend = MirOnlyBackend;
    assert!(!backend.capabilities().supports_ast);
    let err = backend
        .compile_ast(
            &module,
            &b.arena,
            &result.typed,
            &mut env,
            &CodegenOptions::default(),
        )
        .expect_err("must reject");
    assert!(matches!(err, BackendError::Unsupported { .. }));
}
