//! Typed AST → MIR lowering.
//!
//! Lowers a checked module: literals, arithmetic, direct and indirect
//! calls, structs, enums, tuples, arrays, casts, structured control
//! flow, closures (lifted, with `{fn_ptr, env_ptr}` fat pairs) and
//! behavior-object dispatch. Pattern matching and generic bodies are
//! specialized by the AST codegen path (`compile_ast`); meeting one
//! here is a clean [`LowerError`], not a panic.

use rustc_hash::FxHashMap;
use tml_ir::ast::{BinaryOp, ExprKind, Function, Module, StmtKind, UnaryOp};
use tml_ir::{AstArena, ExprId, Name, Span, StmtId};
use tml_mono::mangle_type;
use tml_typeck::TypedModule;
use tml_types::{ArraySize, PrimKind, TypeData, TypeEnv, TypeId};

use crate::model::{
    BasicBlock, BinOp, BlockId, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule,
    MirStruct, MirType, Operand, Terminator, ValueId,
};

/// Lowering failure: the construct needs the AST codegen path.
#[derive(thiserror::Error, Clone, Debug)]
pub enum LowerError {
    #[error("construct not supported by the MIR path: {what}")]
    Unsupported { what: &'static str, span: Span },
    #[error("call site has no resolved target")]
    UnresolvedCall { span: Span },
}

/// Lower every monomorphic function of a checked module.
pub fn lower_module(
    module: &Module,
    arena: &AstArena,
    typed: &TypedModule,
    env: &mut TypeEnv,
) -> Result<MirModule, LowerError> {
    let name = env.interner().lookup(module.name).to_string();
    let mut mir = MirModule::new(name);

    for decl in &module.structs {
        if !decl.type_params.is_empty() {
            continue; // instantiated on demand via the AST path
        }
        if let Some(def) = env.lookup_struct(decl.name).cloned() {
            let fields = def
                .fields
                .iter()
                .map(|&(field, ty)| {
                    (
                        env.interner().lookup(field).to_string(),
                        mir_type_of(env, ty),
                    )
                })
                .collect();
            mir.structs.push(MirStruct {
                name: env.interner().lookup(def.name).to_string(),
                fields,
            });
        }
    }
    for decl in &module.enums {
        if !decl.type_params.is_empty() {
            continue;
        }
        if let Some(def) = env.lookup_enum(decl.name).cloned() {
            let variants = def
                .variants
                .iter()
                .map(|(variant, payload)| {
                    (
                        env.interner().lookup(*variant).to_string(),
                        payload.iter().map(|&ty| mir_type_of(env, ty)).collect(),
                    )
                })
                .collect();
            mir.enums.push(MirEnum {
                name: env.interner().lookup(def.name).to_string(),
                variants,
            });
        }
    }

    for konst in &module.constants {
        let value = match arena.expr(konst.value).kind {
            ExprKind::Int(v) => Constant::Int(v),
            ExprKind::Float(bits) => Constant::Float(bits),
            ExprKind::Bool(v) => Constant::Bool(v),
            ExprKind::Str(s) => Constant::Str(env.interner().lookup(s).to_string()),
            ExprKind::Unit => Constant::Unit,
            _ => {
                return Err(LowerError::Unsupported {
                    what: "non-literal constant initializer",
                    span: konst.span,
                })
            }
        };
        mir.constants
            .push((env.interner().lookup(konst.name).to_string(), value));
    }

    for func in &module.functions {
        if !func.type_params.is_empty() {
            continue; // generic bodies are specialized at emission time
        }
        tracing::debug!("lowering function to MIR");
        mir.functions
            .extend(lower_function(func, arena, typed, env, None)?);
    }

    Ok(mir)
}

/// Lower one function body (optionally with a mangled override name for
/// specialized instances). The first returned function is the one
/// lowered; closures lift into the functions that follow it.
pub fn lower_function(
    func: &Function,
    arena: &AstArena,
    typed: &TypedModule,
    env: &mut TypeEnv,
    override_name: Option<String>,
) -> Result<Vec<MirFunction>, LowerError> {
    // Impl methods register their signatures under the qualified name
    // the caller passes as the override.
    let sig = env
        .lookup_func(func.name)
        .cloned()
        .or_else(|| {
            let qualified = env.interner().intern(override_name.as_deref()?);
            env.lookup_func(qualified).cloned()
        })
        .ok_or(LowerError::UnresolvedCall { span: func.span })?;

    let name =
        override_name.unwrap_or_else(|| env.interner().lookup(func.name).to_string());
    let params: Vec<(String, MirType)> = func
        .params
        .iter()
        .zip(sig.params.iter())
        .map(|(param, &ty)| {
            (
                env.interner().lookup(param.name).to_string(),
                mir_type_of(env, ty),
            )
        })
        .collect();
    let ret = mir_type_of(env, sig.ret);

    if !func.body.is_valid() {
        return Ok(vec![MirFunction {
            name,
            params,
            ret,
            blocks: Vec::new(),
            is_external: true,
        }]);
    }

    let mut lowerer = FunctionLowerer {
        arena,
        typed,
        env,
        blocks: vec![BlockInProgress::new(BlockId(0))],
        current: BlockId(0),
        next_value: params.len() as u32,
        scopes: vec![FxHashMap::default()],
        loops: Vec::new(),
        ret: ret.clone(),
        func_name: name.clone(),
        lifted: Vec::new(),
        closure_counter: 0,
    };

    // Params get stack slots so assignments to `mut` params work the
    // same way as locals.
    for (index, (param, &ty)) in func.params.iter().zip(sig.params.iter()).enumerate() {
        let mir_ty = mir_type_of(lowerer.env, ty);
        let slot = lowerer.alloca(mir_ty.clone());
        lowerer.emit(Inst::Store {
            ty: mir_ty.clone(),
            ptr: Operand::Value(slot),
            value: Operand::Value(ValueId(index as u32)),
        });
        lowerer.bind(param.name, slot, mir_ty);
    }

    let tail = lowerer.lower_expr(func.body)?;
    if !lowerer.current_terminated() {
        let term = match (ret.is_unit(), tail) {
            (true, _) => Terminator::Ret(None),
            (false, Some(value)) => Terminator::Ret(Some(value)),
            (false, None) => Terminator::Unreachable,
        };
        lowerer.terminate(term);
    }

    let lifted = std::mem::take(&mut lowerer.lifted);
    let blocks = lowerer
        .blocks
        .into_iter()
        .map(BlockInProgress::finish)
        .collect();
    let mut out = vec![MirFunction {
        name,
        params,
        ret,
        blocks,
        is_external: false,
    }];
    out.extend(lifted);
    Ok(out)
}

/// Convert a resolved semantic type into its MIR counterpart.
/// References lower to pointers; named instantiations take their
/// mangled name.
pub fn mir_type_of(env: &mut TypeEnv, ty: TypeId) -> MirType {
    let ty = env.pool_mut().resolve(ty);
    let interner = env.interner().clone();
    match env.pool().data(ty).clone() {
        TypeData::Prim(kind) => prim_to_mir(kind),
        TypeData::Named { .. } => MirType::Named(mangle_type(env.pool(), &interner, ty)),
        // Behavior objects are fat pointers { data_ptr, vtable_ptr }.
        TypeData::DynBehavior { .. } => {
            MirType::Tuple(vec![MirType::ptr_to(MirType::U8), MirType::ptr_to(MirType::U8)])
        }
        TypeData::Generic(name) => MirType::Named(interner.lookup(name).to_string()),
        TypeData::Ref { inner, .. } | TypeData::Ptr { inner, .. } => {
            let inner = mir_type_of(env, inner);
            MirType::ptr_to(inner)
        }
        TypeData::Slice(element) => {
            let element = mir_type_of(env, element);
            MirType::ptr_to(element)
        }
        TypeData::Array { element, size } => {
            let element = mir_type_of(env, element);
            let size = match size {
                ArraySize::Fixed(n) => n,
                ArraySize::Param(_) => 0,
            };
            MirType::Array(Box::new(element), size)
        }
        TypeData::Tuple(elements) => MirType::Tuple(
            elements
                .iter()
                .map(|&e| mir_type_of(env, e))
                .collect(),
        ),
        TypeData::Func { params, ret, .. } => MirType::Func {
            params: params.iter().map(|&p| mir_type_of(env, p)).collect(),
            ret: Box::new(mir_type_of(env, ret)),
        },
        // Closures are fat pointers { fn_ptr, env_ptr }.
        TypeData::Closure { .. } => {
            MirType::Tuple(vec![MirType::ptr_to(MirType::U8), MirType::ptr_to(MirType::U8)])
        }
        TypeData::ConstValue(_) | TypeData::Var(_) | TypeData::Error => MirType::Unit,
    }
}

fn prim_to_mir(kind: PrimKind) -> MirType {
    match kind {
        PrimKind::I8 => MirType::I8,
        PrimKind::I16 => MirType::I16,
        PrimKind::I32 => MirType::I32,
        PrimKind::I64 => MirType::I64,
        PrimKind::I128 => MirType::I128,
        PrimKind::U8 => MirType::U8,
        PrimKind::U16 => MirType::U16,
        PrimKind::U32 => MirType::U32,
        PrimKind::U64 => MirType::U64,
        PrimKind::U128 => MirType::U128,
        PrimKind::F32 => MirType::F32,
        PrimKind::F64 => MirType::F64,
        PrimKind::Bool => MirType::Bool,
        PrimKind::Char => MirType::Char,
        PrimKind::Str => MirType::Str,
        PrimKind::Unit => MirType::Unit,
        PrimKind::Never => MirType::Never,
    }
}

struct BlockInProgress {
    id: BlockId,
    instructions: Vec<Inst>,
    terminator: Option<Terminator>,
}

impl BlockInProgress {
    fn new(id: BlockId) -> Self {
        BlockInProgress {
            id,
            instructions: Vec::new(),
            terminator: None,
        }
    }

    fn finish(self) -> BasicBlock {
        BasicBlock {
            id: self.id,
            instructions: self.instructions,
            terminator: self.terminator.unwrap_or(Terminator::Unreachable),
        }
    }
}

struct LoopFrame {
    exit: BlockId,
    /// `continue` target: loop header (or condition block).
    header: BlockId,
    /// Slot receiving `break value` results, with its type.
    result: Option<(ValueId, MirType)>,
}

struct FunctionLowerer<'a> {
    arena: &'a AstArena,
    typed: &'a TypedModule,
    env: &'a mut TypeEnv,
    blocks: Vec<BlockInProgress>,
    current: BlockId,
    next_value: u32,
    scopes: Vec<FxHashMap<Name, (ValueId, MirType)>>,
    loops: Vec<LoopFrame>,
    ret: MirType,
    func_name: String,
    /// Closures lifted out of this function's body.
    lifted: Vec<MirFunction>,
    closure_counter: u32,
}

impl FunctionLowerer<'_> {
    // === Block plumbing ===

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockInProgress::new(id));
        id
    }

    fn switch_to(&mut self, id: BlockId) {
        self.current = id;
    }

    fn current_mut(&mut self) -> &mut BlockInProgress {
        let index = self
            .blocks
            .iter()
            .position(|b| b.id == self.current)
            .unwrap_or(0);
        &mut self.blocks[index]
    }

    fn current_terminated(&self) -> bool {
        self.blocks
            .iter()
            .find(|b| b.id == self.current)
            .is_some_and(|b| b.terminator.is_some())
    }

    fn emit(&mut self, inst: Inst) {
        if self.current_terminated() {
            return; // unreachable code after return/break
        }
        self.current_mut().instructions.push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        if self.current_terminated() {
            return;
        }
        self.current_mut().terminator = Some(term);
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn alloca(&mut self, ty: MirType) -> ValueId {
        let dst = self.fresh();
        self.emit(Inst::Alloca { dst, ty });
        dst
    }

    fn bind(&mut self, name: Name, slot: ValueId, ty: MirType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, (slot, ty));
        }
    }

    fn lookup(&self, name: Name) -> Option<(ValueId, MirType)> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).cloned())
    }

    fn type_of(&mut self, id: ExprId) -> MirType {
        let ty = self.typed.type_of(id);
        mir_type_of(self.env, ty)
    }

    // === Expressions ===

    fn lower_expr(&mut self, id: ExprId) -> Result<Option<Operand>, LowerError> {
        let expr = *self.arena.expr(id);
        let span = expr.span;
        match expr.kind {
            ExprKind::Int(value) => Ok(Some(Operand::Const(Constant::Int(value)))),
            ExprKind::Float(bits) => Ok(Some(Operand::Const(Constant::Float(bits)))),
            ExprKind::Bool(value) => Ok(Some(Operand::Const(Constant::Bool(value)))),
            ExprKind::Str(name) => Ok(Some(Operand::Const(Constant::Str(
                self.env.interner().lookup(name).to_string(),
            )))),
            ExprKind::Char(c) => Ok(Some(Operand::Const(Constant::Int(i64::from(c as u32))))),
            ExprKind::Unit => Ok(None),

            ExprKind::Ident(name) => self.lower_ident(name, id),

            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(id, op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => self.lower_unary(id, op, operand, span),

            ExprKind::Call { args, .. } => self.lower_call(id, args, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.lower_method_call(id, receiver, method, args, span),
            ExprKind::Field { object, field } => self.lower_field_read(id, object, field, span),

            ExprKind::Block { stmts, tail } => self.lower_block(stmts, tail),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(id, cond, then_branch, else_branch),
            ExprKind::Loop { body } => self.lower_loop(id, body),
            ExprKind::While { cond, body } => self.lower_while(cond, body),
            ExprKind::Return(value) => {
                let operand = if value.is_valid() {
                    self.lower_expr(value)?
                } else {
                    None
                };
                self.terminate(Terminator::Ret(operand));
                Ok(None)
            }
            ExprKind::Break(value) => {
                let operand = if value.is_valid() {
                    self.lower_expr(value)?
                } else {
                    None
                };
                if let Some(frame) = self.loops.last() {
                    let exit = frame.exit;
                    let result = frame.result.clone();
                    if let (Some(value), Some((slot, ty))) = (operand, result) {
                        self.emit(Inst::Store {
                            ty,
                            ptr: Operand::Value(slot),
                            value,
                        });
                    }
                    self.terminate(Terminator::Br(exit));
                }
                Ok(None)
            }
            ExprKind::Continue => {
                if let Some(frame) = self.loops.last() {
                    let header = frame.header;
                    self.terminate(Terminator::Br(header));
                }
                Ok(None)
            }

            ExprKind::Tuple(elements) => {
                let ty = self.type_of(id);
                let element_ids = self.arena.exprs(elements).to_vec();
                let mut lowered = Vec::with_capacity(element_ids.len());
                for element in element_ids {
                    lowered.push(self.lower_value(element)?);
                }
                let dst = self.fresh();
                self.emit(Inst::MakeTuple {
                    dst,
                    ty,
                    elements: lowered,
                });
                Ok(Some(Operand::Value(dst)))
            }
            ExprKind::Array(elements) => {
                let ty = self.type_of(id);
                let MirType::Array(element_ty, _) = ty.clone() else {
                    return Err(LowerError::Unsupported {
                        what: "array literal without array type",
                        span,
                    });
                };
                let slot = self.alloca(ty.clone());
                let element_ids = self.arena.exprs(elements).to_vec();
                for (index, element) in element_ids.into_iter().enumerate() {
                    let value = self.lower_value(element)?;
                    let dst = self.fresh();
                    self.emit(Inst::Gep {
                        dst,
                        ty: (*element_ty).clone(),
                        base: Operand::Value(slot),
                        index: index as u32,
                    });
                    self.emit(Inst::Store {
                        ty: (*element_ty).clone(),
                        ptr: Operand::Value(dst),
                        value,
                    });
                }
                let dst = self.fresh();
                self.emit(Inst::Load {
                    dst,
                    ty,
                    ptr: Operand::Value(slot),
                });
                Ok(Some(Operand::Value(dst)))
            }
            ExprKind::StructLit {
                name,
                fields,
                base,
                ..
            } => {
                if base.is_valid() {
                    return Err(LowerError::Unsupported {
                        what: "struct update syntax",
                        span,
                    });
                }
                let ty = self.type_of(id);
                let def = self
                    .env
                    .lookup_struct(name)
                    .cloned()
                    .ok_or(LowerError::Unsupported {
                        what: "struct literal without definition",
                        span,
                    })?;
                // Field operands in declaration order.
                let inits = self.arena.field_init_list(fields).to_vec();
                let mut lowered = Vec::with_capacity(def.fields.len());
                for &(field_name, _) in &def.fields {
                    let init = inits
                        .iter()
                        .find(|init| init.name == field_name)
                        .ok_or(LowerError::Unsupported {
                            what: "missing field in struct literal",
                            span,
                        })?;
                    lowered.push(self.lower_value(init.value)?);
                }
                let dst = self.fresh();
                self.emit(Inst::MakeStruct {
                    dst,
                    ty,
                    fields: lowered,
                });
                Ok(Some(Operand::Value(dst)))
            }
            ExprKind::Cast { expr: value, .. } => self.lower_cast(id, value),

            ExprKind::Path { segments } => {
                // Unit enum variant as a value.
                let segments = self.arena.names(segments).to_vec();
                if let [enum_name, variant] = *segments {
                    if let Some(def) = self.env.lookup_enum(enum_name).cloned() {
                        if let Some(tag) = def.variant_index(variant) {
                            let ty = self.type_of(id);
                            let dst = self.fresh();
                            self.emit(Inst::MakeEnum {
                                dst,
                                ty,
                                tag: tag as u32,
                                payload: Vec::new(),
                            });
                            return Ok(Some(Operand::Value(dst)));
                        }
                    }
                }
                Err(LowerError::Unsupported {
                    what: "path expression",
                    span,
                })
            }

            ExprKind::IfLet { .. } | ExprKind::When { .. } => Err(LowerError::Unsupported {
                what: "pattern matching",
                span,
            }),
            ExprKind::For { .. } => Err(LowerError::Unsupported {
                what: "for loop",
                span,
            }),
            ExprKind::Closure { params, body } => self.lower_closure(id, params, body, span),
            ExprKind::Index { .. } => Err(LowerError::Unsupported {
                what: "dynamic indexing",
                span,
            }),
            ExprKind::ArrayRepeat { .. } => Err(LowerError::Unsupported {
                what: "array repeat",
                span,
            }),
            ExprKind::Range { .. } => Err(LowerError::Unsupported {
                what: "range expression",
                span,
            }),
            ExprKind::InterpStr { .. } => Err(LowerError::Unsupported {
                what: "interpolated string",
                span,
            }),
        }
    }

    /// Lower to a value operand; Unit becomes a unit constant.
    fn lower_value(&mut self, id: ExprId) -> Result<Operand, LowerError> {
        Ok(self
            .lower_expr(id)?
            .unwrap_or(Operand::Const(Constant::Unit)))
    }

    fn lower_ident(&mut self, name: Name, id: ExprId) -> Result<Option<Operand>, LowerError> {
        let Some((slot, ty)) = self.lookup(name) else {
            return Err(LowerError::Unsupported {
                what: "non-local identifier",
                span: self.arena.expr(id).span,
            });
        };
        let dst = self.fresh();
        self.emit(Inst::Load {
            dst,
            ty,
            ptr: Operand::Value(slot),
        });
        Ok(Some(Operand::Value(dst)))
    }

    /// Address of a place expression.
    fn lower_place_ptr(&mut self, id: ExprId) -> Result<(Operand, MirType), LowerError> {
        let expr = *self.arena.expr(id);
        match expr.kind {
            ExprKind::Ident(name) => {
                let (slot, ty) = self.lookup(name).ok_or(LowerError::Unsupported {
                    what: "assignment to non-local",
                    span: expr.span,
                })?;
                Ok((Operand::Value(slot), ty))
            }
            ExprKind::Field { object, field } => {
                let (base, base_ty) = self.lower_place_ptr(object)?;
                let (index, field_ty) = self.field_slot(object, field, expr.span)?;
                let _ = base_ty;
                let dst = self.fresh();
                self.emit(Inst::Gep {
                    dst,
                    ty: field_ty.clone(),
                    base,
                    index,
                });
                Ok((Operand::Value(dst), field_ty))
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let ptr = self.lower_value(operand)?;
                let ty = self.type_of(id);
                Ok((ptr, ty))
            }
            _ => Err(LowerError::Unsupported {
                what: "complex assignment target",
                span: expr.span,
            }),
        }
    }

    /// Field index and type on the object's struct definition.
    fn field_slot(
        &mut self,
        object: ExprId,
        field: Name,
        span: Span,
    ) -> Result<(u32, MirType), LowerError> {
        let object_ty = self.typed.type_of(object);
        let resolved = self.env.pool_mut().resolve(object_ty);
        let mut base = resolved;
        loop {
            let inner = match self.env.pool().data(base) {
                TypeData::Ref { inner, .. } | TypeData::Ptr { inner, .. } => Some(*inner),
                _ => None,
            };
            match inner {
                Some(inner) => base = self.env.pool_mut().resolve(inner),
                None => break,
            }
        }
        match self.env.pool().data(base).clone() {
            TypeData::Named { name, args, .. } => {
                let def = self
                    .env
                    .lookup_struct(name)
                    .cloned()
                    .ok_or(LowerError::Unsupported {
                        what: "field access on non-struct",
                        span,
                    })?;
                let index = def.field_index(field).ok_or(LowerError::Unsupported {
                    what: "unknown field",
                    span,
                })?;
                let mut subst = tml_types::Subst::default();
                for (&param, &arg) in def.type_params.iter().zip(args.iter()) {
                    subst.insert(param, arg);
                }
                let field_ty = def.fields[index].1;
                let substituted = self.env.substitute(field_ty, &subst);
                let field_mir = mir_type_of(self.env, substituted);
                Ok((index as u32, field_mir))
            }
            TypeData::Tuple(elements) => {
                let field_str = self.env.interner().lookup(field);
                let index: usize = field_str.parse().map_err(|_| LowerError::Unsupported {
                    what: "tuple field index",
                    span,
                })?;
                let element = elements.get(index).copied().ok_or(LowerError::Unsupported {
                    what: "tuple index out of range",
                    span,
                })?;
                let element_mir = mir_type_of(self.env, element);
                Ok((index as u32, element_mir))
            }
            _ => Err(LowerError::Unsupported {
                what: "field access on non-aggregate",
                span,
            }),
        }
    }

    fn lower_field_read(
        &mut self,
        id: ExprId,
        object: ExprId,
        field: Name,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        // Prefer an in-place projection when the object is a place.
        if let Ok((ptr, ty)) = self.lower_place_ptr_quiet(object) {
            let _ = ty;
            let (index, field_ty) = self.field_slot(object, field, span)?;
            let gep = self.fresh();
            self.emit(Inst::Gep {
                dst: gep,
                ty: field_ty.clone(),
                base: ptr,
                index,
            });
            let dst = self.fresh();
            self.emit(Inst::Load {
                dst,
                ty: field_ty,
                ptr: Operand::Value(gep),
            });
            return Ok(Some(Operand::Value(dst)));
        }
        // Otherwise materialize the value and project from a temporary.
        let value = self.lower_value(object)?;
        let object_ty = self.type_of(object);
        let slot = self.alloca(object_ty.clone());
        self.emit(Inst::Store {
            ty: object_ty,
            ptr: Operand::Value(slot),
            value,
        });
        let (index, field_ty) = self.field_slot(object, field, span)?;
        let gep = self.fresh();
        self.emit(Inst::Gep {
            dst: gep,
            ty: field_ty.clone(),
            base: Operand::Value(slot),
            index,
        });
        let dst = self.fresh();
        self.emit(Inst::Load {
            dst,
            ty: field_ty,
            ptr: Operand::Value(gep),
        });
        let _ = id;
        Ok(Some(Operand::Value(dst)))
    }

    /// `lower_place_ptr` without emitting on failure paths.
    fn lower_place_ptr_quiet(&mut self, id: ExprId) -> Result<(Operand, MirType), LowerError> {
        match self.arena.expr(id).kind {
            ExprKind::Ident(_) | ExprKind::Field { .. } => self.lower_place_ptr(id),
            _ => Err(LowerError::Unsupported {
                what: "not a place",
                span: self.arena.expr(id).span,
            }),
        }
    }

    fn lower_binary(
        &mut self,
        id: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        if op.is_assignment() {
            let value = if op == BinaryOp::Assign {
                self.lower_value(rhs)?
            } else {
                // Compound assignment: load, apply, store.
                let current = self
                    .lower_expr(lhs)?
                    .ok_or(LowerError::Unsupported {
                        what: "compound assignment to unit place",
                        span,
                    })?;
                let rhs_value = self.lower_value(rhs)?;
                let ty = self.type_of(lhs);
                let mir_op = arith_op_for(op, &ty).ok_or(LowerError::Unsupported {
                    what: "compound assignment operator",
                    span,
                })?;
                let dst = self.fresh();
                self.emit(Inst::Binary {
                    dst,
                    op: mir_op,
                    ty,
                    lhs: current,
                    rhs: rhs_value,
                });
                Operand::Value(dst)
            };
            let (ptr, ty) = self.lower_place_ptr(lhs)?;
            self.emit(Inst::Store { ty, ptr, value });
            return Ok(None);
        }

        let lhs_ty = self.type_of(lhs);
        let lhs_value = self.lower_value(lhs)?;
        let rhs_value = self.lower_value(rhs)?;
        let mir_op = binop_for(op, &lhs_ty).ok_or(LowerError::Unsupported {
            what: "operator",
            span,
        })?;
        let result_ty = self.type_of(id);
        let dst = self.fresh();
        self.emit(Inst::Binary {
            dst,
            op: mir_op,
            ty: if mir_op.is_comparison() { lhs_ty } else { result_ty },
            lhs: lhs_value,
            rhs: rhs_value,
        });
        Ok(Some(Operand::Value(dst)))
    }

    fn lower_unary(
        &mut self,
        id: ExprId,
        op: UnaryOp,
        operand: ExprId,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        match op {
            UnaryOp::Neg => {
                let ty = self.type_of(id);
                let value = self.lower_value(operand)?;
                let (zero, op) = if ty.is_float() {
                    (Operand::Const(Constant::Float(0f64.to_bits())), BinOp::FSub)
                } else {
                    (Operand::Const(Constant::Int(0)), BinOp::Sub)
                };
                let dst = self.fresh();
                self.emit(Inst::Binary {
                    dst,
                    op,
                    ty,
                    lhs: zero,
                    rhs: value,
                });
                Ok(Some(Operand::Value(dst)))
            }
            UnaryOp::Not => {
                let value = self.lower_value(operand)?;
                let dst = self.fresh();
                self.emit(Inst::Binary {
                    dst,
                    op: BinOp::Xor,
                    ty: MirType::Bool,
                    lhs: value,
                    rhs: Operand::Const(Constant::Bool(true)),
                });
                Ok(Some(Operand::Value(dst)))
            }
            UnaryOp::Deref => {
                let ptr = self.lower_value(operand)?;
                let ty = self.type_of(id);
                let dst = self.fresh();
                self.emit(Inst::Load { dst, ty, ptr });
                Ok(Some(Operand::Value(dst)))
            }
            UnaryOp::Ref | UnaryOp::RefMut => {
                // A reference is the place's address.
                let (ptr, _) = self.lower_place_ptr(operand).map_err(|_| {
                    LowerError::Unsupported {
                        what: "reference to a temporary",
                        span,
                    }
                })?;
                Ok(Some(ptr))
            }
        }
    }

    fn lower_call(
        &mut self,
        id: ExprId,
        args: tml_ir::ExprRange,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        // Enum constructor calls resolve through the callee path.
        if let ExprKind::Call { callee, .. } = self.arena.expr(id).kind {
            if let ExprKind::Path { segments } = self.arena.expr(callee).kind {
                let segments = self.arena.names(segments).to_vec();
                if let [enum_name, variant] = *segments {
                    if let Some(def) = self.env.lookup_enum(enum_name).cloned() {
                        if let Some(tag) = def.variant_index(variant) {
                            let ty = self.type_of(id);
                            let arg_ids = self.arena.exprs(args).to_vec();
                            let mut payload = Vec::with_capacity(arg_ids.len());
                            for arg in arg_ids {
                                payload.push(self.lower_value(arg)?);
                            }
                            let dst = self.fresh();
                            self.emit(Inst::MakeEnum {
                                dst,
                                ty,
                                tag: tag as u32,
                                payload,
                            });
                            return Ok(Some(Operand::Value(dst)));
                        }
                    }
                }
            }
        }

        let Some(target) = self.typed.call_targets.get(&id).cloned() else {
            if let ExprKind::Call { callee, .. } = self.arena.expr(id).kind {
                // Variadic builtins have no recorded target; emit by name.
                if let ExprKind::Ident(name) = self.arena.expr(callee).kind {
                    if self.env.is_variadic_builtin(name) {
                        let arg_ids = self.arena.exprs(args).to_vec();
                        let mut lowered = Vec::with_capacity(arg_ids.len());
                        for arg in arg_ids {
                            lowered.push(self.lower_value(arg)?);
                        }
                        let func = self.env.interner().lookup(name).to_string();
                        self.emit(Inst::Call {
                            dst: None,
                            func,
                            ty: MirType::Unit,
                            args: lowered,
                        });
                        return Ok(None);
                    }
                }
                // Otherwise this is a call through a closure or
                // function value.
                let arg_ids = self.arena.exprs(args).to_vec();
                return self.lower_value_call(id, callee, &arg_ids, span);
            }
            return Err(LowerError::UnresolvedCall { span });
        };

        let func = self.mangled_callee(&target);
        let arg_ids = self.arena.exprs(args).to_vec();
        let mut lowered = Vec::with_capacity(arg_ids.len());
        for (index, arg) in arg_ids.into_iter().enumerate() {
            match self.dyn_param_behavior(&target, index) {
                Some(behavior) => lowered.push(self.coerce_to_dyn(arg, behavior)?),
                None => lowered.push(self.lower_arg(arg)?),
            }
        }
        let ret_ty = self.type_of(id);
        let dst = if ret_ty.is_unit() {
            None
        } else {
            Some(self.fresh())
        };
        self.emit(Inst::Call {
            dst,
            func,
            ty: ret_ty,
            args: lowered,
        });
        Ok(dst.map(Operand::Value))
    }

    fn lower_method_call(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        method: Name,
        args: tml_ir::ExprRange,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        let Some(target) = self.typed.call_targets.get(&id).cloned() else {
            return Err(LowerError::UnresolvedCall { span });
        };

        // Behavior objects dispatch through their vtable.
        let receiver_ty = self.typed.type_of(receiver);
        let receiver_resolved = self.env.pool_mut().resolve(receiver_ty);
        let dyn_behavior = match self.env.pool().data(receiver_resolved) {
            TypeData::DynBehavior { behavior, .. } => Some(*behavior),
            _ => None,
        };
        if let Some(behavior) = dyn_behavior {
            let arg_ids = self.arena.exprs(args).to_vec();
            return self.lower_dyn_method_call(id, receiver, behavior, method, &arg_ids, span);
        }

        // Receiver: by address when the signature takes a reference.
        let wants_ref = target
            .sig
            .params
            .first()
            .is_some_and(|&p| matches!(self.env.pool().data(p), TypeData::Ref { .. }));
        let receiver_operand = if wants_ref {
            let (ptr, _) = self.lower_place_ptr(receiver)?;
            ptr
        } else {
            self.lower_value(receiver)?
        };

        let func = self.mangled_callee(&target);
        let arg_ids = self.arena.exprs(args).to_vec();
        let mut lowered = Vec::with_capacity(arg_ids.len() + 1);
        lowered.push(receiver_operand);
        for (index, arg) in arg_ids.into_iter().enumerate() {
            match self.dyn_param_behavior(&target, index + 1) {
                Some(behavior) => lowered.push(self.coerce_to_dyn(arg, behavior)?),
                None => lowered.push(self.lower_arg(arg)?),
            }
        }
        let ret_ty = self.type_of(id);
        let dst = if ret_ty.is_unit() {
            None
        } else {
            Some(self.fresh())
        };
        self.emit(Inst::Call {
            dst,
            func,
            ty: ret_ty,
            args: lowered,
        });
        Ok(dst.map(Operand::Value))
    }

    /// Arguments: `ref x` lowers to the place address, everything else
    /// by value.
    fn lower_arg(&mut self, arg: ExprId) -> Result<Operand, LowerError> {
        if let ExprKind::Unary {
            op: UnaryOp::Ref | UnaryOp::RefMut,
            operand,
        } = self.arena.expr(arg).kind
        {
            if let Ok((ptr, _)) = self.lower_place_ptr(operand) {
                return Ok(ptr);
            }
        }
        self.lower_value(arg)
    }

    /// The callee symbol: plain name for monomorphic targets, mangled
    /// instance name when the call bound generic parameters.
    fn mangled_callee(&mut self, target: &tml_typeck::CallTarget) -> String {
        let base = self.env.interner().lookup(target.name).to_string();
        if target.sig.type_params.is_empty() {
            return base;
        }
        let args: Vec<TypeId> = target
            .sig
            .type_params
            .iter()
            .map(|param| {
                target
                    .subst
                    .get(param)
                    .copied()
                    .map(|ty| self.env.pool_mut().resolve(ty))
                    .unwrap_or(TypeId::UNIT)
            })
            .collect();
        let interner = self.env.interner().clone();
        tml_mono::mangle_func_name(self.env.pool(), &interner, &base, &args)
    }

    fn lower_block(
        &mut self,
        stmts: tml_ir::StmtRange,
        tail: ExprId,
    ) -> Result<Option<Operand>, LowerError> {
        self.scopes.push(FxHashMap::default());
        let stmt_ids = self.arena.stmts(stmts).to_vec();
        for stmt in stmt_ids {
            self.lower_stmt(stmt)?;
        }
        let result = if tail.is_valid() {
            self.lower_expr(tail)?
        } else {
            None
        };
        self.scopes.pop();
        Ok(result)
    }

    fn lower_stmt(&mut self, id: StmtId) -> Result<(), LowerError> {
        let stmt = *self.arena.stmt(id);
        match stmt.kind {
            StmtKind::Let { name, init, .. } => {
                let ty = if init.is_valid() {
                    self.type_of(init)
                } else {
                    MirType::Unit
                };
                let slot = self.alloca(ty.clone());
                if init.is_valid() {
                    let value = self.lower_value(init)?;
                    self.emit(Inst::Store {
                        ty: ty.clone(),
                        ptr: Operand::Value(slot),
                        value,
                    });
                }
                self.bind(name, slot, ty);
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
        }
    }

    fn lower_if(
        &mut self,
        id: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) -> Result<Option<Operand>, LowerError> {
        let cond_value = self.lower_value(cond)?;
        let then_block = self.new_block();
        let join_block = self.new_block();
        let else_block = if else_branch.is_valid() {
            self.new_block()
        } else {
            join_block
        };
        self.terminate(Terminator::CondBr {
            cond: cond_value,
            then_block,
            else_block,
        });

        let result_ty = self.type_of(id);
        let produces_value = !result_ty.is_unit() && else_branch.is_valid();

        self.switch_to(then_block);
        let then_value = self.lower_expr(then_branch)?;
        let then_end = self.current;
        let then_terminated = self.current_terminated();
        self.terminate(Terminator::Br(join_block));

        let mut incomings = Vec::new();
        if produces_value && !then_terminated {
            if let Some(value) = then_value {
                incomings.push((value, then_end));
            }
        }

        if else_branch.is_valid() {
            self.switch_to(else_block);
            let else_value = self.lower_expr(else_branch)?;
            let else_end = self.current;
            let else_terminated = self.current_terminated();
            self.terminate(Terminator::Br(join_block));
            if produces_value && !else_terminated {
                if let Some(value) = else_value {
                    incomings.push((value, else_end));
                }
            }
        }

        self.switch_to(join_block);
        if produces_value && incomings.len() == 2 {
            let dst = self.fresh();
            self.emit(Inst::Phi {
                dst,
                ty: result_ty,
                incomings,
            });
            Ok(Some(Operand::Value(dst)))
        } else if let Some((value, _)) = incomings.into_iter().next() {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    fn lower_loop(&mut self, id: ExprId, body: ExprId) -> Result<Option<Operand>, LowerError> {
        let result_ty = self.type_of(id);
        let result = if matches!(result_ty, MirType::Never | MirType::Unit) {
            None
        } else {
            Some((self.alloca(result_ty.clone()), result_ty.clone()))
        };

        let header = self.new_block();
        let exit = self.new_block();
        self.terminate(Terminator::Br(header));
        self.switch_to(header);
        self.loops.push(LoopFrame {
            exit,
            header,
            result: result.clone(),
        });
        self.lower_expr(body)?;
        self.loops.pop();
        self.terminate(Terminator::Br(header));

        self.switch_to(exit);
        match result {
            Some((slot, ty)) => {
                let dst = self.fresh();
                self.emit(Inst::Load {
                    dst,
                    ty,
                    ptr: Operand::Value(slot),
                });
                Ok(Some(Operand::Value(dst)))
            }
            None => Ok(None),
        }
    }

    fn lower_while(&mut self, cond: ExprId, body: ExprId) -> Result<Option<Operand>, LowerError> {
        let header = self.new_block();
        let body_block = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Br(header));
        self.switch_to(header);
        let cond_value = self.lower_value(cond)?;
        self.terminate(Terminator::CondBr {
            cond: cond_value,
            then_block: body_block,
            else_block: exit,
        });

        self.switch_to(body_block);
        self.loops.push(LoopFrame {
            exit,
            header,
            result: None,
        });
        self.lower_expr(body)?;
        self.loops.pop();
        self.terminate(Terminator::Br(header));

        self.switch_to(exit);
        Ok(None)
    }

    /// Closures: lift the body into `{fn}__closureN(env, params...)`,
    /// heap-allocate a capture struct of pointers, and materialize the
    /// `{ fn_ptr, env_ptr }` fat pair. Non-capturing closures
    /// pass a null environment.
    fn lower_closure(
        &mut self,
        id: ExprId,
        params: tml_ir::ParamRange,
        body: ExprId,
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        let closure_ty = self.typed.type_of(id);
        let resolved = self.env.pool_mut().resolve(closure_ty);
        let TypeData::Closure {
            params: param_types,
            ret,
            captures,
        } = self.env.pool().data(resolved).clone()
        else {
            return Err(LowerError::Unsupported {
                what: "closure without closure type",
                span,
            });
        };

        let lifted_name = format!("{}__closure{}", self.func_name, self.closure_counter);
        self.closure_counter += 1;

        let byte_ptr = MirType::ptr_to(MirType::U8);
        let fat_ty = MirType::Tuple(vec![byte_ptr.clone(), byte_ptr.clone()]);

        // Environment: one pointer per capture, aimed at the captured
        // binding's storage slot.
        let env_operand = if captures.is_empty() {
            Operand::Const(Constant::Int(0)) // null env
        } else {
            let env_ptr = self.fresh();
            self.emit(Inst::Call {
                dst: Some(env_ptr),
                func: "tml_closure_env_new".to_string(),
                ty: byte_ptr.clone(),
                args: vec![Operand::Const(Constant::Int(8 * captures.len() as i64))],
            });
            for (index, capture) in captures.iter().enumerate() {
                let Some((slot, _)) = self.lookup(capture.name) else {
                    return Err(LowerError::Unsupported {
                        what: "capture of a non-local",
                        span,
                    });
                };
                let field = self.fresh();
                self.emit(Inst::Gep {
                    dst: field,
                    ty: byte_ptr.clone(),
                    base: Operand::Value(env_ptr),
                    index: index as u32,
                });
                self.emit(Inst::Store {
                    ty: byte_ptr.clone(),
                    ptr: Operand::Value(field),
                    value: Operand::Value(slot),
                });
            }
            Operand::Value(env_ptr)
        };

        // The lifted function.
        let ast_params = self.arena.closure_params(params).to_vec();
        let mut lifted_params: Vec<(String, MirType)> =
            vec![("env".to_string(), byte_ptr.clone())];
        for (param, &ty) in ast_params.iter().zip(param_types.iter()) {
            lifted_params.push((
                self.env.interner().lookup(param.name).to_string(),
                mir_type_of(self.env, ty),
            ));
        }
        let lifted_ret = mir_type_of(self.env, ret);

        let mut inner = FunctionLowerer {
            arena: self.arena,
            typed: self.typed,
            env: &mut *self.env,
            blocks: vec![BlockInProgress::new(BlockId(0))],
            current: BlockId(0),
            next_value: lifted_params.len() as u32,
            scopes: vec![FxHashMap::default()],
            loops: Vec::new(),
            ret: lifted_ret.clone(),
            func_name: lifted_name.clone(),
            lifted: Vec::new(),
            closure_counter: 0,
        };

        // Bind captures: env slot i holds a pointer to the original
        // storage, which is exactly the "slot" shape locals use.
        for (index, capture) in captures.iter().enumerate() {
            let capture_ty = mir_type_of(inner.env, capture.ty);
            let field = inner.fresh();
            inner.emit(Inst::Gep {
                dst: field,
                ty: byte_ptr.clone(),
                base: Operand::Value(ValueId(0)),
                index: index as u32,
            });
            let slot = inner.fresh();
            inner.emit(Inst::Load {
                dst: slot,
                ty: byte_ptr.clone(),
                ptr: Operand::Value(field),
            });
            inner.bind(capture.name, slot, capture_ty);
        }
        // Spill value parameters like a normal function.
        for (index, (param, &ty)) in ast_params.iter().zip(param_types.iter()).enumerate() {
            let mir_ty = mir_type_of(inner.env, ty);
            let slot = inner.alloca(mir_ty.clone());
            inner.emit(Inst::Store {
                ty: mir_ty.clone(),
                ptr: Operand::Value(slot),
                value: Operand::Value(ValueId(index as u32 + 1)),
            });
            inner.bind(param.name, slot, mir_ty);
        }

        let tail = inner.lower_expr(body)?;
        if !inner.current_terminated() {
            let term = match (inner.ret.is_unit(), tail) {
                (true, _) => Terminator::Ret(None),
                (false, Some(value)) => Terminator::Ret(Some(value)),
                (false, None) => Terminator::Unreachable,
            };
            inner.terminate(term);
        }
        let nested = std::mem::take(&mut inner.lifted);
        let blocks: Vec<BasicBlock> = inner
            .blocks
            .into_iter()
            .map(BlockInProgress::finish)
            .collect();
        self.lifted.push(MirFunction {
            name: lifted_name.clone(),
            params: lifted_params,
            ret: lifted_ret,
            blocks,
            is_external: false,
        });
        self.lifted.extend(nested);

        // The fat pair value.
        let fn_addr = self.fresh();
        self.emit(Inst::GlobalAddr {
            dst: fn_addr,
            name: lifted_name,
            ty: byte_ptr,
        });
        let dst = self.fresh();
        self.emit(Inst::MakeTuple {
            dst,
            ty: fat_ty,
            elements: vec![Operand::Value(fn_addr), env_operand],
        });
        Ok(Some(Operand::Value(dst)))
    }

    /// Call through a closure or function value: closures unpack their
    /// fat pair and pass the environment first; plain function values
    /// call indirectly.
    fn lower_value_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        args: &[ExprId],
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        let callee_ty = self.typed.type_of(callee);
        let resolved = self.env.pool_mut().resolve(callee_ty);
        let data = self.env.pool().data(resolved).clone();
        let byte_ptr = MirType::ptr_to(MirType::U8);
        match data {
            TypeData::Closure { .. } => {
                let fat = self.lower_value(callee)?;
                let fat_ty = MirType::Tuple(vec![byte_ptr.clone(), byte_ptr.clone()]);
                let slot = self.alloca(fat_ty.clone());
                self.emit(Inst::Store {
                    ty: fat_ty,
                    ptr: Operand::Value(slot),
                    value: fat,
                });
                let fn_field = self.fresh();
                self.emit(Inst::Gep {
                    dst: fn_field,
                    ty: byte_ptr.clone(),
                    base: Operand::Value(slot),
                    index: 0,
                });
                let fn_ptr = self.fresh();
                self.emit(Inst::Load {
                    dst: fn_ptr,
                    ty: byte_ptr.clone(),
                    ptr: Operand::Value(fn_field),
                });
                let env_field = self.fresh();
                self.emit(Inst::Gep {
                    dst: env_field,
                    ty: byte_ptr.clone(),
                    base: Operand::Value(slot),
                    index: 1,
                });
                let env_ptr = self.fresh();
                self.emit(Inst::Load {
                    dst: env_ptr,
                    ty: byte_ptr,
                    ptr: Operand::Value(env_field),
                });

                let mut lowered = vec![Operand::Value(env_ptr)];
                for &arg in args {
                    lowered.push(self.lower_value(arg)?);
                }
                let ret_ty = self.type_of(id);
                let dst = if ret_ty.is_unit() {
                    None
                } else {
                    Some(self.fresh())
                };
                self.emit(Inst::CallIndirect {
                    dst,
                    callee: Operand::Value(fn_ptr),
                    ty: ret_ty,
                    args: lowered,
                });
                Ok(dst.map(Operand::Value))
            }
            TypeData::Func { .. } => {
                let fn_value = self.lower_value(callee)?;
                let mut lowered = Vec::with_capacity(args.len());
                for &arg in args {
                    lowered.push(self.lower_value(arg)?);
                }
                let ret_ty = self.type_of(id);
                let dst = if ret_ty.is_unit() {
                    None
                } else {
                    Some(self.fresh())
                };
                self.emit(Inst::CallIndirect {
                    dst,
                    callee: fn_value,
                    ty: ret_ty,
                    args: lowered,
                });
                Ok(dst.map(Operand::Value))
            }
            _ => Err(LowerError::UnresolvedCall { span }),
        }
    }

    /// Virtual call through a behavior object: unpack
    /// `{ data_ptr, vtable_ptr }`, index the vtable by the method's
    /// declaration-order slot, call indirectly with the data pointer
    /// first.
    fn lower_dyn_method_call(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        behavior: Name,
        method: Name,
        args: &[ExprId],
        span: Span,
    ) -> Result<Option<Operand>, LowerError> {
        let slot_index = self
            .env
            .lookup_behavior(behavior)
            .and_then(|def| def.method_slot(method))
            .ok_or(LowerError::Unsupported {
                what: "unknown behavior method",
                span,
            })?;

        let byte_ptr = MirType::ptr_to(MirType::U8);
        let fat_ty = MirType::Tuple(vec![byte_ptr.clone(), byte_ptr.clone()]);
        let fat = self.lower_value(receiver)?;
        let slot = self.alloca(fat_ty.clone());
        self.emit(Inst::Store {
            ty: fat_ty,
            ptr: Operand::Value(slot),
            value: fat,
        });
        let data_field = self.fresh();
        self.emit(Inst::Gep {
            dst: data_field,
            ty: byte_ptr.clone(),
            base: Operand::Value(slot),
            index: 0,
        });
        let data_ptr = self.fresh();
        self.emit(Inst::Load {
            dst: data_ptr,
            ty: byte_ptr.clone(),
            ptr: Operand::Value(data_field),
        });
        let vtable_field = self.fresh();
        self.emit(Inst::Gep {
            dst: vtable_field,
            ty: byte_ptr.clone(),
            base: Operand::Value(slot),
            index: 1,
        });
        let vtable_ptr = self.fresh();
        self.emit(Inst::Load {
            dst: vtable_ptr,
            ty: byte_ptr.clone(),
            ptr: Operand::Value(vtable_field),
        });
        // Slot selection in declared method order.
        let method_slot = self.fresh();
        self.emit(Inst::Gep {
            dst: method_slot,
            ty: byte_ptr.clone(),
            base: Operand::Value(vtable_ptr),
            index: slot_index as u32,
        });
        let fn_ptr = self.fresh();
        self.emit(Inst::Load {
            dst: fn_ptr,
            ty: byte_ptr,
            ptr: Operand::Value(method_slot),
        });

        let mut lowered = vec![Operand::Value(data_ptr)];
        for &arg in args {
            lowered.push(self.lower_value(arg)?);
        }
        let ret_ty = self.type_of(id);
        let dst = if ret_ty.is_unit() {
            None
        } else {
            Some(self.fresh())
        };
        self.emit(Inst::CallIndirect {
            dst,
            callee: Operand::Value(fn_ptr),
            ty: ret_ty,
            args: lowered,
        });
        Ok(dst.map(Operand::Value))
    }

    /// Coerce an argument to a behavior object when the parameter
    /// expects one: the fat pair is the place's address plus the
    /// `(type, behavior)` vtable global.
    fn coerce_to_dyn(
        &mut self,
        arg: ExprId,
        behavior: Name,
    ) -> Result<Operand, LowerError> {
        let span = self.arena.expr(arg).span;
        // The concrete type behind the value (through refs).
        let arg_ty = self.typed.type_of(arg);
        let resolved = self.env.pool_mut().resolve(arg_ty);
        let mut base = resolved;
        loop {
            let inner = match self.env.pool().data(base) {
                TypeData::Ref { inner, .. } => Some(*inner),
                _ => None,
            };
            match inner {
                Some(inner) => base = self.env.pool_mut().resolve(inner),
                None => break,
            }
        }
        let type_name = match self.env.pool().data(base) {
            TypeData::Named { name, .. } => *name,
            // Already a behavior object: pass through.
            TypeData::DynBehavior { .. } => return self.lower_value(arg),
            _ => {
                return Err(LowerError::Unsupported {
                    what: "dyn coercion from non-nominal type",
                    span,
                })
            }
        };

        let byte_ptr = MirType::ptr_to(MirType::U8);
        // Data pointer: address of the underlying place, or a spilled
        // temporary.
        let data_ptr = if let ExprKind::Unary {
            op: UnaryOp::Ref | UnaryOp::RefMut,
            operand,
        } = self.arena.expr(arg).kind
        {
            self.lower_place_ptr(operand)?.0
        } else if let Ok((ptr, _)) = self.lower_place_ptr_quiet(arg) {
            ptr
        } else {
            let value = self.lower_value(arg)?;
            let value_ty = self.type_of(arg);
            let slot = self.alloca(value_ty.clone());
            self.emit(Inst::Store {
                ty: value_ty,
                ptr: Operand::Value(slot),
                value,
            });
            Operand::Value(slot)
        };

        let vtable_name = format!(
            "vtable${}${}",
            self.env.interner().lookup(type_name),
            self.env.interner().lookup(behavior)
        );
        let vtable = self.fresh();
        self.emit(Inst::GlobalAddr {
            dst: vtable,
            name: vtable_name,
            ty: byte_ptr.clone(),
        });
        let dst = self.fresh();
        self.emit(Inst::MakeTuple {
            dst,
            ty: MirType::Tuple(vec![byte_ptr.clone(), byte_ptr]),
            elements: vec![data_ptr, Operand::Value(vtable)],
        });
        Ok(Operand::Value(dst))
    }

    /// The behavior a substituted parameter expects, if it is a dyn
    /// parameter.
    fn dyn_param_behavior(
        &mut self,
        target: &tml_typeck::CallTarget,
        param_index: usize,
    ) -> Option<Name> {
        let &param = target.sig.params.get(param_index)?;
        let substituted = self.env.substitute(param, &target.subst);
        let resolved = self.env.pool_mut().resolve(substituted);
        match self.env.pool().data(resolved) {
            TypeData::DynBehavior { behavior, .. } => Some(*behavior),
            _ => None,
        }
    }

    fn lower_cast(&mut self, id: ExprId, value: ExprId) -> Result<Option<Operand>, LowerError> {
        let from = self.type_of(value);
        let to = self.type_of(id);
        let operand = self.lower_value(value)?;
        if from == to {
            return Ok(Some(operand));
        }
        let kind = cast_kind(&from, &to);
        let dst = self.fresh();
        self.emit(Inst::Cast {
            dst,
            kind,
            from,
            to,
            value: operand,
        });
        Ok(Some(Operand::Value(dst)))
    }
}

fn signed(ty: &MirType) -> bool {
    matches!(
        ty,
        MirType::I8 | MirType::I16 | MirType::I32 | MirType::I64 | MirType::I128
    )
}

fn cast_kind(from: &MirType, to: &MirType) -> CastKind {
    use crate::model::type_size_bytes;
    match (from.is_float(), to.is_float()) {
        (true, true) => {
            if type_size_bytes(from) < type_size_bytes(to) {
                CastKind::FloatExtend
            } else {
                CastKind::FloatTruncate
            }
        }
        (true, false) => CastKind::FloatToInt,
        (false, true) => CastKind::IntToFloat,
        (false, false) => {
            if matches!(from, MirType::Ptr(_)) && to.is_integer() {
                CastKind::PtrToInt
            } else if from.is_integer() && matches!(to, MirType::Ptr(_)) {
                CastKind::IntToPtr
            } else if matches!(from, MirType::Ptr(_)) && matches!(to, MirType::Ptr(_)) {
                CastKind::Bitcast
            } else if type_size_bytes(from) < type_size_bytes(to) {
                if signed(from) {
                    CastKind::SignExtend
                } else {
                    CastKind::ZeroExtend
                }
            } else if type_size_bytes(from) > type_size_bytes(to) {
                CastKind::Truncate
            } else {
                CastKind::Bitcast
            }
        }
    }
}

fn binop_for(op: BinaryOp, operand_ty: &MirType) -> Option<BinOp> {
    let float = operand_ty.is_float();
    let mapped = match op {
        BinaryOp::Add => {
            if float {
                BinOp::FAdd
            } else {
                BinOp::Add
            }
        }
        BinaryOp::Sub => {
            if float {
                BinOp::FSub
            } else {
                BinOp::Sub
            }
        }
        BinaryOp::Mul => {
            if float {
                BinOp::FMul
            } else {
                BinOp::Mul
            }
        }
        BinaryOp::Div => {
            if float {
                BinOp::FDiv
            } else {
                BinOp::Div
            }
        }
        BinaryOp::Rem => BinOp::Rem,
        BinaryOp::Eq => {
            if float {
                BinOp::FEq
            } else {
                BinOp::Eq
            }
        }
        BinaryOp::Ne => {
            if float {
                BinOp::FNe
            } else {
                BinOp::Ne
            }
        }
        BinaryOp::Lt => {
            if float {
                BinOp::FLt
            } else {
                BinOp::Lt
            }
        }
        BinaryOp::Le => {
            if float {
                BinOp::FLe
            } else {
                BinOp::Le
            }
        }
        BinaryOp::Gt => {
            if float {
                BinOp::FGt
            } else {
                BinOp::Gt
            }
        }
        BinaryOp::Ge => {
            if float {
                BinOp::FGe
            } else {
                BinOp::Ge
            }
        }
        BinaryOp::And | BinaryOp::BitAnd => BinOp::And,
        BinaryOp::Or | BinaryOp::BitOr => BinOp::Or,
        BinaryOp::BitXor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::Assign
        | BinaryOp::AddAssign
        | BinaryOp::SubAssign
        | BinaryOp::MulAssign
        | BinaryOp::DivAssign
        | BinaryOp::RemAssign => return None,
    };
    Some(mapped)
}

fn arith_op_for(op: BinaryOp, operand_ty: &MirType) -> Option<BinOp> {
    let base = match op {
        BinaryOp::AddAssign => BinaryOp::Add,
        BinaryOp::SubAssign => BinaryOp::Sub,
        BinaryOp::MulAssign => BinaryOp::Mul,
        BinaryOp::DivAssign => BinaryOp::Div,
        BinaryOp::RemAssign => BinaryOp::Rem,
        _ => return None,
    };
    binop_for(base, operand_ty)
}
