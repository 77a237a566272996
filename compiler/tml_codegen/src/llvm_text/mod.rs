//! The reference backend: emits LLVM-syntax text IR.
//!
//! Two code paths, as in the backend contract:
//! - `compile_mir` walks an already-lowered MIR module;
//! - `compile_ast` runs monomorphization first (specialized instances,
//!   handle structs, enum layouts, vtables) and then lowers and emits
//!   every function, including generic instances specialized by a
//!   MIR-level type substitution.

mod emit;

use rustc_hash::FxHashMap;
use tml_ir::ast::Module;
use tml_ir::{AstArena, CancelToken};
use tml_mir::{
    lower_function, lower_module, mir_type_of, BasicBlock, Inst, MirEnum, MirFunction, MirModule,
    MirStruct, MirType,
};
use tml_mono::{ImplMethodRequest, Monomorphizer};
use tml_typeck::TypedModule;
use tml_types::{TypeEnv, TypeId};

use crate::contract::{
    Backend, BackendCapabilities, BackendError, CodegenOptions, CodegenResult,
};
use self::emit::Emitter;

/// The reference LLVM-text backend.
#[derive(Default)]
pub struct LlvmTextBackend {
    _private: (),
}

impl LlvmTextBackend {
    pub fn new() -> Self {
        LlvmTextBackend::default()
    }

    fn emit_mir_module(
        &self,
        module: &MirModule,
        func_indices: Option<&[usize]>,
        opts: &CodegenOptions,
    ) -> Result<String, BackendError> {
        if opts.optimization_level > self.capabilities().max_optimization_level {
            return Err(BackendError::Emission(format!(
                "optimization level {} exceeds backend maximum {}",
                opts.optimization_level,
                self.capabilities().max_optimization_level
            )));
        }
        let mut emitter = Emitter::new(opts);
        emitter.note_local_funcs(module);
        emitter.emit_module_header(module, opts);

        // Type definitions precede all function definitions.
        for def in &module.structs {
            emitter.emit_struct(def);
        }
        for def in &module.enums {
            emitter.emit_enum(def);
        }
        for (name, value) in &module.constants {
            emitter.emit_constant_global(name, value);
        }

        emitter.declare_runtime("tml_closure_env_new", "i8* @tml_closure_env_new(i64)");

        match func_indices {
            Some(indices) => {
                for &index in indices {
                    let Some(func) = module.functions.get(index) else {
                        return Err(BackendError::Emission(format!(
                            "CGU references function index {index} out of range"
                        )));
                    };
                    emitter.emit_function(func, opts);
                }
            }
            None => {
                for func in &module.functions {
                    emitter.emit_function(func, opts);
                }
            }
        }

        if opts.generate_exe_main && module.function("main").is_some() {
            emitter.emit_exe_main("main");
        }
        Ok(emitter.finish())
    }
}

impl Backend for LlvmTextBackend {
    fn name(&self) -> &'static str {
        "llvm-text"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_mir: true,
            supports_ast: true,
            supports_generics: true,
            supports_debug_info: true,
            supports_coverage: false,
            supports_cgu: true,
            max_optimization_level: 3,
        }
    }

    fn compile_mir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        tracing::debug!(module = %module.name, "compiling MIR module");
        let ir = self.emit_mir_module(module, None, opts)?;
        Ok(CodegenResult::success_ir(ir))
    }

    fn compile_mir_cgu(
        &self,
        module: &MirModule,
        func_indices: &[usize],
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        tracing::debug!(
            module = %module.name,
            functions = func_indices.len(),
            "compiling CGU"
        );
        let ir = self.emit_mir_module(module, Some(func_indices), opts)?;
        Ok(CodegenResult::success_ir(ir))
    }

    fn compile_ast(
        &self,
        module: &Module,
        arena: &AstArena,
        typed: &TypedModule,
        env: &mut TypeEnv,
        opts: &CodegenOptions,
    ) -> Result<CodegenResult, BackendError> {
        // === Monomorphization: driven from the call sites the
        // checker resolved; the engine drains to fixpoint before any
        // emission ends. ===
        let mut mono = Monomorphizer::new(env);
        for target in typed.call_targets.values() {
            if target.sig.type_params.is_empty() {
                continue;
            }
            let args: Vec<TypeId> = target
                .sig
                .type_params
                .iter()
                .map(|param| target.subst.get(param).copied().unwrap_or(TypeId::UNIT))
                .collect();
            mono.require_func_instantiation(target.name, &args);

            // Qualified targets are impl-method discoveries; they go
            // through the pending queue and its dedup set.
            let name_str = mono.env().interner().lookup(target.name).to_string();
            if let Some((base, method)) = name_str.split_once("::") {
                let base = mono.env().interner().intern(base);
                let method = mono.env().interner().intern(method);
                let mangled_type = tml_mono::mangle_func_name(
                    mono.env().pool(),
                    mono.env().interner(),
                    &name_str,
                    &args,
                );
                mono.enqueue_impl_method(ImplMethodRequest {
                    mangled_type,
                    base_type: base,
                    method,
                    subst: target.subst.clone(),
                    suffix: None,
                    is_library: false,
                });
            }
        }
        for &ty in &typed.expr_types {
            mono.require_type(ty);
        }
        let cancel = CancelToken::new();
        let impl_requests = mono.drain_impl_methods(&cancel)?;

        // Placeholder leak check.
        let leaks = mono.placeholder_leaks();
        if !leaks.is_empty() {
            let names: Vec<&str> = leaks.iter().map(|l| l.mangled.as_str()).collect();
            return Ok(CodegenResult::error(format!(
                "internal compiler error: placeholder type(s) leaked to code generation: {}",
                names.join(", ")
            )));
        }
        if !mono.errors().is_empty() {
            let message = mono
                .errors()
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(CodegenResult::error(message));
        }

        // Collect the instance tables before releasing the engine.
        let struct_instances: Vec<(String, Vec<(String, TypeId)>)> = mono
            .struct_instances()
            .map(|inst| {
                let fields = inst.fields.clone();
                (inst.mangled.clone(), fields)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(mangled, fields)| {
                let fields = fields
                    .into_iter()
                    .map(|(name, ty)| {
                        let field = mono.env().interner().lookup(name).to_string();
                        (field, ty)
                    })
                    .collect::<Vec<_>>();
                (mangled, fields)
            })
            .collect();
        let enum_instances: Vec<(String, Vec<(String, Vec<TypeId>)>)> = mono
            .enum_instances()
            .map(|inst| {
                let variants = inst
                    .variants
                    .iter()
                    .map(|(name, payload)| {
                        (
                            mono.env().interner().lookup(*name).to_string(),
                            payload.clone(),
                        )
                    })
                    .collect();
                (inst.mangled.clone(), variants)
            })
            .collect();
        let func_instances: Vec<(String, tml_ir::Name, tml_types::Subst, Vec<TypeId>, TypeId)> =
            mono.func_instances()
                .map(|inst| {
                    (
                        inst.mangled.clone(),
                        inst.base,
                        inst.subst.clone(),
                        inst.params.clone(),
                        inst.ret,
                    )
                })
                .collect();
        drop(impl_requests);
        drop(mono); // releases the &mut env borrow for lowering

        // === Lowering ===
        let mut mir = lower_module(module, arena, typed, env)
            .map_err(|err| BackendError::Emission(err.to_string()))?;

        // Monomorphized struct/enum instances become module layouts.
        for (mangled, fields) in struct_instances {
            let fields = fields
                .into_iter()
                .map(|(name, ty)| (name, mir_type_of(env, ty)))
                .collect();
            mir.structs.push(MirStruct {
                name: mangled,
                fields,
            });
        }
        for (mangled, variants) in enum_instances {
            let variants = variants
                .into_iter()
                .map(|(name, payload)| {
                    (
                        name,
                        payload.into_iter().map(|ty| mir_type_of(env, ty)).collect(),
                    )
                })
                .collect();
            mir.enums.push(MirEnum {
                name: mangled,
                variants,
            });
        }

        // Impl methods with bodies are emitted under their qualified
        // names (vtables point at them).
        for imp in &module.impls {
            for method in &imp.methods {
                if !method.type_params.is_empty() || !method.body.is_valid() {
                    continue;
                }
                let qualified = env.qualify(imp.type_name, method.name);
                let qualified_str = env.interner().lookup(qualified).to_string();
                if mir.function(&qualified_str).is_some() {
                    continue;
                }
                let lowered = lower_function(method, arena, typed, env, Some(qualified_str))
                    .map_err(|err| BackendError::Emission(err.to_string()))?;
                mir.functions.extend(lowered);
            }
        }

        // Generic function instances: lower the base body once per
        // instance, then substitute the parameter types at the MIR
        // level.
        for (mangled, base, subst, inst_params, inst_ret) in func_instances {
            if mir.function(&mangled).is_some() {
                continue;
            }
            let Some(source) = find_function_ast(module, env, base) else {
                // Runtime-backed generic (collections): declare the
                // specialized symbol, the runtime provides the body.
                let params = inst_params
                    .iter()
                    .enumerate()
                    .map(|(index, &ty)| (format!("a{index}"), mir_type_of(env, ty)))
                    .collect();
                let ret = mir_type_of(env, inst_ret);
                mir.functions.push(MirFunction {
                    name: mangled,
                    params,
                    ret,
                    blocks: Vec::new(),
                    is_external: true,
                });
                continue;
            };
            let type_map = mir_subst_map(env, &source.type_params, &subst);
            let lowered = lower_function(source, arena, typed, env, Some(mangled))
                .map_err(|err| BackendError::Emission(err.to_string()))?;
            for func in lowered {
                mir.functions.push(specialize_function(func, &type_map));
            }
        }

        // === Emission ===
        let ir = {
            let mut emitter = Emitter::new(opts);
            emitter.note_local_funcs(&mir);
            emitter.emit_module_header(&mir, opts);
            for def in &mir.structs {
                emitter.emit_struct(def);
            }
            for def in &mir.enums {
                emitter.emit_enum(def);
            }
            for (name, value) in &mir.constants {
                emitter.emit_constant_global(name, value);
            }

            // Vtables: one per (type, behavior) pair, methods in
            // declared order.
            for (type_name, behavior) in env.impl_pairs() {
                let Some(def) = env.lookup_behavior(behavior) else {
                    continue;
                };
                let methods: Vec<String> = def
                    .methods
                    .iter()
                    .map(|m| {
                        format!(
                            "{}::{}",
                            env.interner().lookup(type_name),
                            env.interner().lookup(m.name)
                        )
                    })
                    .collect();
                emitter.emit_vtable(
                    &env.interner().lookup(type_name),
                    &env.interner().lookup(behavior),
                    &methods,
                );
            }

            emitter.declare_runtime("tml_closure_env_new", "i8* @tml_closure_env_new(i64)");
            for func in &mir.functions {
                emitter.emit_function(func, opts);
            }
            if opts.generate_exe_main && mir.function("main").is_some() {
                emitter.emit_exe_main("main");
            }
            emitter.finish()
        };

        let mut result = CodegenResult::success_ir(ir);
        // Libraries from @link decorators flow to the linker.
        for overload_name in env.all_func_names() {
            for sig in env.all_overloads(overload_name) {
                for &lib in &sig.link_libs {
                    result.link_libs.insert(env.interner().lookup(lib).to_string());
                }
            }
        }
        Ok(result)
    }

    fn generate_ir(
        &self,
        module: &MirModule,
        opts: &CodegenOptions,
    ) -> Result<String, BackendError> {
        self.emit_mir_module(module, None, opts)
    }
}

/// Find the AST declaration behind an instance base name: a top-level
/// generic function or an impl method (qualified name).
fn find_function_ast<'a>(
    module: &'a Module,
    env: &TypeEnv,
    base: tml_ir::Name,
) -> Option<&'a tml_ir::ast::Function> {
    if let Some(func) = module
        .functions
        .iter()
        .find(|f| f.name == base && !f.type_params.is_empty())
    {
        return Some(func);
    }
    for imp in &module.impls {
        for method in &imp.methods {
            if env.qualify(imp.type_name, method.name) == base {
                return Some(method);
            }
        }
    }
    None
}

/// Map generic parameter spellings to concrete MIR types.
fn mir_subst_map(
    env: &mut TypeEnv,
    type_params: &[tml_ir::Name],
    subst: &tml_types::Subst,
) -> FxHashMap<String, MirType> {
    let mut map = FxHashMap::default();
    for &param in type_params {
        if let Some(&bound) = subst.get(&param) {
            let concrete = mir_type_of(env, bound);
            map.insert(env.interner().lookup(param).to_string(), concrete);
        }
    }
    map
}

/// Rewrite a lowered function's types through the parameter map.
fn specialize_function(func: MirFunction, map: &FxHashMap<String, MirType>) -> MirFunction {
    if map.is_empty() {
        return func;
    }
    MirFunction {
        name: func.name,
        params: func
            .params
            .into_iter()
            .map(|(name, ty)| (name, subst_type(ty, map)))
            .collect(),
        ret: subst_type(func.ret, map),
        blocks: func
            .blocks
            .into_iter()
            .map(|block| BasicBlock {
                id: block.id,
                instructions: block
                    .instructions
                    .into_iter()
                    .map(|inst| subst_inst(inst, map))
                    .collect(),
                terminator: block.terminator,
            })
            .collect(),
        is_external: func.is_external,
    }
}

fn subst_type(ty: MirType, map: &FxHashMap<String, MirType>) -> MirType {
    match ty {
        MirType::Named(name) => match map.get(&name) {
            Some(concrete) => concrete.clone(),
            None => MirType::Named(name),
        },
        MirType::Ptr(inner) => MirType::ptr_to(subst_type(*inner, map)),
        MirType::Array(element, size) => {
            MirType::Array(Box::new(subst_type(*element, map)), size)
        }
        MirType::Tuple(elements) => MirType::Tuple(
            elements
                .into_iter()
                .map(|e| subst_type(e, map))
                .collect(),
        ),
        MirType::Func { params, ret } => MirType::Func {
            params: params.into_iter().map(|p| subst_type(p, map)).collect(),
            ret: Box::new(subst_type(*ret, map)),
        },
        other => other,
    }
}

fn subst_inst(inst: Inst, map: &FxHashMap<String, MirType>) -> Inst {
    match inst {
        Inst::Binary {
            dst,
            op,
            ty,
            lhs,
            rhs,
        } => Inst::Binary {
            dst,
            op,
            ty: subst_type(ty, map),
            lhs,
            rhs,
        },
        Inst::Alloca { dst, ty } => Inst::Alloca {
            dst,
            ty: subst_type(ty, map),
        },
        Inst::Load { dst, ty, ptr } => Inst::Load {
            dst,
            ty: subst_type(ty, map),
            ptr,
        },
        Inst::Store { ty, ptr, value } => Inst::Store {
            ty: subst_type(ty, map),
            ptr,
            value,
        },
        Inst::Gep {
            dst,
            ty,
            base,
            index,
        } => Inst::Gep {
            dst,
            ty: subst_type(ty, map),
            base,
            index,
        },
        Inst::Call { dst, func, ty, args } => Inst::Call {
            dst,
            func,
            ty: subst_type(ty, map),
            args,
        },
        Inst::CallIndirect {
            dst,
            callee,
            ty,
            args,
        } => Inst::CallIndirect {
            dst,
            callee,
            ty: subst_type(ty, map),
            args,
        },
        Inst::Cast {
            dst,
            kind,
            from,
            to,
            value,
        } => Inst::Cast {
            dst,
            kind,
            from: subst_type(from, map),
            to: subst_type(to, map),
            value,
        },
        Inst::Phi { dst, ty, incomings } => Inst::Phi {
            dst,
            ty: subst_type(ty, map),
            incomings,
        },
        Inst::MakeStruct { dst, ty, fields } => Inst::MakeStruct {
            dst,
            ty: subst_type(ty, map),
            fields,
        },
        Inst::MakeTuple { dst, ty, elements } => Inst::MakeTuple {
            dst,
            ty: subst_type(ty, map),
            elements,
        },
        Inst::MakeEnum {
            dst,
            ty,
            tag,
            payload,
        } => Inst::MakeEnum {
            dst,
            ty: subst_type(ty, map),
            tag,
            payload,
        },
        Inst::EnumTag { dst, value } => Inst::EnumTag { dst, value },
        Inst::EnumPayload {
            dst,
            ty,
            value,
            index,
        } => Inst::EnumPayload {
            dst,
            ty: subst_type(ty, map),
            value,
            index,
        },
        Inst::GlobalAddr { dst, name, ty } => Inst::GlobalAddr {
            dst,
            name,
            ty: subst_type(ty, map),
        },
    }
}
