//! MIR → LLVM-syntax text emission.
//!
//! Type definitions are written to one buffer, function bodies to
//! another, and the two are concatenated at the end so every emitted
//! instance has its dependencies in the type-definition prefix of the
//! output.
//!
//! Layout decisions:
//! - enums are `{ i32 tag, [N x i64] payload }`
//! - closures are `{ fn_ptr, env_ptr }` fat pairs
//! - behavior objects are `{ data_ptr, vtable_ptr }` fat pairs
//! - strings are private constant globals

use std::collections::BTreeSet;
use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use tml_mir::{
    BasicBlock, BinOp, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule, MirStruct,
    MirType, Operand, Terminator,
};

use crate::contract::CodegenOptions;

/// The emitter: accumulates type definitions, globals and function
/// bodies separately.
pub(crate) struct Emitter {
    pub(crate) types: String,
    pub(crate) globals: String,
    pub(crate) body: String,
    declared: BTreeSet<String>,
    str_count: u32,
    /// Names of functions defined in this module (symbol prefixing).
    local_funcs: FxHashSet<String>,
    /// `TML_MODULE` translation-unit prefix, if set.
    module_prefix: Option<String>,
    emit_comments: bool,
    debug_info: bool,
    /// Types of values in the function being emitted.
    value_types: FxHashMap<u32, MirType>,
    current_ret: MirType,
}

impl Emitter {
    pub(crate) fn new(opts: &CodegenOptions) -> Self {
        // The suite test infrastructure marks translation units via
        // TML_MODULE; symbols pick the prefix up here.
        let module_prefix = std::env::var("TML_MODULE").ok().filter(|p| !p.is_empty());
        Emitter {
            types: String::new(),
            globals: String::new(),
            body: String::new(),
            declared: BTreeSet::new(),
            str_count: 0,
            local_funcs: FxHashSet::default(),
            module_prefix,
            emit_comments: opts.emit_comments,
            debug_info: opts.debug_info,
            value_types: FxHashMap::default(),
            current_ret: MirType::Unit,
        }
    }

    pub(crate) fn finish(self) -> String {
        let mut out = String::new();
        out.push_str(&self.types);
        if !self.globals.is_empty() {
            out.push('\n');
            out.push_str(&self.globals);
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }

    pub(crate) fn note_local_funcs(&mut self, module: &MirModule) {
        for func in &module.functions {
            if !func.is_external {
                self.local_funcs.insert(func.name.clone());
            }
        }
    }

    /// Symbol name with the translation-unit prefix applied to
    /// module-local functions.
    fn symbol(&self, name: &str) -> String {
        let prefixed = match &self.module_prefix {
            Some(prefix) if self.local_funcs.contains(name) => {
                format!("{prefix}__{name}")
            }
            _ => name.to_string(),
        };
        quote_symbol(&prefixed)
    }

    // === Module pieces ===

    pub(crate) fn emit_module_header(&mut self, module: &MirModule, opts: &CodegenOptions) {
        if self.emit_comments {
            let _ = writeln!(self.types, "; module: {}", module.name);
        }
        if !opts.target_triple.is_empty() {
            let _ = writeln!(self.types, "target triple = \"{}\"", opts.target_triple);
        }
    }

    pub(crate) fn emit_struct(&mut self, def: &MirStruct) {
        if !self.declared.insert(def.name.clone()) {
            return;
        }
        let fields: Vec<String> = def.fields.iter().map(|(_, ty)| llvm_type(ty)).collect();
        let _ = writeln!(
            self.types,
            "%{} = type {{ {} }}",
            quote_type_name(&def.name),
            fields.join(", ")
        );
    }

    /// Enums: `{ i32 }` when no variant carries payload, otherwise
    /// `{ i32, [N x i64] }` with N covering the largest payload.
    pub(crate) fn emit_enum(&mut self, def: &MirEnum) {
        if !self.declared.insert(def.name.clone()) {
            return;
        }
        let words = def.payload_words();
        if self.emit_comments {
            let variants: Vec<&str> =
                def.variants.iter().map(|(name, _)| name.as_str()).collect();
            let _ = writeln!(self.types, "; enum {}: {}", def.name, variants.join(", "));
        }
        if words == 0 {
            let _ = writeln!(self.types, "%{} = type {{ i32 }}", quote_type_name(&def.name));
        } else {
            let _ = writeln!(
                self.types,
                "%{} = type {{ i32, [{words} x i64] }}",
                quote_type_name(&def.name)
            );
        }
    }

    /// A vtable global for one `(type, behavior)` pair: function
    /// pointers in declared method order.
    pub(crate) fn emit_vtable(&mut self, type_name: &str, behavior: &str, methods: &[String]) {
        let slots: Vec<String> = methods
            .iter()
            .map(|symbol| format!("i8* bitcast (i8* @{} to i8*)", quote_symbol(symbol)))
            .collect();
        let _ = writeln!(
            self.globals,
            "@\"vtable${type_name}${behavior}\" = internal constant [{} x i8*] [{}]",
            methods.len(),
            slots.join(", ")
        );
    }

    pub(crate) fn emit_constant_global(&mut self, name: &str, value: &Constant) {
        match value {
            Constant::Int(v) => {
                let _ = writeln!(self.globals, "@{} = constant i64 {v}", quote_symbol(name));
            }
            Constant::Float(bits) => {
                let _ = writeln!(
                    self.globals,
                    "@{} = constant double 0x{bits:016X}",
                    quote_symbol(name)
                );
            }
            Constant::Bool(v) => {
                let _ = writeln!(
                    self.globals,
                    "@{} = constant i1 {}",
                    quote_symbol(name),
                    if *v { "true" } else { "false" }
                );
            }
            Constant::Str(s) => {
                let literal = self.intern_string(s);
                let _ = writeln!(
                    self.globals,
                    "@{} = constant i8* {literal}",
                    quote_symbol(name)
                );
            }
            Constant::Unit => {}
        }
    }

    fn intern_string(&mut self, value: &str) -> String {
        let index = self.str_count;
        self.str_count += 1;
        let escaped = escape_string(value);
        let len = value.len() + 1;
        let _ = writeln!(
            self.globals,
            "@.str.{index} = private unnamed_addr constant [{len} x i8] c\"{escaped}\\00\""
        );
        format!(
            "getelementptr inbounds ([{len} x i8], [{len} x i8]* @.str.{index}, i64 0, i64 0)"
        )
    }

    // === Functions ===

    pub(crate) fn declare_function(&mut self, func: &MirFunction) {
        let params: Vec<String> = func.params.iter().map(|(_, ty)| llvm_type(ty)).collect();
        let _ = writeln!(
            self.body,
            "declare {} @{}({})",
            llvm_ret_type(&func.ret),
            self.symbol(&func.name),
            params.join(", ")
        );
    }

    /// Declare a runtime-provided symbol by name and signature text.
    pub(crate) fn declare_runtime(&mut self, name: &str, signature: &str) {
        if self.declared.insert(format!("decl${name}")) {
            let _ = writeln!(self.body, "declare {signature}");
        }
    }

    pub(crate) fn emit_function(&mut self, func: &MirFunction, opts: &CodegenOptions) {
        if func.is_external {
            self.declare_function(func);
            return;
        }
        if self.debug_info {
            let _ = writeln!(self.body, "; !dbg function {}", func.name);
        }
        // Value types: params first, then every instruction result.
        self.value_types.clear();
        for (index, (_, ty)) in func.params.iter().enumerate() {
            self.value_types.insert(index as u32, ty.clone());
        }
        for block in &func.blocks {
            for inst in &block.instructions {
                if let Some((dst, ty)) = inst_result_type(inst) {
                    self.value_types.insert(dst, ty);
                }
            }
        }
        self.current_ret = func.ret.clone();
        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(index, (_, ty))| format!("{} %v{index}", llvm_type(ty)))
            .collect();
        let export = if opts.dll_export { "dllexport " } else { "" };
        let _ = writeln!(
            self.body,
            "define {export}{} @{}({}) {{",
            llvm_ret_type(&func.ret),
            self.symbol(&func.name),
            params.join(", ")
        );
        for block in &func.blocks {
            self.emit_block(block);
        }
        let _ = writeln!(self.body, "}}\n");
    }

    fn emit_block(&mut self, block: &BasicBlock) {
        let _ = writeln!(self.body, "bb{}:", block.id.0);
        for inst in &block.instructions {
            self.emit_inst(inst);
        }
        self.emit_terminator(&block.terminator);
    }

    fn operand(&mut self, operand: &Operand, ty: &MirType) -> String {
        match operand {
            Operand::Value(id) => format!("%v{}", id.0),
            Operand::Const(value) => self.constant_text(value, ty),
        }
    }

    /// Operand text plus its tracked type (constants infer their own).
    fn typed_operand(&mut self, operand: &Operand) -> (String, MirType) {
        match operand {
            Operand::Value(id) => {
                let ty = self
                    .value_types
                    .get(&id.0)
                    .cloned()
                    .unwrap_or(MirType::I64);
                (format!("%v{}", id.0), ty)
            }
            Operand::Const(value) => {
                let ty = match value {
                    Constant::Int(_) => MirType::I64,
                    Constant::Float(_) => MirType::F64,
                    Constant::Bool(_) => MirType::Bool,
                    Constant::Str(_) => MirType::Str,
                    Constant::Unit => MirType::Unit,
                };
                (self.constant_text(value, &ty), ty)
            }
        }
    }

    fn constant_text(&mut self, value: &Constant, ty: &MirType) -> String {
        match value {
            Constant::Int(v) => {
                if matches!(ty, MirType::Ptr(_)) {
                    // Null environments/pointers arrive as integer 0.
                    "null".to_string()
                } else {
                    v.to_string()
                }
            }
            Constant::Float(bits) => format!("0x{bits:016X}"),
            Constant::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            Constant::Str(s) => self.intern_string(s),
            Constant::Unit => "0".to_string(),
        }
    }

    fn emit_inst(&mut self, inst: &Inst) {
        match inst {
            Inst::Binary {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(lhs, ty);
                let rhs = self.operand(rhs, ty);
                let signed = !matches!(
                    ty,
                    MirType::U8 | MirType::U16 | MirType::U32 | MirType::U64 | MirType::U128
                );
                let _ = writeln!(
                    self.body,
                    "  %v{} = {} {} {lhs}, {rhs}",
                    dst.0,
                    llvm_binop(*op, signed),
                    llvm_type(ty)
                );
            }
            Inst::Alloca { dst, ty } => {
                let _ = writeln!(self.body, "  %v{} = alloca {}", dst.0, llvm_type(ty));
            }
            Inst::Load { dst, ty, ptr } => {
                let ty_text = llvm_type(ty);
                let ptr = self.operand(ptr, &MirType::ptr_to(ty.clone()));
                let _ = writeln!(
                    self.body,
                    "  %v{} = load {ty_text}, {ty_text}* {ptr}",
                    dst.0
                );
            }
            Inst::Store { ty, ptr, value } => {
                let ty_text = llvm_type(ty);
                let value = self.operand(value, ty);
                let ptr = self.operand(ptr, &MirType::ptr_to(ty.clone()));
                let _ = writeln!(self.body, "  store {ty_text} {value}, {ty_text}* {ptr}");
            }
            Inst::Gep {
                dst,
                ty,
                base,
                index,
            } => {
                let ty_text = llvm_type(ty);
                let base = self.operand(base, &MirType::ptr_to(MirType::U8));
                let _ = writeln!(
                    self.body,
                    "  %v{} = getelementptr inbounds {ty_text}, i8* {base}, i32 0, i32 {index}",
                    dst.0
                );
            }
            Inst::Call { dst, func, ty, args } => {
                let args_text = self.typed_args(args);
                let symbol = self.symbol(func);
                match dst {
                    Some(dst) => {
                        let _ = writeln!(
                            self.body,
                            "  %v{} = call {} @{symbol}({args_text})",
                            dst.0,
                            llvm_ret_type(ty)
                        );
                    }
                    None => {
                        let _ = writeln!(
                            self.body,
                            "  call {} @{symbol}({args_text})",
                            llvm_ret_type(ty)
                        );
                    }
                }
            }
            Inst::CallIndirect {
                dst,
                callee,
                ty,
                args,
            } => {
                let callee = self.operand(callee, &MirType::ptr_to(MirType::U8));
                let args_text = self.typed_args(args);
                match dst {
                    Some(dst) => {
                        let _ = writeln!(
                            self.body,
                            "  %v{} = call {} {callee}({args_text})",
                            dst.0,
                            llvm_ret_type(ty)
                        );
                    }
                    None => {
                        let _ = writeln!(
                            self.body,
                            "  call {} {callee}({args_text})",
                            llvm_ret_type(ty)
                        );
                    }
                }
            }
            Inst::Cast {
                dst,
                kind,
                from,
                to,
                value,
            } => {
                let value = self.operand(value, from);
                let _ = writeln!(
                    self.body,
                    "  %v{} = {} {} {value} to {}",
                    dst.0,
                    llvm_cast(*kind),
                    llvm_type(from),
                    llvm_type(to)
                );
            }
            Inst::Phi { dst, ty, incomings } => {
                let arms: Vec<String> = incomings
                    .iter()
                    .map(|(value, block)| {
                        let value = self.operand(value, ty);
                        format!("[ {value}, %bb{} ]", block.0)
                    })
                    .collect();
                let _ = writeln!(
                    self.body,
                    "  %v{} = phi {} {}",
                    dst.0,
                    llvm_type(ty),
                    arms.join(", ")
                );
            }
            Inst::MakeStruct { dst, ty, fields }
            | Inst::MakeTuple {
                dst,
                ty,
                elements: fields,
            } => {
                let ty_text = llvm_type(ty);
                let mut current = "undef".to_string();
                for (index, field) in fields.iter().enumerate() {
                    let (value, value_ty) = self.typed_operand(field);
                    let next = if index + 1 == fields.len() {
                        format!("%v{}", dst.0)
                    } else {
                        format!("%v{}.{index}", dst.0)
                    };
                    let _ = writeln!(
                        self.body,
                        "  {next} = insertvalue {ty_text} {current}, {} {value}, {index}",
                        llvm_type(&value_ty)
                    );
                    current = next;
                }
                if fields.is_empty() {
                    let _ = writeln!(self.body, "  %v{} = insertvalue {ty_text} undef, i8 0, 0", dst.0);
                }
            }
            Inst::MakeEnum {
                dst,
                ty,
                tag,
                payload,
            } => {
                let ty_text = llvm_type(ty);
                let mut current = format!("%v{}.tag", dst.0);
                let _ = writeln!(
                    self.body,
                    "  {current} = insertvalue {ty_text} undef, i32 {tag}, 0"
                );
                for (index, value) in payload.iter().enumerate() {
                    let (value, _) = self.typed_operand(value);
                    let next = if index + 1 == payload.len() {
                        format!("%v{}", dst.0)
                    } else {
                        format!("%v{}.{index}", dst.0)
                    };
                    let _ = writeln!(
                        self.body,
                        "  {next} = insertvalue {ty_text} {current}, i64 {value}, 1, {index}"
                    );
                    current = next;
                }
                if payload.is_empty() {
                    let _ = writeln!(
                        self.body,
                        "  %v{} = insertvalue {ty_text} {current}, i32 {tag}, 0",
                        dst.0
                    );
                }
            }
            Inst::EnumTag { dst, value } => {
                let (value, value_ty) = self.typed_operand(value);
                let _ = writeln!(
                    self.body,
                    "  %v{} = extractvalue {} {value}, 0",
                    dst.0,
                    llvm_type(&value_ty)
                );
            }
            Inst::EnumPayload {
                dst,
                value,
                index,
                ..
            } => {
                let (value, value_ty) = self.typed_operand(value);
                let _ = writeln!(
                    self.body,
                    "  %v{} = extractvalue {} {value}, 1, {index}",
                    dst.0,
                    llvm_type(&value_ty)
                );
            }
            Inst::GlobalAddr { dst, name, ty } => {
                let _ = writeln!(
                    self.body,
                    "  %v{} = bitcast i8* @{} to {}",
                    dst.0,
                    quote_symbol(name),
                    llvm_type(ty)
                );
            }
        }
    }

    fn typed_args(&mut self, args: &[Operand]) -> String {
        args.iter()
            .map(|arg| {
                let (text, ty) = self.typed_operand(arg);
                format!("{} {text}", llvm_type(&ty))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn emit_terminator(&mut self, term: &Terminator) {
        match term {
            Terminator::Br(block) => {
                let _ = writeln!(self.body, "  br label %bb{}", block.0);
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.operand(cond, &MirType::Bool);
                let _ = writeln!(
                    self.body,
                    "  br i1 {cond}, label %bb{}, label %bb{}",
                    then_block.0, else_block.0
                );
            }
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                let (value, _) = self.typed_operand(value);
                let arms: Vec<String> = cases
                    .iter()
                    .map(|(case, block)| format!("i64 {case}, label %bb{}", block.0))
                    .collect();
                let _ = writeln!(
                    self.body,
                    "  switch i64 {value}, label %bb{} [ {} ]",
                    default.0,
                    arms.join(" ")
                );
            }
            Terminator::Ret(None) => {
                let _ = writeln!(self.body, "  ret void");
            }
            Terminator::Ret(Some(value)) => {
                let ret_ty = self.current_ret.clone();
                if ret_ty.is_unit() {
                    let _ = writeln!(self.body, "  ret void");
                } else {
                    let value = self.operand(value, &ret_ty);
                    let _ = writeln!(self.body, "  ret {} {value}", llvm_type(&ret_ty));
                }
            }
            Terminator::Unreachable => {
                let _ = writeln!(self.body, "  unreachable");
            }
        }
    }

    /// The C entry wrapper for executables.
    pub(crate) fn emit_exe_main(&mut self, entry: &str) {
        let symbol = self.symbol(entry);
        let _ = writeln!(
            self.body,
            "define i32 @main(i32 %argc, i8** %argv) {{\nentry:\n  call void @{symbol}()\n  ret i32 0\n}}\n"
        );
    }
}

/// LLVM spelling of a MIR type in value position.
pub(crate) fn llvm_type(ty: &MirType) -> String {
    match ty {
        MirType::I8 | MirType::U8 => "i8".to_string(),
        MirType::I16 | MirType::U16 => "i16".to_string(),
        MirType::I32 | MirType::U32 => "i32".to_string(),
        MirType::I64 | MirType::U64 => "i64".to_string(),
        MirType::I128 | MirType::U128 => "i128".to_string(),
        MirType::F32 => "float".to_string(),
        MirType::F64 => "double".to_string(),
        MirType::Bool => "i1".to_string(),
        MirType::Char => "i32".to_string(),
        MirType::Str => "i8*".to_string(),
        // Unit values only appear as placeholders.
        MirType::Unit | MirType::Never => "i8".to_string(),
        MirType::Named(name) => format!("%{}", quote_type_name(name)),
        MirType::Ptr(inner) => format!("{}*", llvm_type(inner)),
        MirType::Array(element, size) => format!("[{size} x {}]", llvm_type(element)),
        MirType::Tuple(elements) => {
            let fields: Vec<String> = elements.iter().map(llvm_type).collect();
            format!("{{ {} }}", fields.join(", "))
        }
        MirType::Func { params, ret } => {
            let params: Vec<String> = params.iter().map(llvm_type).collect();
            format!("{} ({})*", llvm_ret_type(ret), params.join(", "))
        }
    }
}

/// LLVM spelling in return position (Unit becomes void).
pub(crate) fn llvm_ret_type(ty: &MirType) -> String {
    match ty {
        MirType::Unit | MirType::Never => "void".to_string(),
        other => llvm_type(other),
    }
}

fn llvm_binop(op: BinOp, signed: bool) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => {
            if signed {
                "sdiv"
            } else {
                "udiv"
            }
        }
        BinOp::Rem => {
            if signed {
                "srem"
            } else {
                "urem"
            }
        }
        BinOp::FAdd => "fadd",
        BinOp::FSub => "fsub",
        BinOp::FMul => "fmul",
        BinOp::FDiv => "fdiv",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => {
            if signed {
                "ashr"
            } else {
                "lshr"
            }
        }
        BinOp::Eq => "icmp eq",
        BinOp::Ne => "icmp ne",
        BinOp::Lt => {
            if signed {
                "icmp slt"
            } else {
                "icmp ult"
            }
        }
        BinOp::Le => {
            if signed {
                "icmp sle"
            } else {
                "icmp ule"
            }
        }
        BinOp::Gt => {
            if signed {
                "icmp sgt"
            } else {
                "icmp ugt"
            }
        }
        BinOp::Ge => {
            if signed {
                "icmp sge"
            } else {
                "icmp uge"
            }
        }
        BinOp::FEq => "fcmp oeq",
        BinOp::FNe => "fcmp one",
        BinOp::FLt => "fcmp olt",
        BinOp::FLe => "fcmp ole",
        BinOp::FGt => "fcmp ogt",
        BinOp::FGe => "fcmp oge",
    }
}

fn llvm_cast(kind: CastKind) -> &'static str {
    match kind {
        CastKind::ZeroExtend => "zext",
        CastKind::SignExtend => "sext",
        CastKind::Truncate => "trunc",
        CastKind::FloatToInt => "fptosi",
        CastKind::IntToFloat => "sitofp",
        CastKind::FloatExtend => "fpext",
        CastKind::FloatTruncate => "fptrunc",
        CastKind::Bitcast => "bitcast",
        CastKind::PtrToInt => "ptrtoint",
        CastKind::IntToPtr => "inttoptr",
    }
}

/// The type an instruction's destination value carries.
fn inst_result_type(inst: &Inst) -> Option<(u32, MirType)> {
    match inst {
        Inst::Binary { dst, op, ty, .. } => {
            let ty = if op.is_comparison() {
                MirType::Bool
            } else {
                ty.clone()
            };
            Some((dst.0, ty))
        }
        Inst::Alloca { dst, ty } => Some((dst.0, MirType::ptr_to(ty.clone()))),
        Inst::Load { dst, ty, .. } => Some((dst.0, ty.clone())),
        Inst::Gep { dst, ty, .. } => Some((dst.0, MirType::ptr_to(ty.clone()))),
        Inst::Call { dst, ty, .. } | Inst::CallIndirect { dst, ty, .. } => {
            dst.map(|dst| (dst.0, ty.clone()))
        }
        Inst::Cast { dst, to, .. } => Some((dst.0, to.clone())),
        Inst::Phi { dst, ty, .. }
        | Inst::MakeStruct { dst, ty, .. }
        | Inst::MakeTuple { dst, ty, .. }
        | Inst::MakeEnum { dst, ty, .. } => Some((dst.0, ty.clone())),
        Inst::EnumTag { dst, .. } => Some((dst.0, MirType::I32)),
        Inst::EnumPayload { dst, ty, .. } => Some((dst.0, ty.clone())),
        Inst::GlobalAddr { dst, ty, .. } => Some((dst.0, ty.clone())),
        Inst::Store { .. } => None,
    }
}

/// Symbols with `::` or `$` need quoting in LLVM.
fn quote_symbol(name: &str) -> String {
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

fn quote_type_name(name: &str) -> String {
    quote_symbol(name)
}

fn escape_string(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        if (0x20..0x7F).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{byte:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_spellings() {
        assert_eq!(llvm_type(&MirType::I32), "i32");
        assert_eq!(llvm_type(&MirType::Bool), "i1");
        assert_eq!(llvm_type(&MirType::ptr_to(MirType::U8)), "i8*");
        assert_eq!(
            llvm_type(&MirType::Tuple(vec![
                MirType::ptr_to(MirType::U8),
                MirType::ptr_to(MirType::U8)
            ])),
            "{ i8*, i8* }"
        );
        assert_eq!(llvm_type(&MirType::Named("List__I64".into())), "%List__I64");
        assert_eq!(llvm_ret_type(&MirType::Unit), "void");
    }

    #[test]
    fn quoted_symbols() {
        assert_eq!(quote_symbol("add"), "add");
        assert_eq!(quote_symbol("List::push__I64"), "\"List::push__I64\"");
        assert_eq!(quote_symbol("vtable$Point$Show"), "\"vtable$Point$Show\"");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(escape_string("hi"), "hi");
        assert_eq!(escape_string("a\nb"), "a\\0Ab");
        assert_eq!(escape_string("q\"q"), "q\\22q");
    }
}
