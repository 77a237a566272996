//! MIR pretty printer.
//!
//! The text serialization format: regular enough for the recursive
//! descent reader to parse back, readable enough for `--emit-mir` and
//! test diffs.
//!
//! ```text
//! ; MIR Module: demo
//!
//! struct Point { x: I32, y: I32 }
//!
//! func @add(%a: I32, %b: I32) -> I32 {
//! bb0:
//!     %2 = binary Add I32, %0, %1
//!     ret %2
//! }
//! ```

use std::fmt::Write;

use crate::model::{
    BasicBlock, Constant, Inst, MirFunction, MirModule, Operand, Terminator,
};

/// Print a whole module.
pub fn print_module(module: &MirModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; MIR Module: {}", module.name);

    for def in &module.structs {
        out.push('\n');
        let _ = write!(out, "struct {} {{ ", def.name);
        for (i, (field, ty)) in def.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{field}: {ty}");
        }
        out.push_str(" }\n");
    }

    for def in &module.enums {
        out.push('\n');
        let _ = write!(out, "enum {} {{ ", def.name);
        for (i, (variant, payload)) in def.variants.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{variant}");
            if !payload.is_empty() {
                out.push('(');
                for (j, ty) in payload.iter().enumerate() {
                    if j > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{ty}");
                }
                out.push(')');
            }
        }
        out.push_str(" }\n");
    }

    for (name, value) in &module.constants {
        out.push('\n');
        let _ = writeln!(out, "const {name} = {}", print_constant(value));
    }

    for func in &module.functions {
        out.push('\n');
        print_function(&mut out, func);
    }

    out
}

fn print_function(out: &mut String, func: &MirFunction) {
    if func.is_external {
        let _ = write!(out, "extern func @{}(", func.name);
    } else {
        let _ = write!(out, "func @{}(", func.name);
    }
    for (i, (name, ty)) in func.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "%{name}: {ty}");
    }
    let _ = write!(out, ") -> {}", func.ret);
    if func.is_external {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");
    for block in &func.blocks {
        print_block(out, block);
    }
    out.push_str("}\n");
}

fn print_block(out: &mut String, block: &BasicBlock) {
    let _ = writeln!(out, "bb{}:", block.id.0);
    for inst in &block.instructions {
        out.push_str("    ");
        print_inst(out, inst);
        out.push('\n');
    }
    out.push_str("    ");
    print_terminator(out, &block.terminator);
    out.push('\n');
}

fn print_operands(out: &mut String, operands: &[Operand]) {
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&print_operand(operand));
    }
}

fn print_inst(out: &mut String, inst: &Inst) {
    match inst {
        Inst::Binary {
            dst,
            op,
            ty,
            lhs,
            rhs,
        } => {
            let _ = write!(
                out,
                "%{} = binary {op:?} {ty}, {}, {}",
                dst.0,
                print_operand(lhs),
                print_operand(rhs)
            );
        }
        Inst::Alloca { dst, ty } => {
            let _ = write!(out, "%{} = alloca {ty}", dst.0);
        }
        Inst::Load { dst, ty, ptr } => {
            let _ = write!(out, "%{} = load {ty}, {}", dst.0, print_operand(ptr));
        }
        Inst::Store { ty, ptr, value } => {
            let _ = write!(
                out,
                "store {ty}, {}, {}",
                print_operand(ptr),
                print_operand(value)
            );
        }
        Inst::Gep {
            dst,
            ty,
            base,
            index,
        } => {
            let _ = write!(
                out,
                "%{} = gep {ty}, {}, {index}",
                dst.0,
                print_operand(base)
            );
        }
        Inst::Call { dst, func, ty, args } => {
            match dst {
                Some(dst) => {
                    let _ = write!(out, "%{} = call {ty} @{func}(", dst.0);
                }
                None => {
                    let _ = write!(out, "call {ty} @{func}(");
                }
            }
            print_operands(out, args);
            out.push(')');
        }
        Inst::CallIndirect {
            dst,
            callee,
            ty,
            args,
        } => {
            match dst {
                Some(dst) => {
                    let _ = write!(
                        out,
                        "%{} = call_indirect {ty} {}(",
                        dst.0,
                        print_operand(callee)
                    );
                }
                None => {
                    let _ = write!(out, "call_indirect {ty} {}(", print_operand(callee));
                }
            }
            print_operands(out, args);
            out.push(')');
        }
        Inst::Cast {
            dst,
            kind,
            from,
            to,
            value,
        } => {
            let _ = write!(
                out,
                "%{} = cast {kind:?} {from} to {to}, {}",
                dst.0,
                print_operand(value)
            );
        }
        Inst::Phi { dst, ty, incomings } => {
            let _ = write!(out, "%{} = phi {ty}", dst.0);
            for (value, block) in incomings {
                let _ = write!(out, ", [{}, bb{}]", print_operand(value), block.0);
            }
        }
        Inst::MakeStruct { dst, ty, fields } => {
            let _ = write!(out, "%{} = make_struct {ty}", dst.0);
            for field in fields {
                let _ = write!(out, ", {}", print_operand(field));
            }
        }
        Inst::MakeTuple { dst, ty, elements } => {
            let _ = write!(out, "%{} = make_tuple {ty}", dst.0);
            for element in elements {
                let _ = write!(out, ", {}", print_operand(element));
            }
        }
        Inst::MakeEnum {
            dst,
            ty,
            tag,
            payload,
        } => {
            let _ = write!(out, "%{} = make_enum {ty}, tag {tag}", dst.0);
            for value in payload {
                let _ = write!(out, ", {}", print_operand(value));
            }
        }
        Inst::EnumTag { dst, value } => {
            let _ = write!(out, "%{} = enum_tag {}", dst.0, print_operand(value));
        }
        Inst::EnumPayload {
            dst,
            ty,
            value,
            index,
        } => {
            let _ = write!(
                out,
                "%{} = enum_payload {ty}, {}, {index}",
                dst.0,
                print_operand(value)
            );
        }
        Inst::GlobalAddr { dst, name, ty } => {
            let _ = write!(out, "%{} = global_addr {ty}, @{name}", dst.0);
        }
    }
}

fn print_terminator(out: &mut String, term: &Terminator) {
    match term {
        Terminator::Br(block) => {
            let _ = write!(out, "br bb{}", block.0);
        }
        Terminator::CondBr {
            cond,
            then_block,
            else_block,
        } => {
            let _ = write!(
                out,
                "cond_br {}, bb{}, bb{}",
                print_operand(cond),
                then_block.0,
                else_block.0
            );
        }
        Terminator::Switch {
            value,
            cases,
            default,
        } => {
            let _ = write!(out, "switch {}", print_operand(value));
            for (case, block) in cases {
                let _ = write!(out, ", [{case}, bb{}]", block.0);
            }
            let _ = write!(out, ", default bb{}", default.0);
        }
        Terminator::Ret(None) => out.push_str("ret"),
        Terminator::Ret(Some(value)) => {
            let _ = write!(out, "ret {}", print_operand(value));
        }
        Terminator::Unreachable => out.push_str("unreachable"),
    }
}

pub(crate) fn print_operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(id) => format!("%{}", id.0),
        Operand::Const(value) => print_constant(value),
    }
}

pub(crate) fn print_constant(value: &Constant) -> String {
    match value {
        Constant::Int(v) => format!("int {v}"),
        // Bits in hex: exact round trip, no float formatting drift.
        Constant::Float(bits) => format!("float 0x{bits:016x}"),
        Constant::Bool(v) => format!("bool {v}"),
        Constant::Str(s) => format!("str {s:?}"),
        Constant::Unit => "unit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BinOp, BlockId, MirType, ValueId};

    #[test]
    fn add_function_prints_expected_shape() {
        let func = MirFunction {
            name: "add".into(),
            params: vec![("a".into(), MirType::I32), ("b".into(), MirType::I32)],
            ret: MirType::I32,
            blocks: vec![BasicBlock {
                id: BlockId(0),
                instructions: vec![Inst::Binary {
                    dst: ValueId(2),
                    op: BinOp::Add,
                    ty: MirType::I32,
                    lhs: Operand::Value(ValueId(0)),
                    rhs: Operand::Value(ValueId(1)),
                }],
                terminator: Terminator::Ret(Some(Operand::Value(ValueId(2)))),
            }],
            is_external: false,
        };
        let module = MirModule {
            name: "demo".into(),
            functions: vec![func],
            ..MirModule::default()
        };
        let text = print_module(&module);
        assert!(text.contains("; MIR Module: demo"));
        assert!(text.contains("func @add(%a: I32, %b: I32) -> I32 {"));
        assert!(text.contains("%2 = binary Add I32, %0, %1"));
        assert!(text.contains("ret %2"));
    }

    #[test]
    fn constants_round_trip_exactly_in_text() {
        assert_eq!(print_constant(&Constant::Int(-7)), "int -7");
        assert_eq!(
            print_constant(&Constant::Float(1.5f64.to_bits())),
            format!("float 0x{:016x}", 1.5f64.to_bits())
        );
        assert_eq!(
            print_constant(&Constant::Str("a\nb".into())),
            "str \"a\\nb\""
        );
    }
}
