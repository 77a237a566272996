//! Binary format writer.
//!
//! Strings are length-prefixed (`u32` length + bytes); every list is
//! count-prefixed. The writer never emits offsets, so the output is a
//! pure forward stream.

use crate::model::{
    BasicBlock, BinOp, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule, MirStruct,
    MirType, Operand, Terminator,
};
use crate::serialize::{MAGIC, VERSION_MAJOR, VERSION_MINOR};

/// Serialize a module to the versioned binary format.
pub fn serialize_binary(module: &MirModule) -> Vec<u8> {
    let mut w = Writer::default();
    w.bytes.extend_from_slice(&MAGIC);
    w.u16(VERSION_MAJOR);
    w.u16(VERSION_MINOR);

    w.string(&module.name);
    w.u32(module.structs.len() as u32);
    for def in &module.structs {
        w.struct_def(def);
    }
    w.u32(module.enums.len() as u32);
    for def in &module.enums {
        w.enum_def(def);
    }
    w.u32(module.functions.len() as u32);
    for func in &module.functions {
        w.function(func);
    }
    w.u32(module.constants.len() as u32);
    for (name, value) in &module.constants {
        w.string(name);
        w.constant(value);
    }
    w.bytes
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn string(&mut self, value: &str) {
        self.u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    fn struct_def(&mut self, def: &MirStruct) {
        self.string(&def.name);
        self.u32(def.fields.len() as u32);
        for (name, ty) in &def.fields {
            self.string(name);
            self.ty(ty);
        }
    }

    fn enum_def(&mut self, def: &MirEnum) {
        self.string(&def.name);
        self.u32(def.variants.len() as u32);
        for (name, payload) in &def.variants {
            self.string(name);
            self.u32(payload.len() as u32);
            for ty in payload {
                self.ty(ty);
            }
        }
    }

    fn ty(&mut self, ty: &MirType) {
        match ty {
            MirType::I8 => self.u8(0),
            MirType::I16 => self.u8(1),
            MirType::I32 => self.u8(2),
            MirType::I64 => self.u8(3),
            MirType::I128 => self.u8(4),
            MirType::U8 => self.u8(5),
            MirType::U16 => self.u8(6),
            MirType::U32 => self.u8(7),
            MirType::U64 => self.u8(8),
            MirType::U128 => self.u8(9),
            MirType::F32 => self.u8(10),
            MirType::F64 => self.u8(11),
            MirType::Bool => self.u8(12),
            MirType::Char => self.u8(13),
            MirType::Str => self.u8(14),
            MirType::Unit => self.u8(15),
            MirType::Never => self.u8(16),
            MirType::Named(name) => {
                self.u8(17);
                self.string(name);
            }
            MirType::Ptr(inner) => {
                self.u8(18);
                self.ty(inner);
            }
            MirType::Array(element, size) => {
                self.u8(19);
                self.ty(element);
                self.u64(*size);
            }
            MirType::Tuple(elements) => {
                self.u8(20);
                self.u32(elements.len() as u32);
                for element in elements {
                    self.ty(element);
                }
            }
            MirType::Func { params, ret } => {
                self.u8(21);
                self.u32(params.len() as u32);
                for param in params {
                    self.ty(param);
                }
                self.ty(ret);
            }
        }
    }

    fn constant(&mut self, value: &Constant) {
        match value {
            Constant::Int(v) => {
                self.u8(0);
                self.i64(*v);
            }
            Constant::Float(bits) => {
                self.u8(1);
                self.u64(*bits);
            }
            Constant::Bool(v) => {
                self.u8(2);
                self.u8(u8::from(*v));
            }
            Constant::Str(s) => {
                self.u8(3);
                self.string(s);
            }
            Constant::Unit => self.u8(4),
        }
    }

    fn operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Value(id) => {
                self.u8(0);
                self.u32(id.0);
            }
            Operand::Const(value) => {
                self.u8(1);
                self.constant(value);
            }
        }
    }

    fn operands(&mut self, operands: &[Operand]) {
        self.u32(operands.len() as u32);
        for operand in operands {
            self.operand(operand);
        }
    }

    fn function(&mut self, func: &MirFunction) {
        self.string(&func.name);
        self.u8(u8::from(func.is_external));
        self.u32(func.params.len() as u32);
        for (name, ty) in &func.params {
            self.string(name);
            self.ty(ty);
        }
        self.ty(&func.ret);
        self.u32(func.blocks.len() as u32);
        for block in &func.blocks {
            self.block(block);
        }
    }

    fn block(&mut self, block: &BasicBlock) {
        self.u32(block.id.0);
        self.u32(block.instructions.len() as u32);
        for inst in &block.instructions {
            self.inst(inst);
        }
        self.terminator(&block.terminator);
    }

    fn inst(&mut self, inst: &Inst) {
        match inst {
            Inst::Binary {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => {
                self.u8(0);
                self.u32(dst.0);
                self.u8(binop_tag(*op));
                self.ty(ty);
                self.operand(lhs);
                self.operand(rhs);
            }
            Inst::Alloca { dst, ty } => {
                self.u8(1);
                self.u32(dst.0);
                self.ty(ty);
            }
            Inst::Load { dst, ty, ptr } => {
                self.u8(2);
                self.u32(dst.0);
                self.ty(ty);
                self.operand(ptr);
            }
            Inst::Store { ty, ptr, value } => {
                self.u8(3);
                self.ty(ty);
                self.operand(ptr);
                self.operand(value);
            }
            Inst::Gep {
                dst,
                ty,
                base,
                index,
            } => {
                self.u8(4);
                self.u32(dst.0);
                self.ty(ty);
                self.operand(base);
                self.u32(*index);
            }
            Inst::Call { dst, func, ty, args } => {
                self.u8(5);
                match dst {
                    Some(dst) => {
                        self.u8(1);
                        self.u32(dst.0);
                    }
                    None => self.u8(0),
                }
                self.string(func);
                self.ty(ty);
                self.operands(args);
            }
            Inst::CallIndirect {
                dst,
                callee,
                ty,
                args,
            } => {
                self.u8(6);
                match dst {
                    Some(dst) => {
                        self.u8(1);
                        self.u32(dst.0);
                    }
                    None => self.u8(0),
                }
                self.operand(callee);
                self.ty(ty);
                self.operands(args);
            }
            Inst::Cast {
                dst,
                kind,
                from,
                to,
                value,
            } => {
                self.u8(7);
                self.u32(dst.0);
                self.u8(cast_tag(*kind));
                self.ty(from);
                self.ty(to);
                self.operand(value);
            }
            Inst::Phi { dst, ty, incomings } => {
                self.u8(8);
                self.u32(dst.0);
                self.ty(ty);
                self.u32(incomings.len() as u32);
                for (value, block) in incomings {
                    self.operand(value);
                    self.u32(block.0);
                }
            }
            Inst::MakeStruct { dst, ty, fields } => {
                self.u8(9);
                self.u32(dst.0);
                self.ty(ty);
                self.operands(fields);
            }
            Inst::MakeTuple { dst, ty, elements } => {
                self.u8(10);
                self.u32(dst.0);
                self.ty(ty);
                self.operands(elements);
            }
            Inst::MakeEnum {
                dst,
                ty,
                tag,
                payload,
            } => {
                self.u8(11);
                self.u32(dst.0);
                self.ty(ty);
                self.u32(*tag);
                self.operands(payload);
            }
            Inst::EnumTag { dst, value } => {
                self.u8(12);
                self.u32(dst.0);
                self.operand(value);
            }
            Inst::EnumPayload {
                dst,
                ty,
                value,
                index,
            } => {
                self.u8(13);
                self.u32(dst.0);
                self.ty(ty);
                self.operand(value);
                self.u32(*index);
            }
            Inst::GlobalAddr { dst, name, ty } => {
                self.u8(14);
                self.u32(dst.0);
                self.string(name);
                self.ty(ty);
            }
        }
    }

    fn terminator(&mut self, term: &Terminator) {
        match term {
            Terminator::Br(block) => {
                self.u8(0);
                self.u32(block.0);
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                self.u8(1);
                self.operand(cond);
                self.u32(then_block.0);
                self.u32(else_block.0);
            }
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                self.u8(2);
                self.operand(value);
                self.u32(cases.len() as u32);
                for (case, block) in cases {
                    self.i64(*case);
                    self.u32(block.0);
                }
                self.u32(default.0);
            }
            Terminator::Ret(None) => self.u8(3),
            Terminator::Ret(Some(value)) => {
                self.u8(4);
                self.operand(value);
            }
            Terminator::Unreachable => self.u8(5),
        }
    }
}

pub(crate) fn binop_tag(op: BinOp) -> u8 {
    op as u8
}

pub(crate) fn cast_tag(kind: CastKind) -> u8 {
    kind as u8
}
