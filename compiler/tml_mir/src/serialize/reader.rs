//! Binary format reader.
//!
//! A single forward pass over the byte stream; every failure carries
//! the offset it was detected at.

use crate::model::{
    BasicBlock, BinOp, BlockId, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule,
    MirStruct, MirType, Operand, Terminator, ValueId,
};
use crate::serialize::{DeserializeError, MAGIC, VERSION_MAJOR, VERSION_MINOR};

/// Deserialize a module from the versioned binary format.
pub fn deserialize_binary(bytes: &[u8]) -> Result<MirModule, DeserializeError> {
    let mut r = Reader { bytes, offset: 0 };

    let magic = r.take(4)?;
    if magic != MAGIC {
        return Err(DeserializeError::Corrupt {
            offset: 0,
            detail: "bad magic (not a MIR binary)".to_string(),
        });
    }
    let major = r.u16()?;
    let minor = r.u16()?;
    // Same major, same or lower minor.
    if major != VERSION_MAJOR || minor > VERSION_MINOR {
        return Err(DeserializeError::Version { major, minor });
    }

    let name = r.string()?;
    let mut module = MirModule::new(name);

    let struct_count = r.u32()? as usize;
    for _ in 0..struct_count {
        module.structs.push(r.struct_def()?);
    }
    let enum_count = r.u32()? as usize;
    for _ in 0..enum_count {
        module.enums.push(r.enum_def()?);
    }
    let func_count = r.u32()? as usize;
    for _ in 0..func_count {
        module.functions.push(r.function()?);
    }
    let const_count = r.u32()? as usize;
    for _ in 0..const_count {
        let name = r.string()?;
        let value = r.constant()?;
        module.constants.push((name, value));
    }

    if r.offset != r.bytes.len() {
        return Err(DeserializeError::Corrupt {
            offset: r.offset,
            detail: format!("{} trailing bytes", r.bytes.len() - r.offset),
        });
    }
    Ok(module)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], DeserializeError> {
        if self.offset + len > self.bytes.len() {
            return Err(DeserializeError::Eof {
                offset: self.offset,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn corrupt(&self, detail: impl Into<String>) -> DeserializeError {
        DeserializeError::Corrupt {
            offset: self.offset,
            detail: detail.into(),
        }
    }

    fn u8(&mut self) -> Result<u8, DeserializeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DeserializeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, DeserializeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, DeserializeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, DeserializeError> {
        Ok(self.u64()? as i64)
    }

    fn string(&mut self) -> Result<String, DeserializeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| self.corrupt("string is not valid UTF-8"))
    }

    fn struct_def(&mut self) -> Result<MirStruct, DeserializeError> {
        let name = self.string()?;
        let field_count = self.u32()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let field = self.string()?;
            let ty = self.ty()?;
            fields.push((field, ty));
        }
        Ok(MirStruct { name, fields })
    }

    fn enum_def(&mut self) -> Result<MirEnum, DeserializeError> {
        let name = self.string()?;
        let variant_count = self.u32()? as usize;
        let mut variants = Vec::with_capacity(variant_count);
        for _ in 0..variant_count {
            let variant = self.string()?;
            let payload_count = self.u32()? as usize;
            let mut payload = Vec::with_capacity(payload_count);
            for _ in 0..payload_count {
                payload.push(self.ty()?);
            }
            variants.push((variant, payload));
        }
        Ok(MirEnum { name, variants })
    }

    fn ty(&mut self) -> Result<MirType, DeserializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => MirType::I8,
            1 => MirType::I16,
            2 => MirType::I32,
            3 => MirType::I64,
            4 => MirType::I128,
            5 => MirType::U8,
            6 => MirType::U16,
            7 => MirType::U32,
            8 => MirType::U64,
            9 => MirType::U128,
            10 => MirType::F32,
            11 => MirType::F64,
            12 => MirType::Bool,
            13 => MirType::Char,
            14 => MirType::Str,
            15 => MirType::Unit,
            16 => MirType::Never,
            17 => MirType::Named(self.string()?),
            18 => MirType::Ptr(Box::new(self.ty()?)),
            19 => {
                let element = self.ty()?;
                let size = self.u64()?;
                MirType::Array(Box::new(element), size)
            }
            20 => {
                let count = self.u32()? as usize;
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(self.ty()?);
                }
                MirType::Tuple(elements)
            }
            21 => {
                let count = self.u32()? as usize;
                let mut params = Vec::with_capacity(count);
                for _ in 0..count {
                    params.push(self.ty()?);
                }
                let ret = self.ty()?;
                MirType::Func {
                    params,
                    ret: Box::new(ret),
                }
            }
            _ => return Err(self.corrupt(format!("unknown type tag {tag}"))),
        })
    }

    fn constant(&mut self) -> Result<Constant, DeserializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => Constant::Int(self.i64()?),
            1 => Constant::Float(self.u64()?),
            2 => Constant::Bool(self.u8()? != 0),
            3 => Constant::Str(self.string()?),
            4 => Constant::Unit,
            _ => return Err(self.corrupt(format!("unknown constant tag {tag}"))),
        })
    }

    fn operand(&mut self) -> Result<Operand, DeserializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => Operand::Value(ValueId(self.u32()?)),
            1 => Operand::Const(self.constant()?),
            _ => return Err(self.corrupt(format!("unknown operand tag {tag}"))),
        })
    }

    fn operands(&mut self) -> Result<Vec<Operand>, DeserializeError> {
        let count = self.u32()? as usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.operand()?);
        }
        Ok(out)
    }

    fn optional_dst(&mut self) -> Result<Option<ValueId>, DeserializeError> {
        let present = self.u8()?;
        Ok(match present {
            0 => None,
            1 => Some(ValueId(self.u32()?)),
            _ => return Err(self.corrupt(format!("bad dst presence flag {present}"))),
        })
    }

    fn function(&mut self) -> Result<MirFunction, DeserializeError> {
        let name = self.string()?;
        let is_external = self.u8()? != 0;
        let param_count = self.u32()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            let name = self.string()?;
            let ty = self.ty()?;
            params.push((name, ty));
        }
        let ret = self.ty()?;
        let block_count = self.u32()? as usize;
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(self.block()?);
        }
        Ok(MirFunction {
            name,
            params,
            ret,
            blocks,
            is_external,
        })
    }

    fn block(&mut self) -> Result<BasicBlock, DeserializeError> {
        let id = BlockId(self.u32()?);
        let inst_count = self.u32()? as usize;
        let mut instructions = Vec::with_capacity(inst_count);
        for _ in 0..inst_count {
            instructions.push(self.inst()?);
        }
        let terminator = self.terminator()?;
        Ok(BasicBlock {
            id,
            instructions,
            terminator,
        })
    }

    fn binop(&mut self) -> Result<BinOp, DeserializeError> {
        const OPS: [BinOp; 26] = [
            BinOp::Add,
            BinOp::Sub,
            BinOp::Mul,
            BinOp::Div,
            BinOp::Rem,
            BinOp::FAdd,
            BinOp::FSub,
            BinOp::FMul,
            BinOp::FDiv,
            BinOp::And,
            BinOp::Or,
            BinOp::Xor,
            BinOp::Shl,
            BinOp::Shr,
            BinOp::Eq,
            BinOp::Ne,
            BinOp::Lt,
            BinOp::Le,
            BinOp::Gt,
            BinOp::Ge,
            BinOp::FEq,
            BinOp::FNe,
            BinOp::FLt,
            BinOp::FLe,
            BinOp::FGt,
            BinOp::FGe,
        ];
        let tag = self.u8()?;
        OPS.get(tag as usize)
            .copied()
            .ok_or_else(|| self.corrupt(format!("unknown binop tag {tag}")))
    }

    fn cast_kind(&mut self) -> Result<CastKind, DeserializeError> {
        const KINDS: [CastKind; 10] = [
            CastKind::ZeroExtend,
            CastKind::SignExtend,
            CastKind::Truncate,
            CastKind::FloatToInt,
            CastKind::IntToFloat,
            CastKind::FloatExtend,
            CastKind::FloatTruncate,
            CastKind::Bitcast,
            CastKind::PtrToInt,
            CastKind::IntToPtr,
        ];
        let tag = self.u8()?;
        KINDS
            .get(tag as usize)
            .copied()
            .ok_or_else(|| self.corrupt(format!("unknown cast tag {tag}")))
    }

    fn inst(&mut self) -> Result<Inst, DeserializeError> {
        let opcode = self.u8()?;
        Ok(match opcode {
            0 => {
                let dst = ValueId(self.u32()?);
                let op = self.binop()?;
                let ty = self.ty()?;
                let lhs = self.operand()?;
                let rhs = self.operand()?;
                Inst::Binary {
                    dst,
                    op,
                    ty,
                    lhs,
                    rhs,
                }
            }
            1 => Inst::Alloca {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
            },
            2 => Inst::Load {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
                ptr: self.operand()?,
            },
            3 => Inst::Store {
                ty: self.ty()?,
                ptr: self.operand()?,
                value: self.operand()?,
            },
            4 => Inst::Gep {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
                base: self.operand()?,
                index: self.u32()?,
            },
            5 => {
                let dst = self.optional_dst()?;
                let func = self.string()?;
                let ty = self.ty()?;
                let args = self.operands()?;
                Inst::Call { dst, func, ty, args }
            }
            6 => {
                let dst = self.optional_dst()?;
                let callee = self.operand()?;
                let ty = self.ty()?;
                let args = self.operands()?;
                Inst::CallIndirect {
                    dst,
                    callee,
                    ty,
                    args,
                }
            }
            7 => {
                let dst = ValueId(self.u32()?);
                let kind = self.cast_kind()?;
                let from = self.ty()?;
                let to = self.ty()?;
                let value = self.operand()?;
                Inst::Cast {
                    dst,
                    kind,
                    from,
                    to,
                    value,
                }
            }
            8 => {
                let dst = ValueId(self.u32()?);
                let ty = self.ty()?;
                let count = self.u32()? as usize;
                let mut incomings = Vec::with_capacity(count);
                for _ in 0..count {
                    let value = self.operand()?;
                    let block = BlockId(self.u32()?);
                    incomings.push((value, block));
                }
                Inst::Phi { dst, ty, incomings }
            }
            9 => Inst::MakeStruct {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
                fields: self.operands()?,
            },
            10 => Inst::MakeTuple {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
                elements: self.operands()?,
            },
            11 => {
                let dst = ValueId(self.u32()?);
                let ty = self.ty()?;
                let tag = self.u32()?;
                let payload = self.operands()?;
                Inst::MakeEnum {
                    dst,
                    ty,
                    tag,
                    payload,
                }
            }
            12 => Inst::EnumTag {
                dst: ValueId(self.u32()?),
                value: self.operand()?,
            },
            13 => Inst::EnumPayload {
                dst: ValueId(self.u32()?),
                ty: self.ty()?,
                value: self.operand()?,
                index: self.u32()?,
            },
            14 => Inst::GlobalAddr {
                dst: ValueId(self.u32()?),
                name: self.string()?,
                ty: self.ty()?,
            },
            _ => return Err(self.corrupt(format!("unknown instruction opcode {opcode}"))),
        })
    }

    fn terminator(&mut self) -> Result<Terminator, DeserializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => Terminator::Br(BlockId(self.u32()?)),
            1 => Terminator::CondBr {
                cond: self.operand()?,
                then_block: BlockId(self.u32()?),
                else_block: BlockId(self.u32()?),
            },
            2 => {
                let value = self.operand()?;
                let count = self.u32()? as usize;
                let mut cases = Vec::with_capacity(count);
                for _ in 0..count {
                    let case = self.i64()?;
                    let block = BlockId(self.u32()?);
                    cases.push((case, block));
                }
                let default = BlockId(self.u32()?);
                Terminator::Switch {
                    value,
                    cases,
                    default,
                }
            }
            3 => Terminator::Ret(None),
            4 => Terminator::Ret(Some(self.operand()?)),
            5 => Terminator::Unreachable,
            _ => return Err(self.corrupt(format!("unknown terminator tag {tag}"))),
        })
    }
}
