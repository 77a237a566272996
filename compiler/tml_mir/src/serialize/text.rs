//! Text format reader.
//!
//! A line-oriented recursive descent parser over the printer's output.
//! Errors carry the 1-based line number they were detected on.

use crate::model::{
    BasicBlock, BinOp, BlockId, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule,
    MirStruct, MirType, Operand, Terminator, ValueId,
};

/// Text parse failure with its source line.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("MIR text parse error at line {line}: {message}")]
pub struct TextParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a module from the text format.
pub fn deserialize_text(text: &str) -> Result<MirModule, TextParseError> {
    let mut parser = TextParser {
        lines: text.lines().collect(),
        index: 0,
    };
    parser.module()
}

struct TextParser<'a> {
    lines: Vec<&'a str>,
    index: usize,
}

impl TextParser<'_> {
    fn err(&self, message: impl Into<String>) -> TextParseError {
        TextParseError {
            line: self.index.min(self.lines.len()),
            message: message.into(),
        }
    }

    /// Next non-blank line, trimmed; advances past it.
    fn next_line(&mut self) -> Option<String> {
        while self.index < self.lines.len() {
            let line = self.lines[self.index].trim();
            self.index += 1;
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    fn peek_line(&self) -> Option<String> {
        let mut index = self.index;
        while index < self.lines.len() {
            let line = self.lines[index].trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
            index += 1;
        }
        None
    }

    fn module(&mut self) -> Result<MirModule, TextParseError> {
        let header = self
            .next_line()
            .ok_or_else(|| self.err("empty input, expected `; MIR Module:` header"))?;
        let Some(name) = header.strip_prefix("; MIR Module:") else {
            return Err(self.err("expected `; MIR Module:` header"));
        };
        let mut module = MirModule::new(name.trim());

        while let Some(line) = self.next_line() {
            if let Some(rest) = line.strip_prefix("struct ") {
                module.structs.push(self.struct_def(rest)?);
            } else if let Some(rest) = line.strip_prefix("enum ") {
                module.enums.push(self.enum_def(rest)?);
            } else if let Some(rest) = line.strip_prefix("const ") {
                module.constants.push(self.const_def(rest)?);
            } else if let Some(rest) = line.strip_prefix("extern func @") {
                module.functions.push(self.function(rest, true)?);
            } else if let Some(rest) = line.strip_prefix("func @") {
                module.functions.push(self.function(rest, false)?);
            } else {
                return Err(self.err(format!("unexpected top-level line `{line}`")));
            }
        }
        Ok(module)
    }

    fn struct_def(&self, rest: &str) -> Result<MirStruct, TextParseError> {
        let mut cursor = Cursor::new(rest, self.index);
        let name = cursor.ident()?;
        cursor.expect("{")?;
        let mut fields = Vec::new();
        if !cursor.eat("}") {
            loop {
                let field = cursor.ident()?;
                cursor.expect(":")?;
                let ty = cursor.ty()?;
                fields.push((field, ty));
                if cursor.eat("}") {
                    break;
                }
                cursor.expect(",")?;
            }
        }
        Ok(MirStruct { name, fields })
    }

    fn enum_def(&self, rest: &str) -> Result<MirEnum, TextParseError> {
        let mut cursor = Cursor::new(rest, self.index);
        let name = cursor.ident()?;
        cursor.expect("{")?;
        let mut variants = Vec::new();
        if !cursor.eat("}") {
            loop {
                let variant = cursor.ident()?;
                let mut payload = Vec::new();
                if cursor.eat("(") {
                    loop {
                        payload.push(cursor.ty()?);
                        if cursor.eat(")") {
                            break;
                        }
                        cursor.expect(",")?;
                    }
                }
                variants.push((variant, payload));
                if cursor.eat("}") {
                    break;
                }
                cursor.expect(",")?;
            }
        }
        Ok(MirEnum { name, variants })
    }

    fn const_def(&self, rest: &str) -> Result<(String, Constant), TextParseError> {
        let mut cursor = Cursor::new(rest, self.index);
        let name = cursor.ident()?;
        cursor.expect("=")?;
        let value = cursor.constant()?;
        Ok((name, value))
    }

    fn function(&mut self, rest: &str, is_external: bool) -> Result<MirFunction, TextParseError> {
        let mut cursor = Cursor::new(rest, self.index);
        let name = cursor.ident()?;
        cursor.expect("(")?;
        let mut params = Vec::new();
        if !cursor.eat(")") {
            loop {
                cursor.expect("%")?;
                let param = cursor.ident()?;
                cursor.expect(":")?;
                let ty = cursor.ty()?;
                params.push((param, ty));
                if cursor.eat(")") {
                    break;
                }
                cursor.expect(",")?;
            }
        }
        cursor.expect("->")?;
        let ret = cursor.ty()?;

        if is_external {
            return Ok(MirFunction {
                name,
                params,
                ret,
                blocks: Vec::new(),
                is_external: true,
            });
        }
        cursor.expect("{")?;

        let mut blocks = Vec::new();
        loop {
            let line = self
                .next_line()
                .ok_or_else(|| self.err("unterminated function body"))?;
            if line == "}" {
                break;
            }
            let Some(label) = line.strip_prefix("bb").and_then(|l| l.strip_suffix(':')) else {
                return Err(self.err(format!("expected block label, found `{line}`")));
            };
            let id: u32 = label
                .parse()
                .map_err(|_| self.err(format!("bad block label `{line}`")))?;
            blocks.push(self.block(BlockId(id))?);
        }

        Ok(MirFunction {
            name,
            params,
            ret,
            blocks,
            is_external: false,
        })
    }

    fn block(&mut self, id: BlockId) -> Result<BasicBlock, TextParseError> {
        let mut instructions = Vec::new();
        loop {
            let line = self
                .peek_line()
                .ok_or_else(|| self.err("unterminated block"))?;
            if line == "}" || line.starts_with("bb") {
                return Err(self.err("block has no terminator"));
            }
            // Terminators end the block.
            let word = line.split_whitespace().next().unwrap_or("");
            if matches!(word, "br" | "cond_br" | "switch" | "ret" | "unreachable") {
                self.next_line();
                let mut cursor = Cursor::new(&line, self.index);
                let terminator = cursor.terminator()?;
                return Ok(BasicBlock {
                    id,
                    instructions,
                    terminator,
                });
            }
            self.next_line();
            let mut cursor = Cursor::new(&line, self.index);
            instructions.push(cursor.inst()?);
        }
    }
}

/// Token cursor over one line.
struct Cursor<'a> {
    rest: &'a str,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Cursor {
            rest: text.trim_start(),
            line,
        }
    }

    fn err(&self, message: impl Into<String>) -> TextParseError {
        TextParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix(token) {
            self.rest = rest;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), TextParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{token}` before `{}`", self.rest)))
        }
    }

    fn ident(&mut self) -> Result<String, TextParseError> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
            .unwrap_or(self.rest.len());
        // Idents embed `::` (qualified names) but never a trailing `:`.
        let mut end = end;
        while end > 0 && self.rest.as_bytes()[end - 1] == b':' {
            end -= 1;
        }
        if end == 0 {
            return Err(self.err(format!("expected identifier before `{}`", self.rest)));
        }
        let (ident, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(ident.to_string())
    }

    fn u32_token(&mut self) -> Result<u32, TextParseError> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let (digits, rest) = self.rest.split_at(end);
        let value = digits
            .parse()
            .map_err(|_| self.err(format!("expected number before `{}`", self.rest)))?;
        self.rest = rest;
        Ok(value)
    }

    fn i64_token(&mut self) -> Result<i64, TextParseError> {
        self.skip_ws();
        let negative = self.eat("-");
        let value = self.u64_token()? as i64;
        // wrapping_neg keeps i64::MIN (printed as -9223372036854775808)
        // intact.
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    fn u64_token(&mut self) -> Result<u64, TextParseError> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let (digits, rest) = self.rest.split_at(end);
        let value = digits
            .parse()
            .map_err(|_| self.err(format!("expected number before `{}`", self.rest)))?;
        self.rest = rest;
        Ok(value)
    }

    fn block_ref(&mut self) -> Result<BlockId, TextParseError> {
        self.expect("bb")?;
        Ok(BlockId(self.u32_token()?))
    }

    fn ty(&mut self) -> Result<MirType, TextParseError> {
        self.skip_ws();
        if self.eat("*") {
            return Ok(MirType::ptr_to(self.ty()?));
        }
        if self.eat("[") {
            let element = self.ty()?;
            self.expect(";")?;
            let size = self.u64_token()?;
            self.expect("]")?;
            return Ok(MirType::Array(Box::new(element), size));
        }
        if self.rest.starts_with("func(") {
            self.expect("func(")?;
            let mut params = Vec::new();
            if !self.eat(")") {
                loop {
                    params.push(self.ty()?);
                    if self.eat(")") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            self.expect("->")?;
            let ret = self.ty()?;
            return Ok(MirType::Func {
                params,
                ret: Box::new(ret),
            });
        }
        if self.eat("(") {
            let mut elements = Vec::new();
            if !self.eat(")") {
                loop {
                    elements.push(self.ty()?);
                    if self.eat(")") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            return Ok(MirType::Tuple(elements));
        }
        let name = self.ident()?;
        Ok(match name.as_str() {
            "I8" => MirType::I8,
            "I16" => MirType::I16,
            "I32" => MirType::I32,
            "I64" => MirType::I64,
            "I128" => MirType::I128,
            "U8" => MirType::U8,
            "U16" => MirType::U16,
            "U32" => MirType::U32,
            "U64" => MirType::U64,
            "U128" => MirType::U128,
            "F32" => MirType::F32,
            "F64" => MirType::F64,
            "Bool" => MirType::Bool,
            "Char" => MirType::Char,
            "Str" => MirType::Str,
            "Unit" => MirType::Unit,
            "Never" => MirType::Never,
            _ => MirType::Named(name),
        })
    }

    fn constant(&mut self) -> Result<Constant, TextParseError> {
        self.skip_ws();
        if self.eat("int") {
            return Ok(Constant::Int(self.i64_token()?));
        }
        if self.eat("float") {
            self.expect("0x")?;
            self.skip_ws();
            let end = self
                .rest
                .find(|c: char| !c.is_ascii_hexdigit())
                .unwrap_or(self.rest.len());
            let (digits, rest) = self.rest.split_at(end);
            let bits = u64::from_str_radix(digits, 16)
                .map_err(|_| self.err("bad float bit pattern"))?;
            self.rest = rest;
            return Ok(Constant::Float(bits));
        }
        if self.eat("bool") {
            self.skip_ws();
            if self.eat("true") {
                return Ok(Constant::Bool(true));
            }
            if self.eat("false") {
                return Ok(Constant::Bool(false));
            }
            return Err(self.err("expected `true` or `false`"));
        }
        if self.eat("str") {
            return Ok(Constant::Str(self.quoted_string()?));
        }
        if self.eat("unit") {
            return Ok(Constant::Unit);
        }
        Err(self.err(format!("expected constant before `{}`", self.rest)))
    }

    fn quoted_string(&mut self) -> Result<String, TextParseError> {
        self.expect("\"")?;
        let mut out = String::new();
        let mut chars = self.rest.char_indices();
        loop {
            let Some((index, c)) = chars.next() else {
                return Err(self.err("unterminated string literal"));
            };
            match c {
                '"' => {
                    self.rest = &self.rest[index + 1..];
                    return Ok(out);
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        return Err(self.err("dangling escape in string literal"));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        'u' => {
                            // \u{XXXX}
                            let Some((_, '{')) = chars.next() else {
                                return Err(self.err("bad unicode escape"));
                            };
                            let mut code = String::new();
                            loop {
                                match chars.next() {
                                    Some((_, '}')) => break,
                                    Some((_, digit)) => code.push(digit),
                                    None => return Err(self.err("bad unicode escape")),
                                }
                            }
                            let value = u32::from_str_radix(&code, 16)
                                .map_err(|_| self.err("bad unicode escape"))?;
                            let c = char::from_u32(value)
                                .ok_or_else(|| self.err("bad unicode escape"))?;
                            out.push(c);
                        }
                        other => {
                            return Err(self.err(format!("unknown escape `\\{other}`")));
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn operand(&mut self) -> Result<Operand, TextParseError> {
        self.skip_ws();
        if self.eat("%") {
            return Ok(Operand::Value(ValueId(self.u32_token()?)));
        }
        Ok(Operand::Const(self.constant()?))
    }

    fn binop(&mut self) -> Result<BinOp, TextParseError> {
        let name = self.ident()?;
        let op = match name.as_str() {
            "Add" => BinOp::Add,
            "Sub" => BinOp::Sub,
            "Mul" => BinOp::Mul,
            "Div" => BinOp::Div,
            "Rem" => BinOp::Rem,
            "FAdd" => BinOp::FAdd,
            "FSub" => BinOp::FSub,
            "FMul" => BinOp::FMul,
            "FDiv" => BinOp::FDiv,
            "And" => BinOp::And,
            "Or" => BinOp::Or,
            "Xor" => BinOp::Xor,
            "Shl" => BinOp::Shl,
            "Shr" => BinOp::Shr,
            "Eq" => BinOp::Eq,
            "Ne" => BinOp::Ne,
            "Lt" => BinOp::Lt,
            "Le" => BinOp::Le,
            "Gt" => BinOp::Gt,
            "Ge" => BinOp::Ge,
            "FEq" => BinOp::FEq,
            "FNe" => BinOp::FNe,
            "FLt" => BinOp::FLt,
            "FLe" => BinOp::FLe,
            "FGt" => BinOp::FGt,
            "FGe" => BinOp::FGe,
            _ => return Err(self.err(format!("unknown operator `{name}`"))),
        };
        Ok(op)
    }

    fn cast_kind(&mut self) -> Result<CastKind, TextParseError> {
        let name = self.ident()?;
        let kind = match name.as_str() {
            "ZeroExtend" => CastKind::ZeroExtend,
            "SignExtend" => CastKind::SignExtend,
            "Truncate" => CastKind::Truncate,
            "FloatToInt" => CastKind::FloatToInt,
            "IntToFloat" => CastKind::IntToFloat,
            "FloatExtend" => CastKind::FloatExtend,
            "FloatTruncate" => CastKind::FloatTruncate,
            "Bitcast" => CastKind::Bitcast,
            "PtrToInt" => CastKind::PtrToInt,
            "IntToPtr" => CastKind::IntToPtr,
            _ => return Err(self.err(format!("unknown cast kind `{name}`"))),
        };
        Ok(kind)
    }

    fn call_args(&mut self) -> Result<Vec<Operand>, TextParseError> {
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.eat(")") {
            loop {
                args.push(self.operand()?);
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        Ok(args)
    }

    fn inst(&mut self) -> Result<Inst, TextParseError> {
        // `%N = op ...` or a bare `store`/`call` line.
        let dst = if self.eat("%") {
            let dst = ValueId(self.u32_token()?);
            self.expect("=")?;
            Some(dst)
        } else {
            None
        };
        let op = self.ident()?;
        match op.as_str() {
            "binary" => {
                let dst = dst.ok_or_else(|| self.err("binary needs a destination"))?;
                let op = self.binop()?;
                let ty = self.ty()?;
                self.expect(",")?;
                let lhs = self.operand()?;
                self.expect(",")?;
                let rhs = self.operand()?;
                Ok(Inst::Binary {
                    dst,
                    op,
                    ty,
                    lhs,
                    rhs,
                })
            }
            "alloca" => {
                let dst = dst.ok_or_else(|| self.err("alloca needs a destination"))?;
                Ok(Inst::Alloca { dst, ty: self.ty()? })
            }
            "load" => {
                let dst = dst.ok_or_else(|| self.err("load needs a destination"))?;
                let ty = self.ty()?;
                self.expect(",")?;
                let ptr = self.operand()?;
                Ok(Inst::Load { dst, ty, ptr })
            }
            "store" => {
                let ty = self.ty()?;
                self.expect(",")?;
                let ptr = self.operand()?;
                self.expect(",")?;
                let value = self.operand()?;
                Ok(Inst::Store { ty, ptr, value })
            }
            "gep" => {
                let dst = dst.ok_or_else(|| self.err("gep needs a destination"))?;
                let ty = self.ty()?;
                self.expect(",")?;
                let base = self.operand()?;
                self.expect(",")?;
                let index = self.u32_token()?;
                Ok(Inst::Gep {
                    dst,
                    ty,
                    base,
                    index,
                })
            }
            "call" => {
                let ty = self.ty()?;
                self.expect("@")?;
                let func = self.ident()?;
                let args = self.call_args()?;
                Ok(Inst::Call {
                    dst,
                    func,
                    ty,
                    args,
                })
            }
            "call_indirect" => {
                let ty = self.ty()?;
                let callee = self.operand()?;
                let args = self.call_args()?;
                Ok(Inst::CallIndirect {
                    dst,
                    callee,
                    ty,
                    args,
                })
            }
            "cast" => {
                let dst = dst.ok_or_else(|| self.err("cast needs a destination"))?;
                let kind = self.cast_kind()?;
                let from = self.ty()?;
                self.expect("to")?;
                let to = self.ty()?;
                self.expect(",")?;
                let value = self.operand()?;
                Ok(Inst::Cast {
                    dst,
                    kind,
                    from,
                    to,
                    value,
                })
            }
            "phi" => {
                let dst = dst.ok_or_else(|| self.err("phi needs a destination"))?;
                let ty = self.ty()?;
                let mut incomings = Vec::new();
                while self.eat(",") {
                    self.expect("[")?;
                    let value = self.operand()?;
                    self.expect(",")?;
                    let block = self.block_ref()?;
                    self.expect("]")?;
                    incomings.push((value, block));
                }
                Ok(Inst::Phi { dst, ty, incomings })
            }
            "make_struct" => {
                let dst = dst.ok_or_else(|| self.err("make_struct needs a destination"))?;
                let ty = self.ty()?;
                let mut fields = Vec::new();
                while self.eat(",") {
                    fields.push(self.operand()?);
                }
                Ok(Inst::MakeStruct { dst, ty, fields })
            }
            "make_tuple" => {
                let dst = dst.ok_or_else(|| self.err("make_tuple needs a destination"))?;
                let ty = self.ty()?;
                let mut elements = Vec::new();
                while self.eat(",") {
                    elements.push(self.operand()?);
                }
                Ok(Inst::MakeTuple { dst, ty, elements })
            }
            "make_enum" => {
                let dst = dst.ok_or_else(|| self.err("make_enum needs a destination"))?;
                let ty = self.ty()?;
                self.expect(",")?;
                self.expect("tag")?;
                let tag = self.u32_token()?;
                let mut payload = Vec::new();
                while self.eat(",") {
                    payload.push(self.operand()?);
                }
                Ok(Inst::MakeEnum {
                    dst,
                    ty,
                    tag,
                    payload,
                })
            }
            "enum_tag" => {
                let dst = dst.ok_or_else(|| self.err("enum_tag needs a destination"))?;
                Ok(Inst::EnumTag {
                    dst,
                    value: self.operand()?,
                })
            }
            "global_addr" => {
                let dst = dst.ok_or_else(|| self.err("global_addr needs a destination"))?;
                let ty = self.ty()?;
                self.expect(",")?;
                self.expect("@")?;
                let name = self.ident()?;
                Ok(Inst::GlobalAddr { dst, name, ty })
            }
            "enum_payload" => {
                let dst = dst.ok_or_else(|| self.err("enum_payload needs a destination"))?;
                let ty = self.ty()?;
                self.expect(",")?;
                let value = self.operand()?;
                self.expect(",")?;
                let index = self.u32_token()?;
                Ok(Inst::EnumPayload {
                    dst,
                    ty,
                    value,
                    index,
                })
            }
            other => Err(self.err(format!("unknown instruction `{other}`"))),
        }
    }

    fn terminator(&mut self) -> Result<Terminator, TextParseError> {
        let op = self.ident()?;
        match op.as_str() {
            "br" => Ok(Terminator::Br(self.block_ref()?)),
            "cond_br" => {
                let cond = self.operand()?;
                self.expect(",")?;
                let then_block = self.block_ref()?;
                self.expect(",")?;
                let else_block = self.block_ref()?;
                Ok(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                })
            }
            "switch" => {
                let value = self.operand()?;
                let mut cases = Vec::new();
                loop {
                    self.expect(",")?;
                    if self.eat("default") {
                        let default = self.block_ref()?;
                        return Ok(Terminator::Switch {
                            value,
                            cases,
                            default,
                        });
                    }
                    self.expect("[")?;
                    let case = self.i64_token()?;
                    self.expect(",")?;
                    let block = self.block_ref()?;
                    self.expect("]")?;
                    cases.push((case, block));
                }
            }
            "ret" => {
                self.skip_ws();
                if self.rest.is_empty() {
                    Ok(Terminator::Ret(None))
                } else {
                    Ok(Terminator::Ret(Some(self.operand()?)))
                }
            }
            "unreachable" => Ok(Terminator::Unreachable),
            other => Err(self.err(format!("unknown terminator `{other}`"))),
        }
    }
}
