//! Instruction decoding shared by the disassembler, the stack analysis and
//! the evaluator. `wide` forms are folded into the instruction they modify.

use super::{VerifyError, VerifyResult};
use crate::codegen::opcodes::{self, *};

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    /// Explicit local slot; the `_0`..`_3` forms carry it in the opcode
    Local(u16),
    /// BIPUSH / SIPUSH immediate
    Int(i32),
    /// Constant pool index: LDC family, member references, classes
    Pool(u16),
    /// Absolute branch target
    Jump(usize),
    Iinc { index: u16, delta: i16 },
    /// NEWARRAY element type code
    ArrayType(u8),
    Invokeinterface { index: u16, count: u8 },
    MultiANewArray { index: u16, dims: u8 },
    Switch { default: usize, cases: Vec<(i32, usize)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub pc: usize,
    pub op: u8,
    pub arg: Arg,
    /// Encoded length including any `wide` prefix
    pub len: usize,
}

impl Insn {
    pub fn name(&self) -> &'static str {
        opcodes::opcode_name(self.op).unwrap_or("???")
    }

    /// Branch targets, excluding fall-through
    pub fn targets(&self) -> Vec<usize> {
        match &self.arg {
            Arg::Jump(t) => vec![*t],
            Arg::Switch { default, cases } => {
                let mut out = vec![*default];
                out.extend(cases.iter().map(|(_, t)| *t));
                out
            }
            _ => Vec::new(),
        }
    }

    /// Local slot used by any load/store form
    pub fn local_index(&self) -> Option<u16> {
        match (&self.arg, self.op) {
            (Arg::Local(i), _) => Some(*i),
            (_, ILOAD_0..=ALOAD_3) => Some(((self.op - ILOAD_0) % 4) as u16),
            (_, ISTORE_0..=ASTORE_3) => Some(((self.op - ISTORE_0) % 4) as u16),
            _ => None,
        }
    }
}

fn read_i16(code: &[u8], at: usize) -> Option<i16> {
    Some(i16::from_be_bytes([*code.get(at)?, *code.get(at + 1)?]))
}

fn read_u16(code: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*code.get(at)?, *code.get(at + 1)?]))
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let b = code.get(at..at + 4)?;
    Some(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn jump_target(pc: usize, offset: i64, code_len: usize) -> VerifyResult<usize> {
    let target = pc as i64 + offset;
    if target < 0 || target as usize >= code_len {
        return Err(VerifyError::BadJumpTarget { pc, target });
    }
    Ok(target as usize)
}

fn decode_one(code: &[u8], pc: usize) -> VerifyResult<Insn> {
    let op = code[pc];
    let len = opcodes::instruction_length(code, pc).ok_or(VerifyError::BadOpcode { pc, op })?;
    if pc + len > code.len() {
        return Err(VerifyError::Truncated(pc));
    }
    let bad = || VerifyError::BadOpcode { pc, op };
    let u8_at = |at: usize| code[pc + at];
    let u16_at = |at: usize| read_u16(code, pc + at).ok_or_else(bad);

    let (op, arg) = match op {
        BIPUSH => (op, Arg::Int(u8_at(1) as i8 as i32)),
        SIPUSH => (op, Arg::Int(read_i16(code, pc + 1).ok_or_else(bad)? as i32)),
        LDC => (op, Arg::Pool(u8_at(1) as u16)),
        LDC_W | LDC2_W => (op, Arg::Pool(u16_at(1)?)),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => (op, Arg::Local(u8_at(1) as u16)),
        IINC => (op, Arg::Iinc { index: u8_at(1) as u16, delta: u8_at(2) as i8 as i16 }),
        WIDE => {
            let inner = u8_at(1);
            if inner == IINC {
                let delta = read_i16(code, pc + 4).ok_or_else(bad)?;
                (inner, Arg::Iinc { index: u16_at(2)?, delta })
            } else if matches!(inner, ILOAD..=ALOAD | ISTORE..=ASTORE | RET) {
                (inner, Arg::Local(u16_at(2)?))
            } else {
                return Err(bad());
            }
        }
        _ if opcodes::is_jump(op) => {
            let offset = read_i16(code, pc + 1).ok_or_else(bad)? as i64;
            (op, Arg::Jump(jump_target(pc, offset, code.len())?))
        }
        GOTO_W | JSR_W => {
            let offset = read_i32(code, pc + 1).ok_or_else(bad)? as i64;
            (op, Arg::Jump(jump_target(pc, offset, code.len())?))
        }
        GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | NEW
        | ANEWARRAY | CHECKCAST | INSTANCEOF => (op, Arg::Pool(u16_at(1)?)),
        INVOKEINTERFACE => (op, Arg::Invokeinterface { index: u16_at(1)?, count: u8_at(3) }),
        MULTIANEWARRAY => (op, Arg::MultiANewArray { index: u16_at(1)?, dims: u8_at(3) }),
        NEWARRAY => (op, Arg::ArrayType(u8_at(1))),
        TABLESWITCH | LOOKUPSWITCH => {
            let base = (pc + 4) & !3;
            let word = |at: usize| read_i32(code, at).ok_or_else(bad);
            let default = jump_target(pc, word(base)? as i64, code.len())?;
            let mut cases = Vec::new();
            if op == TABLESWITCH {
                let low = word(base + 4)?;
                let high = word(base + 8)?;
                for (i, key) in (low..=high).enumerate() {
                    let target = jump_target(pc, word(base + 12 + i * 4)? as i64, code.len())?;
                    cases.push((key, target));
                }
            } else {
                let pairs = word(base + 4)? as usize;
                for i in 0..pairs {
                    let key = word(base + 8 + i * 8)?;
                    let target = jump_target(pc, word(base + 12 + i * 8)? as i64, code.len())?;
                    cases.push((key, target));
                }
            }
            (op, Arg::Switch { default, cases })
        }
        _ => (op, Arg::None),
    };
    Ok(Insn { pc, op, arg, len })
}

/// Decode a whole code array in order
pub fn decode(code: &[u8]) -> VerifyResult<Vec<Insn>> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let insn = decode_one(code, pc)?;
        pc += insn.len;
        out.push(insn);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_branches_and_immediates() {
        let code = [ICONST_1, IFEQ, 0x00, 0x05, BIPUSH, 0xfd, RETURN];
        let insns = decode(&code).unwrap();
        assert_eq!(insns.len(), 4);
        assert_eq!(insns[1].arg, Arg::Jump(6));
        assert_eq!(insns[2].arg, Arg::Int(-3));
        assert_eq!(insns[3].pc, 6);
    }

    #[test]
    fn folds_wide_forms() {
        let code = [WIDE, ILOAD, 0x01, 0x00, WIDE, IINC, 0x01, 0x00, 0xff, 0xff, RETURN];
        let insns = decode(&code).unwrap();
        assert_eq!(insns[0].op, ILOAD);
        assert_eq!(insns[0].local_index(), Some(256));
        assert_eq!(insns[1].arg, Arg::Iinc { index: 256, delta: -1 });
        assert_eq!(insns[1].len, 6);
    }

    #[test]
    fn implicit_local_indices() {
        let insns = decode(&[ALOAD_3, ISTORE_1, RETURN]).unwrap();
        assert_eq!(insns[0].local_index(), Some(3));
        assert_eq!(insns[1].local_index(), Some(1));
    }

    #[test]
    fn rejects_jump_outside_code() {
        let err = decode(&[GOTO, 0x00, 0x10]).unwrap_err();
        assert!(matches!(err, VerifyError::BadJumpTarget { pc: 0, target: 16 }));
    }
}
