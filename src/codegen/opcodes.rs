//! JVM instruction set: opcode values with their encoded length and
//! operand stack effect.
//!
//! Stack effects are counted in physical slots (long and double take two).
//! Instructions whose effect depends on a descriptor or dimension count are
//! listed with `-1` and resolved by the caller.

macro_rules! opcodes {
    ($($name:ident = $code:literal, $len:literal, $pop:literal, $push:literal;)*) => {
        $(pub const $name: u8 = $code;)*

        /// Mnemonic of an opcode, `None` for unassigned values
        pub fn opcode_name(op: u8) -> Option<&'static str> {
            match op {
                $($code => Some(stringify!($name)),)*
                _ => None,
            }
        }

        fn info(op: u8) -> Option<(u8, i8, i8)> {
            match op {
                $($code => Some(($len, $pop, $push)),)*
                _ => None,
            }
        }
    };
}

opcodes! {
    NOP = 0x00, 1, 0, 0;
    ACONST_NULL = 0x01, 1, 0, 1;
    ICONST_M1 = 0x02, 1, 0, 1;
    ICONST_0 = 0x03, 1, 0, 1;
    ICONST_1 = 0x04, 1, 0, 1;
    ICONST_2 = 0x05, 1, 0, 1;
    ICONST_3 = 0x06, 1, 0, 1;
    ICONST_4 = 0x07, 1, 0, 1;
    ICONST_5 = 0x08, 1, 0, 1;
    LCONST_0 = 0x09, 1, 0, 2;
    LCONST_1 = 0x0a, 1, 0, 2;
    FCONST_0 = 0x0b, 1, 0, 1;
    FCONST_1 = 0x0c, 1, 0, 1;
    FCONST_2 = 0x0d, 1, 0, 1;
    DCONST_0 = 0x0e, 1, 0, 2;
    DCONST_1 = 0x0f, 1, 0, 2;
    BIPUSH = 0x10, 2, 0, 1;
    SIPUSH = 0x11, 3, 0, 1;
    LDC = 0x12, 2, 0, 1;
    LDC_W = 0x13, 3, 0, 1;
    LDC2_W = 0x14, 3, 0, 2;
    ILOAD = 0x15, 2, 0, 1;
    LLOAD = 0x16, 2, 0, 2;
    FLOAD = 0x17, 2, 0, 1;
    DLOAD = 0x18, 2, 0, 2;
    ALOAD = 0x19, 2, 0, 1;
    ILOAD_0 = 0x1a, 1, 0, 1;
    ILOAD_1 = 0x1b, 1, 0, 1;
    ILOAD_2 = 0x1c, 1, 0, 1;
    ILOAD_3 = 0x1d, 1, 0, 1;
    LLOAD_0 = 0x1e, 1, 0, 2;
    LLOAD_1 = 0x1f, 1, 0, 2;
    LLOAD_2 = 0x20, 1, 0, 2;
    LLOAD_3 = 0x21, 1, 0, 2;
    FLOAD_0 = 0x22, 1, 0, 1;
    FLOAD_1 = 0x23, 1, 0, 1;
    FLOAD_2 = 0x24, 1, 0, 1;
    FLOAD_3 = 0x25, 1, 0, 1;
    DLOAD_0 = 0x26, 1, 0, 2;
    DLOAD_1 = 0x27, 1, 0, 2;
    DLOAD_2 = 0x28, 1, 0, 2;
    DLOAD_3 = 0x29, 1, 0, 2;
    ALOAD_0 = 0x2a, 1, 0, 1;
    ALOAD_1 = 0x2b, 1, 0, 1;
    ALOAD_2 = 0x2c, 1, 0, 1;
    ALOAD_3 = 0x2d, 1, 0, 1;
    IALOAD = 0x2e, 1, 2, 1;
    LALOAD = 0x2f, 1, 2, 2;
    FALOAD = 0x30, 1, 2, 1;
    DALOAD = 0x31, 1, 2, 2;
    AALOAD = 0x32, 1, 2, 1;
    BALOAD = 0x33, 1, 2, 1;
    CALOAD = 0x34, 1, 2, 1;
    SALOAD = 0x35, 1, 2, 1;
    ISTORE = 0x36, 2, 1, 0;
    LSTORE = 0x37, 2, 2, 0;
    FSTORE = 0x38, 2, 1, 0;
    DSTORE = 0x39, 2, 2, 0;
    ASTORE = 0x3a, 2, 1, 0;
    ISTORE_0 = 0x3b, 1, 1, 0;
    ISTORE_1 = 0x3c, 1, 1, 0;
    ISTORE_2 = 0x3d, 1, 1, 0;
    ISTORE_3 = 0x3e, 1, 1, 0;
    LSTORE_0 = 0x3f, 1, 2, 0;
    LSTORE_1 = 0x40, 1, 2, 0;
    LSTORE_2 = 0x41, 1, 2, 0;
    LSTORE_3 = 0x42, 1, 2, 0;
    FSTORE_0 = 0x43, 1, 1, 0;
    FSTORE_1 = 0x44, 1, 1, 0;
    FSTORE_2 = 0x45, 1, 1, 0;
    FSTORE_3 = 0x46, 1, 1, 0;
    DSTORE_0 = 0x47, 1, 2, 0;
    DSTORE_1 = 0x48, 1, 2, 0;
    DSTORE_2 = 0x49, 1, 2, 0;
    DSTORE_3 = 0x4a, 1, 2, 0;
    ASTORE_0 = 0x4b, 1, 1, 0;
    ASTORE_1 = 0x4c, 1, 1, 0;
    ASTORE_2 = 0x4d, 1, 1, 0;
    ASTORE_3 = 0x4e, 1, 1, 0;
    IASTORE = 0x4f, 1, 3, 0;
    LASTORE = 0x50, 1, 4, 0;
    FASTORE = 0x51, 1, 3, 0;
    DASTORE = 0x52, 1, 4, 0;
    AASTORE = 0x53, 1, 3, 0;
    BASTORE = 0x54, 1, 3, 0;
    CASTORE = 0x55, 1, 3, 0;
    SASTORE = 0x56, 1, 3, 0;
    POP = 0x57, 1, 1, 0;
    POP2 = 0x58, 1, 2, 0;
    DUP = 0x59, 1, 1, 2;
    DUP_X1 = 0x5a, 1, 2, 3;
    DUP_X2 = 0x5b, 1, 3, 4;
    DUP2 = 0x5c, 1, 2, 4;
    DUP2_X1 = 0x5d, 1, 3, 5;
    DUP2_X2 = 0x5e, 1, 4, 6;
    SWAP = 0x5f, 1, 2, 2;
    IADD = 0x60, 1, 2, 1;
    LADD = 0x61, 1, 4, 2;
    FADD = 0x62, 1, 2, 1;
    DADD = 0x63, 1, 4, 2;
    ISUB = 0x64, 1, 2, 1;
    LSUB = 0x65, 1, 4, 2;
    FSUB = 0x66, 1, 2, 1;
    DSUB = 0x67, 1, 4, 2;
    IMUL = 0x68, 1, 2, 1;
    LMUL = 0x69, 1, 4, 2;
    FMUL = 0x6a, 1, 2, 1;
    DMUL = 0x6b, 1, 4, 2;
    IDIV = 0x6c, 1, 2, 1;
    LDIV = 0x6d, 1, 4, 2;
    FDIV = 0x6e, 1, 2, 1;
    DDIV = 0x6f, 1, 4, 2;
    IREM = 0x70, 1, 2, 1;
    LREM = 0x71, 1, 4, 2;
    FREM = 0x72, 1, 2, 1;
    DREM = 0x73, 1, 4, 2;
    INEG = 0x74, 1, 1, 1;
    LNEG = 0x75, 1, 2, 2;
    FNEG = 0x76, 1, 1, 1;
    DNEG = 0x77, 1, 2, 2;
    ISHL = 0x78, 1, 2, 1;
    LSHL = 0x79, 1, 3, 2;
    ISHR = 0x7a, 1, 2, 1;
    LSHR = 0x7b, 1, 3, 2;
    IUSHR = 0x7c, 1, 2, 1;
    LUSHR = 0x7d, 1, 3, 2;
    IAND = 0x7e, 1, 2, 1;
    LAND = 0x7f, 1, 4, 2;
    IOR = 0x80, 1, 2, 1;
    LOR = 0x81, 1, 4, 2;
    IXOR = 0x82, 1, 2, 1;
    LXOR = 0x83, 1, 4, 2;
    IINC = 0x84, 3, 0, 0;
    I2L = 0x85, 1, 1, 2;
    I2F = 0x86, 1, 1, 1;
    I2D = 0x87, 1, 1, 2;
    L2I = 0x88, 1, 2, 1;
    L2F = 0x89, 1, 2, 1;
    L2D = 0x8a, 1, 2, 2;
    F2I = 0x8b, 1, 1, 1;
    F2L = 0x8c, 1, 1, 2;
    F2D = 0x8d, 1, 1, 2;
    D2I = 0x8e, 1, 2, 1;
    D2L = 0x8f, 1, 2, 2;
    D2F = 0x90, 1, 2, 1;
    I2B = 0x91, 1, 1, 1;
    I2C = 0x92, 1, 1, 1;
    I2S = 0x93, 1, 1, 1;
    LCMP = 0x94, 1, 4, 1;
    FCMPL = 0x95, 1, 2, 1;
    FCMPG = 0x96, 1, 2, 1;
    DCMPL = 0x97, 1, 4, 1;
    DCMPG = 0x98, 1, 4, 1;
    IFEQ = 0x99, 3, 1, 0;
    IFNE = 0x9a, 3, 1, 0;
    IFLT = 0x9b, 3, 1, 0;
    IFGE = 0x9c, 3, 1, 0;
    IFGT = 0x9d, 3, 1, 0;
    IFLE = 0x9e, 3, 1, 0;
    IF_ICMPEQ = 0x9f, 3, 2, 0;
    IF_ICMPNE = 0xa0, 3, 2, 0;
    IF_ICMPLT = 0xa1, 3, 2, 0;
    IF_ICMPGE = 0xa2, 3, 2, 0;
    IF_ICMPGT = 0xa3, 3, 2, 0;
    IF_ICMPLE = 0xa4, 3, 2, 0;
    IF_ACMPEQ = 0xa5, 3, 2, 0;
    IF_ACMPNE = 0xa6, 3, 2, 0;
    GOTO = 0xa7, 3, 0, 0;
    JSR = 0xa8, 3, 0, 1;
    RET = 0xa9, 2, 0, 0;
    TABLESWITCH = 0xaa, 0, 1, 0;
    LOOKUPSWITCH = 0xab, 0, 1, 0;
    IRETURN = 0xac, 1, 1, 0;
    LRETURN = 0xad, 1, 2, 0;
    FRETURN = 0xae, 1, 1, 0;
    DRETURN = 0xaf, 1, 2, 0;
    ARETURN = 0xb0, 1, 1, 0;
    RETURN = 0xb1, 1, 0, 0;
    GETSTATIC = 0xb2, 3, -1, -1;
    PUTSTATIC = 0xb3, 3, -1, -1;
    GETFIELD = 0xb4, 3, -1, -1;
    PUTFIELD = 0xb5, 3, -1, -1;
    INVOKEVIRTUAL = 0xb6, 3, -1, -1;
    INVOKESPECIAL = 0xb7, 3, -1, -1;
    INVOKESTATIC = 0xb8, 3, -1, -1;
    INVOKEINTERFACE = 0xb9, 5, -1, -1;
    INVOKEDYNAMIC = 0xba, 5, -1, -1;
    NEW = 0xbb, 3, 0, 1;
    NEWARRAY = 0xbc, 2, 1, 1;
    ANEWARRAY = 0xbd, 3, 1, 1;
    ARRAYLENGTH = 0xbe, 1, 1, 1;
    ATHROW = 0xbf, 1, 1, 0;
    CHECKCAST = 0xc0, 3, 1, 1;
    INSTANCEOF = 0xc1, 3, 1, 1;
    MONITORENTER = 0xc2, 1, 1, 0;
    MONITOREXIT = 0xc3, 1, 1, 0;
    WIDE = 0xc4, 0, -1, -1;
    MULTIANEWARRAY = 0xc5, 4, -1, 1;
    IFNULL = 0xc6, 3, 1, 0;
    IFNONNULL = 0xc7, 3, 1, 0;
    GOTO_W = 0xc8, 5, 0, 0;
    JSR_W = 0xc9, 5, 0, 1;
}

// NEWARRAY element type codes
pub const T_BOOLEAN: u8 = 4;
pub const T_CHAR: u8 = 5;
pub const T_FLOAT: u8 = 6;
pub const T_DOUBLE: u8 = 7;
pub const T_BYTE: u8 = 8;
pub const T_SHORT: u8 = 9;
pub const T_INT: u8 = 10;
pub const T_LONG: u8 = 11;

/// Fixed `(pops, pushes)` in slots, `None` when the effect depends on operands
pub fn stack_effect(op: u8) -> Option<(u8, u8)> {
    match info(op) {
        Some((_, pop, push)) if pop >= 0 && push >= 0 => Some((pop as u8, push as u8)),
        _ => None,
    }
}

/// Encoded length of the instruction at `pc`, including operands.
///
/// Handles the variable-length switch and `wide` forms.
pub fn instruction_length(code: &[u8], pc: usize) -> Option<usize> {
    let op = *code.get(pc)?;
    let (len, _, _) = info(op)?;
    if len > 0 {
        return Some(len as usize);
    }
    match op {
        WIDE => {
            let inner = *code.get(pc + 1)?;
            Some(if inner == IINC { 6 } else { 4 })
        }
        TABLESWITCH | LOOKUPSWITCH => {
            let base = (pc + 4) & !3;
            let read = |at: usize| -> Option<i32> {
                let b = code.get(at..at + 4)?;
                Some(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            };
            let count = if op == TABLESWITCH {
                let low = read(base + 4)?;
                let high = read(base + 8)?;
                if high < low {
                    return None;
                }
                (high as i64 - low as i64 + 1) as usize + 3
            } else {
                let pairs = read(base + 4)?;
                if pairs < 0 {
                    return None;
                }
                pairs as usize * 2 + 2
            };
            Some(base - pc + count * 4)
        }
        _ => None,
    }
}

/// Conditional and unconditional jumps with a 16-bit offset
pub fn is_jump(op: u8) -> bool {
    (IFEQ..=JSR).contains(&op) || op == IFNULL || op == IFNONNULL
}

pub fn is_conditional_jump(op: u8) -> bool {
    (IFEQ..=IF_ACMPNE).contains(&op) || op == IFNULL || op == IFNONNULL
}

pub fn is_return(op: u8) -> bool {
    (IRETURN..=RETURN).contains(&op)
}

/// Instructions after which control never falls through
pub fn ends_flow(op: u8) -> bool {
    is_return(op) || matches!(op, GOTO | GOTO_W | ATHROW | RET | TABLESWITCH | LOOKUPSWITCH)
}

/// The branch with the opposite condition
pub fn negate_jump(op: u8) -> Option<u8> {
    Some(match op {
        IFEQ => IFNE,
        IFNE => IFEQ,
        IFLT => IFGE,
        IFGE => IFLT,
        IFGT => IFLE,
        IFLE => IFGT,
        IF_ICMPEQ => IF_ICMPNE,
        IF_ICMPNE => IF_ICMPEQ,
        IF_ICMPLT => IF_ICMPGE,
        IF_ICMPGE => IF_ICMPLT,
        IF_ICMPGT => IF_ICMPLE,
        IF_ICMPLE => IF_ICMPGT,
        IF_ACMPEQ => IF_ACMPNE,
        IF_ACMPNE => IF_ACMPEQ,
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_effects() {
        assert_eq!(opcode_name(IADD), Some("IADD"));
        assert_eq!(opcode_name(0xfe), None);
        assert_eq!(stack_effect(DUP2_X1), Some((3, 5)));
        assert_eq!(stack_effect(LADD), Some((4, 2)));
        assert_eq!(stack_effect(INVOKESTATIC), None);
    }

    #[test]
    fn lengths() {
        assert_eq!(instruction_length(&[BIPUSH, 7], 0), Some(2));
        assert_eq!(instruction_length(&[WIDE, ILOAD, 1, 0], 0), Some(4));
        assert_eq!(instruction_length(&[WIDE, IINC, 1, 0, 0, 1], 0), Some(6));
        assert_eq!(instruction_length(&[INVOKEINTERFACE, 0, 1, 1, 0], 0), Some(5));
    }

    #[test]
    fn jump_negation_is_an_involution() {
        for op in IFEQ..=IF_ACMPNE {
            let neg = negate_jump(op).unwrap();
            assert_eq!(negate_jump(neg), Some(op));
        }
    }
}
