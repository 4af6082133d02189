//! Primitive lowering strategies, one per operand kind.
//!
//! A strategy is a table of native opcodes. Operators without an entry are
//! unsupported and the caller falls back to dynamic dispatch; `simulate`
//! answers that question without emitting anything.

use log::trace;

use crate::ast::{BinaryOp, IncDec, JvmType, OperandKind};
use crate::codegen::bytecode_helper as helper;
use crate::codegen::code::Code;
use crate::codegen::opcodes::*;
use crate::common::error::Result;

/// How a relational operator is turned into a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    /// IF_ICMPxx on two ints
    IntBranch,
    /// LCMP, then IFxx
    Lcmp,
    /// FCMPG/FCMPL, then IFxx
    Fcmp,
    /// DCMPG/DCMPL, then IFxx
    Dcmp,
}

/// Native opcodes of one primitive kind. `None` means the operator stays
/// dynamic for this kind.
#[derive(Debug)]
pub struct PrimitiveTable {
    /// Kind both operands are converted to
    pub operand: OperandKind,
    /// Array element kind loaded and stored natively
    pub element: OperandKind,
    pub add: Option<u8>,
    pub sub: Option<u8>,
    pub mul: Option<u8>,
    pub div: Option<u8>,
    pub intdiv: Option<u8>,
    pub rem: Option<u8>,
    /// and, or, xor
    pub bitwise: Option<[u8; 3]>,
    /// shl, shr, ushr
    pub shifts: Option<[u8; 3]>,
    pub compare: Option<CompareKind>,
    /// Constant 1 of the operand type, for ++ and --
    pub one: Option<u8>,
    /// Narrowing applied after ++ and -- on sub-int kinds
    pub narrow: Option<u8>,
}

/// Capability interface of a lowering strategy.
pub trait BinaryStrategy: Sync {
    fn kind(&self) -> OperandKind;

    /// Type operands must have before `emit`
    fn operand_type(&self) -> JvmType;

    /// Whether `op` has a native lowering. Emits nothing.
    fn simulate(&self, op: BinaryOp) -> bool;

    fn result_type(&self, op: BinaryOp) -> JvmType;

    /// Emit `op` over two operands of `operand_type` already on the stack
    fn emit(&self, code: &mut Code, op: BinaryOp) -> Result<()>;

    fn supports_inc_dec(&self) -> bool;

    /// `x + 1` or `x - 1` on a value of `operand_type`, narrowed back to the
    /// element type for char, byte and short
    fn emit_inc_dec(&self, code: &mut Code, op: IncDec) -> Result<()>;

    /// Element type for native array access, if any
    fn array_element(&self) -> Option<JvmType>;
}

/// Strategy backed by a [`PrimitiveTable`]
#[derive(Debug)]
pub struct PrimitiveStrategy {
    kind: OperandKind,
    table: PrimitiveTable,
}

/// Strategy of non-primitive operands: every operator is dynamic.
#[derive(Debug)]
pub struct DynamicOnly;

impl PrimitiveStrategy {
    fn opcode(&self, op: BinaryOp) -> Option<u8> {
        let t = &self.table;
        match op {
            BinaryOp::Plus => t.add,
            BinaryOp::Minus => t.sub,
            BinaryOp::Multiply => t.mul,
            BinaryOp::Divide => t.div,
            BinaryOp::IntDiv => t.intdiv,
            BinaryOp::Mod => t.rem,
            BinaryOp::BitAnd => t.bitwise.map(|b| b[0]),
            BinaryOp::BitOr => t.bitwise.map(|b| b[1]),
            BinaryOp::BitXor => t.bitwise.map(|b| b[2]),
            BinaryOp::LeftShift => t.shifts.map(|s| s[0]),
            BinaryOp::RightShift => t.shifts.map(|s| s[1]),
            BinaryOp::RightShiftUnsigned => t.shifts.map(|s| s[2]),
            _ => None,
        }
    }

    fn emit_compare(&self, code: &mut Code, kind: CompareKind, op: BinaryOp) -> Result<()> {
        let branch = match kind {
            CompareKind::IntBranch => match op {
                BinaryOp::Equal | BinaryOp::Identical => IF_ICMPEQ,
                BinaryOp::NotEqual | BinaryOp::NotIdentical => IF_ICMPNE,
                BinaryOp::LessThan => IF_ICMPLT,
                BinaryOp::LessThanEqual => IF_ICMPLE,
                BinaryOp::GreaterThan => IF_ICMPGT,
                BinaryOp::GreaterThanEqual => IF_ICMPGE,
                _ => return Err(code.internal(format!("{} is not a comparison", op.symbol()))),
            },
            _ => {
                // NaN must make every ordering test false: > and >= use the
                // variant that yields -1 on NaN, the others the one yielding 1
                let greater = matches!(op, BinaryOp::GreaterThan | BinaryOp::GreaterThanEqual);
                let cmp = match kind {
                    CompareKind::Lcmp => LCMP,
                    CompareKind::Fcmp if greater => FCMPL,
                    CompareKind::Fcmp => FCMPG,
                    CompareKind::Dcmp if greater => DCMPL,
                    _ => DCMPG,
                };
                code.emitop(cmp)?;
                zero_branch(code, op)?
            }
        };
        let true_label = code.new_label();
        let end = code.new_label();
        code.jump(branch, true_label)?;
        code.emitop(ICONST_0)?;
        code.goto(end)?;
        code.mark(true_label)?;
        code.emitop(ICONST_1)?;
        code.mark(end)
    }

    fn emit_spaceship(&self, code: &mut Code, kind: CompareKind) -> Result<()> {
        match kind {
            CompareKind::IntBranch => {
                let not_less = code.new_label();
                let greater = code.new_label();
                let end = code.new_label();
                code.emitop(DUP2)?;
                code.jump(IF_ICMPGE, not_less)?;
                code.emitop(POP2)?;
                code.emitop(ICONST_M1)?;
                code.goto(end)?;
                code.mark(not_less)?;
                code.jump(IF_ICMPNE, greater)?;
                code.emitop(ICONST_0)?;
                code.goto(end)?;
                code.mark(greater)?;
                code.emitop(ICONST_1)?;
                code.mark(end)
            }
            CompareKind::Lcmp => code.emitop(LCMP),
            CompareKind::Fcmp => code.emitop(FCMPG),
            CompareKind::Dcmp => code.emitop(DCMPG),
        }
    }
}

/// IFxx testing the result of a three-way compare instruction
fn zero_branch(code: &Code, op: BinaryOp) -> Result<u8> {
    Ok(match op {
        BinaryOp::Equal | BinaryOp::Identical => IFEQ,
        BinaryOp::NotEqual | BinaryOp::NotIdentical => IFNE,
        BinaryOp::LessThan => IFLT,
        BinaryOp::LessThanEqual => IFLE,
        BinaryOp::GreaterThan => IFGT,
        BinaryOp::GreaterThanEqual => IFGE,
        _ => return Err(code.internal(format!("{} is not a comparison", op.symbol()))),
    })
}

impl BinaryStrategy for PrimitiveStrategy {
    fn kind(&self) -> OperandKind {
        self.kind
    }

    fn operand_type(&self) -> JvmType {
        self.table.operand.jvm_type()
    }

    fn simulate(&self, op: BinaryOp) -> bool {
        if op.is_comparison() || op == BinaryOp::CompareTo {
            return self.table.compare.is_some();
        }
        self.opcode(op).is_some()
    }

    fn result_type(&self, op: BinaryOp) -> JvmType {
        if op.is_comparison() {
            JvmType::Boolean
        } else if op == BinaryOp::CompareTo {
            JvmType::Int
        } else {
            self.table.operand.jvm_type()
        }
    }

    fn emit(&self, code: &mut Code, op: BinaryOp) -> Result<()> {
        trace!("native {} on {:?}", op.symbol(), self.kind);
        if op.is_comparison() || op == BinaryOp::CompareTo {
            let kind = self
                .table
                .compare
                .ok_or_else(|| code.internal(format!("no native comparison for {:?}", self.kind)))?;
            return if op == BinaryOp::CompareTo {
                self.emit_spaceship(code, kind)
            } else {
                self.emit_compare(code, kind, op)
            };
        }
        match self.opcode(op) {
            Some(opcode) => code.emitop(opcode),
            None => Err(code.internal(format!("no native {} for {:?}", op.symbol(), self.kind))),
        }
    }

    fn supports_inc_dec(&self) -> bool {
        self.table.one.is_some() && self.table.add.is_some() && self.table.sub.is_some()
    }

    fn emit_inc_dec(&self, code: &mut Code, op: IncDec) -> Result<()> {
        let t = &self.table;
        let (Some(one), Some(add), Some(sub)) = (t.one, t.add, t.sub) else {
            return Err(code.internal(format!("no native increment for {:?}", self.kind)));
        };
        code.emitop(one)?;
        code.emitop(match op {
            IncDec::Increment => add,
            IncDec::Decrement => sub,
        })?;
        if let Some(narrow) = t.narrow {
            code.emitop(narrow)?;
        }
        Ok(())
    }

    fn array_element(&self) -> Option<JvmType> {
        Some(self.table.element.jvm_type())
    }
}

impl BinaryStrategy for DynamicOnly {
    fn kind(&self) -> OperandKind {
        OperandKind::Object
    }

    fn operand_type(&self) -> JvmType {
        JvmType::object()
    }

    fn simulate(&self, _op: BinaryOp) -> bool {
        false
    }

    fn result_type(&self, _op: BinaryOp) -> JvmType {
        JvmType::object()
    }

    fn emit(&self, code: &mut Code, op: BinaryOp) -> Result<()> {
        Err(code.internal(format!("{} has no native lowering on objects", op.symbol())))
    }

    fn supports_inc_dec(&self) -> bool {
        false
    }

    fn emit_inc_dec(&self, code: &mut Code, _op: IncDec) -> Result<()> {
        Err(code.internal("increment has no native lowering on objects"))
    }

    fn array_element(&self) -> Option<JvmType> {
        None
    }
}

const INT_OPS: PrimitiveTable = PrimitiveTable {
    operand: OperandKind::Int,
    element: OperandKind::Int,
    add: Some(IADD),
    sub: Some(ISUB),
    mul: Some(IMUL),
    div: None,
    intdiv: Some(IDIV),
    rem: Some(IREM),
    bitwise: Some([IAND, IOR, IXOR]),
    shifts: Some([ISHL, ISHR, IUSHR]),
    compare: Some(CompareKind::IntBranch),
    one: Some(ICONST_1),
    narrow: None,
};

static INT: PrimitiveStrategy = PrimitiveStrategy { kind: OperandKind::Int, table: INT_OPS };

static CHAR: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Char,
    table: PrimitiveTable { element: OperandKind::Char, narrow: Some(I2C), ..INT_OPS },
};

static BYTE: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Byte,
    table: PrimitiveTable { element: OperandKind::Byte, narrow: Some(I2B), ..INT_OPS },
};

static SHORT: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Short,
    table: PrimitiveTable { element: OperandKind::Short, narrow: Some(I2S), ..INT_OPS },
};

static LONG: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Long,
    table: PrimitiveTable {
        operand: OperandKind::Long,
        element: OperandKind::Long,
        add: Some(LADD),
        sub: Some(LSUB),
        mul: Some(LMUL),
        div: None,
        intdiv: Some(LDIV),
        rem: Some(LREM),
        bitwise: Some([LAND, LOR, LXOR]),
        shifts: Some([LSHL, LSHR, LUSHR]),
        compare: Some(CompareKind::Lcmp),
        one: Some(LCONST_1),
        narrow: None,
    },
};

static DOUBLE: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Double,
    table: PrimitiveTable {
        operand: OperandKind::Double,
        element: OperandKind::Double,
        add: Some(DADD),
        sub: Some(DSUB),
        mul: Some(DMUL),
        div: Some(DDIV),
        intdiv: None,
        rem: None,
        bitwise: None,
        shifts: None,
        compare: Some(CompareKind::Dcmp),
        one: Some(DCONST_1),
        narrow: None,
    },
};

static FLOAT: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Float,
    table: PrimitiveTable {
        operand: OperandKind::Float,
        element: OperandKind::Float,
        add: Some(FADD),
        sub: Some(FSUB),
        mul: Some(FMUL),
        div: Some(FDIV),
        intdiv: None,
        rem: None,
        bitwise: None,
        shifts: None,
        compare: Some(CompareKind::Fcmp),
        one: Some(FCONST_1),
        narrow: None,
    },
};

static BOOLEAN: PrimitiveStrategy = PrimitiveStrategy {
    kind: OperandKind::Boolean,
    table: PrimitiveTable {
        operand: OperandKind::Boolean,
        element: OperandKind::Boolean,
        add: None,
        sub: None,
        mul: None,
        div: None,
        intdiv: None,
        rem: None,
        bitwise: None,
        shifts: None,
        compare: None,
        one: None,
        narrow: None,
    },
};

static OBJECT: DynamicOnly = DynamicOnly;

/// Strategy table lookup, indexed by operand kind
pub fn strategy_for(kind: OperandKind) -> &'static dyn BinaryStrategy {
    match kind {
        OperandKind::Object => &OBJECT,
        OperandKind::Int => &INT,
        OperandKind::Long => &LONG,
        OperandKind::Double => &DOUBLE,
        OperandKind::Char => &CHAR,
        OperandKind::Byte => &BYTE,
        OperandKind::Short => &SHORT,
        OperandKind::Float => &FLOAT,
        OperandKind::Boolean => &BOOLEAN,
    }
}

/// Strategy for native access to elements of `array`, when its component
/// is a primitive.
pub fn array_strategy(array: &JvmType) -> Option<&'static dyn BinaryStrategy> {
    let component = array.component()?;
    if !component.is_primitive() {
        return None;
    }
    Some(strategy_for(OperandKind::of(component)))
}

/// xALOAD for the strategy's element type
pub fn emit_array_get(code: &mut Code, strategy: &dyn BinaryStrategy) -> Result<JvmType> {
    let element = strategy
        .array_element()
        .ok_or_else(|| code.internal(format!("{:?} has no native array access", strategy.kind())))?;
    code.emitop(helper::array_load_op(&element))?;
    Ok(element)
}

/// xASTORE for the strategy's element type
pub fn emit_array_set(code: &mut Code, strategy: &dyn BinaryStrategy) -> Result<()> {
    let element = strategy
        .array_element()
        .ok_or_else(|| code.internal(format!("{:?} has no native array access", strategy.kind())))?;
    code.emitop(helper::array_store_op(&element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::ConstantPool;
    use rstest::rstest;

    #[rstest]
    #[case(OperandKind::Int, BinaryOp::Plus, true)]
    #[case(OperandKind::Int, BinaryOp::Divide, false)]
    #[case(OperandKind::Int, BinaryOp::IntDiv, true)]
    #[case(OperandKind::Int, BinaryOp::Power, false)]
    #[case(OperandKind::Long, BinaryOp::Divide, false)]
    #[case(OperandKind::Long, BinaryOp::RightShiftUnsigned, true)]
    #[case(OperandKind::Double, BinaryOp::Divide, true)]
    #[case(OperandKind::Double, BinaryOp::Mod, false)]
    #[case(OperandKind::Double, BinaryOp::BitAnd, false)]
    #[case(OperandKind::Double, BinaryOp::CompareTo, true)]
    #[case(OperandKind::Char, BinaryOp::Minus, true)]
    #[case(OperandKind::Boolean, BinaryOp::Equal, false)]
    #[case(OperandKind::Object, BinaryOp::Plus, false)]
    #[case(OperandKind::Int, BinaryOp::Index, false)]
    fn simulate_table(#[case] kind: OperandKind, #[case] op: BinaryOp, #[case] supported: bool) {
        assert_eq!(strategy_for(kind).simulate(op), supported);
    }

    fn emitted(kind: OperandKind, op: BinaryOp) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let strategy = strategy_for(kind);
        let ty = strategy.operand_type();
        for _ in 0..2 {
            crate::codegen::bytecode_helper::push_default(&mut code, &ty).unwrap();
        }
        let start = code.pc();
        strategy.emit(&mut code, op).unwrap();
        assert_eq!(code.depth(), strategy.result_type(op).width());
        code.emitop(if strategy.result_type(op).width() == 2 { POP2 } else { POP }).unwrap();
        code.emitop(RETURN).unwrap();
        let body = code.finish(0).unwrap();
        body.code[start..body.code.len() - 2].to_vec()
    }

    #[test]
    fn arithmetic_opcodes() {
        assert_eq!(emitted(OperandKind::Int, BinaryOp::Plus), vec![IADD]);
        assert_eq!(emitted(OperandKind::Long, BinaryOp::IntDiv), vec![LDIV]);
        assert_eq!(emitted(OperandKind::Double, BinaryOp::Divide), vec![DDIV]);
        assert_eq!(emitted(OperandKind::Int, BinaryOp::LeftShift), vec![ISHL]);
    }

    #[test]
    fn comparison_is_a_branch_pushing_a_boolean() {
        let code = emitted(OperandKind::Int, BinaryOp::LessThan);
        assert_eq!(code[0], IF_ICMPLT);
        assert!(code.contains(&ICONST_0) && code.contains(&ICONST_1));
        let code = emitted(OperandKind::Long, BinaryOp::Equal);
        assert_eq!(&code[..2], &[LCMP, IFEQ]);
        assert_eq!(emitted(OperandKind::Double, BinaryOp::GreaterThan)[0], DCMPL);
        assert_eq!(emitted(OperandKind::Double, BinaryOp::LessThan)[0], DCMPG);
    }

    #[test]
    fn int_spaceship_duplicates_operands() {
        let code = emitted(OperandKind::Int, BinaryOp::CompareTo);
        assert_eq!(&code[..2], &[DUP2, IF_ICMPGE]);
        assert!(code.contains(&ICONST_M1));
        assert_eq!(emitted(OperandKind::Long, BinaryOp::CompareTo), vec![LCMP]);
    }

    #[test]
    fn sub_int_increment_narrows() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        code.push_int(65).unwrap();
        let start = code.pc();
        strategy_for(OperandKind::Char).emit_inc_dec(&mut code, IncDec::Increment).unwrap();
        code.emitop(IRETURN).unwrap();
        let body = code.finish(0).unwrap();
        assert_eq!(&body.code[start..start + 3], &[ICONST_1, IADD, I2C]);
    }

    #[test]
    fn array_strategies() {
        let s = array_strategy(&JvmType::array_of(JvmType::Boolean)).unwrap();
        assert_eq!(s.array_element(), Some(JvmType::Boolean));
        assert!(!s.simulate(BinaryOp::Plus));
        assert!(array_strategy(&JvmType::array_of(JvmType::string())).is_none());
        assert!(array_strategy(&JvmType::Int).is_none());
        assert!(strategy_for(OperandKind::Object).array_element().is_none());
    }
}
