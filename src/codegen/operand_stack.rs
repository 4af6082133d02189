//! Compile-time model of the JVM operand stack.
//!
//! Each entry is the static type of one pushed value; long and double count
//! as one entry but two physical slots. Instructions that move values are
//! emitted through the tracker so that the opcode matches the slot width.
//! `push` and `remove` only touch the model: they are for instructions the
//! caller emitted itself.

use super::bytecode_helper as helper;
use super::code::Code;
use super::compile_stack::BytecodeVariable;
use super::invocation;
use super::opcodes::*;
use crate::ast::{Constant, JvmType};
use crate::common::error::Result;
use crate::consts;

#[derive(Debug, Default)]
pub struct OperandStack {
    stack: Vec<JvmType>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn top(&self) -> Option<&JvmType> {
        self.stack.last()
    }

    /// Type `n` entries below the top (0 is the top)
    pub fn peek(&self, n: usize) -> Option<&JvmType> {
        self.stack.len().checked_sub(n + 1).map(|i| &self.stack[i])
    }

    /// Physical slots taken by the tracked values
    pub fn physical_width(&self) -> u16 {
        self.stack.iter().map(JvmType::width).sum()
    }

    /// Compare the model against the code buffer's physical depth. Dead code
    /// has no depth to compare against.
    pub fn check_balance(&self, code: &Code) -> Result<()> {
        if code.is_alive() && self.physical_width() != code.depth() {
            return Err(code.internal(format!(
                "operand stack model holds {} slots ({:?}) but the code has {}",
                self.physical_width(),
                self.stack,
                code.depth()
            )));
        }
        Ok(())
    }

    fn top_or_err(&self, code: &Code, what: &str) -> Result<JvmType> {
        self.stack
            .last()
            .cloned()
            .ok_or_else(|| code.internal(format!("{} but the operand stack is empty", what)))
    }

    pub fn push(&mut self, ty: JvmType) {
        self.stack.push(ty);
    }

    /// Drop `n` entries from the model without emitting anything
    pub fn remove(&mut self, code: &Code, n: usize) -> Result<()> {
        if n > self.stack.len() {
            return Err(code.internal(format!(
                "tried to remove {} operands from a stack of {}",
                n,
                self.stack.len()
            )));
        }
        self.stack.truncate(self.stack.len() - n);
        Ok(())
    }

    /// Emit POP or POP2 for the top value
    pub fn pop(&mut self, code: &mut Code) -> Result<()> {
        let top = self.top_or_err(code, "pop requested")?;
        code.emitop(if top.width() == 2 { POP2 } else { POP })?;
        self.stack.pop();
        Ok(())
    }

    pub fn dup(&mut self, code: &mut Code) -> Result<()> {
        let top = self.top_or_err(code, "dup requested")?;
        code.emitop(if top.width() == 2 { DUP2 } else { DUP })?;
        self.stack.push(top);
        Ok(())
    }

    pub fn swap(&mut self, code: &mut Code) -> Result<()> {
        let len = self.stack.len();
        if len < 2 {
            return Err(code.internal(format!("swap needs two operands, stack has {}", len)));
        }
        let (below, top) = (self.stack[len - 2].width(), self.stack[len - 1].width());
        match (below, top) {
            (1, 1) => code.emitop(SWAP)?,
            (2, 1) => {
                code.emitop(DUP_X2)?;
                code.emitop(POP)?;
            }
            (1, 2) => {
                code.emitop(DUP2_X1)?;
                code.emitop(POP2)?;
            }
            _ => {
                code.emitop(DUP2_X2)?;
                code.emitop(POP2)?;
            }
        }
        self.stack.swap(len - 2, len - 1);
        Ok(())
    }

    pub fn replace(&mut self, code: &Code, ty: JvmType) -> Result<()> {
        self.replace_n(code, ty, 1)
    }

    /// Replace the top `n` entries by one entry of type `ty`
    pub fn replace_n(&mut self, code: &Code, ty: JvmType, n: usize) -> Result<()> {
        self.remove(code, n)?;
        self.stack.push(ty);
        Ok(())
    }

    /// Box the top value if it is primitive and return its new type
    pub fn box_top(&mut self, code: &mut Code) -> Result<JvmType> {
        let top = self.top_or_err(code, "box requested")?;
        if !top.is_primitive() {
            return Ok(top);
        }
        let boxed = helper::box_value(code, &top)?;
        self.replace(code, boxed.clone())?;
        Ok(boxed)
    }

    /// Assignment conversion of the top value to `target`
    pub fn do_groovy_cast(&mut self, code: &mut Code, target: &JvmType) -> Result<()> {
        self.convert_and_cast(code, target, false)
    }

    /// Explicit `as` coercion of the top value
    pub fn as_type(&mut self, code: &mut Code, target: &JvmType) -> Result<()> {
        self.convert_and_cast(code, target, true)
    }

    fn convert_and_cast(&mut self, code: &mut Code, target: &JvmType, coerce: bool) -> Result<()> {
        let what = if coerce { "coercion" } else { "cast" };
        let top = self.top_or_err(code, &format!("{} to {} requested", what, target))?;
        if top == *target {
            return Ok(());
        }
        if coerce {
            return invocation::coerce(self, code, &top, target);
        }

        let prim_target = target.is_primitive();
        let prim_top = top.is_primitive();
        if prim_top && prim_target {
            if helper::convert_primitive(code, &top, target)? {
                return self.replace(code, target.clone());
            }
            self.box_top(code)?;
        } else if !prim_target {
            invocation::cast_to_non_primitive_if_necessary(self, code, &top, target)?;
        }

        if prim_target && *target != JvmType::Boolean && !prim_top && target.wrapper() == top {
            helper::wrapper_value(code, &top, target)?;
        } else {
            let current = self.top_or_err(code, "cast")?;
            if !current.is_assignable_to(target) {
                helper::do_cast(code, target)?;
            }
        }
        self.replace(code, target.clone())
    }

    /// Turn the value above `mark` into a primitive boolean. With nothing
    /// above the mark, `empty_default` is pushed.
    pub fn cast_to_bool(&mut self, code: &mut Code, mark: usize, empty_default: bool) -> Result<()> {
        let len = self.stack.len();
        if mark == len {
            code.push_int(i32::from(empty_default))?;
            self.stack.push(JvmType::Boolean);
            return Ok(());
        }
        if mark + 1 != len {
            return Err(code.internal(format!(
                "boolean cast expects one value above mark {}, stack has {}",
                mark, len
            )));
        }
        let last = self.stack[len - 1].clone();
        if last == JvmType::Boolean {
            return Ok(());
        }
        if last.is_primitive() {
            helper::convert_primitive_to_boolean(code, &last)?;
        } else {
            helper::unbox(code, &JvmType::Boolean)?;
        }
        self.stack[mark] = JvmType::Boolean;
        Ok(())
    }

    pub fn push_constant(&mut self, code: &mut Code, constant: &Constant) -> Result<()> {
        match constant {
            Constant::Null => code.emitop(ACONST_NULL)?,
            Constant::Boolean(b) => code.push_int(i32::from(*b))?,
            Constant::Char(c) => code.push_int(i32::from(*c))?,
            Constant::Byte(b) => code.push_int(i32::from(*b))?,
            Constant::Short(s) => code.push_int(i32::from(*s))?,
            Constant::Int(i) => code.push_int(*i)?,
            Constant::Long(l) => code.push_long(*l)?,
            Constant::Float(f) => code.push_float(*f)?,
            Constant::Double(d) => code.push_double(*d)?,
            Constant::String(s) => code.push_string(s)?,
            Constant::BigDecimal(text) | Constant::BigInteger(text) => {
                let owner = if matches!(constant, Constant::BigDecimal(_)) {
                    consts::BIG_DECIMAL
                } else {
                    consts::BIG_INTEGER
                };
                code.type_insn(NEW, owner)?;
                code.emitop(DUP)?;
                code.push_string(text)?;
                code.invokespecial(owner, "<init>", "(Ljava/lang/String;)V")?;
            }
        }
        self.stack.push(constant.ty());
        Ok(())
    }

    pub fn push_bool(&mut self, code: &mut Code, value: bool) -> Result<()> {
        code.push_int(i32::from(value))?;
        self.stack.push(JvmType::Boolean);
        Ok(())
    }

    /// Message or property name pushed as a String
    pub fn push_dynamic_name(&mut self, code: &mut Code, name: &str) -> Result<()> {
        code.push_string(name)?;
        self.stack.push(JvmType::string());
        Ok(())
    }

    pub fn push_class_literal(&mut self, code: &mut Code, ty: &JvmType) -> Result<()> {
        helper::push_class_literal(code, ty)?;
        self.stack.push(JvmType::class_literal());
        Ok(())
    }

    pub fn load_var(&mut self, code: &mut Code, var: &BytecodeVariable) -> Result<()> {
        if var.holder {
            code.load_local(&JvmType::object(), var.index)?;
            code.invokevirtual(consts::REFERENCE, "get", "()Ljava/lang/Object;")?;
            helper::do_cast(code, &var.ty)?;
        } else {
            code.load_local(&var.ty, var.index)?;
        }
        self.stack.push(var.ty.clone());
        Ok(())
    }

    /// Store the top value into `var`, converting it to the variable type.
    /// The value leaves the stack.
    pub fn store_var(&mut self, code: &mut Code, var: &BytecodeVariable) -> Result<()> {
        self.do_groovy_cast(code, &var.ty)?;
        if var.holder {
            self.box_top(code)?;
            code.load_local(&JvmType::object(), var.index)?;
            code.type_insn(CHECKCAST, consts::REFERENCE)?;
            code.emitop(SWAP)?;
            code.invokevirtual(consts::REFERENCE, "set", "(Ljava/lang/Object;)V")?;
        } else {
            code.store_local(&var.ty, var.index)?;
        }
        self.remove(code, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::ConstantPool;

    fn with_code<F: FnOnce(&mut Code, &mut OperandStack)>(f: F) {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut stack = OperandStack::new();
        f(&mut code, &mut stack);
    }

    #[test]
    fn pop_uses_slot_width() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::Long(7)).unwrap();
            stack.push_constant(code, &Constant::Int(7)).unwrap();
            assert_eq!(stack.physical_width(), 3);
            stack.check_balance(code).unwrap();
            let start = code.pc();
            stack.pop(code).unwrap();
            stack.pop(code).unwrap();
            assert_eq!(code.pc() - start, 2);
            assert!(stack.is_empty());
            assert_eq!(code.depth(), 0);
        });
    }

    #[test]
    fn empty_pop_is_internal_error() {
        with_code(|code, stack| {
            let err = stack.pop(code).unwrap_err();
            assert!(err.is_internal());
            assert!(err.to_string().contains("demo/T.m"));
            assert!(stack.do_groovy_cast(code, &JvmType::Int).unwrap_err().is_internal());
        });
    }

    #[test]
    fn swap_mixed_widths() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::Int(1)).unwrap();
            stack.push_constant(code, &Constant::Double(2.5)).unwrap();
            stack.swap(code).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::Int));
            assert_eq!(stack.peek(1), Some(&JvmType::Double));
            stack.check_balance(code).unwrap();
        });
    }

    #[test]
    fn box_and_unbox_through_cast() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::Int(3)).unwrap();
            assert_eq!(stack.box_top(code).unwrap(), JvmType::class("java/lang/Integer"));
            stack.do_groovy_cast(code, &JvmType::Long).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::Long));
            stack.check_balance(code).unwrap();
        });
    }

    #[test]
    fn primitive_to_object_is_boxed() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::Double(1.0)).unwrap();
            stack.do_groovy_cast(code, &JvmType::object()).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::object()));
            assert_eq!(code.depth(), 1);
        });
    }

    #[test]
    fn big_decimal_constant_is_constructed() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::BigDecimal("1.5".into())).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::big_decimal()));
            assert_eq!(code.depth(), 1);
        });
    }

    #[test]
    fn bool_cast_of_reference_and_empty_mark() {
        with_code(|code, stack| {
            stack.push_constant(code, &Constant::String("x".into())).unwrap();
            stack.cast_to_bool(code, 0, false).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::Boolean));
            stack.cast_to_bool(code, 1, true).unwrap();
            assert_eq!(stack.len(), 2);
            stack.check_balance(code).unwrap();
        });
    }

    #[test]
    fn holder_store_keeps_balance() {
        with_code(|code, stack| {
            let var = BytecodeVariable { name: "x".into(), ty: JvmType::Int, index: 1, holder: true };
            stack.push_constant(code, &Constant::Int(4)).unwrap();
            stack.store_var(code, &var).unwrap();
            assert!(stack.is_empty());
            assert_eq!(code.depth(), 0);
            stack.load_var(code, &var).unwrap();
            assert_eq!(stack.top(), Some(&JvmType::Int));
            stack.check_balance(code).unwrap();
        });
    }
}
