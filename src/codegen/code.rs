//! Bytecode buffer for one method body.
//!
//! Follows the javac `Code` model: instructions are dropped while the code
//! is not alive (after an unconditional transfer and before the next jump
//! target), and the physical stack depth is tracked per instruction so that
//! every jump target is reached with one consistent depth.

use log::trace;

use super::constpool::ConstantPool;
use super::descriptor;
use super::opcodes::{self, *};
use crate::ast::JvmType;
use crate::common::error::{Error, Result};

/// A jump target inside one [`Code`] buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default, Clone)]
struct LabelInfo {
    pc: Option<usize>,
    /// Stack depth on entry, fixed by the first jump or by marking
    depth: Option<u16>,
}

#[derive(Debug)]
struct Fixup {
    insn_pc: usize,
    label: Label,
}

/// Finished method body ready for the Code attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBody {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    /// `(start_pc, line)` pairs
    pub line_numbers: Vec<(u16, u16)>,
}

pub struct Code<'p> {
    pool: &'p mut ConstantPool,
    class_name: String,
    method_name: String,
    code: Vec<u8>,
    depth: u16,
    max_stack: u16,
    alive: bool,
    labels: Vec<LabelInfo>,
    fixups: Vec<Fixup>,
    line_debug_info: bool,
    pending_line: Option<u32>,
    lines: Vec<(u16, u16)>,
}

impl<'p> Code<'p> {
    pub fn new(pool: &'p mut ConstantPool, class_name: &str, method_name: &str, line_debug_info: bool) -> Self {
        Self {
            pool,
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            code: Vec::new(),
            depth: 0,
            max_stack: 0,
            alive: true,
            labels: Vec::new(),
            fixups: Vec::new(),
            line_debug_info,
            pending_line: None,
            lines: Vec::new(),
        }
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut *self.pool
    }

    /// Internal-consistency error naming the method under generation
    pub fn internal(&self, message: impl Into<String>) -> Error {
        Error::internal(&self.class_name, &self.method_name, message)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Physical operand stack depth in slots
    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    /// Record a source line for the next emitted instruction
    pub fn line(&mut self, line: u32) {
        if self.line_debug_info && line > 0 {
            self.pending_line = Some(line);
        }
    }

    fn flush_line(&mut self) {
        if let Some(line) = self.pending_line.take() {
            let line = line.min(u32::from(u16::MAX)) as u16;
            let pc = self.code.len() as u16;
            match self.lines.last_mut() {
                Some(last) if last.1 == line => {}
                Some(last) if usize::from(last.0) == self.code.len() => last.1 = line,
                _ => self.lines.push((pc, line)),
            }
        }
    }

    fn adjust(&mut self, op: u8, pop: u16, push: u16) -> Result<()> {
        if self.depth < pop {
            return Err(self.internal(format!(
                "physical stack underflow at pc {}: {} needs {} slots, {} available",
                self.code.len(),
                opcodes::opcode_name(op).unwrap_or("?"),
                pop,
                self.depth
            )));
        }
        self.depth = self.depth - pop + push;
        self.max_stack = self.max_stack.max(self.depth);
        Ok(())
    }

    /// Start an instruction: false if the code is dead and nothing is emitted
    fn begin(&mut self, op: u8) -> bool {
        if !self.alive {
            return false;
        }
        self.flush_line();
        self.code.push(op);
        true
    }

    fn end(&mut self, op: u8) {
        if opcodes::ends_flow(op) {
            self.alive = false;
        }
    }

    fn fixed_effect(&self, op: u8) -> Result<(u16, u16)> {
        stack_effect(op)
            .map(|(pop, push)| (u16::from(pop), u16::from(push)))
            .ok_or_else(|| self.internal(format!("opcode 0x{:02x} has no fixed stack effect", op)))
    }

    /// Emit an instruction without operands
    pub fn emitop(&mut self, op: u8) -> Result<()> {
        let (pop, push) = self.fixed_effect(op)?;
        if self.begin(op) {
            self.adjust(op, pop, push)?;
            self.end(op);
        }
        Ok(())
    }

    /// Emit an instruction with a one-byte operand
    pub fn emitop1(&mut self, op: u8, operand: u8) -> Result<()> {
        let (pop, push) = self.fixed_effect(op)?;
        if self.begin(op) {
            self.code.push(operand);
            self.adjust(op, pop, push)?;
            self.end(op);
        }
        Ok(())
    }

    /// Emit an instruction with a two-byte operand
    pub fn emitop2(&mut self, op: u8, operand: u16) -> Result<()> {
        let (pop, push) = self.fixed_effect(op)?;
        if self.begin(op) {
            self.code.extend_from_slice(&operand.to_be_bytes());
            self.adjust(op, pop, push)?;
            self.end(op);
        }
        Ok(())
    }

    /// Push an int constant with the shortest encoding
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        match value {
            -1..=5 => self.emitop((ICONST_0 as i32 + value) as u8),
            -128..=127 => self.emitop1(BIPUSH, value as i8 as u8),
            -32768..=32767 => self.emitop2(SIPUSH, value as i16 as u16),
            _ => {
                let idx = self.pool.integer(value)?;
                self.ldc(idx)
            }
        }
    }

    pub fn push_long(&mut self, value: i64) -> Result<()> {
        match value {
            0 => self.emitop(LCONST_0),
            1 => self.emitop(LCONST_1),
            _ => {
                let idx = self.pool.long(value)?;
                self.emitop2(LDC2_W, idx)
            }
        }
    }

    pub fn push_float(&mut self, value: f32) -> Result<()> {
        // Bit comparison keeps -0.0 out of FCONST_0
        if value.to_bits() == 0.0f32.to_bits() {
            self.emitop(FCONST_0)
        } else if value == 1.0 {
            self.emitop(FCONST_1)
        } else if value == 2.0 {
            self.emitop(FCONST_2)
        } else {
            let idx = self.pool.float(value)?;
            self.ldc(idx)
        }
    }

    pub fn push_double(&mut self, value: f64) -> Result<()> {
        if value.to_bits() == 0.0f64.to_bits() {
            self.emitop(DCONST_0)
        } else if value == 1.0 {
            self.emitop(DCONST_1)
        } else {
            let idx = self.pool.double(value)?;
            self.emitop2(LDC2_W, idx)
        }
    }

    pub fn push_string(&mut self, value: &str) -> Result<()> {
        let idx = self.pool.string(value)?;
        self.ldc(idx)
    }

    /// `ldc` of a class constant
    pub fn push_class(&mut self, internal_name: &str) -> Result<()> {
        let idx = self.pool.class(internal_name)?;
        self.ldc(idx)
    }

    fn ldc(&mut self, index: u16) -> Result<()> {
        if index <= 0xff {
            self.emitop1(LDC, index as u8)
        } else {
            self.emitop2(LDC_W, index)
        }
    }

    /// Load or store a local, choosing the short or wide form
    fn var_insn(&mut self, op: u8, short_base: u8, index: u16) -> Result<()> {
        if index <= 3 {
            self.emitop(short_base + index as u8)
        } else if index <= 0xff {
            self.emitop1(op, index as u8)
        } else {
            let (pop, push) = self.fixed_effect(op)?;
            if self.begin(WIDE) {
                self.code.push(op);
                self.code.extend_from_slice(&index.to_be_bytes());
                self.adjust(op, pop, push)?;
            }
            Ok(())
        }
    }

    pub fn load_local(&mut self, ty: &JvmType, index: u16) -> Result<()> {
        let k = local_kind(ty);
        self.var_insn(ILOAD + k, ILOAD_0 + 4 * k, index)
    }

    pub fn store_local(&mut self, ty: &JvmType, index: u16) -> Result<()> {
        let k = local_kind(ty);
        self.var_insn(ISTORE + k, ISTORE_0 + 4 * k, index)
    }

    pub fn iinc(&mut self, index: u16, delta: i16) -> Result<()> {
        if index <= 0xff && (-128..=127).contains(&delta) {
            if self.begin(IINC) {
                self.code.push(index as u8);
                self.code.push(delta as i8 as u8);
            }
        } else if self.begin(WIDE) {
            self.code.push(IINC);
            self.code.extend_from_slice(&index.to_be_bytes());
            self.code.extend_from_slice(&delta.to_be_bytes());
        }
        Ok(())
    }

    /// GETSTATIC / PUTSTATIC / GETFIELD / PUTFIELD
    pub fn field_insn(&mut self, op: u8, owner: &str, name: &str, desc: &str) -> Result<()> {
        let width = descriptor::descriptor_slots(desc);
        let (pop, push) = match op {
            GETSTATIC => (0, width),
            PUTSTATIC => (width, 0),
            GETFIELD => (1, width),
            PUTFIELD => (1 + width, 0),
            _ => return Err(self.internal(format!("opcode 0x{:02x} is not a field access", op))),
        };
        let idx = self.pool.field_ref(owner, name, desc)?;
        if self.begin(op) {
            self.code.extend_from_slice(&idx.to_be_bytes());
            self.adjust(op, pop, push)?;
        }
        Ok(())
    }

    /// Any of the four invoke instructions; the stack effect comes from the
    /// descriptor.
    pub fn invoke(&mut self, op: u8, owner: &str, name: &str, desc: &str, interface: bool) -> Result<()> {
        let args = descriptor::argument_slots(desc)
            .ok_or_else(|| self.internal(format!("malformed method descriptor {}", desc)))?;
        let ret = descriptor::return_slots(desc).unwrap_or(0);
        let pop = if op == INVOKESTATIC { args } else { args + 1 };
        let idx = if interface {
            self.pool.interface_method_ref(owner, name, desc)?
        } else {
            self.pool.method_ref(owner, name, desc)?
        };
        trace!("invoke {} {}.{}{}", opcodes::opcode_name(op).unwrap_or("?"), owner, name, desc);
        if self.begin(op) {
            self.code.extend_from_slice(&idx.to_be_bytes());
            if op == INVOKEINTERFACE {
                self.code.push((args + 1) as u8);
                self.code.push(0);
            }
            self.adjust(op, pop, ret)?;
        }
        Ok(())
    }

    pub fn invokestatic(&mut self, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.invoke(INVOKESTATIC, owner, name, desc, false)
    }

    pub fn invokevirtual(&mut self, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.invoke(INVOKEVIRTUAL, owner, name, desc, false)
    }

    pub fn invokeinterface(&mut self, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.invoke(INVOKEINTERFACE, owner, name, desc, true)
    }

    pub fn invokespecial(&mut self, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.invoke(INVOKESPECIAL, owner, name, desc, false)
    }

    /// NEW / ANEWARRAY / CHECKCAST / INSTANCEOF
    pub fn type_insn(&mut self, op: u8, internal_name: &str) -> Result<()> {
        let idx = self.pool.class(internal_name)?;
        self.emitop2(op, idx)
    }

    /// New array of `component` with the length on the stack
    pub fn new_array(&mut self, component: &JvmType) -> Result<()> {
        let atype = match component {
            JvmType::Boolean => T_BOOLEAN,
            JvmType::Char => T_CHAR,
            JvmType::Float => T_FLOAT,
            JvmType::Double => T_DOUBLE,
            JvmType::Byte => T_BYTE,
            JvmType::Short => T_SHORT,
            JvmType::Int => T_INT,
            JvmType::Long => T_LONG,
            JvmType::Void => return Err(self.internal("array of void")),
            reference => return self.type_insn(ANEWARRAY, &reference.internal_name()),
        };
        self.emitop1(NEWARRAY, atype)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelInfo::default());
        Label(self.labels.len() - 1)
    }

    fn label_info(&mut self, label: Label) -> Result<&mut LabelInfo> {
        let Label(i) = label;
        if i >= self.labels.len() {
            return Err(self.internal(format!("unknown label {}", i)));
        }
        Ok(&mut self.labels[i])
    }

    /// Emit a jump to `label`. Jumps from dead code are dropped.
    pub fn jump(&mut self, op: u8, label: Label) -> Result<()> {
        if !opcodes::is_jump(op) || op == JSR {
            return Err(self.internal(format!("opcode 0x{:02x} is not a jump", op)));
        }
        let (pop, push) = self.fixed_effect(op)?;
        let insn_pc = self.code.len();
        if !self.begin(op) {
            return Ok(());
        }
        self.code.extend_from_slice(&[0, 0]);
        self.adjust(op, pop, push)?;
        let depth = self.depth;
        match self.label_info(label)?.depth {
            Some(expected) if expected != depth => {
                return Err(self.internal(format!(
                    "jump at pc {} reaches label with stack depth {}, expected {}",
                    insn_pc, depth, expected
                )));
            }
            Some(_) => {}
            None => self.label_info(label)?.depth = Some(depth),
        }
        self.fixups.push(Fixup { insn_pc, label });
        self.end(op);
        Ok(())
    }

    pub fn goto(&mut self, label: Label) -> Result<()> {
        self.jump(GOTO, label)
    }

    /// Bind `label` to the current position. Code becomes alive again when
    /// some jump targets the label.
    pub fn mark(&mut self, label: Label) -> Result<()> {
        let pc = self.code.len();
        let alive = self.alive;
        let depth = self.depth;
        let LabelInfo { pc: bound, depth: recorded } = self.label_info(label)?.clone();
        if bound.is_some() {
            return Err(self.internal(format!("label {:?} marked twice", label)));
        }
        self.label_info(label)?.pc = Some(pc);
        match (recorded, alive) {
            (Some(expected), true) if expected != depth => {
                return Err(self.internal(format!(
                    "falling into label at pc {} with stack depth {}, jumps expect {}",
                    pc, depth, expected
                )));
            }
            (Some(expected), false) => {
                self.depth = expected;
                self.alive = true;
            }
            (None, true) => self.label_info(label)?.depth = Some(depth),
            _ => {}
        }
        Ok(())
    }

    /// Resolve jump offsets and produce the finished body.
    pub fn finish(self, max_locals: u16) -> Result<CodeBody> {
        if self.alive {
            return Err(self.internal("control falls off the end of the method"));
        }
        if self.code.is_empty() || self.code.len() > usize::from(u16::MAX) {
            return Err(Error::class_format(format!(
                "method {}.{} has {} bytes of code",
                self.class_name,
                self.method_name,
                self.code.len()
            )));
        }
        let mut code = self.code;
        for fixup in &self.fixups {
            let Label(i) = fixup.label;
            let target = self.labels.get(i).and_then(|l| l.pc).ok_or_else(|| {
                Error::internal(&self.class_name, &self.method_name, format!("jump to unmarked label {}", i))
            })?;
            let offset = target as i64 - fixup.insn_pc as i64;
            let offset = i16::try_from(offset).map_err(|_| {
                Error::class_format(format!(
                    "branch offset {} in {}.{} does not fit 16 bits",
                    offset, self.class_name, self.method_name
                ))
            })?;
            code[fixup.insn_pc + 1..fixup.insn_pc + 3].copy_from_slice(&offset.to_be_bytes());
        }
        Ok(CodeBody {
            code,
            max_stack: self.max_stack,
            max_locals,
            line_numbers: self.lines,
        })
    }
}

/// Offset from the int form of a load/store opcode
fn local_kind(ty: &JvmType) -> u8 {
    match ty {
        JvmType::Long => 1,
        JvmType::Float => 2,
        JvmType::Double => 3,
        JvmType::Class(_) | JvmType::Array(_) => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(pool: &mut ConstantPool) -> Code<'_> {
        Code::new(pool, "demo/T", "m", true)
    }

    #[test]
    fn short_and_wide_local_forms() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        c.load_local(&JvmType::Int, 2).unwrap();
        c.load_local(&JvmType::object(), 7).unwrap();
        c.load_local(&JvmType::Long, 300).unwrap();
        assert_eq!(c.depth(), 4);
        c.emitop(POP2).unwrap();
        c.emitop(POP2).unwrap();
        c.emitop(RETURN).unwrap();
        let body = c.finish(400).unwrap();
        assert_eq!(body.code, vec![ILOAD_2, ALOAD, 7, WIDE, LLOAD, 1, 44, POP2, POP2, RETURN]);
        assert_eq!(body.max_stack, 4);
    }

    #[test]
    fn forward_jump_is_patched() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        let end = c.new_label();
        c.push_int(1).unwrap();
        c.jump(IFEQ, end).unwrap();
        c.mark(end).unwrap();
        c.emitop(RETURN).unwrap();
        let body = c.finish(0).unwrap();
        assert_eq!(body.code, vec![ICONST_1, IFEQ, 0, 3, RETURN]);
    }

    #[test]
    fn dead_code_is_dropped_until_a_target() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        let l = c.new_label();
        c.goto(l).unwrap();
        c.push_int(3).unwrap();
        c.emitop(POP).unwrap();
        c.mark(l).unwrap();
        assert!(c.is_alive());
        c.emitop(RETURN).unwrap();
        let body = c.finish(0).unwrap();
        assert_eq!(body.code, vec![GOTO, 0, 3, RETURN]);
    }

    #[test]
    fn inconsistent_depth_at_label_is_internal() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        let l = c.new_label();
        c.push_int(0).unwrap();
        c.jump(IFEQ, l).unwrap();
        c.push_int(1).unwrap();
        let err = c.mark(l).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("demo/T.m"));
    }

    #[test]
    fn underflow_is_internal() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        assert!(c.emitop(IADD).unwrap_err().is_internal());
    }

    #[test]
    fn falling_off_the_end_is_internal() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        c.emitop(NOP).unwrap();
        assert!(c.finish(0).unwrap_err().is_internal());
    }

    #[test]
    fn invoke_effect_comes_from_descriptor() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        c.emitop(ACONST_NULL).unwrap();
        c.push_long(5).unwrap();
        c.invokevirtual("demo/T", "f", "(J)D").unwrap();
        assert_eq!(c.depth(), 2);
        c.invokestatic("demo/T", "g", "(D)V").unwrap();
        assert_eq!(c.depth(), 0);
    }

    #[test]
    fn line_numbers_follow_instructions() {
        let mut pool = ConstantPool::new();
        let mut c = code(&mut pool);
        c.line(3);
        c.push_int(1).unwrap();
        c.line(3);
        c.emitop(POP).unwrap();
        c.line(4);
        c.emitop(RETURN).unwrap();
        let body = c.finish(0).unwrap();
        assert_eq!(body.line_numbers, vec![(0, 3), (2, 4)]);
    }
}
