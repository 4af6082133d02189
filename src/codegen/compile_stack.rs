//! Local variable slots and lexical scopes for one method body.
//!
//! Slots are handed out from a single counter. A scope remembers the counter
//! and the visible names on entry and restores both on exit, so sibling
//! scopes reuse the same indices. Captured variables live in a
//! `groovy/lang/Reference` cell stored in a single slot.

use std::collections::HashMap;

use super::bytecode_helper as helper;
use super::code::{Code, Label};
use super::opcodes::*;
use super::operand_stack::OperandStack;
use crate::ast::{JvmType, Parameter};
use crate::common::error::Result;
use crate::consts;

#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeVariable {
    pub name: String,
    pub ty: JvmType,
    pub index: u16,
    /// The slot holds a `Reference` cell instead of the value
    pub holder: bool,
}

impl BytecodeVariable {
    fn slots(&self) -> u16 {
        if self.holder {
            1
        } else {
            self.ty.width()
        }
    }
}

#[derive(Debug)]
struct ScopeState {
    variables: HashMap<String, BytecodeVariable>,
    next_index: u16,
    temporaries: usize,
}

#[derive(Debug, Default)]
pub struct CompileStack {
    variables: HashMap<String, BytecodeVariable>,
    scopes: Vec<ScopeState>,
    temporaries: Vec<BytecodeVariable>,
    next_index: u16,
    max_locals: u16,
    loops: Vec<(Label, Label)>,
}

impl CompileStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the parameters of a method. Slot 0 is `this` for instance
    /// methods. A captured parameter is moved into a fresh `Reference` cell
    /// allocated after the last parameter slot.
    pub fn init_method(
        &mut self,
        code: &mut Code,
        stack: &mut OperandStack,
        params: &[Parameter],
        is_static: bool,
    ) -> Result<()> {
        *self = Self::default();
        let first = if is_static { 0 } else { 1 };
        let mut slot = first;
        let mut holder_slot = first + params.iter().map(|p| p.ty.width()).sum::<u16>();
        self.bump(holder_slot);

        for param in params {
            let var = if param.holder {
                let var = BytecodeVariable {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    index: holder_slot,
                    holder: true,
                };
                holder_slot += 1;
                self.bump(holder_slot);
                code.load_local(&param.ty, slot)?;
                stack.push(param.ty.clone());
                stack.box_top(code)?;
                create_reference(code, stack, &var)?;
                var
            } else {
                BytecodeVariable { name: param.name.clone(), ty: param.ty.clone(), index: slot, holder: false }
            };
            slot += param.ty.width();
            self.variables.insert(param.name.clone(), var);
        }
        self.next_index = holder_slot;
        Ok(())
    }

    fn bump(&mut self, next: u16) {
        self.next_index = next;
        self.max_locals = self.max_locals.max(next);
    }

    fn allocate(&mut self, name: &str, ty: &JvmType, holder: bool) -> BytecodeVariable {
        let var = BytecodeVariable { name: name.to_string(), ty: ty.clone(), index: self.next_index, holder };
        self.bump(self.next_index + var.slots());
        var
    }

    /// Define a named local. With `init_from_stack` the tracked top value is
    /// converted and stored; otherwise the default value of `ty` is stored so
    /// the slot is definitely assigned on every path.
    pub fn define_variable(
        &mut self,
        code: &mut Code,
        stack: &mut OperandStack,
        name: &str,
        ty: &JvmType,
        holder: bool,
        init_from_stack: bool,
    ) -> Result<BytecodeVariable> {
        let var = self.allocate(name, ty, holder);
        if !init_from_stack {
            helper::push_default(code, ty)?;
            stack.push(ty.clone());
        }
        if holder {
            stack.do_groovy_cast(code, ty)?;
            stack.box_top(code)?;
            create_reference(code, stack, &var)?;
        } else {
            stack.store_var(code, &var)?;
        }
        self.variables.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Allocate a scratch slot, optionally storing the top value into it.
    /// Returns the slot index.
    pub fn define_temporary(
        &mut self,
        code: &mut Code,
        stack: &mut OperandStack,
        name: &str,
        ty: &JvmType,
        store: bool,
    ) -> Result<u16> {
        let var = self.allocate(name, ty, false);
        if store {
            stack.store_var(code, &var)?;
        }
        let index = var.index;
        self.temporaries.push(var);
        Ok(index)
    }

    pub fn temporary(&self, index: u16) -> Option<&BytecodeVariable> {
        self.temporaries.iter().rev().find(|v| v.index == index)
    }

    /// Release the most recent temporary; temporaries are released in
    /// reverse order of definition.
    pub fn remove_var(&mut self, code: &Code, index: u16) -> Result<()> {
        match self.temporaries.last() {
            Some(last) if last.index == index => {}
            other => {
                return Err(code.internal(format!(
                    "temporary {} released out of order (most recent is {:?})",
                    index,
                    other.map(|v| v.index)
                )))
            }
        }
        if let Some(var) = self.temporaries.pop() {
            if var.index + var.slots() == self.next_index {
                self.next_index = var.index;
            }
        }
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> Option<&BytecodeVariable> {
        self.variables.get(name)
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(ScopeState {
            variables: self.variables.clone(),
            next_index: self.next_index,
            temporaries: self.temporaries.len(),
        });
    }

    pub fn pop_scope(&mut self, code: &Code) -> Result<()> {
        let state = self.scopes.pop().ok_or_else(|| code.internal("scope stack underflow"))?;
        self.variables = state.variables;
        self.next_index = state.next_index;
        self.temporaries.truncate(state.temporaries);
        Ok(())
    }

    pub fn push_loop(&mut self, continue_label: Label, break_label: Label) {
        self.loops.push((continue_label, break_label));
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub fn break_label(&self) -> Option<Label> {
        self.loops.last().map(|(_, b)| *b)
    }

    pub fn continue_label(&self) -> Option<Label> {
        self.loops.last().map(|(c, _)| *c)
    }

    /// Highest slot count used so far
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }
}

/// Wrap the boxed value on top of the stack in a new `Reference` stored in
/// `var`'s slot.
fn create_reference(code: &mut Code, stack: &mut OperandStack, var: &BytecodeVariable) -> Result<()> {
    code.type_insn(NEW, consts::REFERENCE)?;
    code.emitop(DUP_X1)?;
    code.emitop(SWAP)?;
    code.invokespecial(consts::REFERENCE, "<init>", "(Ljava/lang/Object;)V")?;
    code.store_local(&JvmType::object(), var.index)?;
    stack.remove(code, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::ConstantPool;

    #[test]
    fn parameters_follow_this_and_wide_types() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut stack = OperandStack::new();
        let mut locals = CompileStack::new();
        let params = vec![
            Parameter::new("a", JvmType::Long),
            Parameter::new("b", JvmType::Int),
        ];
        locals.init_method(&mut code, &mut stack, &params, false).unwrap();
        assert_eq!(locals.get_variable("a").unwrap().index, 1);
        assert_eq!(locals.get_variable("b").unwrap().index, 3);
        assert_eq!(locals.max_locals(), 4);
    }

    #[test]
    fn captured_parameter_moves_into_reference() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut stack = OperandStack::new();
        let mut locals = CompileStack::new();
        let mut p = Parameter::new("x", JvmType::Double);
        p.holder = true;
        locals.init_method(&mut code, &mut stack, &[p], true).unwrap();
        let var = locals.get_variable("x").unwrap();
        assert!(var.holder);
        assert_eq!(var.index, 2);
        assert!(stack.is_empty());
        assert_eq!(code.depth(), 0);
    }

    #[test]
    fn sibling_scopes_reuse_slots() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut stack = OperandStack::new();
        let mut locals = CompileStack::new();
        locals.init_method(&mut code, &mut stack, &[], true).unwrap();

        locals.push_scope();
        let a = locals.define_variable(&mut code, &mut stack, "a", &JvmType::Long, false, false).unwrap();
        locals.pop_scope(&code).unwrap();
        assert!(!locals.contains_variable("a"));

        locals.push_scope();
        let b = locals.define_variable(&mut code, &mut stack, "b", &JvmType::Int, false, false).unwrap();
        locals.pop_scope(&code).unwrap();

        assert_eq!(a.index, b.index);
        assert_eq!(locals.max_locals(), 2);
        assert_eq!(code.depth(), 0);
    }

    #[test]
    fn temporaries_release_in_order() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut stack = OperandStack::new();
        let mut locals = CompileStack::new();
        let first = locals.define_temporary(&mut code, &mut stack, "t1", &JvmType::object(), false).unwrap();
        let second = locals.define_temporary(&mut code, &mut stack, "t2", &JvmType::Int, false).unwrap();
        assert!(locals.remove_var(&code, first).unwrap_err().is_internal());
        locals.remove_var(&code, second).unwrap();
        locals.remove_var(&code, first).unwrap();
        let again = locals.define_temporary(&mut code, &mut stack, "t3", &JvmType::Int, false).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn loops_nest() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        let mut locals = CompileStack::new();
        assert!(locals.break_label().is_none());
        let (outer_continue, outer_break) = (code.new_label(), code.new_label());
        let (inner_continue, inner_break) = (code.new_label(), code.new_label());
        locals.push_loop(outer_continue, outer_break);
        locals.push_loop(inner_continue, inner_break);
        assert_eq!(locals.break_label(), Some(inner_break));
        locals.pop_loop();
        assert_eq!(locals.continue_label(), Some(outer_continue));
    }
}
