//! Binary and unary operator lowering.
//!
//! On the fast path the operand types select a [`BinaryStrategy`]; when it
//! supports the operator, both operands are converted to its operand type
//! and a native instruction sequence is emitted. Anything else is
//! dispatched dynamically: arithmetic through a call site named after the
//! operator, comparisons through `ScriptBytecodeAdapter.compareXxx`.

mod assign;
pub mod strategy;

use log::trace;

pub use strategy::{array_strategy, strategy_for, BinaryStrategy};

use super::controller::MethodGen;
use super::opcodes::*;
use crate::ast::types::{is_int_category, operand_conversion_kind};
use crate::ast::{BinaryOp, Expr, JvmType, NodeId};
use crate::common::error::Result;
use crate::consts;

fn compare_method(op: BinaryOp) -> Option<&'static str> {
    Some(match op {
        BinaryOp::Equal => "compareEqual",
        BinaryOp::NotEqual => "compareNotEqual",
        BinaryOp::Identical => "compareIdentical",
        BinaryOp::NotIdentical => "compareNotIdentical",
        BinaryOp::LessThan => "compareLessThan",
        BinaryOp::LessThanEqual => "compareLessThanEqual",
        BinaryOp::GreaterThan => "compareGreaterThan",
        BinaryOp::GreaterThanEqual => "compareGreaterThanEqual",
        _ => return None,
    })
}

impl<'a, 'p> MethodGen<'a, 'p> {
    /// `left op right`; `id` keys the fallback call site
    pub(crate) fn write_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        safe: bool,
    ) -> Result<()> {
        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => self.write_logical(op, left, right),
            BinaryOp::Index => self.write_subscript_get(id, left, right, safe),
            _ if op.is_comparison() || op == BinaryOp::CompareTo => {
                if self.try_primitive_binary(op, left, right)? {
                    return Ok(());
                }
                self.write_dynamic_comparison(op, left, right)
            }
            _ => {
                if self.try_primitive_binary(op, left, right)? {
                    return Ok(());
                }
                let message = op
                    .message()
                    .ok_or_else(|| self.internal(format!("no dispatch message for {}", op.symbol())))?;
                self.make_single_argument_call(id, left, message, right, safe)
            }
        }
    }

    /// Native lowering when both operand types allow it. Returns false,
    /// having emitted nothing, when the operator must stay dynamic.
    fn try_primitive_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<bool> {
        if !self.use_primitive_optimizations() {
            return Ok(false);
        }
        let left_ty = self.resolve_type(left);
        let right_ty = self.resolve_type(right);
        let strategy = strategy_for(operand_conversion_kind(&left_ty, &right_ty));
        if !strategy.simulate(op) {
            trace!("{} {} {} stays dynamic", left_ty, op.symbol(), right_ty);
            return Ok(false);
        }

        let operand = strategy.operand_type();
        self.visit_expr(left)?;
        self.stack.do_groovy_cast(&mut self.code, &operand)?;
        self.visit_expr(right)?;
        let right_operand = if op.is_shift() { JvmType::Int } else { operand };
        self.stack.do_groovy_cast(&mut self.code, &right_operand)?;
        strategy.emit(&mut self.code, op)?;
        self.stack.replace_n(&self.code, strategy.result_type(op), 2)?;
        Ok(true)
    }

    /// Apply `op` to the value on top of the stack and `right`, leaving the
    /// result. Used by compound assignment once the target is loaded.
    pub(crate) fn write_binary_on_stacked(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        left_ty: &JvmType,
        right: &Expr,
    ) -> Result<()> {
        if self.use_primitive_optimizations() {
            let right_ty = self.resolve_type(right);
            let strategy = strategy_for(operand_conversion_kind(left_ty, &right_ty));
            if strategy.simulate(op) && !op.is_comparison() {
                let operand = strategy.operand_type();
                self.stack.do_groovy_cast(&mut self.code, &operand)?;
                self.visit_expr(right)?;
                let right_operand = if op.is_shift() { JvmType::Int } else { operand };
                self.stack.do_groovy_cast(&mut self.code, &right_operand)?;
                strategy.emit(&mut self.code, op)?;
                return self.stack.replace_n(&self.code, strategy.result_type(op), 2);
            }
        }
        let message = op
            .message()
            .ok_or_else(|| self.internal(format!("{} cannot be a compound assignment", op.symbol())))?;
        self.make_call_on_stacked(id, message, Some(right))
    }

    fn write_dynamic_comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<()> {
        let mark = self.stack.len();
        self.visit_boxed(left)?;
        self.visit_boxed(right)?;
        let result = match compare_method(op) {
            Some(method) => {
                self.code.invokestatic(
                    consts::SCRIPT_BYTECODE_ADAPTER,
                    method,
                    "(Ljava/lang/Object;Ljava/lang/Object;)Z",
                )?;
                JvmType::Boolean
            }
            None => {
                self.code.invokestatic(
                    consts::SCRIPT_BYTECODE_ADAPTER,
                    "compareTo",
                    "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Integer;",
                )?;
                JvmType::Int.wrapper()
            }
        };
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, result, n)
    }

    /// Short-circuit `&&` and `||` on Groovy truth
    fn write_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<()> {
        let and = op == BinaryOp::LogicalAnd;
        let branch = if and { IFEQ } else { IFNE };
        let short = self.code.new_label();
        let end = self.code.new_label();

        for operand in [left, right] {
            let mark = self.stack.len();
            self.visit_expr(operand)?;
            self.stack.cast_to_bool(&mut self.code, mark, true)?;
            self.code.jump(branch, short)?;
            self.stack.remove(&self.code, 1)?;
        }
        self.code.push_int(i32::from(and))?;
        self.code.goto(end)?;
        self.code.mark(short)?;
        self.code.push_int(i32::from(!and))?;
        self.code.mark(end)?;
        self.stack.push(JvmType::Boolean);
        Ok(())
    }

    /// Native element access applies on the fast path to primitive arrays
    /// indexed by an int-category value
    pub(crate) fn native_array_access(&self, receiver: &Expr, index: &Expr) -> Option<&'static dyn BinaryStrategy> {
        if !self.use_primitive_optimizations() {
            return None;
        }
        if !is_int_category(&self.resolve_type(index)) {
            return None;
        }
        array_strategy(&self.resolve_type(receiver))
    }

    /// `receiver[index]`
    fn write_subscript_get(&mut self, id: NodeId, receiver: &Expr, index: &Expr, safe: bool) -> Result<()> {
        match self.native_array_access(receiver, index).filter(|_| !safe) {
            Some(strategy) => {
                let array = self.resolve_type(receiver);
                self.visit_expr(receiver)?;
                self.stack.do_groovy_cast(&mut self.code, &array)?;
                self.visit_expr(index)?;
                self.stack.do_groovy_cast(&mut self.code, &JvmType::Int)?;
                self.normalise_index_on_stack()?;
                let element = strategy::emit_array_get(&mut self.code, strategy)?;
                self.stack.replace_n(&self.code, element, 2)
            }
            None => self.make_single_argument_call(id, receiver, "getAt", index, safe),
        }
    }

    /// With `array, index` on top, turn a negative index into
    /// `index + array.length`
    pub(crate) fn normalise_index_on_stack(&mut self) -> Result<()> {
        let positive = self.code.new_label();
        self.code.emitop(DUP)?;
        self.code.jump(IFGE, positive)?;
        self.code.emitop(SWAP)?;
        self.code.emitop(DUP_X1)?;
        self.code.emitop(ARRAYLENGTH)?;
        self.code.emitop(IADD)?;
        self.code.mark(positive)
    }

    /// `!operand`
    pub(crate) fn write_not(&mut self, operand: &Expr) -> Result<()> {
        let mark = self.stack.len();
        self.visit_expr(operand)?;
        self.stack.cast_to_bool(&mut self.code, mark, true)?;
        let was_false = self.code.new_label();
        let end = self.code.new_label();
        self.code.jump(IFEQ, was_false)?;
        self.stack.remove(&self.code, 1)?;
        self.code.emitop(ICONST_0)?;
        self.code.goto(end)?;
        self.code.mark(was_false)?;
        self.code.emitop(ICONST_1)?;
        self.code.mark(end)?;
        self.stack.push(JvmType::Boolean);
        Ok(())
    }

    /// `-operand` and `~operand`, always dynamic
    pub(crate) fn write_unary_dynamic(&mut self, method: &str, operand: &Expr) -> Result<()> {
        self.visit_boxed(operand)?;
        self.code.invokestatic(
            consts::SCRIPT_BYTECODE_ADAPTER,
            method,
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        )?;
        self.stack.replace(&self.code, JvmType::object())
    }
}
