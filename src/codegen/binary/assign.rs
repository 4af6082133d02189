//! Assignments, compound assignments, `++`/`--` and declarations.
//!
//! An assignment target is resolved once into a [`Place`]. Resolving a
//! subscript evaluates its receiver and index into temporaries, so a
//! compound assignment or increment reads and writes the element without
//! evaluating either expression twice.

use log::trace;

use super::strategy::{self, strategy_for, BinaryStrategy};
use crate::ast::types::operand_conversion_kind;
use crate::ast::{BinaryOp, DeclTarget, Expr, ExprKind, IncDec, JvmType, NodeId, OperandKind};
use crate::codegen::call_site::SiteReceiver;
use crate::codegen::compile_stack::BytecodeVariable;
use crate::codegen::controller::MethodGen;
use crate::codegen::opcodes::*;
use crate::common::error::{Error, Result};
use crate::consts;

enum Place<'e> {
    Local(BytecodeVariable),
    Field {
        name: String,
        ty: JvmType,
        is_static: bool,
    },
    /// Dynamic property
    Property {
        node: NodeId,
        owner: Owner<'e>,
        name: String,
        safe: bool,
    },
    /// `receiver[index]` with both evaluated into temporaries
    Element {
        node: NodeId,
        receiver: u16,
        index: u16,
        native: Option<&'static dyn BinaryStrategy>,
    },
}

/// Receiver of a dynamic property assignment
enum Owner<'e> {
    This,
    /// The class under generation, in a static context
    Class,
    Expr(&'e Expr),
}

impl<'a, 'p> MethodGen<'a, 'p> {
    fn implicit_owner(&self) -> Owner<'static> {
        if self.is_static_context() {
            Owner::Class
        } else {
            Owner::This
        }
    }

    fn load_temporary(&mut self, index: u16) -> Result<()> {
        let var = self
            .locals
            .temporary(index)
            .cloned()
            .ok_or_else(|| self.internal(format!("no temporary in slot {}", index)))?;
        self.stack.load_var(&mut self.code, &var)
    }

    fn field_place(&self, name: &str) -> Option<Place<'static>> {
        self.class.field(name).map(|f| Place::Field { name: f.name.clone(), ty: f.ty.clone(), is_static: f.is_static })
    }

    fn resolve_place<'e>(&mut self, target: &'e Expr) -> Result<Place<'e>> {
        match &target.kind {
            ExprKind::Variable(name) => {
                if let Some(var) = self.locals.get_variable(name) {
                    return Ok(Place::Local(var.clone()));
                }
                if let Some(place) = self.field_place(name) {
                    return Ok(place);
                }
                Ok(Place::Property { node: target.id, owner: self.implicit_owner(), name: name.clone(), safe: false })
            }
            ExprKind::Field { name } => self
                .field_place(name)
                .ok_or_else(|| Error::semantic(target.pos, format!("no field {} in {}", name, self.class.name))),
            ExprKind::Property { receiver, name, safe } => {
                let owner = match receiver.kind {
                    ExprKind::This => self.implicit_owner(),
                    _ => Owner::Expr(receiver),
                };
                Ok(Place::Property { node: target.id, owner, name: name.clone(), safe: *safe })
            }
            ExprKind::Binary { op: BinaryOp::Index, left, right, .. } => {
                let native = self.native_array_access(left, right);
                let (receiver, index) = match native {
                    Some(_) => {
                        let array = self.resolve_type(left);
                        self.visit_expr(left)?;
                        self.stack.do_groovy_cast(&mut self.code, &array)?;
                        let receiver = self.locals.define_temporary(&mut self.code, &mut self.stack, "$recv", &array, true)?;
                        self.visit_expr(right)?;
                        self.stack.do_groovy_cast(&mut self.code, &JvmType::Int)?;
                        let index =
                            self.locals.define_temporary(&mut self.code, &mut self.stack, "$idx", &JvmType::Int, true)?;
                        self.normalise_index_in_local(receiver, index)?;
                        (receiver, index)
                    }
                    None => {
                        self.visit_boxed(left)?;
                        let receiver = self.locals.define_temporary(
                            &mut self.code,
                            &mut self.stack,
                            "$recv",
                            &JvmType::object(),
                            true,
                        )?;
                        self.visit_boxed(right)?;
                        let index = self.locals.define_temporary(
                            &mut self.code,
                            &mut self.stack,
                            "$idx",
                            &JvmType::object(),
                            true,
                        )?;
                        (receiver, index)
                    }
                };
                Ok(Place::Element { node: target.id, receiver, index, native })
            }
            _ => Err(Error::semantic(target.pos, format!("cannot assign to {}", target))),
        }
    }

    /// `if (idx < 0) idx += recv.length`
    fn normalise_index_in_local(&mut self, receiver: u16, index: u16) -> Result<()> {
        let positive = self.code.new_label();
        self.code.load_local(&JvmType::Int, index)?;
        self.code.jump(IFGE, positive)?;
        self.code.load_local(&JvmType::Int, index)?;
        self.code.load_local(&JvmType::object(), receiver)?;
        self.code.emitop(ARRAYLENGTH)?;
        self.code.emitop(IADD)?;
        self.code.store_local(&JvmType::Int, index)?;
        self.code.mark(positive)
    }

    /// Push the current value of `place`
    fn load_place(&mut self, place: &Place<'_>) -> Result<()> {
        match place {
            Place::Local(var) => self.stack.load_var(&mut self.code, var),
            Place::Field { name, ty, is_static } => {
                if *is_static {
                    self.code.field_insn(GETSTATIC, &self.class.name, name, &ty.descriptor())?;
                } else {
                    self.code.load_local(&JvmType::object(), 0)?;
                    self.code.field_insn(GETFIELD, &self.class.name, name, &ty.descriptor())?;
                }
                self.stack.push(ty.clone());
                Ok(())
            }
            Place::Property { node, owner, name, safe } => match owner {
                Owner::Expr(expr) => self.write_property_get(*node, expr, name, *safe),
                Owner::This => self.make_get_property_site(*node, SiteReceiver::This, name, false, true),
                Owner::Class => {
                    let class = self.this_type();
                    self.make_get_property_site(*node, SiteReceiver::Class(&class), name, false, false)
                }
            },
            Place::Element { node, receiver, index, native } => match native {
                Some(strategy) => {
                    self.load_temporary(*receiver)?;
                    self.load_temporary(*index)?;
                    let element = strategy::emit_array_get(&mut self.code, *strategy)?;
                    self.stack.replace_n(&self.code, element, 2)
                }
                None => {
                    let mark = self.stack.len();
                    self.prepare_call_site(*node, "getAt")?;
                    self.load_temporary(*receiver)?;
                    self.load_temporary(*index)?;
                    self.code.invokeinterface(
                        consts::CALL_SITE,
                        "call",
                        "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
                    )?;
                    let n = self.stack.len() - mark;
                    self.stack.replace_n(&self.code, JvmType::object(), n)
                }
            },
        }
    }

    /// Store the top value into `place`; the value leaves the stack
    fn store_place(&mut self, place: &Place<'_>) -> Result<()> {
        match place {
            Place::Local(var) => self.stack.store_var(&mut self.code, var),
            Place::Field { name, ty, is_static } => {
                self.stack.do_groovy_cast(&mut self.code, ty)?;
                if *is_static {
                    self.code.field_insn(PUTSTATIC, &self.class.name, name, &ty.descriptor())?;
                    return self.stack.remove(&self.code, 1);
                }
                self.code.load_local(&JvmType::object(), 0)?;
                self.stack.push(self.this_type());
                self.stack.swap(&mut self.code)?;
                self.code.field_insn(PUTFIELD, &self.class.name, name, &ty.descriptor())?;
                self.stack.remove(&self.code, 2)
            }
            Place::Property { owner, name, safe, .. } => {
                let mark = self.stack.len() - 1;
                self.stack.box_top(&mut self.code)?;
                let sender = self.this_type();
                self.stack.push_class_literal(&mut self.code, &sender)?;
                let by_object = "(Ljava/lang/Object;Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)V";
                let (method, desc) = match owner {
                    Owner::Expr(expr) => {
                        self.visit_boxed(expr)?;
                        (if *safe { "setPropertySafe" } else { "setProperty" }, by_object)
                    }
                    Owner::Class => {
                        self.stack.push_class_literal(&mut self.code, &sender)?;
                        ("setProperty", by_object)
                    }
                    Owner::This => {
                        self.code.load_local(&JvmType::object(), 0)?;
                        self.stack.push(self.this_type());
                        (
                            "setGroovyObjectProperty",
                            "(Ljava/lang/Object;Ljava/lang/Class;Lgroovy/lang/GroovyObject;Ljava/lang/String;)V",
                        )
                    }
                };
                self.stack.push_dynamic_name(&mut self.code, name)?;
                self.code.invokestatic(consts::SCRIPT_BYTECODE_ADAPTER, method, desc)?;
                let n = self.stack.len() - mark;
                self.stack.remove(&self.code, n)
            }
            Place::Element { node, receiver, index, native } => match native {
                Some(strategy) => {
                    let element = strategy
                        .array_element()
                        .ok_or_else(|| self.internal("primitive array without element type"))?;
                    self.stack.do_groovy_cast(&mut self.code, &element)?;
                    self.load_temporary(*receiver)?;
                    self.load_temporary(*index)?;
                    // value, array, index -> array, index, value
                    if element.width() == 2 {
                        self.code.emitop(DUP2_X2)?;
                    } else {
                        self.code.emitop(DUP2_X1)?;
                    }
                    self.code.emitop(POP2)?;
                    strategy::emit_array_set(&mut self.code, *strategy)?;
                    self.stack.remove(&self.code, 3)
                }
                None => {
                    self.stack.box_top(&mut self.code)?;
                    let value = self.locals.define_temporary(
                        &mut self.code,
                        &mut self.stack,
                        "$value",
                        &JvmType::object(),
                        true,
                    )?;
                    let mark = self.stack.len();
                    self.prepare_call_site(*node, "putAt")?;
                    self.load_temporary(*receiver)?;
                    self.load_temporary(*index)?;
                    self.load_temporary(value)?;
                    self.code.invokeinterface(
                        consts::CALL_SITE,
                        "call",
                        "(Ljava/lang/Object;Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
                    )?;
                    let n = self.stack.len() - mark;
                    self.stack.replace_n(&self.code, JvmType::object(), n)?;
                    self.stack.pop(&mut self.code)?;
                    self.locals.remove_var(&self.code, value)
                }
            },
        }
    }

    fn release_place(&mut self, place: Place<'_>) -> Result<()> {
        if let Place::Element { receiver, index, .. } = place {
            self.locals.remove_var(&self.code, index)?;
            self.locals.remove_var(&self.code, receiver)?;
        }
        Ok(())
    }

    /// Static type of what `load_place` pushes
    fn place_type(&self, place: &Place<'_>) -> JvmType {
        match place {
            Place::Local(var) => var.ty.clone(),
            Place::Field { ty, .. } => ty.clone(),
            Place::Element { native: Some(strategy), .. } => strategy.array_element().unwrap_or_else(JvmType::object),
            _ => JvmType::object(),
        }
    }

    /// `target = value` or `target op= value`; leaves the assigned value
    pub(crate) fn write_assignment(
        &mut self,
        expr: &Expr,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
    ) -> Result<()> {
        match op {
            None => self.write_plain_assignment(target, value),
            Some(op) => self.write_compound_assignment(expr.id, op, target, value),
        }
    }

    fn write_plain_assignment(&mut self, target: &Expr, value: &Expr) -> Result<()> {
        if let ExprKind::Variable(name) = &target.kind {
            if let Some(var) = self.locals.get_variable(name).cloned() {
                self.visit_expr(value)?;
                self.stack.dup(&mut self.code)?;
                return self.stack.store_var(&mut self.code, &var);
            }
        }

        // the right-hand side is evaluated before any part of the target
        self.visit_expr(value)?;
        let value_ty = self
            .stack
            .top()
            .cloned()
            .ok_or_else(|| self.internal("assignment value missing"))?;
        let rhs = self.locals.define_temporary(&mut self.code, &mut self.stack, "$rhs", &value_ty, true)?;
        let place = self.resolve_place(target)?;
        self.load_temporary(rhs)?;
        self.store_place(&place)?;
        self.release_place(place)?;
        self.load_temporary(rhs)?;
        self.locals.remove_var(&self.code, rhs)
    }

    fn write_compound_assignment(&mut self, id: NodeId, op: BinaryOp, target: &Expr, value: &Expr) -> Result<()> {
        if let ExprKind::Binary { op: BinaryOp::Index, left, right, safe: false } = &target.kind {
            if let Some(strategy) = self.native_array_access(left, right) {
                let element = strategy.array_element().unwrap_or_else(JvmType::object);
                let value_ty = self.resolve_type(value);
                let op_strategy = strategy_for(operand_conversion_kind(&element, &value_ty));
                if op_strategy.simulate(op) && !op.is_comparison() {
                    return self.write_primitive_array_op_assign(op, op_strategy, strategy, left, right, value);
                }
            }
        }

        let place = self.resolve_place(target)?;
        let current = self.place_type(&place);
        self.load_place(&place)?;
        self.write_binary_on_stacked(id, op, &current, value)?;
        self.stack.dup(&mut self.code)?;
        self.store_place(&place)?;
        self.release_place(place)
    }

    /// `array[index] op= value` on a primitive array, with the element read
    /// and written natively
    fn write_primitive_array_op_assign(
        &mut self,
        op: BinaryOp,
        op_strategy: &'static dyn BinaryStrategy,
        array_strategy: &'static dyn BinaryStrategy,
        array: &Expr,
        index: &Expr,
        value: &Expr,
    ) -> Result<()> {
        trace!("native {}= on {}", op.symbol(), self.resolve_type(array));
        let array_ty = self.resolve_type(array);
        let element = array_strategy
            .array_element()
            .ok_or_else(|| self.internal("primitive array without element type"))?;
        let operand = op_strategy.operand_type();

        self.visit_expr(index)?;
        self.stack.do_groovy_cast(&mut self.code, &JvmType::Int)?;
        let sub = self.locals.define_temporary(&mut self.code, &mut self.stack, "$sub", &JvmType::Int, true)?;

        self.visit_expr(array)?;
        self.stack.do_groovy_cast(&mut self.code, &array_ty)?;
        self.stack.dup(&mut self.code)?;
        self.load_temporary(sub)?;
        self.normalise_index_on_stack()?;
        self.stack.dup(&mut self.code)?;
        let sub_var = self
            .locals
            .temporary(sub)
            .cloned()
            .ok_or_else(|| self.internal("index temporary vanished"))?;
        self.stack.store_var(&mut self.code, &sub_var)?;
        strategy::emit_array_get(&mut self.code, array_strategy)?;
        self.stack.replace_n(&self.code, element.clone(), 2)?;

        self.stack.do_groovy_cast(&mut self.code, &operand)?;
        self.visit_expr(value)?;
        let right_operand = if op.is_shift() { JvmType::Int } else { operand };
        self.stack.do_groovy_cast(&mut self.code, &right_operand)?;
        op_strategy.emit(&mut self.code, op)?;
        self.stack.replace_n(&self.code, op_strategy.result_type(op), 2)?;
        self.stack.do_groovy_cast(&mut self.code, &element)?;

        self.stack.dup(&mut self.code)?;
        let result = self.locals.define_temporary(&mut self.code, &mut self.stack, "$result", &element, true)?;
        self.load_temporary(sub)?;
        self.stack.swap(&mut self.code)?;
        strategy::emit_array_set(&mut self.code, array_strategy)?;
        self.stack.remove(&self.code, 3)?;

        self.load_temporary(result)?;
        self.locals.remove_var(&self.code, result)?;
        self.locals.remove_var(&self.code, sub)
    }

    /// `++x`, `x--` and friends. The value of a postfix expression is the
    /// one read before the update.
    pub(crate) fn write_inc_dec(&mut self, id: NodeId, op: IncDec, operand: &Expr, postfix: bool) -> Result<()> {
        let place = self.resolve_place(operand)?;
        let current = self.place_type(&place);
        self.load_place(&place)?;

        let old = if postfix {
            self.stack.dup(&mut self.code)?;
            Some(self.locals.define_temporary(&mut self.code, &mut self.stack, "$postfix", &current, true)?)
        } else {
            None
        };

        self.write_next_value(id, op, &current)?;

        match old {
            Some(old) => {
                self.store_place(&place)?;
                self.load_temporary(old)?;
                self.locals.remove_var(&self.code, old)?;
            }
            None => {
                self.stack.dup(&mut self.code)?;
                self.store_place(&place)?;
            }
        }
        self.release_place(place)
    }

    fn write_next_value(&mut self, id: NodeId, op: IncDec, current: &JvmType) -> Result<()> {
        if self.use_primitive_optimizations() && current.is_primitive() {
            let strategy = strategy_for(OperandKind::of(current));
            if strategy.supports_inc_dec() {
                strategy.emit_inc_dec(&mut self.code, op)?;
                return self.stack.replace(&self.code, current.clone());
            }
        }
        self.make_call_on_stacked(id, op.message(), None)
    }

    /// Local variable declaration. With `keep_value` the declared value is
    /// left on the stack.
    pub(crate) fn write_declaration(
        &mut self,
        expr: &Expr,
        target: &DeclTarget,
        value: Option<&Expr>,
        keep_value: bool,
    ) -> Result<()> {
        match target {
            DeclTarget::Single { name, ty, holder } => {
                let var = match value {
                    Some(value) => {
                        self.visit_expr(value)?;
                        if value.is_null_constant() && ty.is_reference() {
                            self.stack.replace(&self.code, ty.clone())?;
                        }
                        self.locals.define_variable(&mut self.code, &mut self.stack, name, ty, *holder, true)?
                    }
                    None => self.locals.define_variable(&mut self.code, &mut self.stack, name, ty, *holder, false)?,
                };
                if keep_value {
                    self.stack.load_var(&mut self.code, &var)?;
                }
                Ok(())
            }
            DeclTarget::Tuple(names) => {
                let value = value.ok_or_else(|| Error::semantic(expr.pos, "multiple assignment needs a value"))?;
                self.visit_boxed(value)?;
                let tuple =
                    self.locals
                        .define_temporary(&mut self.code, &mut self.stack, "$tuple", &JvmType::object(), true)?;
                for (i, (name, ty)) in names.iter().enumerate() {
                    let mark = self.stack.len();
                    self.prepare_call_site(expr.id, "getAt")?;
                    self.load_temporary(tuple)?;
                    self.code.push_int(i as i32)?;
                    self.stack.push(JvmType::Int);
                    self.stack.box_top(&mut self.code)?;
                    self.code.invokeinterface(
                        consts::CALL_SITE,
                        "call",
                        "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
                    )?;
                    let n = self.stack.len() - mark;
                    self.stack.replace_n(&self.code, JvmType::object(), n)?;
                    self.locals.define_variable(&mut self.code, &mut self.stack, name, ty, false, true)?;
                }
                if keep_value {
                    self.load_temporary(tuple)?;
                }
                self.locals.remove_var(&self.code, tuple)
            }
        }
    }

    /// Direct read of a field of the class under generation
    pub(crate) fn write_field_get(&mut self, expr: &Expr, name: &str) -> Result<()> {
        let place = self
            .field_place(name)
            .ok_or_else(|| Error::semantic(expr.pos, format!("no field {} in {}", name, self.class.name)))?;
        if let Place::Field { is_static: false, .. } = place {
            if self.is_static_context() {
                return Err(Error::semantic(expr.pos, format!("instance field {} used in a static context", name)));
            }
        }
        self.load_place(&place)
    }
}
