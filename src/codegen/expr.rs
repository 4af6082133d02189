//! Expression visitor. Every expression leaves exactly one tracked value on
//! the operand stack.

use super::call_site::SiteReceiver;
use super::controller::MethodGen;
use super::opcodes::*;
use crate::ast::{Expr, ExprKind, JvmType, NodeId};
use crate::common::error::{Error, Result};

impl<'a, 'p> MethodGen<'a, 'p> {
    pub(crate) fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Constant(constant) => self.stack.push_constant(&mut self.code, constant),
            ExprKind::Variable(name) => self.write_variable(expr, name),
            ExprKind::This => {
                if self.is_static_context() {
                    let class = self.this_type();
                    self.stack.push_class_literal(&mut self.code, &class)
                } else {
                    self.code.load_local(&JvmType::object(), 0)?;
                    self.stack.push(self.this_type());
                    Ok(())
                }
            }
            ExprKind::Super => {
                if self.is_static_context() {
                    return Err(Error::semantic(expr.pos, "super used in a static context"));
                }
                self.code.load_local(&JvmType::object(), 0)?;
                self.stack.push(JvmType::class(self.class.super_class.clone()));
                Ok(())
            }
            ExprKind::ClassRef(ty) => self.stack.push_class_literal(&mut self.code, ty),
            ExprKind::Field { name } => self.write_field_get(expr, name),
            ExprKind::Property { receiver, name, safe } => self.write_property_get(expr.id, receiver, name, *safe),
            ExprKind::Binary { op, left, right, safe } => self.write_binary(expr.id, *op, left, right, *safe),
            ExprKind::Assign { target, op, value } => self.write_assignment(expr, target, *op, value),
            ExprKind::Declaration { target, value } => self.write_declaration(expr, target, value.as_deref(), true),
            ExprKind::Prefix { op, operand } => self.write_inc_dec(expr.id, *op, operand, false),
            ExprKind::Postfix { op, operand } => self.write_inc_dec(expr.id, *op, operand, true),
            ExprKind::Not(operand) => self.write_not(operand),
            ExprKind::UnaryMinus(operand) => self.write_unary_dynamic("unaryMinus", operand),
            ExprKind::BitwiseNegate(operand) => self.write_unary_dynamic("bitwiseNegate", operand),
            ExprKind::MethodCall { .. } => self.write_method_call(expr),
            ExprKind::StaticCall { .. } => self.write_static_call(expr),
            ExprKind::ConstructorCall { .. } => self.write_constructor_call(expr),
            ExprKind::Cast { ty, expr: inner, coerce } => {
                self.visit_expr(inner)?;
                if *coerce {
                    self.stack.as_type(&mut self.code, ty)
                } else if inner.is_null_constant() && ty.is_reference() {
                    self.stack.replace(&self.code, ty.clone())
                } else {
                    self.stack.do_groovy_cast(&mut self.code, ty)
                }
            }
            ExprKind::InstanceOf { expr: inner, ty } => {
                self.visit_boxed(inner)?;
                self.code.type_insn(INSTANCEOF, &ty.wrapper().internal_name())?;
                self.stack.replace(&self.code, JvmType::Boolean)
            }
            ExprKind::Ternary { cond, then, otherwise } => self.write_ternary(cond, then, otherwise),
            ExprKind::Spread(_) => Err(Error::semantic(expr.pos, "spread is only allowed in argument lists")),
        }
    }

    /// Evaluate for side effects only; nothing is left on the stack
    pub(crate) fn visit_expr_for_effect(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Declaration { target, value } => self.write_declaration(expr, target, value.as_deref(), false),
            _ => {
                self.visit_expr(expr)?;
                self.stack.pop(&mut self.code)
            }
        }
    }

    /// A bare name: local, then field of this class, then dynamic property
    /// of `this` (or of the class in a static context)
    fn write_variable(&mut self, expr: &Expr, name: &str) -> Result<()> {
        if let Some(var) = self.locals.get_variable(name).cloned() {
            return self.stack.load_var(&mut self.code, &var);
        }
        if self.class.field(name).is_some() {
            return self.write_field_get(expr, name);
        }
        if self.is_static_context() {
            let class = self.this_type();
            self.make_get_property_site(expr.id, SiteReceiver::Class(&class), name, false, false)
        } else {
            self.make_get_property_site(expr.id, SiteReceiver::This, name, false, true)
        }
    }

    pub(crate) fn write_property_get(&mut self, id: NodeId, receiver: &Expr, name: &str, safe: bool) -> Result<()> {
        match &receiver.kind {
            ExprKind::This if !self.is_static_context() => {
                self.make_get_property_site(id, SiteReceiver::This, name, safe, true)
            }
            ExprKind::This => {
                let class = self.this_type();
                self.make_get_property_site(id, SiteReceiver::Class(&class), name, safe, false)
            }
            _ => self.make_get_property_site(id, SiteReceiver::Expr(receiver), name, safe, false),
        }
    }

    /// `cond ? then : otherwise`; both arms are boxed so they agree on the
    /// result type
    fn write_ternary(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Result<()> {
        let mark = self.stack.len();
        self.visit_expr(cond)?;
        self.stack.cast_to_bool(&mut self.code, mark, true)?;
        let else_label = self.code.new_label();
        let end = self.code.new_label();
        self.code.jump(IFEQ, else_label)?;
        self.stack.remove(&self.code, 1)?;

        self.visit_boxed(then)?;
        self.code.goto(end)?;
        self.stack.remove(&self.code, 1)?;

        self.code.mark(else_label)?;
        self.visit_boxed(otherwise)?;
        self.code.mark(end)?;
        self.stack.replace(&self.code, JvmType::object())
    }
}
