//! Static type of an expression as far as strategy selection is concerned.
//!
//! The inferred type recorded by the typing pass wins. Without one, only
//! the shapes whose type is certain are resolved; everything else is
//! `Object`, which selects dynamic dispatch.

use super::controller::MethodGen;
use crate::ast::{Expr, ExprKind, JvmType};

impl<'a, 'p> MethodGen<'a, 'p> {
    pub(crate) fn resolve_type(&self, expr: &Expr) -> JvmType {
        if let ExprKind::ClassRef(_) = expr.kind {
            return JvmType::class_literal();
        }
        if let Some(ty) = expr.meta_type() {
            return ty.clone();
        }
        match &expr.kind {
            ExprKind::Constant(c) => c.ty(),
            ExprKind::Variable(name) => match self.locals.get_variable(name) {
                Some(var) if var.holder => JvmType::object(),
                Some(var) => var.ty.clone(),
                None => self.class.field(name).map(|f| f.ty.clone()).unwrap_or_else(JvmType::object),
            },
            ExprKind::Field { name } => self.class.field(name).map(|f| f.ty.clone()).unwrap_or_else(JvmType::object),
            ExprKind::This if self.is_static_context() => JvmType::class_literal(),
            ExprKind::This => self.this_type(),
            ExprKind::Cast { ty, .. } => ty.clone(),
            ExprKind::Not(_) | ExprKind::InstanceOf { .. } => JvmType::Boolean,
            _ => JvmType::object(),
        }
    }
}
