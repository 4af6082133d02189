//! Opt phase - optimizable region annotation
//!
//! Walks each method body bottom-up and attaches [`NodeMeta`] to the nodes
//! the generator may duplicate into a guarded primitive fast path:
//! - binary operations whose operand categories have a primitive result
//! - typed prefix/postfix operations and primitive declarations
//! - calls on the current class resolved to a declared method
//! - statements whose expressions should be optimized, and blocks in which
//!   every statement can be
//!
//! Each statement pushes a flags entry; "can" and "should" bits and the
//! involved primitive kinds propagate to the enclosing entry on pop.

use std::collections::HashMap;

use log::debug;

use crate::ast::types::{is_big_dec_category, is_double_category, is_int_category, is_long_category};
use crate::ast::{BinaryOp, ClassNode, DeclTarget, Expr, ExprKind, InvolvedTypes, JvmType, MethodNode, NodeMeta, Stmt, StmtKind};
use crate::consts;

/// Optimization flags of one statement level
#[derive(Debug, Clone, Copy, Default)]
struct FlagsEntry {
    can_optimize: bool,
    should_optimize: bool,
    involved: InvolvedTypes,
}

#[derive(Debug, Default)]
struct FlagsCollector {
    current: FlagsEntry,
    older: Vec<FlagsEntry>,
}

impl FlagsCollector {
    fn push(&mut self) {
        let old = std::mem::take(&mut self.current);
        self.older.push(old);
    }

    fn pop(&mut self, propagate: bool) {
        let inner = self.current;
        self.current = self.older.pop().unwrap_or_default();
        if propagate {
            self.chain_can_optimize(inner.can_optimize);
            self.chain_should_optimize(inner.should_optimize);
            self.current.involved.union(inner.involved);
        }
    }

    fn should_optimize(&self) -> bool {
        self.current.should_optimize
    }

    /// "Should" implies "can"
    fn can_optimize(&self) -> bool {
        self.current.can_optimize || self.current.should_optimize
    }

    fn chain_should_optimize(&mut self, opt: bool) {
        self.current.should_optimize |= opt;
    }

    fn chain_can_optimize(&mut self, opt: bool) {
        self.current.can_optimize |= opt;
    }

    fn chain_involved_type(&mut self, ty: &JvmType) {
        if ty.is_primitive() {
            self.current.involved.insert_type(ty);
        }
    }

    fn reset(&mut self) {
        self.current = FlagsEntry::default();
        self.older.clear();
    }
}

fn add_meta(meta: &mut Option<NodeMeta>) -> &mut NodeMeta {
    let meta = meta.get_or_insert_with(NodeMeta::default);
    meta.optimize = true;
    meta
}

/// Direct calls are only taken for argument types whose meta class cannot
/// differ between call sites: primitives and final library classes
fn valid_type_for_call(ty: &JvmType) -> bool {
    if ty.is_primitive() {
        return true;
    }
    ty.is_wrapper() || *ty == JvmType::string()
}

/// Opt phase processor
pub struct Opt<'c> {
    class: &'c ClassNode,
    flags: FlagsCollector,
    scopes: Vec<HashMap<String, JvmType>>,
    static_context: bool,
    optimize_method_calls: bool,
}

impl<'c> Opt<'c> {
    pub fn new(class: &'c ClassNode) -> Self {
        Self {
            class,
            flags: FlagsCollector::default(),
            scopes: Vec::new(),
            static_context: false,
            // intercepted classes must see every call
            optimize_method_calls: !class.interfaces.iter().any(|i| i == consts::GROOVY_INTERCEPTABLE),
        }
    }

    /// Annotate one method body in place
    pub fn annotate_method(&mut self, method: &mut MethodNode) {
        self.static_context = method.is_static || method.is_static_init();
        self.scopes.clear();
        let params = method
            .params
            .iter()
            .map(|p| (p.name.clone(), if p.holder { JvmType::object() } else { p.ty.clone() }))
            .collect();
        self.scopes.push(params);
        self.visit_stmt(&mut method.body);
        self.flags.reset();
        debug!("annotated {}.{}", self.class.name, method.name);
    }

    fn define(&mut self, name: &str, ty: JvmType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<&JvmType> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Static type of an already visited expression
    fn resolve_type(&self, expr: &Expr) -> JvmType {
        if let Some(ty) = expr.meta_type() {
            return ty.clone();
        }
        match &expr.kind {
            ExprKind::Constant(c) => c.ty(),
            ExprKind::Variable(name) => match self.lookup(name) {
                Some(ty) => ty.clone(),
                None => self.field_type(name),
            },
            ExprKind::Field { name } => self.field_type(name),
            ExprKind::This if self.static_context => JvmType::class_literal(),
            ExprKind::This => self.class.this_type(),
            ExprKind::ClassRef(_) => JvmType::class_literal(),
            ExprKind::Cast { ty, .. } => ty.clone(),
            ExprKind::Not(_) | ExprKind::InstanceOf { .. } => JvmType::Boolean,
            _ => JvmType::object(),
        }
    }

    fn field_type(&self, name: &str) -> JvmType {
        self.class.field(name).map(|f| f.ty.clone()).unwrap_or_else(JvmType::object)
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Block(stmts) => {
                self.flags.push();
                self.scopes.push(HashMap::new());
                let mut opt_all = true;
                let empty = stmts.is_empty();
                for s in stmts.iter_mut() {
                    self.flags.push();
                    self.visit_stmt(s);
                    opt_all = opt_all && self.flags.can_optimize();
                    self.flags.pop(true);
                }
                self.scopes.pop();
                if empty {
                    self.flags.chain_can_optimize(true);
                    self.flags.pop(true);
                } else {
                    self.flags.chain_should_optimize(opt_all);
                    if opt_all {
                        self.mark_statement(stmt);
                    }
                    self.flags.pop(opt_all);
                }
            }
            StmtKind::Expression(_) => self.visit_flagged(stmt, |opt, s| {
                if let StmtKind::Expression(e) = &mut s.kind {
                    opt.visit_expr(e);
                }
            }),
            StmtKind::Return(_) => self.visit_flagged(stmt, |opt, s| {
                if let StmtKind::Return(Some(e)) = &mut s.kind {
                    opt.visit_expr(e);
                }
            }),
            StmtKind::If { .. } => self.visit_flagged(stmt, |opt, s| {
                if let StmtKind::If { cond, then, otherwise } = &mut s.kind {
                    opt.visit_expr(cond);
                    opt.visit_stmt(then);
                    if let Some(otherwise) = otherwise {
                        opt.visit_stmt(otherwise);
                    }
                }
            }),
            StmtKind::While { .. } | StmtKind::DoWhile { .. } => self.visit_flagged(stmt, |opt, s| match &mut s.kind {
                StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                    opt.visit_expr(cond);
                    opt.visit_stmt(body);
                }
                _ => {}
            }),
            StmtKind::For { .. } => {
                self.scopes.push(HashMap::new());
                self.visit_flagged(stmt, |opt, s| {
                    if let StmtKind::For { init, cond, update, body } = &mut s.kind {
                        opt.visit_exprs(init);
                        if let Some(cond) = cond {
                            opt.visit_expr(cond);
                        }
                        opt.visit_exprs(update);
                        opt.visit_stmt(body);
                    }
                });
                self.scopes.pop();
            }
            StmtKind::ForIn { .. } => {
                self.scopes.push(HashMap::new());
                self.visit_flagged(stmt, |opt, s| {
                    if let StmtKind::ForIn { var, ty, collection, body } = &mut s.kind {
                        opt.visit_expr(collection);
                        opt.define(var, ty.clone());
                        opt.visit_stmt(body);
                    }
                });
                self.scopes.pop();
            }
            StmtKind::Throw(e) => self.visit_expr(e),
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
        }
    }

    /// Visit a statement in its own flags entry; it is marked when something
    /// inside should be optimized
    fn visit_flagged(&mut self, stmt: &mut Stmt, visit: impl FnOnce(&mut Self, &mut Stmt)) {
        self.flags.push();
        visit(self, stmt);
        let should = self.flags.should_optimize();
        if should {
            self.mark_statement(stmt);
        }
        self.flags.pop(should);
    }

    fn mark_statement(&mut self, stmt: &mut Stmt) {
        let involved = self.flags.current.involved;
        add_meta(&mut stmt.meta).involved.union(involved);
    }

    fn visit_exprs(&mut self, exprs: &mut [Expr]) {
        for e in exprs {
            self.visit_expr(e);
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Constant(_)
            | ExprKind::Variable(_)
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::ClassRef(_)
            | ExprKind::Field { .. } => {}
            ExprKind::Property { receiver, .. } => self.visit_expr(receiver),
            ExprKind::Binary { op, left, right, .. } => {
                let op = *op;
                self.visit_expr(left);
                self.visit_expr(right);
                let left_ty = self.resolve_type(left);
                let right_ty = self.resolve_type(right);
                self.annotate_binary(expr, op, left_ty, right_ty);
            }
            ExprKind::Assign { target, op, value } => {
                let op = *op;
                self.visit_expr(target);
                self.visit_expr(value);
                match op {
                    None => self.flags.chain_can_optimize(true),
                    Some(op) => {
                        let left_ty = self.resolve_type(target);
                        let right_ty = self.resolve_type(value);
                        self.annotate_binary(expr, op, left_ty, right_ty);
                    }
                }
            }
            ExprKind::Declaration { value, .. } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                self.annotate_declaration(expr);
            }
            ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => {
                self.visit_expr(operand);
                let ty = self.resolve_type(operand);
                if ty.is_primitive() {
                    add_meta(&mut expr.meta).ty = Some(ty.clone());
                    self.flags.chain_should_optimize(true);
                    self.flags.chain_involved_type(&ty);
                }
            }
            ExprKind::Not(operand) => self.visit_expr(operand),
            ExprKind::UnaryMinus(operand) | ExprKind::BitwiseNegate(operand) => {
                self.visit_expr(operand);
                add_meta(&mut expr.meta).ty = Some(JvmType::object());
            }
            ExprKind::MethodCall { receiver, name, args, spread_safe, implicit_this, .. } => {
                self.visit_expr(receiver);
                self.visit_exprs(args);
                let on_this = *implicit_this
                    || matches!(receiver.kind, ExprKind::This)
                    || matches!(&receiver.kind, ExprKind::ClassRef(t) if *t == self.class.this_type());
                if on_this && !*spread_safe {
                    let name = name.clone();
                    self.set_method_target(expr, &name);
                }
            }
            ExprKind::StaticCall { owner, name, args } => {
                self.visit_exprs(args);
                if *owner == self.class.this_type() {
                    let name = name.clone();
                    self.set_method_target(expr, &name);
                }
            }
            // no target: the meta class of another class cannot be checked
            ExprKind::ConstructorCall { args, .. } => self.visit_exprs(args),
            ExprKind::Cast { expr: inner, .. } | ExprKind::InstanceOf { expr: inner, .. } => self.visit_expr(inner),
            ExprKind::Ternary { cond, then, otherwise } => {
                self.visit_expr(cond);
                self.visit_expr(then);
                self.visit_expr(otherwise);
            }
            ExprKind::Spread(inner) => self.visit_expr(inner),
        }
    }

    fn annotate_binary(&mut self, expr: &mut Expr, op: BinaryOp, left: JvmType, right: JvmType) {
        let result = match op {
            BinaryOp::Index => match left.component() {
                Some(component) => {
                    self.flags.chain_should_optimize(true);
                    Some(component.clone())
                }
                None => None,
            },
            op if op.is_comparison() || op == BinaryOp::CompareTo => {
                let primitive = (is_int_category(&left) && is_int_category(&right))
                    || (is_long_category(&left) && is_long_category(&right))
                    || (is_double_category(&left) && is_double_category(&right));
                if primitive {
                    self.flags.chain_should_optimize(true);
                } else {
                    self.flags.chain_can_optimize(true);
                }
                Some(if op == BinaryOp::CompareTo { JvmType::Int } else { JvmType::Boolean })
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                if left == JvmType::Boolean && right == JvmType::Boolean {
                    self.flags.chain_should_optimize(true);
                } else {
                    self.flags.chain_can_optimize(true);
                }
                Some(JvmType::Boolean)
            }
            BinaryOp::Divide => {
                if is_long_category(&left) && is_long_category(&right) {
                    self.flags.chain_should_optimize(true);
                    Some(JvmType::big_decimal())
                } else if is_big_dec_category(&left) && is_big_dec_category(&right) {
                    None
                } else if is_double_category(&left) && is_double_category(&right) {
                    self.flags.chain_should_optimize(true);
                    Some(JvmType::Double)
                } else {
                    None
                }
            }
            BinaryOp::Power => None,
            _ => {
                if is_int_category(&left) && is_int_category(&right) {
                    self.flags.chain_should_optimize(true);
                    Some(JvmType::Int)
                } else if is_long_category(&left) && is_long_category(&right) {
                    self.flags.chain_should_optimize(true);
                    Some(JvmType::Long)
                } else if is_big_dec_category(&left) && is_big_dec_category(&right) {
                    None
                } else if is_double_category(&left) && is_double_category(&right) {
                    self.flags.chain_should_optimize(true);
                    Some(JvmType::Double)
                } else {
                    None
                }
            }
        };
        if let Some(result) = result {
            self.flags.chain_involved_type(&result);
            self.flags.chain_involved_type(&left);
            self.flags.chain_involved_type(&right);
            add_meta(&mut expr.meta).ty = Some(result);
        }
    }

    fn annotate_declaration(&mut self, expr: &mut Expr) {
        let ExprKind::Declaration { target, value } = &expr.kind else {
            return;
        };
        let (name, left, holder) = match target {
            DeclTarget::Single { name, ty, holder } => (name.clone(), ty.clone(), *holder),
            DeclTarget::Tuple(targets) => {
                for (name, ty) in targets.clone() {
                    self.define(&name, ty);
                }
                return;
            }
        };
        let right = value.as_deref().map(|v| (self.resolve_type(v), matches!(v.kind, ExprKind::Constant(_))));
        if let Some((right, constant)) = right {
            if left.is_primitive() && right.is_primitive() {
                // a constant initializer only optimizes when it completes a block
                if constant {
                    self.flags.chain_can_optimize(true);
                } else {
                    self.flags.chain_should_optimize(true);
                }
                self.flags.chain_involved_type(&left);
                self.flags.chain_involved_type(&right);
                add_meta(&mut expr.meta).ty = Some(left.clone());
            }
        }
        self.define(&name, if holder { JvmType::object() } else { left });
    }

    fn set_method_target(&mut self, expr: &mut Expr, name: &str) {
        if !self.optimize_method_calls {
            return;
        }
        let args = match &expr.kind {
            ExprKind::MethodCall { args, .. } | ExprKind::StaticCall { args, .. } => args,
            _ => return,
        };
        if args.iter().any(Expr::is_spread) {
            return;
        }
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            let ty = self.resolve_type(arg);
            if !valid_type_for_call(&ty) {
                return;
            }
            params.push(ty);
        }
        let Some(target) = self.class.find_method(name, &params) else {
            return;
        };
        if self.static_context && !target.is_static {
            return;
        }
        let target = target.target(&self.class.name);
        let meta = add_meta(&mut expr.meta);
        meta.ty = Some(target.return_type.clone());
        meta.target = Some(target);
        self.flags.chain_should_optimize(true);
    }
}

/// Annotate every method of `class`, returning the annotated copy
pub fn annotate(class: &ClassNode) -> ClassNode {
    let mut annotated = class.clone();
    let mut opt = Opt::new(class);
    for method in &mut annotated.methods {
        opt.annotate_method(method);
    }
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{Constant, OperandKind};

    fn class_with(body: Stmt, params: Vec<crate::ast::Parameter>) -> ClassNode {
        let mut class = ClassNode::new("demo/A");
        class.methods.push(method("f", params, JvmType::Void, body));
        class
    }

    fn body(class: &ClassNode) -> &Stmt {
        &class.methods[0].body
    }

    #[test]
    fn int_addition_marks_statement_and_block() {
        let class = class_with(
            block(vec![expr_stmt(binary(BinaryOp::Plus, var("a"), var("b")))]),
            vec![param("a", JvmType::Int), param("b", JvmType::Int)],
        );
        let annotated = annotate(&class);
        let block = body(&annotated);
        let meta = block.meta.as_ref().expect("block meta");
        assert!(meta.optimize);
        assert!(meta.involved.contains(OperandKind::Int));
        let StmtKind::Block(stmts) = &block.kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        assert_eq!(e.meta_type(), Some(&JvmType::Int));
    }

    #[test]
    fn object_addition_is_not_marked() {
        let class = class_with(
            block(vec![expr_stmt(binary(BinaryOp::Plus, var("a"), var("b")))]),
            vec![param("a", JvmType::object()), param("b", JvmType::Int)],
        );
        let annotated = annotate(&class);
        assert!(body(&annotated).meta.is_none());
    }

    #[test]
    fn long_division_is_big_decimal() {
        let class = class_with(
            block(vec![expr_stmt(binary(BinaryOp::Divide, var("a"), var("b")))]),
            vec![param("a", JvmType::Long), param("b", JvmType::Int)],
        );
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &body(&annotated).kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        assert_eq!(e.meta_type(), Some(&JvmType::big_decimal()));
    }

    #[test]
    fn constant_declaration_alone_is_not_marked() {
        let class = class_with(
            block(vec![expr_stmt(declare("x", JvmType::Int, Some(int(1))))]),
            vec![],
        );
        let annotated = annotate(&class);
        let block = body(&annotated);
        assert!(block.meta.is_none());
        let StmtKind::Block(stmts) = &block.kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        assert_eq!(e.meta_type(), Some(&JvmType::Int));
    }

    #[test]
    fn declared_variable_types_later_statements() {
        let class = class_with(
            block(vec![
                expr_stmt(declare("x", JvmType::Long, None)),
                expr_stmt(op_assign(BinaryOp::Plus, var("x"), int(1))),
            ]),
            vec![],
        );
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &body(&annotated).kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[1].kind else { panic!() };
        assert_eq!(e.meta_type(), Some(&JvmType::Long));
        let meta = stmts[1].meta.as_ref().expect("statement meta");
        assert!(meta.involved.contains(crate::ast::OperandKind::Long));
    }

    #[test]
    fn call_on_this_gets_a_target() {
        let mut class = class_with(
            block(vec![expr_stmt(call_this("g", vec![var("a")]))]),
            vec![param("a", JvmType::Int)],
        );
        class.methods.push(method("g", vec![param("x", JvmType::Int)], JvmType::Int, block(vec![])));
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &body(&annotated).kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        let target = e.meta_target().expect("target");
        assert_eq!(target.descriptor(), "(I)I");
        assert_eq!(e.meta_type(), Some(&JvmType::Int));
    }

    #[test]
    fn instance_target_skipped_in_static_context() {
        let mut class = ClassNode::new("demo/A");
        class.methods.push(static_method(
            "f",
            vec![],
            JvmType::Void,
            block(vec![expr_stmt(static_call(JvmType::class("demo/A"), "g", vec![]))]),
        ));
        class.methods.push(method("g", vec![], JvmType::Void, block(vec![])));
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &annotated.methods[0].body.kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        assert!(e.meta_target().is_none());
    }

    #[test]
    fn array_subscript_types_the_component() {
        let class = class_with(
            block(vec![expr_stmt(index(var("arr"), int(0)))]),
            vec![param("arr", JvmType::array_of(JvmType::Int))],
        );
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &body(&annotated).kind else { panic!() };
        let StmtKind::Expression(e) = &stmts[0].kind else { panic!() };
        assert_eq!(e.meta_type(), Some(&JvmType::Int));
        assert!(stmts[0].meta.as_ref().map(|m| m.optimize).unwrap_or(false));
    }

    #[test]
    fn loop_variables_are_typed_inside_their_loops() {
        let each = for_in(
            "x",
            JvmType::Int,
            var("xs"),
            block(vec![expr_stmt(op_assign(BinaryOp::Plus, var("s"), var("x")))]),
        );
        let counted = for_loop(
            vec![declare("i", JvmType::Long, Some(long(0)))],
            Some(binary(BinaryOp::LessThan, var("i"), long(3))),
            vec![],
            block(vec![]),
        );
        let class = class_with(block(vec![each, counted]), vec![param("xs", JvmType::object()), param("s", JvmType::Int)]);
        let annotated = annotate(&class);
        let StmtKind::Block(stmts) = &body(&annotated).kind else { panic!() };

        let each = stmts[0].meta.as_ref().expect("for-in meta");
        assert!(each.involved.contains(OperandKind::Int));
        let counted = stmts[1].meta.as_ref().expect("for meta");
        assert!(counted.involved.contains(OperandKind::Long));
    }

    #[test]
    fn constant_types_resolve() {
        let binding = ClassNode::new("demo/A");
        let opt = Opt::new(&binding);
        assert_eq!(opt.resolve_type(&constant(Constant::Long(1))), JvmType::Long);
    }
}
