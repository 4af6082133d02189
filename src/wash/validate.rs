//! Validate phase - user errors caught before generation
//!
//! Reports, per method:
//! - `break`/`continue` outside a loop, where `for` and for-in count as loops
//! - assignment, increment or decrement of something that is not assignable
//! - casts and `instanceof` checks against `void`
//! - duplicate parameter names and declarations shadowing a visible variable
//! - a value returned from a method without a return value

use std::collections::HashSet;

use log::debug;

use crate::ast::{ClassNode, DeclTarget, Expr, ExprKind, MethodNode, SourcePos, Stmt, StmtKind};
use crate::common::config::Config;
use crate::common::error::{Error, ErrorCollector, Result};

/// Validate phase processor
pub struct Validate<'e> {
    errors: &'e mut ErrorCollector,
    scopes: Vec<HashSet<String>>,
    loop_depth: usize,
    returns_value: bool,
}

impl<'e> Validate<'e> {
    pub fn new(errors: &'e mut ErrorCollector) -> Self {
        Self { errors, scopes: Vec::new(), loop_depth: 0, returns_value: false }
    }

    fn report(&mut self, pos: SourcePos, message: impl Into<String>) -> Result<()> {
        self.errors.add(Error::semantic(pos, message))
    }

    pub fn validate_class(&mut self, class: &ClassNode) -> Result<()> {
        for method in &class.methods {
            self.validate_method(method)?;
        }
        Ok(())
    }

    pub fn validate_method(&mut self, method: &MethodNode) -> Result<()> {
        debug!("validating {}", method.name);
        self.scopes.clear();
        self.loop_depth = 0;
        self.returns_value = !method.return_type.is_void();

        let mut params = HashSet::new();
        for p in &method.params {
            if !params.insert(p.name.clone()) {
                self.report(method.pos, format!("duplicate parameter '{}' in method {}", p.name, method.name))?;
            }
        }
        self.scopes.push(params);
        self.visit_stmt(&method.body)?;
        self.scopes.clear();
        Ok(())
    }

    fn declare(&mut self, pos: SourcePos, name: &str) -> Result<()> {
        if self.scopes.iter().any(|s| s.contains(name)) {
            return self.report(pos, format!("the current scope already contains a variable of the name {}", name));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
        Ok(())
    }

    fn visit_loop_body(&mut self, body: &Stmt) -> Result<()> {
        self.loop_depth += 1;
        let result = self.visit_stmt(body);
        self.loop_depth -= 1;
        result
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.scopes.push(HashSet::new());
                for s in stmts {
                    self.visit_stmt(s)?;
                }
                self.scopes.pop();
            }
            StmtKind::Expression(e) => self.visit_expr(e)?,
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    if !self.returns_value {
                        self.report(stmt.pos, "cannot return a value from a method without a return value")?;
                    }
                    self.visit_expr(value)?;
                }
            }
            StmtKind::If { cond, then, otherwise } => {
                self.visit_expr(cond)?;
                self.visit_stmt(then)?;
                if let Some(otherwise) = otherwise {
                    self.visit_stmt(otherwise)?;
                }
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                self.visit_expr(cond)?;
                self.visit_loop_body(body)?;
            }
            StmtKind::For { init, cond, update, body } => {
                self.scopes.push(HashSet::new());
                for e in init.iter().chain(cond).chain(update) {
                    self.visit_expr(e)?;
                }
                self.visit_loop_body(body)?;
                self.scopes.pop();
            }
            StmtKind::ForIn { var, collection, body, .. } => {
                self.visit_expr(collection)?;
                self.scopes.push(HashSet::new());
                self.declare(stmt.pos, var)?;
                self.visit_loop_body(body)?;
                self.scopes.pop();
            }
            StmtKind::Throw(e) => self.visit_expr(e)?,
            StmtKind::Break if self.loop_depth == 0 => self.report(stmt.pos, "break statement outside a loop")?,
            StmtKind::Continue if self.loop_depth == 0 => self.report(stmt.pos, "continue statement outside a loop")?,
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
        }
        Ok(())
    }

    fn check_assignable(&mut self, target: &Expr) -> Result<()> {
        match &target.kind {
            ExprKind::Variable(_) | ExprKind::Field { .. } | ExprKind::Property { .. } => Ok(()),
            _ if target.is_subscript() => Ok(()),
            _ => self.report(target.pos, "expression is not assignable"),
        }
    }

    fn visit_exprs(&mut self, exprs: &[Expr]) -> Result<()> {
        for e in exprs {
            self.visit_expr(e)?;
        }
        Ok(())
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Constant(_)
            | ExprKind::Variable(_)
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::ClassRef(_)
            | ExprKind::Field { .. } => Ok(()),
            ExprKind::Property { receiver, .. } => self.visit_expr(receiver),
            ExprKind::Binary { left, right, .. } => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
            ExprKind::Assign { target, value, .. } => {
                self.check_assignable(target)?;
                self.visit_expr(target)?;
                self.visit_expr(value)
            }
            ExprKind::Declaration { target, value } => {
                if let Some(value) = value {
                    self.visit_expr(value)?;
                }
                match target {
                    DeclTarget::Single { name, ty, .. } => {
                        if ty.is_void() {
                            self.report(expr.pos, format!("variable {} cannot have type void", name))?;
                        }
                        self.declare(expr.pos, name)
                    }
                    DeclTarget::Tuple(targets) => {
                        for (name, _) in targets {
                            self.declare(expr.pos, name)?;
                        }
                        Ok(())
                    }
                }
            }
            ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => {
                self.check_assignable(operand)?;
                self.visit_expr(operand)
            }
            ExprKind::Not(operand) | ExprKind::UnaryMinus(operand) | ExprKind::BitwiseNegate(operand) => {
                self.visit_expr(operand)
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.visit_expr(receiver)?;
                self.visit_exprs(args)
            }
            ExprKind::StaticCall { args, .. } | ExprKind::ConstructorCall { args, .. } => self.visit_exprs(args),
            ExprKind::Cast { ty, expr: inner, .. } => {
                if ty.is_void() {
                    self.report(expr.pos, "cannot cast to void")?;
                }
                self.visit_expr(inner)
            }
            ExprKind::InstanceOf { expr: inner, ty } => {
                if ty.is_void() {
                    self.report(expr.pos, "instanceof void is not allowed")?;
                }
                self.visit_expr(inner)
            }
            ExprKind::Ternary { cond, then, otherwise } => {
                self.visit_expr(cond)?;
                self.visit_expr(then)?;
                self.visit_expr(otherwise)
            }
            ExprKind::Spread(inner) => self.visit_expr(inner),
        }
    }
}

/// Validate `class`, failing with the first user error found
pub fn validate(class: &ClassNode, config: &Config) -> Result<()> {
    let mut errors = ErrorCollector::new(config.max_errors);
    Validate::new(&mut errors).validate_class(class)?;
    errors.into_result()
}
