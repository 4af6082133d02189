//! Fast/slow path statement rewriter.
//!
//! A statement whose metadata marks it optimizable is generated twice:
//! once as the generic slow path and once as the fast path, where
//! primitive strategies and direct calls are allowed. Runtime guards pick
//! the fast copy only while the involved primitive types and this class
//! still have their original meta classes:
//!
//! ```text
//!     isOrigX() == 0       -> slow     (one guard per involved kind)
//!     __$stMC != 0         -> slow
//!     disabledStandardMetaClass() != 0 -> slow
//!     goto fast
//! slow:
//!     <statement, no nested forks>
//!     goto after
//! fast:
//!     <statement on the fast path>
//! after:
//! ```

use std::mem;

use log::debug;

use super::code::Label;
use super::controller::MethodGen;
use super::opcodes::*;
use crate::ast::{DeclTarget, Expr, ExprKind, JvmType, NodeMeta, OperandKind, Stmt, StmtKind};
use crate::common::error::Result;
use crate::consts;

struct FastPathData {
    path_start: Label,
    after_path: Label,
}

fn guard_method(kind: OperandKind) -> Option<&'static str> {
    Some(match kind {
        OperandKind::Object => return None,
        OperandKind::Int => "isOrigInt",
        OperandKind::Long => "isOrigL",
        OperandKind::Double => "isOrigD",
        OperandKind::Char => "isOrigC",
        OperandKind::Byte => "isOrigB",
        OperandKind::Short => "isOrigS",
        OperandKind::Float => "isOrigF",
        OperandKind::Boolean => "isOrigZ",
    })
}

/// Result of splitting a declaration off a forked statement
enum Extraction {
    /// Not a declaration: fork the statement as is
    Unchanged,
    /// The variable is defined before the fork and the statement becomes
    /// an assignment, or disappears when there is no initial value
    Assignment { name: String, ty: JvmType, holder: bool, stmt: Option<Stmt> },
    /// Tuple declarations cannot be split
    Abandon,
}

impl<'a, 'p> MethodGen<'a, 'p> {
    /// Generate `stmt`, forking it into fast and slow copies where allowed
    pub(crate) fn write_statement(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(_) | StmtKind::If { .. } => self.write_forked_whole(stmt),
            StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } | StmtKind::ForIn { .. } => {
                self.write_forked_loop(stmt)
            }
            StmtKind::Expression(_) | StmtKind::Return(_) => self.write_forked_leaf(stmt),
            StmtKind::Throw(_) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {
                self.write_plain_statement(stmt)
            }
        }
    }

    fn can_fork(&self, meta: Option<&NodeMeta>) -> bool {
        matches!(meta, Some(m) if m.optimize)
            && self.config.optimize_primitives
            && !self.fast_path_blocked
            && !self.fast_path
    }

    fn write_guards(&mut self, stmt: &Stmt) -> Result<Option<FastPathData>> {
        if !self.can_fork(stmt.meta.as_ref()) || stmt.is_empty_block() {
            return Ok(None);
        }
        let involved = stmt.meta.as_ref().map(|m| m.involved).unwrap_or_default();
        debug!(
            "fast path fork at line {} in {}, guarding {:?}",
            stmt.pos.line,
            self.method.name,
            involved.iter().collect::<Vec<_>>()
        );
        if stmt.pos.is_known() {
            self.code.line(stmt.pos.line);
        }
        let slow = self.code.new_label();
        let data = FastPathData { path_start: self.code.new_label(), after_path: self.code.new_label() };

        for kind in involved.iter() {
            if let Some(method) = guard_method(kind) {
                self.code.invokestatic(consts::BYTECODE_INTERFACE8, method, "()Z")?;
                self.code.jump(IFEQ, slow)?;
            }
        }
        self.code.field_insn(GETSTATIC, &self.class.name, consts::STATIC_META_CLASS_FLAG, "Z")?;
        self.code.jump(IFNE, slow)?;
        self.code.invokestatic(consts::BYTECODE_INTERFACE8, "disabledStandardMetaClass", "()Z")?;
        self.code.jump(IFNE, slow)?;
        self.code.goto(data.path_start)?;
        self.code.mark(slow)?;
        Ok(Some(data))
    }

    /// Slow copy with nested forks blocked
    fn write_slow_copy(&mut self, stmt: &Stmt) -> Result<()> {
        let blocked = mem::replace(&mut self.fast_path_blocked, true);
        let result = self.write_plain_statement(stmt);
        self.fast_path_blocked = blocked;
        result
    }

    fn write_fast_copy(&mut self, stmt: &Stmt, data: FastPathData) -> Result<()> {
        self.code.goto(data.after_path)?;
        self.code.mark(data.path_start)?;
        self.fast_path = true;
        let result = self.write_plain_statement(stmt);
        self.fast_path = false;
        result?;
        self.code.mark(data.after_path)
    }

    /// Blocks and if/else fork as a whole; without a fork their children
    /// may still fork one by one
    fn write_forked_whole(&mut self, stmt: &Stmt) -> Result<()> {
        match self.write_guards(stmt)? {
            None => self.write_plain_statement(stmt),
            Some(data) => {
                self.write_slow_copy(stmt)?;
                self.write_fast_copy(stmt, data)
            }
        }
    }

    /// Loops block nested forks even when they do not fork themselves
    fn write_forked_loop(&mut self, stmt: &Stmt) -> Result<()> {
        if self.fast_path {
            return self.write_plain_statement(stmt);
        }
        let data = self.write_guards(stmt)?;
        self.write_slow_copy(stmt)?;
        match data {
            Some(data) => self.write_fast_copy(stmt, data),
            None => Ok(()),
        }
    }

    /// Expression and return statements fork only at a new fork point,
    /// after any declaration has been split off
    fn write_forked_leaf(&mut self, stmt: &Stmt) -> Result<()> {
        if !self.can_fork(stmt.meta.as_ref()) {
            return self.write_plain_statement(stmt);
        }
        let rewritten = match extract_declaration(stmt) {
            Extraction::Abandon => return self.write_plain_statement(stmt),
            Extraction::Unchanged => None,
            Extraction::Assignment { name, ty, holder, stmt: assignment } => {
                self.locals.define_variable(&mut self.code, &mut self.stack, &name, &ty, holder, false)?;
                match assignment {
                    Some(assignment) => Some(assignment),
                    None => return Ok(()),
                }
            }
        };
        let stmt = rewritten.as_ref().unwrap_or(stmt);
        match self.write_guards(stmt)? {
            None => self.write_plain_statement(stmt),
            Some(data) => {
                self.write_slow_copy(stmt)?;
                self.write_fast_copy(stmt, data)
            }
        }
    }
}

fn extract_declaration(stmt: &Stmt) -> Extraction {
    let expr = match &stmt.kind {
        StmtKind::Expression(e) => e,
        StmtKind::Return(Some(e)) => e,
        _ => return Extraction::Unchanged,
    };
    let ExprKind::Declaration { target, value } = &expr.kind else {
        return Extraction::Unchanged;
    };
    let DeclTarget::Single { name, ty, holder } = target else {
        return Extraction::Abandon;
    };
    let assignment = value.as_ref().map(|value| {
        let assign = Expr {
            id: expr.id,
            kind: ExprKind::Assign {
                target: Box::new(Expr::new(ExprKind::Variable(name.clone())).at(expr.pos)),
                op: None,
                value: value.clone(),
            },
            pos: expr.pos,
            meta: expr.meta.clone(),
        };
        let kind = match &stmt.kind {
            StmtKind::Return(_) => StmtKind::Return(Some(assign)),
            _ => StmtKind::Expression(assign),
        };
        Stmt { id: stmt.id, kind, pos: stmt.pos, meta: stmt.meta.clone() }
    });
    Extraction::Assignment { name: name.clone(), ty: ty.clone(), holder: *holder, stmt: assignment }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::BinaryOp;

    #[test]
    fn declaration_becomes_assignment() {
        let stmt = expr_stmt(declare("x", JvmType::Int, Some(int(1))));
        match extract_declaration(&stmt) {
            Extraction::Assignment { name, ty, stmt: Some(rewritten), .. } => {
                assert_eq!(name, "x");
                assert_eq!(ty, JvmType::Int);
                assert!(matches!(
                    &rewritten.kind,
                    StmtKind::Expression(Expr { kind: ExprKind::Assign { op: None, .. }, .. })
                ));
                assert_eq!(rewritten.id, stmt.id);
            }
            _ => panic!("expected an extracted declaration"),
        }
    }

    #[test]
    fn tuple_declaration_abandons_the_split() {
        let stmt = expr_stmt(declare_tuple(&[("a", JvmType::object()), ("b", JvmType::object())], var("l")));
        assert!(matches!(extract_declaration(&stmt), Extraction::Abandon));
    }

    #[test]
    fn plain_expression_is_unchanged() {
        let stmt = expr_stmt(binary(BinaryOp::Plus, int(1), int(2)));
        assert!(matches!(extract_declaration(&stmt), Extraction::Unchanged));
    }

    #[test]
    fn guards_cover_every_primitive_kind() {
        for kind in OperandKind::ALL {
            assert_eq!(guard_method(kind).is_none(), kind == OperandKind::Object);
        }
    }
}
