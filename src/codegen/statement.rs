//! Statement writer. Nested statements go back through
//! [`MethodGen::write_statement`] so each of them may fork on its own.

use super::bytecode_helper as helper;
use super::call_site::{CallKind, SiteReceiver};
use super::controller::MethodGen;
use super::opcodes::*;
use crate::ast::{Expr, JvmType, NodeId, Stmt, StmtKind};
use crate::common::error::{Error, Result};
use crate::consts;

impl<'a, 'p> MethodGen<'a, 'p> {
    /// Generate `stmt` without forking it
    pub(crate) fn write_plain_statement(&mut self, stmt: &Stmt) -> Result<()> {
        if stmt.pos.is_known() {
            self.code.line(stmt.pos.line);
        }
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.locals.push_scope();
                for s in stmts {
                    self.write_statement(s)?;
                }
                self.locals.pop_scope(&self.code)?;
            }
            StmtKind::Expression(expr) => self.visit_expr_for_effect(expr)?,
            StmtKind::Return(value) => self.write_return(stmt, value.as_ref())?,
            StmtKind::If { cond, then, otherwise } => self.write_if(cond, then, otherwise.as_deref())?,
            StmtKind::While { cond, body } => self.write_while(cond, body)?,
            StmtKind::DoWhile { body, cond } => self.write_do_while(body, cond)?,
            StmtKind::For { init, cond, update, body } => {
                self.locals.push_scope();
                self.write_for(init, cond.as_ref(), update, body)?;
                self.locals.pop_scope(&self.code)?;
            }
            StmtKind::ForIn { var, ty, collection, body } => {
                self.locals.push_scope();
                self.write_for_in(stmt.id, var, ty, collection, body)?;
                self.locals.pop_scope(&self.code)?;
            }
            StmtKind::Throw(expr) => self.write_throw(expr)?,
            StmtKind::Break => {
                let target = self
                    .locals
                    .break_label()
                    .ok_or_else(|| Error::semantic(stmt.pos, "break outside a loop"))?;
                self.code.goto(target)?;
            }
            StmtKind::Continue => {
                let target = self
                    .locals
                    .continue_label()
                    .ok_or_else(|| Error::semantic(stmt.pos, "continue outside a loop"))?;
                self.code.goto(target)?;
            }
            StmtKind::Empty => {}
        }
        if !self.stack.is_empty() {
            return Err(self.internal(format!(
                "{} values left on the operand stack after statement at line {}",
                self.stack.len(),
                stmt.pos.line
            )));
        }
        self.stack.check_balance(&self.code)
    }

    fn write_return(&mut self, stmt: &Stmt, value: Option<&Expr>) -> Result<()> {
        let ret = self.method.return_type.clone();
        match value {
            Some(_) if ret.is_void() => {
                return Err(Error::semantic(stmt.pos, "cannot return a value from a void method"));
            }
            Some(value) => {
                self.visit_expr(value)?;
                self.stack.do_groovy_cast(&mut self.code, &ret)?;
                self.code.emitop(helper::return_op(&ret))?;
                self.stack.remove(&self.code, 1)
            }
            None => {
                if !ret.is_void() {
                    helper::push_default(&mut self.code, &ret)?;
                }
                self.code.emitop(helper::return_op(&ret))
            }
        }
    }

    /// Branch on the Groovy truth of `cond`: jump to `target` when the
    /// condition equals `jump_when`
    fn write_condition_jump(&mut self, cond: &Expr, jump_when: bool, target: super::code::Label) -> Result<()> {
        let mark = self.stack.len();
        self.visit_expr(cond)?;
        self.stack.cast_to_bool(&mut self.code, mark, false)?;
        self.code.jump(if jump_when { IFNE } else { IFEQ }, target)?;
        self.stack.remove(&self.code, 1)
    }

    fn write_if(&mut self, cond: &Expr, then: &Stmt, otherwise: Option<&Stmt>) -> Result<()> {
        let else_label = self.code.new_label();
        self.write_condition_jump(cond, false, else_label)?;
        self.write_statement(then)?;
        match otherwise {
            Some(otherwise) => {
                let end = self.code.new_label();
                self.code.goto(end)?;
                self.code.mark(else_label)?;
                self.write_statement(otherwise)?;
                self.code.mark(end)
            }
            None => self.code.mark(else_label),
        }
    }

    fn write_while(&mut self, cond: &Expr, body: &Stmt) -> Result<()> {
        let continue_label = self.code.new_label();
        let break_label = self.code.new_label();
        self.code.mark(continue_label)?;
        self.write_condition_jump(cond, false, break_label)?;
        self.locals.push_loop(continue_label, break_label);
        let result = self.write_statement(body);
        self.locals.pop_loop();
        result?;
        self.code.goto(continue_label)?;
        self.code.mark(break_label)
    }

    fn write_do_while(&mut self, body: &Stmt, cond: &Expr) -> Result<()> {
        let start = self.code.new_label();
        let continue_label = self.code.new_label();
        let break_label = self.code.new_label();
        self.code.mark(start)?;
        self.locals.push_loop(continue_label, break_label);
        let result = self.write_statement(body);
        self.locals.pop_loop();
        result?;
        self.code.mark(continue_label)?;
        self.write_condition_jump(cond, true, start)?;
        self.code.mark(break_label)
    }

    /// Init expressions run once in the loop scope; `continue` jumps to the
    /// update expressions
    fn write_for(&mut self, init: &[Expr], cond: Option<&Expr>, update: &[Expr], body: &Stmt) -> Result<()> {
        for expr in init {
            self.visit_expr_for_effect(expr)?;
        }
        let cond_label = self.code.new_label();
        let continue_label = self.code.new_label();
        let break_label = self.code.new_label();
        self.code.mark(cond_label)?;
        if let Some(cond) = cond {
            self.write_condition_jump(cond, false, break_label)?;
        }
        self.locals.push_loop(continue_label, break_label);
        let result = self.write_statement(body);
        self.locals.pop_loop();
        result?;
        self.code.mark(continue_label)?;
        for expr in update {
            self.visit_expr_for_effect(expr)?;
        }
        self.code.goto(cond_label)?;
        self.code.mark(break_label)
    }

    /// Walk `collection.iterator()`, storing each element into the loop
    /// variable converted to its declared type
    fn write_for_in(&mut self, id: NodeId, var: &str, ty: &JvmType, collection: &Expr, body: &Stmt) -> Result<()> {
        let variable = self.locals.define_variable(&mut self.code, &mut self.stack, var, ty, false, false)?;
        let iterator_ty = JvmType::class(consts::ITERATOR);
        self.make_call_site(id, SiteReceiver::Expr(collection), consts::ITERATOR_MESSAGE, &[], CallKind::Call)?;
        self.stack.do_groovy_cast(&mut self.code, &iterator_ty)?;
        let iterator = self.locals.define_temporary(&mut self.code, &mut self.stack, "$iter", &iterator_ty, true)?;

        let continue_label = self.code.new_label();
        let break_label = self.code.new_label();
        self.code.mark(continue_label)?;
        self.code.load_local(&iterator_ty, iterator)?;
        self.code.invokeinterface(consts::ITERATOR, "hasNext", "()Z")?;
        self.code.jump(IFEQ, break_label)?;
        self.code.load_local(&iterator_ty, iterator)?;
        self.code.invokeinterface(consts::ITERATOR, "next", "()Ljava/lang/Object;")?;
        self.stack.push(JvmType::object());
        self.stack.store_var(&mut self.code, &variable)?;

        self.locals.push_loop(continue_label, break_label);
        let result = self.write_statement(body);
        self.locals.pop_loop();
        result?;
        self.code.goto(continue_label)?;
        self.code.mark(break_label)?;
        self.locals.remove_var(&self.code, iterator)
    }

    fn write_throw(&mut self, expr: &Expr) -> Result<()> {
        self.visit_expr(expr)?;
        self.stack.box_top(&mut self.code)?;
        self.code.type_insn(CHECKCAST, consts::THROWABLE)?;
        self.code.emitop(ATHROW)?;
        self.stack.remove(&self.code, 1)
    }
}
