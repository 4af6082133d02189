//! Per-method generation state.
//!
//! [`MethodGen`] owns the code buffer, the operand stack model and the local
//! variable stack of one method body. The writers (expressions, binary
//! operators, call sites, invocations, statements and the fast/slow path
//! rewriter) are `impl MethodGen` blocks in their own modules and all share
//! this state.

use log::debug;

use super::bytecode_helper as helper;
use super::call_site::CallSiteTable;
use super::code::{Code, CodeBody};
use super::compile_stack::CompileStack;
use super::operand_stack::OperandStack;
use crate::ast::{ClassNode, ExprKind, JvmType, MethodNode, StmtKind};
use crate::common::config::Config;
use crate::common::error::{Error, Result};

pub struct MethodGen<'a, 'p> {
    pub(crate) code: Code<'p>,
    pub(crate) stack: OperandStack,
    pub(crate) locals: CompileStack,
    pub(crate) class: &'a ClassNode,
    pub(crate) method: &'a MethodNode,
    pub(crate) config: &'a Config,
    pub(crate) sites: &'a mut CallSiteTable,
    /// Emitting the guarded copy of an optimized region
    pub(crate) fast_path: bool,
    /// Inside the slow copy of a region: no nested forks
    pub(crate) fast_path_blocked: bool,
    /// Slot caching the call-site array for this invocation
    pub(crate) site_array_local: Option<u16>,
}

impl<'a, 'p> MethodGen<'a, 'p> {
    pub fn new(
        code: Code<'p>,
        class: &'a ClassNode,
        method: &'a MethodNode,
        config: &'a Config,
        sites: &'a mut CallSiteTable,
    ) -> Self {
        Self {
            code,
            stack: OperandStack::new(),
            locals: CompileStack::new(),
            class,
            method,
            config,
            sites,
            fast_path: false,
            fast_path_blocked: false,
            site_array_local: None,
        }
    }

    pub(crate) fn is_static_context(&self) -> bool {
        self.method.is_static || self.method.is_static_init()
    }

    pub(crate) fn this_type(&self) -> JvmType {
        self.class.this_type()
    }

    /// Primitive strategies and direct calls are allowed here
    pub(crate) fn use_primitive_optimizations(&self) -> bool {
        self.fast_path && self.config.optimize_primitives
    }

    pub(crate) fn internal(&self, message: impl Into<String>) -> Error {
        self.code.internal(message)
    }

    /// Generate the whole body and finish the code buffer
    pub fn generate(mut self) -> Result<CodeBody> {
        let method = self.method;
        debug!("method {}.{}{}", self.class.name, method.name, method.descriptor());
        self.code.line(method.pos.line);
        self.locals.init_method(&mut self.code, &mut self.stack, &method.params, method.is_static)?;
        self.make_site_entry()?;
        if method.is_constructor() && !starts_with_super_init(method) {
            self.write_implicit_super_init()?;
        }

        self.write_statement(&method.body)?;

        if self.code.is_alive() {
            self.write_implicit_return()?;
        }
        if !self.stack.is_empty() {
            return Err(self.internal(format!("{} values left on the operand stack", self.stack.len())));
        }
        let max_locals = self.locals.max_locals();
        self.code.finish(max_locals)
    }

    fn write_implicit_super_init(&mut self) -> Result<()> {
        self.code.load_local(&JvmType::object(), 0)?;
        self.code.invokespecial(&self.class.super_class, "<init>", "()V")
    }

    fn write_implicit_return(&mut self) -> Result<()> {
        let ret = self.method.return_type.clone();
        if !ret.is_void() {
            helper::push_default(&mut self.code, &ret)?;
        }
        self.code.emitop(helper::return_op(&ret))
    }
}

/// Whether a constructor body begins with an explicit `super(...)` call
fn starts_with_super_init(method: &MethodNode) -> bool {
    let first = match &method.body.kind {
        StmtKind::Block(stmts) => stmts.first(),
        _ => Some(&method.body),
    };
    match first.map(|s| &s.kind) {
        Some(StmtKind::Expression(e)) => matches!(
            &e.kind,
            ExprKind::MethodCall { receiver, name, .. }
                if name == "<init>" && matches!(receiver.kind, ExprKind::Super)
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn detects_explicit_super_init() {
        let explicit = constructor(vec![], block(vec![expr_stmt(call(super_ref(), "<init>", vec![]))]));
        assert!(starts_with_super_init(&explicit));
        let implicit = constructor(vec![], block(vec![expr_stmt(int(1))]));
        assert!(!starts_with_super_init(&implicit));
    }
}
