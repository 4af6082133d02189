//! Method calls, static calls and constructor calls.
//!
//! A call is written by the first rule that applies: closure variable
//! call, super call, direct call to a resolved target on the fast path,
//! spread-safe call, and finally a cached call site. The module also holds
//! the reference casts used by the operand stack model.

use log::trace;

use super::bytecode_helper as helper;
use super::call_site::{CallKind, SiteReceiver};
use super::code::Code;
use super::controller::MethodGen;
use super::opcodes::*;
use super::operand_stack::OperandStack;
use crate::ast::{Expr, ExprKind, JvmType, MethodTarget};
use crate::common::error::{Error, Result};
use crate::consts;

/// `as` coercion of the top value from `source` to `target`
pub fn coerce(stack: &mut OperandStack, code: &mut Code, source: &JvmType, target: &JvmType) -> Result<()> {
    if source.is_assignable_to(target) {
        return Ok(());
    }
    stack.box_top(code)?;
    helper::push_class_literal(code, target)?;
    code.invokestatic(
        consts::SCRIPT_BYTECODE_ADAPTER,
        "asType",
        "(Ljava/lang/Object;Ljava/lang/Class;)Ljava/lang/Object;",
    )?;
    helper::do_cast(code, target)?;
    stack.replace(code, target.clone())
}

/// Runtime conversion of the (boxed) top value towards a reference type.
/// The caller still checkcasts when the tracked result is not assignable.
pub fn cast_to_non_primitive_if_necessary(
    stack: &mut OperandStack,
    code: &mut Code,
    source: &JvmType,
    target: &JvmType,
) -> Result<()> {
    let boxed = stack.box_top(code)?;
    if boxed.is_assignable_to(target) {
        return Ok(());
    }
    trace!("runtime cast {} -> {}", source, target);
    let result = match target {
        JvmType::Class(name) if name == consts::CLASS => {
            code.invokestatic(consts::SHORT_TYPE_HANDLING, "castToClass", "(Ljava/lang/Object;)Ljava/lang/Class;")?;
            JvmType::class_literal()
        }
        JvmType::Class(name) if name == consts::STRING => {
            code.invokestatic(
                consts::SHORT_TYPE_HANDLING,
                "castToString",
                "(Ljava/lang/Object;)Ljava/lang/String;",
            )?;
            JvmType::string()
        }
        _ => {
            helper::push_class_literal(code, target)?;
            code.invokestatic(
                consts::SCRIPT_BYTECODE_ADAPTER,
                "castToType",
                "(Ljava/lang/Object;Ljava/lang/Class;)Ljava/lang/Object;",
            )?;
            JvmType::object()
        }
    };
    stack.replace(code, result)
}

impl<'a, 'p> MethodGen<'a, 'p> {
    pub(crate) fn write_method_call(&mut self, call: &Expr) -> Result<()> {
        let ExprKind::MethodCall { receiver, name, args, safe, spread_safe, implicit_this } = &call.kind else {
            return Err(self.internal("method call writer got another expression"));
        };
        let on_super = matches!(receiver.kind, ExprKind::Super);
        let on_this = matches!(receiver.kind, ExprKind::This);

        if on_super && name == "<init>" {
            return self.write_super_init(call, args);
        }

        // `c()` where `c` is a local holding a closure
        if *implicit_this && on_this && self.locals.contains_variable(name) {
            let variable = Expr::new(ExprKind::Variable(name.clone())).at(call.pos);
            return self.make_call_site(
                call.id,
                SiteReceiver::Expr(&variable),
                consts::CLOSURE_CALL_MESSAGE,
                args,
                CallKind::Call,
            );
        }

        if on_super {
            return self.write_super_call(name, args);
        }

        if on_this && !spread_safe && self.use_primitive_optimizations() {
            if let Some(target) = call.meta_target() {
                if target.is_static || !self.is_static_context() {
                    return self.write_direct_method_call(target, args);
                }
            }
        }

        if *spread_safe {
            return self.write_spread_safe_call(receiver, name, args);
        }

        if on_this {
            if self.is_static_context() {
                let owner = self.this_type();
                return self.make_call_site(call.id, SiteReceiver::Class(&owner), name, args, CallKind::Static);
            }
            return self.make_call_site(call.id, SiteReceiver::This, name, args, CallKind::Current);
        }
        if let ExprKind::ClassRef(owner) = &receiver.kind {
            return self.make_call_site(call.id, SiteReceiver::Class(owner), name, args, CallKind::Static);
        }
        let kind = if *safe { CallKind::Safe } else { CallKind::Call };
        self.make_call_site(call.id, SiteReceiver::Expr(receiver), name, args, kind)
    }

    pub(crate) fn write_static_call(&mut self, call: &Expr) -> Result<()> {
        let ExprKind::StaticCall { owner, name, args } = &call.kind else {
            return Err(self.internal("static call writer got another expression"));
        };
        if self.use_primitive_optimizations() && *owner == self.this_type() {
            if let Some(target) = call.meta_target().filter(|t| t.is_static) {
                return self.write_direct_method_call(target, args);
            }
        }
        self.make_call_site(call.id, SiteReceiver::Class(owner), name, args, CallKind::Static)
    }

    pub(crate) fn write_constructor_call(&mut self, call: &Expr) -> Result<()> {
        let ExprKind::ConstructorCall { ty, args } = &call.kind else {
            return Err(self.internal("constructor writer got another expression"));
        };
        let target = call.meta_target().filter(|t| t.name == "<init>");
        match target {
            Some(target) if self.use_primitive_optimizations() => {
                self.code.type_insn(NEW, &ty.internal_name())?;
                self.stack.push(ty.clone());
                self.stack.dup(&mut self.code)?;
                let pushed = self.load_direct_arguments(target, args)?;
                self.code.invokespecial(&target.owner, "<init>", &target.descriptor())?;
                self.stack.replace_n(&self.code, ty.clone(), pushed + 2)
            }
            _ => self.make_constructor_call(call.id, ty, args),
        }
    }

    /// Call `target` with a native invoke instruction. A void result is
    /// replaced by `null` so the call stays an expression.
    pub(crate) fn write_direct_method_call(&mut self, target: &MethodTarget, args: &[Expr]) -> Result<()> {
        trace!("direct call {}.{}{}", target.owner, target.name, target.descriptor());
        let mut pushed = 0;
        if !target.is_static {
            self.code.load_local(&JvmType::object(), 0)?;
            self.stack.push(JvmType::class(target.owner.clone()));
            pushed += 1;
        }
        pushed += self.load_direct_arguments(target, args)?;

        let op = if target.is_static {
            INVOKESTATIC
        } else if target.is_interface {
            INVOKEINTERFACE
        } else if target.is_private {
            INVOKESPECIAL
        } else {
            INVOKEVIRTUAL
        };
        self.code.invoke(op, &target.owner, &target.name, &target.descriptor(), target.is_interface)?;

        if target.return_type.is_void() {
            self.stack.remove(&self.code, pushed)?;
            self.code.emitop(ACONST_NULL)?;
            self.stack.push(JvmType::object());
            Ok(())
        } else {
            self.stack.replace_n(&self.code, target.return_type.clone(), pushed)
        }
    }

    /// Arguments converted to the parameter types of `target`. Trailing
    /// arguments of a varargs target are packed into the last parameter's
    /// array unless a single array is passed in its place. Returns the
    /// number of tracked values pushed.
    fn load_direct_arguments(&mut self, target: &MethodTarget, args: &[Expr]) -> Result<usize> {
        let params = &target.params;
        if args.iter().any(Expr::is_spread) {
            return Err(Error::semantic(
                self.method.pos,
                format!("spread arguments cannot be passed to {} directly", target.name),
            ));
        }
        let passes_array = args.len() == params.len()
            && args.last().map_or(true, |last| {
                let ty = self.resolve_type(last);
                ty.is_array() || last.is_null_constant()
            });
        if !target.is_varargs || passes_array {
            if args.len() != params.len() {
                return Err(Error::semantic(
                    self.method.pos,
                    format!("{} expects {} arguments, got {}", target.name, params.len(), args.len()),
                ));
            }
            for (arg, param) in args.iter().zip(params) {
                self.visit_expr(arg)?;
                self.stack.do_groovy_cast(&mut self.code, param)?;
            }
            return Ok(params.len());
        }

        let Some((array_ty, fixed)) = params.split_last() else {
            return Err(self.internal("varargs target without parameters"));
        };
        if args.len() < fixed.len() {
            return Err(Error::semantic(
                self.method.pos,
                format!("{} expects at least {} arguments, got {}", target.name, fixed.len(), args.len()),
            ));
        }
        let component = array_ty
            .component()
            .cloned()
            .ok_or_else(|| self.internal("varargs parameter is not an array"))?;
        for (arg, param) in args.iter().zip(fixed) {
            self.visit_expr(arg)?;
            self.stack.do_groovy_cast(&mut self.code, param)?;
        }
        let rest = &args[fixed.len()..];
        self.code.push_int(rest.len() as i32)?;
        self.code.new_array(&component)?;
        self.stack.push(array_ty.clone());
        for (i, arg) in rest.iter().enumerate() {
            self.stack.dup(&mut self.code)?;
            self.code.push_int(i as i32)?;
            self.stack.push(JvmType::Int);
            self.visit_expr(arg)?;
            self.stack.do_groovy_cast(&mut self.code, &component)?;
            self.code.emitop(helper::array_store_op(&component))?;
            self.stack.remove(&self.code, 3)?;
        }
        Ok(params.len())
    }

    /// `super.name(args)`: the runtime resolves `name` from the superclass
    /// of the sender.
    fn write_super_call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        if self.is_static_context() {
            return Err(Error::semantic(self.method.pos, format!("super.{} used in a static context", name)));
        }
        let sender = self.this_type();
        let mark = self.stack.len();
        self.stack.push_class_literal(&mut self.code, &sender)?;
        self.code.load_local(&JvmType::object(), 0)?;
        self.stack.push(self.this_type());
        self.stack.push_dynamic_name(&mut self.code, name)?;
        let (method, desc) = if args.is_empty() {
            (
                "invokeMethodOnSuper0",
                "(Ljava/lang/Class;Lgroovy/lang/GroovyObject;Ljava/lang/String;)Ljava/lang/Object;",
            )
        } else {
            self.push_argument_array(args)?;
            (
                "invokeMethodOnSuperN",
                "(Ljava/lang/Class;Lgroovy/lang/GroovyObject;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
            )
        };
        self.code.invokestatic(consts::SCRIPT_BYTECODE_ADAPTER, method, desc)?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }

    /// `receiver*.name(args)`, applied to every element of the receiver
    fn write_spread_safe_call(&mut self, receiver: &Expr, name: &str, args: &[Expr]) -> Result<()> {
        let sender = self.this_type();
        let mark = self.stack.len();
        self.stack.push_class_literal(&mut self.code, &sender)?;
        self.visit_boxed(receiver)?;
        self.stack.push_dynamic_name(&mut self.code, name)?;
        let (method, desc) = if args.is_empty() {
            (
                "invokeMethod0SpreadSafe",
                "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
            )
        } else {
            self.push_argument_array(args)?;
            (
                "invokeMethodNSpreadSafe",
                "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
            )
        };
        self.code.invokestatic(consts::SCRIPT_BYTECODE_ADAPTER, method, desc)?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }

    fn push_argument_array(&mut self, args: &[Expr]) -> Result<()> {
        if args.iter().any(Expr::is_spread) {
            self.despread_arguments(args)
        } else {
            self.build_object_array(args)
        }
    }

    /// Explicit `super(args)` in a constructor. Leaves `null` as the
    /// expression value.
    fn write_super_init(&mut self, call: &Expr, args: &[Expr]) -> Result<()> {
        if !self.method.is_constructor() {
            return Err(Error::semantic(call.pos, "super constructor call outside a constructor"));
        }
        self.code.load_local(&JvmType::object(), 0)?;
        self.stack.push(JvmType::class(self.class.super_class.clone()));
        match call.meta_target() {
            Some(target) => {
                let pushed = self.load_direct_arguments(target, args)?;
                self.code.invokespecial(&self.class.super_class, "<init>", &target.descriptor())?;
                self.stack.remove(&self.code, pushed + 1)?;
            }
            None if args.is_empty() => {
                self.code.invokespecial(&self.class.super_class, "<init>", "()V")?;
                self.stack.remove(&self.code, 1)?;
            }
            None => {
                return Err(Error::semantic(
                    call.pos,
                    "super constructor call with arguments needs a resolved constructor",
                ))
            }
        }
        self.code.emitop(ACONST_NULL)?;
        self.stack.push(JvmType::object());
        Ok(())
    }
}
