//! Cached dynamic dispatch through the per-class call-site array.
//!
//! Every dynamic call, property read and operator fallback loads one entry
//! of the class's `CallSite[]` and invokes it. Entries are allocated per
//! `(node, message)` pair, so the fast and slow copies of a region share
//! their slots. At class finish the table is turned into the synthetic
//! members that build and cache the array at runtime.

use std::collections::HashMap;

use log::trace;

use super::class_writer::ClassWriter;
use super::code::Code;
use super::controller::MethodGen;
use super::defs::access_flags::*;
use super::opcodes::*;
use crate::ast::{Expr, JvmType, NodeId};
use crate::common::config::Config;
use crate::common::error::Result;
use crate::consts;

/// Ordered message names of a class's call sites
#[derive(Debug, Default)]
pub struct CallSiteTable {
    names: Vec<String>,
    slots: HashMap<(NodeId, String), usize>,
}

impl CallSiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the site for `message` at node `id`; the same pair always
    /// gets the same index.
    pub fn allocate(&mut self, id: NodeId, message: &str) -> usize {
        let key = (id, message.to_string());
        if let Some(&index) = self.slots.get(&key) {
            return index;
        }
        let index = self.names.len();
        trace!("call site {} -> {} (node {})", index, message, id.raw());
        self.names.push(message.to_string());
        self.slots.insert(key, index);
        index
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Entry point of `CallSite` used for a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
    Safe,
    Current,
    Static,
    Constructor,
}

impl CallKind {
    fn method(self) -> &'static str {
        match self {
            CallKind::Call => "call",
            CallKind::Safe => "callSafe",
            CallKind::Current => "callCurrent",
            CallKind::Static => "callStatic",
            CallKind::Constructor => "callConstructor",
        }
    }

    fn receiver_descriptor(self) -> &'static str {
        match self {
            CallKind::Static => "Ljava/lang/Class;",
            CallKind::Current => consts::GROOVY_OBJECT_DESC,
            _ => "Ljava/lang/Object;",
        }
    }
}

/// Where the receiver of a call-site dispatch comes from
#[derive(Debug, Clone, Copy)]
pub enum SiteReceiver<'e> {
    Expr(&'e Expr),
    /// Class literal of a static receiver
    Class(&'e JvmType),
    /// `aload_0`
    This,
    /// Already on the stack below the site, boxed
    Stacked,
}

fn site_array_type() -> JvmType {
    JvmType::array_of(JvmType::class(consts::CALL_SITE))
}

/// Argument part of a `CallSite.call*` descriptor for `n` arguments;
/// `None` means the arguments travel in one Object[].
fn argument_descriptor(n: Option<usize>) -> String {
    match n {
        Some(n) => "Ljava/lang/Object;".repeat(n),
        None => "[Ljava/lang/Object;".to_string(),
    }
}

/// Largest argument count with an `ArrayUtil.createArray` overload
const MAX_CREATE_ARRAY_ARGS: usize = 254;

impl<'a, 'p> MethodGen<'a, 'p> {
    /// Fetch the call-site array once at method entry and keep it in a
    /// local. `<clinit>` fetches it at every site instead.
    pub(crate) fn make_site_entry(&mut self) -> Result<()> {
        if self.class.is_interface || self.method.is_static_init() {
            return Ok(());
        }
        self.code.invokestatic(&self.class.name, consts::GET_CALL_SITE_ARRAY, consts::GET_CALL_SITE_ARRAY_DESC)?;
        self.stack.push(site_array_type());
        let local = self.locals.define_temporary(
            &mut self.code,
            &mut self.stack,
            "$local$callSiteArray",
            &site_array_type(),
            true,
        )?;
        self.site_array_local = Some(local);
        Ok(())
    }

    /// Push the `CallSite` for `message` at node `id`
    pub(crate) fn prepare_call_site(&mut self, id: NodeId, message: &str) -> Result<()> {
        match self.site_array_local {
            Some(local) => self.code.load_local(&site_array_type(), local)?,
            None => self.code.invokestatic(
                &self.class.name,
                consts::GET_CALL_SITE_ARRAY,
                consts::GET_CALL_SITE_ARRAY_DESC,
            )?,
        }
        let index = self.sites.allocate(id, message);
        let index = i32::try_from(index).map_err(|_| self.internal("call-site index overflow"))?;
        self.code.push_int(index)?;
        self.code.emitop(AALOAD)?;
        self.stack.push(JvmType::class(consts::CALL_SITE));
        Ok(())
    }

    fn push_site_receiver(&mut self, receiver: SiteReceiver<'_>) -> Result<()> {
        match receiver {
            SiteReceiver::Expr(expr) => self.visit_boxed(expr)?,
            SiteReceiver::Class(ty) => self.stack.push_class_literal(&mut self.code, ty)?,
            SiteReceiver::This => {
                self.code.load_local(&JvmType::object(), 0)?;
                self.stack.push(self.this_type());
            }
            SiteReceiver::Stacked => self.stack.swap(&mut self.code)?,
        }
        Ok(())
    }

    /// Site, then receiver, boxed. Returns the tracked length below the site.
    fn prepare_site_and_receiver(
        &mut self,
        id: NodeId,
        message: &str,
        receiver: SiteReceiver<'_>,
    ) -> Result<usize> {
        let mark = match receiver {
            SiteReceiver::Stacked => self.stack.len().saturating_sub(1),
            _ => self.stack.len(),
        };
        self.prepare_call_site(id, message)?;
        self.push_site_receiver(receiver)?;
        Ok(mark)
    }

    /// Visit and box call arguments. Returns the inline argument count, or
    /// `None` when they were packed into one Object[].
    pub(crate) fn push_call_arguments(&mut self, args: &[Expr]) -> Result<Option<usize>> {
        if args.iter().any(Expr::is_spread) {
            self.despread_arguments(args)?;
            return Ok(None);
        }
        if args.len() > MAX_CREATE_ARRAY_ARGS {
            self.build_object_array(args)?;
            return Ok(None);
        }
        for arg in args {
            self.visit_boxed(arg)?;
        }
        if args.len() > consts::MAX_INLINE_CALL_ARGS {
            let desc = format!("({})[Ljava/lang/Object;", "Ljava/lang/Object;".repeat(args.len()));
            self.code.invokestatic(consts::ARRAY_UTIL, "createArray", &desc)?;
            self.stack
                .replace_n(&self.code, JvmType::array_of(JvmType::object()), args.len())?;
            return Ok(None);
        }
        Ok(Some(args.len()))
    }

    pub(crate) fn visit_boxed(&mut self, expr: &Expr) -> Result<()> {
        self.visit_expr(expr)?;
        self.stack.box_top(&mut self.code)?;
        Ok(())
    }

    /// `new Object[] { args... }` with every element boxed
    pub(crate) fn build_object_array(&mut self, args: &[Expr]) -> Result<()> {
        let len = i32::try_from(args.len()).map_err(|_| self.internal("argument list too long"))?;
        self.code.push_int(len)?;
        self.code.type_insn(ANEWARRAY, consts::OBJECT)?;
        self.stack.push(JvmType::array_of(JvmType::object()));
        for (i, arg) in args.iter().enumerate() {
            self.stack.dup(&mut self.code)?;
            self.code.push_int(i as i32)?;
            self.stack.push(JvmType::Int);
            self.visit_boxed(arg)?;
            self.code.emitop(AASTORE)?;
            self.stack.remove(&self.code, 3)?;
        }
        Ok(())
    }

    /// Arguments containing `*list`: the plain values, the spread values and
    /// their insertion points go to `despreadList`.
    pub(crate) fn despread_arguments(&mut self, args: &[Expr]) -> Result<()> {
        let mut normal = Vec::new();
        let mut spreads = Vec::new();
        let mut positions = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            match &arg.kind {
                crate::ast::ExprKind::Spread(inner) => {
                    positions.push((i - spreads.len()) as i32);
                    spreads.push((**inner).clone());
                }
                _ => normal.push(arg.clone()),
            }
        }
        self.build_object_array(&normal)?;
        self.build_object_array(&spreads)?;

        self.code.push_int(positions.len() as i32)?;
        self.code.new_array(&JvmType::Int)?;
        self.stack.push(JvmType::array_of(JvmType::Int));
        for (i, position) in positions.iter().enumerate() {
            self.code.emitop(DUP)?;
            self.code.push_int(i as i32)?;
            self.code.push_int(*position)?;
            self.code.emitop(IASTORE)?;
        }
        self.code.invokestatic(
            consts::SCRIPT_BYTECODE_ADAPTER,
            "despreadList",
            "([Ljava/lang/Object;[Ljava/lang/Object;[I)[Ljava/lang/Object;",
        )?;
        self.stack.replace_n(&self.code, JvmType::array_of(JvmType::object()), 3)
    }

    /// Complete dispatch through a call site; leaves one Object.
    pub(crate) fn make_call_site(
        &mut self,
        id: NodeId,
        receiver: SiteReceiver<'_>,
        message: &str,
        args: &[Expr],
        kind: CallKind,
    ) -> Result<()> {
        let mark = self.prepare_site_and_receiver(id, message, receiver)?;
        let arguments = self.push_call_arguments(args)?;

        let desc = format!(
            "({}{})Ljava/lang/Object;",
            kind.receiver_descriptor(),
            argument_descriptor(arguments)
        );
        self.code.invokeinterface(consts::CALL_SITE, kind.method(), &desc)?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }

    /// `new T(args)` through the constructor call site
    pub(crate) fn make_constructor_call(&mut self, id: NodeId, ty: &JvmType, args: &[Expr]) -> Result<()> {
        self.make_call_site(
            id,
            SiteReceiver::Class(ty),
            consts::CONSTRUCTOR_MESSAGE,
            args,
            CallKind::Constructor,
        )
    }

    /// Property read through a call site
    pub(crate) fn make_get_property_site(
        &mut self,
        id: NodeId,
        receiver: SiteReceiver<'_>,
        name: &str,
        safe: bool,
        this_receiver: bool,
    ) -> Result<()> {
        let mark = self.prepare_site_and_receiver(id, name, receiver)?;
        let method = if safe {
            "callGetPropertySafe"
        } else if this_receiver {
            "callGroovyObjectGetProperty"
        } else {
            "callGetProperty"
        };
        self.code.invokeinterface(consts::CALL_SITE, method, "(Ljava/lang/Object;)Ljava/lang/Object;")?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }

    /// `receiver.message(arg)` for operator fallbacks. `left` and `right`
    /// are visited in order and boxed.
    pub(crate) fn make_single_argument_call(
        &mut self,
        id: NodeId,
        receiver: &Expr,
        message: &str,
        arg: &Expr,
        safe: bool,
    ) -> Result<()> {
        let mark = self.stack.len();
        self.prepare_call_site(id, message)?;
        self.visit_boxed(receiver)?;
        self.visit_boxed(arg)?;
        let method = if safe { "callSafe" } else { "call" };
        self.code.invokeinterface(
            consts::CALL_SITE,
            method,
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
        )?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }

    /// Dispatch `message` on the value already on top of the stack, with an
    /// optional boxed argument.
    pub(crate) fn make_call_on_stacked(&mut self, id: NodeId, message: &str, arg: Option<&Expr>) -> Result<()> {
        self.stack.box_top(&mut self.code)?;
        let mark = self.prepare_site_and_receiver(id, message, SiteReceiver::Stacked)?;
        if let Some(arg) = arg {
            self.visit_boxed(arg)?;
        }
        let desc = format!(
            "({}{})Ljava/lang/Object;",
            CallKind::Call.receiver_descriptor(),
            argument_descriptor(Some(usize::from(arg.is_some())))
        );
        self.code.invokeinterface(consts::CALL_SITE, CallKind::Call.method(), &desc)?;
        let n = self.stack.len() - mark;
        self.stack.replace_n(&self.code, JvmType::object(), n)
    }
}

/// Declare the cache field and generate `$createCallSiteArray_N`,
/// `$createCallSiteArray` and `$getCallSiteArray` for `names`.
pub fn generate_call_site_array(cw: &mut ClassWriter, names: &[String], config: &Config) -> Result<()> {
    let class = cw.name().to_string();
    let private_static = ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC;
    cw.add_field(private_static, consts::CALL_SITE_ARRAY_FIELD, consts::SOFT_REFERENCE_DESC)?;

    // 1. chunks filling the name array
    let mut chunk_methods = Vec::new();
    for (n, chunk) in names.chunks(config.max_call_sites_per_method).enumerate() {
        let method = format!("{}{}", consts::CREATE_CALL_SITE_ARRAY_CHUNK, n + 1);
        let base = n * config.max_call_sites_per_method;
        let body = {
            let mut code = Code::new(cw.pool(), &class, &method, false);
            for (offset, name) in chunk.iter().enumerate() {
                code.load_local(&JvmType::object(), 0)?;
                code.push_int((base + offset) as i32)?;
                code.push_string(name)?;
                code.emitop(AASTORE)?;
            }
            code.emitop(RETURN)?;
            code.finish(1)?
        };
        cw.add_method(private_static, &method, consts::CREATE_CALL_SITE_ARRAY_CHUNK_DESC, Some(&body))?;
        chunk_methods.push(method);
    }

    // 2. the array itself
    let body = {
        let mut code = Code::new(cw.pool(), &class, consts::CREATE_CALL_SITE_ARRAY, false);
        code.push_int(names.len() as i32)?;
        code.type_insn(ANEWARRAY, consts::STRING)?;
        code.store_local(&JvmType::object(), 0)?;
        for method in &chunk_methods {
            code.load_local(&JvmType::object(), 0)?;
            code.invokestatic(&class, method, consts::CREATE_CALL_SITE_ARRAY_CHUNK_DESC)?;
        }
        code.type_insn(NEW, consts::CALL_SITE_ARRAY)?;
        code.emitop(DUP)?;
        code.push_class(&class)?;
        code.load_local(&JvmType::object(), 0)?;
        code.invokespecial(consts::CALL_SITE_ARRAY, "<init>", consts::CALL_SITE_ARRAY_CTOR_DESC)?;
        code.emitop(ARETURN)?;
        code.finish(1)?
    };
    cw.add_method(private_static, consts::CREATE_CALL_SITE_ARRAY, consts::CREATE_CALL_SITE_ARRAY_DESC, Some(&body))?;

    // 3. lazy fetch through the soft reference; racing rebuilds are harmless
    let body = {
        let mut code = Code::new(cw.pool(), &class, consts::GET_CALL_SITE_ARRAY, false);
        let create = code.new_label();
        let done = code.new_label();
        code.field_insn(GETSTATIC, &class, consts::CALL_SITE_ARRAY_FIELD, consts::SOFT_REFERENCE_DESC)?;
        code.jump(IFNULL, create)?;
        code.field_insn(GETSTATIC, &class, consts::CALL_SITE_ARRAY_FIELD, consts::SOFT_REFERENCE_DESC)?;
        code.invokevirtual(consts::SOFT_REFERENCE, "get", "()Ljava/lang/Object;")?;
        code.type_insn(CHECKCAST, consts::CALL_SITE_ARRAY)?;
        code.emitop(DUP)?;
        code.store_local(&JvmType::object(), 0)?;
        code.jump(IFNONNULL, done)?;
        code.mark(create)?;
        code.invokestatic(&class, consts::CREATE_CALL_SITE_ARRAY, consts::CREATE_CALL_SITE_ARRAY_DESC)?;
        code.store_local(&JvmType::object(), 0)?;
        code.type_insn(NEW, consts::SOFT_REFERENCE)?;
        code.emitop(DUP)?;
        code.load_local(&JvmType::object(), 0)?;
        code.invokespecial(consts::SOFT_REFERENCE, "<init>", "(Ljava/lang/Object;)V")?;
        code.field_insn(PUTSTATIC, &class, consts::CALL_SITE_ARRAY_FIELD, consts::SOFT_REFERENCE_DESC)?;
        code.mark(done)?;
        code.load_local(&JvmType::object(), 0)?;
        code.field_insn(
            GETFIELD,
            consts::CALL_SITE_ARRAY,
            "array",
            &site_array_type().descriptor(),
        )?;
        code.emitop(ARETURN)?;
        code.finish(1)?
    };
    cw.add_method(private_static, consts::GET_CALL_SITE_ARRAY, consts::GET_CALL_SITE_ARRAY_DESC, Some(&body))
}
