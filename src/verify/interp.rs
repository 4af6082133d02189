//! A small evaluator for generated method bodies
//!
//! Methods and fields of the class under test run in-process. Everything
//! owned by another class (runtime helpers, call sites, boxing) is
//! delegated to a [`Host`]. Values on the operand stack are kept one entry
//! per value; the category-2 aware stack instructions count slots.
//! Exception handlers are never entered: a throw ends evaluation with
//! [`VerifyError::Thrown`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use super::insn::{decode, Arg, Insn};
use super::reader::{ClassReader, MemberRef, MethodEntry, PoolEntry};
use super::{VerifyError, VerifyResult};
use crate::codegen::descriptor;
use crate::codegen::opcodes::*;
use crate::consts;

/// An instance of the class under evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: String,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Str(Rc<str>),
    /// A class literal, by internal name
    Class(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Instance>>),
    /// An object owned by the host, by handle
    Host(u32),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn is_category2(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    fn slots(&self) -> usize {
        if self.is_category2() {
            2
        } else {
            1
        }
    }

    /// Zero value of a field descriptor
    pub fn default_for(desc: &str) -> Self {
        match desc.as_bytes().first() {
            Some(b'J') => Value::Long(0),
            Some(b'F') => Value::Float(0.0),
            Some(b'D') => Value::Double(0.0),
            Some(b'L') | Some(b'[') => Value::Null,
            _ => Value::Int(0),
        }
    }

    fn default_for_array_type(code: u8) -> Self {
        match code {
            T_LONG => Value::Long(0),
            T_FLOAT => Value::Float(0.0),
            T_DOUBLE => Value::Double(0.0),
            _ => Value::Int(0),
        }
    }

    pub fn as_int(&self) -> VerifyResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(type_error("int", other)),
        }
    }

    pub fn as_long(&self) -> VerifyResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(type_error("long", other)),
        }
    }

    pub fn as_float(&self) -> VerifyResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(type_error("float", other)),
        }
    }

    pub fn as_double(&self) -> VerifyResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(type_error("double", other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reference identity as `if_acmpeq` sees it
    fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a == b,
            _ => false,
        }
    }
}

fn type_error(expected: &str, found: &Value) -> VerifyError {
    VerifyError::Eval(format!("expected {expected}, found {found:?}"))
}

fn thrown(class: &str) -> VerifyError {
    VerifyError::Thrown(class.to_string())
}

/// The runtime the evaluated class links against
pub trait Host {
    /// A method of a class other than the one under evaluation.
    /// `receiver` is `None` for static calls.
    fn invoke(&mut self, member: &MemberRef, receiver: Option<&Value>, args: &[Value]) -> VerifyResult<Option<Value>>;

    /// Allocate an uninitialized object of a foreign class
    fn new_object(&mut self, class: &str) -> VerifyResult<Value> {
        Err(VerifyError::Host(format!("cannot instantiate {class}")))
    }

    fn get_field(&mut self, object: Option<&Value>, member: &MemberRef) -> VerifyResult<Value> {
        let _ = object;
        Err(VerifyError::Host(format!("no field {member}")))
    }

    fn put_field(&mut self, object: Option<&Value>, member: &MemberRef, value: Value) -> VerifyResult<()> {
        let _ = (object, value);
        Err(VerifyError::Host(format!("no field {member}")))
    }

    fn instance_of(&mut self, value: &Value, class: &str) -> bool {
        let _ = (value, class);
        false
    }
}

struct Frame {
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn pop(&mut self) -> VerifyResult<Value> {
        self.stack.pop().ok_or_else(|| VerifyError::Eval("operand stack underflow".into()))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop_int(&mut self) -> VerifyResult<i32> {
        self.pop()?.as_int()
    }

    fn pop_long(&mut self) -> VerifyResult<i64> {
        self.pop()?.as_long()
    }

    fn pop_float(&mut self) -> VerifyResult<f32> {
        self.pop()?.as_float()
    }

    fn pop_double(&mut self) -> VerifyResult<f64> {
        self.pop()?.as_double()
    }

    /// Pop values covering exactly `slots` slots, bottom-most first
    fn take_slots(&mut self, slots: usize) -> VerifyResult<Vec<Value>> {
        let mut taken = Vec::new();
        let mut count = 0;
        while count < slots {
            let value = self.pop()?;
            count += value.slots();
            taken.push(value);
        }
        if count != slots {
            return Err(VerifyError::Eval("stack instruction splits a category-2 value".into()));
        }
        taken.reverse();
        Ok(taken)
    }

    fn push_all(&mut self, values: &[Value]) {
        self.stack.extend(values.iter().cloned());
    }

    fn load(&self, index: u16) -> VerifyResult<Value> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VerifyError::Eval(format!("local {index} out of range")))
    }

    fn store(&mut self, index: u16, value: Value) -> VerifyResult<()> {
        let index = index as usize;
        let width = value.slots();
        if index + width > self.locals.len() {
            return Err(VerifyError::Eval(format!("local {index} out of range")));
        }
        if width == 2 {
            self.locals[index + 1] = Value::Null;
        }
        self.locals[index] = value;
        Ok(())
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

/// Executes methods of one parsed class
pub struct Evaluator<'c, H: Host> {
    class: &'c ClassReader,
    host: H,
    statics: HashMap<String, Value>,
    initialized: bool,
    steps: usize,
}

impl<'c, H: Host> Evaluator<'c, H> {
    pub fn new(class: &'c ClassReader, host: H) -> Self {
        Self { class, host, statics: HashMap::new(), initialized: false, steps: 0 }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Run `<clinit>` once, before the first call into the class
    fn ensure_initialized(&mut self) -> VerifyResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        if let Some(clinit) = self.class.method_by("<clinit>", "()V") {
            self.run(clinit, Vec::new())?;
        }
        Ok(())
    }

    fn find(&self, name: &str, desc: &str) -> VerifyResult<&'c MethodEntry> {
        self.class
            .method_by(name, desc)
            .ok_or_else(|| VerifyError::Eval(format!("no method {}.{}{}", self.class.name, name, desc)))
    }

    pub fn invoke_static(&mut self, name: &str, desc: &str, args: Vec<Value>) -> VerifyResult<Option<Value>> {
        self.ensure_initialized()?;
        let method = self.find(name, desc)?;
        self.run(method, args)
    }

    pub fn invoke_virtual(
        &mut self,
        receiver: Value,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> VerifyResult<Option<Value>> {
        self.ensure_initialized()?;
        let method = self.find(name, desc)?;
        let mut all = vec![receiver];
        all.extend(args);
        self.run(method, all)
    }

    /// Allocate an instance and run the constructor with descriptor `desc`
    pub fn new_instance(&mut self, desc: &str, args: Vec<Value>) -> VerifyResult<Value> {
        self.ensure_initialized()?;
        let object = self.allocate();
        self.invoke_virtual(object.clone(), "<init>", desc, args)?;
        Ok(object)
    }

    fn allocate(&self) -> Value {
        Value::Object(Rc::new(RefCell::new(Instance { class: self.class.name.clone(), fields: HashMap::new() })))
    }

    fn run(&mut self, method: &'c MethodEntry, args: Vec<Value>) -> VerifyResult<Option<Value>> {
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| VerifyError::Eval(format!("{} has no code", method.name)))?;
        trace!("eval {}.{}{}", self.class.name, method.name, method.descriptor);
        let insns = decode(&code.code)?;
        let index_of: HashMap<usize, usize> = insns.iter().enumerate().map(|(i, insn)| (insn.pc, i)).collect();

        let mut frame = Frame { locals: vec![Value::Null; code.max_locals as usize], stack: Vec::new() };
        let mut slot = 0u16;
        for arg in args {
            let width = arg.slots() as u16;
            frame.store(slot, arg)?;
            slot += width;
        }

        let mut index = 0usize;
        loop {
            self.steps += 1;
            if self.steps > consts::EVAL_MAX_STEPS {
                return Err(VerifyError::Eval("step limit exceeded".into()));
            }
            let insn = insns
                .get(index)
                .ok_or_else(|| VerifyError::Eval(format!("{} ran off the end", method.name)))?;
            match self.step(&mut frame, insn)? {
                Flow::Next => index += 1,
                Flow::Jump(pc) => {
                    index = *index_of
                        .get(&pc)
                        .ok_or(VerifyError::BadJumpTarget { pc: insn.pc, target: pc as i64 })?;
                }
                Flow::Return(value) => return Ok(value),
            }
        }
    }

    fn constant(&self, index: u16) -> VerifyResult<Value> {
        Ok(match self.class.constant(index)? {
            PoolEntry::Integer(v) => Value::Int(*v),
            PoolEntry::Float(v) => Value::Float(*v),
            PoolEntry::Long(v) => Value::Long(*v),
            PoolEntry::Double(v) => Value::Double(*v),
            PoolEntry::String(s) => Value::str(self.class.utf8(*s)?),
            PoolEntry::Class(_) => Value::Class(Rc::from(self.class.class_name(index)?)),
            _ => return Err(VerifyError::BadConstant { index, expected: "loadable constant" }),
        })
    }

    fn pool_index(insn: &Insn) -> VerifyResult<u16> {
        match insn.arg {
            Arg::Pool(i) | Arg::Invokeinterface { index: i, .. } | Arg::MultiANewArray { index: i, .. } => Ok(i),
            _ => Err(VerifyError::BadOpcode { pc: insn.pc, op: insn.op }),
        }
    }

    fn local_arg(insn: &Insn) -> VerifyResult<u16> {
        insn.local_index().ok_or(VerifyError::BadOpcode { pc: insn.pc, op: insn.op })
    }

    fn jump_arg(insn: &Insn) -> VerifyResult<usize> {
        match insn.arg {
            Arg::Jump(t) => Ok(t),
            _ => Err(VerifyError::BadOpcode { pc: insn.pc, op: insn.op }),
        }
    }

    fn step(&mut self, frame: &mut Frame, insn: &Insn) -> VerifyResult<Flow> {
        let op = insn.op;
        match op {
            NOP => {}
            ACONST_NULL => frame.push(Value::Null),
            ICONST_M1..=ICONST_5 => frame.push(Value::Int(op as i32 - ICONST_0 as i32)),
            LCONST_0 | LCONST_1 => frame.push(Value::Long((op - LCONST_0) as i64)),
            FCONST_0..=FCONST_2 => frame.push(Value::Float((op - FCONST_0) as f32)),
            DCONST_0 | DCONST_1 => frame.push(Value::Double((op - DCONST_0) as f64)),
            BIPUSH | SIPUSH => match insn.arg {
                Arg::Int(v) => frame.push(Value::Int(v)),
                _ => return Err(VerifyError::BadOpcode { pc: insn.pc, op }),
            },
            LDC | LDC_W | LDC2_W => {
                let value = self.constant(Self::pool_index(insn)?)?;
                frame.push(value);
            }
            ILOAD..=ALOAD | ILOAD_0..=ALOAD_3 => {
                let value = frame.load(Self::local_arg(insn)?)?;
                frame.push(value);
            }
            ISTORE..=ASTORE | ISTORE_0..=ASTORE_3 => {
                let value = frame.pop()?;
                frame.store(Self::local_arg(insn)?, value)?;
            }
            IALOAD..=SALOAD => {
                let index = frame.pop_int()?;
                let array = frame.pop()?;
                frame.push(array_load(&array, index)?);
            }
            IASTORE..=SASTORE => {
                let value = frame.pop()?;
                let index = frame.pop_int()?;
                let array = frame.pop()?;
                let value = match (op, value) {
                    (BASTORE, Value::Int(v)) => Value::Int(v as i8 as i32),
                    (CASTORE, Value::Int(v)) => Value::Int(v as u16 as i32),
                    (SASTORE, Value::Int(v)) => Value::Int(v as i16 as i32),
                    (_, v) => v,
                };
                array_store(&array, index, value)?;
            }
            POP => {
                frame.take_slots(1)?;
            }
            POP2 => {
                frame.take_slots(2)?;
            }
            DUP | DUP2 => {
                let top = frame.take_slots(if op == DUP { 1 } else { 2 })?;
                frame.push_all(&top);
                frame.push_all(&top);
            }
            DUP_X1 | DUP_X2 | DUP2_X1 | DUP2_X2 => {
                let (top, under) = match op {
                    DUP_X1 => (1, 1),
                    DUP_X2 => (1, 2),
                    DUP2_X1 => (2, 1),
                    _ => (2, 2),
                };
                let top = frame.take_slots(top)?;
                let under = frame.take_slots(under)?;
                frame.push_all(&top);
                frame.push_all(&under);
                frame.push_all(&top);
            }
            SWAP => {
                let a = frame.take_slots(1)?;
                let b = frame.take_slots(1)?;
                frame.push_all(&a);
                frame.push_all(&b);
            }
            IADD..=DREM | INEG..=LXOR => arithmetic(frame, op)?,
            IINC => match insn.arg {
                Arg::Iinc { index, delta } => {
                    let value = frame.load(index)?.as_int()?;
                    frame.store(index, Value::Int(value.wrapping_add(delta as i32)))?;
                }
                _ => return Err(VerifyError::BadOpcode { pc: insn.pc, op }),
            },
            I2L..=I2S => convert(frame, op)?,
            LCMP => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                frame.push(Value::Int(a.cmp(&b) as i32));
            }
            FCMPL | FCMPG => {
                let b = frame.pop_float()? as f64;
                let a = frame.pop_float()? as f64;
                frame.push(Value::Int(float_compare(a, b, op == FCMPG)));
            }
            DCMPL | DCMPG => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                frame.push(Value::Int(float_compare(a, b, op == DCMPG)));
            }
            IFEQ..=IFLE => {
                let v = frame.pop_int()?;
                let taken = match op {
                    IFEQ => v == 0,
                    IFNE => v != 0,
                    IFLT => v < 0,
                    IFGE => v >= 0,
                    IFGT => v > 0,
                    _ => v <= 0,
                };
                return branch(insn, taken);
            }
            IF_ICMPEQ..=IF_ICMPLE => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                let taken = match op {
                    IF_ICMPEQ => a == b,
                    IF_ICMPNE => a != b,
                    IF_ICMPLT => a < b,
                    IF_ICMPGE => a >= b,
                    IF_ICMPGT => a > b,
                    _ => a <= b,
                };
                return branch(insn, taken);
            }
            IF_ACMPEQ | IF_ACMPNE => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                return branch(insn, a.same(&b) == (op == IF_ACMPEQ));
            }
            IFNULL | IFNONNULL => {
                let v = frame.pop()?;
                return branch(insn, v.is_null() == (op == IFNULL));
            }
            GOTO | GOTO_W => return Ok(Flow::Jump(Self::jump_arg(insn)?)),
            TABLESWITCH | LOOKUPSWITCH => {
                let key = frame.pop_int()?;
                return match &insn.arg {
                    Arg::Switch { default, cases } => {
                        let target = cases.iter().find(|(k, _)| *k == key).map(|(_, t)| *t).unwrap_or(*default);
                        Ok(Flow::Jump(target))
                    }
                    _ => Err(VerifyError::BadOpcode { pc: insn.pc, op }),
                };
            }
            IRETURN..=ARETURN => return Ok(Flow::Return(Some(frame.pop()?))),
            RETURN => return Ok(Flow::Return(None)),
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
                let member = self.class.member_ref(Self::pool_index(insn)?)?;
                self.field_access(frame, op, &member)?;
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                let member = self.class.member_ref(Self::pool_index(insn)?)?;
                self.invoke(frame, op, &member)?;
            }
            NEW => {
                let class = self.class.class_name(Self::pool_index(insn)?)?;
                let object = if class == self.class.name { self.allocate() } else { self.host.new_object(class)? };
                frame.push(object);
            }
            NEWARRAY => {
                let count = array_count(frame.pop_int()?)?;
                let fill = match insn.arg {
                    Arg::ArrayType(t) => Value::default_for_array_type(t),
                    _ => return Err(VerifyError::BadOpcode { pc: insn.pc, op }),
                };
                frame.push(Value::array(vec![fill; count]));
            }
            ANEWARRAY => {
                let count = array_count(frame.pop_int()?)?;
                frame.push(Value::array(vec![Value::Null; count]));
            }
            MULTIANEWARRAY => {
                let (index, dims) = match insn.arg {
                    Arg::MultiANewArray { index, dims } => (index, dims as usize),
                    _ => return Err(VerifyError::BadOpcode { pc: insn.pc, op }),
                };
                let desc = self.class.class_name(index)?.to_string();
                let mut counts = Vec::with_capacity(dims);
                for _ in 0..dims {
                    counts.push(array_count(frame.pop_int()?)?);
                }
                counts.reverse();
                frame.push(multi_array(&desc, &counts));
            }
            ARRAYLENGTH => match frame.pop()? {
                Value::Array(values) => frame.push(Value::Int(values.borrow().len() as i32)),
                Value::Null => return Err(thrown("java/lang/NullPointerException")),
                other => return Err(type_error("array", &other)),
            },
            ATHROW => {
                let value = frame.pop()?;
                return Err(VerifyError::Thrown(format!("{value:?}")));
            }
            CHECKCAST => {}
            INSTANCEOF => {
                let class = self.class.class_name(Self::pool_index(insn)?)?;
                let value = frame.pop()?;
                let result = match &value {
                    Value::Null => false,
                    Value::Object(o) => o.borrow().class == class || class == consts::OBJECT,
                    Value::Str(_) => class == consts::STRING || class == consts::OBJECT,
                    Value::Class(_) => class == consts::CLASS || class == consts::OBJECT,
                    Value::Array(_) => class.starts_with('[') || class == consts::OBJECT,
                    _ => self.host.instance_of(&value, class),
                };
                frame.push(Value::Int(result as i32));
            }
            MONITORENTER | MONITOREXIT => {
                frame.pop()?;
            }
            _ => return Err(VerifyError::Eval(format!("unsupported instruction {} at pc {}", insn.name(), insn.pc))),
        }
        Ok(Flow::Next)
    }

    fn field_access(&mut self, frame: &mut Frame, op: u8, member: &MemberRef) -> VerifyResult<()> {
        let own = member.owner == self.class.name;
        match op {
            GETSTATIC if own => {
                let value = self
                    .statics
                    .get(&member.name)
                    .cloned()
                    .unwrap_or_else(|| Value::default_for(&member.descriptor));
                frame.push(value);
            }
            GETSTATIC => {
                let value = self.host.get_field(None, member)?;
                frame.push(value);
            }
            PUTSTATIC => {
                let value = frame.pop()?;
                if own {
                    self.statics.insert(member.name.clone(), value);
                } else {
                    self.host.put_field(None, member, value)?;
                }
            }
            GETFIELD => {
                let object = frame.pop()?;
                let value = match &object {
                    Value::Object(o) => o
                        .borrow()
                        .fields
                        .get(&member.name)
                        .cloned()
                        .unwrap_or_else(|| Value::default_for(&member.descriptor)),
                    Value::Null => return Err(thrown("java/lang/NullPointerException")),
                    _ => self.host.get_field(Some(&object), member)?,
                };
                frame.push(value);
            }
            _ => {
                let value = frame.pop()?;
                let object = frame.pop()?;
                match &object {
                    Value::Object(o) => {
                        o.borrow_mut().fields.insert(member.name.clone(), value);
                    }
                    Value::Null => return Err(thrown("java/lang/NullPointerException")),
                    _ => self.host.put_field(Some(&object), member, value)?,
                }
            }
        }
        Ok(())
    }

    fn invoke(&mut self, frame: &mut Frame, op: u8, member: &MemberRef) -> VerifyResult<()> {
        let (params, _) = descriptor::split_method_descriptor(&member.descriptor)
            .ok_or_else(|| VerifyError::BadDescriptor(member.descriptor.clone()))?;
        let mut args = Vec::with_capacity(params.len());
        for _ in 0..params.len() {
            args.push(frame.pop()?);
        }
        args.reverse();
        let receiver = if op == INVOKESTATIC { None } else { Some(frame.pop()?) };

        let own_receiver = match &receiver {
            None => member.owner == self.class.name,
            Some(Value::Object(o)) => o.borrow().class == self.class.name,
            Some(_) => false,
        };
        let result = if own_receiver && self.class.method_by(&member.name, &member.descriptor).is_some()
            && (op != INVOKESPECIAL || member.owner == self.class.name)
        {
            let method = self.find(&member.name, &member.descriptor)?;
            let mut all = Vec::with_capacity(args.len() + 1);
            all.extend(receiver);
            all.extend(args);
            self.run(method, all)?
        } else if op == INVOKESPECIAL && member.name == "<init>" && member.owner == consts::OBJECT {
            None
        } else {
            if let Some(Value::Null) = receiver {
                return Err(thrown("java/lang/NullPointerException"));
            }
            self.host.invoke(member, receiver.as_ref(), &args)?
        };

        let returns = descriptor::return_slots(&member.descriptor).unwrap_or(0);
        match (returns, result) {
            (0, _) => {}
            (_, Some(value)) => frame.push(value),
            (_, None) => return Err(VerifyError::Host(format!("{member} returned no value"))),
        }
        Ok(())
    }
}

fn branch(insn: &Insn, taken: bool) -> VerifyResult<Flow> {
    match (taken, &insn.arg) {
        (false, _) => Ok(Flow::Next),
        (true, Arg::Jump(t)) => Ok(Flow::Jump(*t)),
        _ => Err(VerifyError::BadOpcode { pc: insn.pc, op: insn.op }),
    }
}

fn array_count(count: i32) -> VerifyResult<usize> {
    usize::try_from(count).map_err(|_| thrown("java/lang/NegativeArraySizeException"))
}

fn multi_array(desc: &str, counts: &[usize]) -> Value {
    let component = desc.strip_prefix('[').unwrap_or(desc);
    match counts.split_first() {
        None => Value::Null,
        Some((&n, [])) => Value::array(vec![Value::default_for(component); n]),
        Some((&n, rest)) => Value::array((0..n).map(|_| multi_array(component, rest)).collect()),
    }
}

fn checked_index(len: usize, index: i32) -> VerifyResult<usize> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(thrown("java/lang/ArrayIndexOutOfBoundsException")),
    }
}

fn array_load(array: &Value, index: i32) -> VerifyResult<Value> {
    match array {
        Value::Array(values) => {
            let values = values.borrow();
            let i = checked_index(values.len(), index)?;
            Ok(values[i].clone())
        }
        Value::Null => Err(thrown("java/lang/NullPointerException")),
        other => Err(type_error("array", other)),
    }
}

fn array_store(array: &Value, index: i32, value: Value) -> VerifyResult<()> {
    match array {
        Value::Array(values) => {
            let mut values = values.borrow_mut();
            let i = checked_index(values.len(), index)?;
            values[i] = value;
            Ok(())
        }
        Value::Null => Err(thrown("java/lang/NullPointerException")),
        other => Err(type_error("array", other)),
    }
}

/// `fcmpl`/`dcmpl` push -1 on NaN, the `g` forms push 1
fn float_compare(a: f64, b: f64, nan_greater: bool) -> i32 {
    match a.partial_cmp(&b) {
        Some(ordering) => ordering as i32,
        None if nan_greater => 1,
        None => -1,
    }
}

fn arithmetic(frame: &mut Frame, op: u8) -> VerifyResult<()> {
    let value = match op {
        IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            Value::Int(match op {
                IADD => a.wrapping_add(b),
                ISUB => a.wrapping_sub(b),
                IMUL => a.wrapping_mul(b),
                IDIV | IREM if b == 0 => return Err(thrown("java/lang/ArithmeticException")),
                IDIV => a.wrapping_div(b),
                IREM => a.wrapping_rem(b),
                ISHL => a.wrapping_shl(b as u32),
                ISHR => a.wrapping_shr(b as u32),
                IUSHR => ((a as u32).wrapping_shr(b as u32)) as i32,
                IAND => a & b,
                IOR => a | b,
                _ => a ^ b,
            })
        }
        LSHL | LSHR | LUSHR => {
            let b = frame.pop_int()?;
            let a = frame.pop_long()?;
            Value::Long(match op {
                LSHL => a.wrapping_shl(b as u32),
                LSHR => a.wrapping_shr(b as u32),
                _ => ((a as u64).wrapping_shr(b as u32)) as i64,
            })
        }
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            Value::Long(match op {
                LADD => a.wrapping_add(b),
                LSUB => a.wrapping_sub(b),
                LMUL => a.wrapping_mul(b),
                LDIV | LREM if b == 0 => return Err(thrown("java/lang/ArithmeticException")),
                LDIV => a.wrapping_div(b),
                LREM => a.wrapping_rem(b),
                LAND => a & b,
                LOR => a | b,
                _ => a ^ b,
            })
        }
        FADD | FSUB | FMUL | FDIV | FREM => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            Value::Float(match op {
                FADD => a + b,
                FSUB => a - b,
                FMUL => a * b,
                FDIV => a / b,
                _ => a % b,
            })
        }
        DADD | DSUB | DMUL | DDIV | DREM => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            Value::Double(match op {
                DADD => a + b,
                DSUB => a - b,
                DMUL => a * b,
                DDIV => a / b,
                _ => a % b,
            })
        }
        INEG => Value::Int(frame.pop_int()?.wrapping_neg()),
        LNEG => Value::Long(frame.pop_long()?.wrapping_neg()),
        FNEG => Value::Float(-frame.pop_float()?),
        DNEG => Value::Double(-frame.pop_double()?),
        _ => return Err(VerifyError::Eval(format!("not an arithmetic opcode {op:#04x}"))),
    };
    frame.push(value);
    Ok(())
}

fn convert(frame: &mut Frame, op: u8) -> VerifyResult<()> {
    let value = frame.pop()?;
    let converted = match (op, &value) {
        (I2L, Value::Int(v)) => Value::Long(*v as i64),
        (I2F, Value::Int(v)) => Value::Float(*v as f32),
        (I2D, Value::Int(v)) => Value::Double(*v as f64),
        (L2I, Value::Long(v)) => Value::Int(*v as i32),
        (L2F, Value::Long(v)) => Value::Float(*v as f32),
        (L2D, Value::Long(v)) => Value::Double(*v as f64),
        (F2I, Value::Float(v)) => Value::Int(*v as i32),
        (F2L, Value::Float(v)) => Value::Long(*v as i64),
        (F2D, Value::Float(v)) => Value::Double(*v as f64),
        (D2I, Value::Double(v)) => Value::Int(*v as i32),
        (D2L, Value::Double(v)) => Value::Long(*v as i64),
        (D2F, Value::Double(v)) => Value::Float(*v as f32),
        (I2B, Value::Int(v)) => Value::Int(*v as i8 as i32),
        (I2C, Value::Int(v)) => Value::Int(*v as u16 as i32),
        (I2S, Value::Int(v)) => Value::Int(*v as i16 as i32),
        _ => return Err(type_error(opcode_name(op).unwrap_or("conversion"), &value)),
    };
    frame.push(converted);
    Ok(())
}
