// Common test utilities
#![allow(dead_code)]

use std::collections::HashMap;

use gbc::ast::build::*;
use gbc::ast::{BinaryOp, ClassNode, JvmType, MethodNode};
use gbc::verify::{self, disassemble, ClassReader, Host, MemberRef, Value, VerifyError, VerifyResult};
use gbc::{compile_class, CompiledClass, Config};

pub const CALL_SITE: &str = "org/codehaus/groovy/runtime/callsite/CallSite";
pub const CALL_SITE_ARRAY: &str = "org/codehaus/groovy/runtime/callsite/CallSiteArray";
pub const SOFT_REFERENCE: &str = "java/lang/ref/SoftReference";
pub const META_CLASS: &str = "groovy/lang/MetaClass";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A class named `demo/Calc` holding `methods`
pub fn class_with(methods: Vec<MethodNode>) -> ClassNode {
    let mut class = ClassNode::new("demo/Calc");
    class.methods = methods;
    class
}

/// `static int <name>(int a, int b) { return a <op> b }`
pub fn int_binary_method(name: &str, op: BinaryOp) -> MethodNode {
    static_method(
        name,
        vec![param("a", JvmType::Int), param("b", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(binary(op, var("a"), var("b")))]),
    )
}

pub fn compile(class: &ClassNode) -> CompiledClass {
    compile_with(class, &Config::default())
}

pub fn compile_with(class: &ClassNode, config: &Config) -> CompiledClass {
    init_logging();
    let compiled = compile_class(class, config).expect("class compiles");
    verify::verify_class(&compiled.bytes).expect("generated class verifies");
    compiled
}

pub fn read(compiled: &CompiledClass) -> ClassReader {
    ClassReader::parse(&compiled.bytes).expect("class parses")
}

/// Listing of the first method called `name`
pub fn listing(compiled: &CompiledClass, name: &str) -> String {
    let class = read(compiled);
    let method = class.method(name).unwrap_or_else(|| panic!("no method {name}"));
    disassemble(&class, method).expect("method disassembles")
}

pub fn count(listing: &str, needle: &str) -> usize {
    listing.matches(needle).count()
}

#[derive(Debug, Clone)]
enum HostObject {
    SiteArray(Vec<String>),
    SoftReference(Value),
    Site(String),
    MetaClass,
    /// Remaining elements and the position of the next one
    Iterator(Vec<Value>, usize),
}

/// Stands in for the runtime library. Boxed numbers are the primitive
/// values themselves; call sites apply int, long and double arithmetic by
/// message name and record every message they dispatch.
pub struct ScriptedHost {
    objects: Vec<Option<HostObject>>,
    /// Result of every `BytecodeInterface8.isOrigX()` guard
    pub original_meta_classes: bool,
    pub messages: Vec<String>,
    pub statics: HashMap<String, Value>,
}

impl ScriptedHost {
    pub fn new(original_meta_classes: bool) -> Self {
        Self { objects: Vec::new(), original_meta_classes, messages: Vec::new(), statics: HashMap::new() }
    }

    pub fn fast() -> Self {
        Self::new(true)
    }

    pub fn slow() -> Self {
        Self::new(false)
    }

    fn alloc(&mut self, object: Option<HostObject>) -> Value {
        self.objects.push(object);
        Value::Host((self.objects.len() - 1) as u32)
    }

    fn object(&self, value: Option<&Value>) -> VerifyResult<(u32, Option<HostObject>)> {
        match value {
            Some(Value::Host(h)) => Ok((*h, self.objects.get(*h as usize).cloned().flatten())),
            other => Err(VerifyError::Host(format!("not a host object: {other:?}"))),
        }
    }

    fn dispatch(&mut self, message: &str, args: &[Value]) -> VerifyResult<Value> {
        self.messages.push(message.to_string());
        Ok(match (message, args) {
            ("plus", [a, b]) => arithmetic(a, b, i64::wrapping_add, |x, y| x + y)?,
            ("minus", [a, b]) => arithmetic(a, b, i64::wrapping_sub, |x, y| x - y)?,
            ("multiply", [a, b]) => arithmetic(a, b, i64::wrapping_mul, |x, y| x * y)?,
            ("mod", [a, b]) => {
                if matches!(Number::of(b)?, Number::Int(0) | Number::Long(0)) {
                    return Err(VerifyError::Thrown("java/lang/ArithmeticException".into()));
                }
                arithmetic(a, b, i64::wrapping_rem, |x, y| x % y)?
            }
            ("div" | "intdiv", [a, b]) => {
                if matches!(Number::of(b)?, Number::Int(0) | Number::Long(0)) {
                    return Err(VerifyError::Thrown("java/lang/ArithmeticException".into()));
                }
                arithmetic(a, b, i64::wrapping_div, |x, y| x / y)?
            }
            ("next", [a]) => arithmetic(a, &Value::Int(1), i64::wrapping_add, |x, y| x + y)?,
            ("previous", [a]) => arithmetic(a, &Value::Int(1), i64::wrapping_sub, |x, y| x - y)?,
            ("iterator", [Value::Array(values)]) => {
                let values = values.borrow().clone();
                self.alloc(Some(HostObject::Iterator(values, 0)))
            }
            ("getAt", [Value::Array(values), i]) => {
                let values = values.borrow();
                let index = element_index(values.len(), i.as_int()?)?;
                values[index].clone()
            }
            ("putAt", [Value::Array(values), i, value]) => {
                let mut values = values.borrow_mut();
                let index = element_index(values.len(), i.as_int()?)?;
                values[index] = value.clone();
                Value::Null
            }
            _ => return Err(VerifyError::Host(format!("no behaviour for {message}({args:?})"))),
        })
    }

    fn compare(method: &str, args: &[Value]) -> VerifyResult<Value> {
        let ordering = match args {
            [a, b] => Number::of(a)?.compare(Number::of(b)?),
            _ => return Err(VerifyError::Host(format!("{method} expects two arguments"))),
        };
        let result = match method {
            "compareEqual" | "compareIdentical" => ordering.is_eq(),
            "compareNotEqual" | "compareNotIdentical" => ordering.is_ne(),
            "compareLessThan" => ordering.is_lt(),
            "compareLessThanEqual" => ordering.is_le(),
            "compareGreaterThan" => ordering.is_gt(),
            "compareGreaterThanEqual" => ordering.is_ge(),
            "compareTo" => return Ok(Value::Int(ordering as i32)),
            _ => return Err(VerifyError::Host(format!("unknown comparison {method}"))),
        };
        Ok(Value::Int(result as i32))
    }
}

/// Boxed number as the runtime sees it
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i32),
    Long(i64),
    Double(f64),
}

impl Number {
    fn of(value: &Value) -> VerifyResult<Self> {
        match value {
            Value::Int(v) => Ok(Number::Int(*v)),
            Value::Long(v) => Ok(Number::Long(*v)),
            Value::Float(v) => Ok(Number::Double(f64::from(*v))),
            Value::Double(v) => Ok(Number::Double(*v)),
            other => Err(VerifyError::Host(format!("not a number: {other:?}"))),
        }
    }

    fn as_long(self) -> i64 {
        match self {
            Number::Int(v) => i64::from(v),
            Number::Long(v) => v,
            Number::Double(v) => v as i64,
        }
    }

    fn as_double(self) -> f64 {
        match self {
            Number::Int(v) => f64::from(v),
            Number::Long(v) => v as f64,
            Number::Double(v) => v,
        }
    }

    fn compare(self, other: Number) -> std::cmp::Ordering {
        match (self, other) {
            (Number::Double(_), _) | (_, Number::Double(_)) => {
                self.as_double().partial_cmp(&other.as_double()).unwrap_or(std::cmp::Ordering::Less)
            }
            _ => self.as_long().cmp(&other.as_long()),
        }
    }
}

/// Integer operands widen to the larger of int and long, anything with a
/// double computes in double
fn arithmetic(a: &Value, b: &Value, integral: fn(i64, i64) -> i64, floating: fn(f64, f64) -> f64) -> VerifyResult<Value> {
    Ok(match (Number::of(a)?, Number::of(b)?) {
        (Number::Int(x), Number::Int(y)) => Value::Int(integral(i64::from(x), i64::from(y)) as i32),
        (x @ Number::Double(_), y) | (x, y @ Number::Double(_)) => Value::Double(floating(x.as_double(), y.as_double())),
        (x, y) => Value::Long(integral(x.as_long(), y.as_long())),
    })
}

/// `getAt`/`putAt` count negative indexes from the end
fn element_index(len: usize, index: i32) -> VerifyResult<usize> {
    let adjusted = if index < 0 { index as i64 + len as i64 } else { index as i64 };
    usize::try_from(adjusted)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| VerifyError::Thrown("java/lang/ArrayIndexOutOfBoundsException".into()))
}

impl Host for ScriptedHost {
    fn invoke(&mut self, member: &MemberRef, receiver: Option<&Value>, args: &[Value]) -> VerifyResult<Option<Value>> {
        let owner = member.owner.as_str();
        let name = member.name.as_str();
        match (owner, name) {
            (CALL_SITE_ARRAY, "<init>") => {
                let (handle, _) = self.object(receiver)?;
                let names = match args.get(1) {
                    Some(Value::Array(values)) => values
                        .borrow()
                        .iter()
                        .map(|v| match v {
                            Value::Str(s) => s.to_string(),
                            _ => String::new(),
                        })
                        .collect(),
                    _ => return Err(VerifyError::Host("call-site names missing".into())),
                };
                self.objects[handle as usize] = Some(HostObject::SiteArray(names));
                Ok(None)
            }
            (SOFT_REFERENCE, "<init>") => {
                let (handle, _) = self.object(receiver)?;
                self.objects[handle as usize] = Some(HostObject::SoftReference(args[0].clone()));
                Ok(None)
            }
            (SOFT_REFERENCE, "get") => match self.object(receiver)? {
                (_, Some(HostObject::SoftReference(value))) => Ok(Some(value)),
                _ => Err(VerifyError::Host("not a soft reference".into())),
            },
            (CALL_SITE, _) => match self.object(receiver)? {
                // the first argument is the receiver of the dynamic call
                (_, Some(HostObject::Site(message))) => self.dispatch(&message, args).map(Some),
                _ => Err(VerifyError::Host("not a call site".into())),
            },
            ("org/codehaus/groovy/runtime/BytecodeInterface8", "disabledStandardMetaClass") => {
                Ok(Some(Value::Int(0)))
            }
            ("org/codehaus/groovy/runtime/BytecodeInterface8", _) if name.starts_with("isOrig") => {
                Ok(Some(Value::Int(self.original_meta_classes as i32)))
            }
            ("org/codehaus/groovy/runtime/ScriptBytecodeAdapter", "castToType") => Ok(args.first().cloned()),
            ("java/util/Iterator", _) => match self.object(receiver)? {
                (handle, Some(HostObject::Iterator(values, position))) => match name {
                    "hasNext" => Ok(Some(Value::Int((position < values.len()) as i32))),
                    "next" => {
                        let value = values
                            .get(position)
                            .cloned()
                            .ok_or_else(|| VerifyError::Thrown("java/util/NoSuchElementException".into()))?;
                        self.objects[handle as usize] = Some(HostObject::Iterator(values, position + 1));
                        Ok(Some(value))
                    }
                    _ => Err(VerifyError::Host(format!("unexpected call {member}"))),
                },
                _ => Err(VerifyError::Host("not an iterator".into())),
            },
            ("org/codehaus/groovy/runtime/ScriptBytecodeAdapter", "initMetaClass") => {
                self.messages.push(name.to_string());
                Ok(Some(self.alloc(Some(HostObject::MetaClass))))
            }
            (META_CLASS, _) => match self.object(receiver)? {
                // properties read back as `<name>!`
                (_, Some(HostObject::MetaClass)) => {
                    self.messages.push(name.to_string());
                    Ok(match (name, args) {
                        ("getProperty", [_, Value::Str(property)]) => Some(Value::str(&format!("{property}!"))),
                        ("setProperty", _) => None,
                        _ => Some(Value::Null),
                    })
                }
                _ => Err(VerifyError::Host("not a meta class".into())),
            },
            ("org/codehaus/groovy/runtime/ScriptBytecodeAdapter", _) if name.starts_with("compare") => {
                Self::compare(name, args).map(Some)
            }
            ("org/codehaus/groovy/runtime/typehandling/DefaultTypeTransformation", _) if name.ends_with("Unbox") => {
                Ok(args.first().cloned())
            }
            (_, "valueOf") if owner.starts_with("java/lang/") => Ok(args.first().cloned()),
            (_, _) if name.ends_with("Value") && owner.starts_with("java/lang/") => Ok(receiver.cloned()),
            _ => Err(VerifyError::Host(format!("unexpected call {member}"))),
        }
    }

    fn new_object(&mut self, class: &str) -> VerifyResult<Value> {
        match class {
            CALL_SITE_ARRAY | SOFT_REFERENCE => Ok(self.alloc(None)),
            _ => Err(VerifyError::Host(format!("cannot instantiate {class}"))),
        }
    }

    fn get_field(&mut self, object: Option<&Value>, member: &MemberRef) -> VerifyResult<Value> {
        if object.is_none() {
            return self
                .statics
                .get(&member.name)
                .cloned()
                .ok_or_else(|| VerifyError::Host(format!("no static {member}")));
        }
        match (self.object(object)?, member.name.as_str()) {
            ((_, Some(HostObject::SiteArray(names))), "array") => {
                let sites = names.into_iter().map(|n| self.alloc(Some(HostObject::Site(n)))).collect();
                Ok(Value::array(sites))
            }
            _ => Err(VerifyError::Host(format!("no field {member}"))),
        }
    }
}
