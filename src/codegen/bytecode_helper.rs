//! Instruction sequences shared by the stack tracker and the writers:
//! boxing, unboxing, casts, native primitive conversions and returns.
//!
//! These helpers only emit code. Keeping the operand stack model in step
//! is the caller's job.

use super::code::Code;
use super::opcodes::*;
use crate::ast::JvmType;
use crate::common::error::Result;
use crate::consts;

/// Box a primitive with `Wrapper.valueOf`. Reference types are left alone.
/// Returns the type now on the stack.
pub fn box_value(code: &mut Code, ty: &JvmType) -> Result<JvmType> {
    if !ty.is_primitive() {
        return Ok(ty.clone());
    }
    let wrapper = ty.wrapper();
    let desc = format!("({}){}", ty.descriptor(), wrapper.descriptor());
    code.invokestatic(&wrapper.internal_name(), "valueOf", &desc)?;
    Ok(wrapper)
}

/// `DefaultTypeTransformation.<prim>Unbox(Object)`
pub fn unbox(code: &mut Code, prim: &JvmType) -> Result<()> {
    let Some(name) = prim.primitive_name() else {
        return Ok(());
    };
    let desc = format!("(Ljava/lang/Object;){}", prim.descriptor());
    code.invokestatic(consts::TYPE_TRANSFORMATION, &format!("{}Unbox", name), &desc)
}

/// `wrapper.<prim>Value()` on a value statically typed as `wrapper`
pub fn wrapper_value(code: &mut Code, wrapper: &JvmType, prim: &JvmType) -> Result<()> {
    let Some(name) = prim.primitive_name() else {
        return Ok(());
    };
    code.invokevirtual(&wrapper.internal_name(), &format!("{}Value", name), &format!("(){}", prim.descriptor()))
}

/// Checked cast to `ty`; primitives are unboxed from Object.
pub fn do_cast(code: &mut Code, ty: &JvmType) -> Result<()> {
    if ty.is_object() || ty.is_void() {
        return Ok(());
    }
    if ty.is_primitive() {
        unbox(code, ty)
    } else {
        code.type_insn(CHECKCAST, &ty.internal_name())
    }
}

/// Push the `java.lang.Class` of `ty`. Primitive classes come from the
/// wrapper's `TYPE` field.
pub fn push_class_literal(code: &mut Code, ty: &JvmType) -> Result<()> {
    if ty.is_primitive() || ty.is_void() {
        let wrapper = ty.wrapper();
        code.field_insn(GETSTATIC, &wrapper.internal_name(), "TYPE", "Ljava/lang/Class;")
    } else {
        code.push_class(&ty.internal_name())
    }
}

fn convert_from_int(code: &mut Code, to: &JvmType) -> Result<bool> {
    let op = match to {
        JvmType::Char => I2C,
        JvmType::Byte => I2B,
        JvmType::Short => I2S,
        JvmType::Long => I2L,
        JvmType::Float => I2F,
        JvmType::Double => I2D,
        _ => return Ok(false),
    };
    code.emitop(op)?;
    Ok(true)
}

/// Narrow or widen with a native conversion; false when none exists
/// (boolean on either side).
pub fn convert_primitive(code: &mut Code, from: &JvmType, to: &JvmType) -> Result<bool> {
    if from == to {
        return Ok(true);
    }
    match from {
        JvmType::Int => convert_from_int(code, to),
        JvmType::Char | JvmType::Byte | JvmType::Short => {
            if *to == JvmType::Int {
                Ok(true)
            } else {
                convert_from_int(code, to)
            }
        }
        JvmType::Long | JvmType::Float | JvmType::Double => {
            let (to_int, direct) = match from {
                JvmType::Long => (L2I, [(JvmType::Double, L2D), (JvmType::Float, L2F)]),
                JvmType::Float => (F2I, [(JvmType::Long, F2L), (JvmType::Double, F2D)]),
                _ => (D2I, [(JvmType::Long, D2L), (JvmType::Float, D2F)]),
            };
            match to {
                JvmType::Int => {
                    code.emitop(to_int)?;
                    Ok(true)
                }
                JvmType::Char | JvmType::Byte | JvmType::Short => {
                    code.emitop(to_int)?;
                    convert_from_int(code, to)
                }
                _ => match direct.iter().find(|(t, _)| t == to) {
                    Some((_, op)) => {
                        code.emitop(*op)?;
                        Ok(true)
                    }
                    None => Ok(false),
                },
            }
        }
        _ => Ok(false),
    }
}

/// Replace a primitive on the stack by 0 or 1 following truthiness rules:
/// zero is false, and NaN is false for floating point values.
pub fn convert_primitive_to_boolean(code: &mut Code, from: &JvmType) -> Result<()> {
    match from {
        JvmType::Boolean => Ok(()),
        JvmType::Long => {
            code.emitop(LCONST_0)?;
            code.emitop(LCMP)?;
            zero_test(code)
        }
        JvmType::Double | JvmType::Float => {
            let double = *from == JvmType::Double;
            let false_with_pop = code.new_label();
            let false_label = code.new_label();
            let done = code.new_label();
            code.emitop(if double { DUP2 } else { DUP })?;
            code.emitop(if double { DCONST_0 } else { FCONST_0 })?;
            code.emitop(if double { DCMPL } else { FCMPL })?;
            code.jump(IFEQ, false_with_pop)?;
            if double {
                code.invokestatic("java/lang/Double", "isNaN", "(D)Z")?;
            } else {
                code.invokestatic("java/lang/Float", "isNaN", "(F)Z")?;
            }
            code.jump(IFNE, false_label)?;
            code.emitop(ICONST_1)?;
            code.goto(done)?;
            code.mark(false_with_pop)?;
            code.emitop(if double { POP2 } else { POP })?;
            code.mark(false_label)?;
            code.emitop(ICONST_0)?;
            code.mark(done)
        }
        _ => zero_test(code),
    }
}

fn zero_test(code: &mut Code) -> Result<()> {
    let false_label = code.new_label();
    let done = code.new_label();
    code.jump(IFEQ, false_label)?;
    code.emitop(ICONST_1)?;
    code.goto(done)?;
    code.mark(false_label)?;
    code.emitop(ICONST_0)?;
    code.mark(done)
}

/// Default value of a fresh local of type `ty`
pub fn push_default(code: &mut Code, ty: &JvmType) -> Result<()> {
    match ty {
        JvmType::Long => code.emitop(LCONST_0),
        JvmType::Double => code.emitop(DCONST_0),
        JvmType::Float => code.emitop(FCONST_0),
        t if t.is_primitive() => code.emitop(ICONST_0),
        _ => code.emitop(ACONST_NULL),
    }
}

pub fn return_op(ty: &JvmType) -> u8 {
    match ty {
        JvmType::Void => RETURN,
        JvmType::Long => LRETURN,
        JvmType::Float => FRETURN,
        JvmType::Double => DRETURN,
        t if t.is_primitive() => IRETURN,
        _ => ARETURN,
    }
}

pub fn array_load_op(component: &JvmType) -> u8 {
    match component {
        JvmType::Int => IALOAD,
        JvmType::Long => LALOAD,
        JvmType::Float => FALOAD,
        JvmType::Double => DALOAD,
        JvmType::Boolean | JvmType::Byte => BALOAD,
        JvmType::Char => CALOAD,
        JvmType::Short => SALOAD,
        _ => AALOAD,
    }
}

pub fn array_store_op(component: &JvmType) -> u8 {
    match component {
        JvmType::Int => IASTORE,
        JvmType::Long => LASTORE,
        JvmType::Float => FASTORE,
        JvmType::Double => DASTORE,
        JvmType::Boolean | JvmType::Byte => BASTORE,
        JvmType::Char => CASTORE,
        JvmType::Short => SASTORE,
        _ => AASTORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::ConstantPool;
    use rstest::rstest;

    #[rstest]
    #[case(JvmType::Int, JvmType::Long, vec![I2L])]
    #[case(JvmType::Long, JvmType::Int, vec![L2I])]
    #[case(JvmType::Long, JvmType::Byte, vec![L2I, I2B])]
    #[case(JvmType::Double, JvmType::Char, vec![D2I, I2C])]
    #[case(JvmType::Float, JvmType::Double, vec![F2D])]
    #[case(JvmType::Short, JvmType::Int, vec![])]
    #[case(JvmType::Char, JvmType::Double, vec![I2D])]
    fn native_conversions(#[case] from: JvmType, #[case] to: JvmType, #[case] ops: Vec<u8>) {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        match from.width() {
            2 => code.push_long(0).unwrap(),
            _ => code.push_int(0).unwrap(),
        }
        let start = code.pc();
        assert!(convert_primitive(&mut code, &from, &to).unwrap());
        code.emitop(if to.width() == 2 { POP2 } else { POP }).unwrap();
        code.emitop(RETURN).unwrap();
        let body = code.finish(0).unwrap();
        assert_eq!(&body.code[start..body.code.len() - 2], ops.as_slice());
    }

    #[test]
    fn boolean_has_no_native_conversion() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        code.push_int(1).unwrap();
        assert!(!convert_primitive(&mut code, &JvmType::Boolean, &JvmType::Int).unwrap());
        assert_eq!(code.pc(), 1);
    }

    #[test]
    fn box_returns_wrapper() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        code.push_long(2).unwrap();
        let boxed = box_value(&mut code, &JvmType::Long).unwrap();
        assert_eq!(boxed, JvmType::class("java/lang/Long"));
        assert_eq!(code.depth(), 1);
        assert_eq!(box_value(&mut code, &boxed).unwrap(), boxed);
    }

    #[test]
    fn double_truthiness_is_balanced() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(&mut pool, "demo/T", "m", false);
        code.push_double(0.5).unwrap();
        convert_primitive_to_boolean(&mut code, &JvmType::Double).unwrap();
        assert_eq!(code.depth(), 1);
        code.emitop(IRETURN).unwrap();
        assert!(code.finish(2).is_ok());
    }
}
