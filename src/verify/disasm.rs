//! Textual listing of a method body, one instruction per line.

use std::fmt::Write;

use super::insn::{decode, Arg, Insn};
use super::reader::{ClassReader, MethodEntry, PoolEntry};
use super::stack_depth::StackAnalysis;
use super::VerifyResult;
use crate::codegen::opcodes::*;

fn array_type_name(code: u8) -> &'static str {
    match code {
        T_BOOLEAN => "boolean",
        T_CHAR => "char",
        T_FLOAT => "float",
        T_DOUBLE => "double",
        T_BYTE => "byte",
        T_SHORT => "short",
        T_INT => "int",
        T_LONG => "long",
        _ => "?",
    }
}

fn render_constant(class: &ClassReader, index: u16) -> VerifyResult<String> {
    Ok(match class.constant(index)? {
        PoolEntry::Integer(v) => v.to_string(),
        PoolEntry::Float(v) => format!("{v}f"),
        PoolEntry::Long(v) => format!("{v}L"),
        PoolEntry::Double(v) => format!("{v}d"),
        PoolEntry::String(s) => format!("{:?}", class.utf8(*s)?),
        PoolEntry::Class(_) => format!("class {}", class.class_name(index)?),
        PoolEntry::Utf8(s) => s.clone(),
        PoolEntry::FieldRef(..) | PoolEntry::MethodRef(..) | PoolEntry::InterfaceMethodRef(..) => {
            class.member_ref(index)?.to_string()
        }
        other => format!("{other:?}"),
    })
}

fn render_operands(class: &ClassReader, insn: &Insn) -> VerifyResult<String> {
    Ok(match &insn.arg {
        Arg::None => String::new(),
        Arg::Local(i) => i.to_string(),
        Arg::Int(v) => v.to_string(),
        Arg::Pool(i) => render_constant(class, *i)?,
        Arg::Jump(t) => t.to_string(),
        Arg::Iinc { index, delta } => format!("{index} {delta}"),
        Arg::ArrayType(t) => array_type_name(*t).to_string(),
        Arg::Invokeinterface { index, count } => format!("{} {count}", class.member_ref(*index)?),
        Arg::MultiANewArray { index, dims } => format!("{} {dims}", class.class_name(*index)?),
        Arg::Switch { default, cases } => {
            let mut out = String::from("{");
            for (key, target) in cases {
                let _ = write!(out, " {key}: {target},");
            }
            let _ = write!(out, " default: {default} }}");
            out
        }
    })
}

fn listing(class: &ClassReader, method: &MethodEntry, depths: Option<&StackAnalysis>) -> VerifyResult<String> {
    let mut out = String::new();
    let Some(code) = &method.code else {
        return Ok(out);
    };
    for insn in decode(&code.code)? {
        let operands = render_operands(class, &insn)?;
        let _ = write!(out, "{:>5}: ", insn.pc);
        if let Some(analysis) = depths {
            match analysis.depth(insn.pc) {
                Some(d) => {
                    let _ = write!(out, "[{d:>2}] ");
                }
                None => out.push_str("[--] "),
            }
        }
        out.push_str(insn.name());
        if !operands.is_empty() {
            out.push(' ');
            out.push_str(&operands);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Render `method` as `pc: MNEMONIC operands` lines. Pool operands are
/// resolved to member references, class names or literal values.
pub fn disassemble(class: &ClassReader, method: &MethodEntry) -> VerifyResult<String> {
    listing(class, method, None)
}

/// Like [`disassemble`] with the stack depth before each instruction;
/// unreachable instructions show `--`.
pub fn disassemble_with_depths(
    class: &ClassReader,
    method: &MethodEntry,
    analysis: &StackAnalysis,
) -> VerifyResult<String> {
    listing(class, method, Some(analysis))
}
