//! Attribute payloads: Code, LineNumberTable and SourceFile

use super::code::CodeBody;
use super::constpool::ConstantPool;
use super::writer::ClassfileWritable;
use crate::common::error::Result;

#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }
}

/// Code attribute for a finished method body, with a LineNumberTable when
/// the body carries line entries. No exception table is produced.
pub fn code_attribute(pool: &mut ConstantPool, body: &CodeBody) -> Result<AttributeInfo> {
    let name_index = pool.utf8("Code")?;
    let mut nested = Vec::new();
    if !body.line_numbers.is_empty() {
        nested.push(line_number_table(pool, &body.line_numbers)?);
    }

    let mut info = Vec::new();
    info.extend_from_slice(&body.max_stack.to_be_bytes());
    info.extend_from_slice(&body.max_locals.to_be_bytes());
    info.extend_from_slice(&(body.code.len() as u32).to_be_bytes());
    info.extend_from_slice(&body.code);
    info.extend_from_slice(&0u16.to_be_bytes());
    info.extend_from_slice(&(nested.len() as u16).to_be_bytes());
    for attr in &nested {
        info.extend(attr.to_classfile_bytes());
    }
    Ok(AttributeInfo::new(name_index, info))
}

pub fn line_number_table(pool: &mut ConstantPool, lines: &[(u16, u16)]) -> Result<AttributeInfo> {
    let name_index = pool.utf8("LineNumberTable")?;
    let mut info = Vec::with_capacity(2 + lines.len() * 4);
    info.extend_from_slice(&(lines.len() as u16).to_be_bytes());
    for (pc, line) in lines {
        info.extend_from_slice(&pc.to_be_bytes());
        info.extend_from_slice(&line.to_be_bytes());
    }
    Ok(AttributeInfo::new(name_index, info))
}

pub fn source_file(pool: &mut ConstantPool, file: &str) -> Result<AttributeInfo> {
    let name_index = pool.utf8("SourceFile")?;
    let file_index = pool.utf8(file)?;
    Ok(AttributeInfo::new(name_index, file_index.to_be_bytes().to_vec()))
}
