//! Constant pool of a generated class file

use std::collections::HashMap;

use crate::common::error::{Error, Result};

/// A constant pool entry. Floating point values are kept as raw bits so
/// entries can be deduplicated by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

pub mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
}

impl Constant {
    /// Long and double entries occupy two pool indices
    pub fn slots(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let pair = |out: &mut Vec<u8>, tag: u8, a: u16, b: u16| {
            out.push(tag);
            out.extend_from_slice(&a.to_be_bytes());
            out.extend_from_slice(&b.to_be_bytes());
        };
        match self {
            Constant::Utf8(value) => {
                let encoded = encode_modified_utf8(value);
                out.push(tags::UTF8);
                out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                out.extend_from_slice(&encoded);
            }
            Constant::Integer(v) => {
                out.push(tags::INTEGER);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Float(bits) => {
                out.push(tags::FLOAT);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Long(v) => {
                out.push(tags::LONG);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Double(bits) => {
                out.push(tags::DOUBLE);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Class(name) => {
                out.push(tags::CLASS);
                out.extend_from_slice(&name.to_be_bytes());
            }
            Constant::String(utf8) => {
                out.push(tags::STRING);
                out.extend_from_slice(&utf8.to_be_bytes());
            }
            Constant::FieldRef(c, nt) => pair(out, tags::FIELDREF, *c, *nt),
            Constant::MethodRef(c, nt) => pair(out, tags::METHODREF, *c, *nt),
            Constant::InterfaceMethodRef(c, nt) => pair(out, tags::INTERFACE_METHODREF, *c, *nt),
            Constant::NameAndType(n, d) => pair(out, tags::NAME_AND_TYPE, *n, *d),
        }
    }
}

/// Java's modified UTF-8: NUL is two bytes and supplementary characters
/// are encoded as surrogate pairs.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

/// Deduplicating constant pool with 1-based indices
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
    next: u16,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: Vec::new(), index: HashMap::new(), next: 1 }
    }

    fn add(&mut self, constant: Constant) -> Result<u16> {
        if let Some(&idx) = self.index.get(&constant) {
            return Ok(idx);
        }
        let idx = self.next;
        let next = u32::from(idx) + u32::from(constant.slots());
        if next > u32::from(u16::MAX) {
            return Err(Error::class_format("constant pool exceeds 65535 entries"));
        }
        self.next = next as u16;
        self.index.insert(constant.clone(), idx);
        self.entries.push(constant);
        Ok(idx)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        if encode_modified_utf8(value).len() > usize::from(u16::MAX) {
            return Err(Error::class_format(format!("constant string too long ({} bytes)", value.len())));
        }
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        self.add(Constant::String(utf8))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16> {
        self.add(Constant::Float(value.to_bits()))
    }

    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.add(Constant::Long(value))
    }

    pub fn double(&mut self, value: f64) -> Result<u16> {
        self.add(Constant::Double(value.to_bits()))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let n = self.utf8(name)?;
        let d = self.utf8(descriptor)?;
        self.add(Constant::NameAndType(n, d))
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(c, nt))
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(c, nt))
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let c = self.class(owner)?;
        let nt = self.name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef(c, nt))
    }

    /// Value of `constant_pool_count`: one past the highest index
    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count().to_be_bytes());
        for entry in &self.entries {
            entry.write(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_deduplicated() {
        let mut pool = ConstantPool::new();
        let a = pool.method_ref("demo/A", "f", "()V").unwrap();
        let b = pool.method_ref("demo/A", "f", "()V").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.utf8("demo/A").unwrap(), 1);
    }

    #[test]
    fn wide_entries_take_two_indices() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.long(5).unwrap(), 1);
        assert_eq!(pool.integer(5).unwrap(), 3);
        assert_eq!(pool.double(1.5).unwrap(), 4);
        assert_eq!(pool.count(), 6);
    }

    #[test]
    fn modified_utf8_encodes_nul_and_supplementary() {
        assert_eq!(encode_modified_utf8("a\0"), vec![b'a', 0xc0, 0x80]);
        assert_eq!(encode_modified_utf8("\u{1F600}").len(), 6);
    }
}
