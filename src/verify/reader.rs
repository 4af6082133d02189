//! Class file reader
//!
//! Parses the subset of the format the generator produces: the constant
//! pool kinds up to NameAndType, fields, methods, and the Code,
//! LineNumberTable and SourceFile attributes. Other attributes are skipped.

use super::{VerifyError, VerifyResult};
use crate::codegen::constpool::tags;
use crate::codegen::defs::MAGIC;

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    /// Index 0 and the second slot of long/double entries
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttr {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    /// `(start_pc, line)` pairs
    pub line_numbers: Vec<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<CodeAttr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassReader {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: Vec<PoolEntry>,
    pub access_flags: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldEntry>,
    pub methods: Vec<MethodEntry>,
    pub source_file: Option<String>,
}

struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    fn take(&mut self, n: usize) -> VerifyResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(VerifyError::Truncated(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(VerifyError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> VerifyResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> VerifyResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> VerifyResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> VerifyResult<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok(hi << 32 | lo)
    }
}

/// Decode the JVM's modified UTF-8
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)? as u16;
            units.push((b & 0x1f) << 6 | (b2 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)? as u16;
            let b3 = *bytes.get(i + 2)? as u16;
            units.push((b & 0x0f) << 12 | (b2 & 0x3f) << 6 | (b3 & 0x3f));
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

impl ClassReader {
    pub fn parse(bytes: &[u8]) -> VerifyResult<Self> {
        let mut r = Bytes { data: bytes, pos: 0 };
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(VerifyError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = read_pool(&mut r)?;

        let mut class = ClassReader {
            minor_version,
            major_version,
            pool,
            access_flags: 0,
            name: String::new(),
            super_name: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        };
        class.access_flags = r.u16()?;
        let this_class = r.u16()?;
        class.name = class.class_name(this_class)?.to_string();
        let super_class = r.u16()?;
        if super_class != 0 {
            class.super_name = Some(class.class_name(super_class)?.to_string());
        }
        for _ in 0..r.u16()? {
            let index = r.u16()?;
            let name = class.class_name(index)?.to_string();
            class.interfaces.push(name);
        }

        for _ in 0..r.u16()? {
            let access_flags = r.u16()?;
            let name = class.utf8(r.u16()?)?.to_string();
            let descriptor = class.utf8(r.u16()?)?.to_string();
            for _ in 0..r.u16()? {
                r.u16()?;
                let len = r.u32()? as usize;
                r.take(len)?;
            }
            class.fields.push(FieldEntry { access_flags, name, descriptor });
        }

        for _ in 0..r.u16()? {
            let access_flags = r.u16()?;
            let name = class.utf8(r.u16()?)?.to_string();
            let descriptor = class.utf8(r.u16()?)?.to_string();
            let mut code = None;
            for _ in 0..r.u16()? {
                let attr_name = class.utf8(r.u16()?)?.to_string();
                let len = r.u32()? as usize;
                let data = r.take(len)?;
                if attr_name == "Code" {
                    code = Some(class.read_code(data)?);
                }
            }
            class.methods.push(MethodEntry { access_flags, name, descriptor, code });
        }

        for _ in 0..r.u16()? {
            let attr_name = class.utf8(r.u16()?)?.to_string();
            let len = r.u32()? as usize;
            let data = r.take(len)?;
            if attr_name == "SourceFile" && data.len() == 2 {
                let index = u16::from_be_bytes([data[0], data[1]]);
                class.source_file = Some(class.utf8(index)?.to_string());
            }
        }
        Ok(class)
    }

    fn read_code(&self, data: &[u8]) -> VerifyResult<CodeAttr> {
        let mut r = Bytes { data, pos: 0 };
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let len = r.u32()? as usize;
        let code = r.take(len)?.to_vec();
        let mut exception_table = Vec::new();
        for _ in 0..r.u16()? {
            exception_table.push(ExceptionEntry {
                start_pc: r.u16()?,
                end_pc: r.u16()?,
                handler_pc: r.u16()?,
                catch_type: r.u16()?,
            });
        }
        let mut line_numbers = Vec::new();
        for _ in 0..r.u16()? {
            let name = self.utf8(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            if name == "LineNumberTable" {
                let mut lr = Bytes { data: body, pos: 0 };
                for _ in 0..lr.u16()? {
                    line_numbers.push((lr.u16()?, lr.u16()?));
                }
            }
        }
        Ok(CodeAttr { max_stack, max_locals, code, exception_table, line_numbers })
    }

    pub fn constant(&self, index: u16) -> VerifyResult<&PoolEntry> {
        match self.pool.get(index as usize) {
            Some(PoolEntry::Unusable) | None => Err(VerifyError::BadConstant { index, expected: "usable entry" }),
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> VerifyResult<&str> {
        match self.pool.get(index as usize) {
            Some(PoolEntry::Utf8(s)) => Ok(s),
            _ => Err(VerifyError::BadConstant { index, expected: "Utf8" }),
        }
    }

    pub fn class_name(&self, index: u16) -> VerifyResult<&str> {
        match self.pool.get(index as usize) {
            Some(PoolEntry::Class(name)) => self.utf8(*name),
            _ => Err(VerifyError::BadConstant { index, expected: "Class" }),
        }
    }

    /// Resolve a Fieldref, Methodref or InterfaceMethodref
    pub fn member_ref(&self, index: u16) -> VerifyResult<MemberRef> {
        let (class, nat) = match self.pool.get(index as usize) {
            Some(PoolEntry::FieldRef(c, n))
            | Some(PoolEntry::MethodRef(c, n))
            | Some(PoolEntry::InterfaceMethodRef(c, n)) => (*c, *n),
            _ => return Err(VerifyError::BadConstant { index, expected: "member reference" }),
        };
        let (name, descriptor) = match self.pool.get(nat as usize) {
            Some(PoolEntry::NameAndType(n, d)) => (self.utf8(*n)?, self.utf8(*d)?),
            _ => return Err(VerifyError::BadConstant { index: nat, expected: "NameAndType" }),
        };
        Ok(MemberRef {
            owner: self.class_name(class)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_by(&self, name: &str, descriptor: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn read_pool(r: &mut Bytes<'_>) -> VerifyResult<Vec<PoolEntry>> {
    let count = r.u16()?;
    let mut pool = vec![PoolEntry::Unusable];
    let mut index = 1u16;
    while index < count {
        let tag = r.u8()?;
        let entry = match tag {
            tags::UTF8 => {
                let len = r.u16()? as usize;
                let bytes = r.take(len)?;
                PoolEntry::Utf8(decode_modified_utf8(bytes).ok_or(VerifyError::BadUtf8(index))?)
            }
            tags::INTEGER => PoolEntry::Integer(r.u32()? as i32),
            tags::FLOAT => PoolEntry::Float(f32::from_bits(r.u32()?)),
            tags::LONG => PoolEntry::Long(r.u64()? as i64),
            tags::DOUBLE => PoolEntry::Double(f64::from_bits(r.u64()?)),
            tags::CLASS => PoolEntry::Class(r.u16()?),
            tags::STRING => PoolEntry::String(r.u16()?),
            tags::FIELDREF => PoolEntry::FieldRef(r.u16()?, r.u16()?),
            tags::METHODREF => PoolEntry::MethodRef(r.u16()?, r.u16()?),
            tags::INTERFACE_METHODREF => PoolEntry::InterfaceMethodRef(r.u16()?, r.u16()?),
            tags::NAME_AND_TYPE => PoolEntry::NameAndType(r.u16()?, r.u16()?),
            _ => return Err(VerifyError::UnknownTag { tag, index }),
        };
        let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        pool.push(entry);
        index += 1;
        if wide {
            pool.push(PoolEntry::Unusable);
            index += 1;
        }
    }
    Ok(pool)
}
