//! In-memory class file: header indexes, members and attributes, all
//! pointing into one constant pool

use super::attribute::AttributeInfo;
use super::constpool::ConstantPool;
use super::defs::MAGIC;

#[derive(Debug)]
pub struct ClassFile {
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Empty class with its own pool; `this_class` and `super_class` are
    /// filled in by the writer once the names are interned
    pub fn new(major_version: u16, access_flags: u16) -> Self {
        Self {
            major_version,
            constant_pool: ConstantPool::new(),
            access_flags,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn magic(&self) -> u32 {
        MAGIC
    }
}

/// A field or method: both share the same layout
#[derive(Debug)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MemberInfo {
    pub fn new(access_flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        Self { access_flags, name_index, descriptor_index, attributes: Vec::new() }
    }
}
