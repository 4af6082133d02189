//! Big-endian serialization of the class file structures

use std::io::Write;

use super::attribute::AttributeInfo;
use super::class::{ClassFile, MemberInfo};
use super::constpool::ConstantPool;

/// Something with a class file encoding
pub trait ClassfileWritable {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()>;

    fn to_classfile_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        // a Vec sink never fails
        let _ = self.write_to_classfile(&mut buffer);
        buffer
    }
}

fn write_u16<W: Write>(buffer: &mut W, value: u16) -> std::io::Result<()> {
    buffer.write_all(&value.to_be_bytes())
}

/// Count-prefixed table of `items`
fn write_table<W: Write, T: ClassfileWritable>(buffer: &mut W, items: &[T]) -> std::io::Result<()> {
    write_u16(buffer, items.len() as u16)?;
    items.iter().try_for_each(|item| item.write_to_classfile(buffer))
}

impl ClassfileWritable for ClassFile {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.magic().to_be_bytes())?;
        write_u16(buffer, 0)?;
        write_u16(buffer, self.major_version)?;
        self.constant_pool.write_to_classfile(buffer)?;

        write_u16(buffer, self.access_flags)?;
        write_u16(buffer, self.this_class)?;
        write_u16(buffer, self.super_class)?;
        write_u16(buffer, self.interfaces.len() as u16)?;
        for interface in &self.interfaces {
            write_u16(buffer, *interface)?;
        }

        write_table(buffer, &self.fields)?;
        write_table(buffer, &self.methods)?;
        write_table(buffer, &self.attributes)
    }
}

impl ClassfileWritable for ConstantPool {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        let mut bytes = Vec::new();
        self.write(&mut bytes);
        buffer.write_all(&bytes)
    }
}

impl ClassfileWritable for MemberInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.access_flags)?;
        write_u16(buffer, self.name_index)?;
        write_u16(buffer, self.descriptor_index)?;
        write_table(buffer, &self.attributes)
    }
}

impl ClassfileWritable for AttributeInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u16(buffer, self.name_index)?;
        buffer.write_all(&(self.info.len() as u32).to_be_bytes())?;
        buffer.write_all(&self.info)
    }
}
