//! Structural class file emission.
//!
//! The generator requests fields, methods and attributes through this
//! writer; the writer owns the constant pool and lays out the class file.

use std::collections::HashSet;

use log::debug;

use super::attribute;
use super::class::{ClassFile, MemberInfo};
use super::code::CodeBody;
use super::constpool::ConstantPool;
use super::writer::ClassfileWritable;
use crate::common::error::{Error, Result};

pub struct ClassWriter {
    class_file: ClassFile,
    name: String,
    fields: HashSet<String>,
    methods: HashSet<(String, String)>,
}

impl ClassWriter {
    pub fn new(
        name: &str,
        super_class: &str,
        interfaces: &[String],
        access_flags: u16,
        major_version: u16,
    ) -> Result<Self> {
        let mut class_file = ClassFile::new(major_version, access_flags);
        class_file.this_class = class_file.constant_pool.class(name)?;
        class_file.super_class = class_file.constant_pool.class(super_class)?;
        for interface in interfaces {
            let idx = class_file.constant_pool.class(interface)?;
            class_file.interfaces.push(idx);
        }
        Ok(Self {
            class_file,
            name: name.to_string(),
            fields: HashSet::new(),
            methods: HashSet::new(),
        })
    }

    /// Internal name of the class being written
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.class_file.constant_pool
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Result<()> {
        if !self.fields.insert(name.to_string()) {
            return Err(Error::class_format(format!("duplicate field {}.{}", self.name, name)));
        }
        let name_index = self.pool().utf8(name)?;
        let descriptor_index = self.pool().utf8(descriptor)?;
        self.class_file.fields.push(MemberInfo::new(access_flags, name_index, descriptor_index));
        Ok(())
    }

    pub fn has_method(&self, name: &str, descriptor: &str) -> bool {
        self.methods.contains(&(name.to_string(), descriptor.to_string()))
    }

    /// Add a method; abstract methods pass no body.
    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        body: Option<&CodeBody>,
    ) -> Result<()> {
        if !self.methods.insert((name.to_string(), descriptor.to_string())) {
            return Err(Error::class_format(format!("duplicate method {}.{}{}", self.name, name, descriptor)));
        }
        let name_index = self.pool().utf8(name)?;
        let descriptor_index = self.pool().utf8(descriptor)?;
        let mut method = MemberInfo::new(access_flags, name_index, descriptor_index);
        if let Some(body) = body {
            debug!(
                "{}.{}{}: {} bytes, max_stack {}, max_locals {}",
                self.name,
                name,
                descriptor,
                body.code.len(),
                body.max_stack,
                body.max_locals
            );
            method.attributes.push(attribute::code_attribute(self.pool(), body)?);
        }
        self.class_file.methods.push(method);
        Ok(())
    }

    pub fn set_source_file(&mut self, file: &str) -> Result<()> {
        let attr = attribute::source_file(self.pool(), file)?;
        self.class_file.attributes.push(attr);
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.class_file.to_classfile_bytes()
    }
}
