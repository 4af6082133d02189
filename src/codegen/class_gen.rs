//! Whole-class generation: fields, methods, the implicit constructor, the
//! `GroovyObject` members and the synthetic call-site members.

use log::debug;

use super::call_site::{generate_call_site_array, CallSiteTable};
use super::class_writer::ClassWriter;
use super::code::Code;
use super::controller::MethodGen;
use super::defs::access_flags::*;
use super::groovy_object::{class_interfaces, generate_groovy_object_members};
use crate::ast::build::{block, constructor};
use crate::ast::{ClassNode, MethodNode};
use crate::common::config::Config;
use crate::common::error::{ErrorCollector, Result};
use crate::consts;

/// A generated class file
#[derive(Debug, Clone)]
pub struct CompiledClass {
    /// Internal name
    pub name: String,
    pub bytes: Vec<u8>,
    /// Call-site messages in array order
    pub call_site_names: Vec<String>,
}

fn method_flags(method: &MethodNode) -> u16 {
    if method.is_static_init() {
        return ACC_STATIC;
    }
    let mut flags = if method.is_private { ACC_PRIVATE } else { ACC_PUBLIC };
    if method.is_static {
        flags |= ACC_STATIC;
    }
    if method.is_varargs {
        flags |= ACC_VARARGS;
    }
    flags
}

/// Generate the class file for `class`. Semantic errors in one method do
/// not stop the others from being generated; the first one is returned.
pub fn generate_class(class: &ClassNode, config: &Config) -> Result<CompiledClass> {
    debug!("class {} extends {}", class.name, class.super_class);
    let access = if class.is_interface {
        ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT
    } else {
        ACC_PUBLIC | ACC_SUPER
    };
    let interfaces = class_interfaces(class);
    let mut cw = ClassWriter::new(&class.name, &class.super_class, &interfaces, access, config.class_version)?;

    // 1. fields
    for field in &class.fields {
        let mut flags = ACC_PRIVATE;
        if field.is_static {
            flags |= ACC_STATIC;
        }
        cw.add_field(flags, &field.name, &field.ty.descriptor())?;
    }

    if class.is_interface {
        for method in class.methods.iter().filter(|m| !m.is_static_init()) {
            cw.add_method(ACC_PUBLIC | ACC_ABSTRACT, &method.name, &method.descriptor(), None)?;
        }
        if let Some(file) = &config.source_file {
            cw.set_source_file(file)?;
        }
        return Ok(CompiledClass { name: class.name.clone(), bytes: cw.to_bytes(), call_site_names: Vec::new() });
    }

    cw.add_field(
        ACC_PUBLIC | ACC_STATIC | ACC_TRANSIENT | ACC_SYNTHETIC,
        consts::STATIC_META_CLASS_FLAG,
        "Z",
    )?;

    // 2. methods, sharing one call-site table
    let mut sites = CallSiteTable::new();
    let mut errors = ErrorCollector::new(config.max_errors);
    let implicit_constructor = if class.methods.iter().any(MethodNode::is_constructor) {
        None
    } else {
        Some(constructor(vec![], block(vec![])))
    };
    for method in class.methods.iter().chain(implicit_constructor.iter()) {
        if let Err(error) = generate_method(&mut cw, class, method, config, &mut sites) {
            errors.add(error)?;
        }
    }
    errors.into_result()?;
    generate_groovy_object_members(&mut cw)?;

    // 3. call-site array members
    generate_call_site_array(&mut cw, sites.names(), config)?;

    if let Some(file) = &config.source_file {
        cw.set_source_file(file)?;
    }
    debug!("class {}: {} call sites", class.name, sites.len());
    Ok(CompiledClass { name: class.name.clone(), bytes: cw.to_bytes(), call_site_names: sites.into_names() })
}

fn generate_method(
    cw: &mut ClassWriter,
    class: &ClassNode,
    method: &MethodNode,
    config: &Config,
    sites: &mut CallSiteTable,
) -> Result<()> {
    let body = {
        let code = Code::new(cw.pool(), &class.name, &method.name, config.debug);
        MethodGen::new(code, class, method, config, sites).generate()?
    };
    cw.add_method(method_flags(method), &method.name, &method.descriptor(), Some(&body))
}
