//! `groovy.lang.GroovyObject` support.
//!
//! Every generated class implements `GroovyObject`, so `this` can be handed
//! to `callCurrent`, `callGroovyObjectGetProperty` and the other entry points
//! that take one. The meta class is looked up lazily on first use and
//! cached in a transient field. Members the class declares itself are kept.

use log::trace;

use super::class_writer::ClassWriter;
use super::code::Code;
use super::defs::access_flags::*;
use super::opcodes::*;
use crate::ast::{ClassNode, JvmType};
use crate::common::error::Result;
use crate::consts;

const GET_META_CLASS_DESC: &str = "()Lgroovy/lang/MetaClass;";
const SET_META_CLASS_DESC: &str = "(Lgroovy/lang/MetaClass;)V";
const INVOKE_METHOD_DESC: &str = "(Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;";
const GET_PROPERTY_DESC: &str = "(Ljava/lang/String;)Ljava/lang/Object;";
const SET_PROPERTY_DESC: &str = "(Ljava/lang/String;Ljava/lang/Object;)V";

/// Interfaces of the generated class: the declared ones, plus
/// `GroovyObject` for classes
pub fn class_interfaces(class: &ClassNode) -> Vec<String> {
    let mut interfaces = class.interfaces.clone();
    if !class.is_interface && !interfaces.iter().any(|i| i == consts::GROOVY_OBJECT) {
        interfaces.push(consts::GROOVY_OBJECT.to_string());
    }
    interfaces
}

/// Add the meta class field and whichever `GroovyObject` methods the class
/// does not define. Call after the user methods have been added.
pub fn generate_groovy_object_members(cw: &mut ClassWriter) -> Result<()> {
    let class = cw.name().to_string();
    let object = JvmType::object();

    if !cw.has_field(consts::META_CLASS_FIELD) {
        cw.add_field(ACC_PRIVATE | ACC_TRANSIENT | ACC_SYNTHETIC, consts::META_CLASS_FIELD, consts::META_CLASS_DESC)?;
    }

    if !cw.has_method(consts::GET_STATIC_META_CLASS, GET_META_CLASS_DESC) {
        let body = {
            let mut code = Code::new(cw.pool(), &class, consts::GET_STATIC_META_CLASS, false);
            code.load_local(&object, 0)?;
            code.invokestatic(
                consts::SCRIPT_BYTECODE_ADAPTER,
                "initMetaClass",
                "(Ljava/lang/Object;)Lgroovy/lang/MetaClass;",
            )?;
            code.emitop(ARETURN)?;
            code.finish(1)?
        };
        cw.add_method(ACC_PROTECTED | ACC_SYNTHETIC, consts::GET_STATIC_META_CLASS, GET_META_CLASS_DESC, Some(&body))?;
    }

    if !cw.has_method("getMetaClass", GET_META_CLASS_DESC) {
        let body = {
            let mut code = Code::new(cw.pool(), &class, "getMetaClass", false);
            let cached = code.new_label();
            code.load_local(&object, 0)?;
            code.field_insn(GETFIELD, &class, consts::META_CLASS_FIELD, consts::META_CLASS_DESC)?;
            code.jump(IFNONNULL, cached)?;
            code.load_local(&object, 0)?;
            code.load_local(&object, 0)?;
            code.invokevirtual(&class, consts::GET_STATIC_META_CLASS, GET_META_CLASS_DESC)?;
            code.field_insn(PUTFIELD, &class, consts::META_CLASS_FIELD, consts::META_CLASS_DESC)?;
            code.mark(cached)?;
            code.load_local(&object, 0)?;
            code.field_insn(GETFIELD, &class, consts::META_CLASS_FIELD, consts::META_CLASS_DESC)?;
            code.emitop(ARETURN)?;
            code.finish(1)?
        };
        cw.add_method(ACC_PUBLIC | ACC_SYNTHETIC, "getMetaClass", GET_META_CLASS_DESC, Some(&body))?;
    }

    if !cw.has_method("setMetaClass", SET_META_CLASS_DESC) {
        let body = {
            let mut code = Code::new(cw.pool(), &class, "setMetaClass", false);
            code.load_local(&object, 0)?;
            code.load_local(&object, 1)?;
            code.field_insn(PUTFIELD, &class, consts::META_CLASS_FIELD, consts::META_CLASS_DESC)?;
            code.emitop(RETURN)?;
            code.finish(2)?
        };
        cw.add_method(ACC_PUBLIC | ACC_SYNTHETIC, "setMetaClass", SET_META_CLASS_DESC, Some(&body))?;
    }

    // the remaining three forward to the meta class with `this` prepended
    let forwarded = [
        ("invokeMethod", INVOKE_METHOD_DESC, "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;", 2),
        ("getProperty", GET_PROPERTY_DESC, "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;", 1),
        ("setProperty", SET_PROPERTY_DESC, "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;)V", 2),
    ];
    for (name, desc, meta_desc, params) in forwarded {
        if cw.has_method(name, desc) {
            trace!("{} declares {}{}", class, name, desc);
            continue;
        }
        let body = {
            let mut code = Code::new(cw.pool(), &class, name, false);
            code.load_local(&object, 0)?;
            code.invokevirtual(&class, "getMetaClass", GET_META_CLASS_DESC)?;
            for slot in 0..=params {
                code.load_local(&object, slot)?;
            }
            code.invokeinterface(consts::META_CLASS, name, meta_desc)?;
            code.emitop(if desc.ends_with('V') { RETURN } else { ARETURN })?;
            code.finish(params + 1)?
        };
        cw.add_method(ACC_PUBLIC | ACC_SYNTHETIC, name, desc, Some(&body))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_gain_groovy_object() {
        let mut class = ClassNode::new("demo/A");
        class.interfaces.push("java/io/Serializable".into());
        assert_eq!(class_interfaces(&class), vec!["java/io/Serializable", consts::GROOVY_OBJECT]);

        class.interfaces.push(consts::GROOVY_OBJECT.into());
        assert_eq!(class_interfaces(&class).len(), 2);

        let mut iface = ClassNode::new("demo/I");
        iface.is_interface = true;
        assert!(class_interfaces(&iface).is_empty());
    }

    #[test]
    fn declared_members_are_kept() {
        let mut cw = ClassWriter::new("demo/A", consts::OBJECT, &[], ACC_PUBLIC | ACC_SUPER, 49).unwrap();
        cw.add_method(ACC_PUBLIC | ACC_ABSTRACT, "getProperty", GET_PROPERTY_DESC, None).unwrap();
        generate_groovy_object_members(&mut cw).unwrap();

        assert!(cw.has_field(consts::META_CLASS_FIELD));
        for (name, desc) in [
            (consts::GET_STATIC_META_CLASS, GET_META_CLASS_DESC),
            ("getMetaClass", GET_META_CLASS_DESC),
            ("setMetaClass", SET_META_CLASS_DESC),
            ("invokeMethod", INVOKE_METHOD_DESC),
            ("setProperty", SET_PROPERTY_DESC),
        ] {
            assert!(cw.has_method(name, desc), "{name}");
        }
    }
}
