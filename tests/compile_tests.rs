mod common;

use common::*;
use gbc::ast::build::*;
use gbc::ast::{BinaryOp, ClassNode, JvmType};
use gbc::verify::{Evaluator, Value, VerifyError};
use gbc::{compile_class, compile_classes, Config, Error};
use pretty_assertions::assert_eq;

#[test]
fn class_carries_call_site_members() {
    let compiled = compile(&class_with(vec![int_binary_method("add", BinaryOp::Plus)]));
    let class = read(&compiled);

    assert_eq!(class.name, "demo/Calc");
    assert!(class.field("$callSiteArray").is_some());
    assert!(class.field("__$stMC").is_some());
    assert!(class.method_by("$getCallSiteArray", "()[Lorg/codehaus/groovy/runtime/callsite/CallSite;").is_some());
    assert!(class
        .method_by("$createCallSiteArray", "()Lorg/codehaus/groovy/runtime/callsite/CallSiteArray;")
        .is_some());
    assert!(class.method_by("<init>", "()V").is_some(), "default constructor");
}

#[test]
fn class_implements_groovy_object() {
    let compiled = compile(&class_with(vec![int_binary_method("add", BinaryOp::Plus)]));
    let class = read(&compiled);

    assert_eq!(class.interfaces, vec!["groovy/lang/GroovyObject"]);
    assert!(class.field("metaClass").is_some());
    for (name, desc) in [
        ("getMetaClass", "()Lgroovy/lang/MetaClass;"),
        ("setMetaClass", "(Lgroovy/lang/MetaClass;)V"),
        ("invokeMethod", "(Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;"),
        ("getProperty", "(Ljava/lang/String;)Ljava/lang/Object;"),
        ("setProperty", "(Ljava/lang/String;Ljava/lang/Object;)V"),
    ] {
        assert!(class.method_by(name, desc).is_some(), "{name}{desc}");
    }
}

#[test]
fn meta_class_is_initialized_once_and_serves_properties() {
    let compiled = compile(&class_with(vec![]));
    let class = read(&compiled);
    let mut evaluator = Evaluator::new(&class, ScriptedHost::fast());
    let object = evaluator.new_instance("()V", vec![]).expect("constructs");

    let first = evaluator
        .invoke_virtual(object.clone(), "getMetaClass", "()Lgroovy/lang/MetaClass;", vec![])
        .expect("meta class");
    let second = evaluator
        .invoke_virtual(object.clone(), "getMetaClass", "()Lgroovy/lang/MetaClass;", vec![])
        .expect("meta class");
    let property = evaluator
        .invoke_virtual(object, "getProperty", "(Ljava/lang/String;)Ljava/lang/Object;", vec![Value::str("size")])
        .expect("property");

    assert_eq!(first, second);
    assert_eq!(property, Some(Value::str("size!")));
    assert_eq!(evaluator.host().messages, vec!["initMetaClass", "getProperty"]);
}

#[test]
fn declared_groovy_object_method_is_kept() {
    let get_property = method(
        "getProperty",
        vec![param("name", JvmType::string())],
        JvmType::object(),
        block(vec![ret(var("name"))]),
    );
    let compiled = compile(&class_with(vec![get_property]));
    let class = read(&compiled);
    let text = listing(&compiled, "getProperty");

    assert!(!text.contains("MetaClass.getProperty"), "{text}");
    assert!(class.method_by("getMetaClass", "()Lgroovy/lang/MetaClass;").is_some());
}

#[test]
fn each_operator_node_owns_one_site() {
    let compiled = compile(&class_with(vec![
        int_binary_method("add", BinaryOp::Plus),
        int_binary_method("sub", BinaryOp::Minus),
        int_binary_method("add2", BinaryOp::Plus),
    ]));

    assert_eq!(compiled.call_site_names, vec!["plus", "minus", "plus"]);
}

#[test]
fn call_on_this_is_direct_on_the_fast_path() {
    let helper = method(
        "helper",
        vec![param("y", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(binary(BinaryOp::Plus, var("y"), var("y")))]),
    );
    let twice = method(
        "twice",
        vec![param("x", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(call_this("helper", vec![var("x")]))]),
    );
    let compiled = compile(&class_with(vec![helper, twice]));
    let text = listing(&compiled, "twice");

    assert!(text.contains("INVOKEVIRTUAL demo/Calc.helper:(I)I"), "{text}");
    assert!(text.contains("CallSite.callCurrent:"), "{text}");
    assert!(compiled.call_site_names.iter().any(|n| n == "helper"));
}

#[test]
fn static_call_to_own_class_is_direct_on_the_fast_path() {
    let helper = static_method("helper", vec![param("y", JvmType::Int)], JvmType::Int, block(vec![ret(var("y"))]));
    let caller = static_method(
        "caller",
        vec![param("x", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(static_call(JvmType::class("demo/Calc"), "helper", vec![var("x")]))]),
    );
    let compiled = compile(&class_with(vec![helper, caller]));
    let text = listing(&compiled, "caller");

    assert!(text.contains("INVOKESTATIC demo/Calc.helper:(I)I"), "{text}");
    assert!(text.contains("CallSite.callStatic:"), "{text}");
}

#[test]
fn calls_without_optimization_are_all_dynamic() {
    let helper = static_method("helper", vec![param("y", JvmType::Int)], JvmType::Int, block(vec![ret(var("y"))]));
    let caller = static_method(
        "caller",
        vec![param("x", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(static_call(JvmType::class("demo/Calc"), "helper", vec![var("x")]))]),
    );
    let compiled = compile_with(&class_with(vec![helper, caller]), &Config::unoptimized());
    let text = listing(&compiled, "caller");

    assert!(!text.contains("INVOKESTATIC demo/Calc.helper"), "{text}");
    assert!(text.contains("CallSite.callStatic:"), "{text}");
}

#[test]
fn throw_casts_to_throwable_and_ends_the_method() {
    let method = static_method("fail", vec![param("e", JvmType::object())], JvmType::Void, block(vec![throw(var("e"))]));
    let compiled = compile(&class_with(vec![method]));
    let text = listing(&compiled, "fail");

    assert!(text.contains("CHECKCAST class java/lang/Throwable"), "{text}");
    assert!(text.trim_end().ends_with("ATHROW"), "{text}");

    let class = read(&compiled);
    let mut evaluator = Evaluator::new(&class, ScriptedHost::fast());
    let err = evaluator.invoke_static("fail", "(Ljava/lang/Object;)V", vec![Value::str("boom")]).unwrap_err();
    assert!(matches!(err, VerifyError::Thrown(_)), "{err}");
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let method = static_method("f", vec![], JvmType::Void, block(vec![break_stmt()]));
    let err = compile_class(&class_with(vec![method]), &Config::default()).unwrap_err();

    assert!(matches!(err, Error::Semantic { .. }), "{err}");
}

#[test]
fn returning_a_value_from_a_void_method_is_rejected() {
    let method = static_method("f", vec![], JvmType::Void, block(vec![ret(int(1))]));
    let err = compile_class(&class_with(vec![method]), &Config::default()).unwrap_err();

    assert!(err.to_string().starts_with("Semantic error"), "{err}");
}

#[test]
fn invalid_configuration_is_rejected_before_generation() {
    let config = Config { max_call_sites_per_method: 0, ..Config::default() };
    let err = compile_class(&class_with(vec![]), &config).unwrap_err();

    assert!(matches!(err, Error::Config { .. }), "{err}");
}

#[test]
fn configuration_from_toml_keeps_defaults() {
    let config = Config::from_toml_str("optimize_primitives = false\nsource_file = \"Calc.groovy\"\n").unwrap();

    assert!(!config.optimize_primitives);
    assert_eq!(config.source_file.as_deref(), Some("Calc.groovy"));
    assert_eq!(config.max_errors, Config::default().max_errors);
}

#[test]
fn several_classes_compile_in_order() {
    let mut other = ClassNode::new("demo/Other");
    other.methods.push(int_binary_method("mul", BinaryOp::Multiply));
    let classes = vec![class_with(vec![int_binary_method("add", BinaryOp::Plus)]), other];

    let compiled = compile_classes(&classes, &Config::default()).unwrap();
    let names: Vec<_> = compiled.iter().map(|c| c.name.as_str()).collect();

    assert_eq!(names, vec!["demo/Calc", "demo/Other"]);
    assert_eq!(compiled[1].call_site_names, vec!["multiply"]);
}

#[test]
fn interface_methods_are_abstract() {
    let mut iface = ClassNode::new("demo/Shape");
    iface.is_interface = true;
    iface.methods.push(method("area", vec![], JvmType::Double, block(vec![])));

    let compiled = compile(&iface);
    let class = read(&compiled);
    let area = class.method("area").expect("area");

    assert!(area.code.is_none());
    assert!(class.field("__$stMC").is_none());
}
