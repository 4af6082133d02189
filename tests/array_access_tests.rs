mod common;

use common::*;
use gbc::ast::build::*;
use gbc::ast::{BinaryOp, IncDec, JvmType, MethodNode};
use gbc::verify::{Evaluator, Value};
use rstest::rstest;

fn int_array(values: &[i32]) -> Value {
    Value::array(values.iter().map(|v| Value::Int(*v)).collect())
}

fn elements(array: &Value) -> Vec<i32> {
    match array {
        Value::Array(values) => values.borrow().iter().map(|v| v.as_int().expect("int element")).collect(),
        other => panic!("not an array: {other:?}"),
    }
}

/// `static int at(int[] xs, int i) { return xs[i] }`
fn at_method() -> MethodNode {
    static_method(
        "at",
        vec![param("xs", JvmType::array_of(JvmType::Int)), param("i", JvmType::Int)],
        JvmType::Int,
        block(vec![ret(index(var("xs"), var("i")))]),
    )
}

/// `static int bump(int[] xs, int i) { xs[i++] += 5; return i }`
fn bump_method() -> MethodNode {
    static_method(
        "bump",
        vec![param("xs", JvmType::array_of(JvmType::Int)), param("i", JvmType::Int)],
        JvmType::Int,
        block(vec![
            expr_stmt(op_assign(
                BinaryOp::Plus,
                index(var("xs"), postfix(IncDec::Increment, var("i"))),
                int(5),
            )),
            ret(var("i")),
        ]),
    )
}

#[rstest]
#[case(0, 10)]
#[case(2, 30)]
#[case(-1, 30)]
#[case(-3, 10)]
fn native_read_normalizes_negative_indexes(#[case] i: i32, #[case] expected: i32) {
    let compiled = compile(&class_with(vec![at_method()]));
    let class = read(&compiled);

    for host in [ScriptedHost::fast(), ScriptedHost::slow()] {
        let mut evaluator = Evaluator::new(&class, host);
        let result = evaluator
            .invoke_static("at", "([II)I", vec![int_array(&[10, 20, 30]), Value::Int(i)])
            .expect("read runs");
        assert_eq!(result.map(|v| v.as_int().ok()), Some(Some(expected)));
    }
}

#[test]
fn read_past_the_end_throws() {
    let compiled = compile(&class_with(vec![at_method()]));
    let class = read(&compiled);
    let mut evaluator = Evaluator::new(&class, ScriptedHost::fast());

    let err = evaluator
        .invoke_static("at", "([II)I", vec![int_array(&[10]), Value::Int(1)])
        .unwrap_err();
    assert!(err.to_string().contains("ArrayIndexOutOfBoundsException"), "{err}");
}

#[test]
fn compound_element_assignment_evaluates_the_index_once() {
    let compiled = compile(&class_with(vec![bump_method()]));
    let class = read(&compiled);

    for (host, dispatched) in [(ScriptedHost::fast(), false), (ScriptedHost::slow(), true)] {
        let xs = int_array(&[1, 2, 3]);
        let mut evaluator = Evaluator::new(&class, host);
        let result = evaluator
            .invoke_static("bump", "([II)I", vec![xs.clone(), Value::Int(1)])
            .expect("bump runs")
            .expect("bump returns");

        assert_eq!(result.as_int().expect("int"), 2);
        assert_eq!(elements(&xs), vec![1, 7, 3]);
        assert_eq!(evaluator.host().messages.iter().any(|m| m == "plus"), dispatched);
    }
}

#[test]
fn slow_copy_of_compound_element_assignment_dispatches() {
    let method = static_method(
        "bump",
        vec![param("xs", JvmType::array_of(JvmType::Int))],
        JvmType::Int,
        block(vec![expr_stmt(op_assign(BinaryOp::Plus, index(var("xs"), int(0)), int(5))), ret(int(0))]),
    );
    let compiled = compile(&class_with(vec![method]));
    let class = read(&compiled);
    let xs = int_array(&[1, 2]);
    let mut evaluator = Evaluator::new(&class, ScriptedHost::slow());

    evaluator.invoke_static("bump", "([I)I", vec![xs.clone()]).expect("bump runs");

    assert_eq!(elements(&xs), vec![6, 2]);
    assert_eq!(evaluator.host().messages, vec!["getAt", "plus", "putAt"]);
    assert_eq!(count(&listing(&compiled, "bump"), "IASTORE"), 1);
}

#[test]
fn compound_element_assignment_is_native_when_fast() {
    let compiled = compile(&class_with(vec![bump_method()]));
    let text = listing(&compiled, "bump");

    assert!(text.contains("IASTORE"), "{text}");
    assert!(text.contains("IADD"), "{text}");
    assert!(text.contains("isOrigInt"), "{text}");
}

#[test]
fn object_array_subscript_stays_dynamic() {
    let method = static_method(
        "at",
        vec![param("xs", JvmType::array_of(JvmType::object())), param("i", JvmType::Int)],
        JvmType::object(),
        block(vec![ret(index(var("xs"), var("i")))]),
    );
    let compiled = compile(&class_with(vec![method]));
    let text = listing(&compiled, "at");

    // every AALOAD fetches a call site
    assert_eq!(count(&text, "AALOAD"), count(&text, "CallSite.call:"), "{text}");
    assert_eq!(compiled.call_site_names, vec!["getAt"]);
}
