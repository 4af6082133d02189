//! The fast and slow copies of a forked region must compute the same values.
//! `ScriptedHost::fast()` passes every guard; `ScriptedHost::slow()` fails
//! them, so the same class runs through each copy in turn.

mod common;

use common::*;
use gbc::ast::build::*;
use gbc::ast::{BinaryOp, IncDec, JvmType, MethodNode};
use gbc::verify::{Evaluator, Value};
use gbc::CompiledClass;
use rstest::rstest;

fn run_value(compiled: &CompiledClass, host: ScriptedHost, name: &str, desc: &str, args: Vec<Value>) -> (Value, Vec<String>) {
    let class = read(compiled);
    let mut evaluator = Evaluator::new(&class, host);
    let result = evaluator
        .invoke_static(name, desc, args)
        .expect("method runs")
        .expect("method returns a value");
    let messages = evaluator.host().messages.clone();
    (result, messages)
}

fn run(compiled: &CompiledClass, host: ScriptedHost, name: &str, desc: &str, args: Vec<Value>) -> (i32, Vec<String>) {
    let (result, messages) = run_value(compiled, host, name, desc, args);
    (result.as_int().expect("int result"), messages)
}

/// `static <ty> m(<ty> a, <ty> b) { return a <op> b }`
fn typed_binary_method(ty: JvmType, result: JvmType, op: BinaryOp) -> MethodNode {
    static_method(
        "m",
        vec![param("a", ty.clone()), param("b", ty)],
        result,
        block(vec![ret(binary(op, var("a"), var("b")))]),
    )
}

fn both_paths(compiled: &CompiledClass, name: &str, desc: &str, args: Vec<Value>) -> ((i32, Vec<String>), (i32, Vec<String>)) {
    (
        run(compiled, ScriptedHost::fast(), name, desc, args.clone()),
        run(compiled, ScriptedHost::slow(), name, desc, args),
    )
}

/// `static int sum(int n) { int s = 0; int i = 0; while (i < n) { s = s + i; i++ }; return s }`
fn sum_method() -> MethodNode {
    static_method(
        "sum",
        vec![param("n", JvmType::Int)],
        JvmType::Int,
        block(vec![
            expr_stmt(declare("s", JvmType::Int, Some(int(0)))),
            expr_stmt(declare("i", JvmType::Int, Some(int(0)))),
            while_loop(
                binary(BinaryOp::LessThan, var("i"), var("n")),
                block(vec![
                    expr_stmt(assign(var("s"), binary(BinaryOp::Plus, var("s"), var("i")))),
                    expr_stmt(postfix(IncDec::Increment, var("i"))),
                ]),
            ),
            ret(var("s")),
        ]),
    )
}

#[test]
fn addition_agrees_and_only_the_slow_path_dispatches() {
    let compiled = compile(&class_with(vec![int_binary_method("add", BinaryOp::Plus)]));
    let ((fast, fast_messages), (slow, slow_messages)) =
        both_paths(&compiled, "add", "(II)I", vec![Value::Int(2), Value::Int(3)]);

    assert_eq!(fast, 5);
    assert_eq!(slow, 5);
    assert!(fast_messages.is_empty(), "{fast_messages:?}");
    assert_eq!(slow_messages, vec!["plus"]);
}

#[rstest]
#[case(BinaryOp::Plus, 10)]
#[case(BinaryOp::Minus, 4)]
#[case(BinaryOp::Multiply, 21)]
#[case(BinaryOp::Mod, 1)]
#[case(BinaryOp::IntDiv, 2)]
fn int_operators_agree(#[case] op: BinaryOp, #[case] expected: i32) {
    let compiled = compile(&class_with(vec![int_binary_method("m", op)]));
    let ((fast, _), (slow, _)) = both_paths(&compiled, "m", "(II)I", vec![Value::Int(7), Value::Int(3)]);

    assert_eq!(fast, expected);
    assert_eq!(slow, expected);
}

#[test]
fn addition_overflow_wraps_on_the_fast_path() {
    let compiled = compile(&class_with(vec![int_binary_method("add", BinaryOp::Plus)]));
    let (fast, _) = run(&compiled, ScriptedHost::fast(), "add", "(II)I", vec![Value::Int(i32::MAX), Value::Int(1)]);

    assert_eq!(fast, i32::MIN);
}

#[rstest]
#[case(1, 2, 1)]
#[case(2, 2, 0)]
#[case(3, 2, 0)]
fn comparison_agrees(#[case] a: i32, #[case] b: i32, #[case] expected: i32) {
    let method = static_method(
        "lt",
        vec![param("a", JvmType::Int), param("b", JvmType::Int)],
        JvmType::Boolean,
        block(vec![ret(binary(BinaryOp::LessThan, var("a"), var("b")))]),
    );
    let compiled = compile(&class_with(vec![method]));
    let ((fast, _), (slow, _)) = both_paths(&compiled, "lt", "(II)Z", vec![Value::Int(a), Value::Int(b)]);

    assert_eq!(fast, expected);
    assert_eq!(slow, expected);
}

#[test]
fn loop_agrees() {
    let compiled = compile(&class_with(vec![sum_method()]));
    let ((fast, fast_messages), (slow, slow_messages)) = both_paths(&compiled, "sum", "(I)I", vec![Value::Int(4)]);

    assert_eq!(fast, 6);
    assert_eq!(slow, 6);
    assert!(fast_messages.is_empty(), "{fast_messages:?}");
    assert!(slow_messages.iter().any(|m| m == "plus"), "{slow_messages:?}");
    assert!(slow_messages.iter().any(|m| m == "next"), "{slow_messages:?}");
}

#[test]
fn loop_with_no_iterations() {
    let compiled = compile(&class_with(vec![sum_method()]));
    let ((fast, _), (slow, slow_messages)) = both_paths(&compiled, "sum", "(I)I", vec![Value::Int(0)]);

    assert_eq!(fast, 0);
    assert_eq!(slow, 0);
    assert!(slow_messages.is_empty(), "{slow_messages:?}");
}

#[test]
fn unoptimized_code_always_dispatches() {
    let compiled = compile_with(&class_with(vec![int_binary_method("add", BinaryOp::Plus)]), &gbc::Config::unoptimized());
    let (result, messages) = run(&compiled, ScriptedHost::fast(), "add", "(II)I", vec![Value::Int(2), Value::Int(3)]);

    assert_eq!(result, 5);
    assert_eq!(messages, vec!["plus"]);
}

#[rstest]
#[case(BinaryOp::Plus, 10)]
#[case(BinaryOp::Minus, 4)]
#[case(BinaryOp::Multiply, 21)]
#[case(BinaryOp::Mod, 1)]
#[case(BinaryOp::IntDiv, 2)]
fn long_operators_agree(#[case] op: BinaryOp, #[case] expected: i64) {
    let compiled = compile(&class_with(vec![typed_binary_method(JvmType::Long, JvmType::Long, op)]));
    let args = vec![Value::Long(7), Value::Long(3)];

    let (fast, fast_messages) = run_value(&compiled, ScriptedHost::fast(), "m", "(JJ)J", args.clone());
    let (slow, slow_messages) = run_value(&compiled, ScriptedHost::slow(), "m", "(JJ)J", args);

    assert_eq!(fast, Value::Long(expected));
    assert_eq!(slow, Value::Long(expected));
    assert!(fast_messages.is_empty(), "{fast_messages:?}");
    assert_eq!(slow_messages.len(), 1);
}

#[rstest]
#[case(BinaryOp::Plus, 10.0)]
#[case(BinaryOp::Minus, 5.0)]
#[case(BinaryOp::Multiply, 18.75)]
#[case(BinaryOp::Divide, 3.0)]
fn double_operators_agree(#[case] op: BinaryOp, #[case] expected: f64) {
    let compiled = compile(&class_with(vec![typed_binary_method(JvmType::Double, JvmType::Double, op)]));
    let args = vec![Value::Double(7.5), Value::Double(2.5)];

    let (fast, fast_messages) = run_value(&compiled, ScriptedHost::fast(), "m", "(DD)D", args.clone());
    let (slow, _) = run_value(&compiled, ScriptedHost::slow(), "m", "(DD)D", args);

    assert_eq!(fast, Value::Double(expected));
    assert_eq!(slow, Value::Double(expected));
    assert!(fast_messages.is_empty(), "{fast_messages:?}");
}

#[rstest]
#[case(JvmType::Int, Value::Int(1), Value::Int(2), -1)]
#[case(JvmType::Int, Value::Int(2), Value::Int(2), 0)]
#[case(JvmType::Long, Value::Long(3), Value::Long(2), 1)]
#[case(JvmType::Long, Value::Long(-5), Value::Long(2), -1)]
#[case(JvmType::Double, Value::Double(2.5), Value::Double(2.5), 0)]
#[case(JvmType::Double, Value::Double(3.5), Value::Double(-2.0), 1)]
fn compare_to_agrees(#[case] ty: JvmType, #[case] a: Value, #[case] b: Value, #[case] expected: i32) {
    let desc = format!("({0}{0})I", ty.descriptor());
    let compiled = compile(&class_with(vec![typed_binary_method(ty, JvmType::Int, BinaryOp::CompareTo)]));
    let ((fast, _), (slow, _)) = both_paths(&compiled, "m", &desc, vec![a, b]);

    assert_eq!(fast, expected);
    assert_eq!(slow, expected);
}

/// `static int sum(int a, int b) { int s = a + b; return s }`
#[test]
fn forked_declaration_is_defined_before_the_guards() {
    let method = static_method(
        "sum",
        vec![param("a", JvmType::Int), param("b", JvmType::Int)],
        JvmType::Int,
        block(vec![
            expr_stmt(declare("s", JvmType::Int, Some(binary(BinaryOp::Plus, var("a"), var("b"))))),
            ret(var("s")),
        ]),
    );
    let compiled = compile(&class_with(vec![method]));
    let text = listing(&compiled, "sum");
    let guard = text.find("isOrigInt").expect("guarded");

    assert!(text.find("ICONST_0").is_some_and(|pc| pc < guard), "{text}");
    assert!(text.find("ISTORE").is_some_and(|pc| pc < guard), "{text}");
    let ((fast, _), (slow, slow_messages)) = both_paths(&compiled, "sum", "(II)I", vec![Value::Int(2), Value::Int(3)]);
    assert_eq!(fast, 5);
    assert_eq!(slow, 5);
    assert_eq!(slow_messages, vec!["plus"]);
}

/// `static int skip(int n) { int s = 0; for (int i = 0; i < n; i++) { if (i == 2) continue; s = s + i }; return s }`
#[test]
fn counted_loop_agrees() {
    let method = static_method(
        "skip",
        vec![param("n", JvmType::Int)],
        JvmType::Int,
        block(vec![
            expr_stmt(declare("s", JvmType::Int, Some(int(0)))),
            for_loop(
                vec![declare("i", JvmType::Int, Some(int(0)))],
                Some(binary(BinaryOp::LessThan, var("i"), var("n"))),
                vec![postfix(IncDec::Increment, var("i"))],
                block(vec![
                    if_else(binary(BinaryOp::Equal, var("i"), int(2)), continue_stmt(), None),
                    expr_stmt(assign(var("s"), binary(BinaryOp::Plus, var("s"), var("i")))),
                ]),
            ),
            ret(var("s")),
        ]),
    );
    let compiled = compile(&class_with(vec![method]));
    let ((fast, fast_messages), (slow, slow_messages)) = both_paths(&compiled, "skip", "(I)I", vec![Value::Int(5)]);

    assert_eq!(fast, 8);
    assert_eq!(slow, 8);
    assert!(fast_messages.is_empty(), "{fast_messages:?}");
    assert_eq!(slow_messages.iter().filter(|m| *m == "next").count(), 5);
}

/// `static int total(int[] xs) { int s = 0; for (int x in xs) { s += x }; return s }`
#[test]
fn iterated_loop_agrees() {
    let method = static_method(
        "total",
        vec![param("xs", JvmType::array_of(JvmType::Int))],
        JvmType::Int,
        block(vec![
            expr_stmt(declare("s", JvmType::Int, Some(int(0)))),
            for_in(
                "x",
                JvmType::Int,
                var("xs"),
                block(vec![expr_stmt(op_assign(BinaryOp::Plus, var("s"), var("x")))]),
            ),
            ret(var("s")),
        ]),
    );
    let compiled = compile(&class_with(vec![method]));
    let xs = Value::array(vec![Value::Int(4), Value::Int(5), Value::Int(6)]);
    let ((fast, fast_messages), (slow, slow_messages)) = both_paths(&compiled, "total", "([I)I", vec![xs]);

    assert_eq!(fast, 15);
    assert_eq!(slow, 15);
    assert_eq!(fast_messages, vec!["iterator"]);
    assert_eq!(slow_messages, vec!["iterator", "plus", "plus", "plus"]);
}
