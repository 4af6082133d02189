mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use common::*;
use gbc::ast::BinaryOp;
use tempfile::TempDir;

fn gbc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gbc")).args(args).output().expect("gbc runs")
}

fn write_class(dir: &Path, file: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, bytes).expect("write class file");
    path
}

fn calc_class(dir: &Path) -> PathBuf {
    let compiled = compile(&class_with(vec![
        int_binary_method("add", BinaryOp::Plus),
        int_binary_method("sub", BinaryOp::Minus),
    ]));
    write_class(dir, "Calc.class", &compiled.bytes)
}

#[test]
fn disasm_lists_every_method() {
    let dir = TempDir::new().unwrap();
    let path = calc_class(dir.path());

    let output = gbc(&["disasm", path.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("add(II)I (max_stack="), "{stdout}");
    assert!(stdout.contains("sub(II)I (max_stack="), "{stdout}");
    assert!(stdout.contains("$getCallSiteArray"), "{stdout}");
}

#[test]
fn disasm_filters_by_method_and_shows_depths() {
    let dir = TempDir::new().unwrap();
    let path = calc_class(dir.path());

    let output = gbc(&["disasm", path.to_str().unwrap(), "--method", "add", "--depth"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("add(II)I"), "{stdout}");
    assert!(!stdout.contains("sub(II)I"), "{stdout}");
    assert!(stdout.contains("    0: [ 0] "), "{stdout}");
}

#[test]
fn disasm_of_unknown_method_fails() {
    let dir = TempDir::new().unwrap();
    let path = calc_class(dir.path());

    let output = gbc(&["disasm", path.to_str().unwrap(), "-m", "missing"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no method named missing"));
}

#[test]
fn check_reports_each_file() {
    let dir = TempDir::new().unwrap();
    let good = calc_class(dir.path());
    let bad = write_class(dir.path(), "Broken.class", &[0xCA, 0xFE, 0x00]);

    let output = gbc(&["check", good.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(": ok ("));

    let output = gbc(&["check", good.to_str().unwrap(), bad.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("Broken.class: Truncated class file"), "{stdout}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 class files failed verification"));
}

#[test]
fn check_requires_an_input() {
    let output = gbc(&["check"]);
    assert!(!output.status.success());
}
