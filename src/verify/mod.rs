//! Class-file level checks of generated output
//!
//! Independent of the generator: the reader parses the emitted bytes back,
//! the stack analysis recomputes operand stack depths from the instructions
//! alone, and the evaluator executes method bodies against a [`Host`] that
//! stands in for the runtime library.

pub mod disasm;
pub mod insn;
pub mod interp;
pub mod reader;
pub mod stack_depth;

use log::debug;

pub use disasm::{disassemble, disassemble_with_depths};
pub use insn::{decode, Arg, Insn};
pub use interp::{Evaluator, Host, Value};
pub use reader::{ClassReader, CodeAttr, MemberRef, MethodEntry, PoolEntry};
pub use stack_depth::{analyze_stack, StackAnalysis};

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("Truncated class file at offset {0}")]
    Truncated(usize),
    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("Unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: u16 },
    #[error("Invalid constant pool index {index} (expected {expected})")]
    BadConstant { index: u16, expected: &'static str },
    #[error("Malformed UTF-8 constant at index {0}")]
    BadUtf8(u16),
    #[error("Invalid opcode {op:#04x} at pc {pc}")]
    BadOpcode { pc: usize, op: u8 },
    #[error("Jump at pc {pc} targets {target}, which is not an instruction")]
    BadJumpTarget { pc: usize, target: i64 },
    #[error("Malformed descriptor {0}")]
    BadDescriptor(String),
    #[error("{method}: operand stack underflow at pc {pc}")]
    Underflow { method: String, pc: usize },
    #[error("{method}: inconsistent stack depth at pc {pc}: {expected} vs {found}")]
    InconsistentDepth { method: String, pc: usize, expected: u16, found: u16 },
    #[error("{method}: stack depth {depth} at pc {pc} exceeds max_stack {max}")]
    MaxStackExceeded { method: String, pc: usize, depth: u16, max: u16 },
    #[error("{method}: execution falls off the end of the code after pc {pc}")]
    FallsOffEnd { method: String, pc: usize },
    #[error("{method}: analysis did not converge")]
    NoConvergence { method: String },
    #[error("Evaluation error: {0}")]
    Eval(String),
    #[error("Host error: {0}")]
    Host(String),
    #[error("Exception thrown: {0}")]
    Thrown(String),
}

/// Parse `bytes` and run the stack-depth analysis over every method with
/// code. Returns the parsed class on success.
pub fn verify_class(bytes: &[u8]) -> VerifyResult<ClassReader> {
    let class = ClassReader::parse(bytes)?;
    for method in &class.methods {
        if method.code.is_some() {
            let analysis = analyze_stack(&class, method)?;
            debug!("{}.{}{}: max depth {}", class.name, method.name, method.descriptor, analysis.max_depth);
        }
    }
    Ok(class)
}
