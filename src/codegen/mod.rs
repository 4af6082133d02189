//! Bytecode generation
//!
//! Turns an annotated [`ClassNode`](crate::ast::ClassNode) into a class file.
//!
//! ## Layout
//!
//! - **code / class_writer / constpool**: instruction buffer with labels and
//!   line numbers, structural class file emission, constant pool
//! - **operand_stack**: compile-time model of the JVM operand stack; every
//!   emitted instruction updates it so casts, boxing and swaps pick the right
//!   opcodes
//! - **compile_stack**: local variable slots, scopes and loop labels
//! - **binary**: operator lowering through the primitive strategy chain,
//!   assignments and subscripts
//! - **call_site / invocation**: cached dynamic call sites and direct calls
//! - **optimizing**: guarded fast/slow path duplication of statements
//! - **class_gen**: fields, methods and the synthetic call-site members
//! - **groovy_object**: the `GroovyObject` methods and meta class field

pub mod attribute;
pub mod binary;
pub mod bytecode_helper;
pub mod call_site;
pub mod class;
pub mod class_gen;
pub mod class_writer;
pub mod code;
pub mod compile_stack;
pub mod constpool;
pub mod controller;
pub mod defs;
pub mod descriptor;
pub mod groovy_object;
pub mod invocation;
pub mod opcodes;
pub mod operand_stack;
pub mod writer;

mod expr;
mod optimizing;
mod statement;
mod type_chooser;

pub use call_site::CallSiteTable;
pub use class_gen::{generate_class, CompiledClass};
pub use class_writer::ClassWriter;
pub use code::{Code, CodeBody, Label};
pub use compile_stack::{BytecodeVariable, CompileStack};
pub use constpool::ConstantPool;
pub use controller::MethodGen;
pub use operand_stack::OperandStack;
