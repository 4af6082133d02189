//! Groovy-style bytecode generation core (gbc)
//!
//! Turns an annotated class tree of a dynamic JVM language into class files
//! that dispatch through cached call sites, with guarded primitive fast paths
//! where the tree marks a region as optimizable.
//!
//! ## Architecture
//!
//! - **ast**: annotated syntax tree handed over by the front end
//! - **wash**: validation and the optimization annotator
//! - **codegen**: operand stack tracking, operator lowering, call-site and
//!   direct invocation writers, fast/slow path duplication, class emission
//! - **verify**: class reader, disassembler, stack depth analysis and an
//!   evaluator used to check generated output
//! - **common**: errors and configuration
//! - **bin**: command-line inspection tool
//!
//! ## Compilation Flow
//!
//! ```text
//! ClassNode → validate → annotate → generate_class → class file bytes
//! ```

pub mod ast;
pub mod codegen;
pub mod common;
pub mod consts;
pub mod verify;
pub mod wash;

pub use codegen::CompiledClass;
pub use common::{Config, Error, Result};

use log::debug;

/// Compile one class: validate the tree, annotate optimizable regions and
/// generate the class file.
///
/// With `optimize_primitives` off the annotation pass is skipped and every
/// operation is dispatched dynamically.
pub fn compile_class(class: &ast::ClassNode, config: &Config) -> Result<CompiledClass> {
    config.validate()?;
    wash::validate(class, config)?;
    let compiled = if config.optimize_primitives {
        let annotated = wash::annotate(class);
        codegen::generate_class(&annotated, config)?
    } else {
        codegen::generate_class(class, config)?
    };
    debug!("compiled {} ({} bytes, {} call sites)", compiled.name, compiled.bytes.len(), compiled.call_site_names.len());
    Ok(compiled)
}

/// Compile several classes, stopping at the first failure
pub fn compile_classes(classes: &[ast::ClassNode], config: &Config) -> Result<Vec<CompiledClass>> {
    classes.iter().map(|class| compile_class(class, config)).collect()
}
