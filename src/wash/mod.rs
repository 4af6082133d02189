//! Pre-generation passes
//!
//! - Validate: user errors the generator would otherwise hit mid-method
//! - Opt: optimizable region flags, inferred types and direct call targets
//!
//! Both passes read the tree; the annotation pass returns an annotated copy
//! which generation then treats as immutable.

pub mod opt;
pub mod validate;

pub use opt::annotate;
pub use validate::validate;
