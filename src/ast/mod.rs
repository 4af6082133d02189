//! Annotated syntax tree consumed by the generator
//!
//! The tree is produced by an external parser and typing pass. Nodes are closed
//! sum types ([`ExprKind`], [`StmtKind`]) matched exhaustively by the generator.
//! Each node may carry [`NodeMeta`]: an inferred static type, a resolved call
//! target and the optimizable-region flags that drive fast path generation.

mod nodes;
mod printer;
pub mod build;
pub mod types;

pub use nodes::*;
pub use types::{JvmType, OperandKind};

/// Source position of a node, passed through to the LineNumberTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    pub last_line: u32,
    pub last_column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column, last_line: line, last_column: column }
    }

    pub fn span(line: u32, column: u32, last_line: u32, last_column: u32) -> Self {
        Self { line, column, last_line, last_column }
    }

    /// Positions with line 0 come from synthesized nodes and are not recorded
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}
