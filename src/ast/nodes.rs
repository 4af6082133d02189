use std::sync::atomic::{AtomicU32, Ordering};

use super::types::{JvmType, OperandKind};
use super::SourcePos;

/// Identity of an expression or statement node.
///
/// Clones keep the id, so both copies of a region duplicated for the fast
/// and slow paths map to the same call-site slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Set of primitive kinds an optimized region depends on. Each one gets a
/// runtime guard at the fork point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct InvolvedTypes(u16);

impl InvolvedTypes {
    pub fn insert(&mut self, kind: OperandKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn insert_type(&mut self, ty: &JvmType) {
        self.insert(OperandKind::of(ty));
    }

    pub fn contains(&self, kind: OperandKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    pub fn union(&mut self, other: InvolvedTypes) {
        self.0 |= other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Kinds in strategy-table order
    pub fn iter(&self) -> impl Iterator<Item = OperandKind> + '_ {
        OperandKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

/// A method statically resolved by the typing pass
#[derive(Debug, Clone, PartialEq)]
pub struct MethodTarget {
    /// Internal name of the declaring class
    pub owner: String,
    pub name: String,
    pub params: Vec<JvmType>,
    pub return_type: JvmType,
    pub is_static: bool,
    pub is_private: bool,
    pub is_interface: bool,
    pub is_varargs: bool,
}

impl MethodTarget {
    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.return_type)
    }
}

pub fn method_descriptor(params: &[JvmType], ret: &JvmType) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

/// Metadata attached to a node by the upstream analysis.
///
/// Advisory only: generation must stay correct if a guard built from it
/// fails at runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    /// The node lies in a region that may be duplicated into a fast path
    pub optimize: bool,
    /// Inferred static type
    pub ty: Option<JvmType>,
    /// Resolved call target for method calls
    pub target: Option<MethodTarget>,
    /// Primitive kinds the region assumes unmodified
    pub involved: InvolvedTypes,
}

impl NodeMeta {
    pub fn typed(ty: JvmType) -> Self {
        Self { optimize: true, ty: Some(ty), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Boolean(bool),
    Char(u16),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Decimal literal kept in its source spelling
    BigDecimal(String),
    BigInteger(String),
}

impl Constant {
    pub fn ty(&self) -> JvmType {
        match self {
            Constant::Null => JvmType::object(),
            Constant::Boolean(_) => JvmType::Boolean,
            Constant::Char(_) => JvmType::Char,
            Constant::Byte(_) => JvmType::Byte,
            Constant::Short(_) => JvmType::Short,
            Constant::Int(_) => JvmType::Int,
            Constant::Long(_) => JvmType::Long,
            Constant::Float(_) => JvmType::Float,
            Constant::Double(_) => JvmType::Double,
            Constant::String(_) => JvmType::string(),
            Constant::BigDecimal(_) => JvmType::big_decimal(),
            Constant::BigInteger(_) => JvmType::big_integer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    IntDiv,
    Mod,
    Power,
    BitAnd,
    BitOr,
    BitXor,
    LeftShift,
    RightShift,
    RightShiftUnsigned,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    CompareTo,
    LogicalAnd,
    LogicalOr,
    /// `a[i]`
    Index,
}

impl BinaryOp {
    /// Dynamic dispatch message for operators lowered through a call site
    pub fn message(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Plus => "plus",
            BinaryOp::Minus => "minus",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "div",
            BinaryOp::IntDiv => "intdiv",
            BinaryOp::Mod => "mod",
            BinaryOp::Power => "power",
            BinaryOp::BitAnd => "and",
            BinaryOp::BitOr => "or",
            BinaryOp::BitXor => "xor",
            BinaryOp::LeftShift => "leftShift",
            BinaryOp::RightShift => "rightShift",
            BinaryOp::RightShiftUnsigned => "rightShiftUnsigned",
            BinaryOp::Index => "getAt",
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Identical
                | BinaryOp::NotIdentical
                | BinaryOp::LessThan
                | BinaryOp::LessThanEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanEqual
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::LeftShift | BinaryOp::RightShift | BinaryOp::RightShiftUnsigned)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntDiv => "intdiv",
            BinaryOp::Mod => "%",
            BinaryOp::Power => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::RightShiftUnsigned => ">>>",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanEqual => ">=",
            BinaryOp::CompareTo => "<=>",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Index => "[]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncDec {
    Increment,
    Decrement,
}

impl IncDec {
    pub fn message(self) -> &'static str {
        match self {
            IncDec::Increment => crate::consts::NEXT_MESSAGE,
            IncDec::Decrement => crate::consts::PREVIOUS_MESSAGE,
        }
    }
}

/// Left-hand side of a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum DeclTarget {
    Single {
        name: String,
        ty: JvmType,
        /// Captured by a closure: stored in a shared `Reference` cell
        holder: bool,
    },
    /// `def (a, b) = rhs`
    Tuple(Vec<(String, JvmType)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    /// Local variable or parameter
    Variable(String),
    This,
    Super,
    ClassRef(JvmType),
    /// Field of the class under generation, accessed directly
    Field { name: String },
    /// Dynamic property access
    Property { receiver: Box<Expr>, name: String, safe: bool },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, safe: bool },
    /// `target = value`, or `target op= value` when `op` is set
    Assign { target: Box<Expr>, op: Option<BinaryOp>, value: Box<Expr> },
    Declaration { target: DeclTarget, value: Option<Box<Expr>> },
    Prefix { op: IncDec, operand: Box<Expr> },
    Postfix { op: IncDec, operand: Box<Expr> },
    Not(Box<Expr>),
    UnaryMinus(Box<Expr>),
    BitwiseNegate(Box<Expr>),
    MethodCall {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        safe: bool,
        spread_safe: bool,
        implicit_this: bool,
    },
    /// Call with a class receiver: `Math.abs(x)`, or an unqualified call in a
    /// static context
    StaticCall { owner: JvmType, name: String, args: Vec<Expr> },
    ConstructorCall { ty: JvmType, args: Vec<Expr> },
    /// `(T) e`, or `e as T` when `coerce` is set
    Cast { ty: JvmType, expr: Box<Expr>, coerce: bool },
    InstanceOf { expr: Box<Expr>, ty: JvmType },
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    /// `*list` in an argument list
    Spread(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub pos: SourcePos,
    pub meta: Option<NodeMeta>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { id: NodeId::fresh(), kind, pos: SourcePos::default(), meta: None }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Attach an inferred type, keeping any other metadata
    pub fn typed(mut self, ty: JvmType) -> Self {
        self.meta.get_or_insert_with(NodeMeta::default).ty = Some(ty);
        self
    }

    pub fn meta_type(&self) -> Option<&JvmType> {
        self.meta.as_ref().and_then(|m| m.ty.as_ref())
    }

    pub fn meta_target(&self) -> Option<&MethodTarget> {
        self.meta.as_ref().and_then(|m| m.target.as_ref())
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(Constant::Null))
    }

    pub fn is_spread(&self) -> bool {
        matches!(self.kind, ExprKind::Spread(_))
    }

    pub fn is_subscript(&self) -> bool {
        matches!(self.kind, ExprKind::Binary { op: BinaryOp::Index, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    Expression(Expr),
    Return(Option<Expr>),
    If { cond: Expr, then: Box<Stmt>, otherwise: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    /// `for (init; cond; update) body`; no condition loops until a break
    For { init: Vec<Expr>, cond: Option<Expr>, update: Vec<Expr>, body: Box<Stmt> },
    /// `for (ty var in collection) body` over `collection.iterator()`
    ForIn { var: String, ty: JvmType, collection: Expr, body: Box<Stmt> },
    Throw(Expr),
    Break,
    Continue,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub pos: SourcePos,
    pub meta: Option<NodeMeta>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { id: NodeId::fresh(), kind, pos: SourcePos::default(), meta: None }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_empty_block(&self) -> bool {
        match &self.kind {
            StmtKind::Block(stmts) => stmts.is_empty(),
            StmtKind::Empty => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: JvmType,
    /// Captured by a closure: the parameter value is moved into a holder
    pub holder: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: JvmType) -> Self {
        Self { name: name.into(), ty, holder: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub ty: JvmType,
    pub is_static: bool,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: JvmType,
    pub is_static: bool,
    pub is_private: bool,
    pub is_varargs: bool,
    pub body: Stmt,
    pub pos: SourcePos,
}

impl MethodNode {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_init(&self) -> bool {
        self.name == "<clinit>"
    }

    pub fn param_types(&self) -> Vec<JvmType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(&self.param_types(), &self.return_type)
    }

    pub fn target(&self, owner: &str) -> MethodTarget {
        MethodTarget {
            owner: owner.to_string(),
            name: self.name.clone(),
            params: self.param_types(),
            return_type: self.return_type.clone(),
            is_static: self.is_static,
            is_private: self.is_private,
            is_interface: false,
            is_varargs: self.is_varargs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    /// Internal name (`demo/Calc`)
    pub name: String,
    pub super_class: String,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    pub pos: SourcePos,
}

impl ClassNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_class: crate::consts::OBJECT.to_string(),
            interfaces: Vec::new(),
            is_interface: false,
            fields: Vec::new(),
            methods: Vec::new(),
            pos: SourcePos::default(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Method declared in this class with exactly these parameter types
    pub fn find_method(&self, name: &str, params: &[JvmType]) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.params.len() == params.len() && m.param_types() == params)
    }

    pub fn this_type(&self) -> JvmType {
        JvmType::class(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_keep_node_identity() {
        let e = Expr::new(ExprKind::Variable("x".into()));
        let copy = e.clone();
        assert_eq!(e.id, copy.id);
        assert_ne!(e.id, Expr::new(ExprKind::This).id);
    }

    #[test]
    fn involved_types_iterate_in_table_order() {
        let mut set = InvolvedTypes::default();
        set.insert(OperandKind::Double);
        set.insert(OperandKind::Int);
        set.insert_type(&JvmType::string());
        let kinds: Vec<_> = set.iter().collect();
        assert_eq!(kinds, vec![OperandKind::Object, OperandKind::Int, OperandKind::Double]);
    }

    #[test]
    fn descriptor_of_target() {
        let m = MethodTarget {
            owner: "demo/A".into(),
            name: "f".into(),
            params: vec![JvmType::Int, JvmType::string()],
            return_type: JvmType::Void,
            is_static: true,
            is_private: false,
            is_interface: false,
            is_varargs: false,
        };
        assert_eq!(m.descriptor(), "(ILjava/lang/String;)V");
    }
}
