//! Terse constructors for annotated trees.
//!
//! The parser front end is external; these helpers let callers and tests
//! assemble trees directly.

use super::nodes::*;
use super::types::JvmType;
use super::SourcePos;

pub fn constant(value: Constant) -> Expr {
    Expr::new(ExprKind::Constant(value))
}

pub fn int(value: i32) -> Expr {
    constant(Constant::Int(value))
}

pub fn long(value: i64) -> Expr {
    constant(Constant::Long(value))
}

pub fn double(value: f64) -> Expr {
    constant(Constant::Double(value))
}

pub fn boolean(value: bool) -> Expr {
    constant(Constant::Boolean(value))
}

pub fn string(value: &str) -> Expr {
    constant(Constant::String(value.to_string()))
}

pub fn decimal(text: &str) -> Expr {
    constant(Constant::BigDecimal(text.to_string()))
}

pub fn null() -> Expr {
    constant(Constant::Null)
}

pub fn var(name: &str) -> Expr {
    Expr::new(ExprKind::Variable(name.to_string()))
}

pub fn this() -> Expr {
    Expr::new(ExprKind::This)
}

pub fn super_ref() -> Expr {
    Expr::new(ExprKind::Super)
}

pub fn class_ref(ty: JvmType) -> Expr {
    Expr::new(ExprKind::ClassRef(ty))
}

pub fn field(name: &str) -> Expr {
    Expr::new(ExprKind::Field { name: name.to_string() })
}

pub fn property(receiver: Expr, name: &str) -> Expr {
    Expr::new(ExprKind::Property { receiver: Box::new(receiver), name: name.to_string(), safe: false })
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right), safe: false })
}

pub fn index(receiver: Expr, subscript: Expr) -> Expr {
    binary(BinaryOp::Index, receiver, subscript)
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    Expr::new(ExprKind::Assign { target: Box::new(target), op: None, value: Box::new(value) })
}

pub fn op_assign(op: BinaryOp, target: Expr, value: Expr) -> Expr {
    Expr::new(ExprKind::Assign { target: Box::new(target), op: Some(op), value: Box::new(value) })
}

pub fn declare(name: &str, ty: JvmType, value: Option<Expr>) -> Expr {
    Expr::new(ExprKind::Declaration {
        target: DeclTarget::Single { name: name.to_string(), ty, holder: false },
        value: value.map(Box::new),
    })
}

/// Declaration of a closure-shared variable
pub fn declare_holder(name: &str, ty: JvmType, value: Option<Expr>) -> Expr {
    Expr::new(ExprKind::Declaration {
        target: DeclTarget::Single { name: name.to_string(), ty, holder: true },
        value: value.map(Box::new),
    })
}

pub fn declare_tuple(names: &[(&str, JvmType)], value: Expr) -> Expr {
    let targets = names.iter().map(|(n, t)| (n.to_string(), t.clone())).collect();
    Expr::new(ExprKind::Declaration { target: DeclTarget::Tuple(targets), value: Some(Box::new(value)) })
}

pub fn prefix(op: IncDec, operand: Expr) -> Expr {
    Expr::new(ExprKind::Prefix { op, operand: Box::new(operand) })
}

pub fn postfix(op: IncDec, operand: Expr) -> Expr {
    Expr::new(ExprKind::Postfix { op, operand: Box::new(operand) })
}

pub fn not(operand: Expr) -> Expr {
    Expr::new(ExprKind::Not(Box::new(operand)))
}

pub fn negate(operand: Expr) -> Expr {
    Expr::new(ExprKind::UnaryMinus(Box::new(operand)))
}

pub fn call(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::MethodCall {
        receiver: Box::new(receiver),
        name: name.to_string(),
        args,
        safe: false,
        spread_safe: false,
        implicit_this: false,
    })
}

/// Unqualified call `name(args)` on the current instance
pub fn call_this(name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::MethodCall {
        receiver: Box::new(this()),
        name: name.to_string(),
        args,
        safe: false,
        spread_safe: false,
        implicit_this: true,
    })
}

pub fn safe_call(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    let mut e = call(receiver, name, args);
    if let ExprKind::MethodCall { safe, .. } = &mut e.kind {
        *safe = true;
    }
    e
}

pub fn spread_safe_call(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    let mut e = call(receiver, name, args);
    if let ExprKind::MethodCall { spread_safe, .. } = &mut e.kind {
        *spread_safe = true;
    }
    e
}

pub fn static_call(owner: JvmType, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::StaticCall { owner, name: name.to_string(), args })
}

pub fn new_instance(ty: JvmType, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::ConstructorCall { ty, args })
}

pub fn cast(ty: JvmType, expr: Expr) -> Expr {
    Expr::new(ExprKind::Cast { ty, expr: Box::new(expr), coerce: false })
}

pub fn as_type(ty: JvmType, expr: Expr) -> Expr {
    Expr::new(ExprKind::Cast { ty, expr: Box::new(expr), coerce: true })
}

pub fn instance_of(expr: Expr, ty: JvmType) -> Expr {
    Expr::new(ExprKind::InstanceOf { expr: Box::new(expr), ty })
}

pub fn ternary(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::new(ExprKind::Ternary {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

pub fn spread(list: Expr) -> Expr {
    Expr::new(ExprKind::Spread(Box::new(list)))
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::Block(stmts))
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    let pos = expr.pos;
    Stmt::new(StmtKind::Expression(expr)).at(pos)
}

pub fn ret(expr: Expr) -> Stmt {
    let pos = expr.pos;
    Stmt::new(StmtKind::Return(Some(expr))).at(pos)
}

pub fn ret_void() -> Stmt {
    Stmt::new(StmtKind::Return(None))
}

pub fn if_else(cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
    Stmt::new(StmtKind::If { cond, then: Box::new(then), otherwise: otherwise.map(Box::new) })
}

pub fn while_loop(cond: Expr, body: Stmt) -> Stmt {
    Stmt::new(StmtKind::While { cond, body: Box::new(body) })
}

pub fn do_while(body: Stmt, cond: Expr) -> Stmt {
    Stmt::new(StmtKind::DoWhile { body: Box::new(body), cond })
}

pub fn for_loop(init: Vec<Expr>, cond: Option<Expr>, update: Vec<Expr>, body: Stmt) -> Stmt {
    Stmt::new(StmtKind::For { init, cond, update, body: Box::new(body) })
}

pub fn for_in(var: &str, ty: JvmType, collection: Expr, body: Stmt) -> Stmt {
    Stmt::new(StmtKind::ForIn { var: var.to_string(), ty, collection, body: Box::new(body) })
}

pub fn throw(expr: Expr) -> Stmt {
    let pos = expr.pos;
    Stmt::new(StmtKind::Throw(expr)).at(pos)
}

pub fn break_stmt() -> Stmt {
    Stmt::new(StmtKind::Break)
}

pub fn continue_stmt() -> Stmt {
    Stmt::new(StmtKind::Continue)
}

pub fn param(name: &str, ty: JvmType) -> Parameter {
    Parameter::new(name, ty)
}

pub fn method(name: &str, params: Vec<Parameter>, return_type: JvmType, body: Stmt) -> MethodNode {
    MethodNode {
        name: name.to_string(),
        params,
        return_type,
        is_static: false,
        is_private: false,
        is_varargs: false,
        body,
        pos: SourcePos::default(),
    }
}

pub fn static_method(name: &str, params: Vec<Parameter>, return_type: JvmType, body: Stmt) -> MethodNode {
    MethodNode { is_static: true, ..method(name, params, return_type, body) }
}

pub fn constructor(params: Vec<Parameter>, body: Stmt) -> MethodNode {
    method("<init>", params, JvmType::Void, body)
}
