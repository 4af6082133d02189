//! Source-like rendering of expressions and statements for log output and
//! diagnostics.

use std::fmt;

use super::nodes::*;

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Boolean(b) => write!(f, "{}", b),
            Constant::Char(c) => match char::from_u32(u32::from(*c)) {
                Some(ch) => write!(f, "'{}'", ch),
                None => write!(f, "'\\u{:04x}'", c),
            },
            Constant::Byte(v) => write!(f, "{}", v),
            Constant::Short(v) => write!(f, "{}", v),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}f", v),
            Constant::Double(v) => write!(f, "{}d", v),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::BigDecimal(s) => write!(f, "{}G", s),
            Constant::BigInteger(s) => write!(f, "{}G", s),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    write!(f, "(")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", a)?;
    }
    write!(f, ")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(c) => write!(f, "{}", c),
            ExprKind::Variable(name) => write!(f, "{}", name),
            ExprKind::This => write!(f, "this"),
            ExprKind::Super => write!(f, "super"),
            ExprKind::ClassRef(ty) => write!(f, "{}", ty),
            ExprKind::Field { name } => write!(f, "this.@{}", name),
            ExprKind::Property { receiver, name, safe } => {
                write!(f, "{}{}{}", receiver, if *safe { "?." } else { "." }, name)
            }
            ExprKind::Binary { op: BinaryOp::Index, left, right, safe } => {
                write!(f, "{}{}[{}]", left, if *safe { "?" } else { "" }, right)
            }
            ExprKind::Binary { op, left, right, .. } => write!(f, "({} {} {})", left, op.symbol(), right),
            ExprKind::Assign { target, op, value } => match op {
                Some(op) => write!(f, "{} {}= {}", target, op.symbol(), value),
                None => write!(f, "{} = {}", target, value),
            },
            ExprKind::Declaration { target, value } => {
                match target {
                    DeclTarget::Single { name, ty, .. } => write!(f, "{} {}", ty, name)?,
                    DeclTarget::Tuple(names) => {
                        write!(f, "def (")?;
                        for (i, (n, _)) in names.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", n)?;
                        }
                        write!(f, ")")?;
                    }
                }
                if let Some(v) = value {
                    write!(f, " = {}", v)?;
                }
                Ok(())
            }
            ExprKind::Prefix { op, operand } => {
                write!(f, "{}{}", if *op == IncDec::Increment { "++" } else { "--" }, operand)
            }
            ExprKind::Postfix { op, operand } => {
                write!(f, "{}{}", operand, if *op == IncDec::Increment { "++" } else { "--" })
            }
            ExprKind::Not(e) => write!(f, "!{}", e),
            ExprKind::UnaryMinus(e) => write!(f, "-{}", e),
            ExprKind::BitwiseNegate(e) => write!(f, "~{}", e),
            ExprKind::MethodCall { receiver, name, args, safe, spread_safe, implicit_this } => {
                if !*implicit_this {
                    let dot = if *spread_safe { "*." } else if *safe { "?." } else { "." };
                    write!(f, "{}{}", receiver, dot)?;
                }
                write!(f, "{}", name)?;
                write_args(f, args)
            }
            ExprKind::StaticCall { owner, name, args } => {
                write!(f, "{}.{}", owner, name)?;
                write_args(f, args)
            }
            ExprKind::ConstructorCall { ty, args } => {
                write!(f, "new {}", ty)?;
                write_args(f, args)
            }
            ExprKind::Cast { ty, expr, coerce: true } => write!(f, "({} as {})", expr, ty),
            ExprKind::Cast { ty, expr, coerce: false } => write!(f, "(({}) {})", ty, expr),
            ExprKind::InstanceOf { expr, ty } => write!(f, "({} instanceof {})", expr, ty),
            ExprKind::Ternary { cond, then, otherwise } => write!(f, "({} ? {} : {})", cond, then, otherwise),
            ExprKind::Spread(e) => write!(f, "*{}", e),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Block(stmts) => {
                write!(f, "{{ ")?;
                for s in stmts {
                    write!(f, "{} ", s)?;
                }
                write!(f, "}}")
            }
            StmtKind::Expression(e) => write!(f, "{};", e),
            StmtKind::Return(Some(e)) => write!(f, "return {};", e),
            StmtKind::Return(None) => write!(f, "return;"),
            StmtKind::If { cond, then, otherwise } => {
                write!(f, "if ({}) {}", cond, then)?;
                if let Some(o) = otherwise {
                    write!(f, " else {}", o)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } => write!(f, "while ({}) {}", cond, body),
            StmtKind::DoWhile { body, cond } => write!(f, "do {} while ({});", body, cond),
            StmtKind::For { init, cond, update, body } => {
                let list = |exprs: &[Expr]| exprs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ");
                let cond = cond.as_ref().map(|c| c.to_string()).unwrap_or_default();
                write!(f, "for ({}; {}; {}) {}", list(init), cond, list(update), body)
            }
            StmtKind::ForIn { var, ty, collection, body } => write!(f, "for ({} {} in {}) {}", ty, var, collection, body),
            StmtKind::Throw(e) => write!(f, "throw {};", e),
            StmtKind::Break => write!(f, "break;"),
            StmtKind::Continue => write!(f, "continue;"),
            StmtKind::Empty => write!(f, ";"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ast::{BinaryOp, IncDec, JvmType};

    #[test]
    fn renders_source_like_text() {
        let e = assign(index(var("a"), var("i")), binary(BinaryOp::Plus, index(var("a"), var("i")), int(1)));
        assert_eq!(e.to_string(), "a[i] = (a[i] + 1)");
        let d = declare("x", JvmType::Int, Some(int(1)));
        assert_eq!(ret(d).to_string(), "return int x = 1;");
    }

    #[test]
    fn renders_loops() {
        let counted = for_loop(
            vec![declare("i", JvmType::Int, Some(int(0)))],
            Some(binary(BinaryOp::LessThan, var("i"), var("n"))),
            vec![postfix(IncDec::Increment, var("i"))],
            block(vec![]),
        );
        assert_eq!(counted.to_string(), "for (int i = 0; (i < n); i++) { }");
        let each = for_in("x", JvmType::object(), var("xs"), block(vec![break_stmt()]));
        assert_eq!(each.to_string(), "for (java.lang.Object x in xs) { break; }");
    }
}
