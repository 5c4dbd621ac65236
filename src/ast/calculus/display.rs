//! Deterministic text rendering of calculus trees.
//!
//! The output is embedded in error messages and snapshot tests; it is not
//! meant to be parsed back.

use std::fmt::{self, Display, Formatter};

use super::expr::*;

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Writes `e`, parenthesized unless it is atomic.
fn write_operand(f: &mut Formatter<'_>, e: &Expr) -> fmt::Result {
    match &e.kind {
        ExprKind::Literal(_)
        | ExprKind::Ident(_)
        | ExprKind::RecordProj(..)
        | ExprKind::RecordCons(_)
        | ExprKind::Partition
        | ExprKind::Star => write!(f, "{e}"),
        _ => write!(f, "({e})"),
    }
}

impl Display for ExprKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExprKind::Literal(lit) => write!(f, "{lit}"),
            ExprKind::Ident(name) => write!(f, "{name}"),
            ExprKind::RecordProj(expr, field) => {
                write_operand(f, expr)?;
                write!(f, ".{field}")
            }
            ExprKind::RecordCons(atts) => {
                write!(f, "(")?;
                for (i, att) in atts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", att.idn, att.expr)?;
                }
                write!(f, ")")
            }
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => write!(f, "if {condition} then {then} else {otherwise}"),
            ExprKind::Binary(BinaryExpr { left, op, right }) => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            ExprKind::Unary(UnaryExpr { op, expr }) => match op {
                UnOp::Neg => {
                    write!(f, "-")?;
                    write_operand(f, expr)
                }
                UnOp::Not => {
                    write!(f, "not ")?;
                    write_operand(f, expr)
                }
                UnOp::ToSet | UnOp::ToBag | UnOp::ToList | UnOp::ToFloat => {
                    write!(f, "{op}({expr})")
                }
            },
            ExprKind::MergeMonoid {
                monoid,
                left,
                right,
            } => write!(f, "merge({monoid}, {left}, {right})"),
            ExprKind::ZeroCollection(monoid) => write!(f, "{monoid}()"),
            ExprKind::ConsCollection(monoid, expr) => write!(f, "{monoid}({expr})"),
            ExprKind::MultiCons(monoid, exprs) => {
                write!(f, "{monoid}(")?;
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            ExprKind::Comp(comp) => write!(f, "{comp}"),
            ExprKind::CanonComp(comp) => write!(f, "{comp}"),
            ExprKind::Select(select) => write!(f, "{select}"),
            ExprKind::FunAbs { param, body } => write!(f, "\\{param} -> {body}"),
            ExprKind::FunApp { func, arg } => {
                write_operand(f, func)?;
                write!(f, "({arg})")
            }
            ExprKind::ExpBlock { binds, body } => {
                write!(f, "{{ ")?;
                for (p, e) in binds {
                    write!(f, "{p} := {e}; ")?;
                }
                write!(f, "{body} }}")
            }
            ExprKind::Partition => write!(f, "partition"),
            ExprKind::Star => write!(f, "*"),
            ExprKind::Into { left, right } => write!(f, "{left} into {right}"),
            ExprKind::Sum(e) => write!(f, "sum({e})"),
            ExprKind::Max(e) => write!(f, "max({e})"),
            ExprKind::Min(e) => write!(f, "min({e})"),
            ExprKind::Avg(e) => write!(f, "avg({e})"),
            ExprKind::Count(e) => write!(f, "count({e})"),
            ExprKind::Exists(e) => write!(f, "exists({e})"),
            ExprKind::In {
                element,
                collection,
            } => {
                write_operand(f, element)?;
                write!(f, " in ")?;
                write_operand(f, collection)
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Regex(s) => write!(f, "r{s:?}"),
            Literal::DateTime(s) => write!(f, "t{s:?}"),
            Literal::Interval(s) => write!(f, "i{s:?}"),
        }
    }
}

impl Display for Comp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "for (")?;
        for (i, q) in self.quals.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{q}")?;
        }
        write!(f, ") yield {} {}", self.monoid, self.body)
    }
}

impl Display for CanonComp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "for (")?;
        for (i, g) in self.gens.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} <- {}", g.var, g.path)?;
        }
        write!(f, ") where {} yield {} {}", self.pred, self.monoid, self.body)
    }
}

impl Display for Qual {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Qual::Gen(Some(p), e) => write!(f, "{p} <- {e}"),
            Qual::Gen(None, e) => write!(f, "<- {e}"),
            Qual::Bind(p, e) => write!(f, "{p} := {e}"),
            Qual::Filter(e) => write!(f, "{e}"),
        }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Idn(idn) => write!(f, "{idn}"),
            Pattern::Prod(ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Path::Variable(v) => write!(f, "{v}"),
            Path::Inner(p, field) => write!(f, "{p}.{field}"),
        }
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "select ")?;
        if self.distinct {
            write!(f, "distinct ")?;
        }
        write!(f, "{} from ", self.proj)?;
        for (i, q) in self.from.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{q}")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " where {filter}")?;
        }
        if let Some(group_by) = &self.group_by {
            write!(f, " group by {group_by}")?;
        }
        if let Some(order_by) = &self.order_by {
            write!(f, " order by {order_by}")?;
        }
        if let Some(having) = &self.having {
            write!(f, " having {having}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::Monoid;

    #[test]
    fn comp_rendering() {
        let comp = Comp {
            monoid: Monoid::Set,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("s".to_string())), Expr::ident("students")),
                Qual::Filter(Expr::binary(
                    Expr::ident("s").proj("age"),
                    BinOp::Gt,
                    Expr::int(20),
                )),
            ],
            body: Box::new(Expr::ident("s")),
        };
        assert_eq!(
            Expr::new(ExprKind::Comp(comp)).to_string(),
            "for (s <- students; s.age > 20) yield set s"
        );
    }

    #[test]
    fn select_rendering() {
        let select = Select {
            from: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            distinct: false,
            proj: Box::new(Expr::new(ExprKind::RecordCons(vec![
                AttrExpr::new("age", Expr::ident("s").proj("age")),
                AttrExpr::new(
                    "n",
                    Expr::new(ExprKind::Count(Box::new(Expr::new(ExprKind::Partition)))),
                ),
            ]))),
            filter: None,
            group_by: Some(Box::new(Expr::ident("s").proj("age"))),
            order_by: None,
            having: None,
        };
        assert_eq!(
            Expr::new(ExprKind::Select(select)).to_string(),
            "select (age: s.age, n: count(partition)) from s <- students group by s.age"
        );
    }
}
