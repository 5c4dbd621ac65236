//! Text rendering of algebra plans: one operator per line, children
//! indented below their parent.

use std::fmt::{self, Display, Formatter};

use super::expr::{Expr, ExprKind};
use super::{Node, NodeKind};
use crate::ast::calculus::UnOp;

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_node(f, self, 0)
    }
}

fn write_node(f: &mut Formatter<'_>, node: &Node, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        write!(f, "  ")?;
    }
    match &node.kind {
        NodeKind::Empty => writeln!(f, "Empty"),
        NodeKind::Scan { name, .. } => writeln!(f, "Scan {name}"),
        NodeKind::Select { pred, input } => {
            writeln!(f, "Select pred={pred}")?;
            write_node(f, input, indent + 1)
        }
        NodeKind::Join { pred, left, right } => {
            writeln!(f, "Join pred={pred}")?;
            write_node(f, left, indent + 1)?;
            write_node(f, right, indent + 1)
        }
        NodeKind::OuterJoin { pred, left, right } => {
            writeln!(f, "OuterJoin pred={pred}")?;
            write_node(f, left, indent + 1)?;
            write_node(f, right, indent + 1)
        }
        NodeKind::Unnest { path, pred, input } => {
            writeln!(f, "Unnest path={path} pred={pred}")?;
            write_node(f, input, indent + 1)
        }
        NodeKind::OuterUnnest { path, pred, input } => {
            writeln!(f, "OuterUnnest path={path} pred={pred}")?;
            write_node(f, input, indent + 1)
        }
        NodeKind::Nest {
            monoid,
            body,
            key,
            pred,
            group,
            input,
        } => {
            writeln!(f, "Nest {monoid} body={body} key={key} pred={pred} group={group}")?;
            write_node(f, input, indent + 1)
        }
        NodeKind::Reduce {
            monoid,
            body,
            pred,
            input,
        } => {
            writeln!(f, "Reduce {monoid} body={body} pred={pred}")?;
            write_node(f, input, indent + 1)
        }
    }
}

fn write_operand(f: &mut Formatter<'_>, e: &Expr) -> fmt::Result {
    match &e.kind {
        ExprKind::Argument { .. } | ExprKind::Literal(_) | ExprKind::RecordProj(..) => {
            write!(f, "{e}")
        }
        _ => write!(f, "({e})"),
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Argument { index, .. } => write!(f, "${index}"),
            ExprKind::Literal(lit) => write!(f, "{lit}"),
            ExprKind::RecordProj(expr, field) => {
                write_operand(f, expr)?;
                write!(f, ".{field}")
            }
            ExprKind::RecordCons(atts) => {
                write!(f, "(")?;
                for (i, (idn, e)) in atts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{idn}: {e}")?;
                }
                write!(f, ")")
            }
            ExprKind::Binary { left, op, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            ExprKind::Unary { op, expr } => match op {
                UnOp::Neg => {
                    write!(f, "-")?;
                    write_operand(f, expr)
                }
                _ => {
                    write!(f, "{op} ")?;
                    write_operand(f, expr)
                }
            },
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => write!(f, "if {condition} then {then} else {otherwise}"),
            ExprKind::MergeMonoid {
                monoid,
                left,
                right,
            } => write!(f, "merge({monoid}, {left}, {right})"),
        }
    }
}
