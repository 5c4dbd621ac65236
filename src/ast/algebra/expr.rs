use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::calculus::{BinOp, Literal, UnOp};
use crate::ast::types::{Monoid, Ty};
use crate::error::Span;

/// Analogous to [crate::ast::calculus::Expr], but with less kinds: variables
/// are positional arguments, and comprehensions cannot appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(skip)]
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, span: None }
    }

    pub fn bool(b: bool) -> Self {
        Expr::new(ExprKind::Literal(Literal::Bool(b)))
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Bool(true)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum ExprKind {
    /// Positional reference into the operator's pattern.
    Argument { ty: Ty, index: usize },

    Literal(Literal),

    RecordProj(Box<Expr>, String),
    RecordCons(Vec<(String, Expr)>),

    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// Merge of a primitive monoid; collection monoids cannot appear here.
    MergeMonoid {
        monoid: Monoid,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}
