//! Relational algebra
//!
//! Strictly typed IR describing the unnested query plan. Expressions over
//! algebra arguments use positional [Expr] `Argument` references into the
//! operator's pattern; only primitive monoids and concrete types appear in
//! expression positions.

mod display;
mod expr;

pub use expr::{Expr, ExprKind};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use super::types::{Monoid, Ty};
use crate::error::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(skip)]
    pub span: Option<Span>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node { kind, span: None }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum NodeKind {
    /// The unit plan; only ever appears as the driver's starting child.
    Empty,

    /// Rows of a catalog source.
    Scan { name: String, row: Ty },

    Select {
        pred: Expr,
        input: Box<Node>,
    },

    Join {
        pred: Expr,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Like [NodeKind::Join], but rows of the left side without a match are
    /// kept, with the right side null.
    OuterJoin {
        pred: Expr,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Pairs every input row with the elements of the collection reached by
    /// `path` from that row.
    Unnest {
        path: Expr,
        pred: Expr,
        input: Box<Node>,
    },

    OuterUnnest {
        path: Expr,
        pred: Expr,
        input: Box<Node>,
    },

    /// Groups input rows by `key` and aggregates `body` with `monoid` within
    /// each group; `group` names the nulled part of the pattern.
    Nest {
        monoid: Monoid,
        body: Expr,
        key: Expr,
        pred: Expr,
        group: Expr,
        input: Box<Node>,
    },

    /// Aggregates all input rows into a single value.
    Reduce {
        monoid: Monoid,
        body: Expr,
        pred: Expr,
        input: Box<Node>,
    },
}
