use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ast::types::{Monoid, Ty};
use crate::error::Span;

/// Expr is anything that has a value and thus a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Unique identificator of the node. Set exactly once, on the first
    /// semantic resolve; rewrites preserve it for surviving nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    pub kind: ExprKind,
    #[serde(skip)]
    pub span: Option<Span>,

    /// Type of the expression. Filled in by semantic resolve; re-resolved
    /// after each rewriting phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ty: Option<Ty>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            id: None,
            kind,
            span: None,
            ty: None,
        }
    }

    pub fn ident<S: ToString>(name: S) -> Self {
        Expr::new(ExprKind::Ident(name.to_string()))
    }

    pub fn bool(b: bool) -> Self {
        Expr::new(ExprKind::Literal(Literal::Bool(b)))
    }

    pub fn int(i: i64) -> Self {
        Expr::new(ExprKind::Literal(Literal::Int(i)))
    }

    pub fn proj(self, field: &str) -> Self {
        Expr::new(ExprKind::RecordProj(Box::new(self), field.to_string()))
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Expr::new(ExprKind::Binary(BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }))
    }

    /// A copy of this node without its identity, for rewrites that duplicate
    /// subtrees: the resolver will assign fresh ids to the clone.
    pub fn detached(&self) -> Expr {
        use super::fold::CalculusFold;

        let mut detach = DetachIds;
        detach.fold_expr(self.clone()).unwrap()
    }
}

struct DetachIds;

impl super::fold::CalculusFold for DetachIds {
    fn fold_expr(&mut self, mut expr: Expr) -> anyhow::Result<Expr> {
        expr.kind = self.fold_expr_kind(expr.kind)?;
        expr.id = None;
        Ok(expr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner, strum::AsRefStr)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    RecordProj(Box<Expr>, String),
    RecordCons(Vec<AttrExpr>),
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Binary(BinaryExpr),
    Unary(UnaryExpr),

    /// The merge operation of a monoid applied to two values.
    MergeMonoid {
        monoid: Monoid,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// The identity of a collection monoid, e.g. the empty bag.
    ZeroCollection(Monoid),
    /// A singleton collection.
    ConsCollection(Monoid, Box<Expr>),
    /// A collection literal with several elements.
    MultiCons(Monoid, Vec<Expr>),

    Comp(Comp),

    /// Canonical comprehension: generators over paths, a single CNF
    /// predicate, and a body. Produced by the normalizer.
    CanonComp(CanonComp),

    Select(Select),

    FunAbs {
        param: Pattern,
        body: Box<Expr>,
    },
    FunApp {
        func: Box<Expr>,
        arg: Box<Expr>,
    },
    ExpBlock {
        binds: Vec<(Pattern, Expr)>,
        body: Box<Expr>,
    },

    /// The bag of rows of the current group; defined on `select` projections
    /// when a `group by` is present.
    Partition,
    /// The whole row of the current `select`.
    Star,
    /// Injects the fields of the left record into the scope of the right
    /// expression.
    Into {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    // sugar
    Sum(Box<Expr>),
    Max(Box<Expr>),
    Min(Box<Expr>),
    Avg(Box<Expr>),
    Count(Box<Expr>),
    Exists(Box<Expr>),
    In {
        element: Box<Expr>,
        collection: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Regex(String),
    DateTime(String),
    Interval(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrExpr {
    pub idn: String,
    pub expr: Expr,
}

impl AttrExpr {
    pub fn new<S: ToString>(idn: S, expr: Expr) -> Self {
        AttrExpr {
            idn: idn.to_string(),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: BinOp,
    pub right: Box<Expr>,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum BinOp {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mul,
    #[strum(to_string = "/")]
    Div,
    #[strum(to_string = "%")]
    Mod,
    #[strum(to_string = "=")]
    Eq,
    #[strum(to_string = "<>")]
    Ne,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "<=")]
    Le,
    #[strum(to_string = "and")]
    And,
    #[strum(to_string = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnOp,
    pub expr: Box<Expr>,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum UnOp {
    #[strum(to_string = "-")]
    Neg,
    #[strum(to_string = "not")]
    Not,
    #[strum(to_string = "to_set")]
    ToSet,
    #[strum(to_string = "to_bag")]
    ToBag,
    #[strum(to_string = "to_list")]
    ToList,
    #[strum(to_string = "to_float")]
    ToFloat,
}

/// `for (qualifiers) yield monoid body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comp {
    pub monoid: Monoid,
    pub quals: Vec<Qual>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Qual {
    /// `p <- e`. An anonymous generator (no pattern) over a collection of
    /// records puts the record's fields directly in scope.
    Gen(Option<Pattern>, Expr),
    /// `p := e`
    Bind(Pattern, Expr),
    /// A boolean predicate.
    Filter(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Pattern {
    Idn(String),
    Prod(Vec<Pattern>),
}

impl Pattern {
    /// All identifiers bound by this pattern, left to right.
    pub fn idns(&self) -> Vec<&str> {
        match self {
            Pattern::Idn(idn) => vec![idn.as_str()],
            Pattern::Prod(ps) => ps.iter().flat_map(|p| p.idns()).collect(),
        }
    }
}

/// Canonical comprehension. Invariants: every generator draws from a
/// [Path], the predicate is a single CNF boolean expression (`true` when
/// empty), and binds have been inlined away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonComp {
    pub monoid: Monoid,
    pub gens: Vec<CanonGen>,
    pub pred: Box<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonGen {
    pub var: String,
    pub path: Path,
}

/// Where a canonical generator draws its rows from: a bound variable or a
/// data source, possibly projected through record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Path {
    Variable(String),
    Inner(Box<Path>, String),
}

impl Path {
    /// The variable or source name at the root of the path.
    pub fn root(&self) -> &str {
        match self {
            Path::Variable(v) => v,
            Path::Inner(p, _) => p.root(),
        }
    }
}

/// `select [distinct] proj from ... [where ...] [group by ...]
/// [order by ...] [having ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    /// Generators only; anything else is an internal error.
    pub from: Vec<Qual>,
    pub distinct: bool,
    pub proj: Box<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Box<Expr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Box<Expr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Box<Expr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<Box<Expr>>,
}

impl From<Comp> for ExprKind {
    fn from(comp: Comp) -> Self {
        ExprKind::Comp(comp)
    }
}

impl From<Select> for ExprKind {
    fn from(select: Select) -> Self {
        ExprKind::Select(select)
    }
}
