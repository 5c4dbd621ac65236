use std::fmt::{self, Display, Formatter};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

/// A unique name.
///
/// The `id` comes from the compile's single monotonic [crate::utils::IdGenerator];
/// two distinct symbols never share an id. Catalog symbols are allocated by the
/// caller and the compile primes its generator past their maximum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub id: usize,
}

impl Symbol {
    pub fn new<S: ToString>(name: S, id: usize) -> Self {
        Symbol {
            name: name.to_string(),
            id,
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A type, plus the nullability flag set by the post-typing pass.
///
/// Unification and equality of types ignore the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ty {
    pub kind: TyKind,
    pub nullable: bool,
}

impl Ty {
    pub fn new(kind: TyKind) -> Self {
        Ty {
            kind,
            nullable: false,
        }
    }

    pub fn collection(monoid: Monoid, inner: Ty) -> Self {
        Ty::new(TyKind::Collection(monoid, Box::new(inner)))
    }

    pub fn record(atts: Vec<AttrType>) -> Self {
        Ty::new(TyKind::Record(RecordAtts::Fixed(atts)))
    }
}

impl PartialEq for Ty {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl From<TyKind> for Ty {
    fn from(kind: TyKind) -> Self {
        Ty::new(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum TyKind {
    /// Unifies with anything. Installed after a failed unification so that
    /// downstream constraints can still be solved and report their own errors.
    Any,

    Bool,
    Int,
    Float,
    String,
    DateTime,
    Interval,
    Regex,

    Record(RecordAtts),

    /// A collection parameterized by a collection-class monoid.
    Collection(Monoid, Box<Ty>),

    Fun(Box<Ty>, Box<Ty>),

    /// Unlabeled product used for function parameters that destructure tuples.
    Pattern(Vec<Ty>),

    /// Reference into the catalog's named-type map.
    User(Symbol),

    /// Plain type variable.
    Var(Symbol),

    /// Variable ranging over {Int, Float}.
    Number(Symbol),

    /// Variable ranging over {Bool, Int, Float, String}.
    Primitive(Symbol),
}

impl TyKind {
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            TyKind::Var(_) | TyKind::Number(_) | TyKind::Primitive(_)
        )
    }
}

/// The attributes of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum RecordAtts {
    /// Closed record: ordered attributes, unique identifiers, fixed arity.
    Fixed(Vec<AttrType>),

    /// Open record: the known attribute constraints of a record whose arity
    /// is not yet known ("any record containing field f of type t").
    Open { atts: Vec<AttrType>, sym: Symbol },

    /// A record whose attribute sequence is the concatenation of slots; the
    /// slot list lives in the analyzer's concat-definition table and resolves
    /// to [RecordAtts::Fixed] once every slot's type is a concrete record.
    Concat(Symbol),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrType {
    pub idn: String,
    pub ty: Ty,
}

impl AttrType {
    pub fn new<S: ToString>(idn: S, ty: Ty) -> Self {
        AttrType {
            idn: idn.to_string(),
            ty,
        }
    }
}

/// One slot of a concat record. A named slot contributes a single attribute;
/// an unnamed slot must resolve to a record and contributes its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatSlot {
    pub prefix: Option<String>,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConcatDef {
    pub slots: Vec<ConcatSlot>,

    /// Attribute constraints gathered from unification with open records.
    pub atts: Vec<AttrType>,
}

/// A polymorphic binding: the body plus the symbols generalized over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeScheme {
    pub ty: Ty,
    pub free_ty_syms: Vec<Symbol>,
    pub free_monoid_syms: Vec<Symbol>,
    pub free_att_syms: Vec<Symbol>,
}

impl TypeScheme {
    pub fn monomorphic(ty: Ty) -> Self {
        TypeScheme {
            ty,
            free_ty_syms: Vec::new(),
            free_monoid_syms: Vec::new(),
            free_att_syms: Vec::new(),
        }
    }

    pub fn is_monomorphic(&self) -> bool {
        self.free_ty_syms.is_empty()
            && self.free_monoid_syms.is_empty()
            && self.free_att_syms.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Monoid {
    // primitive
    Sum,
    Multiply,
    Max,
    Min,
    And,
    Or,

    // collection
    Set,
    Bag,
    List,

    /// Unknown collection monoid.
    Var(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonoidProps {
    pub commutative: bool,
    pub idempotent: bool,
}

impl Monoid {
    /// The algebraic properties of a known monoid; `None` for variables.
    pub fn props(&self) -> Option<MonoidProps> {
        let (commutative, idempotent) = match self {
            Monoid::Sum | Monoid::Multiply => (true, false),
            Monoid::Max | Monoid::Min | Monoid::And | Monoid::Or => (true, true),
            Monoid::Set => (true, true),
            Monoid::Bag => (true, false),
            Monoid::List => (false, false),
            Monoid::Var(_) => return None,
        };
        Some(MonoidProps {
            commutative,
            idempotent,
        })
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Monoid::Set | Monoid::Bag | Monoid::List | Monoid::Var(_)
        )
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Monoid::Sum | Monoid::Multiply | Monoid::Max | Monoid::Min | Monoid::And | Monoid::Or
        )
    }

    /// Whether `self` may appear as a generator source of a comprehension
    /// with monoid `other`: pointwise `<=` on (commutative, idempotent).
    pub fn leq(&self, other: &Monoid) -> Option<bool> {
        let a = self.props()?;
        let b = other.props()?;
        Some(a.commutative <= b.commutative && a.idempotent <= b.idempotent)
    }
}

impl Display for Monoid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Monoid::Sum => write!(f, "sum"),
            Monoid::Multiply => write!(f, "multiply"),
            Monoid::Max => write!(f, "max"),
            Monoid::Min => write!(f, "min"),
            Monoid::And => write!(f, "and"),
            Monoid::Or => write!(f, "or"),
            Monoid::Set => write!(f, "set"),
            Monoid::Bag => write!(f, "bag"),
            Monoid::List => write!(f, "list"),
            Monoid::Var(sym) => write!(f, "{sym}"),
        }
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

impl Display for TyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TyKind::Any => write!(f, "any"),
            TyKind::Bool => write!(f, "bool"),
            TyKind::Int => write!(f, "int"),
            TyKind::Float => write!(f, "float"),
            TyKind::String => write!(f, "string"),
            TyKind::DateTime => write!(f, "datetime"),
            TyKind::Interval => write!(f, "interval"),
            TyKind::Regex => write!(f, "regex"),
            TyKind::Record(atts) => write!(f, "record({atts})"),
            TyKind::Collection(m, inner) => write!(f, "{m}({inner})"),
            TyKind::Fun(param, out) => write!(f, "{param} -> {out}"),
            TyKind::Pattern(tys) => {
                write!(f, "pattern(")?;
                for (i, t) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            TyKind::User(sym) => write!(f, "{sym}"),
            TyKind::Var(sym) | TyKind::Number(sym) | TyKind::Primitive(sym) => {
                write!(f, "{sym}")
            }
        }
    }
}

impl Display for RecordAtts {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RecordAtts::Fixed(atts) => {
                for (i, att) in atts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", att.idn, att.ty)?;
                }
                Ok(())
            }
            RecordAtts::Open { atts, sym } => {
                for att in atts {
                    write!(f, "{}: {}, ", att.idn, att.ty)?;
                }
                write!(f, "..{sym}")
            }
            RecordAtts::Concat(sym) => write!(f, "concat {sym}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monoid_partial_order() {
        // list <= bag <= set, and never the other way around
        assert_eq!(Monoid::List.leq(&Monoid::Bag), Some(true));
        assert_eq!(Monoid::Bag.leq(&Monoid::Set), Some(true));
        assert_eq!(Monoid::List.leq(&Monoid::Set), Some(true));
        assert_eq!(Monoid::Set.leq(&Monoid::List), Some(false));
        assert_eq!(Monoid::Set.leq(&Monoid::Bag), Some(false));
        assert_eq!(Monoid::Bag.leq(&Monoid::List), Some(false));

        // a set generator cannot feed a non-idempotent aggregation
        assert_eq!(Monoid::Set.leq(&Monoid::Sum), Some(false));
        assert_eq!(Monoid::Bag.leq(&Monoid::Sum), Some(true));
        assert_eq!(Monoid::Set.leq(&Monoid::Or), Some(true));

        assert_eq!(Monoid::Var(Symbol::new("m", 0)).leq(&Monoid::Set), None);
    }

    #[test]
    fn nullability_is_not_part_of_equality() {
        let a = Ty::new(TyKind::Int);
        let mut b = Ty::new(TyKind::Int);
        b.nullable = true;
        assert_eq!(a, b);
    }
}
