//! The types & monoids kernel: union-find over type, record-attribute and
//! monoid variables, unification, and the `walk` reconstruction.
//!
//! Variables are bound through chains in per-kind binding maps; binding
//! always points the more general side at the less general one, so following
//! a chain ends at the best-known representative. All state is owned by one
//! compilation and reset between analysis runs.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::ast::types::{
    AttrType, ConcatDef, Monoid, RecordAtts, Symbol, Ty, TyKind,
};
use crate::error::{Error, Kind};

use super::World;

pub struct Unifier<'a> {
    world: &'a World,

    ty_bindings: HashMap<Symbol, Ty>,
    att_bindings: HashMap<Symbol, RecordAtts>,
    monoid_bindings: HashMap<Symbol, Monoid>,
    monoid_bounds: HashMap<Symbol, Bounds>,
    concat_defs: HashMap<Symbol, ConcatDef>,
}

/// Lower and upper bounds of a monoid variable in the partial order induced
/// by (commutative, idempotent).
#[derive(Debug, Clone, Default)]
pub struct Bounds {
    /// Monoids known to be `<=` the variable.
    pub leq: Vec<Monoid>,
    /// Monoids known to be `>=` the variable.
    pub geq: Vec<Monoid>,
}

impl<'a> Unifier<'a> {
    pub fn new(world: &'a World) -> Self {
        Unifier {
            world,
            ty_bindings: HashMap::new(),
            att_bindings: HashMap::new(),
            monoid_bindings: HashMap::new(),
            monoid_bounds: HashMap::new(),
            concat_defs: HashMap::new(),
        }
    }

    pub fn reset(&mut self) {
        self.ty_bindings.clear();
        self.att_bindings.clear();
        self.monoid_bindings.clear();
        self.monoid_bounds.clear();
        self.concat_defs.clear();
    }

    /// Follows variable bindings at the root of `ty`.
    pub fn find(&self, ty: &Ty) -> Ty {
        let mut cur = ty.clone();
        loop {
            let sym = match &cur.kind {
                TyKind::Var(s) | TyKind::Number(s) | TyKind::Primitive(s) => s.clone(),
                _ => return cur,
            };
            match self.ty_bindings.get(&sym) {
                Some(next) => {
                    let nullable = cur.nullable || next.nullable;
                    cur = next.clone();
                    cur.nullable = nullable;
                }
                None => return cur,
            }
        }
    }

    /// Follows attribute-variable bindings at the root of `atts`.
    pub fn att_find(&self, atts: &RecordAtts) -> RecordAtts {
        let mut cur = atts.clone();
        loop {
            let sym = match &cur {
                RecordAtts::Fixed(_) => return cur,
                RecordAtts::Open { sym, .. } | RecordAtts::Concat(sym) => sym.clone(),
            };
            let Some(next) = self.att_bindings.get(&sym) else {
                return cur;
            };
            let next_sym = match next {
                RecordAtts::Open { sym, .. } | RecordAtts::Concat(sym) => Some(sym),
                RecordAtts::Fixed(_) => None,
            };
            if next_sym == Some(&sym) {
                // terminal: the merged knowledge of this variable's group
                return next.clone();
            }
            cur = next.clone();
        }
    }

    pub fn monoid_find(&self, monoid: &Monoid) -> Monoid {
        let mut cur = monoid.clone();
        while let Monoid::Var(sym) = &cur {
            match self.monoid_bindings.get(sym) {
                Some(next) => cur = next.clone(),
                None => break,
            }
        }
        cur
    }

    pub fn unify(&mut self, t1: &Ty, t2: &Ty) -> Result<(), Error> {
        let mut visited = HashSet::new();
        self.unify_inner(t1, t2, &mut visited)
    }

    fn incompatible(&self, t1: &Ty, t2: &Ty) -> Error {
        Error::new(Kind::IncompatibleTypes {
            left: self.walk(t1),
            right: self.walk(t2),
        })
    }

    fn unify_inner(
        &mut self,
        t1: &Ty,
        t2: &Ty,
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        use TyKind::*;

        let a = self.find(t1);
        let b = self.find(t2);
        if a.kind == b.kind {
            return Ok(());
        }

        match (&a.kind, &b.kind) {
            (Any, _) | (_, Any) => Ok(()),

            (Var(s), _) => self.bind_ty(s, &b),
            (_, Var(s)) => self.bind_ty(s, &a),

            (Number(s), Int | Float | Number(_)) => self.bind_ty(s, &b),
            (Int | Float, Number(s)) => self.bind_ty(s, &a),

            (Primitive(s), Bool | Int | Float | String | Number(_) | Primitive(_)) => {
                self.bind_ty(s, &b)
            }
            (Bool | Int | Float | String | Number(_), Primitive(s)) => self.bind_ty(s, &a),

            (Collection(m1, i1), Collection(m2, i2)) => {
                if self.unify_monoids(m1, m2).is_err() {
                    return Err(self.incompatible(&a, &b));
                }
                self.unify_inner(&i1.clone(), &i2.clone(), visited)
            }

            (Record(a1), Record(a2)) => self.unify_atts_inner(&a1.clone(), &a2.clone(), visited),

            (Fun(p1, r1), Fun(p2, r2)) => {
                self.unify_inner(&p1.clone(), &p2.clone(), visited)?;
                self.unify_inner(&r1.clone(), &r2.clone(), visited)
            }

            (Pattern(xs), Pattern(ys)) if xs.len() == ys.len() => {
                for (x, y) in xs.clone().iter().zip(ys.clone().iter()) {
                    self.unify_inner(x, y, visited)?;
                }
                Ok(())
            }

            // distinct user types never unify; against anything else the
            // definition is expanded, guarding against cyclic definitions
            (User(s1), User(s2)) if s1 != s2 => Err(self.incompatible(&a, &b)),
            (User(s), _) => self.unify_user(&s.clone(), &b, visited),
            (_, User(s)) => self.unify_user(&s.clone(), &a, visited),

            _ => Err(self.incompatible(&a, &b)),
        }
    }

    fn unify_user(
        &mut self,
        sym: &Symbol,
        other: &Ty,
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        let Some(def) = self.world.tipes.get(sym).cloned() else {
            return Err(Error::internal(format!("unknown user type `{sym}`")));
        };
        if !visited.insert(sym.clone()) {
            // a cycle through this type is already being unified above us
            return Ok(());
        }
        let result = self.unify_inner(&def, other, visited);
        visited.remove(sym);
        result
    }

    fn bind_ty(&mut self, sym: &Symbol, target: &Ty) -> Result<(), Error> {
        if let TyKind::Var(s) | TyKind::Number(s) | TyKind::Primitive(s) = &target.kind {
            if s == sym {
                return Ok(());
            }
        }
        if self.occurs(sym, target) {
            let var = Ty::new(TyKind::Var(sym.clone()));
            return Err(self.incompatible(&var, target));
        }
        self.ty_bindings.insert(sym.clone(), target.clone());
        Ok(())
    }

    fn occurs(&self, sym: &Symbol, ty: &Ty) -> bool {
        let t = self.find(ty);
        match &t.kind {
            TyKind::Var(s) | TyKind::Number(s) | TyKind::Primitive(s) => s == sym,
            TyKind::Collection(_, inner) => self.occurs(sym, inner),
            TyKind::Fun(p, r) => self.occurs(sym, p) || self.occurs(sym, r),
            TyKind::Pattern(ts) => ts.iter().any(|t| self.occurs(sym, t)),
            TyKind::Record(atts) => match self.att_find(atts) {
                RecordAtts::Fixed(atts) | RecordAtts::Open { atts, .. } => {
                    atts.iter().any(|a| self.occurs(sym, &a.ty))
                }
                RecordAtts::Concat(s) => {
                    let def = self.concat_defs.get(&s).cloned().unwrap_or_default();
                    def.slots.iter().any(|slot| self.occurs(sym, &slot.ty))
                        || def.atts.iter().any(|a| self.occurs(sym, &a.ty))
                }
            },
            _ => false,
        }
    }

    fn unify_atts_inner(
        &mut self,
        a1: &RecordAtts,
        a2: &RecordAtts,
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        let a = self.att_find(a1);
        let b = self.att_find(a2);

        let record = |atts: &RecordAtts| Ty::new(TyKind::Record(atts.clone()));

        match (&a, &b) {
            (RecordAtts::Fixed(xs), RecordAtts::Fixed(ys)) => {
                if xs.len() != ys.len() || xs.iter().zip(ys).any(|(x, y)| x.idn != y.idn) {
                    return Err(self.incompatible(&record(&a), &record(&b)));
                }
                for (x, y) in xs.clone().iter().zip(ys.clone().iter()) {
                    self.unify_inner(&x.ty, &y.ty, visited)?;
                }
                Ok(())
            }

            (
                RecordAtts::Open { atts: xs, sym: sx },
                RecordAtts::Open { atts: ys, sym: sy },
            ) => {
                if sx == sy {
                    return Ok(());
                }
                let (xs, ys) = (xs.clone(), ys.clone());
                let (sx, sy) = (sx.clone(), sy.clone());
                let mut union = xs.clone();
                for y in ys {
                    match union.iter().find(|x| x.idn == y.idn) {
                        Some(x) => self.unify_inner(&x.ty.clone(), &y.ty, visited)?,
                        None => union.push(y),
                    }
                }
                self.att_bindings.insert(
                    sy,
                    RecordAtts::Open {
                        atts: Vec::new(),
                        sym: sx.clone(),
                    },
                );
                self.att_bindings.insert(
                    sx.clone(),
                    RecordAtts::Open {
                        atts: union,
                        sym: sx,
                    },
                );
                Ok(())
            }

            (RecordAtts::Open { atts, sym }, RecordAtts::Fixed(fixed))
            | (RecordAtts::Fixed(fixed), RecordAtts::Open { atts, sym }) => {
                let (atts, sym, fixed) = (atts.clone(), sym.clone(), fixed.clone());
                for att in &atts {
                    let Some(found) = fixed.iter().find(|f| f.idn == att.idn) else {
                        return Err(self.incompatible(&record(&a), &record(&b)));
                    };
                    self.unify_inner(&att.ty, &found.ty.clone(), visited)?;
                }
                self.att_bindings.insert(sym, RecordAtts::Fixed(fixed));
                Ok(())
            }

            (RecordAtts::Concat(s1), RecordAtts::Concat(s2)) => {
                self.unify_concats(&s1.clone(), &s2.clone(), visited)
            }

            (RecordAtts::Concat(s), RecordAtts::Fixed(fixed))
            | (RecordAtts::Fixed(fixed), RecordAtts::Concat(s)) => {
                self.unify_concat_fixed(&s.clone(), &fixed.clone(), visited)
            }

            (RecordAtts::Concat(s), RecordAtts::Open { atts, sym })
            | (RecordAtts::Open { atts, sym }, RecordAtts::Concat(s)) => {
                self.unify_concat_open(&s.clone(), &atts.clone(), &sym.clone(), visited)
            }
        }
    }

    /// The attributes a concat record is known to start with, and whether
    /// every slot has resolved (making the record complete).
    fn resolved_prefix(&self, def: &ConcatDef) -> (Vec<AttrType>, bool) {
        let mut atts = Vec::new();
        for slot in &def.slots {
            match &slot.prefix {
                Some(name) => atts.push(AttrType::new(name, slot.ty.clone())),
                None => {
                    let ty = self.find(&slot.ty);
                    let resolved = ty
                        .kind
                        .as_record()
                        .map(|r| self.att_find(r))
                        .and_then(|r| r.into_fixed().ok());
                    match resolved {
                        Some(fields) => atts.extend(fields),
                        None => return (atts, false),
                    }
                }
            }
        }
        (atts, true)
    }

    fn unify_concats(
        &mut self,
        s1: &Symbol,
        s2: &Symbol,
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        if s1 == s2 {
            return Ok(());
        }
        let d1 = self.concat_defs.get(s1).cloned().unwrap_or_default();
        let d2 = self.concat_defs.get(s2).cloned().unwrap_or_default();

        let (p1, _) = self.resolved_prefix(&d1);
        let (p2, _) = self.resolved_prefix(&d2);
        for (x, y) in p1.iter().zip(p2.iter()) {
            if x.idn != y.idn {
                let left = Ty::new(TyKind::Record(RecordAtts::Concat(s1.clone())));
                let right = Ty::new(TyKind::Record(RecordAtts::Concat(s2.clone())));
                return Err(self.incompatible(&left, &right));
            }
            self.unify_inner(&x.ty, &y.ty, visited)?;
        }

        let mut merged = d1;
        for att in d2.atts {
            match merged.atts.iter().find(|a| a.idn == att.idn) {
                Some(existing) => self.unify_inner(&existing.ty.clone(), &att.ty, visited)?,
                None => merged.atts.push(att),
            }
        }
        for slot in d2.slots {
            if !merged.slots.contains(&slot) {
                merged.slots.push(slot);
            }
        }
        self.concat_defs.insert(s1.clone(), merged);
        self.att_bindings
            .insert(s2.clone(), RecordAtts::Concat(s1.clone()));
        Ok(())
    }

    fn unify_concat_fixed(
        &mut self,
        sym: &Symbol,
        fixed: &[AttrType],
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        let def = self.concat_defs.get(sym).cloned().unwrap_or_default();
        let (prefix, complete) = self.resolved_prefix(&def);

        let concat = Ty::new(TyKind::Record(RecordAtts::Concat(sym.clone())));
        let record = Ty::new(TyKind::Record(RecordAtts::Fixed(fixed.to_vec())));

        if complete && prefix.len() != fixed.len() {
            return Err(self.incompatible(&concat, &record));
        }
        for (x, y) in prefix.iter().zip(fixed.iter()) {
            if x.idn != y.idn {
                return Err(self.incompatible(&concat, &record));
            }
            self.unify_inner(&x.ty, &y.ty, visited)?;
        }
        for att in &def.atts {
            let Some(found) = fixed.iter().find(|f| f.idn == att.idn) else {
                return Err(self.incompatible(&concat, &record));
            };
            self.unify_inner(&att.ty, &found.ty.clone(), visited)?;
        }
        self.att_bindings
            .insert(sym.clone(), RecordAtts::Fixed(fixed.to_vec()));
        Ok(())
    }

    fn unify_concat_open(
        &mut self,
        concat_sym: &Symbol,
        open_atts: &[AttrType],
        open_sym: &Symbol,
        visited: &mut HashSet<Symbol>,
    ) -> Result<(), Error> {
        let mut def = self.concat_defs.get(concat_sym).cloned().unwrap_or_default();
        let (prefix, _) = self.resolved_prefix(&def);

        for att in open_atts {
            if let Some(found) = prefix.iter().find(|p| p.idn == att.idn) {
                self.unify_inner(&att.ty, &found.ty.clone(), visited)?;
            } else if let Some(existing) = def.atts.iter().find(|a| a.idn == att.idn) {
                self.unify_inner(&att.ty, &existing.ty.clone(), visited)?;
            } else {
                def.atts.push(att.clone());
            }
        }
        self.concat_defs.insert(concat_sym.clone(), def);
        self.att_bindings
            .insert(open_sym.clone(), RecordAtts::Concat(concat_sym.clone()));
        Ok(())
    }

    pub fn unify_monoids(&mut self, m1: &Monoid, m2: &Monoid) -> Result<(), ()> {
        let a = self.monoid_find(m1);
        let b = self.monoid_find(m2);
        match (&a, &b) {
            _ if a == b => Ok(()),
            (Monoid::Var(s), known) if known.props().is_some() => self.bind_monoid(s, known),
            (known, Monoid::Var(s)) if known.props().is_some() => self.bind_monoid(s, known),
            (Monoid::Var(s1), Monoid::Var(s2)) => {
                let other = self.monoid_bounds.remove(s2).unwrap_or_default();
                let bounds = self.monoid_bounds.entry(s1.clone()).or_default();
                bounds.leq.extend(other.leq);
                bounds.geq.extend(other.geq);
                self.monoid_bindings
                    .insert(s2.clone(), Monoid::Var(s1.clone()));
                self.check_bounds(s1)
            }
            _ => Err(()),
        }
    }

    fn bind_monoid(&mut self, sym: &Symbol, monoid: &Monoid) -> Result<(), ()> {
        let bounds = self.monoid_bounds.remove(sym).unwrap_or_default();
        let props = monoid.props().ok_or(())?;

        for lower in &bounds.leq {
            if let Some(p) = self.monoid_find(lower).props() {
                if p.commutative > props.commutative || p.idempotent > props.idempotent {
                    return Err(());
                }
            }
        }
        for upper in &bounds.geq {
            if let Some(p) = self.monoid_find(upper).props() {
                if props.commutative > p.commutative || props.idempotent > p.idempotent {
                    return Err(());
                }
            }
        }

        self.monoid_bindings.insert(sym.clone(), monoid.clone());

        // propagate to variable neighbours
        for lower in bounds.leq {
            if self.monoid_find(&lower).is_var() {
                self.add_leq(&lower, monoid)?;
            }
        }
        for upper in bounds.geq {
            if self.monoid_find(&upper).is_var() {
                self.add_leq(monoid, &upper)?;
            }
        }
        Ok(())
    }

    /// Records the constraint `lower <= upper` in the monoid partial order.
    pub fn add_leq(&mut self, lower: &Monoid, upper: &Monoid) -> Result<(), ()> {
        let a = self.monoid_find(lower);
        let b = self.monoid_find(upper);
        match (&a, &b) {
            _ if a == b => Ok(()),
            (x, y) if x.props().is_some() && y.props().is_some() => {
                if x.leq(y).unwrap() {
                    Ok(())
                } else {
                    Err(())
                }
            }
            (Monoid::Var(s), y) if y.props().is_some() => {
                self.monoid_bounds.entry(s.clone()).or_default().geq.push(y.clone());
                self.check_bounds(s)
            }
            (x, Monoid::Var(s)) if x.props().is_some() => {
                self.monoid_bounds.entry(s.clone()).or_default().leq.push(x.clone());
                self.check_bounds(s)
            }
            (Monoid::Var(s1), Monoid::Var(s2)) => {
                self.monoid_bounds.entry(s1.clone()).or_default().geq.push(b.clone());
                self.monoid_bounds.entry(s2.clone()).or_default().leq.push(a.clone());
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn check_bounds(&self, sym: &Symbol) -> Result<(), ()> {
        let Some(bounds) = self.monoid_bounds.get(sym) else {
            return Ok(());
        };
        let props = |m: &Monoid| self.monoid_find(m).props();

        let lower: Vec<_> = bounds.leq.iter().filter_map(props).collect();
        let upper: Vec<_> = bounds.geq.iter().filter_map(props).collect();

        let min_comm = lower.iter().any(|p| p.commutative);
        let min_idem = lower.iter().any(|p| p.idempotent);
        let max_comm = upper.iter().all(|p| p.commutative);
        let max_idem = upper.iter().all(|p| p.idempotent);

        if (min_comm && !max_comm) || (min_idem && !max_idem) {
            Err(())
        } else {
            Ok(())
        }
    }

    pub fn bounds_of(&self, sym: &Symbol) -> Bounds {
        self.monoid_bounds.get(sym).cloned().unwrap_or_default()
    }

    pub fn set_bounds(&mut self, sym: Symbol, bounds: Bounds) {
        self.monoid_bounds.insert(sym, bounds);
    }

    pub fn concat_def(&self, sym: &Symbol) -> ConcatDef {
        self.concat_defs.get(sym).cloned().unwrap_or_default()
    }

    pub fn set_concat_def(&mut self, sym: Symbol, def: ConcatDef) {
        self.concat_defs.insert(sym, def);
    }

    /// Deep reconstruction of a type: every variable is replaced by the best
    /// representative of its group. User types are kept by name, concats
    /// collapse to fixed records once complete, unbound variables remain.
    pub fn walk(&self, ty: &Ty) -> Ty {
        let t = self.find(ty);
        let nullable = t.nullable || ty.nullable;
        let kind = match t.kind {
            TyKind::Record(atts) => TyKind::Record(self.walk_atts(&atts)),
            TyKind::Collection(m, inner) => {
                TyKind::Collection(self.monoid_find(&m), Box::new(self.walk(&inner)))
            }
            TyKind::Fun(p, r) => TyKind::Fun(Box::new(self.walk(&p)), Box::new(self.walk(&r))),
            TyKind::Pattern(ts) => TyKind::Pattern(ts.iter().map(|t| self.walk(t)).collect_vec()),
            kind => kind,
        };
        Ty { kind, nullable }
    }

    fn walk_atts(&self, atts: &RecordAtts) -> RecordAtts {
        match self.att_find(atts) {
            RecordAtts::Fixed(atts) => RecordAtts::Fixed(
                atts.iter()
                    .map(|a| AttrType::new(&a.idn, self.walk(&a.ty)))
                    .collect(),
            ),
            RecordAtts::Open { atts, sym } => RecordAtts::Open {
                atts: atts
                    .iter()
                    .map(|a| AttrType::new(&a.idn, self.walk(&a.ty)))
                    .collect(),
                sym,
            },
            RecordAtts::Concat(sym) => {
                let def = self.concat_defs.get(&sym).cloned().unwrap_or_default();
                let (prefix, complete) = self.resolved_prefix(&def);
                if complete {
                    RecordAtts::Fixed(
                        prefix
                            .iter()
                            .map(|a| AttrType::new(&a.idn, self.walk(&a.ty)))
                            .collect(),
                    )
                } else {
                    RecordAtts::Concat(sym)
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::ConcatSlot;

    fn sym(name: &str, id: usize) -> Symbol {
        Symbol::new(name, id)
    }

    fn var(name: &str, id: usize) -> Ty {
        Ty::new(TyKind::Var(sym(name, id)))
    }

    fn world() -> World {
        World::default()
    }

    #[test]
    fn primitives_unify_with_themselves_only() {
        let w = world();
        let mut u = Unifier::new(&w);
        assert!(u.unify(&Ty::new(TyKind::Int), &Ty::new(TyKind::Int)).is_ok());
        assert!(u
            .unify(&Ty::new(TyKind::Int), &Ty::new(TyKind::String))
            .is_err());
        assert!(u.unify(&Ty::new(TyKind::Any), &Ty::new(TyKind::Bool)).is_ok());
    }

    #[test]
    fn variable_binds_and_walks() {
        let w = world();
        let mut u = Unifier::new(&w);
        let a = var("a", 0);
        u.unify(&a, &Ty::new(TyKind::Int)).unwrap();
        assert_eq!(u.walk(&a).kind, TyKind::Int);
    }

    #[test]
    fn number_variable_rejects_string() {
        let w = world();
        let mut u = Unifier::new(&w);
        let n = Ty::new(TyKind::Number(sym("n", 0)));
        assert!(u.unify(&n, &Ty::new(TyKind::String)).is_err());
        assert!(u.unify(&n, &Ty::new(TyKind::Float)).is_ok());
        assert_eq!(u.walk(&n).kind, TyKind::Float);
    }

    #[test]
    fn occurs_check_fails_recursive_binding() {
        let w = world();
        let mut u = Unifier::new(&w);
        let a = var("a", 0);
        let coll = Ty::collection(Monoid::Bag, a.clone());
        assert!(u.unify(&a, &coll).is_err());
    }

    #[test]
    fn open_record_against_fixed() {
        let w = world();
        let mut u = Unifier::new(&w);
        let open = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![AttrType::new("age", var("a", 0))],
            sym: sym("r", 1),
        }));
        let fixed = Ty::record(vec![
            AttrType::new("name", Ty::new(TyKind::String)),
            AttrType::new("age", Ty::new(TyKind::Int)),
        ]);
        u.unify(&open, &fixed).unwrap();
        assert_eq!(u.walk(&var("a", 0)).kind, TyKind::Int);
        // the open record resolved to the full fixed record
        let walked = u.walk(&open);
        let atts = walked.kind.into_record().unwrap().into_fixed().unwrap();
        assert_eq!(atts.len(), 2);
    }

    #[test]
    fn open_records_union() {
        let w = world();
        let mut u = Unifier::new(&w);
        let r1 = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![AttrType::new("x", Ty::new(TyKind::Int))],
            sym: sym("r1", 0),
        }));
        let r2 = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![AttrType::new("y", Ty::new(TyKind::Bool))],
            sym: sym("r2", 1),
        }));
        u.unify(&r1, &r2).unwrap();
        let walked = u.walk(&r1);
        let (atts, _) = walked
            .kind
            .into_record()
            .unwrap()
            .into_open()
            .unwrap();
        let idns: Vec<_> = atts.iter().map(|a| a.idn.as_str()).collect();
        assert_eq!(idns, vec!["x", "y"]);
    }

    #[test]
    fn monoid_unification_respects_partial_order() {
        let w = world();
        let mut u = Unifier::new(&w);
        let v = Monoid::Var(sym("m", 0));

        // list <= v constrains v away from nothing; binding v to list is fine
        u.add_leq(&Monoid::List, &v).unwrap();
        u.unify_monoids(&v, &Monoid::List).unwrap();
        assert_eq!(u.monoid_find(&v), Monoid::List);

        // a variable with a set lower bound can never become list
        let mut u = Unifier::new(&w);
        let v = Monoid::Var(sym("m", 1));
        u.add_leq(&Monoid::Set, &v).unwrap();
        assert!(u.unify_monoids(&v, &Monoid::List).is_err());
        assert!(u.unify_monoids(&v, &Monoid::Set).is_ok());
    }

    #[test]
    fn monoid_bound_conflict_is_detected() {
        let w = world();
        let mut u = Unifier::new(&w);
        let v = Monoid::Var(sym("m", 0));
        u.add_leq(&Monoid::Set, &v).unwrap();
        // v >= set and v <= list cannot both hold
        assert!(u.add_leq(&v, &Monoid::List).is_err());
    }

    #[test]
    fn user_types_unify_nominally() {
        let mut w = World::default();
        let student = sym("student", 7);
        w.tipes.insert(
            student.clone(),
            Ty::record(vec![AttrType::new("name", Ty::new(TyKind::String))]),
        );
        let mut u = Unifier::new(&w);
        let t = Ty::new(TyKind::User(student.clone()));
        assert!(u.unify(&t, &t.clone()).is_ok());

        // projection through a user type: open record unifies with definition
        let open = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![AttrType::new("name", var("a", 0))],
            sym: sym("r", 1),
        }));
        u.unify(&t, &open).unwrap();
        assert_eq!(u.walk(&var("a", 0)).kind, TyKind::String);
    }

    #[test]
    fn cyclic_user_type_terminates() {
        let mut w = World::default();
        let node = sym("node", 3);
        w.tipes.insert(
            node.clone(),
            Ty::record(vec![
                AttrType::new("value", Ty::new(TyKind::Int)),
                AttrType::new(
                    "next",
                    Ty::new(TyKind::User(node.clone())),
                ),
            ]),
        );
        let mut u = Unifier::new(&w);
        let t = Ty::new(TyKind::User(node.clone()));
        let open = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![AttrType::new("next", var("a", 0))],
            sym: sym("r", 1),
        }));
        u.unify(&t, &open).unwrap();
        assert_eq!(u.walk(&var("a", 0)).kind, TyKind::User(node));
    }

    #[test]
    fn walk_is_idempotent() {
        let w = world();
        let mut u = Unifier::new(&w);
        let a = var("a", 0);
        let b = var("b", 1);
        u.unify(&a, &b).unwrap();
        u.unify(&b, &Ty::collection(Monoid::Set, Ty::new(TyKind::Int)))
            .unwrap();
        let once = u.walk(&a);
        let twice = u.walk(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn concat_with_open_subset() {
        let w = world();
        let mut u = Unifier::new(&w);
        let concat_sym = sym("c", 0);
        u.set_concat_def(
            concat_sym.clone(),
            ConcatDef {
                slots: vec![ConcatSlot {
                    prefix: Some("s".to_string()),
                    ty: Ty::new(TyKind::Int),
                }],
                atts: vec![AttrType::new("hidden", var("h", 1))],
            },
        );
        let concat = Ty::new(TyKind::Record(RecordAtts::Concat(concat_sym.clone())));

        // the open variable's attributes overlap the concat's variable
        // attributes but not its resolved prefix
        let open = Ty::new(TyKind::Record(RecordAtts::Open {
            atts: vec![
                AttrType::new("hidden", Ty::new(TyKind::Bool)),
                AttrType::new("extra", Ty::new(TyKind::Float)),
            ],
            sym: sym("r", 2),
        }));
        u.unify(&concat, &open).unwrap();

        // the shared attribute was unified, the new one joined the union
        assert_eq!(u.walk(&var("h", 1)).kind, TyKind::Bool);
        let def = u.concat_def(&concat_sym);
        assert!(def.atts.iter().any(|a| a.idn == "extra"));

        // and the open record now resolves to the concat
        assert!(matches!(
            u.att_find(&RecordAtts::Open {
                atts: vec![],
                sym: sym("r", 2)
            }),
            RecordAtts::Concat(_)
        ));
    }

    #[test]
    fn concat_completes_to_fixed() {
        let w = world();
        let mut u = Unifier::new(&w);
        let concat_sym = sym("c", 0);
        u.set_concat_def(
            concat_sym.clone(),
            ConcatDef {
                slots: vec![
                    ConcatSlot {
                        prefix: Some("s".to_string()),
                        ty: Ty::new(TyKind::Int),
                    },
                    ConcatSlot {
                        prefix: None,
                        ty: Ty::record(vec![AttrType::new("name", Ty::new(TyKind::String))]),
                    },
                ],
                atts: vec![],
            },
        );
        let concat = Ty::new(TyKind::Record(RecordAtts::Concat(concat_sym)));
        let walked = u.walk(&concat);
        let atts = walked.kind.into_record().unwrap().into_fixed().unwrap();
        let idns: Vec<_> = atts.iter().map(|a| a.idn.as_str()).collect();
        assert_eq!(idns, vec!["s", "name"]);
    }
}
