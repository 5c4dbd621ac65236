//! Compile-scoped state: side tables keyed by node id, the symbol and node
//! id generators, the unifier, and the accumulated errors.

use std::collections::{HashMap, HashSet};

use enum_as_inner::EnumAsInner;

use crate::ast::types::{
    ConcatDef, ConcatSlot, Monoid, RecordAtts, Symbol, Ty, TyKind, TypeScheme,
};
use crate::error::{Error, ErrorMessages, Span};
use crate::utils::IdGenerator;

use super::unify::Unifier;
use super::World;

/// What an identifier occurrence refers to.
#[derive(Debug, Clone, EnumAsInner)]
pub enum Entity {
    /// An explicitly declared variable (generator, bind, parameter).
    Variable { idn: Symbol, scheme: TypeScheme },

    /// A catalog source.
    DataSource { name: String, ty: Ty },

    /// `partition` on a grouped select's projection.
    Partition { select_id: usize, ty: Ty },

    /// `*` on a select's projection.
    Star { select_id: usize, ty: Ty },

    /// An attribute injected by an anonymous generator; `gen_id` is the node
    /// id of the generator's source expression.
    GenAttribute {
        attr: String,
        attr_ty: Ty,
        gen_id: usize,
        index: usize,
    },

    /// An attribute injected by `into`; `into_id` is the node id of the
    /// `into` expression.
    IntoAttribute {
        attr: String,
        attr_ty: Ty,
        into_id: usize,
    },

    /// A name declared more than once in the same scope.
    Multiple,

    /// An unresolved name; an error has been reported for it.
    Unknown,
}

pub struct Context<'a> {
    pub world: &'a World,

    /// Node ids; assigned once, preserved by rewrites.
    pub ids: IdGenerator<usize>,

    /// The single monotonic source of symbols for the whole compilation.
    symbols: IdGenerator<usize>,

    pub span_map: HashMap<usize, Span>,

    /// Entity of every resolved identifier use, keyed by node id.
    pub entities: HashMap<usize, Entity>,

    /// Fresh names assigned to anonymous generators, keyed by the node id of
    /// the generator's source expression.
    pub anon_gens: HashMap<usize, String>,

    pub unifier: Unifier<'a>,

    pub errors: Vec<Error>,
}

impl<'a> Context<'a> {
    pub fn new(world: &'a World) -> Self {
        let mut symbols = IdGenerator::new();
        symbols.skip_to(world.max_symbol_id());
        Context {
            world,
            ids: IdGenerator::new(),
            symbols,
            span_map: HashMap::new(),
            entities: HashMap::new(),
            anon_gens: HashMap::new(),
            unifier: Unifier::new(world),
            errors: Vec::new(),
        }
    }

    /// Clears the per-analysis tables. Counters persist: node ids and symbol
    /// ids stay unique across the whole compilation.
    pub fn reset_analysis(&mut self) {
        self.unifier.reset();
        self.entities.clear();
    }

    pub fn fresh(&mut self, prefix: &str) -> Symbol {
        let id = self.symbols.gen();
        Symbol::new(format!("{prefix}{id}"), id)
    }

    /// A symbol carrying a user-written name.
    pub fn name_symbol(&mut self, name: &str) -> Symbol {
        let id = self.symbols.gen();
        Symbol::new(name, id)
    }

    pub fn fresh_ty_var(&mut self) -> Ty {
        Ty::new(TyKind::Var(self.fresh("t")))
    }

    pub fn fresh_number(&mut self) -> Ty {
        Ty::new(TyKind::Number(self.fresh("n")))
    }

    pub fn fresh_primitive(&mut self) -> Ty {
        Ty::new(TyKind::Primitive(self.fresh("p")))
    }

    pub fn fresh_monoid(&mut self) -> Monoid {
        Monoid::Var(self.fresh("m"))
    }

    /// An open record with the given known attributes.
    pub fn open_record(&mut self, atts: Vec<crate::ast::types::AttrType>) -> Ty {
        Ty::new(TyKind::Record(RecordAtts::Open {
            atts,
            sym: self.fresh("r"),
        }))
    }

    pub fn report(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_messages(self) -> ErrorMessages {
        ErrorMessages {
            inner: self.errors.into_iter().map(|e| e.into()).collect(),
        }
    }

    /// The symbol-id watermark used by let-polymorphism: symbols generated
    /// from now on are candidates for generalization.
    pub fn watermark(&self) -> usize {
        self.symbols.peek()
    }

    /// Generalizes `ty` over the variables fresh since `watermark` that are
    /// still unbound, producing the bind's type scheme.
    pub fn generalize(&mut self, ty: &Ty, watermark: usize) -> TypeScheme {
        let ty = self.unifier.walk(ty);

        let mut free = FreeSyms::default();
        collect_free(&self.unifier, &ty, watermark, &mut free);

        // monoid bounds may reach further fresh monoid variables
        let mut queue: Vec<Symbol> = free.monoids.iter().cloned().collect();
        while let Some(sym) = queue.pop() {
            let bounds = self.unifier.bounds_of(&sym);
            for m in bounds.leq.iter().chain(bounds.geq.iter()) {
                if let Monoid::Var(s) = self.unifier.monoid_find(m) {
                    if s.id >= watermark && free.monoids.insert(s.clone()) {
                        queue.push(s);
                    }
                }
            }
        }

        TypeScheme {
            ty,
            free_ty_syms: free.tys.into_iter().collect(),
            free_monoid_syms: free.monoids.into_iter().collect(),
            free_att_syms: free.atts.into_iter().collect(),
        }
    }

    /// Instantiates a scheme by freshening its free symbols and cloning the
    /// monoid bounds and concat definitions reachable from them.
    pub fn instantiate(&mut self, scheme: &TypeScheme) -> Ty {
        if scheme.is_monomorphic() {
            return scheme.ty.clone();
        }

        let mut subst = Subst::default();
        for old in &scheme.free_ty_syms {
            let fresh = self.name_symbol(&old.name);
            subst.tys.insert(old.clone(), fresh);
        }
        for old in &scheme.free_monoid_syms {
            let fresh = self.name_symbol(&old.name);
            subst.monoids.insert(old.clone(), fresh);
        }
        for old in &scheme.free_att_syms {
            let fresh = self.name_symbol(&old.name);
            subst.atts.insert(old.clone(), fresh);
        }

        for (old, fresh) in subst.monoids.clone() {
            let bounds = self.unifier.bounds_of(&old);
            let cloned = super::unify::Bounds {
                leq: bounds.leq.iter().map(|m| subst.monoid(m)).collect(),
                geq: bounds.geq.iter().map(|m| subst.monoid(m)).collect(),
            };
            self.unifier.set_bounds(fresh, cloned);
        }
        for (old, fresh) in subst.atts.clone() {
            let def = self.unifier.concat_def(&old);
            if def != ConcatDef::default() {
                let cloned = ConcatDef {
                    slots: def
                        .slots
                        .iter()
                        .map(|s| ConcatSlot {
                            prefix: s.prefix.clone(),
                            ty: subst.ty(&s.ty),
                        })
                        .collect(),
                    atts: def
                        .atts
                        .iter()
                        .map(|a| crate::ast::types::AttrType::new(&a.idn, subst.ty(&a.ty)))
                        .collect(),
                };
                self.unifier.set_concat_def(fresh, cloned);
            }
        }

        subst.ty(&scheme.ty)
    }
}

#[derive(Default)]
struct FreeSyms {
    tys: HashSet<Symbol>,
    monoids: HashSet<Symbol>,
    atts: HashSet<Symbol>,
}

fn collect_free(unifier: &Unifier, ty: &Ty, watermark: usize, out: &mut FreeSyms) {
    match &ty.kind {
        TyKind::Var(s) | TyKind::Number(s) | TyKind::Primitive(s) => {
            if s.id >= watermark {
                out.tys.insert(s.clone());
            }
        }
        TyKind::Collection(m, inner) => {
            if let Monoid::Var(s) = m {
                if s.id >= watermark {
                    out.monoids.insert(s.clone());
                }
            }
            collect_free(unifier, inner, watermark, out);
        }
        TyKind::Fun(p, r) => {
            collect_free(unifier, p, watermark, out);
            collect_free(unifier, r, watermark, out);
        }
        TyKind::Pattern(ts) => {
            for t in ts {
                collect_free(unifier, t, watermark, out);
            }
        }
        TyKind::Record(atts) => match atts {
            RecordAtts::Fixed(atts) => {
                for a in atts {
                    collect_free(unifier, &a.ty, watermark, out);
                }
            }
            RecordAtts::Open { atts, sym } => {
                if sym.id >= watermark {
                    out.atts.insert(sym.clone());
                }
                for a in atts {
                    collect_free(unifier, &a.ty, watermark, out);
                }
            }
            RecordAtts::Concat(sym) => {
                if sym.id >= watermark {
                    out.atts.insert(sym.clone());
                }
                let def = unifier.concat_def(sym);
                for slot in &def.slots {
                    collect_free(unifier, &slot.ty, watermark, out);
                }
                for a in &def.atts {
                    collect_free(unifier, &a.ty, watermark, out);
                }
            }
        },
        _ => {}
    }
}

#[derive(Default, Clone)]
struct Subst {
    tys: HashMap<Symbol, Symbol>,
    monoids: HashMap<Symbol, Symbol>,
    atts: HashMap<Symbol, Symbol>,
}

impl Subst {
    fn monoid(&self, m: &Monoid) -> Monoid {
        match m {
            Monoid::Var(s) => Monoid::Var(self.monoids.get(s).cloned().unwrap_or_else(|| s.clone())),
            m => m.clone(),
        }
    }

    fn ty(&self, ty: &Ty) -> Ty {
        let kind = match &ty.kind {
            TyKind::Var(s) => TyKind::Var(self.tys.get(s).cloned().unwrap_or_else(|| s.clone())),
            TyKind::Number(s) => {
                TyKind::Number(self.tys.get(s).cloned().unwrap_or_else(|| s.clone()))
            }
            TyKind::Primitive(s) => {
                TyKind::Primitive(self.tys.get(s).cloned().unwrap_or_else(|| s.clone()))
            }
            TyKind::Collection(m, inner) => {
                TyKind::Collection(self.monoid(m), Box::new(self.ty(inner)))
            }
            TyKind::Fun(p, r) => TyKind::Fun(Box::new(self.ty(p)), Box::new(self.ty(r))),
            TyKind::Pattern(ts) => TyKind::Pattern(ts.iter().map(|t| self.ty(t)).collect()),
            TyKind::Record(atts) => TyKind::Record(match atts {
                RecordAtts::Fixed(atts) => RecordAtts::Fixed(
                    atts.iter()
                        .map(|a| crate::ast::types::AttrType::new(&a.idn, self.ty(&a.ty)))
                        .collect(),
                ),
                RecordAtts::Open { atts, sym } => RecordAtts::Open {
                    atts: atts
                        .iter()
                        .map(|a| crate::ast::types::AttrType::new(&a.idn, self.ty(&a.ty)))
                        .collect(),
                    sym: self.atts.get(sym).cloned().unwrap_or_else(|| sym.clone()),
                },
                RecordAtts::Concat(sym) => {
                    RecordAtts::Concat(self.atts.get(sym).cloned().unwrap_or_else(|| sym.clone()))
                }
            }),
            kind => kind.clone(),
        };
        Ty {
            kind,
            nullable: ty.nullable,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::TypeScheme;

    #[test]
    fn instantiating_a_monomorphic_scheme_is_identity() {
        let world = World::default();
        let mut ctx = Context::new(&world);
        let ty = Ty::collection(Monoid::Bag, Ty::new(TyKind::Int));
        let scheme = TypeScheme::monomorphic(ty.clone());
        assert_eq!(ctx.instantiate(&scheme), ty);
    }

    #[test]
    fn generalize_then_instantiate_freshens() {
        let world = World::default();
        let mut ctx = Context::new(&world);

        let wm = ctx.watermark();
        let v = ctx.fresh_ty_var();
        let ty = Ty::new(TyKind::Fun(Box::new(v.clone()), Box::new(v)));
        let scheme = ctx.generalize(&ty, wm);
        assert_eq!(scheme.free_ty_syms.len(), 1);

        let inst1 = ctx.instantiate(&scheme);
        let inst2 = ctx.instantiate(&scheme);
        // two instantiations use distinct variables
        assert_ne!(inst1, inst2);

        // variables older than the watermark are not generalized
        let outer = ctx.fresh_ty_var();
        let wm = ctx.watermark();
        let scheme = ctx.generalize(&outer, wm);
        assert!(scheme.is_monomorphic());
    }
}
