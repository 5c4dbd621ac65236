//! Semantic analysis: scope resolution, entity binding, type inference and
//! nullability.

mod context;
mod literals;
mod nullable;
mod resolver;
mod scope;
pub mod unify;

pub use context::{Context, Entity};
pub use nullable::infer_nullability;
pub use resolver::resolve;

use std::collections::HashMap;

use crate::ast::types::{Monoid, RecordAtts, Symbol, Ty, TyKind};

/// The catalog: data sources and user-defined types. Read-only for the
/// lifetime of a compilation; shareable between compilations.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub sources: HashMap<String, Ty>,
    pub tipes: HashMap<Symbol, Ty>,
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    pub fn add_source<S: ToString>(&mut self, name: S, ty: Ty) {
        self.sources.insert(name.to_string(), ty);
    }

    pub fn add_tipe(&mut self, sym: Symbol, ty: Ty) {
        self.tipes.insert(sym, ty);
    }

    /// The largest symbol id used by the catalog; the compile's generator is
    /// primed past it so fresh symbols never collide with catalog symbols.
    pub fn max_symbol_id(&self) -> usize {
        let tys = self.sources.values().chain(self.tipes.values());
        let in_tys = tys.map(max_symbol_of_ty).max().unwrap_or(0);
        let in_keys = self.tipes.keys().map(|s| s.id).max().unwrap_or(0);
        in_tys.max(in_keys)
    }
}

fn max_symbol_of_ty(ty: &Ty) -> usize {
    match &ty.kind {
        TyKind::User(s) | TyKind::Var(s) | TyKind::Number(s) | TyKind::Primitive(s) => s.id,
        TyKind::Collection(m, inner) => {
            let m_id = match m {
                Monoid::Var(s) => s.id,
                _ => 0,
            };
            m_id.max(max_symbol_of_ty(inner))
        }
        TyKind::Fun(p, r) => max_symbol_of_ty(p).max(max_symbol_of_ty(r)),
        TyKind::Pattern(ts) => ts.iter().map(max_symbol_of_ty).max().unwrap_or(0),
        TyKind::Record(atts) => match atts {
            RecordAtts::Fixed(atts) => atts.iter().map(|a| max_symbol_of_ty(&a.ty)).max().unwrap_or(0),
            RecordAtts::Open { atts, sym } => atts
                .iter()
                .map(|a| max_symbol_of_ty(&a.ty))
                .max()
                .unwrap_or(0)
                .max(sym.id),
            RecordAtts::Concat(sym) => sym.id,
        },
        _ => 0,
    }
}
