//! Alpha-renaming: every bound variable gets a globally unique name, so the
//! substitutions performed by later phases cannot capture.
//!
//! Only explicit binders are renamed. Data sources, injected aliases,
//! `partition` and `*` resolve through other channels and are left alone.

use std::collections::HashMap;

use anyhow::Result;
use itertools::Itertools;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{CanonComp, CanonGen, Comp, Expr, ExprKind, Path, Pattern, Qual, Select};
use crate::semantic::Context;

pub fn uniquify(expr: Expr, ctx: &mut Context) -> Result<Expr> {
    let mut pass = Uniquifier {
        ctx,
        scopes: vec![HashMap::new()],
    };
    pass.fold_expr(expr)
}

struct Uniquifier<'r, 'w> {
    ctx: &'r mut Context<'w>,
    scopes: Vec<HashMap<String, String>>,
}

impl<'r, 'w> Uniquifier<'r, 'w> {
    fn rename_of(&self, name: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn bind(&mut self, name: &str) -> String {
        let sym = self.ctx.name_symbol(name);
        let unique = format!("{}${}", sym.name, sym.id);
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), unique.clone());
        unique
    }

    fn bind_pattern(&mut self, pattern: Pattern) -> Pattern {
        match pattern {
            Pattern::Idn(name) => Pattern::Idn(self.bind(&name)),
            Pattern::Prod(ps) => {
                Pattern::Prod(ps.into_iter().map(|p| self.bind_pattern(p)).collect())
            }
        }
    }

    fn fold_quals_scoped(&mut self, quals: Vec<Qual>) -> Result<Vec<Qual>> {
        quals
            .into_iter()
            .map(|q| -> Result<Qual> {
                Ok(match q {
                    Qual::Gen(pattern, src) => {
                        let src = self.fold_expr(src)?;
                        let pattern = pattern.map(|p| self.bind_pattern(p));
                        Qual::Gen(pattern, src)
                    }
                    Qual::Bind(pattern, e) => {
                        let e = self.fold_expr(e)?;
                        let pattern = self.bind_pattern(pattern);
                        Qual::Bind(pattern, e)
                    }
                    Qual::Filter(e) => Qual::Filter(self.fold_expr(e)?),
                })
            })
            .try_collect()
    }
}

impl<'r, 'w> CalculusFold for Uniquifier<'r, 'w> {
    fn fold_expr_kind(&mut self, kind: ExprKind) -> Result<ExprKind> {
        Ok(match kind {
            ExprKind::Ident(name) => match self.rename_of(&name) {
                Some(unique) => ExprKind::Ident(unique),
                None => ExprKind::Ident(name),
            },

            ExprKind::Comp(comp) => {
                self.scopes.push(HashMap::new());
                let quals = self.fold_quals_scoped(comp.quals)?;
                let body = Box::new(self.fold_expr(*comp.body)?);
                self.scopes.pop();
                ExprKind::Comp(Comp {
                    monoid: comp.monoid,
                    quals,
                    body,
                })
            }

            ExprKind::CanonComp(comp) => {
                self.scopes.push(HashMap::new());
                let gens = comp
                    .gens
                    .into_iter()
                    .map(|g| {
                        let path = rename_path(g.path, self);
                        CanonGen {
                            var: self.bind(&g.var),
                            path,
                        }
                    })
                    .collect();
                let pred = Box::new(self.fold_expr(*comp.pred)?);
                let body = Box::new(self.fold_expr(*comp.body)?);
                self.scopes.pop();
                ExprKind::CanonComp(CanonComp {
                    monoid: comp.monoid,
                    gens,
                    pred,
                    body,
                })
            }

            ExprKind::Select(select) => {
                self.scopes.push(HashMap::new());
                let from = self.fold_quals_scoped(select.from)?;
                let filter = self.fold_opt(select.filter)?;
                let group_by = self.fold_opt(select.group_by)?;
                let order_by = self.fold_opt(select.order_by)?;
                let proj = Box::new(self.fold_expr(*select.proj)?);
                let having = self.fold_opt(select.having)?;
                self.scopes.pop();
                ExprKind::Select(Select {
                    from,
                    distinct: select.distinct,
                    proj,
                    filter,
                    group_by,
                    order_by,
                    having,
                })
            }

            ExprKind::FunAbs { param, body } => {
                self.scopes.push(HashMap::new());
                let param = self.bind_pattern(param);
                let body = Box::new(self.fold_expr(*body)?);
                self.scopes.pop();
                ExprKind::FunAbs { param, body }
            }

            ExprKind::ExpBlock { binds, body } => {
                self.scopes.push(HashMap::new());
                let binds = binds
                    .into_iter()
                    .map(|(p, e)| -> Result<(Pattern, Expr)> {
                        let e = self.fold_expr(e)?;
                        Ok((self.bind_pattern(p), e))
                    })
                    .try_collect()?;
                let body = Box::new(self.fold_expr(*body)?);
                self.scopes.pop();
                ExprKind::ExpBlock { binds, body }
            }

            kind => fold::fold_expr_kind(self, kind)?,
        })
    }
}

impl<'r, 'w> Uniquifier<'r, 'w> {
    fn fold_opt(&mut self, expr: Option<Box<Expr>>) -> Result<Option<Box<Expr>>> {
        expr.map(|e| -> Result<Box<Expr>> { Ok(Box::new(self.fold_expr(*e)?)) })
            .transpose()
    }
}

fn rename_path(path: Path, pass: &Uniquifier) -> Path {
    match path {
        Path::Variable(name) => match pass.rename_of(&name) {
            Some(unique) => Path::Variable(unique),
            None => Path::Variable(name),
        },
        Path::Inner(prefix, field) => Path::Inner(Box::new(rename_path(*prefix, pass)), field),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::calculus::BinOp;
    use crate::ast::types::Monoid;
    use crate::semantic::World;

    #[test]
    fn shadowed_binders_get_distinct_names() {
        let world = World::new();
        let mut ctx = Context::new(&world);
        // for (x <- xs; x2 <- (for (x <- x.inner) yield bag x)) yield bag x
        let inner = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![Qual::Gen(
                Some(Pattern::Idn("x".to_string())),
                Expr::ident("x").proj("inner"),
            )],
            body: Box::new(Expr::ident("x")),
        }));
        let outer = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("x".to_string())), Expr::ident("xs")),
                Qual::Gen(Some(Pattern::Idn("x2".to_string())), inner),
            ],
            body: Box::new(Expr::binary(Expr::ident("x"), BinOp::Eq, Expr::ident("x2"))),
        }));

        let renamed = uniquify(outer, &mut ctx).unwrap();
        let comp = renamed.kind.into_comp().unwrap();
        let (outer_pat, _) = comp.quals[0].as_gen().unwrap();
        let outer_x = outer_pat.as_ref().unwrap().idns()[0].to_string();

        let (_, inner_src) = comp.quals[1].as_gen().unwrap();
        let inner_comp = inner_src.kind.as_comp().unwrap();
        let (inner_pat, inner_gen_src) = inner_comp.quals[0].as_gen().unwrap();
        let inner_x = inner_pat.as_ref().unwrap().idns()[0].to_string();

        assert_ne!(outer_x, inner_x);
        // the inner generator's source still refers to the outer x
        let base = inner_gen_src.kind.as_record_proj().unwrap().0;
        assert_eq!(base.kind.as_ident().unwrap(), &outer_x);
        // the inner body refers to the inner x
        assert_eq!(
            inner_comp.body.kind.as_ident().unwrap(),
            &inner_x
        );
    }
}
