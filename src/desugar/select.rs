//! The `select` reductions: naming anonymous generators, eliminating
//! `into`, substituting `partition`/`*` under a group by, and finally
//! rewriting group-less selects into plain comprehensions.

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{
    substitute, AttrExpr, BinOp, Comp, Expr, ExprKind, Pattern, Qual, Select,
};
use crate::ast::types::{AttrType, Monoid, RecordAtts, TyKind};
use crate::error::Span;
use crate::semantic::{Context, Entity};

use super::fresh_name;

/// Gives every anonymous generator and every `into` a fresh name, then
/// rewrites the identifiers that resolved to their injected attributes into
/// explicit projections. `into` itself becomes a function application.
pub fn name_anonymous(expr: Expr, ctx: &mut Context, changed: &mut bool) -> Result<Expr> {
    let mut namer = Namer {
        ctx: &mut *ctx,
        changed: false,
    };
    let expr = namer.fold_expr(expr)?;
    *changed |= namer.changed;

    let mut rewriter = AliasRewriter {
        ctx,
        changed: false,
    };
    let expr = rewriter.fold_expr(expr)?;
    *changed |= rewriter.changed;
    Ok(expr)
}

struct Namer<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

impl<'r, 'w> CalculusFold for Namer<'r, 'w> {
    fn fold_qual(&mut self, qual: Qual) -> Result<Qual> {
        match qual {
            Qual::Gen(None, src) => {
                let src = self.fold_expr(src)?;
                let name = fresh_name(self.ctx, "g");
                self.ctx.anon_gens.insert(src.id.unwrap(), name.clone());
                self.changed = true;
                Ok(Qual::Gen(Some(Pattern::Idn(name)), src))
            }
            qual => fold::fold_qual(self, qual),
        }
    }

    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        if let ExprKind::Into { .. } = &expr.kind {
            let id = expr.id.unwrap();
            if !self.ctx.anon_gens.contains_key(&id) {
                let name = fresh_name(self.ctx, "r");
                self.ctx.anon_gens.insert(id, name);
            }
        }
        Ok(expr)
    }
}

struct AliasRewriter<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

impl<'r, 'w> CalculusFold for AliasRewriter<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;

        if expr.kind.is_ident() {
            let entity = expr.id.and_then(|id| self.ctx.entities.get(&id));
            let target = match entity {
                Some(Entity::GenAttribute { attr, gen_id, .. }) => {
                    self.ctx.anon_gens.get(gen_id).map(|g| (g.clone(), attr.clone()))
                }
                Some(Entity::IntoAttribute { attr, into_id, .. }) => self
                    .ctx
                    .anon_gens
                    .get(into_id)
                    .map(|r| (r.clone(), attr.clone())),
                _ => None,
            };
            if let Some((base, attr)) = target {
                self.changed = true;
                let mut proj = Expr::ident(&base).proj(&attr);
                proj.span = expr.span;
                return Ok(proj);
            }
        }

        if let ExprKind::Into { .. } = &expr.kind {
            let id = expr.id.unwrap();
            let name = self
                .ctx
                .anon_gens
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("into without an assigned name"))?;
            if let ExprKind::Into { left, right } = expr.kind {
                self.changed = true;
                let mut out = Expr::new(ExprKind::FunApp {
                    func: Box::new(Expr::new(ExprKind::FunAbs {
                        param: Pattern::Idn(name),
                        body: right,
                    })),
                    arg: left,
                });
                out.span = expr.span;
                return Ok(out);
            }
        }

        Ok(expr)
    }
}

/// `select ... group by g`: build the partition sub-query (same sources and
/// filter, restricted to the rows whose key equals `g`), substitute it for
/// every `partition` (and the star row query for every `*`) in the
/// projection and having clause, and drop the group by.
pub fn desugar_group_by(expr: Expr, ctx: &mut Context, changed: &mut bool) -> Result<Expr> {
    let mut pass = GroupBy {
        ctx,
        changed: false,
    };
    let expr = pass.fold_expr(expr)?;
    *changed |= pass.changed;
    Ok(expr)
}

struct GroupBy<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

impl<'r, 'w> CalculusFold for GroupBy<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        let Expr { id, kind, span, ty } = expr;
        match kind {
            ExprKind::Select(select) if select.group_by.is_some() => {
                self.changed = true;
                self.rewrite_grouped(select, id, span)
            }
            kind => Ok(Expr { id, kind, span, ty }),
        }
    }
}

impl<'r, 'w> GroupBy<'r, 'w> {
    fn rewrite_grouped(
        &mut self,
        select: Select,
        id: Option<usize>,
        span: Option<Span>,
    ) -> Result<Expr> {
        let group_key = select.group_by.as_deref().unwrap();

        // clone the sources under fresh generator names
        let mut renames = Vec::new();
        let mut inner_from = Vec::new();
        for qual in &select.from {
            let (pattern, src) = qual
                .as_gen()
                .ok_or_else(|| anyhow!("select from clause must be generators"))?;
            let Some(Pattern::Idn(name)) = pattern else {
                bail!("group by over an unnamed generator");
            };
            let fresh = fresh_name(self.ctx, "p");
            renames.push((name.clone(), fresh.clone(), src.clone()));
            inner_from.push(Qual::Gen(Some(Pattern::Idn(fresh)), src.detached()));
        }

        let rename = |e: &Expr| {
            let mut out = e.detached();
            for (orig, fresh, _) in &renames {
                out = substitute(out, orig, &Expr::ident(fresh));
            }
            out
        };

        // the rows of the group: same sources and filter, key equal to ours
        let key_eq = Expr::binary(rename(group_key), BinOp::Eq, group_key.detached());
        let inner_filter = match &select.filter {
            Some(f) => Expr::binary(rename(f), BinOp::And, key_eq),
            None => key_eq,
        };

        let partition_proj = match renames.as_slice() {
            [(_, fresh, _)] => Expr::ident(fresh),
            _ => Expr::new(ExprKind::RecordCons(
                renames
                    .iter()
                    .map(|(orig, fresh, _)| AttrExpr::new(orig, Expr::ident(fresh)))
                    .collect(),
            )),
        };
        let partition_sub = sub_select(inner_from.clone(), partition_proj, inner_filter.clone());

        // the star row query is only materialized when a `*` occurs
        let needs_star = expr_has_star(&select.proj)
            || select.having.as_deref().map(expr_has_star).unwrap_or(false);
        let star_sub = if needs_star {
            let star_proj = match renames.as_slice() {
                [(_, fresh, _)] => Expr::ident(fresh),
                _ => {
                    let gens: Vec<(String, String, &Expr)> = renames
                        .iter()
                        .map(|(orig, fresh, src)| (orig.clone(), fresh.clone(), src))
                        .collect();
                    star_record(self.ctx, &gens)?
                }
            };
            sub_select(inner_from, star_proj, inner_filter)
        } else {
            partition_sub.clone()
        };

        let proj = replace_keywords(*select.proj, &partition_sub, &star_sub);
        let having = select
            .having
            .map(|h| Box::new(replace_keywords(*h, &partition_sub, &star_sub)));

        Ok(Expr {
            id,
            span,
            ty: None,
            kind: ExprKind::Select(Select {
                from: select.from,
                distinct: select.distinct,
                proj: Box::new(proj),
                filter: select.filter,
                group_by: None,
                order_by: select.order_by,
                having,
            }),
        })
    }
}

/// Whether `*` occurs in this expression, not counting nested selects.
fn expr_has_star(expr: &Expr) -> bool {
    struct Finder {
        found: bool,
    }
    impl CalculusFold for Finder {
        fn fold_expr_kind(&mut self, kind: ExprKind) -> Result<ExprKind> {
            match kind {
                ExprKind::Star => {
                    self.found = true;
                    Ok(kind)
                }
                ExprKind::Select(_) => Ok(kind),
                kind => fold::fold_expr_kind(self, kind),
            }
        }
    }
    let mut finder = Finder { found: false };
    let _ = finder.fold_expr(expr.clone());
    finder.found
}

fn sub_select(from: Vec<Qual>, proj: Expr, filter: Expr) -> Expr {
    Expr::new(ExprKind::Select(Select {
        from,
        distinct: false,
        proj: Box::new(proj),
        filter: Some(Box::new(filter)),
        group_by: None,
        order_by: None,
        having: None,
    }))
}

fn replace_keywords(expr: Expr, partition: &Expr, star: &Expr) -> Expr {
    struct Replace<'a> {
        partition: &'a Expr,
        star: &'a Expr,
    }
    impl<'a> CalculusFold for Replace<'a> {
        fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
            match expr.kind {
                ExprKind::Partition => {
                    let mut sub = self.partition.detached();
                    sub.span = expr.span;
                    Ok(sub)
                }
                ExprKind::Star => {
                    let mut sub = self.star.detached();
                    sub.span = expr.span;
                    Ok(sub)
                }
                _ => fold::fold_expr(self, expr),
            }
        }
    }
    let mut replace = Replace { partition, star };
    replace.fold_expr(expr).unwrap()
}

/// `select` without group by becomes a flat comprehension; the monoid comes
/// from `order by`/`distinct`, the filter and having become predicates.
pub fn desugar_select(expr: Expr, ctx: &mut Context, changed: &mut bool) -> Result<Expr> {
    let mut pass = ToComp {
        ctx,
        changed: false,
    };
    let expr = pass.fold_expr(expr)?;
    *changed |= pass.changed;
    Ok(expr)
}

struct ToComp<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

impl<'r, 'w> CalculusFold for ToComp<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        let Expr { id, kind, span, ty } = expr;
        match kind {
            ExprKind::Select(select) if select.group_by.is_none() => {
                self.changed = true;
                let monoid = if select.order_by.is_some() {
                    Monoid::List
                } else if select.distinct {
                    Monoid::Set
                } else {
                    self.ctx.fresh_monoid()
                };

                let proj = if matches!(select.proj.kind, ExprKind::Star) {
                    star_row_of(self.ctx, &select.from)?
                } else {
                    *select.proj
                };

                let mut quals = select.from;
                if let Some(f) = select.filter {
                    quals.push(Qual::Filter(*f));
                }
                if let Some(h) = select.having {
                    quals.push(Qual::Filter(*h));
                }
                // ordering has no counterpart in the algebra: only the list
                // monoid choice survives
                Ok(Expr {
                    id,
                    span,
                    ty: None,
                    kind: ExprKind::Comp(Comp {
                        monoid,
                        quals,
                        body: Box::new(proj),
                    }),
                })
            }
            kind => Ok(Expr { id, kind, span, ty }),
        }
    }
}

/// The expansion of a bare `*` projection over the given generators.
fn star_row_of(ctx: &mut Context, from: &[Qual]) -> Result<Expr> {
    let gens: Vec<(String, String, &Expr)> = from
        .iter()
        .map(|q| -> Result<(String, String, &Expr)> {
            let (pattern, src) = q
                .as_gen()
                .ok_or_else(|| anyhow!("select from clause must be generators"))?;
            let Some(Pattern::Idn(name)) = pattern else {
                bail!("star expansion over an unnamed generator");
            };
            Ok((name.clone(), name.clone(), src))
        })
        .try_collect()?;

    match gens.as_slice() {
        [(_, name, _)] => Ok(Expr::ident(name)),
        _ => star_record(ctx, &gens),
    }
}

/// The row record of a multi-generator `*`: named generators contribute one
/// attribute each (collisions suffixed `_k`), generators that were
/// anonymous are spliced field by field.
fn star_record(ctx: &mut Context, gens: &[(String, String, &Expr)]) -> Result<Expr> {
    let mut used = std::collections::HashSet::new();
    let mut atts = Vec::new();
    for (k, (orig, var, src)) in gens.iter().enumerate() {
        if ctx.anon_gens.contains_key(&src.id.unwrap_or(usize::MAX)) {
            for field in gen_row_fields(ctx, src)? {
                atts.push(AttrExpr::new(
                    &field.idn,
                    Expr::ident(var).proj(&field.idn),
                ));
            }
        } else {
            let idn = if used.insert(orig.clone()) {
                orig.clone()
            } else {
                format!("{}_{}", orig, k + 1)
            };
            atts.push(AttrExpr::new(idn, Expr::ident(var)));
        }
    }
    Ok(Expr::new(ExprKind::RecordCons(atts)))
}

/// The fields of a generator's row type; the source must have resolved to a
/// collection of records by now.
fn gen_row_fields(ctx: &Context, src: &Expr) -> Result<Vec<AttrType>> {
    let ty = src
        .ty
        .as_ref()
        .ok_or_else(|| anyhow!("unresolved generator source"))?;
    let inner = match &ctx.unifier.walk(ty).kind {
        TyKind::Collection(_, inner) => inner.as_ref().clone(),
        _ => bail!("generator source is not a collection"),
    };
    let kind = match inner.kind {
        TyKind::User(sym) => {
            let ty = ctx
                .world
                .tipes
                .get(&sym)
                .ok_or_else(|| anyhow!("unknown user type `{sym}`"))?;
            ty.kind.clone()
        }
        kind => kind,
    };
    match kind {
        TyKind::Record(RecordAtts::Fixed(atts)) => Ok(atts),
        _ => bail!("cannot expand `*` over a non-record row"),
    }
}
