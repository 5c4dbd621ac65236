//! Sugar operators.
//!
//! `sum`, `max`, `min`, `avg`, `count`, `exists` and `in` reduce to plain
//! comprehensions. Aggregations that are not idempotent go through `to_bag`
//! when their source might discard duplicates (a set, or a collection whose
//! monoid is still undetermined).

use anyhow::Result;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{Comp, Expr, ExprKind, Pattern, Qual, UnOp, UnaryExpr};
use crate::ast::types::{Monoid, TyKind};
use crate::semantic::Context;

use super::fresh_name;

pub fn expand(expr: Expr, ctx: &mut Context, changed: &mut bool) -> Result<Expr> {
    let mut pass = Sugar {
        ctx,
        changed: false,
    };
    let expr = pass.fold_expr(expr)?;
    *changed |= pass.changed;
    Ok(expr)
}

struct Sugar<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

/// Whether aggregating this collection with a non-idempotent monoid needs an
/// explicit `to_bag` first.
fn needs_bag(expr: &Expr) -> bool {
    match expr.ty.as_ref().map(|t| &t.kind) {
        Some(TyKind::Collection(monoid, _)) => {
            matches!(monoid, Monoid::Set | Monoid::Var(_))
        }
        _ => false,
    }
}

fn comp(monoid: Monoid, quals: Vec<Qual>, body: Expr) -> Expr {
    Expr::new(ExprKind::Comp(Comp {
        monoid,
        quals,
        body: Box::new(body),
    }))
}

fn apply(param: String, body: Expr, arg: Expr) -> ExprKind {
    ExprKind::FunApp {
        func: Box::new(Expr::new(ExprKind::FunAbs {
            param: Pattern::Idn(param),
            body: Box::new(body),
        })),
        arg: Box::new(arg),
    }
}

fn to_float(expr: Expr) -> Expr {
    Expr::new(ExprKind::Unary(UnaryExpr {
        op: UnOp::ToFloat,
        expr: Box::new(expr),
    }))
}

impl<'r, 'w> Sugar<'r, 'w> {
    /// `for x <- [to_bag] xs yield m <x or 1>` over a bound source `xs`.
    fn agg_comp(&mut self, monoid: Monoid, xs: &str, coerce: bool, count: bool) -> Expr {
        let x = fresh_name(self.ctx, "x");
        let source = if coerce {
            Expr::new(ExprKind::Unary(UnaryExpr {
                op: UnOp::ToBag,
                expr: Box::new(Expr::ident(xs)),
            }))
        } else {
            Expr::ident(xs)
        };
        let body = if count { Expr::int(1) } else { Expr::ident(&x) };
        comp(
            monoid,
            vec![Qual::Gen(Some(Pattern::Idn(x)), source)],
            body,
        )
    }

    fn rewrite(&mut self, expr: Expr) -> Expr {
        let Expr { id, kind, span, ty } = expr;
        let kind = match kind {
            ExprKind::Sum(e) => {
                self.changed = true;
                let xs = fresh_name(self.ctx, "xs");
                let coerce = needs_bag(&e);
                let body = self.agg_comp(Monoid::Sum, &xs, coerce, false);
                apply(xs, body, *e)
            }
            ExprKind::Max(e) => {
                self.changed = true;
                let xs = fresh_name(self.ctx, "xs");
                let body = self.agg_comp(Monoid::Max, &xs, false, false);
                apply(xs, body, *e)
            }
            ExprKind::Min(e) => {
                self.changed = true;
                let xs = fresh_name(self.ctx, "xs");
                let body = self.agg_comp(Monoid::Min, &xs, false, false);
                apply(xs, body, *e)
            }
            ExprKind::Count(e) => {
                self.changed = true;
                let xs = fresh_name(self.ctx, "xs");
                let coerce = needs_bag(&e);
                let body = self.agg_comp(Monoid::Sum, &xs, coerce, true);
                apply(xs, body, *e)
            }
            ExprKind::Avg(e) => {
                self.changed = true;
                let xs = fresh_name(self.ctx, "xs");
                let coerce = needs_bag(&e);
                let total = self.agg_comp(Monoid::Sum, &xs, coerce, false);
                let size = self.agg_comp(Monoid::Sum, &xs, coerce, true);
                let body = Expr::binary(
                    to_float(total),
                    crate::ast::calculus::BinOp::Div,
                    to_float(size),
                );
                apply(xs, body, *e)
            }
            ExprKind::Exists(e) => {
                self.changed = true;
                let x = fresh_name(self.ctx, "x");
                comp(
                    Monoid::Or,
                    vec![Qual::Gen(Some(Pattern::Idn(x)), *e)],
                    Expr::bool(true),
                )
                .kind
            }
            ExprKind::In {
                element,
                collection,
            } => {
                self.changed = true;
                let x = fresh_name(self.ctx, "x");
                let eq = Expr::binary(
                    Expr::ident(&x),
                    crate::ast::calculus::BinOp::Eq,
                    *element,
                );
                comp(
                    Monoid::Or,
                    vec![Qual::Gen(Some(Pattern::Idn(x)), *collection)],
                    eq,
                )
                .kind
            }
            kind => kind,
        };
        Expr { id, kind, span, ty }
    }
}

impl<'r, 'w> CalculusFold for Sugar<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        Ok(self.rewrite(expr))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::Ty;

    #[test]
    fn sum_over_a_set_goes_through_to_bag() {
        let world = crate::semantic::World::new();
        let mut ctx = Context::new(&world);
        let mut arg = Expr::ident("xs");
        arg.ty = Some(Ty::collection(Monoid::Set, Ty::new(TyKind::Int)));
        let expr = Expr::new(ExprKind::Sum(Box::new(arg)));

        let mut changed = false;
        let expr = expand(expr, &mut ctx, &mut changed).unwrap();
        assert!(changed);
        let rendered = expr.to_string();
        assert!(rendered.contains("to_bag"), "got: {rendered}");
        assert!(rendered.contains("yield sum"), "got: {rendered}");
    }

    #[test]
    fn in_becomes_an_or_comprehension() {
        let world = crate::semantic::World::new();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::In {
            element: Box::new(Expr::int(1)),
            collection: Box::new(Expr::ident("xs")),
        });
        let mut changed = false;
        let expr = expand(expr, &mut ctx, &mut changed).unwrap();
        let comp = expr.kind.into_comp().unwrap();
        assert_eq!(comp.monoid, Monoid::Or);
        assert!(comp.body.to_string().ends_with("= 1"));
    }
}
