//! Expression blocks and pattern binds.
//!
//! Blocks are eliminated by substituting each bind's value for its uses.
//! Product patterns are reduced to plain identifiers plus `_k` projections,
//! both in binds and in generators.

use anyhow::Result;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{substitute, Comp, Expr, ExprKind, Pattern, Qual, Select};
use crate::semantic::Context;

use super::fresh_name;

pub fn expand(expr: Expr, ctx: &mut Context, changed: &mut bool) -> Result<Expr> {
    let mut pass = Blocks {
        ctx,
        changed: false,
    };
    let expr = pass.fold_expr(expr)?;
    *changed |= pass.changed;
    Ok(expr)
}

struct Blocks<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

/// `(name, replacement)` pairs binding each leaf of a product pattern to the
/// matching `_k` projection chain of `source`.
fn prod_substitutions(pattern: &Pattern, source: &Expr) -> Vec<(String, Expr)> {
    match pattern {
        Pattern::Idn(name) => vec![(name.clone(), source.clone())],
        Pattern::Prod(ps) => ps
            .iter()
            .enumerate()
            .flat_map(|(k, sub)| {
                let proj = source.clone().proj(&format!("_{}", k + 1));
                prod_substitutions(sub, &proj)
            })
            .collect(),
    }
}

impl<'r, 'w> Blocks<'r, 'w> {
    fn rewrite(&mut self, expr: Expr) -> Expr {
        let Expr { id, kind, span, ty } = expr;
        match kind {
            ExprKind::ExpBlock { binds, body } if binds.is_empty() => {
                self.changed = true;
                *body
            }

            ExprKind::ExpBlock { mut binds, body } => {
                let (pattern, value) = binds.remove(0);
                self.changed = true;
                let rest = Expr {
                    id,
                    span,
                    ty,
                    kind: ExprKind::ExpBlock { binds, body },
                };
                match pattern {
                    Pattern::Idn(name) => substitute(rest, &name, &value),
                    Pattern::Prod(_) => {
                        let (base, bind_base) = self.named_base(value);
                        let mut out = rest;
                        for (name, replacement) in prod_substitutions(&pattern, &base) {
                            out = substitute(out, &name, &replacement);
                        }
                        match bind_base {
                            Some((name, value)) => Expr {
                                id: None,
                                span: out.span,
                                ty: None,
                                kind: ExprKind::ExpBlock {
                                    binds: vec![(Pattern::Idn(name), value)],
                                    body: Box::new(out),
                                },
                            },
                            None => out,
                        }
                    }
                }
            }

            ExprKind::Comp(comp) => {
                let Comp {
                    monoid,
                    quals,
                    body,
                } = comp;
                let (quals, rewritten) = self.rewrite_quals(quals);
                if rewritten {
                    self.changed = true;
                }
                Expr {
                    id,
                    span,
                    ty,
                    kind: ExprKind::Comp(Comp {
                        monoid,
                        quals,
                        body,
                    }),
                }
            }

            ExprKind::Select(select)
                if select
                    .from
                    .iter()
                    .any(|q| matches!(q, Qual::Gen(Some(Pattern::Prod(_)), _))) =>
            {
                self.rewrite_select(select, id, span)
            }

            kind => Expr { id, kind, span, ty },
        }
    }

    /// A base expression to project `_k` fields from: identifiers are used
    /// directly, anything else is routed through a fresh bind.
    fn named_base(&mut self, value: Expr) -> (Expr, Option<(String, Expr)>) {
        if value.kind.is_ident() {
            (value, None)
        } else {
            let name = fresh_name(self.ctx, "v");
            (Expr::ident(&name), Some((name, value)))
        }
    }

    fn rewrite_quals(&mut self, quals: Vec<Qual>) -> (Vec<Qual>, bool) {
        let mut out = Vec::with_capacity(quals.len());
        let mut rewritten = false;
        for qual in quals {
            match qual {
                // p <- e  becomes  v <- e; p := v
                Qual::Gen(Some(pattern @ Pattern::Prod(_)), src) => {
                    rewritten = true;
                    let name = fresh_name(self.ctx, "g");
                    out.push(Qual::Gen(Some(Pattern::Idn(name.clone())), src));
                    out.push(Qual::Bind(pattern, Expr::ident(&name)));
                }
                // destructuring binds become one bind per leaf
                Qual::Bind(pattern @ Pattern::Prod(_), value) => {
                    rewritten = true;
                    let (base, bind_base) = self.named_base(value);
                    if let Some((name, value)) = bind_base {
                        out.push(Qual::Bind(Pattern::Idn(name), value));
                    }
                    for (name, replacement) in prod_substitutions(&pattern, &base) {
                        out.push(Qual::Bind(Pattern::Idn(name), replacement));
                    }
                }
                qual => out.push(qual),
            }
        }
        (out, rewritten)
    }

    /// Select generators cannot carry binds, so product patterns substitute
    /// their leaves directly into the other clauses.
    fn rewrite_select(
        &mut self,
        select: Select,
        id: Option<usize>,
        span: Option<crate::error::Span>,
    ) -> Expr {
        let mut substitutions = Vec::new();
        let from: Vec<Qual> = select
            .from
            .into_iter()
            .map(|qual| match qual {
                Qual::Gen(Some(pattern @ Pattern::Prod(_)), src) => {
                    self.changed = true;
                    let name = fresh_name(self.ctx, "g");
                    substitutions.extend(prod_substitutions(&pattern, &Expr::ident(&name)));
                    Qual::Gen(Some(Pattern::Idn(name)), src)
                }
                qual => qual,
            })
            .collect();

        let apply = |expr: Option<Box<Expr>>| -> Option<Box<Expr>> {
            expr.map(|e| {
                let mut out = *e;
                for (name, replacement) in &substitutions {
                    out = substitute(out, name, replacement);
                }
                Box::new(out)
            })
        };

        let select = Select {
            from,
            distinct: select.distinct,
            proj: apply(Some(select.proj)).unwrap(),
            filter: apply(select.filter),
            group_by: apply(select.group_by),
            order_by: apply(select.order_by),
            having: apply(select.having),
        };
        Expr {
            id,
            span,
            ty: None,
            kind: ExprKind::Select(select),
        }
    }
}

impl<'r, 'w> CalculusFold for Blocks<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        Ok(self.rewrite(expr))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::calculus::BinOp;
    use crate::semantic::World;

    #[test]
    fn block_bind_is_substituted() {
        let world = World::new();
        let mut ctx = Context::new(&world);
        // { x := 1; x + x }  ->  1 + 1
        let expr = Expr::new(ExprKind::ExpBlock {
            binds: vec![(Pattern::Idn("x".to_string()), Expr::int(1))],
            body: Box::new(Expr::binary(
                Expr::ident("x"),
                BinOp::Add,
                Expr::ident("x"),
            )),
        });
        let mut changed = false;
        let expr = expand(expr, &mut ctx, &mut changed).unwrap();
        assert!(changed);
        assert_eq!(expr.to_string(), "1 + 1");
    }

    #[test]
    fn product_generator_becomes_bind() {
        let world = World::new();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Comp(Comp {
            monoid: crate::ast::types::Monoid::Bag,
            quals: vec![Qual::Gen(
                Some(Pattern::Prod(vec![
                    Pattern::Idn("a".to_string()),
                    Pattern::Idn("b".to_string()),
                ])),
                Expr::ident("pairs"),
            )],
            body: Box::new(Expr::ident("a")),
        }));
        let mut changed = false;
        let expr = expand(expr, &mut ctx, &mut changed).unwrap();
        assert!(changed);
        let comp = expr.kind.into_comp().unwrap();
        assert!(comp.quals[0].is_gen());
        assert!(comp.quals[1].is_bind());
    }
}
