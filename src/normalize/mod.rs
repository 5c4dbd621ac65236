//! Normalization into the canonical calculus.
//!
//! Repeatedly: beta-reduce applications, inline binds, fold nested
//! comprehension generators into their parent (the monoid laws), and
//! simplify collection coercions. Then one conversion pass turns every
//! comprehension into a [CanonComp]: generators over paths and a single
//! CNF predicate. The unnester relies on these invariants and treats any
//! violation as an internal error.

use anyhow::{bail, Result};

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{
    substitute, BinOp, BinaryExpr, CanonComp, CanonGen, Comp, Expr, ExprKind, Path, Pattern, Qual,
    UnOp, UnaryExpr,
};
use crate::ast::types::Monoid;
use crate::semantic::Context;

pub fn normalize(expr: Expr, ctx: &mut Context) -> Result<Expr> {
    let mut expr = expr;
    loop {
        let mut pass = Reduce {
            ctx: &mut *ctx,
            changed: false,
        };
        expr = pass.fold_expr(expr)?;
        if !pass.changed {
            break;
        }
        expr = crate::desugar::reresolve(expr, ctx)?;
    }
    let mut pass = Canonicalize;
    let expr = pass.fold_expr(expr)?;
    crate::desugar::reresolve(expr, ctx)
}

/// The conjuncts of an `and` chain, in order.
pub fn split_conjuncts(expr: Expr) -> Vec<Expr> {
    match expr.kind {
        ExprKind::Binary(BinaryExpr {
            left,
            op: BinOp::And,
            right,
        }) => {
            let mut out = split_conjuncts(*left);
            out.extend(split_conjuncts(*right));
            out
        }
        _ => vec![expr],
    }
}

struct Reduce<'r, 'w> {
    ctx: &'r mut Context<'w>,
    changed: bool,
}

impl<'r, 'w> CalculusFold for Reduce<'r, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        self.rewrite(expr)
    }
}

impl<'r, 'w> Reduce<'r, 'w> {
    fn rewrite(&mut self, expr: Expr) -> Result<Expr> {
        let Expr { id, kind, span, ty } = expr;
        Ok(match kind {
            // beta reduction
            ExprKind::FunApp { func, arg } if func.kind.is_fun_abs() => {
                let (param, body) = match func.kind {
                    ExprKind::FunAbs { param, body } => (param, body),
                    _ => unreachable!(),
                };
                match param {
                    Pattern::Idn(name) => {
                        self.changed = true;
                        substitute(*body, &name, &arg)
                    }
                    Pattern::Prod(_) => {
                        // route the argument through a plain identifier and
                        // project the leaves; the next round beta-reduces
                        self.changed = true;
                        let base = crate::desugar::fresh_name(self.ctx, "v");
                        let mut body = *body;
                        for (name, replacement) in
                            prod_projections(&param, &Expr::ident(&base))
                        {
                            body = substitute(body, &name, &replacement);
                        }
                        Expr {
                            id,
                            span,
                            ty,
                            kind: ExprKind::FunApp {
                                func: Box::new(Expr::new(ExprKind::FunAbs {
                                    param: Pattern::Idn(base),
                                    body: Box::new(body),
                                })),
                                arg,
                            },
                        }
                    }
                }
            }

            // leftover blocks reduce like binds
            ExprKind::ExpBlock { binds, body } if binds.is_empty() => {
                self.changed = true;
                *body
            }
            ExprKind::ExpBlock { mut binds, body } => {
                let (pattern, value) = binds.remove(0);
                let Pattern::Idn(name) = pattern else {
                    bail!("destructuring bind survived desugaring");
                };
                self.changed = true;
                let rest = Expr {
                    id,
                    span,
                    ty,
                    kind: ExprKind::ExpBlock { binds, body },
                };
                substitute(rest, &name, &value)
            }

            // collection coercions over comprehensions re-tag the monoid
            // when that preserves the multiset of results
            ExprKind::Unary(UnaryExpr { op, expr: operand })
                if is_collection_coercion(op) && operand.kind.is_comp() =>
            {
                let comp = match operand.kind {
                    ExprKind::Comp(c) => c,
                    _ => unreachable!(),
                };
                match retag(op, &comp.monoid) {
                    Some(monoid) => {
                        self.changed = true;
                        Expr {
                            id,
                            span,
                            ty,
                            kind: ExprKind::Comp(Comp { monoid, ..comp }),
                        }
                    }
                    None => Expr {
                        id,
                        span,
                        ty,
                        kind: ExprKind::Unary(UnaryExpr {
                            op,
                            expr: Box::new(Expr {
                                id: None,
                                span: None,
                                ty: None,
                                kind: ExprKind::Comp(comp),
                            }),
                        }),
                    },
                }
            }

            ExprKind::Comp(comp) => {
                let (comp, changed) = self.reduce_comp(comp)?;
                if changed {
                    self.changed = true;
                }
                Expr {
                    id,
                    span,
                    ty,
                    kind: ExprKind::Comp(comp),
                }
            }

            kind => Expr { id, kind, span, ty },
        })
    }

    fn reduce_comp(&mut self, comp: Comp) -> Result<(Comp, bool)> {
        let Comp {
            monoid,
            quals,
            mut body,
        } = comp;

        let mut out: Vec<Qual> = Vec::with_capacity(quals.len());
        let mut pending: Vec<Qual> = quals;
        let mut changed = false;

        while !pending.is_empty() {
            let qual = pending.remove(0);
            match qual {
                // inline binds into everything downstream
                Qual::Bind(Pattern::Idn(name), value) => {
                    changed = true;
                    pending = pending
                        .into_iter()
                        .map(|q| substitute_qual(q, &name, &value))
                        .collect();
                    body = Box::new(substitute(*body, &name, &value));
                }
                Qual::Bind(..) => bail!("destructuring bind survived desugaring"),

                // a generator over a comprehension folds into this one
                Qual::Gen(pattern, src) if src.kind.is_comp() => {
                    changed = true;
                    let inner = match src.kind {
                        ExprKind::Comp(c) => c,
                        _ => unreachable!(),
                    };
                    let mut spliced = inner.quals;
                    let pattern =
                        pattern.ok_or_else(|| anyhow::anyhow!("unnamed generator survived"))?;
                    spliced.push(Qual::Bind(pattern, *inner.body));
                    spliced.extend(pending);
                    pending = spliced;
                }

                // coercions over paths do not change the rows
                Qual::Gen(pattern, src) if coerced_path(&src) => {
                    changed = true;
                    let inner = match src.kind {
                        ExprKind::Unary(UnaryExpr { expr, .. }) => *expr,
                        _ => unreachable!(),
                    };
                    out.push(Qual::Gen(pattern, inner));
                }

                qual => out.push(qual),
            }
        }

        Ok((
            Comp {
                monoid,
                quals: out,
                body,
            },
            changed,
        ))
    }
}

fn is_collection_coercion(op: UnOp) -> bool {
    matches!(op, UnOp::ToSet | UnOp::ToBag | UnOp::ToList)
}

/// The monoid a coerced comprehension can be re-tagged to, or `None` when
/// the coercion is irreducible (`to_bag` of a deduplicating comprehension).
fn retag(op: UnOp, monoid: &Monoid) -> Option<Monoid> {
    match (op, monoid) {
        (UnOp::ToSet, m) if m.is_collection() => Some(Monoid::Set),
        (UnOp::ToBag, Monoid::Bag | Monoid::List) => Some(Monoid::Bag),
        (UnOp::ToList, Monoid::List | Monoid::Bag) => Some(Monoid::List),
        _ => None,
    }
}

/// A coercion applied to something that is already a path.
fn coerced_path(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Unary(UnaryExpr { op, expr }) if is_collection_coercion(*op) => {
            is_path_shaped(expr)
        }
        _ => false,
    }
}

fn is_path_shaped(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::RecordProj(base, _) => is_path_shaped(base),
        _ => false,
    }
}

fn prod_projections(pattern: &Pattern, source: &Expr) -> Vec<(String, Expr)> {
    match pattern {
        Pattern::Idn(name) => vec![(name.clone(), source.clone())],
        Pattern::Prod(ps) => ps
            .iter()
            .enumerate()
            .flat_map(|(k, sub)| {
                let proj = source.clone().proj(&format!("_{}", k + 1));
                prod_projections(sub, &proj)
            })
            .collect(),
    }
}

fn substitute_qual(qual: Qual, name: &str, value: &Expr) -> Qual {
    match qual {
        Qual::Gen(p, e) => Qual::Gen(p, substitute(e, name, value)),
        Qual::Bind(p, e) => Qual::Bind(p, substitute(e, name, value)),
        Qual::Filter(e) => Qual::Filter(substitute(e, name, value)),
    }
}

/// Converts every comprehension into canonical form.
struct Canonicalize;

impl CalculusFold for Canonicalize {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = fold::fold_expr(self, expr)?;
        let Expr { id, kind, span, ty } = expr;
        Ok(match kind {
            ExprKind::Comp(comp) => {
                let mut gens = Vec::new();
                let mut filters = Vec::new();
                for qual in comp.quals {
                    match qual {
                        Qual::Gen(Some(Pattern::Idn(var)), src) => gens.push(CanonGen {
                            var,
                            path: path_of(&src)?,
                        }),
                        Qual::Filter(e) => filters.push(e),
                        q => bail!("non-canonical qualifier `{q}` after normalization"),
                    }
                }
                let pred = to_cnf(and_all(filters));
                Expr {
                    id,
                    span,
                    ty,
                    kind: ExprKind::CanonComp(CanonComp {
                        monoid: comp.monoid,
                        gens,
                        pred: Box::new(pred),
                        body: comp.body,
                    }),
                }
            }
            kind => Expr { id, kind, span, ty },
        })
    }
}

/// The path of a canonical generator source. Anything but a variable and a
/// chain of record projections (modulo residual coercions) is fatal here.
fn path_of(expr: &Expr) -> Result<Path> {
    match &expr.kind {
        ExprKind::Ident(name) => Ok(Path::Variable(name.clone())),
        ExprKind::RecordProj(base, field) => {
            Ok(Path::Inner(Box::new(path_of(base)?), field.clone()))
        }
        ExprKind::Unary(UnaryExpr { op, expr }) if is_collection_coercion(*op) => path_of(expr),
        kind => bail!("generator source `{}` is not a path", kind.as_ref()),
    }
}

fn and_all(mut exprs: Vec<Expr>) -> Expr {
    match exprs.len() {
        0 => Expr::bool(true),
        1 => exprs.remove(0),
        _ => {
            let first = exprs.remove(0);
            exprs
                .into_iter()
                .fold(first, |acc, e| Expr::binary(acc, BinOp::And, e))
        }
    }
}

/// Conjunctive normal form over `and`/`or`/`not`; everything else is an
/// atom.
pub fn to_cnf(expr: Expr) -> Expr {
    let Expr { id, kind, span, ty } = expr;
    match kind {
        ExprKind::Binary(BinaryExpr {
            left,
            op: BinOp::And,
            right,
        }) => Expr::binary(to_cnf(*left), BinOp::And, to_cnf(*right)),

        ExprKind::Binary(BinaryExpr {
            left,
            op: BinOp::Or,
            right,
        }) => distribute(to_cnf(*left), to_cnf(*right)),

        ExprKind::Unary(UnaryExpr {
            op: UnOp::Not,
            expr: operand,
        }) => negate(*operand),

        kind => Expr { id, kind, span, ty },
    }
}

fn negate(expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Unary(UnaryExpr {
            op: UnOp::Not,
            expr: inner,
        }) => to_cnf(*inner),
        ExprKind::Binary(BinaryExpr {
            left,
            op: BinOp::And,
            right,
        }) => distribute(negate(*left), negate(*right)),
        ExprKind::Binary(BinaryExpr {
            left,
            op: BinOp::Or,
            right,
        }) => Expr::binary(negate(*left), BinOp::And, negate(*right)),
        kind => Expr::new(ExprKind::Unary(UnaryExpr {
            op: UnOp::Not,
            expr: Box::new(Expr::new(kind)),
        })),
    }
}

/// `a or b` with both sides in CNF: distribute until no `and` remains under
/// an `or`.
fn distribute(a: Expr, b: Expr) -> Expr {
    if let ExprKind::Binary(BinaryExpr {
        left,
        op: BinOp::And,
        right,
    }) = a.kind
    {
        return Expr::binary(
            distribute(*left, b.clone()),
            BinOp::And,
            distribute(*right, b),
        );
    }
    if let ExprKind::Binary(BinaryExpr {
        left,
        op: BinOp::And,
        right,
    }) = b.kind
    {
        return Expr::binary(
            distribute(a.clone(), *left),
            BinOp::And,
            distribute(a, *right),
        );
    }
    Expr::binary(a, BinOp::Or, b)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::semantic::World;

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    #[test]
    fn cnf_distributes_or_over_and() {
        // a or (b and c)  ->  (a or b) and (a or c)
        let e = Expr::binary(
            ident("a"),
            BinOp::Or,
            Expr::binary(ident("b"), BinOp::And, ident("c")),
        );
        assert_eq!(to_cnf(e).to_string(), "(a or b) and (a or c)");
    }

    #[test]
    fn cnf_pushes_negation_inward() {
        // not (a or b)  ->  not a and not b
        let e = Expr::new(ExprKind::Unary(UnaryExpr {
            op: UnOp::Not,
            expr: Box::new(Expr::binary(ident("a"), BinOp::Or, ident("b"))),
        }));
        assert_eq!(to_cnf(e).to_string(), "(not a) and (not b)");
    }

    #[test]
    fn conjuncts_split_in_order() {
        let e = Expr::binary(
            Expr::binary(ident("a"), BinOp::And, ident("b")),
            BinOp::And,
            ident("c"),
        );
        let parts: Vec<String> = split_conjuncts(e).iter().map(|c| c.to_string()).collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn generator_over_comprehension_is_folded() {
        let world = World::new();
        let mut ctx = Context::new(&world);
        // for (x <- (for (y <- ys; y > 0) yield bag y)) yield bag x
        let inner = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("y".to_string())), ident("ys")),
                Qual::Filter(Expr::binary(ident("y"), BinOp::Gt, Expr::int(0))),
            ],
            body: Box::new(ident("y")),
        }));
        let outer = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![Qual::Gen(Some(Pattern::Idn("x".to_string())), inner)],
            body: Box::new(ident("x")),
        }));

        let mut pass = Reduce {
            ctx: &mut ctx,
            changed: false,
        };
        let reduced = pass.fold_expr(outer).unwrap();
        assert!(pass.changed);

        // after folding and inlining the bind, a single flat comprehension
        let mut pass = Reduce {
            ctx: &mut ctx,
            changed: false,
        };
        let reduced = pass.fold_expr(reduced).unwrap();
        let comp = reduced.kind.into_comp().unwrap();
        assert_eq!(comp.quals.len(), 2);
        assert!(comp.quals[0].is_gen());
        assert!(comp.quals[1].is_filter());
        assert_eq!(comp.body.to_string(), "y");
    }

    #[test]
    fn canonical_comp_has_generators_and_single_predicate() {
        let comp = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Set,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("s".to_string())), ident("students")),
                Qual::Filter(Expr::binary(
                    ident("s").proj("age"),
                    BinOp::Gt,
                    Expr::int(20),
                )),
                Qual::Filter(Expr::binary(
                    ident("s").proj("age"),
                    BinOp::Lt,
                    Expr::int(30),
                )),
            ],
            body: Box::new(ident("s")),
        }));
        let mut pass = Canonicalize;
        let out = pass.fold_expr(comp).unwrap();
        let canon = out.kind.into_canon_comp().unwrap();
        assert_eq!(canon.gens.len(), 1);
        assert_eq!(canon.gens[0].path.to_string(), "students");
        assert_eq!(
            canon.pred.to_string(),
            "(s.age > 20) and (s.age < 30)"
        );
    }
}
