//! The unnesting driver: rewrites canonical comprehensions into the flat
//! relational algebra.
//!
//! The driver `T(comp, u, w, E)` carries the outer pattern `u` (the group
//! key of an enclosing comprehension), the child pattern `w` (the variables
//! the child plan already produces) and the child plan `E`. Nested
//! comprehensions in the predicate or the yield are hoisted into fresh
//! variables whose values the child plan computes; generators become scans,
//! joins and unnests; an exhausted qualifier list reduces or nests.
//!
//! The input must satisfy the canonical invariants. Any violation found
//! here is a compiler bug and surfaces as an internal error, never as a
//! user error.

use std::collections::HashSet;

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;

use crate::ast::algebra::{self, Node, NodeKind};
use crate::ast::calculus::{
    BinOp, CanonComp, Expr, ExprKind, Literal, Path, UnOp,
};
use crate::ast::types::{Monoid, RecordAtts, Ty, TyKind};
use crate::error::Span;
use crate::normalize::split_conjuncts;
use crate::semantic::Context;

pub fn unnest(expr: Expr, ctx: &mut Context) -> Result<Node> {
    let span = expr.span;
    let mut unnester = Unnester { ctx };
    match expr.kind {
        ExprKind::CanonComp(comp) => unnester.unnest_comp(
            comp,
            span,
            &Pat::Empty,
            &Pat::Empty,
            Node::new(NodeKind::Empty),
        ),
        kind => bail!(
            "query did not normalize to a comprehension (got `{}`)",
            kind.as_ref()
        ),
    }
}

/// The pattern of variables a plan produces.
#[derive(Debug, Clone)]
enum Pat {
    Empty,
    Var(VarInfo),
    Pair(Box<Pat>, Box<Pat>),
}

#[derive(Debug, Clone)]
struct VarInfo {
    name: String,
    ty: Ty,
}

fn pair(a: Pat, b: Pat) -> Pat {
    match (a, b) {
        (Pat::Empty, b) => b,
        (a, Pat::Empty) => a,
        (a, b) => Pat::Pair(Box::new(a), Box::new(b)),
    }
}

/// The distinct variables of a pattern, left to right; their positions are
/// the argument indices of expressions over the pattern.
fn pattern_variables(pat: &Pat) -> Vec<&VarInfo> {
    fn go<'a>(pat: &'a Pat, out: &mut Vec<&'a VarInfo>) {
        match pat {
            Pat::Empty => {}
            Pat::Var(v) => {
                if !out.iter().any(|x| x.name == v.name) {
                    out.push(v);
                }
            }
            Pat::Pair(a, b) => {
                go(a, out);
                go(b, out);
            }
        }
    }
    let mut out = Vec::new();
    go(pat, &mut out);
    out
}

/// Strips from `left` the variables that already appear in `right`.
fn reduce_pattern(left: &Pat, right: &Pat) -> Pat {
    let shadowed: HashSet<&str> = pattern_variables(right)
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    pattern_variables(left)
        .into_iter()
        .filter(|v| !shadowed.contains(v.name.as_str()))
        .fold(Pat::Empty, |acc, v| pair(acc, Pat::Var(v.clone())))
}

struct Unnester<'r, 'w> {
    ctx: &'r mut Context<'w>,
}

impl<'r, 'w> Unnester<'r, 'w> {
    fn unnest_comp(
        &mut self,
        comp: CanonComp,
        span: Option<Span>,
        u: &Pat,
        w: &Pat,
        child: Node,
    ) -> Result<Node> {
        log::trace!("unnesting comprehension yielding {}", comp.monoid);

        let gen_vars: HashSet<String> = comp.gens.iter().map(|g| g.var.clone()).collect();

        // hoist a nested comprehension out of the predicate when it does
        // not depend on this comprehension's own generators
        if let Some(nested) = find_nested_comp(&comp.pred) {
            if free_vars(nested).is_disjoint(&gen_vars) {
                let nested = nested.clone();
                return self.hoist(comp, span, u, w, child, nested, Part::Pred);
            }
        }

        if comp.gens.is_empty() {
            // with no generators left, the yield is next
            if let Some(nested) = find_nested_comp(&comp.body) {
                let nested = nested.clone();
                return self.hoist(comp, span, u, w, child, nested, Part::Body);
            }

            let monoid = self.concrete_monoid(&comp.monoid);
            let pred = self.translate(&comp.pred, w)?;
            let body = self.translate(&comp.body, w)?;
            let kind = match u {
                Pat::Empty => NodeKind::Reduce {
                    monoid,
                    body,
                    pred,
                    input: Box::new(child),
                },
                _ => NodeKind::Nest {
                    monoid,
                    body,
                    key: self.pattern_expr(u, w)?,
                    pred,
                    group: self.pattern_expr(&reduce_pattern(w, u), w)?,
                    input: Box::new(child),
                },
            };
            return Ok(Node { kind, span });
        }

        // take the next generator and split the predicate around it
        let CanonComp {
            monoid,
            mut gens,
            pred,
            body,
        } = comp;
        let gen = gens.remove(0);

        let conjuncts = split_conjuncts(*pred)
            .into_iter()
            .filter(|c| !is_true(c))
            .collect_vec();
        let (p1, p2, p3) = split_predicate(conjuncts, w, &gen.var);

        let rest = CanonComp {
            monoid,
            gens,
            pred: Box::new(and_chain(p3)),
            body,
        };

        let mut row_ty = self.path_row_ty(&gen.path, w)?;

        if matches!(w, Pat::Empty) {
            // the first generator scans its source directly
            let Path::Variable(source) = &gen.path else {
                bail!("first generator must draw from a catalog source");
            };
            let vpat = Pat::Var(VarInfo {
                name: gen.var.clone(),
                ty: row_ty,
            });
            let pred_a = self.translate(&and_chain(merge(p1, p2)), &vpat)?;
            let scan = self.scan(source, span)?;
            let input = select_over(pred_a, scan, span);
            return self.unnest_comp(rest, span, u, &vpat, input);
        }

        let outer = !matches!(u, Pat::Empty);
        if outer {
            // rows of the left side without a match survive with nulls
            row_ty.nullable = true;
        }
        let vinfo = VarInfo {
            name: gen.var.clone(),
            ty: row_ty,
        };

        match &gen.path {
            Path::Variable(name) if self.is_source(name, w) => {
                // join the plan so far against the new source
                let vpat = Pat::Var(vinfo.clone());
                let pred_right = self.translate(&and_chain(p1), &vpat)?;
                let scan = self.scan(name, span)?;
                let right = select_over(pred_right, scan, span);

                let extended = pair(w.clone(), Pat::Var(vinfo));
                let pred_join = self.translate(&and_chain(p2), &extended)?;
                let kind = if outer {
                    NodeKind::OuterJoin {
                        pred: pred_join,
                        left: Box::new(child),
                        right: Box::new(right),
                    }
                } else {
                    NodeKind::Join {
                        pred: pred_join,
                        left: Box::new(child),
                        right: Box::new(right),
                    }
                };
                self.unnest_comp(rest, span, u, &extended, Node { kind, span })
            }

            path => {
                // a path into the rows the plan already produces
                let path_a = self.path_expr(path, w)?;
                let extended = pair(w.clone(), Pat::Var(vinfo));
                let pred_a = self.translate(&and_chain(merge(p1, p2)), &extended)?;
                let kind = if outer {
                    NodeKind::OuterUnnest {
                        path: path_a,
                        pred: pred_a,
                        input: Box::new(child),
                    }
                } else {
                    NodeKind::Unnest {
                        path: path_a,
                        pred: pred_a,
                        input: Box::new(child),
                    }
                };
                self.unnest_comp(rest, span, u, &extended, Node { kind, span })
            }
        }
    }

    /// Hoists a nested comprehension into a fresh variable computed by the
    /// child plan, then retries the current comprehension.
    fn hoist(
        &mut self,
        comp: CanonComp,
        span: Option<Span>,
        u: &Pat,
        w: &Pat,
        child: Node,
        nested: Expr,
        part: Part,
    ) -> Result<Node> {
        let target_id = nested
            .id
            .ok_or_else(|| anyhow!("unresolved nested comprehension"))?;
        let v_ty = nested
            .ty
            .clone()
            .ok_or_else(|| anyhow!("untyped nested comprehension"))?;
        let v = {
            let sym = self.ctx.fresh("v");
            format!("v${}", sym.id)
        };

        let inner = match nested.kind {
            ExprKind::CanonComp(inner) => inner,
            _ => bail!("hoist target is not a comprehension"),
        };
        let inner_child = self.unnest_comp(inner, nested.span, w, w, child)?;

        let CanonComp {
            monoid,
            gens,
            pred,
            body,
        } = comp;
        let comp = match part {
            Part::Pred => CanonComp {
                monoid,
                gens,
                pred: Box::new(replace_by_ident(*pred, target_id, &v)),
                body,
            },
            Part::Body => CanonComp {
                monoid,
                gens,
                pred,
                body: Box::new(replace_by_ident(*body, target_id, &v)),
            },
        };

        let extended = pair(w.clone(), Pat::Var(VarInfo { name: v, ty: v_ty }));
        self.unnest_comp(comp, span, u, &extended, inner_child)
    }

    fn scan(&self, name: &str, span: Option<Span>) -> Result<Node> {
        let ty = self
            .ctx
            .world
            .sources
            .get(name)
            .ok_or_else(|| anyhow!("unknown source `{name}`"))?;
        let row = match self.ctx.unifier.walk(ty).kind {
            TyKind::Collection(_, inner) => *inner,
            _ => bail!("source `{name}` is not a collection"),
        };
        Ok(Node {
            kind: NodeKind::Scan {
                name: name.to_string(),
                row,
            },
            span,
        })
    }

    fn is_source(&self, name: &str, w: &Pat) -> bool {
        pattern_variables(w).iter().all(|v| v.name != name)
            && self.ctx.world.sources.contains_key(name)
    }

    /// The row type produced by a generator over `path`.
    fn path_row_ty(&self, path: &Path, w: &Pat) -> Result<Ty> {
        let collection = self.path_value_ty(path, w)?;
        match self.ctx.unifier.walk(&collection).kind {
            TyKind::Collection(_, inner) => Ok(*inner),
            kind => bail!("generator path has non-collection type `{kind}`"),
        }
    }

    /// The type of the value a path denotes: a bound variable's row, a
    /// source's collection, or a field reached through records.
    fn path_value_ty(&self, path: &Path, w: &Pat) -> Result<Ty> {
        match path {
            Path::Variable(name) => {
                if let Some(v) = pattern_variables(w).iter().find(|v| v.name == *name) {
                    return Ok(v.ty.clone());
                }
                self.ctx
                    .world
                    .sources
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("unbound path root `{name}`"))
            }
            Path::Inner(prefix, field) => {
                let base = self.path_value_ty(prefix, w)?;
                self.record_field_ty(&base, field)
            }
        }
    }

    fn record_field_ty(&self, ty: &Ty, field: &str) -> Result<Ty> {
        let walked = self.ctx.unifier.walk(ty);
        let kind = match walked.kind {
            TyKind::User(sym) => {
                let def = self
                    .ctx
                    .world
                    .tipes
                    .get(&sym)
                    .ok_or_else(|| anyhow!("unknown user type `{sym}`"))?;
                self.ctx.unifier.walk(def).kind
            }
            kind => kind,
        };
        let atts = match kind {
            TyKind::Record(RecordAtts::Fixed(atts)) => atts,
            TyKind::Record(RecordAtts::Open { atts, .. }) => atts,
            kind => bail!("path projects field `{field}` out of `{kind}`"),
        };
        atts.into_iter()
            .find(|a| a.idn == field)
            .map(|a| a.ty)
            .ok_or_else(|| anyhow!("path projects unknown field `{field}`"))
    }

    /// The smallest monoid a still-undetermined collection variable admits.
    fn concrete_monoid(&self, monoid: &Monoid) -> Monoid {
        match self.ctx.unifier.monoid_find(monoid) {
            Monoid::Var(sym) => {
                let bounds = self.ctx.unifier.bounds_of(&sym);
                if bounds.leq.is_empty() {
                    return Monoid::Bag;
                }
                let props = bounds
                    .leq
                    .iter()
                    .filter_map(|m| self.ctx.unifier.monoid_find(m).props());
                let (mut commutative, mut idempotent) = (false, false);
                for p in props {
                    commutative |= p.commutative;
                    idempotent |= p.idempotent;
                }
                match (commutative, idempotent) {
                    (_, true) => Monoid::Set,
                    (true, false) => Monoid::Bag,
                    (false, false) => Monoid::List,
                }
            }
            m => m,
        }
    }

    /// Converts a canonical expression over pattern variables into an
    /// algebra expression over positional arguments.
    fn translate(&self, expr: &Expr, pat: &Pat) -> Result<algebra::Expr> {
        let vars = pattern_variables(pat);
        translate_inner(expr, &vars)
    }

    fn path_expr(&self, path: &Path, pat: &Pat) -> Result<algebra::Expr> {
        let vars = pattern_variables(pat);
        path_expr_inner(path, &vars)
    }

    /// A record (or single argument) naming the variables of `pat`, indexed
    /// against the full pattern `w`.
    fn pattern_expr(&self, pat: &Pat, w: &Pat) -> Result<algebra::Expr> {
        let vars = pattern_variables(w);
        let exprs: Vec<algebra::Expr> = pattern_variables(pat)
            .iter()
            .map(|v| -> Result<algebra::Expr> {
                let index = vars
                    .iter()
                    .position(|x| x.name == v.name)
                    .ok_or_else(|| anyhow!("pattern variable `{}` is not in scope", v.name))?;
                Ok(algebra::Expr::new(algebra::ExprKind::Argument {
                    ty: v.ty.clone(),
                    index,
                }))
            })
            .try_collect()?;
        Ok(match exprs.len() {
            0 => algebra::Expr::new(algebra::ExprKind::RecordCons(Vec::new())),
            1 => exprs.into_iter().next().unwrap(),
            _ => algebra::Expr::new(algebra::ExprKind::RecordCons(
                exprs
                    .into_iter()
                    .enumerate()
                    .map(|(k, e)| (format!("_{}", k + 1), e))
                    .collect(),
            )),
        })
    }
}

enum Part {
    Pred,
    Body,
}

fn select_over(pred: algebra::Expr, input: Node, span: Option<Span>) -> Node {
    if pred.is_true() {
        input
    } else {
        Node {
            kind: NodeKind::Select {
                pred,
                input: Box::new(input),
            },
            span,
        }
    }
}

fn is_true(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Literal(Literal::Bool(true)))
}

fn and_chain(mut conjuncts: Vec<Expr>) -> Expr {
    match conjuncts.len() {
        0 => Expr::bool(true),
        1 => conjuncts.remove(0),
        _ => {
            let first = conjuncts.remove(0);
            conjuncts
                .into_iter()
                .fold(first, |acc, e| Expr::binary(acc, BinOp::And, e))
        }
    }
}

fn merge(mut a: Vec<Expr>, b: Vec<Expr>) -> Vec<Expr> {
    a.extend(b);
    a
}

/// Splits CNF conjuncts around a new generator variable `v`:
/// - `p1`: over `v` only, no nested comprehension (pushed into the scan);
/// - `p2`: over `v` and the child pattern, no nested comprehension (the
///   join predicate);
/// - `p3`: everything else (pushed into the recursive call).
fn split_predicate(
    conjuncts: Vec<Expr>,
    w: &Pat,
    v: &str,
) -> (Vec<Expr>, Vec<Expr>, Vec<Expr>) {
    let w_vars: HashSet<&str> = pattern_variables(w)
        .iter()
        .map(|x| x.name.as_str())
        .collect();

    let mut p1 = Vec::new();
    let mut p2 = Vec::new();
    let mut p3 = Vec::new();
    for conjunct in conjuncts {
        if contains_comp(&conjunct) {
            p3.push(conjunct);
            continue;
        }
        let free = free_vars(&conjunct);
        if free.iter().all(|x| x == v) {
            p1.push(conjunct);
        } else if free.iter().all(|x| x == v || w_vars.contains(x.as_str())) {
            p2.push(conjunct);
        } else {
            p3.push(conjunct);
        }
    }
    (p1, p2, p3)
}

fn contains_comp(expr: &Expr) -> bool {
    find_nested_comp(expr).is_some()
}

/// The first (outermost, leftmost) canonical comprehension in `expr`,
/// including `expr` itself.
fn find_nested_comp(expr: &Expr) -> Option<&Expr> {
    if expr.kind.is_canon_comp() {
        return Some(expr);
    }
    children(expr).into_iter().find_map(find_nested_comp)
}

fn children(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::RecordProj(e, _) => vec![e.as_ref()],
        ExprKind::RecordCons(atts) => atts.iter().map(|a| &a.expr).collect(),
        ExprKind::If {
            condition,
            then,
            otherwise,
        } => vec![condition.as_ref(), then.as_ref(), otherwise.as_ref()],
        ExprKind::Binary(b) => vec![b.left.as_ref(), b.right.as_ref()],
        ExprKind::Unary(u) => vec![u.expr.as_ref()],
        ExprKind::MergeMonoid { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        ExprKind::ConsCollection(_, e) => vec![e.as_ref()],
        ExprKind::MultiCons(_, es) => es.iter().collect(),
        _ => Vec::new(),
    }
}

/// Free variables of a canonical expression: identifier uses and path
/// roots, minus the generators in scope.
fn free_vars(expr: &Expr) -> HashSet<String> {
    fn go(expr: &Expr, bound: &HashSet<String>, out: &mut HashSet<String>) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if !bound.contains(name) {
                    out.insert(name.clone());
                }
            }
            ExprKind::CanonComp(comp) => {
                let mut bound = bound.clone();
                for gen in &comp.gens {
                    let root = gen.path.root();
                    if !bound.contains(root) {
                        out.insert(root.to_string());
                    }
                    bound.insert(gen.var.clone());
                }
                go(&comp.pred, &bound, out);
                go(&comp.body, &bound, out);
            }
            _ => {
                for child in children(expr) {
                    go(child, bound, out);
                }
            }
        }
    }
    let mut out = HashSet::new();
    go(expr, &HashSet::new(), &mut out);
    out
}

fn replace_by_ident(expr: Expr, target_id: usize, name: &str) -> Expr {
    use crate::ast::calculus::fold::{self, CalculusFold};

    struct Replace<'a> {
        target_id: usize,
        name: &'a str,
    }
    impl<'a> CalculusFold for Replace<'a> {
        fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
            if expr.id == Some(self.target_id) {
                let mut ident = Expr::ident(self.name);
                ident.span = expr.span;
                return Ok(ident);
            }
            fold::fold_expr(self, expr)
        }
    }
    let mut replace = Replace { target_id, name };
    replace.fold_expr(expr).unwrap()
}

fn translate_inner(expr: &Expr, vars: &[&VarInfo]) -> Result<algebra::Expr> {
    use algebra::ExprKind as A;

    let kind = match &expr.kind {
        ExprKind::Ident(name) => {
            let index = vars
                .iter()
                .position(|v| v.name == *name)
                .ok_or_else(|| anyhow!("unbound variable `{name}` in an algebra expression"))?;
            A::Argument {
                ty: vars[index].ty.clone(),
                index,
            }
        }
        ExprKind::Literal(lit) => A::Literal(lit.clone()),
        ExprKind::RecordProj(e, field) => A::RecordProj(
            Box::new(translate_inner(e, vars)?),
            field.clone(),
        ),
        ExprKind::RecordCons(atts) => A::RecordCons(
            atts.iter()
                .map(|a| -> Result<(String, algebra::Expr)> {
                    Ok((a.idn.clone(), translate_inner(&a.expr, vars)?))
                })
                .try_collect()?,
        ),
        ExprKind::Binary(b) => A::Binary {
            left: Box::new(translate_inner(&b.left, vars)?),
            op: b.op,
            right: Box::new(translate_inner(&b.right, vars)?),
        },
        ExprKind::Unary(un) => match un.op {
            UnOp::Neg | UnOp::Not | UnOp::ToFloat => A::Unary {
                op: un.op,
                expr: Box::new(translate_inner(&un.expr, vars)?),
            },
            _ => bail!("collection coercion in an algebra expression"),
        },
        ExprKind::If {
            condition,
            then,
            otherwise,
        } => A::If {
            condition: Box::new(translate_inner(condition, vars)?),
            then: Box::new(translate_inner(then, vars)?),
            otherwise: Box::new(translate_inner(otherwise, vars)?),
        },
        ExprKind::MergeMonoid {
            monoid,
            left,
            right,
        } => {
            if !monoid.is_primitive() {
                bail!("collection monoid `{monoid}` in an arithmetic position");
            }
            A::MergeMonoid {
                monoid: monoid.clone(),
                left: Box::new(translate_inner(left, vars)?),
                right: Box::new(translate_inner(right, vars)?),
            }
        }
        ExprKind::CanonComp(_) => bail!("nested comprehension escaped the unnesting driver"),
        kind => bail!("`{}` cannot appear in an algebra expression", kind.as_ref()),
    };
    Ok(algebra::Expr {
        kind,
        span: expr.span,
    })
}

fn path_expr_inner(path: &Path, vars: &[&VarInfo]) -> Result<algebra::Expr> {
    match path {
        Path::Variable(name) => {
            let index = vars
                .iter()
                .position(|v| v.name == *name)
                .ok_or_else(|| anyhow!("unbound path root `{name}`"))?;
            Ok(algebra::Expr::new(algebra::ExprKind::Argument {
                ty: vars[index].ty.clone(),
                index,
            }))
        }
        Path::Inner(prefix, field) => Ok(algebra::Expr::new(algebra::ExprKind::RecordProj(
            Box::new(path_expr_inner(prefix, vars)?),
            field.clone(),
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(name: &str, ty: TyKind) -> VarInfo {
        VarInfo {
            name: name.to_string(),
            ty: Ty::new(ty),
        }
    }

    #[test]
    fn pattern_variables_dedupe_in_order() {
        let w = pair(
            pair(
                Pat::Var(var("a", TyKind::Int)),
                Pat::Var(var("b", TyKind::Bool)),
            ),
            Pat::Var(var("a", TyKind::Int)),
        );
        let names: Vec<_> = pattern_variables(&w).iter().map(|v| v.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn reduce_pattern_strips_shared_variables() {
        let w = pair(
            Pat::Var(var("a", TyKind::Int)),
            Pat::Var(var("b", TyKind::Bool)),
        );
        let u = Pat::Var(var("a", TyKind::Int));
        let names: Vec<_> = pattern_variables(&reduce_pattern(&w, &u))
            .iter()
            .map(|v| v.name.clone())
            .collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn predicate_split_classes() {
        let w = Pat::Var(var("s", TyKind::Int));
        let conjuncts = vec![
            // over the new variable only
            Expr::binary(Expr::ident("p").proj("age"), BinOp::Gt, Expr::int(20)),
            // across both sides
            Expr::binary(
                Expr::ident("s").proj("age"),
                BinOp::Eq,
                Expr::ident("p").proj("age"),
            ),
            // mentions a generator not yet bound
            Expr::binary(Expr::ident("q").proj("x"), BinOp::Eq, Expr::ident("p").proj("y")),
        ];
        let (p1, p2, p3) = split_predicate(conjuncts, &w, "p");
        assert_eq!(p1.len(), 1);
        assert_eq!(p2.len(), 1);
        assert_eq!(p3.len(), 1);
    }

    #[test]
    fn free_vars_see_through_nested_comprehensions() {
        // for (x <- s.items) where x = y yield or true
        let comp = Expr::new(ExprKind::CanonComp(CanonComp {
            monoid: Monoid::Or,
            gens: vec![crate::ast::calculus::CanonGen {
                var: "x".to_string(),
                path: Path::Inner(
                    Box::new(Path::Variable("s".to_string())),
                    "items".to_string(),
                ),
            }],
            pred: Box::new(Expr::binary(
                Expr::ident("x"),
                BinOp::Eq,
                Expr::ident("y"),
            )),
            body: Box::new(Expr::bool(true)),
        }));
        let free = free_vars(&comp);
        assert!(free.contains("s"));
        assert!(free.contains("y"));
        assert!(!free.contains("x"));
    }
}
