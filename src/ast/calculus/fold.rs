//! A trait for recursively rebuilding calculus trees.
//!
//! Each pass overrides the variants it cares about and delegates the rest to
//! the default recursion. Node ids, spans and types are preserved.

use anyhow::Result;
use itertools::Itertools;

use super::expr::*;

pub trait CalculusFold {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        fold_expr(self, expr)
    }
    fn fold_expr_kind(&mut self, kind: ExprKind) -> Result<ExprKind> {
        fold_expr_kind(self, kind)
    }
    fn fold_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).try_collect()
    }
    fn fold_qual(&mut self, qual: Qual) -> Result<Qual> {
        fold_qual(self, qual)
    }
    fn fold_quals(&mut self, quals: Vec<Qual>) -> Result<Vec<Qual>> {
        quals.into_iter().map(|q| self.fold_qual(q)).try_collect()
    }
    fn fold_pattern(&mut self, pattern: Pattern) -> Result<Pattern> {
        Ok(pattern)
    }
    fn fold_comp(&mut self, comp: Comp) -> Result<Comp> {
        fold_comp(self, comp)
    }
    fn fold_canon_comp(&mut self, comp: CanonComp) -> Result<CanonComp> {
        fold_canon_comp(self, comp)
    }
    fn fold_select(&mut self, select: Select) -> Result<Select> {
        fold_select(self, select)
    }
    fn fold_path(&mut self, path: Path) -> Result<Path> {
        Ok(path)
    }
}

pub fn fold_expr<F: ?Sized + CalculusFold>(fold: &mut F, mut expr: Expr) -> Result<Expr> {
    expr.kind = fold.fold_expr_kind(expr.kind)?;
    Ok(expr)
}

fn fold_box<F: ?Sized + CalculusFold>(fold: &mut F, expr: Box<Expr>) -> Result<Box<Expr>> {
    Ok(Box::new(fold.fold_expr(*expr)?))
}

fn fold_opt_box<F: ?Sized + CalculusFold>(
    fold: &mut F,
    expr: Option<Box<Expr>>,
) -> Result<Option<Box<Expr>>> {
    expr.map(|e| fold_box(fold, e)).transpose()
}

pub fn fold_expr_kind<F: ?Sized + CalculusFold>(fold: &mut F, kind: ExprKind) -> Result<ExprKind> {
    use ExprKind::*;
    Ok(match kind {
        Literal(_) | Ident(_) | ZeroCollection(_) | Partition | Star => kind,

        RecordProj(expr, field) => RecordProj(fold_box(fold, expr)?, field),
        RecordCons(atts) => RecordCons(
            atts.into_iter()
                .map(|att| -> Result<AttrExpr> {
                    Ok(AttrExpr {
                        idn: att.idn,
                        expr: fold.fold_expr(att.expr)?,
                    })
                })
                .try_collect()?,
        ),
        If {
            condition,
            then,
            otherwise,
        } => If {
            condition: fold_box(fold, condition)?,
            then: fold_box(fold, then)?,
            otherwise: fold_box(fold, otherwise)?,
        },
        Binary(BinaryExpr { left, op, right }) => Binary(BinaryExpr {
            left: fold_box(fold, left)?,
            op,
            right: fold_box(fold, right)?,
        }),
        Unary(UnaryExpr { op, expr }) => Unary(UnaryExpr {
            op,
            expr: fold_box(fold, expr)?,
        }),
        MergeMonoid {
            monoid,
            left,
            right,
        } => MergeMonoid {
            monoid,
            left: fold_box(fold, left)?,
            right: fold_box(fold, right)?,
        },
        ConsCollection(monoid, expr) => ConsCollection(monoid, fold_box(fold, expr)?),
        MultiCons(monoid, exprs) => MultiCons(monoid, fold.fold_exprs(exprs)?),

        Comp(comp) => Comp(fold.fold_comp(comp)?),
        CanonComp(comp) => CanonComp(fold.fold_canon_comp(comp)?),
        Select(select) => Select(fold.fold_select(select)?),

        FunAbs { param, body } => FunAbs {
            param: fold.fold_pattern(param)?,
            body: fold_box(fold, body)?,
        },
        FunApp { func, arg } => FunApp {
            func: fold_box(fold, func)?,
            arg: fold_box(fold, arg)?,
        },
        ExpBlock { binds, body } => ExpBlock {
            binds: binds
                .into_iter()
                .map(|(p, e)| -> Result<(Pattern, Expr)> {
                    Ok((fold.fold_pattern(p)?, fold.fold_expr(e)?))
                })
                .try_collect()?,
            body: fold_box(fold, body)?,
        },
        Into { left, right } => Into {
            left: fold_box(fold, left)?,
            right: fold_box(fold, right)?,
        },

        Sum(expr) => Sum(fold_box(fold, expr)?),
        Max(expr) => Max(fold_box(fold, expr)?),
        Min(expr) => Min(fold_box(fold, expr)?),
        Avg(expr) => Avg(fold_box(fold, expr)?),
        Count(expr) => Count(fold_box(fold, expr)?),
        Exists(expr) => Exists(fold_box(fold, expr)?),
        In {
            element,
            collection,
        } => In {
            element: fold_box(fold, element)?,
            collection: fold_box(fold, collection)?,
        },
    })
}

pub fn fold_qual<F: ?Sized + CalculusFold>(fold: &mut F, qual: Qual) -> Result<Qual> {
    Ok(match qual {
        Qual::Gen(pattern, expr) => Qual::Gen(
            pattern.map(|p| fold.fold_pattern(p)).transpose()?,
            fold.fold_expr(expr)?,
        ),
        Qual::Bind(pattern, expr) => Qual::Bind(fold.fold_pattern(pattern)?, fold.fold_expr(expr)?),
        Qual::Filter(expr) => Qual::Filter(fold.fold_expr(expr)?),
    })
}

pub fn fold_comp<F: ?Sized + CalculusFold>(fold: &mut F, comp: Comp) -> Result<Comp> {
    Ok(Comp {
        monoid: comp.monoid,
        quals: fold.fold_quals(comp.quals)?,
        body: fold_box(fold, comp.body)?,
    })
}

pub fn fold_canon_comp<F: ?Sized + CalculusFold>(fold: &mut F, comp: CanonComp) -> Result<CanonComp> {
    Ok(CanonComp {
        monoid: comp.monoid,
        gens: comp
            .gens
            .into_iter()
            .map(|g| -> Result<CanonGen> {
                Ok(CanonGen {
                    var: g.var,
                    path: fold.fold_path(g.path)?,
                })
            })
            .try_collect()?,
        pred: fold_box(fold, comp.pred)?,
        body: fold_box(fold, comp.body)?,
    })
}

pub fn fold_select<F: ?Sized + CalculusFold>(fold: &mut F, select: Select) -> Result<Select> {
    Ok(Select {
        from: fold.fold_quals(select.from)?,
        distinct: select.distinct,
        proj: fold_box(fold, select.proj)?,
        filter: fold_opt_box(fold, select.filter)?,
        group_by: fold_opt_box(fold, select.group_by)?,
        order_by: fold_opt_box(fold, select.order_by)?,
        having: fold_opt_box(fold, select.having)?,
    })
}
