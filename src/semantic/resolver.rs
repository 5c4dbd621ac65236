//! Scope resolution, entity binding and type inference.
//!
//! The resolver walks the tree once, post-order, solving each node's
//! constraints as soon as its children are typed. Failed unifications are
//! reported and recovered from (the node gets `any`), so one resolve run
//! accumulates every error it can find.

use std::collections::HashSet;

use anyhow::Result;
use itertools::Itertools;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{
    AttrExpr, BinOp, BinaryExpr, CanonComp, Comp, Expr, ExprKind, Literal, Path, Pattern, Qual,
    Select, UnOp, UnaryExpr,
};
use crate::ast::types::{
    AttrType, ConcatDef, ConcatSlot, Monoid, RecordAtts, Ty, TyKind, TypeScheme,
};
use crate::error::{Error, Kind, Span};

use super::context::{Context, Entity};
use super::literals;
use super::scope::{Lookup, Scopes};

/// Resolves and types the whole tree against the current context. The
/// returned tree carries walked types; errors are accumulated in the context.
pub fn resolve(expr: Expr, ctx: &mut Context) -> Result<Expr> {
    ctx.reset_analysis();
    let expr = {
        let mut resolver = Resolver {
            ctx: &mut *ctx,
            scopes: Scopes::default(),
        };
        resolver.resolve_expr(expr)?
    };
    let mut finalize = Finalize { ctx };
    finalize.fold_expr(expr)
}

/// The monoid a `select` aggregates with: a list when ordered, a set when
/// distinct, otherwise undetermined.
pub(crate) fn select_monoid(select: &Select, ctx: &mut Context) -> Monoid {
    if select.order_by.is_some() {
        Monoid::List
    } else if select.distinct {
        Monoid::Set
    } else {
        ctx.fresh_monoid()
    }
}

fn ty_of(expr: &Expr) -> Ty {
    expr.ty.clone().unwrap()
}

struct Resolver<'r, 'w> {
    ctx: &'r mut Context<'w>,
    scopes: Scopes,
}

impl<'r, 'w> Resolver<'r, 'w> {
    fn resolve_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        let id = match expr.id {
            Some(id) => id,
            None => {
                let id = self.ctx.ids.gen();
                expr.id = Some(id);
                id
            }
        };
        let span = expr.span;
        if let Some(span) = span {
            self.ctx.span_map.insert(id, span);
        }

        let (kind, ty) = self.resolve_kind(expr.kind, id, span)?;

        Ok(Expr {
            id: Some(id),
            kind,
            span,
            ty: Some(ty),
        })
    }

    fn resolve_kind(
        &mut self,
        kind: ExprKind,
        id: usize,
        span: Option<Span>,
    ) -> Result<(ExprKind, Ty)> {
        Ok(match kind {
            ExprKind::Literal(lit) => {
                if let Some(kind) = literals::validate(&lit) {
                    self.report(Error::new(kind).with_span(span));
                }
                let ty = match &lit {
                    // null belongs to every type
                    Literal::Null => Ty {
                        kind: TyKind::Any,
                        nullable: true,
                    },
                    Literal::Bool(_) => Ty::new(TyKind::Bool),
                    Literal::Int(_) => Ty::new(TyKind::Int),
                    Literal::Float(_) => Ty::new(TyKind::Float),
                    Literal::String(_) => Ty::new(TyKind::String),
                    Literal::Regex(_) => Ty::new(TyKind::Regex),
                    Literal::DateTime(_) => Ty::new(TyKind::DateTime),
                    Literal::Interval(_) => Ty::new(TyKind::Interval),
                };
                (ExprKind::Literal(lit), ty)
            }

            ExprKind::Ident(name) => {
                let entity = self.lookup_entity(&name, span);
                let ty = match &entity {
                    Entity::Variable { scheme, .. } => self.ctx.instantiate(scheme),
                    Entity::DataSource { ty, .. } => ty.clone(),
                    Entity::GenAttribute { attr_ty, .. }
                    | Entity::IntoAttribute { attr_ty, .. } => attr_ty.clone(),
                    _ => Ty::new(TyKind::Any),
                };
                self.ctx.entities.insert(id, entity);
                (ExprKind::Ident(name), ty)
            }

            ExprKind::RecordProj(expr, field) => {
                let expr = self.resolve_expr(*expr)?;
                let field_ty = self.ctx.fresh_ty_var();
                let open = self
                    .ctx
                    .open_record(vec![AttrType::new(&field, field_ty.clone())]);
                self.unify_or_report(&ty_of(&expr), &open, expr.span, None);
                (ExprKind::RecordProj(Box::new(expr), field), field_ty)
            }

            ExprKind::RecordCons(atts) => {
                let mut seen = HashSet::new();
                let atts: Vec<AttrExpr> = atts
                    .into_iter()
                    .map(|att| -> Result<AttrExpr> {
                        if !seen.insert(att.idn.clone()) {
                            self.report(
                                Error::new(Kind::MultipleDecl {
                                    name: att.idn.clone(),
                                })
                                .with_span(att.expr.span.or(span)),
                            );
                        }
                        Ok(AttrExpr {
                            idn: att.idn,
                            expr: self.resolve_expr(att.expr)?,
                        })
                    })
                    .try_collect()?;
                let ty = Ty::record(
                    atts.iter()
                        .map(|a| AttrType::new(&a.idn, ty_of(&a.expr)))
                        .collect(),
                );
                (ExprKind::RecordCons(atts), ty)
            }

            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.resolve_expr(*condition)?;
                self.expect_bool(&condition, "if condition");
                let then = self.resolve_expr(*then)?;
                let otherwise = self.resolve_expr(*otherwise)?;
                self.unify_or_report(&ty_of(&then), &ty_of(&otherwise), otherwise.span, then.span);
                let ty = ty_of(&then);
                (
                    ExprKind::If {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    ty,
                )
            }

            ExprKind::Binary(BinaryExpr { left, op, right }) => {
                let left = self.resolve_expr(*left)?;
                let right = self.resolve_expr(*right)?;
                let ty = self.binary_ty(&left, op, &right);
                (
                    ExprKind::Binary(BinaryExpr {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    }),
                    ty,
                )
            }

            ExprKind::Unary(UnaryExpr { op, expr }) => {
                let expr = self.resolve_expr(*expr)?;
                let ty = match op {
                    UnOp::Neg => {
                        let n = self.ctx.fresh_number();
                        self.expect(&expr, &n, "a number", None);
                        n
                    }
                    UnOp::Not => {
                        self.expect_bool(&expr, "operand of `not`");
                        Ty::new(TyKind::Bool)
                    }
                    UnOp::ToFloat => {
                        let n = self.ctx.fresh_number();
                        self.expect(&expr, &n, "a number", None);
                        Ty::new(TyKind::Float)
                    }
                    UnOp::ToSet | UnOp::ToBag | UnOp::ToList => {
                        let inner = self.ctx.fresh_ty_var();
                        let coll = Ty::collection(self.ctx.fresh_monoid(), inner.clone());
                        self.expect(&expr, &coll, "a collection", None);
                        let monoid = match op {
                            UnOp::ToSet => Monoid::Set,
                            UnOp::ToBag => Monoid::Bag,
                            _ => Monoid::List,
                        };
                        Ty::collection(monoid, inner)
                    }
                };
                (
                    ExprKind::Unary(UnaryExpr {
                        op,
                        expr: Box::new(expr),
                    }),
                    ty,
                )
            }

            ExprKind::MergeMonoid {
                monoid,
                left,
                right,
            } => {
                let left = self.resolve_expr(*left)?;
                let right = self.resolve_expr(*right)?;
                self.unify_or_report(&ty_of(&left), &ty_of(&right), right.span, left.span);
                match &monoid {
                    Monoid::Sum | Monoid::Multiply | Monoid::Max | Monoid::Min => {
                        let n = self.ctx.fresh_number();
                        self.expect(&left, &n, "a number", None);
                    }
                    Monoid::And | Monoid::Or => {
                        self.expect_bool(&left, "monoid merge");
                    }
                    m => {
                        let coll = Ty::collection(m.clone(), self.ctx.fresh_ty_var());
                        self.expect(&left, &coll, "a collection", None);
                    }
                }
                let ty = ty_of(&left);
                (
                    ExprKind::MergeMonoid {
                        monoid,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty,
                )
            }

            ExprKind::ZeroCollection(monoid) => {
                let ty = Ty::collection(monoid.clone(), self.ctx.fresh_ty_var());
                (ExprKind::ZeroCollection(monoid), ty)
            }

            ExprKind::ConsCollection(monoid, expr) => {
                let expr = self.resolve_expr(*expr)?;
                let ty = Ty::collection(monoid.clone(), ty_of(&expr));
                (ExprKind::ConsCollection(monoid, Box::new(expr)), ty)
            }

            ExprKind::MultiCons(monoid, exprs) => {
                let exprs: Vec<Expr> = exprs
                    .into_iter()
                    .map(|e| self.resolve_expr(e))
                    .try_collect()?;
                let inner = match exprs.as_slice() {
                    [] => self.ctx.fresh_ty_var(),
                    [first, rest @ ..] => {
                        for e in rest {
                            self.unify_or_report(&ty_of(first), &ty_of(e), e.span, first.span);
                        }
                        ty_of(first)
                    }
                };
                let ty = Ty::collection(monoid.clone(), inner);
                (ExprKind::MultiCons(monoid, exprs), ty)
            }

            ExprKind::Comp(comp) => {
                self.scopes.push();
                let monoid = comp.monoid.clone();
                let quals: Vec<Qual> = comp
                    .quals
                    .into_iter()
                    .map(|q| self.resolve_qual(q, &monoid))
                    .try_collect()?;
                let body = self.resolve_expr(*comp.body)?;
                self.scopes.pop();
                let ty = self.comp_ty(&monoid, &body);
                (
                    ExprKind::Comp(Comp {
                        monoid,
                        quals,
                        body: Box::new(body),
                    }),
                    ty,
                )
            }

            ExprKind::CanonComp(comp) => {
                self.scopes.push();
                let monoid = comp.monoid.clone();
                for gen in &comp.gens {
                    let src_ty = self.resolve_path(&gen.path, span);
                    let inner = self.ctx.fresh_ty_var();
                    let gen_monoid = self.ctx.fresh_monoid();
                    let coll = Ty::collection(gen_monoid.clone(), inner.clone());
                    if self.ctx.unifier.unify(&src_ty, &coll).is_err() {
                        self.report(
                            Error::new(Kind::UnexpectedType {
                                found: self.ctx.unifier.walk(&src_ty),
                                expected: "a collection".to_string(),
                                who: Some("generator".to_string()),
                            })
                            .with_span(span),
                        );
                    } else if monoid.is_collection() {
                        // keep bounding undetermined collection monoids; a
                        // canonical generator otherwise just draws rows, so
                        // primitive aggregations take their rows as given
                        // (the surface tree already passed the order check)
                        let _ = self.ctx.unifier.add_leq(&gen_monoid, &monoid);
                    }
                    self.declare_pattern(&Pattern::Idn(gen.var.clone()), &inner, span);
                }
                let pred = self.resolve_expr(*comp.pred)?;
                self.expect_bool(&pred, "comprehension predicate");
                let body = self.resolve_expr(*comp.body)?;
                self.scopes.pop();
                let ty = self.comp_ty(&monoid, &body);
                (
                    ExprKind::CanonComp(CanonComp {
                        monoid,
                        gens: comp.gens,
                        pred: Box::new(pred),
                        body: Box::new(body),
                    }),
                    ty,
                )
            }

            ExprKind::Select(select) => self.resolve_select(select, id, span)?,

            ExprKind::FunAbs { param, body } => {
                self.scopes.push();
                let param_ty = self.param_ty(&param, span);
                let body = self.resolve_expr(*body)?;
                self.scopes.pop();
                let ty = Ty::new(TyKind::Fun(Box::new(param_ty), Box::new(ty_of(&body))));
                (
                    ExprKind::FunAbs {
                        param,
                        body: Box::new(body),
                    },
                    ty,
                )
            }

            ExprKind::FunApp { func, arg } => {
                let func = self.resolve_expr(*func)?;
                let arg = self.resolve_expr(*arg)?;

                let expected = self.ctx.fresh_ty_var();
                let out = self.ctx.fresh_ty_var();
                let fun_ty = Ty::new(TyKind::Fun(
                    Box::new(expected.clone()),
                    Box::new(out.clone()),
                ));
                if self.ctx.unifier.unify(&ty_of(&func), &fun_ty).is_err() {
                    self.report(
                        Error::new(Kind::UnexpectedType {
                            found: self.ctx.unifier.walk(&ty_of(&func)),
                            expected: "a function".to_string(),
                            who: None,
                        })
                        .with_span(func.span.or(span)),
                    );
                } else {
                    self.apply_argument(&arg, &expected);
                }
                (
                    ExprKind::FunApp {
                        func: Box::new(func),
                        arg: Box::new(arg),
                    },
                    out,
                )
            }

            ExprKind::ExpBlock { binds, body } => {
                self.scopes.push();
                let binds: Vec<(Pattern, Expr)> = binds
                    .into_iter()
                    .map(|(p, e)| -> Result<(Pattern, Expr)> {
                        let e = self.resolve_bind(&p, e, span)?;
                        Ok((p, e))
                    })
                    .try_collect()?;
                let body = self.resolve_expr(*body)?;
                self.scopes.pop();
                let ty = ty_of(&body);
                (
                    ExprKind::ExpBlock {
                        binds,
                        body: Box::new(body),
                    },
                    ty,
                )
            }

            ExprKind::Partition => match self.scopes.partition_entity().cloned() {
                Some(entity) => {
                    let ty = entity.as_partition().unwrap().1.clone();
                    self.ctx.entities.insert(id, entity);
                    (ExprKind::Partition, ty)
                }
                None => {
                    self.report(Error::new(Kind::UnknownPartition).with_span(span));
                    (ExprKind::Partition, Ty::new(TyKind::Any))
                }
            },

            ExprKind::Star => match self.scopes.star_entity().cloned() {
                Some(entity) => {
                    let ty = entity.as_star().unwrap().1.clone();
                    self.ctx.entities.insert(id, entity);
                    (ExprKind::Star, ty)
                }
                None => {
                    self.report(Error::new(Kind::UnknownStar).with_span(span));
                    (ExprKind::Star, Ty::new(TyKind::Any))
                }
            },

            ExprKind::Into { left, right } => {
                let left = self.resolve_expr(*left)?;
                self.scopes.push();
                match self.record_fields(&ty_of(&left)) {
                    Some(fields) => {
                        for field in &fields {
                            self.scopes.declare_alias(
                                &field.idn,
                                Entity::IntoAttribute {
                                    attr: field.idn.clone(),
                                    attr_ty: field.ty.clone(),
                                    into_id: id,
                                },
                            );
                        }
                    }
                    None => {
                        self.report(
                            Error::new(Kind::UnexpectedType {
                                found: self.ctx.unifier.walk(&ty_of(&left)),
                                expected: "a record".to_string(),
                                who: Some("`into`".to_string()),
                            })
                            .with_span(left.span.or(span)),
                        );
                    }
                }
                let right = self.resolve_expr(*right)?;
                self.scopes.pop();
                let ty = ty_of(&right);
                (
                    ExprKind::Into {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty,
                )
            }

            ExprKind::Sum(e) => self.resolve_aggregation(*e, SugarAgg::Sum, span)?,
            ExprKind::Max(e) => self.resolve_aggregation(*e, SugarAgg::Max, span)?,
            ExprKind::Min(e) => self.resolve_aggregation(*e, SugarAgg::Min, span)?,
            ExprKind::Avg(e) => self.resolve_aggregation(*e, SugarAgg::Avg, span)?,
            ExprKind::Count(e) => self.resolve_aggregation(*e, SugarAgg::Count, span)?,

            ExprKind::Exists(e) => {
                let e = self.resolve_expr(*e)?;
                let coll = Ty::collection(self.ctx.fresh_monoid(), self.ctx.fresh_ty_var());
                self.expect(&e, &coll, "a collection", Some("exists"));
                (ExprKind::Exists(Box::new(e)), Ty::new(TyKind::Bool))
            }

            ExprKind::In {
                element,
                collection,
            } => {
                let element = self.resolve_expr(*element)?;
                let collection = self.resolve_expr(*collection)?;
                let inner = self.ctx.fresh_ty_var();
                let coll = Ty::collection(self.ctx.fresh_monoid(), inner.clone());
                self.expect(&collection, &coll, "a collection", Some("in"));
                self.unify_or_report(&ty_of(&element), &inner, element.span, collection.span);
                (
                    ExprKind::In {
                        element: Box::new(element),
                        collection: Box::new(collection),
                    },
                    Ty::new(TyKind::Bool),
                )
            }
        })
    }

    fn resolve_select(
        &mut self,
        select: Select,
        id: usize,
        span: Option<Span>,
    ) -> Result<(ExprKind, Ty)> {
        self.scopes.push();

        let monoid = select_monoid(&select, self.ctx);

        let from: Vec<Qual> = select
            .from
            .into_iter()
            .map(|q| match q {
                Qual::Gen(..) => self.resolve_qual(q, &monoid),
                _ => Err(Error::internal("select from clause must be generators").into()),
            })
            .try_collect()?;

        let filter = match select.filter {
            Some(f) => {
                let f = self.resolve_expr(*f)?;
                self.expect_bool(&f, "where clause");
                Some(Box::new(f))
            }
            None => None,
        };

        let group_by = match select.group_by {
            Some(g) => Some(Box::new(self.resolve_expr(*g)?)),
            None => None,
        };

        let order_by = match select.order_by {
            Some(o) => Some(Box::new(self.resolve_expr(*o)?)),
            None => None,
        };

        // partition is defined only under a group by; * on every projection
        let partition_entity = group_by.as_ref().map(|_| Entity::Partition {
            select_id: id,
            ty: self.select_partition_ty(&from),
        });
        let star_entity = Entity::Star {
            select_id: id,
            ty: self.select_star_ty(&from, group_by.is_some()),
        };
        self.scopes.push_partition(partition_entity);
        self.scopes.push_star(Some(star_entity));

        let proj = self.resolve_expr(*select.proj)?;
        let having = match select.having {
            Some(h) => {
                let h = self.resolve_expr(*h)?;
                self.expect_bool(&h, "having clause");
                Some(Box::new(h))
            }
            None => None,
        };

        self.scopes.pop_partition();
        self.scopes.pop_star();
        self.scopes.pop();

        if group_by.is_none() && !matches!(proj.kind, ExprKind::Star) && contains_star(&proj) {
            self.report(Error::new(Kind::IllegalStar).with_span(proj.span.or(span)));
        }

        let ty = Ty::collection(monoid, ty_of(&proj));
        Ok((
            ExprKind::Select(Select {
                from,
                distinct: select.distinct,
                proj: Box::new(proj),
                filter,
                group_by,
                order_by,
                having,
            }),
            ty,
        ))
    }

    fn resolve_qual(&mut self, qual: Qual, comp_monoid: &Monoid) -> Result<Qual> {
        Ok(match qual {
            Qual::Gen(pattern, src) => {
                let src = self.resolve_expr(src)?;
                let inner = self.ctx.fresh_ty_var();
                let gen_monoid = self.ctx.fresh_monoid();
                let coll = Ty::collection(gen_monoid.clone(), inner.clone());
                if self.ctx.unifier.unify(&ty_of(&src), &coll).is_err() {
                    self.report(
                        Error::new(Kind::UnexpectedType {
                            found: self.ctx.unifier.walk(&ty_of(&src)),
                            expected: "a collection".to_string(),
                            who: Some("generator".to_string()),
                        })
                        .with_span(src.span),
                    );
                } else {
                    self.check_generator_monoid(&gen_monoid, comp_monoid, &ty_of(&src), src.span);
                }
                match &pattern {
                    Some(p) => self.declare_pattern(p, &inner, src.span),
                    None => self.inject_alias(&src, &inner),
                }
                Qual::Gen(pattern, src)
            }
            Qual::Bind(pattern, e) => {
                let span = e.span;
                let e = self.resolve_bind(&pattern, e, span)?;
                Qual::Bind(pattern, e)
            }
            Qual::Filter(e) => {
                let e = self.resolve_expr(e)?;
                self.expect_bool(&e, "filter predicate");
                Qual::Filter(e)
            }
        })
    }

    /// Resolves a bind's value and declares the pattern; identifier binds
    /// are generalized over the variables fresh to the bind.
    fn resolve_bind(&mut self, pattern: &Pattern, e: Expr, span: Option<Span>) -> Result<Expr> {
        let watermark = self.ctx.watermark();
        let e = self.resolve_expr(e)?;
        match pattern {
            Pattern::Idn(name) => {
                let scheme = self.ctx.generalize(&ty_of(&e), watermark);
                let sym = self.ctx.name_symbol(name);
                let entity = Entity::Variable { idn: sym, scheme };
                if !self.scopes.declare(name, entity) {
                    self.report(
                        Error::new(Kind::MultipleDecl { name: name.clone() }).with_span(span),
                    );
                }
            }
            Pattern::Prod(_) => self.declare_pattern(pattern, &ty_of(&e), span),
        }
        Ok(e)
    }

    /// Reports a generator whose source monoid cannot feed the enclosing
    /// comprehension's monoid.
    fn check_generator_monoid(
        &mut self,
        gen_monoid: &Monoid,
        comp_monoid: &Monoid,
        src_ty: &Ty,
        span: Option<Span>,
    ) {
        if self.ctx.unifier.add_leq(gen_monoid, comp_monoid).is_err() {
            let monoid = self.ctx.unifier.monoid_find(comp_monoid);
            self.report(
                Error::new(Kind::IncompatibleMonoids {
                    monoid,
                    source: self.ctx.unifier.walk(src_ty),
                })
                .with_span(span),
            );
        }
    }

    fn comp_ty(&mut self, monoid: &Monoid, body: &Expr) -> Ty {
        match monoid {
            Monoid::Sum | Monoid::Multiply | Monoid::Max | Monoid::Min => {
                let n = self.ctx.fresh_number();
                self.expect(body, &n, "a number", Some("aggregation body"));
                n
            }
            Monoid::And | Monoid::Or => {
                self.expect_bool(body, "aggregation body");
                Ty::new(TyKind::Bool)
            }
            m => Ty::collection(m.clone(), ty_of(body)),
        }
    }

    /// Binds a pattern against a type. Products constrain the type to a
    /// record with positional `_k` attributes.
    fn declare_pattern(&mut self, pattern: &Pattern, ty: &Ty, span: Option<Span>) {
        match pattern {
            Pattern::Idn(name) => {
                let sym = self.ctx.name_symbol(name);
                let entity = Entity::Variable {
                    idn: sym,
                    scheme: TypeScheme::monomorphic(ty.clone()),
                };
                if !self.scopes.declare(name, entity) {
                    self.report(
                        Error::new(Kind::MultipleDecl { name: name.clone() }).with_span(span),
                    );
                }
            }
            Pattern::Prod(ps) => {
                let taus: Vec<Ty> = ps.iter().map(|_| self.ctx.fresh_ty_var()).collect();
                let atts = taus
                    .iter()
                    .enumerate()
                    .map(|(k, t)| AttrType::new(format!("_{}", k + 1), t.clone()))
                    .collect();
                let open = self.ctx.open_record(atts);
                if self.ctx.unifier.unify(ty, &open).is_err() {
                    self.report(
                        Error::new(Kind::PatternMismatch {
                            pattern: pattern.to_string(),
                            ty: self.ctx.unifier.walk(ty),
                        })
                        .with_span(span),
                    );
                }
                for (sub, tau) in ps.iter().zip(taus) {
                    self.declare_pattern(sub, &tau, span);
                }
            }
        }
    }

    /// Injects the fields of an anonymous generator's row type as aliases.
    fn inject_alias(&mut self, src: &Expr, inner: &Ty) {
        let Some(fields) = self.record_fields(inner) else {
            return;
        };
        let gen_id = src.id.unwrap();
        for (index, field) in fields.iter().enumerate() {
            self.scopes.declare_alias(
                &field.idn,
                Entity::GenAttribute {
                    attr: field.idn.clone(),
                    attr_ty: field.ty.clone(),
                    gen_id,
                    index,
                },
            );
        }
    }

    /// The known fields of a record type, expanding user types.
    fn record_fields(&self, ty: &Ty) -> Option<Vec<AttrType>> {
        let walked = self.ctx.unifier.walk(ty);
        let kind = match &walked.kind {
            TyKind::User(sym) => &self.ctx.world.tipes.get(sym)?.kind,
            kind => kind,
        };
        match kind {
            TyKind::Record(RecordAtts::Fixed(atts)) => Some(atts.clone()),
            TyKind::Record(RecordAtts::Open { atts, .. }) => Some(atts.clone()),
            _ => None,
        }
    }

    fn param_ty(&mut self, pattern: &Pattern, span: Option<Span>) -> Ty {
        match pattern {
            Pattern::Idn(_) => {
                let tau = self.ctx.fresh_ty_var();
                self.declare_pattern(pattern, &tau, span);
                tau
            }
            Pattern::Prod(ps) => {
                let tys = ps.iter().map(|p| self.param_ty(p, span)).collect();
                Ty::new(TyKind::Pattern(tys))
            }
        }
    }

    /// Unifies an argument against a parameter type, adjusting records to
    /// patterns when the parameter destructures a tuple.
    fn apply_argument(&mut self, arg: &Expr, expected: &Ty) {
        let expected_w = self.ctx.unifier.walk(expected);
        let arg_ty = ty_of(arg);
        let arg_w = self.ctx.unifier.walk(&arg_ty);

        if let (TyKind::Pattern(params), TyKind::Record(RecordAtts::Fixed(atts))) =
            (&expected_w.kind, &arg_w.kind)
        {
            if params.len() == atts.len() {
                for (param, att) in params.iter().zip(atts) {
                    self.unify_or_report(&att.ty, param, arg.span, None);
                }
                return;
            }
        }
        self.unify_or_report(&arg_ty, expected, arg.span, None);
    }

    fn resolve_path(&mut self, path: &Path, span: Option<Span>) -> Ty {
        match path {
            Path::Variable(name) => {
                let entity = self.lookup_entity(name, span);
                match &entity {
                    Entity::Variable { scheme, .. } => self.ctx.instantiate(scheme),
                    Entity::DataSource { ty, .. } => ty.clone(),
                    _ => Ty::new(TyKind::Any),
                }
            }
            Path::Inner(prefix, field) => {
                let prefix_ty = self.resolve_path(prefix, span);
                let field_ty = self.ctx.fresh_ty_var();
                let open = self
                    .ctx
                    .open_record(vec![AttrType::new(field, field_ty.clone())]);
                self.unify_or_report(&prefix_ty, &open, span, None);
                field_ty
            }
        }
    }

    fn select_partition_ty(&mut self, from: &[Qual]) -> Ty {
        let gens: Vec<_> = from.iter().map(|q| self.gen_name_and_inner(q)).collect();
        let inner = match gens.as_slice() {
            [(_, inner)] => inner.clone(),
            _ => Ty::record(
                gens.iter()
                    .enumerate()
                    .map(|(k, (name, inner))| {
                        let idn = name.clone().unwrap_or_else(|| format!("_{}", k + 1));
                        AttrType::new(idn, inner.clone())
                    })
                    .collect(),
            ),
        };
        Ty::collection(Monoid::Bag, inner)
    }

    fn select_star_ty(&mut self, from: &[Qual], grouped: bool) -> Ty {
        let gens: Vec<_> = from.iter().map(|q| self.gen_name_and_inner(q)).collect();
        let row = match gens.as_slice() {
            [(_, inner)] => inner.clone(),
            _ => {
                let sym = self.ctx.fresh("c");
                let mut used = HashSet::new();
                let slots = gens
                    .iter()
                    .enumerate()
                    .map(|(k, (name, inner))| {
                        let prefix = name.as_ref().map(|n| {
                            if used.insert(n.clone()) {
                                n.clone()
                            } else {
                                format!("{}_{}", n, k + 1)
                            }
                        });
                        ConcatSlot {
                            prefix,
                            ty: inner.clone(),
                        }
                    })
                    .collect();
                self.ctx.unifier.set_concat_def(
                    sym.clone(),
                    ConcatDef {
                        slots,
                        atts: Vec::new(),
                    },
                );
                Ty::new(TyKind::Record(RecordAtts::Concat(sym)))
            }
        };
        if grouped {
            Ty::collection(Monoid::Bag, row)
        } else {
            row
        }
    }

    /// A resolved generator's pattern name (if simple) and row type.
    fn gen_name_and_inner(&mut self, qual: &Qual) -> (Option<String>, Ty) {
        let (pattern, src) = qual.as_gen().unwrap();
        let name = match pattern {
            Some(Pattern::Idn(name)) => Some(name.clone()),
            _ => None,
        };
        let inner = match self.ctx.unifier.walk(&ty_of(src)).kind {
            TyKind::Collection(_, inner) => *inner,
            _ => Ty::new(TyKind::Any),
        };
        (name, inner)
    }

    fn lookup_entity(&mut self, name: &str, span: Option<Span>) -> Entity {
        match self.scopes.lookup(name) {
            Lookup::Found(entity) => entity,
            Lookup::Ambiguous => {
                self.report(
                    Error::new(Kind::AmbiguousIdn {
                        name: name.to_string(),
                    })
                    .with_span(span),
                );
                Entity::Unknown
            }
            Lookup::NotFound => match self.ctx.world.sources.get(name) {
                Some(ty) => {
                    log::trace!("resolved `{name}` to a catalog source");
                    Entity::DataSource {
                        name: name.to_string(),
                        ty: ty.clone(),
                    }
                }
                None => {
                    self.report(
                        Error::new(Kind::UnknownDecl {
                            name: name.to_string(),
                        })
                        .with_span(span),
                    );
                    Entity::Unknown
                }
            },
        }
    }

    fn resolve_aggregation(
        &mut self,
        e: Expr,
        agg: SugarAgg,
        span: Option<Span>,
    ) -> Result<(ExprKind, Ty)> {
        let e = self.resolve_expr(e)?;
        let inner = self.ctx.fresh_ty_var();
        let coll = Ty::collection(self.ctx.fresh_monoid(), inner.clone());
        self.expect(&e, &coll, "a collection", Some(agg.name()));

        let ty = match agg {
            SugarAgg::Count => Ty::new(TyKind::Int),
            SugarAgg::Avg => {
                let n = self.ctx.fresh_number();
                self.unify_or_report(&inner, &n, e.span.or(span), None);
                Ty::new(TyKind::Float)
            }
            _ => {
                let n = self.ctx.fresh_number();
                self.unify_or_report(&inner, &n, e.span.or(span), None);
                inner
            }
        };
        let boxed = Box::new(e);
        let kind = match agg {
            SugarAgg::Sum => ExprKind::Sum(boxed),
            SugarAgg::Max => ExprKind::Max(boxed),
            SugarAgg::Min => ExprKind::Min(boxed),
            SugarAgg::Avg => ExprKind::Avg(boxed),
            SugarAgg::Count => ExprKind::Count(boxed),
        };
        Ok((kind, ty))
    }

    fn binary_ty(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Ty {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div | Mod => {
                self.unify_or_report(&ty_of(left), &ty_of(right), right.span, left.span);
                let n = self.ctx.fresh_number();
                self.expect(left, &n, "a number", Some(&op.to_string()));
                n
            }
            Eq | Ne => {
                self.unify_or_report(&ty_of(left), &ty_of(right), right.span, left.span);
                Ty::new(TyKind::Bool)
            }
            Gt | Lt | Ge | Le => {
                self.unify_or_report(&ty_of(left), &ty_of(right), right.span, left.span);
                let p = self.ctx.fresh_primitive();
                self.expect(left, &p, "a comparable value", Some(&op.to_string()));
                Ty::new(TyKind::Bool)
            }
            And | Or => {
                self.expect_bool(left, "boolean operator");
                self.expect_bool(right, "boolean operator");
                Ty::new(TyKind::Bool)
            }
        }
    }

    fn unify_or_report(
        &mut self,
        t1: &Ty,
        t2: &Ty,
        span: Option<Span>,
        span2: Option<Span>,
    ) -> bool {
        match self.ctx.unifier.unify(t1, t2) {
            Ok(()) => true,
            Err(err) => {
                self.report(err.with_span(span).with_span2(span2));
                false
            }
        }
    }

    /// Unifies an expression's type against `expected`, reporting an
    /// [Kind::UnexpectedType] with a description on failure.
    fn expect(&mut self, expr: &Expr, expected: &Ty, desc: &str, who: Option<&str>) -> bool {
        if self.ctx.unifier.unify(&ty_of(expr), expected).is_err() {
            self.report(
                Error::new(Kind::UnexpectedType {
                    found: self.ctx.unifier.walk(&ty_of(expr)),
                    expected: desc.to_string(),
                    who: who.map(|w| w.to_string()),
                })
                .with_span(expr.span),
            );
            false
        } else {
            true
        }
    }

    fn expect_bool(&mut self, expr: &Expr, who: &str) -> bool {
        self.expect(expr, &Ty::new(TyKind::Bool), "a boolean", Some(who))
    }

    fn report(&mut self, error: Error) {
        self.ctx.report(error);
    }
}

enum SugarAgg {
    Sum,
    Max,
    Min,
    Avg,
    Count,
}

impl SugarAgg {
    fn name(&self) -> &'static str {
        match self {
            SugarAgg::Sum => "sum",
            SugarAgg::Max => "max",
            SugarAgg::Min => "min",
            SugarAgg::Avg => "avg",
            SugarAgg::Count => "count",
        }
    }
}

/// Whether `*` occurs in this expression, not counting nested selects
/// (which introduce their own star scope).
fn contains_star(expr: &Expr) -> bool {
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

/// Replaces every node's type annotation by its walked form, so annotations
/// survive the next `reset_analysis`.
struct Finalize<'a, 'w> {
    ctx: &'a Context<'w>,
}

impl<'a, 'w> CalculusFold for Finalize<'a, 'w> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let mut expr = fold::fold_expr(self, expr)?;
        expr.ty = expr.ty.take().map(|t| self.ctx.unifier.walk(&t));
        Ok(expr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::Symbol;
    use crate::semantic::World;

    fn students_world() -> World {
        let mut world = World::new();
        world.add_source(
            "students",
            Ty::collection(
                Monoid::Set,
                Ty::record(vec![
                    AttrType::new("name", Ty::new(TyKind::String)),
                    AttrType::new("age", Ty::new(TyKind::Int)),
                ]),
            ),
        );
        world
    }

    fn resolve_ok<'w>(expr: Expr, ctx: &mut Context<'w>) -> Expr {
        let expr = resolve(expr, ctx).unwrap();
        assert!(ctx.errors.is_empty(), "unexpected errors: {:?}", ctx.errors);
        expr
    }

    fn filter_comp() -> Expr {
        Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Set,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("s".to_string())), Expr::ident("students")),
                Qual::Filter(Expr::binary(
                    Expr::ident("s").proj("age"),
                    BinOp::Gt,
                    Expr::int(20),
                )),
            ],
            body: Box::new(Expr::ident("s").proj("age")),
        }))
    }

    #[test]
    fn comp_over_source_is_typed() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = resolve_ok(filter_comp(), &mut ctx);
        assert_eq!(
            expr.ty.unwrap().to_string(),
            "set(int)",
        );
    }

    #[test]
    fn unknown_identifier_is_reported_once() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Set,
            quals: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            body: Box::new(Expr::ident("t").proj("name")),
        }));
        resolve(expr, &mut ctx).unwrap();
        assert_eq!(ctx.errors.len(), 1);
        assert!(matches!(
            ctx.errors[0].kind,
            Kind::UnknownDecl { ref name } if name == "t"
        ));
    }

    #[test]
    fn generator_monoid_must_be_leq_comp_monoid() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        // a set cannot be folded into a list deterministically
        let expr = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::List,
            quals: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            body: Box::new(Expr::ident("s")),
        }));
        resolve(expr, &mut ctx).unwrap();
        assert_eq!(ctx.errors.len(), 1);
        assert!(matches!(
            ctx.errors[0].kind,
            Kind::IncompatibleMonoids {
                monoid: Monoid::List,
                ..
            }
        ));
    }

    #[test]
    fn shadowing_reports_multiple_decl() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![
                Qual::Gen(Some(Pattern::Idn("s".to_string())), Expr::ident("students")),
                Qual::Gen(Some(Pattern::Idn("s".to_string())), Expr::ident("students")),
            ],
            body: Box::new(Expr::ident("s")),
        }));
        resolve(expr, &mut ctx).unwrap();
        assert!(ctx
            .errors
            .iter()
            .any(|e| matches!(e.kind, Kind::MultipleDecl { .. })));
    }

    #[test]
    fn record_projection_through_user_type() {
        let mut world = World::new();
        let student = Symbol::new("student", 1);
        world.add_tipe(
            student.clone(),
            Ty::record(vec![AttrType::new("age", Ty::new(TyKind::Int))]),
        );
        world.add_source(
            "students",
            Ty::collection(Monoid::Bag, Ty::new(TyKind::User(student))),
        );
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Comp(Comp {
            monoid: Monoid::Bag,
            quals: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            body: Box::new(Expr::ident("s").proj("age")),
        }));
        let expr = resolve_ok(expr, &mut ctx);
        assert_eq!(expr.ty.unwrap().to_string(), "bag(int)");
    }

    #[test]
    fn let_polymorphic_bind_instantiates_per_use() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        // { id := \x -> x; (a: id(1), b: id("s")) }
        let expr = Expr::new(ExprKind::ExpBlock {
            binds: vec![(
                Pattern::Idn("id".to_string()),
                Expr::new(ExprKind::FunAbs {
                    param: Pattern::Idn("x".to_string()),
                    body: Box::new(Expr::ident("x")),
                }),
            )],
            body: Box::new(Expr::new(ExprKind::RecordCons(vec![
                AttrExpr::new(
                    "a",
                    Expr::new(ExprKind::FunApp {
                        func: Box::new(Expr::ident("id")),
                        arg: Box::new(Expr::int(1)),
                    }),
                ),
                AttrExpr::new(
                    "b",
                    Expr::new(ExprKind::FunApp {
                        func: Box::new(Expr::ident("id")),
                        arg: Box::new(Expr::new(ExprKind::Literal(Literal::String(
                            "s".to_string(),
                        )))),
                    }),
                ),
            ]))),
        });
        let expr = resolve_ok(expr, &mut ctx);
        assert_eq!(expr.ty.unwrap().to_string(), "record(a: int, b: string)");
    }

    #[test]
    fn select_star_single_generator() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Select(Select {
            from: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            distinct: false,
            proj: Box::new(Expr::new(ExprKind::Star)),
            filter: None,
            group_by: None,
            order_by: None,
            having: None,
        }));
        let expr = resolve_ok(expr, &mut ctx);
        let ty = expr.ty.unwrap();
        let (_, inner) = ty.kind.into_collection().unwrap();
        assert_eq!(inner.to_string(), "record(name: string, age: int)");
    }

    #[test]
    fn star_with_other_projections_is_illegal_without_group_by() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Select(Select {
            from: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            distinct: false,
            proj: Box::new(Expr::new(ExprKind::RecordCons(vec![
                AttrExpr::new("all", Expr::new(ExprKind::Star)),
                AttrExpr::new("age", Expr::ident("s").proj("age")),
            ]))),
            filter: None,
            group_by: None,
            order_by: None,
            having: None,
        }));
        resolve(expr, &mut ctx).unwrap();
        assert!(ctx
            .errors
            .iter()
            .any(|e| matches!(e.kind, Kind::IllegalStar)));
    }

    #[test]
    fn partition_outside_group_by_is_unknown() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        let expr = Expr::new(ExprKind::Select(Select {
            from: vec![Qual::Gen(
                Some(Pattern::Idn("s".to_string())),
                Expr::ident("students"),
            )],
            distinct: false,
            proj: Box::new(Expr::new(ExprKind::Partition)),
            filter: None,
            group_by: None,
            order_by: None,
            having: None,
        }));
        resolve(expr, &mut ctx).unwrap();
        assert!(ctx
            .errors
            .iter()
            .any(|e| matches!(e.kind, Kind::UnknownPartition)));
    }

    #[test]
    fn colliding_injected_fields_are_ambiguous() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        // two anonymous generators over the same source: every field name
        // is injected twice
        let expr = Expr::new(ExprKind::Select(Select {
            from: vec![
                Qual::Gen(None, Expr::ident("students")),
                Qual::Gen(None, Expr::ident("students")),
            ],
            distinct: false,
            proj: Box::new(Expr::ident("age")),
            filter: None,
            group_by: None,
            order_by: None,
            having: None,
        }));
        resolve(expr, &mut ctx).unwrap();
        assert!(ctx
            .errors
            .iter()
            .any(|e| matches!(e.kind, Kind::AmbiguousIdn { ref name } if name == "age")));
    }

    #[test]
    fn anonymous_generator_injects_fields() {
        let world = students_world();
        let mut ctx = Context::new(&world);
        // select age from students (no pattern: fields come into scope)
        let expr = Expr::new(ExprKind::Select(Select {
            from: vec![Qual::Gen(None, Expr::ident("students"))],
            distinct: false,
            proj: Box::new(Expr::ident("age")),
            filter: None,
            group_by: None,
            order_by: None,
            having: None,
        }));
        let expr = resolve_ok(expr, &mut ctx);
        let ty = expr.ty.unwrap();
        let (_, inner) = ty.kind.into_collection().unwrap();
        assert_eq!(inner.kind, TyKind::Int);
    }
}
