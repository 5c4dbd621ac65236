//! Nullability propagation.
//!
//! Runs after base typing succeeds: a node's type becomes nullable when a
//! null value of an operand can make the node's own value null. The outer
//! algebra operators additionally force their right side nullable, which
//! happens during unnesting.

use anyhow::Result;

use crate::ast::calculus::fold::{self, CalculusFold};
use crate::ast::calculus::{Expr, ExprKind, Literal};

pub fn infer_nullability(expr: Expr) -> Result<Expr> {
    let mut pass = Nullability;
    pass.fold_expr(expr)
}

fn is_nullable(expr: &Expr) -> bool {
    expr.ty.as_ref().map(|t| t.nullable).unwrap_or(false)
}

struct Nullability;

impl CalculusFold for Nullability {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let mut expr = fold::fold_expr(self, expr)?;

        let nullable = match &expr.kind {
            ExprKind::Literal(Literal::Null) => true,
            ExprKind::RecordProj(base, _) => is_nullable(base),
            ExprKind::Binary(b) => is_nullable(&b.left) || is_nullable(&b.right),
            ExprKind::Unary(u) => is_nullable(&u.expr),
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => is_nullable(condition) || is_nullable(then) || is_nullable(otherwise),
            ExprKind::MergeMonoid { left, right, .. } => is_nullable(left) || is_nullable(right),
            ExprKind::In {
                element,
                collection,
            } => is_nullable(element) || is_nullable(collection),
            ExprKind::Sum(e)
            | ExprKind::Max(e)
            | ExprKind::Min(e)
            | ExprKind::Avg(e)
            | ExprKind::Count(e)
            | ExprKind::Exists(e) => is_nullable(e),
            ExprKind::FunApp { arg, .. } => is_nullable(arg),
            _ => false,
        };

        if nullable {
            if let Some(ty) = &mut expr.ty {
                ty.nullable = true;
            }
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::calculus::BinOp;
    use crate::ast::types::{Ty, TyKind};

    #[test]
    fn null_operand_poisons_binary() {
        let mut left = Expr::int(1);
        left.ty = Some(Ty::new(TyKind::Int));
        let mut right = Expr::new(ExprKind::Literal(Literal::Null));
        right.ty = Some(Ty::new(TyKind::Any));
        let mut e = Expr::binary(left, BinOp::Add, right);
        e.ty = Some(Ty::new(TyKind::Int));

        let e = infer_nullability(e).unwrap();
        assert!(e.ty.unwrap().nullable);
    }

    #[test]
    fn projection_of_nullable_base_is_nullable() {
        let mut base = Expr::ident("x");
        base.ty = Some(Ty {
            kind: TyKind::Any,
            nullable: true,
        });
        let mut e = base.proj("f");
        e.ty = Some(Ty::new(TyKind::Int));

        let e = infer_nullability(e).unwrap();
        assert!(e.ty.unwrap().nullable);
    }
}
