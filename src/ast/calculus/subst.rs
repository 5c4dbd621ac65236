//! Identifier substitution.
//!
//! Rewrites assume binders have been made globally unique (the uniquifier
//! runs before any substituting pass), so no capture checks are needed.
//! Substituted copies are detached from their node ids: the next resolve
//! assigns fresh ones.

use anyhow::Result;

use super::expr::{Expr, ExprKind};
use super::fold::{self, CalculusFold};

/// Replaces every use of `name` in `expr` by a detached copy of
/// `replacement`.
pub fn substitute(expr: Expr, name: &str, replacement: &Expr) -> Expr {
    let mut subst = Subst { name, replacement };
    subst.fold_expr(expr).unwrap()
}

struct Subst<'a> {
    name: &'a str,
    replacement: &'a Expr,
}

impl<'a> CalculusFold for Subst<'a> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        if let ExprKind::Ident(n) = &expr.kind {
            if n == self.name {
                let mut copy = self.replacement.detached();
                copy.span = copy.span.or(expr.span);
                return Ok(copy);
            }
        }
        fold::fold_expr(self, expr)
    }
}
