//! The desugaring pipeline.
//!
//! Ordered reductions, each run to fixed point over the whole tree, with a
//! re-resolve in between so every phase sees fresh types and entities:
//!
//! 1. alpha-renaming (once), so substitution never captures;
//! 2. expression blocks and pattern binds;
//! 3. sugar operators (`sum`, `count`, `exists`, `in`, ...);
//! 4. anonymous generators and `into`;
//! 5. `select ... group by` (partition substitution);
//! 6. `select` without group by, into a plain comprehension.

mod blocks;
mod select;
mod sugar;
mod uniquify;

use anyhow::{bail, Result};

use crate::ast::calculus::Expr;
use crate::semantic::{self, Context};

pub use uniquify::uniquify;

pub fn desugar(expr: Expr, ctx: &mut Context) -> Result<Expr> {
    let mut expr = uniquify(expr, ctx)?;
    expr = reresolve(expr, ctx)?;

    loop {
        let mut changed = false;

        expr = run_phase(expr, ctx, &mut changed, blocks::expand)?;
        expr = run_phase(expr, ctx, &mut changed, sugar::expand)?;
        expr = run_phase(expr, ctx, &mut changed, select::name_anonymous)?;
        expr = run_phase(expr, ctx, &mut changed, select::desugar_group_by)?;
        expr = run_phase(expr, ctx, &mut changed, select::desugar_select)?;

        if !changed {
            return Ok(expr);
        }
    }
}

fn run_phase(
    expr: Expr,
    ctx: &mut Context,
    changed: &mut bool,
    phase: fn(Expr, &mut Context, &mut bool) -> Result<Expr>,
) -> Result<Expr> {
    let mut phase_changed = false;
    let expr = phase(expr, ctx, &mut phase_changed)?;
    if phase_changed {
        *changed = true;
        return reresolve(expr, ctx);
    }
    Ok(expr)
}

/// Re-runs semantic resolve after a rewriting phase. The surface tree was
/// already validated, so any error found now is a bug in the rewrite.
pub(crate) fn reresolve(expr: Expr, ctx: &mut Context) -> Result<Expr> {
    let before = ctx.errors.len();
    let expr = semantic::resolve(expr, ctx)?;
    if ctx.errors.len() > before {
        let fresh: Vec<String> = ctx.errors[before..].iter().map(|e| e.to_string()).collect();
        bail!("rewriting produced an ill-typed tree: {}", fresh.join("; "));
    }
    Ok(expr)
}

/// A fresh identifier that cannot collide with user names (which never
/// contain `$`) nor with uniquified ones (unique by id).
pub(crate) fn fresh_name(ctx: &mut Context, prefix: &str) -> String {
    let sym = ctx.fresh(prefix);
    format!("{}${}", prefix, sym.id)
}
