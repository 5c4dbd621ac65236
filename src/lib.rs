//! CALQ compiles a monoid-comprehension query calculus into a flat
//! relational algebra.
//!
//! This crate is the compiler middle-end. It takes a calculus tree plus a
//! catalog ([World]) and has four stages:
//! - [semantic::resolve] — binds identifiers, infers types (with row
//!   polymorphism, monoid subtyping and let-polymorphism), and accumulates
//!   errors;
//! - [desugar::desugar] — reduces blocks, sugar operators, `select`,
//!   `group by`, `partition` and `*` to plain comprehensions;
//! - [normalize::normalize] — inlines binds, flattens nested
//!   comprehensions and produces canonical comprehensions with CNF
//!   predicates;
//! - [unnest::unnest] — rewrites canonical comprehensions into the
//!   algebra of scans, (outer) joins, (outer) unnests, nests and reduces.

pub mod ast;
pub mod desugar;
mod error;
pub mod normalize;
pub mod semantic;
pub mod unnest;
mod utils;

#[cfg(test)]
mod tests;

pub use error::{
    downcast, Error, ErrorMessage, ErrorMessages, Kind, Result, SourceLocation, Span,
};
pub use semantic::World;

use ast::algebra::Node;
use ast::calculus::Expr;
use ast::types::Ty;
use semantic::Context;

/// The output of a successful compilation: the algebra plan and the
/// walk-resolved, nullability-annotated type of the query.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub plan: Node,
    pub ty: Ty,
}

/// Compile a calculus expression against a catalog.
///
/// Returns the algebra plan, or the accumulated errors: user errors come
/// from semantic analysis; anything a later pass trips over surfaces as an
/// internal error.
pub fn compile(expr: Expr, world: &World) -> std::result::Result<CompiledQuery, ErrorMessages> {
    let mut ctx = Context::new(world);

    let expr = match semantic::resolve(expr, &mut ctx) {
        Ok(expr) => expr,
        Err(err) => return Err(downcast(err)),
    };
    if ctx.has_errors() {
        return Err(ctx.into_messages());
    }

    let expr = match semantic::infer_nullability(expr) {
        Ok(expr) => expr,
        Err(err) => return Err(downcast(err)),
    };
    let ty = expr.ty.clone().unwrap();

    log::debug!("typed query: {expr}");

    let plan = (|| {
        let expr = desugar::desugar(expr, &mut ctx)?;
        let expr = normalize::normalize(expr, &mut ctx)?;
        log::debug!("canonical query: {expr}");
        unnest::unnest(expr, &mut ctx)
    })();

    match plan {
        Ok(plan) => Ok(CompiledQuery { plan, ty }),
        Err(err) => Err(downcast(err)),
    }
}

/// Serialize a calculus tree to JSON.
pub fn to_json(expr: &Expr) -> Result<String> {
    Ok(serde_json::to_string(expr)?)
}

/// Serialize an algebra plan to JSON.
pub fn plan_to_json(node: &Node) -> Result<String> {
    Ok(serde_json::to_string(node)?)
}
