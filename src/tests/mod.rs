//! End-to-end compilation scenarios: calculus in, algebra out.

use insta::assert_snapshot;

use crate::ast::calculus::{
    AttrExpr, BinOp, Comp, Expr, ExprKind, Literal, Pattern, Qual, Select,
};
use crate::ast::types::{AttrType, Monoid, Ty, TyKind};
use crate::error::Span;
use crate::semantic::World;
use crate::{compile, CompiledQuery, ErrorMessages};

fn person_row() -> Ty {
    Ty::record(vec![
        AttrType::new("name", Ty::new(TyKind::String)),
        AttrType::new("age", Ty::new(TyKind::Int)),
    ])
}

fn catalog() -> World {
    let mut world = World::new();
    world.add_source("students", Ty::collection(Monoid::List, person_row()));
    world.add_source("professors", Ty::collection(Monoid::List, person_row()));
    world.add_source(
        "authors",
        Ty::collection(
            Monoid::List,
            Ty::record(vec![AttrType::new("name", Ty::new(TyKind::String))]),
        ),
    );
    world.add_source(
        "publications",
        Ty::collection(
            Monoid::List,
            Ty::record(vec![
                AttrType::new("title", Ty::new(TyKind::String)),
                AttrType::new(
                    "authors",
                    Ty::collection(Monoid::List, Ty::new(TyKind::String)),
                ),
            ]),
        ),
    );
    world.add_source(
        "set_of_things",
        Ty::collection(Monoid::Set, Ty::new(TyKind::Int)),
    );
    world
}

fn gen(name: &str, source: &str) -> Qual {
    Qual::Gen(Some(Pattern::Idn(name.to_string())), Expr::ident(source))
}

fn comp(monoid: Monoid, quals: Vec<Qual>, body: Expr) -> Expr {
    Expr::new(ExprKind::Comp(Comp {
        monoid,
        quals,
        body: Box::new(body),
    }))
}

fn string(s: &str) -> Expr {
    Expr::new(ExprKind::Literal(Literal::String(s.to_string())))
}

fn compile_ok(expr: Expr) -> CompiledQuery {
    let world = catalog();
    match compile(expr, &world) {
        Ok(out) => out,
        Err(errors) => panic!("compilation failed: {errors}"),
    }
}

fn compile_err(expr: Expr) -> ErrorMessages {
    let world = catalog();
    compile(expr, &world).unwrap_err()
}

#[test]
fn simple_filter() {
    // for (s <- students; s.age > 20) yield set s
    let q = comp(
        Monoid::Set,
        vec![
            gen("s", "students"),
            Qual::Filter(Expr::binary(
                Expr::ident("s").proj("age"),
                BinOp::Gt,
                Expr::int(20),
            )),
        ],
        Expr::ident("s"),
    );
    let out = compile_ok(q);
    assert_eq!(
        out.ty.to_string(),
        "set(record(name: string, age: int))"
    );
    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce set body=$0 pred=true
      Select pred=$0.age > 20
        Scan students
    "###);
}

#[test]
fn join_over_two_sources() {
    // for (s <- students; p <- professors; s.age = p.age)
    //   yield list (_1: s.name, _2: p.name)
    let q = comp(
        Monoid::List,
        vec![
            gen("s", "students"),
            gen("p", "professors"),
            Qual::Filter(Expr::binary(
                Expr::ident("s").proj("age"),
                BinOp::Eq,
                Expr::ident("p").proj("age"),
            )),
        ],
        Expr::new(ExprKind::RecordCons(vec![
            AttrExpr::new("_1", Expr::ident("s").proj("name")),
            AttrExpr::new("_2", Expr::ident("p").proj("name")),
        ])),
    );
    let out = compile_ok(q);
    assert_eq!(
        out.ty.to_string(),
        "list(record(_1: string, _2: string))"
    );
    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce list body=(_1: $0.name, _2: $1.name) pred=true
      Join pred=$0.age = $1.age
        Scan students
        Scan professors
    "###);
}

#[test]
fn group_by_nests() {
    // select (age: s.age, n: count(partition)) from s <- students
    // group by s.age
    let q = Expr::new(ExprKind::Select(Select {
        from: vec![gen("s", "students")],
        distinct: false,
        proj: Box::new(Expr::new(ExprKind::RecordCons(vec![
            AttrExpr::new("age", Expr::ident("s").proj("age")),
            AttrExpr::new(
                "n",
                Expr::new(ExprKind::Count(Box::new(Expr::new(ExprKind::Partition)))),
            ),
        ]))),
        filter: None,
        group_by: Some(Box::new(Expr::ident("s").proj("age"))),
        order_by: None,
        having: None,
    }));
    let out = compile_ok(q);

    // the reported type keeps the select's undetermined collection monoid
    let (monoid, row) = out.ty.kind.into_collection().unwrap();
    assert!(monoid.is_var());
    assert_eq!(row.to_string(), "record(age: int, n: int)");

    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce list body=(age: $0.age, n: $1) pred=true
      Nest sum body=1 key=$0 pred=true group=$1
        OuterJoin pred=$1.age = $0.age
          Scan students
          Scan students
    "###);
}

#[test]
fn nested_independent_comprehension() {
    // for (a <- authors;
    //      count(for (p <- publications; "X" in p.authors) yield list p) > 0)
    //   yield set a
    let inner = comp(
        Monoid::List,
        vec![
            gen("p", "publications"),
            Qual::Filter(Expr::new(ExprKind::In {
                element: Box::new(string("X")),
                collection: Box::new(Expr::ident("p").proj("authors")),
            })),
        ],
        Expr::ident("p"),
    );
    let q = comp(
        Monoid::Set,
        vec![
            gen("a", "authors"),
            Qual::Filter(Expr::binary(
                Expr::new(ExprKind::Count(Box::new(inner))),
                BinOp::Gt,
                Expr::int(0),
            )),
        ],
        Expr::ident("a"),
    );
    let out = compile_ok(q);
    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce set body=$1 pred=true
      Join pred=$0 > 0
        Reduce sum body=1 pred=$1
          Nest or body=$1 = "X" key=$0 pred=true group=$1
            OuterUnnest path=$0.authors pred=true
              Scan publications
        Scan authors
    "###);
}

#[test]
fn bad_monoid_is_a_single_error() {
    // a set has no deterministic order, so it cannot fold into a list
    let q = comp(
        Monoid::List,
        vec![gen("s", "set_of_things")],
        Expr::ident("s"),
    );
    let errors = compile_err(q);
    assert_eq!(errors.inner.len(), 1);
    assert_eq!(errors.inner[0].kind, "IncompatibleMonoids");
    assert_eq!(
        errors.inner[0].reason,
        "cannot aggregate `set(int)` with monoid `list`"
    );
}

#[test]
fn unknown_identifier_keeps_its_position() {
    let mut unknown = Expr::ident("t");
    unknown.span = Some(Span { start: 37, end: 38 });
    let q = comp(
        Monoid::Set,
        vec![gen("s", "students")],
        unknown.proj("name"),
    );
    let errors = compile_err(q);
    assert_eq!(errors.inner.len(), 1);
    assert_eq!(errors.inner[0].kind, "UnknownDecl");
    assert_eq!(errors.inner[0].span, Some(Span { start: 37, end: 38 }));
}

#[test]
fn identity_comprehension_reduces_over_scan() {
    let q = comp(Monoid::List, vec![gen("s", "students")], Expr::ident("s"));
    let out = compile_ok(q);
    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce list body=$0 pred=true
      Scan students
    "###);
}

#[test]
fn select_with_where_compiles_like_a_filter() {
    // select s.name from s <- students where s.age > 20
    let q = Expr::new(ExprKind::Select(Select {
        from: vec![gen("s", "students")],
        distinct: false,
        proj: Box::new(Expr::ident("s").proj("name")),
        filter: Some(Box::new(Expr::binary(
            Expr::ident("s").proj("age"),
            BinOp::Gt,
            Expr::int(20),
        ))),
        group_by: None,
        order_by: None,
        having: None,
    }));
    let out = compile_ok(q);
    assert_snapshot!(out.plan.to_string().trim_end(), @r###"
    Reduce list body=$0.name pred=true
      Select pred=$0.age > 20
        Scan students
    "###);
}

#[test]
fn distinct_select_is_a_set() {
    let q = Expr::new(ExprKind::Select(Select {
        from: vec![gen("s", "students")],
        distinct: true,
        proj: Box::new(Expr::ident("s").proj("age")),
        filter: None,
        group_by: None,
        order_by: None,
        having: None,
    }));
    let out = compile_ok(q);
    assert_eq!(out.ty.to_string(), "set(int)");
    assert!(out.plan.kind.as_reduce().is_some());
}

#[test]
fn plan_positions_point_at_the_source() {
    let mut q = comp(Monoid::Set, vec![gen("s", "students")], Expr::ident("s"));
    q.span = Some(Span { start: 0, end: 42 });
    let out = compile_ok(q);
    assert_eq!(out.plan.span, Some(Span { start: 0, end: 42 }));
}

#[test]
fn exists_compiles_to_an_or_reduce() {
    // for (s <- students; exists(s.name = "Ada" ? ...)) — keep it simple:
    // exists over a source inside the predicate
    let q = comp(
        Monoid::Set,
        vec![
            gen("s", "students"),
            Qual::Filter(Expr::new(ExprKind::Exists(Box::new(Expr::ident(
                "professors",
            ))))),
        ],
        Expr::ident("s"),
    );
    let out = compile_ok(q);
    // the exists subquery is hoisted into a fresh variable joined against
    // the scan of students
    let rendered = out.plan.to_string();
    assert!(rendered.contains("Reduce or"), "got:\n{rendered}");
    assert!(rendered.contains("Scan professors"), "got:\n{rendered}");
}
