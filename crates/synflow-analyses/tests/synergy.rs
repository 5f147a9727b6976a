use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use synflow_analyses::{
    builtin_registry, ConstValue, ConstantPropagation, IntervalAnalysis, IntervalValue, PointsTo,
    PointsToAnalysis, PointsToValue, Range,
};
use synflow_core::analysis::{AnalysisSequence, AnalysisSet, Flat, Host, HostConfig};
use synflow_core::{
    BinaryOp, EdgeLabel, Expr, FunctionBuilder, Literal, NodeId, TranslationUnit, Type,
    UnitBuilder,
};

fn unit_of(name: &str, f: FunctionBuilder) -> Arc<TranslationUnit> {
    let mut unit = UnitBuilder::new(name);
    unit.function(f).unwrap();
    Arc::new(unit.build())
}

fn run(unit: Arc<TranslationUnit>, set: &AnalysisSet, config: HostConfig) -> Host {
    let mut host = Host::new(unit, "main", set, &builtin_registry(), config).unwrap();
    host.analyze().unwrap();
    host
}

fn targets(names: &[&str]) -> PointsTo {
    PointsTo::Set(names.iter().map(|n| n.to_string()).collect::<BTreeSet<_>>())
}

/// `a = 20; b = a % 2; return b;`
#[test]
fn test_interval_folds_remainder() {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int()).local("b", Type::int());
    f.assign(f.var("a"), Expr::int(20));
    f.assign(
        f.var("b"),
        Expr::binary(BinaryOp::Mod, f.var("a"), Expr::int(2)),
    );
    let ret = f.ret(Some(f.var("b")));

    let host = run(
        unit_of("rem", f),
        &AnalysisSet::new(IntervalAnalysis::NAME),
        HostConfig::default(),
    );
    let ranges = host.results::<IntervalValue>(IntervalAnalysis::NAME).unwrap();
    let before_ret = ranges.in_at(ret).unwrap();
    assert_eq!(before_ret.get("main:a"), Range::exact(20));
    assert_eq!(before_ret.get("main:b"), Range::exact(0));
}

/// `if (c) p = &a; else p = &b; x = *p;`
fn diamond(c: Option<i64>) -> (Arc<TranslationUnit>, NodeId, NodeId, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int())
        .local("b", Type::int())
        .local("c", Type::int())
        .local("x", Type::int())
        .local("p", Type::ptr_to(Type::int()));
    if let Some(c) = c {
        f.assign(f.var("c"), Expr::int(c));
    }
    let cond = f.branch(f.var("c"), "then", "else");
    let then = f.label("then").unwrap();
    f.assign(f.var("p"), Expr::addr_of("main:a"));
    f.goto("end");
    f.label("else").unwrap();
    f.assign(f.var("p"), Expr::addr_of("main:b"));
    f.label("end").unwrap();
    let load = f.assign(f.var("x"), Expr::deref("main:p"));
    f.ret(Some(f.var("x")));
    (unit_of("diamond", f), cond, then, load)
}

#[test]
fn test_points_to_merges_branches() {
    let (unit, _, _, load) = diamond(None);
    let host = run(
        unit,
        &AnalysisSet::new(PointsToAnalysis::NAME),
        HostConfig::default(),
    );
    let pointers = host.results::<PointsToValue>("pointsto").unwrap();
    assert_eq!(
        pointers.in_at(load).unwrap().get("main:p"),
        targets(&["main:a", "main:b"])
    );
}

#[test]
fn test_constant_branch_prunes_points_to() {
    let (unit, cond, then, load) = diamond(Some(0));
    let set = AnalysisSet::new("pointsto").with(ConstantPropagation::NAME);
    let host = run(unit, &set, HostConfig::default());

    let pointers = host.results::<PointsToValue>("pointsto").unwrap();
    assert_eq!(pointers.in_at(load).unwrap().get("main:p"), targets(&["main:b"]));
    assert!(!host.is_edge_live(cond, then, EdgeLabel::True));
    assert!(host.stats().sim_queries > 0);
}

/// `a = 5; p = &a; x = *p; return x;`
fn load_program() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int())
        .local("x", Type::int())
        .local("p", Type::ptr_to(Type::int()));
    f.assign(f.var("a"), Expr::int(5));
    f.assign(f.var("p"), Expr::addr_of("main:a"));
    f.assign(f.var("x"), Expr::deref("main:p"));
    let ret = f.ret(Some(f.var("x")));
    (unit_of("load", f), ret)
}

#[test]
fn test_constants_read_through_pointers() {
    let (unit, ret) = load_program();
    let set = AnalysisSet::new(ConstantPropagation::NAME).with("pointsto");
    let host = run(unit, &set, HostConfig::default());

    let consts = host.results::<ConstValue>(ConstantPropagation::NAME).unwrap();
    assert_eq!(
        consts.in_at(ret).unwrap().get("main:x"),
        Flat::Value(Literal::Int(5))
    );
    assert_eq!(
        host.get_expr_dfv::<ConstantPropagation>(
            ConstantPropagation::NAME,
            ret,
            &Expr::binary(BinaryOp::Add, Expr::var("main:x"), Expr::int(1)),
        )
        .unwrap(),
        Some(Flat::Value(Literal::Int(6)))
    );
}

#[test]
fn test_cascaded_points_to_feeds_constants() {
    let (unit, ret) = load_program();
    let set = AnalysisSet::new(ConstantPropagation::NAME)
        .with("pointsto")
        .with_sequence(AnalysisSequence::cascaded([
            vec!["pointsto"],
            vec![ConstantPropagation::NAME],
        ]));
    let host = run(unit, &set, HostConfig::default());

    let consts = host.results::<ConstValue>(ConstantPropagation::NAME).unwrap();
    assert_eq!(
        consts.in_at(ret).unwrap().get("main:x"),
        Flat::Value(Literal::Int(5))
    );
}

#[test]
fn test_disabled_sims_fall_back_to_bottom() {
    let (unit, ret) = load_program();
    let set = AnalysisSet::new(ConstantPropagation::NAME).with("pointsto");
    let config = HostConfig {
        disable_sims: true,
        ..HostConfig::default()
    };
    let host = run(unit, &set, config);

    let consts = host.results::<ConstValue>(ConstantPropagation::NAME).unwrap();
    assert_eq!(consts.in_at(ret).unwrap().get("main:x"), Flat::Bottom);
    assert_eq!(consts.in_at(ret).unwrap().get("main:a"), Flat::Value(Literal::Int(5)));
}

/// `main(y) { x = y * 2; b = x % 2; return b; }`
fn doubled_program() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.param("y", Type::int())
        .local("x", Type::int())
        .local("b", Type::int());
    f.assign(
        f.var("x"),
        Expr::binary(BinaryOp::Mul, f.var("y"), Expr::int(2)),
    );
    f.assign(
        f.var("b"),
        Expr::binary(BinaryOp::Mod, f.var("x"), Expr::int(2)),
    );
    let ret = f.ret(Some(f.var("b")));
    (unit_of("doubled", f), ret)
}

#[test]
fn test_parity_refines_interval() {
    let (unit, ret) = doubled_program();

    let alone = run(
        unit.clone(),
        &AnalysisSet::new(IntervalAnalysis::NAME),
        HostConfig::default(),
    );
    let ranges = alone.results::<IntervalValue>(IntervalAnalysis::NAME).unwrap();
    assert_eq!(ranges.in_at(ret).unwrap().get("main:b"), Range::new(-1, 1));

    let set = AnalysisSet::new(IntervalAnalysis::NAME).with("parity");
    let together = run(unit, &set, HostConfig::default());
    let ranges = together.results::<IntervalValue>(IntervalAnalysis::NAME).unwrap();
    assert_eq!(ranges.in_at(ret).unwrap().get("main:b"), Range::exact(0));
    assert_eq!(ranges.in_at(ret).unwrap().get("main:x"), Range::Bottom);
}

/// `x = 7; y = 1; return y;`
#[test]
fn test_liveness_drops_dead_stores() {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("x", Type::int()).local("y", Type::int());
    let store = f.assign(f.var("x"), Expr::int(7));
    f.assign(f.var("y"), Expr::int(1));
    let ret = f.ret(Some(f.var("y")));
    let unit = unit_of("dead", f);

    let alone = run(
        unit.clone(),
        &AnalysisSet::new(ConstantPropagation::NAME),
        HostConfig::default(),
    );
    let consts = alone.results::<ConstValue>(ConstantPropagation::NAME).unwrap();
    assert_eq!(
        consts.out_at(store).unwrap().get("main:x"),
        Flat::Value(Literal::Int(7))
    );

    let set = AnalysisSet::new(ConstantPropagation::NAME).with("liveness");
    let together = run(unit, &set, HostConfig::default());
    let consts = together.results::<ConstValue>(ConstantPropagation::NAME).unwrap();
    assert_eq!(consts.out_at(store).unwrap().get("main:x"), Flat::Top);
    assert_eq!(
        consts.in_at(ret).unwrap().get("main:y"),
        Flat::Value(Literal::Int(1))
    );
}

/// `i = 0; L: if (i >= 10) goto done; i = i + 1; goto L; done: return i;`
fn counting_loop() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("i", Type::int());
    f.assign(f.var("i"), Expr::int(0));
    f.label("L").unwrap();
    f.if_goto(
        Expr::binary(BinaryOp::Ge, f.var("i"), Expr::int(10)),
        "done",
    );
    f.assign(
        f.var("i"),
        Expr::binary(BinaryOp::Add, f.var("i"), Expr::int(1)),
    );
    f.goto("L");
    f.label("done").unwrap();
    let ret = f.ret(Some(f.var("i")));
    (unit_of("count", f), ret)
}

#[test]
fn test_interval_loop_widens_and_restricts() {
    let (unit, ret) = counting_loop();
    let host = run(
        unit,
        &AnalysisSet::new(IntervalAnalysis::NAME),
        HostConfig::default(),
    );

    let ranges = host.results::<IntervalValue>(IntervalAnalysis::NAME).unwrap();
    assert_eq!(
        ranges.in_at(ret).unwrap().get("main:i"),
        Range::new(10, i64::MAX)
    );
    assert!(host.stats().widenings > 0);
}

#[test]
fn test_all_clients_are_deterministic() {
    let (unit, _) = counting_loop();
    let set = AnalysisSet::new(ConstantPropagation::NAME)
        .with(IntervalAnalysis::NAME)
        .with("pointsto")
        .with("liveness")
        .with("parity");
    let snapshot = || {
        let host = run(unit.clone(), &set, HostConfig::default());
        host.analysis_names()
            .iter()
            .map(|name| host.get_analysis_results(name).unwrap().clone_result())
            .collect::<Vec<_>>()
    };
    let first = snapshot();
    let second = snapshot();
    assert_eq!(first.len(), 5);
    for (a, b) in first.iter().zip(&second) {
        assert!(a.dyn_eq(b.as_ref()));
    }
}
