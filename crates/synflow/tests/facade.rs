use std::sync::Arc;
use synflow::analyses::{ConstValue, ConstantPropagation, IntervalAnalysis, IntervalValue, Range};
use synflow::core::analysis::Flat;
use synflow::core::{BinaryOp, Literal};
use synflow::{
    analyze_function, analyze_program, AnalysisSet, EmitterConfig, Emitter, Expr,
    FunctionBuilder, HostConfig, IpaConfig, IpaReport, ResultEmitter, Type, UnitBuilder,
};

#[test]
fn test_analyze_function_and_print() {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int()).local("b", Type::int());
    f.assign(f.var("a"), Expr::int(3));
    f.assign(
        f.var("b"),
        Expr::binary(BinaryOp::Mul, f.var("a"), Expr::int(4)),
    );
    let ret = f.ret(Some(f.var("b")));
    let mut unit = UnitBuilder::new("mul");
    unit.function(f).unwrap();

    let set = AnalysisSet::new(IntervalAnalysis::NAME).with(ConstantPropagation::NAME);
    let host = analyze_function(Arc::new(unit.build()), "main", &set, HostConfig::default()).unwrap();

    let ranges = host.results::<IntervalValue>(IntervalAnalysis::NAME).unwrap();
    assert_eq!(ranges.in_at(ret).unwrap().get("main:b"), Range::exact(12));

    let text = ResultEmitter::new(EmitterConfig::plain())
        .emit_to_string(&host)
        .unwrap();
    assert!(text.contains("=== main: interval, const ==="));
}

#[test]
fn test_analyze_program_from_main() {
    let mut id = FunctionBuilder::new("id", Type::int());
    id.param("v", Type::int());
    id.ret(Some(id.var("v")));

    let mut main = FunctionBuilder::new("main", Type::int());
    main.local("x", Type::int());
    main.assign_call(main.var("x"), "id", vec![Expr::int(9)]);
    let ret = main.ret(Some(main.var("x")));

    let mut unit = UnitBuilder::new("id");
    unit.function(id).unwrap();
    unit.function(main).unwrap();

    let set = AnalysisSet::new(ConstantPropagation::NAME);
    let (ipa, results) = analyze_program(unit.build(), "main", &set, IpaConfig::default()).unwrap();

    let consts = results
        .results::<ConstValue>("main", ConstantPropagation::NAME)
        .unwrap();
    assert_eq!(
        consts.in_at(ret).unwrap().get("main:x"),
        Flat::Value(Literal::Int(9))
    );

    let report = IpaReport {
        host: &ipa,
        results: &results,
    };
    let text = ResultEmitter::new(EmitterConfig::plain())
        .emit_to_string(&report)
        .unwrap();
    assert!(text.contains("ctx1 id depth 1"));
}
