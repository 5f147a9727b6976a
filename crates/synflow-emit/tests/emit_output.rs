use pretty_assertions::assert_eq;
use std::sync::Arc;
use synflow_analyses::{builtin_registry, ConstantPropagation};
use synflow_core::analysis::{AnalysisSet, Host, HostConfig, IpaConfig, IpaHost};
use synflow_core::{
    BinaryOp, Expr, FunctionBuilder, FunctionSignature, Type, TranslationUnit, UnitBuilder,
};
use synflow_emit::{
    EmitterConfig, Emitter, Halves, IpaReport, IrEmitter, OutputFormat, ResultEmitter,
};

/// `f(p) { r = p + 1; return r; }` next to a declared `printf`.
fn increment_unit() -> TranslationUnit {
    let mut f = FunctionBuilder::new("f", Type::int());
    f.param("p", Type::int()).local("r", Type::int());
    f.assign(
        f.var("r"),
        Expr::binary(BinaryOp::Add, f.var("p"), Expr::int(1)),
    );
    f.ret(Some(f.var("r")));

    let mut printf = FunctionSignature::new("printf", Type::int());
    printf.variadic = true;

    let mut unit = UnitBuilder::new("inc");
    unit.global("g", Type::int()).unwrap();
    unit.function(f).unwrap();
    unit.declare(printf).unwrap();
    unit.build()
}

#[test]
fn test_unit_listing() {
    let text = IrEmitter::new(EmitterConfig::plain())
        .emit_to_string(&increment_unit())
        .unwrap();
    insta::assert_snapshot!(text, @r###"
    unit inc
    global g: i32

    fn f(f:p: i32) -> i32 {
        local f:r: i32
        n0: nop -> n2
        n2: f:r = f:p + 1 -> n3
        n3: return f:r -> n1
        n1: nop
    }

    declare fn printf(...) -> i32
    "###);
}

/// `if (c) x = 1; else x = 2; return x;` with `c = 0`.
fn pruned_branch() -> Arc<TranslationUnit> {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("c", Type::int()).local("x", Type::int());
    f.assign(f.var("c"), Expr::int(0));
    f.branch(f.var("c"), "then", "else");
    f.label("then").unwrap();
    f.assign(f.var("x"), Expr::int(1));
    f.goto("end");
    f.label("else").unwrap();
    f.assign(f.var("x"), Expr::int(2));
    f.label("end").unwrap();
    f.ret(Some(f.var("x")));

    let mut unit = UnitBuilder::new("pruned");
    unit.function(f).unwrap();
    Arc::new(unit.build())
}

fn analyzed(config: HostConfig) -> Host {
    let mut host = Host::new(
        pruned_branch(),
        "main",
        &AnalysisSet::new(ConstantPropagation::NAME),
        &builtin_registry(),
        config,
    )
    .unwrap();
    host.analyze().unwrap();
    host
}

#[test]
fn test_host_results_show_values_and_dead_edges() {
    let text = ResultEmitter::new(EmitterConfig::plain())
        .emit_to_string(&analyzed(HostConfig::default()))
        .unwrap();

    assert!(text.starts_with("=== main: const ==="));
    assert!(text.contains("[T dead]"));
    assert!(text.contains("const out {main:c: 0"));
    assert!(text.contains("const in  {main:c: 0, main:x: 2}"));
    assert!(text.contains("const unreached"));
    assert!(text.contains("=== stats ==="));
    assert!(!text.contains('\u{1b}'));
}

#[test]
fn test_halves_and_unreached_filtering() {
    let config = EmitterConfig {
        halves: Halves::Out,
        hide_unreached: true,
        ..EmitterConfig::plain()
    };
    let text = ResultEmitter::new(config)
        .emit_to_string(&analyzed(HostConfig::default()))
        .unwrap();

    assert!(!text.contains("const in "));
    assert!(text.contains("const out "));
    assert!(!text.contains("unreached"));
}

#[test]
fn test_json_stats() {
    let config = EmitterConfig {
        format: OutputFormat::Json,
        ..EmitterConfig::plain()
    };
    let host = analyzed(HostConfig::default());
    let text = ResultEmitter::new(config).emit_to_string(&host).unwrap();

    let json_start = text.find("\n{\n").unwrap() + 1;
    let stats: serde_json::Value = serde_json::from_str(&text[json_start..]).unwrap();
    assert_eq!(stats["node_visits"], host.stats().node_visits);
    assert!(!text.contains("=== stats ==="));
}

#[test]
fn test_ipa_report_lists_contexts() {
    let mut callee = FunctionBuilder::new("f", Type::int());
    callee.param("p", Type::int()).local("r", Type::int());
    callee.assign(
        callee.var("r"),
        Expr::binary(BinaryOp::Add, callee.var("p"), Expr::int(1)),
    );
    callee.ret(Some(callee.var("r")));

    let mut main = FunctionBuilder::new("main", Type::int());
    main.local("x", Type::int());
    main.assign_call(main.var("x"), "f", vec![Expr::int(4)]);
    main.ret(Some(main.var("x")));

    let mut unit = UnitBuilder::new("call");
    unit.function(callee).unwrap();
    unit.function(main).unwrap();

    let mut ipa = IpaHost::new(
        unit.build(),
        "main",
        &AnalysisSet::new(ConstantPropagation::NAME),
        &builtin_registry(),
        IpaConfig::default(),
    )
    .unwrap();
    let results = ipa.analyze().unwrap();
    let report = IpaReport {
        host: &ipa,
        results: &results,
    };
    let text = ResultEmitter::new(EmitterConfig::plain())
        .emit_to_string(&report)
        .unwrap();

    assert!(text.contains("=== f: const ==="));
    assert!(text.contains("=== main: const ==="));
    assert!(text.contains("=== contexts ==="));
    assert!(text.contains("ctx0 main depth 0 root"));
    assert!(text.contains("ctx1 f depth 1"));
    assert!(text.contains("callers ctx0@"));
    assert!(text.contains("contexts created: 1"));
}
