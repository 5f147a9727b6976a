use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use synflow_core::analysis::{
    boxed, Analysis, AnalysisEnv, AnalysisError, AnalysisRegistry, AnalysisSequence, AnalysisSet,
    ChangeResult, Flat, Host, HostConfig, Lattice, NodeDfv, SimAnswer, SimKind, SimQuery,
    SimState, SimValue, TransferCtx, VarMap,
};
use synflow_core::analysis::sim::SimKey;
use synflow_core::{Expr, FunctionBuilder, Instr, Literal, NodeId, TranslationUnit, Type, UnitBuilder};

type Consts = VarMap<Flat<i64>>;

/// Tracks literal and copy assignments, and answers which literal a variable holds.
struct Oracle;

impl Analysis for Oracle {
    type Value = Consts;

    fn name(&self) -> &'static str {
        "oracle"
    }

    fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Consts {
        VarMap::empty()
    }

    fn transfer(&self, instr: &Instr, input: &Consts, _cx: &mut TransferCtx<'_, '_>) -> NodeDfv<Consts> {
        let mut out = input.clone();
        if let Instr::Assign(assign) = instr {
            if let Some(lhs) = assign.lhs_var() {
                let value = match &assign.rhs {
                    Expr::Lit(Literal::Int(n)) => Flat::Value(*n),
                    Expr::Var(var) => input.get(var),
                    _ => Flat::Bottom,
                };
                out.set(lhs, value);
            }
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        &[SimKind::NumVarToLit]
    }

    fn answer_sim(&self, query: &SimQuery, value: &Consts, _env: &AnalysisEnv<'_>) -> SimAnswer {
        let SimQuery::NumVarToLit(var) = query else {
            return SimAnswer::Failed;
        };
        match value.get(var) {
            Flat::Top => SimAnswer::Pending,
            Flat::Value(n) => SimAnswer::Value(SimValue::Literal(Literal::Int(n))),
            Flat::Bottom => SimAnswer::Failed,
        }
    }
}

/// Learns variable values only by asking other analyses.
struct Asker;

impl Analysis for Asker {
    type Value = Consts;

    fn name(&self) -> &'static str {
        "asker"
    }

    fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Consts {
        VarMap::empty()
    }

    fn transfer(&self, instr: &Instr, input: &Consts, cx: &mut TransferCtx<'_, '_>) -> NodeDfv<Consts> {
        let mut out = input.clone();
        if let Instr::Assign(assign) = instr {
            if let (Some(lhs), Some(rhs)) = (assign.lhs_var(), assign.rhs.as_var()) {
                let value = match cx.sim(SimQuery::NumVarToLit(rhs.to_string())) {
                    SimAnswer::Value(SimValue::Literal(Literal::Int(n))) => Flat::Value(n),
                    SimAnswer::Pending => Flat::Top,
                    _ => Flat::Bottom,
                };
                out.set(lhs, value);
            }
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        &[SimKind::NumVarToLit]
    }
}

/// Never decides a query, and learns `lhs = var` only by asking `asks`.
struct Stalling {
    name: &'static str,
    asks: SimKind,
    answers: &'static [SimKind],
    needs: &'static [SimKind],
}

impl Analysis for Stalling {
    type Value = Consts;

    fn name(&self) -> &'static str {
        self.name
    }

    fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Consts {
        VarMap::empty()
    }

    fn transfer(&self, instr: &Instr, input: &Consts, cx: &mut TransferCtx<'_, '_>) -> NodeDfv<Consts> {
        let mut out = input.clone();
        if let Instr::Assign(assign) = instr {
            if let Some(lhs) = assign.lhs_var() {
                let value = match assign.rhs.as_var() {
                    Some(rhs) => {
                        let query = match self.asks {
                            SimKind::NumVarToLit => SimQuery::NumVarToLit(rhs.to_string()),
                            _ => SimQuery::NumBinToLit(assign.rhs.clone()),
                        };
                        match cx.sim(query) {
                            SimAnswer::Pending => Flat::Top,
                            _ => Flat::Bottom,
                        }
                    }
                    None => Flat::Bottom,
                };
                out.set(lhs, value);
            }
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        self.answers
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        self.needs
    }

    fn answer_sim(&self, _query: &SimQuery, _value: &Consts, _env: &AnalysisEnv<'_>) -> SimAnswer {
        SimAnswer::Pending
    }
}

fn ping() -> Stalling {
    Stalling {
        name: "ping",
        asks: SimKind::NumVarToLit,
        answers: &[SimKind::NumBinToLit],
        needs: &[SimKind::NumVarToLit],
    }
}

fn pong() -> Stalling {
    Stalling {
        name: "pong",
        asks: SimKind::NumBinToLit,
        answers: &[SimKind::NumVarToLit],
        needs: &[SimKind::NumBinToLit],
    }
}

/// Integers ordered downwards without a floor.
#[derive(Debug, Clone, PartialEq)]
enum Count {
    Top,
    Bottom,
    At(i64),
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Lattice for Count {
    fn top() -> Self {
        Count::Top
    }

    fn bottom() -> Self {
        Count::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, Count::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Count::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self, other) {
            (Count::Top, x) | (x, Count::Top) => x.clone(),
            (Count::Bottom, _) | (_, Count::Bottom) => Count::Bottom,
            (Count::At(a), Count::At(b)) => Count::At(*a.min(b)),
        };
        let changed = ChangeResult::from_changed(&result != self);
        (result, changed)
    }

    fn less_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Count::At(a), Count::At(b)) => Some(a <= b),
            _ => synflow_core::analysis::compare_extremes(self, other),
        }
    }
}

/// Decrements its counter at every assignment.
struct Countdown;

impl Analysis for Countdown {
    type Value = Count;

    fn name(&self) -> &'static str {
        "countdown"
    }

    fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Count {
        Count::At(0)
    }

    fn transfer(&self, instr: &Instr, input: &Count, _cx: &mut TransferCtx<'_, '_>) -> NodeDfv<Count> {
        let out = match (instr, input) {
            (Instr::Assign(_), Count::At(n)) => Count::At(n - 1),
            _ => input.clone(),
        };
        NodeDfv::new(input.clone(), out)
    }
}

/// Produces a larger value on every transfer, whatever its input.
#[derive(Default)]
struct Rising {
    calls: Cell<i64>,
}

impl Analysis for Rising {
    type Value = Count;

    fn name(&self) -> &'static str {
        "rising"
    }

    fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Count {
        Count::At(0)
    }

    fn transfer(&self, _instr: &Instr, input: &Count, _cx: &mut TransferCtx<'_, '_>) -> NodeDfv<Count> {
        self.calls.set(self.calls.get() + 1);
        NodeDfv::new(input.clone(), Count::At(self.calls.get()))
    }
}

fn registry() -> AnalysisRegistry {
    let mut registry = AnalysisRegistry::new();
    registry
        .register("oracle", || boxed(Oracle))
        .register("asker", || boxed(Asker))
        .register("countdown", || boxed(Countdown))
        .register("rising", || boxed(Rising::default()))
        .register("ping", || boxed(ping()))
        .register("pong", || boxed(pong()));
    registry
}

/// `a = 5; b = a; return b;`
fn copy_program() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int()).local("b", Type::int());
    let a = f.var("a");
    let b = f.var("b");
    f.assign(a.clone(), Expr::int(5));
    f.assign(b.clone(), a);
    let ret = f.ret(Some(b));

    let mut unit = UnitBuilder::new("copy");
    unit.function(f).unwrap();
    (Arc::new(unit.build()), ret)
}

/// Same program as [`copy_program`], returning the `b = a` node.
fn copy_node() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::int());
    f.local("a", Type::int()).local("b", Type::int());
    let a = f.var("a");
    let b = f.var("b");
    f.assign(a.clone(), Expr::int(5));
    let copy = f.assign(b.clone(), a);
    f.ret(Some(b));

    let mut unit = UnitBuilder::new("copy");
    unit.function(f).unwrap();
    (Arc::new(unit.build()), copy)
}

/// `L: x = x - 1; if x goto L; return;`
fn loop_program() -> (Arc<TranslationUnit>, NodeId) {
    let mut f = FunctionBuilder::new("main", Type::Void);
    f.local("x", Type::int());
    let x = f.var("x");
    let header = f.label("L").unwrap();
    f.assign(
        x.clone(),
        Expr::binary(synflow_core::BinaryOp::Sub, x.clone(), Expr::int(1)),
    );
    f.if_goto(x, "L");
    f.ret(None);

    let mut unit = UnitBuilder::new("loop");
    unit.function(f).unwrap();
    (Arc::new(unit.build()), header)
}

#[test]
fn test_sim_answer_flows_between_analyses() {
    let (unit, ret) = copy_program();
    let set = AnalysisSet::new("asker").with("oracle");
    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();

    let asker = host.results::<Consts>("asker").unwrap();
    assert_eq!(asker.in_at(ret).unwrap().get("main:b"), Flat::Value(5));
    assert!(host.stats().sim_queries > 0);
    assert_eq!(host.sim_cache().pending_count(), 0);
}

#[test]
fn test_queries_fail_without_sources() {
    let (unit, ret) = copy_program();

    let alone = AnalysisSet::new("asker");
    let mut host = Host::new(unit.clone(), "main", &alone, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();
    let asker = host.results::<Consts>("asker").unwrap();
    assert_eq!(asker.in_at(ret).unwrap().get("main:b"), Flat::Bottom);

    let config = HostConfig {
        disable_sims: true,
        ..HostConfig::default()
    };
    let set = AnalysisSet::new("asker").with("oracle");
    let mut host = Host::new(unit, "main", &set, &registry(), config).unwrap();
    host.analyze().unwrap();
    let asker = host.results::<Consts>("asker").unwrap();
    assert_eq!(asker.in_at(ret).unwrap().get("main:b"), Flat::Bottom);
}

#[test]
fn test_undecided_query_cycle_settles_as_failed() {
    let (unit, copy) = copy_node();
    let set = AnalysisSet::new("ping").with("pong");
    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();

    assert!(host.stats().pending_forced > 0);
    assert_eq!(host.sim_cache().pending_count(), 0);

    let slot = |name: &str| host.analysis_names().iter().position(|n| *n == name);
    let ping_key = SimKey::new(copy, &SimQuery::NumVarToLit("main:a".to_string()), 0, slot("ping"));
    assert!(matches!(host.sim_cache().state(&ping_key), Some(SimState::Failed)));
    let pong_key = SimKey::new(copy, &SimQuery::NumBinToLit(Expr::var("main:a")), 0, slot("pong"));
    assert!(matches!(host.sim_cache().state(&pong_key), Some(SimState::Failed)));

    let ping = host.results::<Consts>("ping").unwrap();
    assert_eq!(ping.out_at(copy).unwrap().get("main:b"), Flat::Bottom);
}

#[test]
fn test_cascaded_stage_queries_completed_stage() {
    let (unit, ret) = copy_program();
    let set = AnalysisSet::new("asker")
        .with("oracle")
        .with_sequence(AnalysisSequence::cascaded([vec!["oracle"], vec!["asker"]]));
    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();

    let asker = host.results::<Consts>("asker").unwrap();
    assert_eq!(asker.in_at(ret).unwrap().get("main:b"), Flat::Value(5));
}

#[test]
fn test_every_node_gets_a_result() {
    let (unit, _) = copy_program();
    let set = AnalysisSet::new("oracle");
    let mut host = Host::new(unit.clone(), "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();

    let cfg = unit.function("main").unwrap().body.as_ref().unwrap();
    let result = host.get_analysis_results("oracle").unwrap();
    assert_eq!(result.nodes().len(), cfg.len());
}

#[test]
fn test_repeated_runs_are_deterministic() {
    let (unit, _) = loop_program();
    let set = AnalysisSet::new("countdown").with("oracle");
    let run = || {
        let mut host =
            Host::new(unit.clone(), "main", &set, &registry(), HostConfig::default()).unwrap();
        host.analyze().unwrap();
        host.get_analysis_results("countdown").unwrap().clone_result()
    };
    assert!(run().dyn_eq(run().as_ref()));
}

#[test]
fn test_widening_stops_infinite_descent() {
    let (unit, header) = loop_program();
    let set = AnalysisSet::new("countdown");
    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();

    let counts = host.results::<Count>("countdown").unwrap();
    assert_eq!(counts.in_at(header), Some(&Count::Bottom));
    assert!(host.stats().widenings > 0);
}

#[test]
fn test_iteration_bound_without_widening() {
    let (unit, _) = loop_program();
    let config = HostConfig {
        widening: false,
        max_iterations: 500,
        ..HostConfig::default()
    };
    let set = AnalysisSet::new("countdown");
    let mut host = Host::new(unit, "main", &set, &registry(), config).unwrap();

    match host.analyze() {
        Err(AnalysisError::NonTermination {
            analyses,
            function,
            iterations,
            ..
        }) => {
            assert_eq!(analyses, vec!["countdown".to_string()]);
            assert_eq!(function, "main");
            assert_eq!(iterations, 501);
        }
        other => panic!("expected non-termination, got {:?}", other),
    }
}

#[cfg(debug_assertions)]
#[test]
fn test_rising_values_are_rejected() {
    let (unit, _) = loop_program();
    let set = AnalysisSet::new("rising");
    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();

    assert!(matches!(
        host.analyze(),
        Err(AnalysisError::MonotonicityViolation { analysis, .. }) if analysis == "rising"
    ));
}

#[test]
fn test_lookup_errors() {
    let (unit, _) = copy_program();
    let set = AnalysisSet::new("oracle");

    assert!(matches!(
        Host::new(unit.clone(), "missing", &set, &registry(), HostConfig::default()),
        Err(AnalysisError::UnknownFunction(_))
    ));

    let mut host = Host::new(unit, "main", &set, &registry(), HostConfig::default()).unwrap();
    host.analyze().unwrap();
    assert!(matches!(
        host.get_analysis_results("asker"),
        Err(AnalysisError::NotRequested(_))
    ));
    assert!(matches!(
        host.results::<Count>("oracle"),
        Err(AnalysisError::NotRequested(_))
    ));
}
