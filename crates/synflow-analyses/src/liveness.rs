/*! Strongly-live variables, computed backwards.
 *
 * An assignment to a variable that is not live afterwards contributes no uses, so chains of
 * dead assignments die together. Reads through a pointer make its pointees live, as reported by
 * `DerefToVars`.
 */

use crate::support::{pointees, Ask, Pointees};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use synflow_core::analysis::{
    compare_extremes, Analysis, AnalysisEnv, CallEnv, CallProjection, ChangeResult, Direction,
    Lattice, NodeDfv, SimAnswer, SimKind, SimQuery, SimValue, TransferCtx,
};
use synflow_core::{Callee, Expr, Instr, VarName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveVars {
    /// Not reached yet.
    Top,
    /// Everything may be live.
    Bottom,
    Vars(BTreeSet<VarName>),
}

impl LiveVars {
    pub fn contains(&self, var: &str) -> bool {
        match self {
            LiveVars::Top => false,
            LiveVars::Bottom => true,
            LiveVars::Vars(vars) => vars.contains(var),
        }
    }

    pub fn insert(&mut self, var: &str) {
        match self {
            LiveVars::Top => *self = LiveVars::Vars(BTreeSet::from([var.to_string()])),
            LiveVars::Bottom => {}
            LiveVars::Vars(vars) => {
                vars.insert(var.to_string());
            }
        }
    }

    pub fn remove(&mut self, var: &str) {
        if let LiveVars::Vars(vars) = self {
            vars.remove(var);
        }
    }

    fn retain(&self, keep: impl Fn(&str) -> bool) -> Self {
        match self {
            LiveVars::Vars(vars) => {
                LiveVars::Vars(vars.iter().filter(|v| keep(v.as_str())).cloned().collect())
            }
            other => other.clone(),
        }
    }
}

impl Lattice for LiveVars {
    fn top() -> Self {
        LiveVars::Top
    }

    fn bottom() -> Self {
        LiveVars::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, LiveVars::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, LiveVars::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self, other) {
            (LiveVars::Top, x) | (x, LiveVars::Top) => x.clone(),
            (LiveVars::Bottom, _) | (_, LiveVars::Bottom) => LiveVars::Bottom,
            (LiveVars::Vars(a), LiveVars::Vars(b)) => {
                LiveVars::Vars(a.union(b).cloned().collect())
            }
        };
        let changed = ChangeResult::from_changed(&result != self);
        (result, changed)
    }

    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        (self.clone(), ChangeResult::from_changed(self != previous))
    }

    fn less_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (LiveVars::Vars(a), LiveVars::Vars(b)) => Some(a.is_superset(b)),
            _ => compare_extremes(self, other),
        }
    }
}

impl fmt::Display for LiveVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveVars::Top => write!(f, "Top"),
            LiveVars::Bottom => write!(f, "Bottom"),
            LiveVars::Vars(vars) => {
                let names: Vec<&str> = vars.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LivenessAnalysis;

impl LivenessAnalysis {
    pub const NAME: &'static str = "liveness";

    /// Adds every variable `expr` reads, pointees included.
    fn add_reads(&self, live: &mut LiveVars, expr: &Expr, env: &AnalysisEnv<'_>, ask: &mut dyn Ask) {
        for var in expr.vars_read() {
            live.insert(var);
        }
        for ptr in derefs(expr) {
            match pointees(ask, ptr) {
                Pointees::Pending => {}
                Pointees::Known(vars) => {
                    for var in &vars {
                        live.insert(var);
                    }
                }
                Pointees::Unknown => {
                    for var in env.address_taken {
                        live.insert(var);
                    }
                }
            }
        }
    }

    fn add_escaping(&self, live: &mut LiveVars, env: &AnalysisEnv<'_>) {
        for var in env.escaping_vars() {
            live.insert(var);
        }
    }
}

/// Pointers dereferenced while evaluating `expr`.
fn derefs(expr: &Expr) -> Vec<&str> {
    let mut ptrs = Vec::new();
    let mut stack = vec![expr];
    while let Some(expr) = stack.pop() {
        match expr {
            Expr::Deref(ptr)
            | Expr::Member {
                base: ptr,
                through_pointer: true,
                ..
            } => ptrs.push(ptr.as_str()),
            Expr::Binary { left, right, .. } => {
                stack.push(right);
                stack.push(left);
            }
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => stack.push(operand),
            Expr::Index { index, .. } => stack.push(index),
            Expr::Call { callee, args } => {
                if let Callee::Pointer(ptr) = callee {
                    ptrs.push(ptr.as_str());
                }
                stack.extend(args.iter().rev());
            }
            Expr::Lit(_) | Expr::Var(_) | Expr::AddrOf(_) | Expr::Member { .. } => {}
        }
    }
    ptrs
}

impl Analysis for LivenessAnalysis {
    type Value = LiveVars;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    /// Globals are live when the function returns.
    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> LiveVars {
        LiveVars::Vars(env.unit.globals.keys().cloned().collect())
    }

    fn transfer(
        &self,
        instr: &Instr,
        out: &LiveVars,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<LiveVars> {
        let env = cx.env;
        let mut live = out.clone();
        match instr {
            Instr::Assign(assign) if assign.rhs.is_call() => {
                if let Some(lhs) = assign.lhs_var() {
                    live.remove(lhs);
                }
                for var in assign.uses() {
                    live.insert(var);
                }
                self.add_reads(&mut live, &assign.rhs, env, cx);
                self.add_escaping(&mut live, env);
            }
            Instr::Assign(assign) => match &assign.lhs {
                Expr::Var(var) => {
                    if out.contains(var) {
                        live.remove(var);
                        self.add_reads(&mut live, &assign.rhs, env, cx);
                    }
                }
                _ => {
                    for var in assign.uses() {
                        live.insert(var);
                    }
                    self.add_reads(&mut live, &assign.rhs, env, cx);
                }
            },
            Instr::Call(expr) => {
                self.add_reads(&mut live, expr, env, cx);
                self.add_escaping(&mut live, env);
            }
            Instr::CondJump(expr) | Instr::Return(Some(expr)) => {
                self.add_reads(&mut live, expr, env, cx)
            }
            Instr::Nop
            | Instr::Goto
            | Instr::Label(_)
            | Instr::Return(None)
            | Instr::Parallel(_) => {}
        }
        NodeDfv::new(live, out.clone())
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        &[SimKind::DeadLhs]
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        &[SimKind::DerefToVars]
    }

    fn answer_sim(&self, query: &SimQuery, value: &LiveVars, _env: &AnalysisEnv<'_>) -> SimAnswer {
        match (query, value) {
            (SimQuery::DeadLhs(_), LiveVars::Top) => SimAnswer::Pending,
            (SimQuery::DeadLhs(var), live) => SimAnswer::Value(SimValue::Dead(!live.contains(var))),
            _ => SimAnswer::Failed,
        }
    }

    /// Variables live after the call that the callee can affect.
    fn call_entry_value(&self, call_value: &LiveVars, env: &CallEnv<'_>) -> LiveVars {
        call_value.retain(|var| !env.caller_only(var))
    }

    /// Live before the call: what the callee reads, plus what the caller
    /// still needs and the callee cannot touch.
    fn call_exit_value(
        &self,
        call_value: &LiveVars,
        callee_value: &LiveVars,
        env: &CallEnv<'_>,
    ) -> LiveVars {
        let kept = call_value.retain(|var| env.caller_only(var) || env.shared_local(var));
        callee_value.meet(&kept).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synflow_core::BinaryOp;

    fn live(names: &[&str]) -> LiveVars {
        LiveVars::Vars(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_union_ordering() {
        assert_eq!(live(&["a"]).meet(&live(&["b"])).0, live(&["a", "b"]));
        assert_eq!(live(&["a", "b"]).less_eq(&live(&["a"])), Some(true));
        assert_eq!(LiveVars::Top.meet(&live(&["a"])).0, live(&["a"]));
        assert!(LiveVars::Bottom.contains("anything"));
        assert!(!LiveVars::Top.contains("anything"));
    }

    #[test]
    fn test_derefs_in_order() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::deref("f:p"),
            Expr::call_pointer("f:fp", vec![Expr::deref("f:q")]),
        );
        assert_eq!(derefs(&expr), vec!["f:p", "f:fp", "f:q"]);
        assert!(derefs(&Expr::addr_of("f:x")).is_empty());
    }

    #[test]
    fn test_dead_lhs_answers() {
        let la = LivenessAnalysis;
        let unit = synflow_core::TranslationUnit::new("t");
        let func = synflow_core::Function::new(synflow_core::FunctionSignature::new(
            "f",
            synflow_core::Type::Void,
        ));
        let config = synflow_core::analysis::HostConfig::default();
        let taken = Default::default();
        let env = AnalysisEnv {
            unit: &unit,
            func: &func,
            config: &config,
            address_taken: &taken,
        };
        let query = SimQuery::DeadLhs("f:x".into());

        assert_eq!(
            la.answer_sim(&query, &live(&["f:y"]), &env),
            SimAnswer::Value(SimValue::Dead(true))
        );
        assert_eq!(
            la.answer_sim(&query, &live(&["f:x"]), &env),
            SimAnswer::Value(SimValue::Dead(false))
        );
        assert_eq!(la.answer_sim(&query, &LiveVars::Top, &env), SimAnswer::Pending);
    }
}
