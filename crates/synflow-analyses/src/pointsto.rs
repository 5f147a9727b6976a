/*! Flow-sensitive may-points-to sets for pointer variables.
 *
 * Only variables of pointer type get entries. A null constant points to nothing; pointer
 * arithmetic stays inside the object it started from.
 */

use crate::support::{clobber_call, entry_boundary, reachability};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use synflow_core::analysis::{
    compare_extremes, Analysis, AnalysisEnv, CallEnv, ChangeResult, ExprDfv, Lattice, NodeDfv,
    SimAnswer, SimKind, SimQuery, SimValue, TransferCtx, VarMap,
};
use synflow_core::{BinaryOp, Expr, Instr, VarName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointsTo {
    Top,
    /// May point anywhere.
    Bottom,
    Set(BTreeSet<VarName>),
}

impl PointsTo {
    pub fn single(var: &str) -> Self {
        PointsTo::Set(BTreeSet::from([var.to_string()]))
    }

    pub fn null() -> Self {
        PointsTo::Set(BTreeSet::new())
    }

    pub fn targets(&self) -> Option<&BTreeSet<VarName>> {
        match self {
            PointsTo::Set(set) => Some(set),
            _ => None,
        }
    }
}

impl Lattice for PointsTo {
    fn top() -> Self {
        PointsTo::Top
    }

    fn bottom() -> Self {
        PointsTo::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, PointsTo::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, PointsTo::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self, other) {
            (PointsTo::Top, x) | (x, PointsTo::Top) => x.clone(),
            (PointsTo::Bottom, _) | (_, PointsTo::Bottom) => PointsTo::Bottom,
            (PointsTo::Set(a), PointsTo::Set(b)) => PointsTo::Set(a.union(b).cloned().collect()),
        };
        let changed = ChangeResult::from_changed(&result != self);
        (result, changed)
    }

    /// Sets are drawn from the unit's finite variables.
    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        (self.clone(), ChangeResult::from_changed(self != previous))
    }

    fn less_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (PointsTo::Set(a), PointsTo::Set(b)) => Some(a.is_superset(b)),
            _ => compare_extremes(self, other),
        }
    }
}

impl fmt::Display for PointsTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointsTo::Top => write!(f, "Top"),
            PointsTo::Bottom => write!(f, "Bottom"),
            PointsTo::Set(set) => {
                let names: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

pub type PointsToValue = VarMap<PointsTo>;

#[derive(Debug, Default, Clone, Copy)]
pub struct PointsToAnalysis;

impl PointsToAnalysis {
    pub const NAME: &'static str = "pointsto";

    pub fn targets(&self, expr: &Expr, value: &PointsToValue) -> PointsTo {
        match expr {
            Expr::AddrOf(var) => PointsTo::single(var),
            Expr::Lit(_) => PointsTo::null(),
            Expr::Var(var) => value.get(var),
            Expr::Deref(ptr) => match value.get(ptr) {
                PointsTo::Set(pointees) => pointees
                    .iter()
                    .fold(PointsTo::Top, |acc, var| acc.meet(&value.get(var)).0),
                other => other,
            },
            Expr::Cast { operand, .. } => self.targets(operand, value),
            Expr::Binary {
                op: BinaryOp::Add | BinaryOp::Sub,
                left,
                ..
            } => self.targets(left, value),
            Expr::Binary { .. }
            | Expr::Unary { .. }
            | Expr::Index { .. }
            | Expr::Member { .. }
            | Expr::Call { .. } => PointsTo::Bottom,
        }
    }

    fn store(
        &self,
        out: &mut PointsToValue,
        ptr: &str,
        stored: PointsTo,
        input: &PointsToValue,
        env: &AnalysisEnv<'_>,
    ) -> bool {
        let pointer = |var: &str| is_pointer(env, var);
        match input.get(ptr) {
            PointsTo::Top => return false,
            PointsTo::Set(pointees) if pointees.is_empty() => return false,
            PointsTo::Set(pointees) if pointees.len() == 1 => {
                if let Some(var) = pointees.first().filter(|v| pointer(v.as_str())) {
                    out.set(var, stored);
                }
            }
            PointsTo::Set(pointees) => {
                for var in pointees.iter().filter(|v| pointer(v.as_str())) {
                    let merged = out.get(var).meet(&stored).0;
                    out.set(var, merged);
                }
            }
            PointsTo::Bottom => out.set_bottom(env.escaping_vars().filter(|&v| pointer(v))),
        }
        true
    }
}

fn is_pointer(env: &AnalysisEnv<'_>, var: &str) -> bool {
    env.var_type(var).is_some_and(|ty| ty.is_pointer())
}

impl Analysis for PointsToAnalysis {
    type Value = PointsToValue;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> PointsToValue {
        entry_boundary(env, &|var| is_pointer(env, var))
    }

    fn transfer(
        &self,
        instr: &Instr,
        input: &PointsToValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<PointsToValue> {
        let env = cx.env;
        let mut out = input.clone();
        match instr {
            Instr::Assign(assign) if assign.rhs.is_call() => {
                clobber_call(&mut out, instr, env, &|var| is_pointer(env, var))
            }
            Instr::Assign(assign) => match &assign.lhs {
                Expr::Var(var) if is_pointer(env, var) => {
                    out.set(var, self.targets(&assign.rhs, input));
                }
                Expr::Deref(ptr) => {
                    let stored = self.targets(&assign.rhs, input);
                    if !self.store(&mut out, ptr, stored, input, env) {
                        out = PointsToValue::Top;
                    }
                }
                _ => {}
            },
            Instr::Call(_) => clobber_call(&mut out, instr, env, &|var| is_pointer(env, var)),
            Instr::CondJump(_)
            | Instr::Nop
            | Instr::Goto
            | Instr::Label(_)
            | Instr::Return(_)
            | Instr::Parallel(_) => {}
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        &[SimKind::DerefToVars, SimKind::NodeReachability]
    }

    fn answer_sim(
        &self,
        query: &SimQuery,
        value: &PointsToValue,
        _env: &AnalysisEnv<'_>,
    ) -> SimAnswer {
        match query {
            SimQuery::NodeReachability => reachability(value),
            SimQuery::DerefToVars(ptr) => match value.get(ptr) {
                PointsTo::Set(pointees) => SimAnswer::Value(SimValue::Vars(pointees)),
                PointsTo::Top => SimAnswer::Pending,
                PointsTo::Bottom => SimAnswer::Failed,
            },
            _ => SimAnswer::Failed,
        }
    }

    fn call_entry_value(&self, call_value: &PointsToValue, env: &CallEnv<'_>) -> PointsToValue {
        call_value.project_entry(env)
    }

    fn call_exit_value(
        &self,
        call_value: &PointsToValue,
        callee_value: &PointsToValue,
        env: &CallEnv<'_>,
    ) -> PointsToValue {
        call_value.restore_after_call(callee_value, env)
    }
}

impl ExprDfv for PointsToAnalysis {
    type Component = PointsTo;

    fn expr_dfv(&self, expr: &Expr, value: &PointsToValue) -> PointsTo {
        self.targets(expr, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> PointsTo {
        PointsTo::Set(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_meet_unions_sets() {
        assert_eq!(set(&["a"]).meet(&set(&["b"])).0, set(&["a", "b"]));
        assert_eq!(set(&["a"]).meet(&PointsTo::Top).0, set(&["a"]));
        assert_eq!(set(&["a"]).meet(&PointsTo::Bottom).0, PointsTo::Bottom);
        assert_eq!(set(&["a", "b"]).less_eq(&set(&["a"])), Some(true));
        assert_eq!(set(&["a"]).less_eq(&set(&["b"])), Some(false));
        assert_eq!(set(&["b", "a"]).to_string(), "{a, b}");
    }

    #[test]
    fn test_targets_of_expressions() {
        let pta = PointsToAnalysis;
        let mut value = PointsToValue::empty();
        value.set("f:p", set(&["f:q"]));
        value.set("f:q", set(&["f:x"]));

        assert_eq!(pta.targets(&Expr::addr_of("f:y"), &value), set(&["f:y"]));
        assert_eq!(pta.targets(&Expr::int(0), &value), set(&[]));
        assert_eq!(pta.targets(&Expr::deref("f:p"), &value), set(&["f:x"]));
        assert_eq!(
            pta.targets(&Expr::binary(BinaryOp::Add, Expr::var("f:p"), Expr::int(4)), &value),
            set(&["f:q"])
        );
        assert_eq!(pta.targets(&Expr::call("g", vec![]), &value), PointsTo::Bottom);
    }
}
