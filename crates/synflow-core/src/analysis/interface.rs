/*! What a client analysis provides to the engine.
 *
 * An analysis names itself, picks a direction, supplies boundary values and one transfer function
 * over the closed instruction set, and declares which simplification queries it answers and asks.
 * The host drives analyses through the type-erased `DynAnalysis`, implemented once by
 * `AnalysisSlot`, which also owns the analysis' results.
 */

use super::config::{HostConfig, LocalInit};
use super::dfv::{AnResult, ErasedResult, NodeDfv};
use super::error::{AnalysisError, Result};
use super::lattice::{checked_meet, downcast_value, CallProjection, ChangeResult, DynValue, Lattice};
use super::sim::{Half, SimAnswer, SimKind, SimQuery, SimResolver};
use crate::cfg::{Cfg, EdgeLabel, NodeId};
use crate::expr::{Expr, VarName};
use crate::function::Function;
use crate::instructions::Instr;
use crate::types::Type;
use crate::unit::TranslationUnit;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// The half computed from neighbouring nodes.
    pub fn input_half(self) -> Half {
        match self {
            Direction::Forward => Half::In,
            Direction::Backward => Half::Out,
        }
    }

    pub fn output_half(self) -> Half {
        match self {
            Direction::Forward => Half::Out,
            Direction::Backward => Half::In,
        }
    }
}

/// Read-only view of the function being analyzed.
pub struct AnalysisEnv<'a> {
    pub unit: &'a TranslationUnit,
    pub func: &'a Function,
    pub config: &'a HostConfig,
    pub address_taken: &'a BTreeSet<VarName>,
}

impl<'a> AnalysisEnv<'a> {
    pub fn var_type(&self, var: &str) -> Option<&'a Type> {
        self.unit.var_type(var)
    }

    pub fn is_address_taken(&self, var: &str) -> bool {
        self.address_taken.contains(var)
    }

    /// Variables a call that is not expanded may read or write.
    pub fn escaping_vars(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.unit
            .globals
            .keys()
            .map(String::as_str)
            .chain(self.address_taken.iter().map(String::as_str))
    }
}

/// Context handed to a transfer function: the node and a way to ask the
/// co-running analyses.
pub struct TransferCtx<'a, 'e> {
    pub node: NodeId,
    pub env: &'a AnalysisEnv<'e>,
    sims: &'a mut dyn SimResolver,
}

impl<'a, 'e> TransferCtx<'a, 'e> {
    pub fn new(node: NodeId, env: &'a AnalysisEnv<'e>, sims: &'a mut dyn SimResolver) -> Self {
        Self { node, env, sims }
    }

    pub fn sim(&mut self, query: SimQuery) -> SimAnswer {
        self.sims.simplify(&query)
    }
}

/// Caller and callee at an expanded call site.
pub struct CallEnv<'a> {
    pub unit: &'a TranslationUnit,
    pub caller: &'a Function,
    pub callee: &'a Function,
    pub address_taken: &'a BTreeSet<VarName>,
    pub local_init: LocalInit,
}

impl CallEnv<'_> {
    pub fn is_recursive(&self) -> bool {
        self.caller.name() == self.callee.name()
    }
}

impl CallProjection for CallEnv<'_> {
    fn enters_callee(&self, var: &str) -> bool {
        self.unit.is_global(var)
            || self.address_taken.contains(var)
            || self.callee.params().iter().any(|p| p.name == var)
    }

    fn unconstrained_locals(&self) -> Vec<VarName> {
        match self.local_init {
            LocalInit::Top => Vec::new(),
            LocalInit::Conservative => self
                .callee
                .locals
                .keys()
                .filter(|var| !self.address_taken.contains(*var))
                .cloned()
                .collect(),
        }
    }

    fn caller_only(&self, var: &str) -> bool {
        !self.is_recursive() && self.caller.is_local(var) && !self.address_taken.contains(var)
    }

    fn shared_local(&self, var: &str) -> bool {
        self.is_recursive() && self.caller.is_local(var)
    }
}

pub trait Analysis: 'static {
    type Value: Lattice;

    fn name(&self) -> &'static str;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    /// IN of the entry node (forward) or OUT of the exit node (backward).
    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> Self::Value;

    /// Transfer over one instruction. `input` is IN for forward analyses and
    /// OUT for backward ones, and is never Top.
    fn transfer(
        &self,
        instr: &Instr,
        input: &Self::Value,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<Self::Value>;

    fn sims_answered(&self) -> &'static [SimKind] {
        &[]
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        &[]
    }

    /// Answers a query from the half of this analysis' value at the queried
    /// node that the query kind reads.
    fn answer_sim(
        &self,
        _query: &SimQuery,
        _value: &Self::Value,
        _env: &AnalysisEnv<'_>,
    ) -> SimAnswer {
        SimAnswer::Failed
    }

    /// Value passed into a callee from the value at the call site.
    fn call_entry_value(&self, call_value: &Self::Value, _env: &CallEnv<'_>) -> Self::Value {
        call_value.clone()
    }

    /// Value after an expanded call, from the value at the call site and the
    /// callee's value at its far boundary.
    fn call_exit_value(
        &self,
        _call_value: &Self::Value,
        callee_value: &Self::Value,
        _env: &CallEnv<'_>,
    ) -> Self::Value {
        callee_value.clone()
    }
}

/// Analyses that can project their node value onto a single expression.
pub trait ExprDfv: Analysis {
    type Component: Lattice;

    fn expr_dfv(&self, expr: &Expr, value: &Self::Value) -> Self::Component;
}

/// Everything the host needs to recompute the input half at a node.
pub struct InputCtx<'a, 'e> {
    pub env: &'a AnalysisEnv<'e>,
    pub cfg: &'a Cfg,
    pub dead_edges: &'a BTreeSet<(NodeId, NodeId, EdgeLabel)>,
    pub loop_headers: &'a BTreeSet<NodeId>,
    /// Overrides the analysis' own boundary value.
    pub boundary: Option<&'a dyn DynValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputUpdate {
    pub changed: ChangeResult,
    pub widened: bool,
}

/// Type-erased analysis together with its results.
pub trait DynAnalysis {
    fn name(&self) -> &'static str;

    fn direction(&self) -> Direction;

    fn sims_answered(&self) -> &'static [SimKind];

    fn sims_needed(&self) -> &'static [SimKind];

    fn as_any(&self) -> &dyn Any;

    fn compute_input(&mut self, node: NodeId, cx: &InputCtx<'_, '_>) -> Result<InputUpdate>;

    fn transfer(
        &mut self,
        node: NodeId,
        instr: &Instr,
        cx: &mut TransferCtx<'_, '_>,
    ) -> Result<ChangeResult>;

    fn force_output_top(&mut self, node: NodeId) -> ChangeResult;

    fn call_entry(&self, node: NodeId, env: &CallEnv<'_>) -> Box<dyn DynValue>;

    fn apply_call(
        &mut self,
        node: NodeId,
        callee_value: Option<&dyn DynValue>,
        env: &CallEnv<'_>,
    ) -> Result<ChangeResult>;

    fn answer_sim(&self, node: NodeId, query: &SimQuery, env: &AnalysisEnv<'_>) -> SimAnswer;

    /// Value at the boundary opposite to the one the analysis starts from:
    /// OUT of the exit node (forward) or IN of the entry node (backward).
    fn far_boundary(&self, cfg: &Cfg) -> Box<dyn DynValue>;

    fn results(&self) -> &dyn ErasedResult;
}

pub struct AnalysisSlot<A: Analysis> {
    analysis: A,
    results: AnResult<A::Value>,
    visits: HashMap<NodeId, u32>,
}

impl<A: Analysis> AnalysisSlot<A> {
    pub fn new(analysis: A) -> Self {
        Self {
            analysis,
            results: AnResult::new(),
            visits: HashMap::new(),
        }
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    pub fn typed_results(&self) -> &AnResult<A::Value> {
        &self.results
    }

    fn violation(&self, function: &str, node: NodeId) -> AnalysisError {
        AnalysisError::MonotonicityViolation {
            analysis: self.analysis.name().to_string(),
            function: function.to_string(),
            node,
        }
    }

    fn input_of<'v>(&self, dfv: &'v NodeDfv<A::Value>) -> &'v A::Value {
        match self.analysis.direction() {
            Direction::Forward => &dfv.dfv_in,
            Direction::Backward => &dfv.dfv_out,
        }
    }

    fn stored_input(&self, node: NodeId) -> A::Value {
        self.results
            .get(node)
            .map(|dfv| self.input_of(dfv).clone())
            .unwrap_or_else(A::Value::top)
    }

    fn stored_output(&self, node: NodeId) -> A::Value {
        self.results
            .get(node)
            .map(|dfv| match self.analysis.direction() {
                Direction::Forward => dfv.dfv_out.clone(),
                Direction::Backward => dfv.dfv_in.clone(),
            })
            .unwrap_or_else(A::Value::top)
    }

    fn top_output(&self, input: A::Value) -> NodeDfv<A::Value> {
        match self.analysis.direction() {
            Direction::Forward => NodeDfv::new(input, A::Value::top()),
            Direction::Backward => NodeDfv::new(A::Value::top(), input),
        }
    }

    /// Stores `dfv`, keeping the input half as computed, and reports whether
    /// the stored value changed.
    fn store(&mut self, node: NodeId, mut dfv: NodeDfv<A::Value>, input: A::Value, function: &str) -> Result<ChangeResult> {
        match self.analysis.direction() {
            Direction::Forward => dfv.dfv_in = input,
            Direction::Backward => {
                dfv.dfv_out = input;
                dfv.out_true = None;
                dfv.out_false = None;
            }
        }
        let previous = self.results.get(node);
        if previous == Some(&dfv) {
            return Ok(ChangeResult::Unchanged);
        }
        if cfg!(debug_assertions) && previous.is_some_and(|old| !dfv.descends_from(old)) {
            return Err(self.violation(function, node));
        }
        self.results.insert(node, dfv);
        Ok(ChangeResult::Changed)
    }

    fn run_transfer(
        &self,
        instr: &Instr,
        input: &A::Value,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<A::Value> {
        match instr {
            Instr::Parallel(assigns) => {
                let mut merged: Option<NodeDfv<A::Value>> = None;
                for assign in assigns {
                    let single = Instr::Assign(assign.clone());
                    let dfv = self.analysis.transfer(&single, input, cx);
                    merged = Some(match merged {
                        Some(acc) => acc.meet(&dfv),
                        None => dfv,
                    });
                }
                merged.unwrap_or_else(|| NodeDfv::new(input.clone(), input.clone()))
            }
            _ => self.analysis.transfer(instr, input, cx),
        }
    }
}

impl<A: Analysis> DynAnalysis for AnalysisSlot<A> {
    fn name(&self) -> &'static str {
        self.analysis.name()
    }

    fn direction(&self) -> Direction {
        self.analysis.direction()
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        self.analysis.sims_answered()
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        self.analysis.sims_needed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compute_input(&mut self, node: NodeId, cx: &InputCtx<'_, '_>) -> Result<InputUpdate> {
        let function = cx.env.func.name();
        let forward = self.analysis.direction() == Direction::Forward;
        let boundary_node = if forward { cx.cfg.entry() } else { cx.cfg.exit() };

        let mut input = if node == boundary_node {
            cx.boundary
                .and_then(downcast_value::<A::Value>)
                .cloned()
                .unwrap_or_else(|| self.analysis.boundary_value(cx.env))
        } else {
            A::Value::top()
        };

        let neighbours = if forward {
            cx.cfg.predecessors(node)
        } else {
            cx.cfg.successors(node)
        };
        for (other, label) in neighbours {
            let edge = if forward {
                (*other, node, *label)
            } else {
                (node, *other, *label)
            };
            if cx.dead_edges.contains(&edge) {
                continue;
            }
            let Some(dfv) = self.results.get(*other) else {
                continue;
            };
            let incoming = if forward {
                dfv.edge_out(*label)
            } else {
                &dfv.dfv_in
            };
            input = checked_meet(&input, incoming)
                .ok_or_else(|| self.violation(function, node))?
                .0;
        }

        let previous = self.results.get(node).map(|dfv| self.input_of(dfv).clone());
        let mut widened = false;
        if let Some(prev) = &previous {
            let visits = self.visits.get(&node).copied().unwrap_or(0);
            if cx.env.config.widening
                && cx.loop_headers.contains(&node)
                && visits >= cx.env.config.widen_threshold
            {
                let (result, _) = input.widen(prev);
                widened = result != input;
                input = result;
            }
            if prev == &input {
                return Ok(InputUpdate {
                    changed: ChangeResult::Unchanged,
                    widened,
                });
            }
            if cfg!(debug_assertions) && input.less_eq(prev) == Some(false) {
                return Err(self.violation(function, node));
            }
        }

        let dfv = match self.results.get(node) {
            Some(existing) => {
                let mut dfv = existing.clone();
                if forward {
                    dfv.dfv_in = input;
                } else {
                    dfv.dfv_out = input;
                }
                dfv
            }
            None => self.top_output(input),
        };
        self.results.insert(node, dfv);
        Ok(InputUpdate {
            changed: ChangeResult::Changed,
            widened,
        })
    }

    fn transfer(
        &mut self,
        node: NodeId,
        instr: &Instr,
        cx: &mut TransferCtx<'_, '_>,
    ) -> Result<ChangeResult> {
        let function = cx.env.func.name();
        let input = self.stored_input(node);
        *self.visits.entry(node).or_insert(0) += 1;

        let dfv = if input.is_top() {
            NodeDfv::top()
        } else {
            self.run_transfer(instr, &input, cx)
        };
        self.store(node, dfv, input, function)
    }

    fn force_output_top(&mut self, node: NodeId) -> ChangeResult {
        let input = self.stored_input(node);
        let dfv = self.top_output(input);
        if self.results.get(node) == Some(&dfv) {
            return ChangeResult::Unchanged;
        }
        self.results.insert(node, dfv);
        ChangeResult::Changed
    }

    fn call_entry(&self, node: NodeId, env: &CallEnv<'_>) -> Box<dyn DynValue> {
        let input = self.stored_input(node);
        if input.is_top() {
            return Box::new(input);
        }
        Box::new(self.analysis.call_entry_value(&input, env))
    }

    fn apply_call(
        &mut self,
        node: NodeId,
        callee_value: Option<&dyn DynValue>,
        env: &CallEnv<'_>,
    ) -> Result<ChangeResult> {
        let input = self.stored_input(node);
        *self.visits.entry(node).or_insert(0) += 1;

        // A callee with no exit yet keeps the previous output.
        let previous = self.stored_output(node);
        let callee_value = callee_value.and_then(downcast_value::<A::Value>);
        let output = match callee_value {
            Some(value) if !input.is_top() && !value.is_top() => {
                let exit = self.analysis.call_exit_value(&input, value, env);
                previous.meet(&exit).0
            }
            _ => previous,
        };
        let dfv = match self.analysis.direction() {
            Direction::Forward => NodeDfv::new(input.clone(), output),
            Direction::Backward => NodeDfv::new(output, input.clone()),
        };
        self.store(node, dfv, input, env.caller.name())
    }

    fn answer_sim(&self, node: NodeId, query: &SimQuery, env: &AnalysisEnv<'_>) -> SimAnswer {
        let Some(dfv) = self.results.get(node) else {
            return SimAnswer::Pending;
        };
        let value = match query.kind().half() {
            Half::In => &dfv.dfv_in,
            Half::Out => &dfv.dfv_out,
        };
        self.analysis.answer_sim(query, value, env)
    }

    fn far_boundary(&self, cfg: &Cfg) -> Box<dyn DynValue> {
        let value = match self.analysis.direction() {
            Direction::Forward => self.results.out_at(cfg.exit()),
            Direction::Backward => self.results.in_at(cfg.entry()),
        };
        Box::new(value.cloned().unwrap_or_else(A::Value::top))
    }

    fn results(&self) -> &dyn ErasedResult {
        &self.results
    }
}

pub fn boxed<A: Analysis>(analysis: A) -> Box<dyn DynAnalysis> {
    Box::new(AnalysisSlot::new(analysis))
}
