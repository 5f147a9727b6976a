/*! Multi-analysis fixpoint solver for one function.
 *
 * The host keeps one worklist of `(node, analysis)` obligations for all co-running analyses.
 * Visiting a node recomputes the input half of every dirty analysis, runs its transfer function
 * with a resolver for simplification queries, and requeues neighbours whose inputs may have
 * changed. Answers to queries are cached per node; when a source's value at that node changes
 * the answer is dropped and whoever asked is revisited.
 *
 * Everything a consumer cannot decide yet is treated optimistically: a pending answer leaves a
 * branch edge dead or a node unreachable until it is decided, so stored values only descend.
 */

use super::cache::{Consumer, SimCache, SimState};
use super::config::HostConfig;
use super::dfv::{downcast_result, AnResult, DfvDict, ErasedResult};
use super::error::{AnalysisError, Result};
use super::interface::{
    AnalysisEnv, AnalysisSlot, CallEnv, Direction, DynAnalysis, ExprDfv, InputCtx, TransferCtx,
};
use super::lattice::Lattice;
use super::registry::{AnalysisRegistry, AnalysisSet};
use super::sim::{Half, SimAnswer, SimKey, SimQuery, SimRegistry, SimResolver, SimValue};
use super::stats::AnalysisStats;
use super::worklist::Worklist;
use crate::cfg::{Cfg, EdgeLabel, NodeId};
use crate::expr::{Expr, VarName};
use crate::function::Function;
use crate::instructions::Instr;
use crate::unit::TranslationUnit;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

type Edge = (NodeId, NodeId, EdgeLabel);

/// Decides what happens at call nodes. The plain host never expands calls;
/// the inter-procedural host hands them to its context table.
pub(crate) trait CallHandler {
    fn expands(&self, callee: &str) -> bool;

    /// Exit values of the callee for the given entry values, `None` while the
    /// callee has not produced any.
    fn on_call(&mut self, site: NodeId, callee: &str, entry: DfvDict) -> Result<Option<DfvDict>>;
}

struct NoCalls;

impl CallHandler for NoCalls {
    fn expands(&self, _callee: &str) -> bool {
        false
    }

    fn on_call(&mut self, _site: NodeId, _callee: &str, _entry: DfvDict) -> Result<Option<DfvDict>> {
        Ok(None)
    }
}

/// Immutable view shared by every step of one run.
struct Frame<'a, 'e> {
    env: &'a AnalysisEnv<'e>,
    cfg: &'a Cfg,
    loop_headers: &'a BTreeSet<NodeId>,
    boundary: Option<&'a DfvDict>,
}

/// Resolves queries on behalf of one asker at one node.
struct SimContext<'a, 'e> {
    node: NodeId,
    asker: Consumer,
    stage: usize,
    analyses: &'a [Option<Box<dyn DynAnalysis>>],
    registry: &'a SimRegistry,
    cache: &'a mut SimCache,
    stats: &'a mut AnalysisStats,
    env: &'a AnalysisEnv<'e>,
}

impl SimResolver for SimContext<'_, '_> {
    fn simplify(&mut self, query: &SimQuery) -> SimAnswer {
        self.stats.sim_queries += 1;
        let asker = match self.asker {
            Consumer::Analysis(slot) => Some(slot),
            Consumer::Host => None,
        };
        let key = SimKey::new(self.node, query, self.stage, asker);
        if let Some(answer) = self.cache.lookup(&key, self.asker) {
            self.stats.sim_hits += 1;
            trace!(node = %self.node, kind = %query.kind(), ?answer, "cached simplification");
            return answer;
        }

        let sources = self.registry.sources(query.kind(), asker, self.stage);
        let forced = self.cache.forced_failed(&key);
        let mut value: Option<SimValue> = None;
        let mut waiting = BTreeSet::new();
        for slot in &sources {
            if forced.contains(slot) {
                continue;
            }
            let Some(analysis) = self.analyses.get(*slot).and_then(Option::as_ref) else {
                continue;
            };
            match analysis.answer_sim(self.node, query, self.env) {
                SimAnswer::Pending => {
                    waiting.insert(*slot);
                }
                SimAnswer::Failed => {}
                SimAnswer::Value(answer) => {
                    value = Some(match value {
                        Some(first) => first.refine(&answer),
                        None => answer,
                    });
                }
            }
        }

        let state = if !waiting.is_empty() {
            SimState::Pending {
                partial: value,
                waiting,
            }
        } else if let Some(value) = value {
            SimState::Resolved(value)
        } else {
            self.stats.sim_failures += 1;
            SimState::Failed
        };
        let answer = self
            .cache
            .store(key, state, sources.into_iter().collect(), self.asker);
        trace!(node = %self.node, kind = %query.kind(), ?answer, "resolved simplification");
        answer
    }
}

/// Mutable solver state, split from the host so that the environment can be
/// borrowed while it changes.
struct Solver {
    analyses: Vec<Option<Box<dyn DynAnalysis>>>,
    names: Vec<&'static str>,
    stages: Vec<usize>,
    registry: SimRegistry,
    cache: SimCache,
    worklist: Worklist,
    /// Dead edges as seen by each stage.
    dead_edges: Vec<BTreeSet<Edge>>,
    stats: AnalysisStats,
    stage: usize,
    seeded: usize,
    visits: u64,
}

impl Solver {
    fn stage_count(&self) -> usize {
        self.stages.iter().max().map_or(0, |max| max + 1)
    }

    /// Analyses allowed to run in the current stage.
    fn active_slots(&self) -> Vec<usize> {
        (0..self.analyses.len())
            .filter(|slot| self.stages[*slot] <= self.stage)
            .collect()
    }

    fn slots_in_stage(&self, stage: usize) -> Vec<usize> {
        (0..self.analyses.len())
            .filter(|slot| self.stages[*slot] == stage)
            .collect()
    }

    fn direction(&self, slot: usize) -> Direction {
        self.analyses[slot]
            .as_ref()
            .map_or(Direction::Forward, |a| a.direction())
    }

    fn wake(&mut self, node: NodeId, consumer: Consumer) {
        match consumer {
            Consumer::Analysis(slot) => self.worklist.push(node, slot),
            Consumer::Host => {
                let slots = self.active_slots();
                self.worklist.push_all(node, slots);
            }
        }
    }

    fn invalidate(&mut self, node: NodeId, slot: usize, half: Half) {
        let woken = self.cache.invalidate_source(node, slot, half);
        self.stats.invalidations += woken.len() as u64;
        for consumer in woken {
            self.wake(node, consumer);
        }
    }

    /// Requeues the neighbours that read the output of `slot` at `node`.
    fn propagate(&mut self, cfg: &Cfg, node: NodeId, slot: usize) {
        let neighbours = match self.direction(slot) {
            Direction::Forward => cfg.successors(node),
            Direction::Backward => cfg.predecessors(node),
        };
        for (other, _) in neighbours {
            self.worklist.push(*other, slot);
        }
        let half = self.direction(slot).output_half();
        self.invalidate(node, slot, half);
    }

    fn host_query(&mut self, node: NodeId, query: &SimQuery, env: &AnalysisEnv<'_>) -> SimAnswer {
        let mut sims = SimContext {
            node,
            asker: Consumer::Host,
            stage: self.stage,
            analyses: &self.analyses,
            registry: &self.registry,
            cache: &mut self.cache,
            stats: &mut self.stats,
            env,
        };
        sims.simplify(query)
    }

    fn run(
        &mut self,
        frame: &Frame<'_, '_>,
        order: &[NodeId],
        handler: &mut dyn CallHandler,
    ) -> Result<()> {
        while self.seeded < self.stage_count() {
            self.stage = self.seeded;
            let slots = self.slots_in_stage(self.stage);
            for node in order {
                self.worklist.push_all(*node, slots.iter().copied());
            }
            self.seeded += 1;
            debug!(stage = self.stage, analyses = slots.len(), "starting stage");
            self.drain(frame, handler)?;
        }
        self.drain(frame, handler)
    }

    fn drain(&mut self, frame: &Frame<'_, '_>, handler: &mut dyn CallHandler) -> Result<()> {
        loop {
            while let Some((node, slots)) = self.worklist.pop() {
                self.visit(frame, node, slots, handler)?;
            }
            let woken = self.cache.fail_pending();
            if woken.is_empty() {
                return Ok(());
            }
            warn!(
                function = %frame.env.func.name(),
                records = woken.len(),
                "forcing undecided simplifications to fail"
            );
            self.stats.pending_forced += woken.len() as u64;
            for (node, consumer) in woken {
                self.wake(node, consumer);
            }
        }
    }

    fn visit(
        &mut self,
        frame: &Frame<'_, '_>,
        node: NodeId,
        slots: BTreeSet<usize>,
        handler: &mut dyn CallHandler,
    ) -> Result<()> {
        self.visits += 1;
        self.stats.node_visits += 1;
        if self.visits > frame.env.config.max_iterations {
            return Err(AnalysisError::NonTermination {
                analyses: self.names.iter().map(|n| n.to_string()).collect(),
                function: frame.env.func.name().to_string(),
                node,
                iterations: self.visits,
            });
        }
        let Some(instr) = frame.cfg.instr(node) else {
            return Ok(());
        };
        let slots: Vec<usize> = slots
            .into_iter()
            .filter(|slot| self.stages[*slot] <= self.stage)
            .collect();
        debug!(%node, ?slots, "visiting node");

        for slot in &slots {
            let Some(analysis) = self.analyses[*slot].as_mut() else {
                continue;
            };
            let boundary = frame.boundary.and_then(|dict| dict.get(analysis.name()));
            let cx = InputCtx {
                env: frame.env,
                cfg: frame.cfg,
                dead_edges: &self.dead_edges[self.stages[*slot]],
                loop_headers: frame.loop_headers,
                boundary,
            };
            let update = analysis.compute_input(node, &cx)?;
            let half = analysis.direction().input_half();
            if update.widened {
                self.stats.widenings += 1;
            }
            if update.changed.is_changed() {
                self.invalidate(node, *slot, half);
            }
        }

        match instr.direct_callee() {
            Some(callee) if handler.expands(callee) => {
                self.visit_call(frame, node, callee, handler)?;
            }
            _ => self.transfer_all(frame, node, instr, &slots)?,
        }

        if let Instr::CondJump(cond) = instr {
            self.update_edges(frame, node, cond);
        }
        Ok(())
    }

    fn transfer_all(
        &mut self,
        frame: &Frame<'_, '_>,
        node: NodeId,
        instr: &Instr,
        slots: &[usize],
    ) -> Result<()> {
        let unreachable = matches!(
            self.host_query(node, &SimQuery::NodeReachability, frame.env),
            SimAnswer::Pending | SimAnswer::Value(SimValue::Reachable(false))
        );

        for slot in slots {
            let Some(mut analysis) = self.analyses[*slot].take() else {
                continue;
            };
            let result = if unreachable && analysis.direction() == Direction::Forward {
                Ok(analysis.force_output_top(node))
            } else {
                let mut sims = SimContext {
                    node,
                    asker: Consumer::Analysis(*slot),
                    stage: self.stages[*slot],
                    analyses: &self.analyses,
                    registry: &self.registry,
                    cache: &mut self.cache,
                    stats: &mut self.stats,
                    env: frame.env,
                };
                let mut cx = TransferCtx::new(node, frame.env, &mut sims);
                analysis.transfer(node, instr, &mut cx)
            };
            self.analyses[*slot] = Some(analysis);
            self.stats.transfers += 1;
            if result?.is_changed() {
                self.propagate(frame.cfg, node, *slot);
            }
        }
        Ok(())
    }

    fn visit_call(
        &mut self,
        frame: &Frame<'_, '_>,
        node: NodeId,
        callee_name: &str,
        handler: &mut dyn CallHandler,
    ) -> Result<()> {
        let unit = frame.env.unit;
        let callee = unit
            .function(callee_name)
            .ok_or_else(|| AnalysisError::UnknownFunction(callee_name.to_string()))?;
        let call_env = CallEnv {
            unit,
            caller: frame.env.func,
            callee,
            address_taken: frame.env.address_taken,
            local_init: frame.env.config.local_init,
        };

        let slots = self.active_slots();
        let mut entry = DfvDict::new(0);
        let mut reached = true;
        for slot in &slots {
            if let Some(analysis) = self.analyses[*slot].as_ref() {
                let value = analysis.call_entry(node, &call_env);
                reached &= !value.dyn_is_top();
                entry.insert(analysis.name(), value);
            }
        }

        let exit = if reached {
            self.stats.calls_resolved += 1;
            handler.on_call(node, callee_name, entry)?
        } else {
            None
        };

        for slot in slots {
            let Some(analysis) = self.analyses[slot].as_mut() else {
                continue;
            };
            let callee_value = exit.as_ref().and_then(|dict| dict.get(analysis.name()));
            self.stats.transfers += 1;
            if analysis.apply_call(node, callee_value, &call_env)?.is_changed() {
                self.propagate(frame.cfg, node, slot);
            }
        }
        Ok(())
    }

    /// Revives the edges of a conditional jump that simplification cannot
    /// prove dead. Edges start dead and never die again once revived.
    fn update_edges(&mut self, frame: &Frame<'_, '_>, node: NodeId, cond: &Expr) {
        let answer = self.host_query(node, &SimQuery::CondToUncond(cond.clone()), frame.env);
        let stage = self.stage;
        let mut revived = Vec::new();
        for (succ, label) in frame.cfg.successors(node) {
            let stays_dead = match (&answer, label) {
                (SimAnswer::Pending, _) => true,
                (SimAnswer::Value(SimValue::Branch(taken)), EdgeLabel::True) => !taken,
                (SimAnswer::Value(SimValue::Branch(taken)), EdgeLabel::False) => *taken,
                _ => false,
            };
            let edge = (node, *succ, *label);
            if !stays_dead && self.dead_edges[stage].remove(&edge) {
                revived.push(*succ);
            }
        }
        if revived.is_empty() {
            return;
        }
        debug!(%node, ?revived, "edges revived");
        for slot in self.active_slots() {
            match self.direction(slot) {
                Direction::Forward => {
                    for succ in &revived {
                        self.worklist.push(*succ, slot);
                    }
                }
                Direction::Backward => self.worklist.push(node, slot),
            }
        }
    }
}

pub struct Host {
    unit: Arc<TranslationUnit>,
    function: String,
    config: HostConfig,
    address_taken: BTreeSet<VarName>,
    boundary: Option<DfvDict>,
    order: Vec<NodeId>,
    loop_headers: BTreeSet<NodeId>,
    solver: Solver,
}

impl Host {
    pub fn new(
        unit: Arc<TranslationUnit>,
        function: &str,
        set: &AnalysisSet,
        registry: &AnalysisRegistry,
        config: HostConfig,
    ) -> Result<Self> {
        let (analyses, stages) = set.instantiate(registry, config.max_analyses)?;
        Self::from_analyses(unit, function, analyses, stages, config)
    }

    /// Host over already instantiated analyses; `stages[i]` is the stage of
    /// `analyses[i]`.
    pub fn from_analyses(
        unit: Arc<TranslationUnit>,
        function: &str,
        analyses: Vec<Box<dyn DynAnalysis>>,
        stages: Vec<usize>,
        config: HostConfig,
    ) -> Result<Self> {
        if analyses.len() > config.max_analyses {
            return Err(AnalysisError::TooManyAnalyses {
                requested: analyses.len(),
                max: config.max_analyses,
            });
        }
        if stages.len() != analyses.len() {
            return Err(AnalysisError::MalformedSequence(format!(
                "{} stages for {} analyses",
                stages.len(),
                analyses.len()
            )));
        }
        let func = unit
            .function(function)
            .ok_or_else(|| AnalysisError::UnknownFunction(function.to_string()))?;
        let cfg = func
            .body
            .as_ref()
            .ok_or_else(|| AnalysisError::MissingBody(function.to_string()))?;

        let mut registry = SimRegistry::new(config.disable_sims);
        for (slot, analysis) in analyses.iter().enumerate() {
            registry.register(slot, stages[slot], analysis.sims_answered());
        }

        let cond_edges: BTreeSet<Edge> = cfg
            .nodes()
            .filter(|n| n.instr.is_cond_jump())
            .flat_map(|n| {
                cfg.successors(n.id)
                    .iter()
                    .filter(|(_, label)| *label != EdgeLabel::Uncond)
                    .map(move |(succ, label)| (n.id, *succ, *label))
            })
            .collect();
        let stage_count = stages.iter().max().map_or(0, |max| max + 1);
        let order = cfg.reverse_postorder();
        let names = analyses.iter().map(|a| a.name()).collect();

        let solver = Solver {
            analyses: analyses.into_iter().map(Some).collect(),
            names,
            stages,
            registry,
            cache: SimCache::new(),
            worklist: Worklist::new(&order),
            dead_edges: vec![cond_edges; stage_count],
            stats: AnalysisStats::default(),
            stage: 0,
            seeded: 0,
            visits: 0,
        };

        Ok(Self {
            address_taken: unit.address_taken(),
            loop_headers: cfg.loop_headers(),
            order,
            function: function.to_string(),
            boundary: None,
            config,
            unit,
            solver,
        })
    }

    /// Replaces the analyses' own boundary values with the ones in `dict`.
    pub fn with_boundary(mut self, dict: DfvDict) -> Self {
        self.boundary = Some(dict);
        self
    }

    pub fn analyze(&mut self) -> Result<()> {
        self.run(&mut NoCalls)
    }

    pub(crate) fn run(&mut self, handler: &mut dyn CallHandler) -> Result<()> {
        let Host {
            unit,
            function,
            config,
            address_taken,
            boundary,
            order,
            loop_headers,
            solver,
        } = self;
        let unit: &TranslationUnit = unit;
        let func = function_body(unit, function)?;
        let cfg = func
            .body
            .as_ref()
            .ok_or_else(|| AnalysisError::MissingBody(function.clone()))?;
        let env = AnalysisEnv {
            unit,
            func,
            config: &*config,
            address_taken: &*address_taken,
        };
        let frame = Frame {
            env: &env,
            cfg,
            loop_headers: &*loop_headers,
            boundary: boundary.as_ref(),
        };

        info!(
            function = %function,
            analyses = ?solver.names,
            nodes = cfg.len(),
            "analysis started"
        );
        let visits_before = solver.visits;
        solver.run(&frame, order.as_slice(), handler)?;
        info!(
            function = %function,
            visits = solver.visits - visits_before,
            pending = solver.cache.pending_count(),
            "analysis finished"
        );
        Ok(())
    }

    /// Requeues `node` for every analysis; the next run revisits it.
    pub(crate) fn wake(&mut self, node: NodeId) {
        self.solver.wake(node, Consumer::Host);
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn unit(&self) -> &Arc<TranslationUnit> {
        &self.unit
    }

    pub fn analysis_names(&self) -> &[&'static str] {
        &self.solver.names
    }

    fn slot(&self, name: &str) -> Result<&dyn DynAnalysis> {
        self.solver
            .analyses
            .iter()
            .flatten()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
            .ok_or_else(|| AnalysisError::NotRequested(name.to_string()))
    }

    pub fn get_analysis_results(&self, name: &str) -> Result<&dyn ErasedResult> {
        Ok(self.slot(name)?.results())
    }

    pub fn results<L: Lattice>(&self, name: &str) -> Result<&AnResult<L>> {
        downcast_result::<L>(self.get_analysis_results(name)?)
            .ok_or_else(|| AnalysisError::NotRequested(name.to_string()))
    }

    /// Value of `expr` before `node` executes, as seen by the analysis
    /// registered under `name`. `None` when the node was not reached.
    pub fn get_expr_dfv<A: ExprDfv>(
        &self,
        name: &str,
        node: NodeId,
        expr: &Expr,
    ) -> Result<Option<A::Component>> {
        let slot = self
            .slot(name)?
            .as_any()
            .downcast_ref::<AnalysisSlot<A>>()
            .ok_or_else(|| AnalysisError::NotRequested(name.to_string()))?;
        Ok(slot
            .typed_results()
            .in_at(node)
            .map(|value| slot.analysis().expr_dfv(expr, value)))
    }

    /// Far boundary value of every analysis: OUT of the exit node for
    /// forward analyses, IN of the entry node for backward ones.
    pub fn boundary_dict(&self) -> Result<DfvDict> {
        let func = function_body(&self.unit, &self.function)?;
        let cfg = func
            .body
            .as_ref()
            .ok_or_else(|| AnalysisError::MissingBody(self.function.clone()))?;
        let mut dict = DfvDict::new(0);
        for analysis in self.solver.analyses.iter().flatten() {
            dict.insert(analysis.name(), analysis.far_boundary(cfg));
        }
        Ok(dict)
    }

    /// Whether the edge is live for the last stage.
    pub fn is_edge_live(&self, from: NodeId, to: NodeId, label: EdgeLabel) -> bool {
        self.solver
            .dead_edges
            .last()
            .map_or(true, |dead| !dead.contains(&(from, to, label)))
    }

    pub fn sim_cache(&self) -> &SimCache {
        &self.solver.cache
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.solver.stats
    }
}

fn function_body<'a>(unit: &'a TranslationUnit, name: &str) -> Result<&'a Function> {
    unit.function(name)
        .ok_or_else(|| AnalysisError::UnknownFunction(name.to_string()))
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("function", &self.function)
            .field("analyses", &self.solver.names)
            .field("stats", &self.solver.stats)
            .finish()
    }
}
