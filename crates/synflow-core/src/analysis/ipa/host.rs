use super::context::{ContextId, ContextTable, ValueContext};
use super::splice::splice_calls;
use crate::analysis::config::IpaConfig;
use crate::analysis::dfv::{downcast_result, AnResult, DfvDict, ErasedResult};
use crate::analysis::error::{AnalysisError, Result};
use crate::analysis::host::{CallHandler, Host};
use crate::analysis::lattice::Lattice;
use crate::analysis::registry::{AnalysisRegistry, AnalysisSet};
use crate::analysis::stats::AnalysisStats;
use crate::cfg::NodeId;
use crate::unit::TranslationUnit;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per function and analysis, results met over every context reachable
/// from the root.
#[derive(Debug, Clone, Default)]
pub struct IpaResults {
    functions: BTreeMap<String, BTreeMap<String, Box<dyn ErasedResult>>>,
    stats: AnalysisStats,
}

impl IpaResults {
    pub fn get(&self, function: &str, analysis: &str) -> Option<&dyn ErasedResult> {
        self.functions
            .get(function)
            .and_then(|results| results.get(analysis))
            .map(|r| r.as_ref())
    }

    pub fn results<L: Lattice>(&self, function: &str, analysis: &str) -> Option<&AnResult<L>> {
        self.get(function, analysis).and_then(downcast_result::<L>)
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn analyses(&self, function: &str) -> impl Iterator<Item = &str> {
        self.functions
            .get(function)
            .into_iter()
            .flat_map(|results| results.keys().map(String::as_str))
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.stats
    }
}

/// Connects a running context host to the context table.
struct CallBridge<'a> {
    table: &'a mut ContextTable,
    current: ContextId,
    unit: &'a TranslationUnit,
    config: &'a IpaConfig,
    stats: &'a mut AnalysisStats,
    scheduled: Vec<ContextId>,
}

impl CallBridge<'_> {
    fn create(&mut self, callee: &str, entry: DfvDict, depth: usize) -> ContextId {
        let id = self.table.create(callee, Some(entry), depth);
        self.stats.contexts_created += 1;
        self.scheduled.push(id);
        debug!(context = id, callee, depth, "created value context");
        id
    }

    /// Folds `entry` into the entry of `target`. A changed entry invalidates
    /// the context's host.
    fn widen_into(&mut self, target: ContextId, entry: &DfvDict) {
        let widen = self.config.widen_contexts;
        let Some(ctx) = self.table.get_mut(target) else {
            return;
        };
        let Some(old) = ctx.entry.clone() else {
            return;
        };
        let met = old.meet(entry);
        let new = if widen { met.widen(&old) } else { met };
        if new == old {
            return;
        }
        debug!(context = target, function = %ctx.function, "widened value context");
        let depth = old.depth();
        ctx.aliases.push(old);
        ctx.entry = Some(new.with_depth(depth));
        ctx.stale = true;
        self.stats.contexts_widened += 1;
        self.scheduled.push(target);
    }
}

impl CallHandler for CallBridge<'_> {
    fn expands(&self, callee: &str) -> bool {
        self.unit
            .function(callee)
            .is_some_and(|f| f.is_defined() && !f.is_variadic())
    }

    fn on_call(&mut self, site: NodeId, callee: &str, entry: DfvDict) -> Result<Option<DfvDict>> {
        let depth = self.table.get(self.current).map_or(0, |ctx| ctx.depth) + 1;
        let entry = entry.with_depth(depth);

        let target = if let Some(found) = self.table.find(callee, &entry) {
            self.stats.contexts_reused += 1;
            found
        } else if depth > self.config.max_call_depth {
            match self.table.ancestor(self.current, callee) {
                Some(ancestor) => {
                    self.widen_into(ancestor, &entry);
                    ancestor
                }
                None => self.create(callee, entry, depth),
            }
        } else {
            self.create(callee, entry, depth)
        };

        self.table.link(self.current, site, target);
        Ok(self.table.get(target).and_then(|ctx| ctx.exit.clone()))
    }
}

/// Whole-unit analysis with value contexts. Calls to defined functions are
/// analyzed once per distinct entry summary; deeper call strings fold into an
/// ancestor context of the same function.
pub struct IpaHost {
    unit: Arc<TranslationUnit>,
    root: String,
    analyses: Vec<String>,
    registry: AnalysisRegistry,
    config: IpaConfig,
    table: ContextTable,
    queue: VecDeque<ContextId>,
    queued: BTreeSet<ContextId>,
    stats: AnalysisStats,
    /// Statistics of hosts that were rebuilt.
    retired: AnalysisStats,
}

impl IpaHost {
    pub fn new(
        mut unit: TranslationUnit,
        root: &str,
        set: &AnalysisSet,
        registry: &AnalysisRegistry,
        config: IpaConfig,
    ) -> Result<Self> {
        let root_fn = unit
            .function(root)
            .ok_or_else(|| AnalysisError::UnknownFunction(root.to_string()))?;
        if !root_fn.is_defined() {
            return Err(AnalysisError::MissingBody(root.to_string()));
        }

        let sequence = set.resolve(config.host.max_analyses)?;
        if sequence.is_cascaded() {
            warn!(
                stages = sequence.stages().len(),
                "cascaded sequence runs simultaneously across calls"
            );
        }
        let analyses: Vec<String> = sequence.names().map(str::to_string).collect();
        for name in &analyses {
            if !registry.contains(name) {
                return Err(AnalysisError::UnknownAnalysis(name.clone()));
            }
        }

        let spliced = splice_calls(&mut unit)?;
        debug!(calls = spliced.len(), "spliced call sites");

        Ok(Self {
            unit: Arc::new(unit),
            root: root.to_string(),
            analyses,
            registry: registry.clone(),
            config,
            table: ContextTable::new(),
            queue: VecDeque::new(),
            queued: BTreeSet::new(),
            stats: AnalysisStats::default(),
            retired: AnalysisStats::default(),
        })
    }

    /// The unit after call splicing.
    pub fn unit(&self) -> &Arc<TranslationUnit> {
        &self.unit
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.table
    }

    fn schedule(&mut self, id: ContextId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    fn build_host(&self, ctx: &ValueContext) -> Result<Host> {
        let analyses = self
            .analyses
            .iter()
            .map(|name| self.registry.create(name))
            .collect::<Result<Vec<_>>>()?;
        let stages = vec![0; analyses.len()];
        let host = Host::from_analyses(
            Arc::clone(&self.unit),
            &ctx.function,
            analyses,
            stages,
            self.config.host.clone(),
        )?;
        Ok(match &ctx.entry {
            Some(entry) => host.with_boundary(entry.clone()),
            None => host,
        })
    }

    /// Host for the next run of `id`: the previous one with the changed call
    /// nodes requeued, or a fresh one.
    fn take_host(&mut self, id: ContextId) -> Result<Host> {
        let reuse = self.config.reuse_hosts;
        let ctx = self
            .table
            .get_mut(id)
            .ok_or_else(|| AnalysisError::UnknownFunction(format!("context {}", id)))?;
        let wake = std::mem::take(&mut ctx.wake);
        let previous = ctx.host.take();
        let stale = std::mem::replace(&mut ctx.stale, false);

        match previous {
            Some(mut host) if reuse && !stale => {
                for node in wake {
                    host.wake(node);
                }
                Ok(host)
            }
            previous => {
                if let Some(old) = previous {
                    self.retired.merge(old.stats());
                }
                let ctx = self
                    .table
                    .get(id)
                    .ok_or_else(|| AnalysisError::UnknownFunction(format!("context {}", id)))?;
                self.build_host(ctx)
            }
        }
    }

    pub fn analyze(&mut self) -> Result<IpaResults> {
        let found = self.table.iter().find(|ctx| ctx.is_root()).map(|ctx| ctx.id);
        let root = match found {
            Some(id) => id,
            None => self.table.create(&self.root, None, 0),
        };
        self.schedule(root);
        info!(root = %self.root, analyses = ?self.analyses, "inter-procedural analysis started");

        let mut visits = 0u64;
        while let Some(id) = self.queue.pop_front() {
            self.queued.remove(&id);
            visits += 1;
            if visits > self.config.max_context_visits {
                let function = self
                    .table
                    .get(id)
                    .map(|ctx| ctx.function.clone())
                    .unwrap_or_default();
                let node = self
                    .unit
                    .function(&function)
                    .and_then(|f| f.body.as_ref())
                    .map_or(NodeId(0), |cfg| cfg.entry());
                return Err(AnalysisError::NonTermination {
                    analyses: self.analyses.clone(),
                    function,
                    node,
                    iterations: visits,
                });
            }

            let mut host = self.take_host(id)?;
            let mut bridge = CallBridge {
                table: &mut self.table,
                current: id,
                unit: &self.unit,
                config: &self.config,
                stats: &mut self.stats,
                scheduled: Vec::new(),
            };
            host.run(&mut bridge)?;
            let scheduled = bridge.scheduled;
            let exit = host.boundary_dict()?;

            let ctx = self
                .table
                .get_mut(id)
                .ok_or_else(|| AnalysisError::UnknownFunction(format!("context {}", id)))?;
            let mut callers = BTreeSet::new();
            if ctx.stale {
                self.retired.merge(host.stats());
            } else {
                if ctx.exit.as_ref() != Some(&exit) {
                    ctx.exit = Some(exit);
                    callers = ctx.callers.clone();
                }
                ctx.host = Some(host);
            }

            for target in scheduled {
                self.schedule(target);
            }
            for (caller, node) in callers {
                if let Some(ctx) = self.table.get_mut(caller) {
                    ctx.wake.insert(node);
                }
                self.schedule(caller);
            }
        }

        let results = self.collect(root);
        info!(
            contexts = self.table.len(),
            functions = results.functions.len(),
            "inter-procedural analysis finished"
        );
        Ok(results)
    }

    fn collect(&self, root: ContextId) -> IpaResults {
        let mut stats = self.retired.clone();
        stats.merge(&self.stats);
        let mut functions: BTreeMap<String, BTreeMap<String, Box<dyn ErasedResult>>> =
            BTreeMap::new();

        for id in self.table.reachable_from(root) {
            let Some(ctx) = self.table.get(id) else { continue };
            let Some(host) = ctx.host() else { continue };
            stats.merge(host.stats());
            let per_function = functions.entry(ctx.function.clone()).or_default();
            for name in &self.analyses {
                let Ok(result) = host.get_analysis_results(name) else {
                    continue;
                };
                let merged = match per_function.get(name) {
                    Some(existing) => existing.merged(result),
                    None => Some(result.clone_result()),
                };
                if let Some(merged) = merged {
                    per_function.insert(name.clone(), merged);
                }
            }
        }

        IpaResults { functions, stats }
    }

    /// Contexts of `function` reachable from the root, each with its own host.
    pub fn context_results(&self, function: &str) -> Vec<&ValueContext> {
        let Some(root) = self.table.iter().find(|ctx| ctx.is_root()) else {
            return Vec::new();
        };
        self.table
            .reachable_from(root.id)
            .into_iter()
            .filter_map(|id| self.table.get(id))
            .filter(|ctx| ctx.function == function)
            .collect()
    }
}
