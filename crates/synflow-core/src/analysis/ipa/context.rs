use crate::analysis::dfv::DfvDict;
use crate::analysis::host::Host;
use crate::cfg::NodeId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

pub type ContextId = usize;

/// One call edge: the calling function and the call node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSitePair {
    pub function: String,
    pub node: NodeId,
}

impl fmt::Display for CallSitePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.node)
    }
}

/// A function analyzed under one entry summary.
#[derive(Debug)]
pub struct ValueContext {
    pub id: ContextId,
    pub function: String,
    /// `None` for the root, which starts from the analyses' own boundary values.
    pub entry: Option<DfvDict>,
    /// Entries this context had before it was widened. Calls presenting one
    /// of them still land here.
    pub aliases: Vec<DfvDict>,
    pub exit: Option<DfvDict>,
    pub depth: usize,
    pub callers: BTreeSet<(ContextId, NodeId)>,
    pub(crate) host: Option<Host>,
    /// The entry changed since the host was built.
    pub(crate) stale: bool,
    /// Call nodes whose callee exit changed since the last run.
    pub(crate) wake: BTreeSet<NodeId>,
}

impl ValueContext {
    pub fn host(&self) -> Option<&Host> {
        self.host.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.entry.is_none()
    }

    fn accepts(&self, function: &str, entry: &DfvDict) -> bool {
        self.function == function
            && (self.entry.as_ref() == Some(entry) || self.aliases.iter().any(|a| a == entry))
    }
}

/// Owns every value context and the call edges between them.
#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: Vec<ValueContext>,
    call_targets: BTreeMap<(ContextId, NodeId), ContextId>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, function: &str, entry: Option<DfvDict>, depth: usize) -> ContextId {
        let id = self.contexts.len();
        self.contexts.push(ValueContext {
            id,
            function: function.to_string(),
            entry,
            aliases: Vec::new(),
            exit: None,
            depth,
            callers: BTreeSet::new(),
            host: None,
            stale: false,
            wake: BTreeSet::new(),
        });
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&ValueContext> {
        self.contexts.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> Option<&mut ValueContext> {
        self.contexts.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueContext> {
        self.contexts.iter()
    }

    /// Context of `function` whose entry equals `entry`, current or aliased.
    pub fn find(&self, function: &str, entry: &DfvDict) -> Option<ContextId> {
        self.contexts
            .iter()
            .find(|ctx| ctx.accepts(function, entry))
            .map(|ctx| ctx.id)
    }

    /// Nearest context of `function` among `from` and its transitive callers.
    /// The root never qualifies.
    pub fn ancestor(&self, from: ContextId, function: &str) -> Option<ContextId> {
        let mut queue = VecDeque::from([from]);
        let mut seen = BTreeSet::from([from]);
        while let Some(id) = queue.pop_front() {
            let ctx = self.contexts.get(id)?;
            if ctx.function == function && !ctx.is_root() {
                return Some(id);
            }
            for (caller, _) in &ctx.callers {
                if seen.insert(*caller) {
                    queue.push_back(*caller);
                }
            }
        }
        None
    }

    /// Points the call at `(caller, node)` to `target`, unregistering it from
    /// its previous target.
    pub fn link(&mut self, caller: ContextId, node: NodeId, target: ContextId) {
        if let Some(previous) = self.call_targets.insert((caller, node), target) {
            if previous != target {
                if let Some(ctx) = self.contexts.get_mut(previous) {
                    ctx.callers.remove(&(caller, node));
                }
            }
        }
        if let Some(ctx) = self.contexts.get_mut(target) {
            ctx.callers.insert((caller, node));
        }
    }

    pub fn target(&self, caller: ContextId, node: NodeId) -> Option<ContextId> {
        self.call_targets.get(&(caller, node)).copied()
    }

    /// Contexts reachable from `root` through call edges, `root` included.
    pub fn reachable_from(&self, root: ContextId) -> BTreeSet<ContextId> {
        let mut reached = BTreeSet::from([root]);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for ((_, _), target) in self.call_targets.range((id, NodeId(0))..=(id, NodeId(u32::MAX))) {
                if reached.insert(*target) {
                    stack.push(*target);
                }
            }
        }
        reached
    }

    /// Call edges between functions, for every linked call.
    pub fn call_edges(&self) -> BTreeMap<CallSitePair, BTreeSet<String>> {
        let mut edges: BTreeMap<CallSitePair, BTreeSet<String>> = BTreeMap::new();
        for ((caller, node), target) in &self.call_targets {
            let (Some(caller), Some(target)) = (self.get(*caller), self.get(*target)) else {
                continue;
            };
            edges
                .entry(CallSitePair {
                    function: caller.function.clone(),
                    node: *node,
                })
                .or_default()
                .insert(target.function.clone());
        }
        edges
    }
}
