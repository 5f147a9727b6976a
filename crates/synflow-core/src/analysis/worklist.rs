use crate::cfg::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Pending `(node, analysis)` obligations, drained in a fixed node order
/// so runs are reproducible.
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    rank: HashMap<NodeId, usize>,
    queue: BTreeSet<(usize, NodeId)>,
    dirty: BTreeMap<NodeId, BTreeSet<usize>>,
}

impl Worklist {
    /// `order` lists every node; earlier nodes are popped first.
    pub fn new(order: &[NodeId]) -> Self {
        Self {
            rank: order.iter().enumerate().map(|(i, n)| (*n, i)).collect(),
            queue: BTreeSet::new(),
            dirty: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, node: NodeId, slot: usize) {
        let rank = self.rank.get(&node).copied().unwrap_or(usize::MAX);
        self.queue.insert((rank, node));
        self.dirty.entry(node).or_default().insert(slot);
    }

    pub fn push_all(&mut self, node: NodeId, slots: impl IntoIterator<Item = usize>) {
        for slot in slots {
            self.push(node, slot);
        }
    }

    pub fn pop(&mut self) -> Option<(NodeId, BTreeSet<usize>)> {
        let (_, node) = self.queue.pop_first()?;
        let slots = self.dirty.remove(&node).unwrap_or_default();
        Some((node, slots))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
