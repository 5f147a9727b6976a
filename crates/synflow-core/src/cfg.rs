use crate::expr::Expr;
use crate::instructions::Instr;
use crate::{IrError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeLabel {
    True,
    False,
    Uncond,
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::True => write!(f, "T"),
            EdgeLabel::False => write!(f, "F"),
            EdgeLabel::Uncond => write!(f, "U"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: NodeId,
    pub instr: Instr,
}

/// Node-level control-flow graph: one instruction per node. The entry and
/// exit nodes are `Nop`s created with the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cfg {
    nodes: IndexMap<NodeId, CfgNode>,
    succs: BTreeMap<NodeId, Vec<(NodeId, EdgeLabel)>>,
    preds: BTreeMap<NodeId, Vec<(NodeId, EdgeLabel)>>,
    entry: NodeId,
    exit: NodeId,
    next_id: u32,
}

impl Cfg {
    pub fn new() -> Self {
        let mut cfg = Self {
            nodes: IndexMap::new(),
            succs: BTreeMap::new(),
            preds: BTreeMap::new(),
            entry: NodeId(0),
            exit: NodeId(1),
            next_id: 0,
        };
        cfg.entry = cfg.add_node(Instr::Nop);
        cfg.exit = cfg.add_node(Instr::Nop);
        cfg
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    pub fn add_node(&mut self, instr: Instr) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, CfgNode { id, instr });
        self.succs.insert(id, Vec::new());
        self.preds.insert(id, Vec::new());
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: EdgeLabel) -> Result<()> {
        if !self.nodes.contains_key(&from) {
            return Err(IrError::UnknownNode(from.0));
        }
        if !self.nodes.contains_key(&to) {
            return Err(IrError::UnknownNode(to.0));
        }
        if let Some(out) = self.succs.get_mut(&from) {
            if !out.contains(&(to, label)) {
                out.push((to, label));
            }
        }
        if let Some(inc) = self.preds.get_mut(&to) {
            if !inc.contains(&(from, label)) {
                inc.push((from, label));
            }
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(out) = self.succs.get_mut(&from) {
            out.retain(|(succ, _)| *succ != to);
        }
        if let Some(inc) = self.preds.get_mut(&to) {
            inc.retain(|(pred, _)| *pred != from);
        }
    }

    /// Inserts a node on every incoming edge of `node`.
    pub fn insert_before(&mut self, node: NodeId, instr: Instr) -> Result<NodeId> {
        let new_id = self.add_node(instr);
        let incoming = self.predecessors(node).to_vec();
        for (pred, label) in incoming {
            self.remove_edge(pred, node);
            self.add_edge(pred, new_id, label)?;
        }
        if node == self.entry {
            self.entry = new_id;
        }
        self.add_edge(new_id, node, EdgeLabel::Uncond)?;
        Ok(new_id)
    }

    /// Inserts a node on every outgoing edge of `node`. Labels of the moved
    /// edges are kept, so this is only meaningful for nodes with one successor.
    pub fn insert_after(&mut self, node: NodeId, instr: Instr) -> Result<NodeId> {
        let new_id = self.add_node(instr);
        let outgoing = self.successors(node).to_vec();
        for (succ, label) in outgoing {
            self.remove_edge(node, succ);
            self.add_edge(new_id, succ, label)?;
        }
        self.add_edge(node, new_id, EdgeLabel::Uncond)?;
        Ok(new_id)
    }

    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(&id)
    }

    pub fn instr(&self, id: NodeId) -> Option<&Instr> {
        self.nodes.get(&id).map(|n| &n.instr)
    }

    pub fn instr_mut(&mut self, id: NodeId) -> Option<&mut Instr> {
        self.nodes.get_mut(&id).map(|n| &mut n.instr)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn successors(&self, id: NodeId) -> &[(NodeId, EdgeLabel)] {
        self.succs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: NodeId) -> &[(NodeId, EdgeLabel)] {
        self.preds.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reverse post-order from the entry. Nodes unreachable from the entry
    /// follow in id order so every node gets a position.
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();

        let roots = std::iter::once(self.entry).chain(self.node_ids());
        for root in roots {
            if visited.contains(&root) {
                continue;
            }
            let mut stack = vec![(root, false)];
            while let Some((node, processed)) = stack.pop() {
                if processed {
                    postorder.push(node);
                    continue;
                }
                if !visited.insert(node) {
                    continue;
                }
                stack.push((node, true));
                for (succ, _) in self.successors(node).iter().rev() {
                    if !visited.contains(succ) {
                        stack.push((*succ, false));
                    }
                }
            }
        }

        postorder.reverse();
        postorder
    }

    /// Edges closing a cycle in a depth-first walk from the entry (and from
    /// any node the entry does not reach).
    pub fn back_edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut back_edges = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();

        let roots = std::iter::once(self.entry).chain(self.node_ids());
        for root in roots {
            if visited.contains(&root) {
                continue;
            }
            let mut stack = vec![(root, false)];
            while let Some((node, processed)) = stack.pop() {
                if processed {
                    on_stack.remove(&node);
                    continue;
                }
                if !visited.insert(node) {
                    continue;
                }
                on_stack.insert(node);
                stack.push((node, true));

                for (succ, _) in self.successors(node) {
                    if on_stack.contains(succ) {
                        back_edges.push((node, *succ));
                    } else if !visited.contains(succ) {
                        stack.push((*succ, false));
                    }
                }
            }
        }

        back_edges
    }

    /// Targets of back edges. Every cycle passes through at least one.
    pub fn loop_headers(&self) -> BTreeSet<NodeId> {
        self.back_edges().into_iter().map(|(_, header)| header).collect()
    }

    pub fn return_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| matches!(n.instr, Instr::Return(_)))
            .map(|n| n.id)
            .collect()
    }

    pub fn return_exprs(&self) -> Vec<&Expr> {
        self.nodes()
            .filter_map(|n| match &n.instr {
                Instr::Return(Some(expr)) => Some(expr),
                _ => None,
            })
            .collect()
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Cfg, [NodeId; 4]) {
        let mut cfg = Cfg::new();
        let cond = cfg.add_node(Instr::CondJump(Expr::var("f:a")));
        let left = cfg.add_node(Instr::assign(Expr::var("f:x"), Expr::int(1)));
        let right = cfg.add_node(Instr::assign(Expr::var("f:x"), Expr::int(2)));
        let join = cfg.add_node(Instr::Return(Some(Expr::var("f:x"))));
        let (entry, exit) = (cfg.entry(), cfg.exit());
        cfg.add_edge(entry, cond, EdgeLabel::Uncond).unwrap();
        cfg.add_edge(cond, left, EdgeLabel::True).unwrap();
        cfg.add_edge(cond, right, EdgeLabel::False).unwrap();
        cfg.add_edge(left, join, EdgeLabel::Uncond).unwrap();
        cfg.add_edge(right, join, EdgeLabel::Uncond).unwrap();
        cfg.add_edge(join, exit, EdgeLabel::Uncond).unwrap();
        (cfg, [cond, left, right, join])
    }

    #[test]
    fn test_reverse_postorder_visits_predecessors_first() {
        let (cfg, [cond, left, right, join]) = diamond();
        let rpo = cfg.reverse_postorder();
        let pos = |n: NodeId| rpo.iter().position(|x| *x == n).unwrap();
        assert_eq!(rpo[0], cfg.entry());
        assert!(pos(cond) < pos(left));
        assert!(pos(cond) < pos(right));
        assert!(pos(left) < pos(join));
        assert!(pos(right) < pos(join));
        assert_eq!(rpo.len(), cfg.len());
    }

    #[test]
    fn test_loop_headers() {
        let mut cfg = Cfg::new();
        let head = cfg.add_node(Instr::CondJump(Expr::var("f:i")));
        let body = cfg.add_node(Instr::assign(Expr::var("f:i"), Expr::int(0)));
        let (entry, exit) = (cfg.entry(), cfg.exit());
        cfg.add_edge(entry, head, EdgeLabel::Uncond).unwrap();
        cfg.add_edge(head, body, EdgeLabel::True).unwrap();
        cfg.add_edge(body, head, EdgeLabel::Uncond).unwrap();
        cfg.add_edge(head, exit, EdgeLabel::False).unwrap();

        assert_eq!(cfg.back_edges(), vec![(body, head)]);
        assert_eq!(cfg.loop_headers().into_iter().collect::<Vec<_>>(), vec![head]);
        assert!(diamond().0.loop_headers().is_empty());
    }

    #[test]
    fn test_insert_before_and_after() {
        let (mut cfg, [_, left, _, join]) = diamond();
        let before = cfg.insert_before(join, Instr::Nop).unwrap();
        assert_eq!(cfg.predecessors(join), &[(before, EdgeLabel::Uncond)]);
        assert_eq!(cfg.predecessors(before).len(), 2);

        let after = cfg.insert_after(left, Instr::Nop).unwrap();
        assert_eq!(cfg.successors(left), &[(after, EdgeLabel::Uncond)]);
        assert_eq!(cfg.successors(after), &[(before, EdgeLabel::Uncond)]);
    }
}
