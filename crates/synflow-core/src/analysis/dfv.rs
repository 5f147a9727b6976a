use super::lattice::{downcast_value, DynValue, Lattice};
use crate::cfg::{EdgeLabel, NodeId};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// IN/OUT pair of one analysis at one node. Conditional jumps may carry
/// separate values for their true and false edges.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDfv<L> {
    pub dfv_in: L,
    pub dfv_out: L,
    pub out_true: Option<L>,
    pub out_false: Option<L>,
}

impl<L: Lattice> NodeDfv<L> {
    pub fn new(dfv_in: L, dfv_out: L) -> Self {
        Self {
            dfv_in,
            dfv_out,
            out_true: None,
            out_false: None,
        }
    }

    pub fn top() -> Self {
        Self::new(L::top(), L::top())
    }

    /// Forward result of a conditional jump; the plain OUT is the meet of both edges.
    pub fn branch(dfv_in: L, out_true: L, out_false: L) -> Self {
        let dfv_out = out_true.meet(&out_false).0;
        Self {
            dfv_in,
            dfv_out,
            out_true: Some(out_true),
            out_false: Some(out_false),
        }
    }

    pub fn edge_out(&self, label: EdgeLabel) -> &L {
        match label {
            EdgeLabel::True => self.out_true.as_ref().unwrap_or(&self.dfv_out),
            EdgeLabel::False => self.out_false.as_ref().unwrap_or(&self.dfv_out),
            EdgeLabel::Uncond => &self.dfv_out,
        }
    }

    pub fn meet(&self, other: &Self) -> Self {
        let edge = |label: EdgeLabel, a: &Option<L>, b: &Option<L>| {
            if a.is_none() && b.is_none() {
                None
            } else {
                Some(self.edge_out(label).meet(other.edge_out(label)).0)
            }
        };
        Self {
            dfv_in: self.dfv_in.meet(&other.dfv_in).0,
            dfv_out: self.dfv_out.meet(&other.dfv_out).0,
            out_true: edge(EdgeLabel::True, &self.out_true, &other.out_true),
            out_false: edge(EdgeLabel::False, &self.out_false, &other.out_false),
        }
    }

    /// `false` only when some half is known to lie above its counterpart in `previous`.
    pub fn descends_from(&self, previous: &Self) -> bool {
        let pairs = [
            (&self.dfv_in, &previous.dfv_in),
            (&self.dfv_out, &previous.dfv_out),
            (
                self.edge_out(EdgeLabel::True),
                previous.edge_out(EdgeLabel::True),
            ),
            (
                self.edge_out(EdgeLabel::False),
                previous.edge_out(EdgeLabel::False),
            ),
        ];
        pairs
            .iter()
            .all(|(now, before)| now.less_eq(before) != Some(false))
    }
}

/// Results of one analysis over one function. A missing node has not been
/// reached, which is not the same as a node whose value is Top.
#[derive(Debug, Clone, PartialEq)]
pub struct AnResult<L> {
    values: BTreeMap<NodeId, NodeDfv<L>>,
}

impl<L: Lattice> AnResult<L> {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeDfv<L>> {
        self.values.get(&node)
    }

    pub fn insert(&mut self, node: NodeId, dfv: NodeDfv<L>) -> Option<NodeDfv<L>> {
        self.values.insert(node, dfv)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeDfv<L>)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn in_at(&self, node: NodeId) -> Option<&L> {
        self.get(node).map(|dfv| &dfv.dfv_in)
    }

    pub fn out_at(&self, node: NodeId) -> Option<&L> {
        self.get(node).map(|dfv| &dfv.dfv_out)
    }

    /// Node-wise meet. Nodes present on one side only keep their value.
    pub fn merge(&self, other: &Self) -> Self {
        let mut values = self.values.clone();
        for (node, dfv) in &other.values {
            let merged = match values.get(node) {
                Some(existing) => existing.meet(dfv),
                None => dfv.clone(),
            };
            values.insert(*node, merged);
        }
        Self { values }
    }
}

impl<L: Lattice> Default for AnResult<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe view of an `AnResult`.
pub trait ErasedResult: fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    fn clone_result(&self) -> Box<dyn ErasedResult>;

    /// `None` when `other` holds a different lattice.
    fn merged(&self, other: &dyn ErasedResult) -> Option<Box<dyn ErasedResult>>;

    fn dyn_eq(&self, other: &dyn ErasedResult) -> bool;

    fn nodes(&self) -> Vec<NodeId>;

    /// Rendered IN and OUT at a node.
    fn describe(&self, node: NodeId) -> Option<(String, String)>;

    /// Some half at `node` carries information.
    fn reached(&self, node: NodeId) -> bool;
}

impl<L: Lattice> ErasedResult for AnResult<L> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_result(&self) -> Box<dyn ErasedResult> {
        Box::new(self.clone())
    }

    fn merged(&self, other: &dyn ErasedResult) -> Option<Box<dyn ErasedResult>> {
        let other = other.as_any().downcast_ref::<AnResult<L>>()?;
        Some(Box::new(self.merge(other)))
    }

    fn dyn_eq(&self, other: &dyn ErasedResult) -> bool {
        other.as_any().downcast_ref::<AnResult<L>>() == Some(self)
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.values.keys().copied().collect()
    }

    fn describe(&self, node: NodeId) -> Option<(String, String)> {
        self.get(node)
            .map(|dfv| (dfv.dfv_in.to_string(), dfv.dfv_out.to_string()))
    }

    fn reached(&self, node: NodeId) -> bool {
        self.get(node)
            .is_some_and(|dfv| !(dfv.dfv_in.is_top() && dfv.dfv_out.is_top()))
    }
}

pub fn downcast_result<L: Lattice>(result: &dyn ErasedResult) -> Option<&AnResult<L>> {
    result.as_any().downcast_ref::<AnResult<L>>()
}

impl Clone for Box<dyn ErasedResult> {
    fn clone(&self) -> Self {
        self.clone_result()
    }
}

impl PartialEq for Box<dyn ErasedResult> {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other.as_ref())
    }
}

/// Snapshot of several analyses at one program point, keyed by analysis
/// name. Only the half each analysis propagates is kept. The call-string
/// depth does not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct DfvDict {
    values: BTreeMap<String, Box<dyn DynValue>>,
    depth: usize,
}

impl DfvDict {
    pub fn new(depth: usize) -> Self {
        Self {
            values: BTreeMap::new(),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn insert(&mut self, analysis: &str, value: Box<dyn DynValue>) {
        self.values.insert(analysis.to_string(), value);
    }

    pub fn get(&self, analysis: &str) -> Option<&dyn DynValue> {
        self.values.get(analysis).map(|v| v.as_ref())
    }

    pub fn get_typed<L: Lattice>(&self, analysis: &str) -> Option<&L> {
        self.get(analysis).and_then(downcast_value::<L>)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn zip_with(
        &self,
        other: &DfvDict,
        f: impl Fn(&dyn DynValue, &dyn DynValue) -> Option<Box<dyn DynValue>>,
    ) -> DfvDict {
        let mut values = BTreeMap::new();
        for (name, value) in &self.values {
            let combined = match other.values.get(name) {
                Some(theirs) => f(value.as_ref(), theirs.as_ref()).unwrap_or_else(|| value.clone()),
                None => value.clone(),
            };
            values.insert(name.clone(), combined);
        }
        for (name, value) in &other.values {
            values.entry(name.clone()).or_insert_with(|| value.clone());
        }
        DfvDict {
            values,
            depth: self.depth.min(other.depth),
        }
    }

    /// Value-wise meet.
    pub fn meet(&self, other: &DfvDict) -> DfvDict {
        self.zip_with(other, |a, b| a.dyn_meet(b))
    }

    /// Value-wise widening of `self` against `previous`.
    pub fn widen(&self, previous: &DfvDict) -> DfvDict {
        self.zip_with(previous, |current, prev| current.dyn_widen(prev))
    }
}

impl PartialEq for DfvDict {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for DfvDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}
