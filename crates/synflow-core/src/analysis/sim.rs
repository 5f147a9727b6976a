/*! Simplification queries exchanged between co-running analyses.
 *
 * An analysis that cannot decide something on its own (which variables a dereference may touch,
 * whether a branch is decided, whether an expression folds to a literal) asks the analyses that
 * advertise an answer for that kind of query. Answers from several sources are combined by
 * refinement, and an answer is only ever replaced by one that is less optimistic.
 */

use crate::cfg::NodeId;
use crate::expr::{Expr, Literal, VarName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which half of the answering analysis' value a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Half {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SimKind {
    /// Does the node become unreachable?
    NodeReachability,
    /// Is the variable assigned at this node dead afterwards?
    DeadLhs,
    /// Does a numeric binary expression reduce to a literal?
    NumBinToLit,
    /// Does a numeric variable hold a single literal?
    NumVarToLit,
    /// Does the conditional jump always take one edge?
    CondToUncond,
    /// Which variables can a dereferenced pointer designate?
    DerefToVars,
}

impl SimKind {
    pub const ALL: [SimKind; 6] = [
        SimKind::NodeReachability,
        SimKind::DeadLhs,
        SimKind::NumBinToLit,
        SimKind::NumVarToLit,
        SimKind::CondToUncond,
        SimKind::DerefToVars,
    ];

    pub fn half(self) -> Half {
        match self {
            SimKind::DeadLhs => Half::Out,
            _ => Half::In,
        }
    }
}

impl fmt::Display for SimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimKind::NodeReachability => "node-reachability",
            SimKind::DeadLhs => "dead-lhs",
            SimKind::NumBinToLit => "num-bin-to-lit",
            SimKind::NumVarToLit => "num-var-to-lit",
            SimKind::CondToUncond => "cond-to-uncond",
            SimKind::DerefToVars => "deref-to-vars",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimQuery {
    NodeReachability,
    DeadLhs(VarName),
    NumBinToLit(Expr),
    NumVarToLit(VarName),
    CondToUncond(Expr),
    DerefToVars(VarName),
}

impl SimQuery {
    pub fn kind(&self) -> SimKind {
        match self {
            SimQuery::NodeReachability => SimKind::NodeReachability,
            SimQuery::DeadLhs(_) => SimKind::DeadLhs,
            SimQuery::NumBinToLit(_) => SimKind::NumBinToLit,
            SimQuery::NumVarToLit(_) => SimKind::NumVarToLit,
            SimQuery::CondToUncond(_) => SimKind::CondToUncond,
            SimQuery::DerefToVars(_) => SimKind::DerefToVars,
        }
    }

    /// Rendered operand, part of the cache key.
    pub fn subject(&self) -> String {
        match self {
            SimQuery::NodeReachability => String::new(),
            SimQuery::DeadLhs(var) | SimQuery::NumVarToLit(var) | SimQuery::DerefToVars(var) => {
                var.clone()
            }
            SimQuery::NumBinToLit(expr) | SimQuery::CondToUncond(expr) => expr.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimValue {
    Reachable(bool),
    Dead(bool),
    Literal(Literal),
    /// The edge always taken by a conditional jump.
    Branch(bool),
    Vars(BTreeSet<VarName>),
}

impl SimValue {
    /// Combines a first answer with one from another source. Unreachability
    /// and deadness win, pointee sets intersect, and the first literal or
    /// branch stands.
    pub fn refine(&self, other: &SimValue) -> SimValue {
        match (self, other) {
            (SimValue::Reachable(a), SimValue::Reachable(b)) => SimValue::Reachable(*a && *b),
            (SimValue::Dead(a), SimValue::Dead(b)) => SimValue::Dead(*a || *b),
            (SimValue::Vars(a), SimValue::Vars(b)) => {
                SimValue::Vars(a.intersection(b).cloned().collect())
            }
            _ => self.clone(),
        }
    }
}

impl fmt::Display for SimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimValue::Reachable(r) => write!(f, "reachable={}", r),
            SimValue::Dead(d) => write!(f, "dead={}", d),
            SimValue::Literal(lit) => write!(f, "{}", lit),
            SimValue::Branch(b) => write!(f, "branch={}", b),
            SimValue::Vars(vars) => {
                let names: Vec<&str> = vars.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimAnswer {
    /// Not decidable yet; the asker proceeds optimistically and is revisited.
    Pending,
    /// Can never be answered; the asker uses its own fallback.
    Failed,
    Value(SimValue),
}

impl SimAnswer {
    pub fn value(&self) -> Option<&SimValue> {
        match self {
            SimAnswer::Value(value) => Some(value),
            _ => None,
        }
    }
}

pub trait SimResolver {
    fn simplify(&mut self, query: &SimQuery) -> SimAnswer;
}

/// Resolver that fails every query, for running a transfer function outside a host.
pub struct NoSims;

impl SimResolver for NoSims {
    fn simplify(&mut self, _query: &SimQuery) -> SimAnswer {
        SimAnswer::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSource {
    pub slot: usize,
    pub stage: usize,
}

/// Sources for each query kind, computed once per analysis set and kept in
/// sequence order.
#[derive(Debug, Clone, Default)]
pub struct SimRegistry {
    sources: BTreeMap<SimKind, Vec<SimSource>>,
    disabled: bool,
}

impl SimRegistry {
    pub fn new(disabled: bool) -> Self {
        Self {
            sources: BTreeMap::new(),
            disabled,
        }
    }

    pub fn register(&mut self, slot: usize, stage: usize, answers: &[SimKind]) {
        for kind in answers {
            self.sources
                .entry(*kind)
                .or_default()
                .push(SimSource { slot, stage });
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Sources able to answer `kind` for `asker`, limited to stages that have
    /// started. Empty means the query fails for the whole run.
    pub fn sources(&self, kind: SimKind, asker: Option<usize>, max_stage: usize) -> Vec<usize> {
        if self.disabled {
            return Vec::new();
        }
        self.sources
            .get(&kind)
            .map(|sources| {
                sources
                    .iter()
                    .filter(|s| Some(s.slot) != asker && s.stage <= max_stage)
                    .map(|s| s.slot)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn answers(&self, kind: SimKind) -> bool {
        !self.disabled && self.sources.get(&kind).is_some_and(|s| !s.is_empty())
    }
}

/// Key of one cached query: the node, the kind and the operand, scoped to
/// the stages allowed to answer and to the asking analysis, which never
/// answers its own queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimKey {
    pub node: NodeId,
    pub kind: SimKind,
    pub subject: String,
    pub stage: usize,
    pub asker: Option<usize>,
}

impl SimKey {
    pub fn new(node: NodeId, query: &SimQuery, stage: usize, asker: Option<usize>) -> Self {
        Self {
            node,
            kind: query.kind(),
            subject: query.subject(),
            stage,
            asker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refine_rules() {
        let vars = |names: &[&str]| {
            SimValue::Vars(names.iter().map(|n| n.to_string()).collect())
        };
        assert_eq!(
            SimValue::Reachable(true).refine(&SimValue::Reachable(false)),
            SimValue::Reachable(false)
        );
        assert_eq!(
            SimValue::Dead(false).refine(&SimValue::Dead(true)),
            SimValue::Dead(true)
        );
        assert_eq!(vars(&["a", "b"]).refine(&vars(&["b", "c"])), vars(&["b"]));
        assert_eq!(
            SimValue::Branch(true).refine(&SimValue::Branch(false)),
            SimValue::Branch(true)
        );
    }

    #[test]
    fn test_registry_excludes_asker_and_later_stages() {
        let mut registry = SimRegistry::new(false);
        registry.register(0, 0, &[SimKind::NumVarToLit, SimKind::CondToUncond]);
        registry.register(1, 1, &[SimKind::NumVarToLit]);
        assert_eq!(registry.sources(SimKind::NumVarToLit, Some(0), 1), vec![1]);
        assert_eq!(registry.sources(SimKind::NumVarToLit, None, 0), vec![0]);
        assert!(registry.sources(SimKind::DerefToVars, None, 1).is_empty());

        let disabled = {
            let mut r = SimRegistry::new(true);
            r.register(0, 0, &[SimKind::NumVarToLit]);
            r
        };
        assert!(disabled.sources(SimKind::NumVarToLit, None, 0).is_empty());
        assert!(!disabled.answers(SimKind::NumVarToLit));
    }
}
