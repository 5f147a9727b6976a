use super::sim::{Half, SimAnswer, SimKey, SimKind, SimValue};
use crate::cfg::NodeId;
use std::collections::{BTreeMap, BTreeSet};

/// Who asked a query and must be revisited when its answer changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Consumer {
    Host,
    Analysis(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimState {
    /// Some source could not decide yet. `partial` refines the answers
    /// already given, `waiting` lists the undecided sources.
    Pending {
        partial: Option<SimValue>,
        waiting: BTreeSet<usize>,
    },
    Failed,
    Resolved(SimValue),
    /// A source changed since the answer was computed.
    Invalidated,
}

#[derive(Debug, Clone)]
pub struct SimRecord {
    pub state: SimState,
    pub sources: BTreeSet<usize>,
    pub consumers: BTreeSet<Consumer>,
    /// Sources that stayed undecided through a whole pass; they are treated
    /// as failed for this query from then on.
    pub forced_failed: BTreeSet<usize>,
}

impl SimRecord {
    fn new() -> Self {
        Self {
            state: SimState::Invalidated,
            sources: BTreeSet::new(),
            consumers: BTreeSet::new(),
            forced_failed: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub invalidations: u64,
    pub forced: u64,
}

/// Per-host cache of simplification answers, keyed by node, kind and operand.
/// A `Failed` record is never dropped or overwritten.
#[derive(Debug, Clone, Default)]
pub struct SimCache {
    records: BTreeMap<SimKey, SimRecord>,
    stats: CacheStatistics,
}

impl SimCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached answer for `key`, registering `consumer` on it. Pending and
    /// invalidated records are misses.
    pub fn lookup(&mut self, key: &SimKey, consumer: Consumer) -> Option<SimAnswer> {
        let answer = self.records.get_mut(key).and_then(|record| {
            let answer = match &record.state {
                SimState::Resolved(value) => Some(SimAnswer::Value(value.clone())),
                SimState::Failed => Some(SimAnswer::Failed),
                SimState::Pending { .. } | SimState::Invalidated => None,
            };
            if answer.is_some() {
                record.consumers.insert(consumer);
            }
            answer
        });

        if answer.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        answer
    }

    pub fn forced_failed(&self, key: &SimKey) -> BTreeSet<usize> {
        self.records
            .get(key)
            .map(|record| record.forced_failed.clone())
            .unwrap_or_default()
    }

    pub fn store(
        &mut self,
        key: SimKey,
        state: SimState,
        sources: BTreeSet<usize>,
        consumer: Consumer,
    ) -> SimAnswer {
        let record = self.records.entry(key).or_insert_with(SimRecord::new);
        record.consumers.insert(consumer);
        if record.state == SimState::Failed {
            return SimAnswer::Failed;
        }
        if state == SimState::Failed {
            self.stats.failures += 1;
        }
        record.sources = sources;
        record.state = state;
        match &record.state {
            SimState::Resolved(value) => SimAnswer::Value(value.clone()),
            SimState::Failed => SimAnswer::Failed,
            SimState::Pending { .. } | SimState::Invalidated => SimAnswer::Pending,
        }
    }

    /// Marks the answers at `node` that read `half` of `slot` as stale and
    /// returns their consumers.
    pub fn invalidate_source(&mut self, node: NodeId, slot: usize, half: Half) -> BTreeSet<Consumer> {
        let start = SimKey {
            node,
            kind: SimKind::NodeReachability,
            subject: String::new(),
            stage: 0,
            asker: None,
        };
        let mut woken = BTreeSet::new();
        for (key, record) in self.records.range_mut(start..) {
            if key.node != node {
                break;
            }
            let stale = key.kind.half() == half
                && record.sources.contains(&slot)
                && !matches!(record.state, SimState::Failed | SimState::Invalidated);
            if stale {
                record.state = SimState::Invalidated;
                woken.extend(record.consumers.iter().copied());
                self.stats.invalidations += 1;
            }
        }
        woken
    }

    /// Settles every pending record: undecided sources are failed for good
    /// and the record keeps whatever the decided sources answered. Returns
    /// the consumers to revisit.
    pub fn fail_pending(&mut self) -> Vec<(NodeId, Consumer)> {
        let mut woken = Vec::new();
        for (key, record) in self.records.iter_mut() {
            let SimState::Pending { partial, waiting } = &record.state else {
                continue;
            };
            record.forced_failed.extend(waiting.iter().copied());
            record.state = match partial {
                Some(value) => SimState::Resolved(value.clone()),
                None => SimState::Failed,
            };
            self.stats.forced += 1;
            woken.extend(record.consumers.iter().map(|c| (key.node, *c)));
        }
        woken
    }

    pub fn state(&self, key: &SimKey) -> Option<&SimState> {
        self.records.get(key).map(|record| &record.state)
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| matches!(r.state, SimState::Pending { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn statistics(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.stats.hits + self.stats.misses;
        if total == 0 {
            0.0
        } else {
            self.stats.hits as f64 / total as f64
        }
    }
}
