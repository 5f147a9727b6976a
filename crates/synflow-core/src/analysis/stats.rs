use serde::{Deserialize, Serialize};

/// Counters for one run. Owned by the host that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub node_visits: u64,
    pub transfers: u64,
    pub widenings: u64,
    pub sim_queries: u64,
    pub sim_hits: u64,
    pub sim_failures: u64,
    pub pending_forced: u64,
    pub invalidations: u64,
    pub calls_resolved: u64,
    pub contexts_created: u64,
    pub contexts_reused: u64,
    pub contexts_widened: u64,
}

impl AnalysisStats {
    pub fn merge(&mut self, other: &AnalysisStats) {
        self.node_visits += other.node_visits;
        self.transfers += other.transfers;
        self.widenings += other.widenings;
        self.sim_queries += other.sim_queries;
        self.sim_hits += other.sim_hits;
        self.sim_failures += other.sim_failures;
        self.pending_forced += other.pending_forced;
        self.invalidations += other.invalidations;
        self.calls_resolved += other.calls_resolved;
        self.contexts_created += other.contexts_created;
        self.contexts_reused += other.contexts_reused;
        self.contexts_widened += other.contexts_widened;
    }

    pub fn sim_hit_rate(&self) -> f64 {
        if self.sim_queries == 0 {
            0.0
        } else {
            self.sim_hits as f64 / self.sim_queries as f64
        }
    }
}
