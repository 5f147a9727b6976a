use super::error::Result;
use serde::{Deserialize, Serialize};

/// Initial approximation of locals that are not parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocalInit {
    /// Uninitialized locals carry no information.
    #[default]
    Top,
    /// Uninitialized locals may hold anything.
    Conservative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Node visits before the run is aborted as non-terminating.
    pub max_iterations: u64,
    pub max_analyses: usize,
    pub widening: bool,
    /// Visits of a loop header before widening kicks in.
    pub widen_threshold: u32,
    /// Every simplification query fails immediately.
    pub disable_sims: bool,
    pub local_init: LocalInit,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200_000,
            max_analyses: 8,
            widening: true,
            widen_threshold: 3,
            disable_sims: false,
            local_init: LocalInit::Top,
        }
    }
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpaConfig {
    pub host: HostConfig,
    /// Call-string depth beyond which calls reuse an ancestor context.
    pub max_call_depth: usize,
    pub widen_contexts: bool,
    /// Resume a context's previous host instead of rebuilding it.
    pub reuse_hosts: bool,
    pub max_context_visits: u64,
}

impl Default for IpaConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            max_call_depth: 8,
            widen_contexts: true,
            reuse_hosts: true,
            max_context_visits: 10_000,
        }
    }
}

impl IpaConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::error::AnalysisError;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = IpaConfig::from_json(
            r#"{ "max_call_depth": 2, "host": { "disable_sims": true, "local_init": "conservative" } }"#,
        )
        .unwrap();
        assert_eq!(config.max_call_depth, 2);
        assert!(config.host.disable_sims);
        assert_eq!(config.host.local_init, LocalInit::Conservative);
        assert_eq!(config.host.max_iterations, 200_000);
        assert!(config.reuse_hosts);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            HostConfig::from_json("{ \"widening\": 3 }"),
            Err(AnalysisError::Config(_))
        ));
    }
}
