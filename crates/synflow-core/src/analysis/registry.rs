use super::error::{AnalysisError, Result};
use super::interface::DynAnalysis;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

pub type AnalysisFactory = fn() -> Box<dyn DynAnalysis>;

/// Static table from analysis names to constructors.
#[derive(Clone, Default)]
pub struct AnalysisRegistry {
    factories: IndexMap<String, AnalysisFactory>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: AnalysisFactory) -> &mut Self {
        self.factories.insert(name.to_string(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DynAnalysis>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AnalysisError::UnknownAnalysis(name.to_string()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("analyses", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Execution order of a set of analyses. Analyses in one stage run
/// simultaneously; stages run one after the other, each to its own fixpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSequence {
    stages: Vec<Vec<String>>,
}

impl AnalysisSequence {
    pub fn simultaneous<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            stages: vec![names.into_iter().map(Into::into).collect()],
        }
    }

    pub fn cascaded<S: Into<String>>(stages: impl IntoIterator<Item = Vec<S>>) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|stage| stage.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    pub fn is_cascaded(&self) -> bool {
        self.stages.len() > 1
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All analyses in a single stage, keeping their order.
    pub fn flatten(&self) -> Self {
        Self::simultaneous(self.names().map(str::to_string).collect::<Vec<_>>())
    }
}

/// A primary analysis, the auxiliaries that run in synergy with it, and an
/// optional explicit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSet {
    primary: String,
    auxiliaries: Vec<String>,
    sequence: Option<AnalysisSequence>,
}

impl AnalysisSet {
    pub fn new(primary: &str) -> Self {
        Self {
            primary: primary.to_string(),
            auxiliaries: Vec::new(),
            sequence: None,
        }
    }

    pub fn with(mut self, auxiliary: &str) -> Self {
        if auxiliary != self.primary && !self.auxiliaries.iter().any(|a| a == auxiliary) {
            self.auxiliaries.push(auxiliary.to_string());
        }
        self
    }

    pub fn with_sequence(mut self, sequence: AnalysisSequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn auxiliaries(&self) -> &[String] {
        &self.auxiliaries
    }

    /// Checks the set and returns the order to run it in. Without an explicit
    /// sequence everything runs simultaneously, primary first.
    pub fn resolve(&self, max_analyses: usize) -> Result<AnalysisSequence> {
        let sequence = match &self.sequence {
            Some(sequence) => {
                self.validate(sequence)?;
                sequence.clone()
            }
            None => {
                let mut names = vec![self.primary.clone()];
                names.extend(self.auxiliaries.iter().cloned());
                AnalysisSequence::simultaneous(names)
            }
        };

        if sequence.len() > max_analyses {
            return Err(AnalysisError::TooManyAnalyses {
                requested: sequence.len(),
                max: max_analyses,
            });
        }
        Ok(sequence)
    }

    fn validate(&self, sequence: &AnalysisSequence) -> Result<()> {
        if sequence.stages().iter().any(Vec::is_empty) {
            return Err(AnalysisError::MalformedSequence("empty stage".to_string()));
        }
        let mut seen = BTreeSet::new();
        for name in sequence.names() {
            if !seen.insert(name) {
                return Err(AnalysisError::MalformedSequence(format!(
                    "{} appears more than once",
                    name
                )));
            }
        }
        let requested = std::iter::once(&self.primary).chain(self.auxiliaries.iter());
        for name in requested {
            if !seen.contains(name.as_str()) {
                return Err(AnalysisError::MalformedSequence(format!(
                    "{} is missing from the sequence",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Instantiates every analysis of the resolved sequence. Returns the
    /// analyses in sequence order and the stage of each.
    pub fn instantiate(
        &self,
        registry: &AnalysisRegistry,
        max_analyses: usize,
    ) -> Result<(Vec<Box<dyn DynAnalysis>>, Vec<usize>)> {
        let sequence = self.resolve(max_analyses)?;
        let mut analyses = Vec::with_capacity(sequence.len());
        let mut stages = Vec::with_capacity(sequence.len());
        for (stage, names) in sequence.stages().iter().enumerate() {
            for name in names {
                analyses.push(registry.create(name)?);
                stages.push(stage);
            }
        }
        debug!(
            primary = %self.primary,
            analyses = sequence.len(),
            stages = sequence.stages().len(),
            "instantiated analysis set"
        );
        Ok((analyses, stages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dfv::NodeDfv;
    use crate::analysis::interface::{boxed, Analysis, AnalysisEnv, TransferCtx};
    use crate::analysis::lattice::{Flat, VarMap};
    use crate::instructions::Instr;

    struct Noop;

    impl Analysis for Noop {
        type Value = VarMap<Flat<i64>>;

        fn name(&self) -> &'static str {
            "noop"
        }

        fn boundary_value(&self, _env: &AnalysisEnv<'_>) -> Self::Value {
            VarMap::empty()
        }

        fn transfer(
            &self,
            _instr: &Instr,
            input: &Self::Value,
            _cx: &mut TransferCtx<'_, '_>,
        ) -> NodeDfv<Self::Value> {
            NodeDfv::new(input.clone(), input.clone())
        }
    }

    fn registry() -> AnalysisRegistry {
        let mut registry = AnalysisRegistry::new();
        registry
            .register("a", || boxed(Noop))
            .register("b", || boxed(Noop))
            .register("c", || boxed(Noop));
        registry
    }

    #[test]
    fn test_unknown_analysis() {
        let set = AnalysisSet::new("a").with("missing");
        let err = set.instantiate(&registry(), 8).err().unwrap();
        assert!(matches!(err, AnalysisError::UnknownAnalysis(name) if name == "missing"));
    }

    #[test]
    fn test_default_sequence_is_simultaneous() {
        let set = AnalysisSet::new("a").with("b").with("a");
        let sequence = set.resolve(8).unwrap();
        assert!(!sequence.is_cascaded());
        assert_eq!(sequence.names().collect::<Vec<_>>(), vec!["a", "b"]);

        let (analyses, stages) = set.instantiate(&registry(), 8).unwrap();
        assert_eq!(analyses.len(), 2);
        assert_eq!(stages, vec![0, 0]);
    }

    #[test]
    fn test_sequence_validation() {
        let set = AnalysisSet::new("a").with("b");
        let missing = set
            .clone()
            .with_sequence(AnalysisSequence::simultaneous(["a"]));
        assert!(matches!(
            missing.resolve(8),
            Err(AnalysisError::MalformedSequence(_))
        ));

        let duplicate = set
            .clone()
            .with_sequence(AnalysisSequence::cascaded([vec!["a"], vec!["b", "a"]]));
        assert!(matches!(
            duplicate.resolve(8),
            Err(AnalysisError::MalformedSequence(_))
        ));

        let cascaded = set.with_sequence(AnalysisSequence::cascaded([vec!["b"], vec!["a", "c"]]));
        let (_, stages) = cascaded.instantiate(&registry(), 8).unwrap();
        assert_eq!(stages, vec![0, 1, 1]);
        assert!(matches!(
            cascaded.resolve(2),
            Err(AnalysisError::TooManyAnalyses { requested: 3, max: 2 })
        ));
    }
}
