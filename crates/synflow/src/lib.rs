/*! Unified interface for synergistic dataflow analysis.
 *
 * One import for the IR and its builders, the engine, the reference analyses and the emitters.
 * `analyze_function` and `analyze_program` cover the common case of running built-in analyses
 * over a unit.
 */

pub use synflow_analyses as analyses;
pub use synflow_core as core;
pub use synflow_emit as emit;

pub use synflow_core::analysis::{
    AnResult, AnalysisError, AnalysisRegistry, AnalysisSequence, AnalysisSet, AnalysisStats,
    Host, HostConfig, IpaConfig, IpaHost, IpaResults, Lattice,
};
pub use synflow_core::{
    Cfg, EdgeLabel, Expr, Function, FunctionBuilder, Instr, NodeId, TranslationUnit, Type,
    UnitBuilder,
};

pub use synflow_analyses::builtin_registry;

pub use synflow_emit::{EmitterConfig, Emitter, IpaReport, IrEmitter, ResultEmitter};

use std::sync::Arc;

/// Runs `set` over one function with the built-in analyses.
pub fn analyze_function(
    unit: Arc<TranslationUnit>,
    function: &str,
    set: &AnalysisSet,
    config: HostConfig,
) -> Result<Host, AnalysisError> {
    let mut host = Host::new(unit, function, set, &builtin_registry(), config)?;
    host.analyze()?;
    Ok(host)
}

/// Runs `set` inter-procedurally from `root`. The host is returned with
/// its results so the contexts stay inspectable.
pub fn analyze_program(
    unit: TranslationUnit,
    root: &str,
    set: &AnalysisSet,
    config: IpaConfig,
) -> Result<(IpaHost, IpaResults), AnalysisError> {
    let mut ipa = IpaHost::new(unit, root, set, &builtin_registry(), config)?;
    let results = ipa.analyze()?;
    Ok((ipa, results))
}
