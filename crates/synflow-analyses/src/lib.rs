/*! Reference client analyses for the synflow engine.
 *
 * Each analysis is usable alone, but the interesting results come from running them together:
 * points-to resolves dereferences for everyone else, constant propagation prunes branches and
 * decides reachability, liveness lets the forward analyses skip dead stores, and interval and
 * parity refine each other's arithmetic through `NumBinToLit`.
 */

pub mod constant;
pub mod interval;
pub mod liveness;
pub mod parity;
pub mod pointsto;
pub mod support;

pub use constant::{ConstValue, ConstantPropagation};
pub use interval::{IntervalAnalysis, IntervalValue, Range};
pub use liveness::{LiveVars, LivenessAnalysis};
pub use parity::{Parity, ParityAnalysis, ParityValue};
pub use pointsto::{PointsTo, PointsToAnalysis, PointsToValue};

use synflow_core::analysis::{boxed, AnalysisRegistry};
use tracing::debug;

/// Registry with every analysis of this crate under its `NAME`.
pub fn builtin_registry() -> AnalysisRegistry {
    let mut registry = AnalysisRegistry::new();
    registry
        .register(ConstantPropagation::NAME, || boxed(ConstantPropagation))
        .register(IntervalAnalysis::NAME, || boxed(IntervalAnalysis))
        .register(PointsToAnalysis::NAME, || boxed(PointsToAnalysis))
        .register(LivenessAnalysis::NAME, || boxed(LivenessAnalysis))
        .register(ParityAnalysis::NAME, || boxed(ParityAnalysis));
    debug!(
        analyses = ?registry.names().collect::<Vec<_>>(),
        "built-in registry ready"
    );
    registry
}
