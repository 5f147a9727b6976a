/*! The dataflow engine.
 *
 * `Host` runs a set of analyses over one function to a common fixpoint; `IpaHost` does the same
 * for a whole unit, expanding calls into value contexts. Analyses talk to each other only
 * through simplification queries (`sim`).
 */

pub mod cache;
pub mod config;
pub mod dfv;
pub mod error;
pub mod host;
pub mod interface;
pub mod ipa;
pub mod lattice;
pub mod registry;
pub mod sim;
pub mod stats;
mod worklist;

pub use cache::{CacheStatistics, Consumer, SimCache, SimState};
pub use config::{HostConfig, IpaConfig, LocalInit};
pub use dfv::{downcast_result, AnResult, DfvDict, ErasedResult, NodeDfv};
pub use error::{AnalysisError, Result};
pub use host::Host;
pub use interface::{
    boxed, Analysis, AnalysisEnv, AnalysisSlot, CallEnv, Direction, DynAnalysis, ExprDfv,
    TransferCtx,
};
pub use ipa::{IpaHost, IpaResults};
pub use lattice::{
    checked_meet, compare_extremes, downcast_value, meet_all, CallProjection, ChangeResult,
    DynValue, Flat, Lattice, VarMap,
};
pub use registry::{AnalysisFactory, AnalysisRegistry, AnalysisSequence, AnalysisSet};
pub use sim::{Half, NoSims, SimAnswer, SimKind, SimQuery, SimResolver, SimValue};
pub use stats::AnalysisStats;
