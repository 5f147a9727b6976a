/*! Readable text for synflow graphs and analysis results.
 *
 * Nothing here decides anything about a program. The emitters print the IR one node per line and,
 * for a finished run, the IN and OUT values every analysis computed at each node, the edges the
 * run proved dead, the value contexts of an inter-procedural run and the engine counters.
 */

pub mod config;
pub mod emitter;
pub mod ir_emitter;
pub mod result_emitter;

pub use config::{EmitterConfig, Halves, IndentStyle, OutputFormat};
pub use emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tone};
pub use ir_emitter::{EdgeFilter, IrEmitter};
pub use result_emitter::{IpaReport, ResultEmitter};
