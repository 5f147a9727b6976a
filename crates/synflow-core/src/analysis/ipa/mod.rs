/*! Inter-procedural analysis with value contexts.
 *
 * Calls to defined functions are first spliced: parameter assignments before the call, a return
 * assignment after it. Each call then looks up the callee's context for the entry values it
 * presents, and the callee's exit values flow back through the call node. Contexts are memoized
 * by entry, and call strings deeper than the configured bound fold into an ancestor context.
 */

mod context;
mod host;
mod splice;

pub use context::{CallSitePair, ContextId, ContextTable, ValueContext};
pub use host::{IpaHost, IpaResults};
pub use splice::{splice_call, splice_calls, SplicedCall};
