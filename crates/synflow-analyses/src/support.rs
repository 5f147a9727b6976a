/*! Building blocks shared by the client analyses.
 *
 * Most clients keep one component per variable in a `VarMap` and differ only in the component
 * lattice and how expressions evaluate. The helpers here cover the rest: asking co-running
 * analyses, reading and writing through pointers, clobbering state at calls that are not
 * expanded, and the boundary value at function entry.
 */

use std::collections::BTreeSet;
use synflow_core::analysis::{
    AnalysisEnv, Lattice, LocalInit, SimAnswer, SimQuery, SimValue, TransferCtx, VarMap,
};
use synflow_core::{BinaryOp, Expr, Instr, VarName};
use tracing::trace;

/// Where an evaluation gets simplification answers from.
pub trait Ask {
    fn ask(&mut self, query: SimQuery) -> SimAnswer;
}

impl Ask for TransferCtx<'_, '_> {
    fn ask(&mut self, query: SimQuery) -> SimAnswer {
        self.sim(query)
    }
}

/// Fails every query. Used when answering from a stored value, where no
/// other analysis may be consulted.
pub struct Offline;

impl Ask for Offline {
    fn ask(&mut self, _query: SimQuery) -> SimAnswer {
        SimAnswer::Failed
    }
}

/// What a dereferenced pointer may designate.
#[derive(Debug, Clone, PartialEq)]
pub enum Pointees {
    /// Not decided yet.
    Pending,
    Known(BTreeSet<VarName>),
    /// Any variable whose address escaped.
    Unknown,
}

pub fn pointees(ask: &mut dyn Ask, ptr: &str) -> Pointees {
    match ask.ask(SimQuery::DerefToVars(ptr.to_string())) {
        SimAnswer::Value(SimValue::Vars(vars)) => Pointees::Known(vars),
        SimAnswer::Pending => Pointees::Pending,
        _ => Pointees::Unknown,
    }
}

/// Component read by `*ptr`: the meet over every possible pointee. An empty
/// or undecided pointee set reads as Top.
pub fn read_through<C: Lattice>(value: &VarMap<C>, ptr: &str, ask: &mut dyn Ask) -> C {
    match pointees(ask, ptr) {
        Pointees::Pending => C::top(),
        Pointees::Known(vars) => vars
            .iter()
            .fold(C::top(), |acc, var| acc.meet(&value.get(var)).0),
        Pointees::Unknown => C::bottom(),
    }
}

/// Writes `component` to the location `lhs` designates. Returns `false` when
/// the location is not decided yet; the node's output then stays Top.
///
/// A store through a pointer with a single pointee replaces its value,
/// otherwise every pointee keeps the meet of old and new.
pub fn write_target<C: Lattice>(
    out: &mut VarMap<C>,
    lhs: &Expr,
    component: C,
    env: &AnalysisEnv<'_>,
    ask: &mut dyn Ask,
) -> bool {
    match lhs {
        Expr::Var(var) => out.set(var, component),
        Expr::Deref(ptr) => match pointees(ask, ptr) {
            Pointees::Pending => return false,
            Pointees::Known(vars) if vars.is_empty() => return false,
            Pointees::Known(vars) if vars.len() == 1 => {
                if let Some(var) = vars.first() {
                    out.set(var, component);
                }
            }
            Pointees::Known(vars) => {
                for var in &vars {
                    let merged = out.get(var).meet(&component).0;
                    out.set(var, merged);
                }
            }
            Pointees::Unknown => out.set_bottom(env.escaping_vars()),
        },
        // Aggregates are tracked as a whole.
        Expr::Index { base, .. }
        | Expr::Member {
            base,
            through_pointer: false,
            ..
        } => out.set(base, C::bottom()),
        Expr::Member { .. } => out.set_bottom(env.escaping_vars()),
        _ => {}
    }
    true
}

/// Effect of a call that is not analyzed: its result and every variable the
/// callee could reach lose their value. `tracked` limits which variables the
/// analysis keeps entries for.
pub fn clobber_call<C: Lattice>(
    out: &mut VarMap<C>,
    instr: &Instr,
    env: &AnalysisEnv<'_>,
    tracked: &dyn Fn(&str) -> bool,
) {
    if let Instr::Assign(assign) = instr {
        match &assign.lhs {
            Expr::Var(var)
            | Expr::Index { base: var, .. }
            | Expr::Member {
                base: var,
                through_pointer: false,
                ..
            } => {
                if tracked(var) {
                    out.set(var, C::bottom());
                }
            }
            _ => {}
        }
    }
    out.set_bottom(env.escaping_vars().filter(|&var| tracked(var)));
    trace!(callee = ?instr.direct_callee(), "call not expanded");
}

/// Boundary value at function entry. Parameters and globals hold unknown
/// values; other locals are unknown only under conservative initialization.
pub fn entry_boundary<C: Lattice>(
    env: &AnalysisEnv<'_>,
    tracked: &dyn Fn(&str) -> bool,
) -> VarMap<C> {
    let mut value = VarMap::empty();
    value.set_bottom(env.unit.globals.keys().map(String::as_str).filter(|&v| tracked(v)));
    value.set_bottom(env.func.params().iter().map(|p| p.name.as_str()).filter(|&v| tracked(v)));
    if env.config.local_init == LocalInit::Conservative {
        value.set_bottom(env.func.locals.keys().map(String::as_str).filter(|&v| tracked(v)));
    }
    value
}

/// Reachability as seen by a forward analysis: a node whose input is Top has
/// not been reached.
pub fn reachability<L: Lattice>(input: &L) -> SimAnswer {
    if input.is_top() {
        SimAnswer::Value(SimValue::Reachable(false))
    } else if input.is_bottom() {
        SimAnswer::Failed
    } else {
        SimAnswer::Value(SimValue::Reachable(true))
    }
}

/// Splits a comparison between a variable and an integer literal into
/// `var op literal`, flipping the operator when the literal comes first.
pub fn var_comparison(cond: &Expr) -> Option<(&str, BinaryOp, i64)> {
    let Expr::Binary { op, left, right } = cond else {
        return None;
    };
    if !op.is_relational() {
        return None;
    }
    match (left.as_ref(), right.as_ref()) {
        (Expr::Var(var), Expr::Lit(lit)) => Some((var.as_str(), *op, lit.as_int()?)),
        (Expr::Lit(lit), Expr::Var(var)) => {
            let flipped = match op {
                BinaryOp::Lt => BinaryOp::Gt,
                BinaryOp::Le => BinaryOp::Ge,
                BinaryOp::Gt => BinaryOp::Lt,
                BinaryOp::Ge => BinaryOp::Le,
                other => *other,
            };
            Some((var.as_str(), flipped, lit.as_int()?))
        }
        _ => None,
    }
}
