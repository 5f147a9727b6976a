/*! Signed integer ranges.
 *
 * Bounds are `i64` with `i64::MIN` and `i64::MAX` standing for the infinities; arithmetic runs in
 * `i128` and clamps back, so overflowing results widen to an infinite bound instead of wrapping.
 * Widening jumps any bound that moved outwards straight to infinity.
 */

use crate::support::{
    clobber_call, entry_boundary, reachability, read_through, var_comparison, write_target, Ask,
    Offline,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use synflow_core::analysis::{
    compare_extremes, Analysis, AnalysisEnv, CallEnv, ChangeResult, ExprDfv, Lattice, NodeDfv,
    SimAnswer, SimKind, SimQuery, SimValue, TransferCtx, VarMap,
};
use synflow_core::{BinaryOp, Expr, Instr, Literal, UnaryOp};

const NEG_INF: i64 = i64::MIN;
const POS_INF: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Range {
    /// No value, or not reached yet.
    Top,
    /// Any value.
    Bottom,
    Span { lo: i64, hi: i64 },
}

impl Range {
    /// Normalizing constructor: an empty span is Top and the full span Bottom.
    pub fn new(lo: i64, hi: i64) -> Self {
        if lo > hi {
            Range::Top
        } else if lo == NEG_INF && hi == POS_INF {
            Range::Bottom
        } else {
            Range::Span { lo, hi }
        }
    }

    pub fn exact(value: i64) -> Self {
        Range::new(value, value)
    }

    fn clamped(lo: i128, hi: i128) -> Self {
        let clamp = |v: i128| v.clamp(NEG_INF as i128, POS_INF as i128) as i64;
        Range::new(clamp(lo), clamp(hi))
    }

    fn from_corners(corners: [i128; 4]) -> Self {
        let lo = corners.iter().copied().min().unwrap_or(NEG_INF as i128);
        let hi = corners.iter().copied().max().unwrap_or(POS_INF as i128);
        Range::clamped(lo, hi)
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            Range::Top => None,
            Range::Bottom => Some((NEG_INF, POS_INF)),
            Range::Span { lo, hi } => Some((*lo, *hi)),
        }
    }

    pub fn as_exact(&self) -> Option<i64> {
        match self {
            Range::Span { lo, hi } if lo == hi => Some(*lo),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.bounds().is_some_and(|(lo, hi)| lo <= value && value <= hi)
    }

    pub fn intersect(&self, lo: i64, hi: i64) -> Self {
        match self.bounds() {
            Some((l, h)) => Range::new(l.max(lo), h.min(hi)),
            None => Range::Top,
        }
    }

    /// `Some(true)` when every value is non-zero, `Some(false)` when the only
    /// value is zero.
    pub fn truth(&self) -> Option<bool> {
        let (lo, hi) = self.bounds()?;
        if lo > 0 || hi < 0 {
            Some(true)
        } else if lo == 0 && hi == 0 {
            Some(false)
        } else {
            None
        }
    }

    pub fn binary(op: BinaryOp, left: Range, right: Range) -> Range {
        let (Some((l1, h1)), Some((l2, h2))) = (left.bounds(), right.bounds()) else {
            return Range::Top;
        };
        if let (Some(a), Some(b)) = (left.as_exact(), right.as_exact()) {
            return op.eval_int(a, b).map_or(Range::Bottom, Range::exact);
        }
        let (l1, h1, l2, h2) = (l1 as i128, h1 as i128, l2 as i128, h2 as i128);
        match op {
            BinaryOp::Add => Range::clamped(l1 + l2, h1 + h2),
            BinaryOp::Sub => Range::clamped(l1 - h2, h1 - l2),
            BinaryOp::Mul => Range::from_corners([l1 * l2, l1 * h2, h1 * l2, h1 * h2]),
            BinaryOp::Div if l2 > 0 || h2 < 0 => {
                Range::from_corners([l1 / l2, l1 / h2, h1 / l2, h1 / h2])
            }
            BinaryOp::Mod if l2 > 0 || h2 < 0 => {
                let m = l2.abs().max(h2.abs()) - 1;
                if l1 >= 0 {
                    Range::clamped(0, m.min(h1))
                } else if h1 <= 0 {
                    Range::clamped((-m).max(l1), 0)
                } else {
                    Range::clamped(-m, m)
                }
            }
            BinaryOp::Lt => Self::decide(h1 < l2, l1 >= h2),
            BinaryOp::Le => Self::decide(h1 <= l2, l1 > h2),
            BinaryOp::Gt => Self::decide(l1 > h2, h1 <= l2),
            BinaryOp::Ge => Self::decide(l1 >= h2, h1 < l2),
            BinaryOp::Eq => Self::decide(false, h1 < l2 || h2 < l1),
            BinaryOp::Ne => Self::decide(h1 < l2 || h2 < l1, false),
            _ => Range::Bottom,
        }
    }

    fn decide(always: bool, never: bool) -> Range {
        if always {
            Range::exact(1)
        } else if never {
            Range::exact(0)
        } else {
            Range::new(0, 1)
        }
    }

    pub fn unary(op: UnaryOp, operand: Range) -> Range {
        let Some((lo, hi)) = operand.bounds() else {
            return Range::Top;
        };
        match op {
            UnaryOp::Neg => Range::clamped(-(hi as i128), -(lo as i128)),
            UnaryOp::BitNot => Range::clamped(-(hi as i128) - 1, -(lo as i128) - 1),
            UnaryOp::Not => match operand.truth() {
                Some(true) => Range::exact(0),
                Some(false) => Range::exact(1),
                None => Range::new(0, 1),
            },
        }
    }

    /// The range of a variable on the edge where `var op c` is `holds`.
    pub fn restrict(&self, op: BinaryOp, c: i64, holds: bool) -> Range {
        let op = if holds {
            op
        } else {
            match op {
                BinaryOp::Lt => BinaryOp::Ge,
                BinaryOp::Le => BinaryOp::Gt,
                BinaryOp::Gt => BinaryOp::Le,
                BinaryOp::Ge => BinaryOp::Lt,
                BinaryOp::Eq => BinaryOp::Ne,
                BinaryOp::Ne => BinaryOp::Eq,
                other => other,
            }
        };
        match op {
            BinaryOp::Lt => c.checked_sub(1).map_or(Range::Top, |c| self.intersect(NEG_INF, c)),
            BinaryOp::Le => self.intersect(NEG_INF, c),
            BinaryOp::Gt => c.checked_add(1).map_or(Range::Top, |c| self.intersect(c, POS_INF)),
            BinaryOp::Ge => self.intersect(c, POS_INF),
            BinaryOp::Eq => self.intersect(c, c),
            BinaryOp::Ne => match self.bounds() {
                Some((lo, hi)) if lo == c && hi == c => Range::Top,
                Some((lo, hi)) if lo == c => Range::new(lo + 1, hi),
                Some((lo, hi)) if hi == c => Range::new(lo, hi - 1),
                _ => *self,
            },
            _ => *self,
        }
    }
}

impl Lattice for Range {
    fn top() -> Self {
        Range::Top
    }

    fn bottom() -> Self {
        Range::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, Range::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Range::Bottom)
    }

    fn meet(&self, other: &Self) -> (Self, ChangeResult) {
        let result = match (self.bounds(), other.bounds()) {
            (None, _) => *other,
            (_, None) => *self,
            (Some((l1, h1)), Some((l2, h2))) => Range::new(l1.min(l2), h1.max(h2)),
        };
        (result, ChangeResult::from_changed(result != *self))
    }

    fn widen(&self, previous: &Self) -> (Self, ChangeResult) {
        let result = match (self.bounds(), previous.bounds()) {
            (None, _) => *previous,
            (_, None) => *self,
            (Some((lo, hi)), Some((plo, phi))) => Range::new(
                if lo < plo { NEG_INF } else { plo },
                if hi > phi { POS_INF } else { phi },
            ),
        };
        (result, ChangeResult::from_changed(result != *previous))
    }

    fn less_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Range::Span { lo, hi }, Range::Span { lo: olo, hi: ohi }) => {
                Some(lo <= olo && hi >= ohi)
            }
            _ => compare_extremes(self, other),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |v: i64| match v {
            NEG_INF => "-inf".to_string(),
            POS_INF => "+inf".to_string(),
            v => v.to_string(),
        };
        match self {
            Range::Top => write!(f, "Top"),
            Range::Bottom => write!(f, "Bottom"),
            Range::Span { lo, hi } => write!(f, "[{}, {}]", bound(*lo), bound(*hi)),
        }
    }
}

pub type IntervalValue = VarMap<Range>;

#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalAnalysis;

impl IntervalAnalysis {
    pub const NAME: &'static str = "interval";

    pub fn eval(&self, expr: &Expr, value: &IntervalValue, ask: &mut dyn Ask) -> Range {
        match expr {
            Expr::Lit(Literal::Int(v)) => Range::exact(*v),
            Expr::Lit(Literal::Float(_)) => Range::Bottom,
            Expr::Var(var) => value.get(var),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, value, ask);
                let right = self.eval(right, value, ask);
                let own = Range::binary(*op, left, right);
                if own.is_top() || own.as_exact().is_some() {
                    return own;
                }
                match ask.ask(SimQuery::NumBinToLit(expr.clone())) {
                    SimAnswer::Value(SimValue::Literal(Literal::Int(v))) => Range::exact(v),
                    SimAnswer::Pending => Range::Top,
                    _ => own,
                }
            }
            Expr::Unary { op, operand } => Range::unary(*op, self.eval(operand, value, ask)),
            Expr::Deref(ptr) => read_through(value, ptr, ask),
            Expr::Cast { ty, operand } if ty.is_integer() => self.eval(operand, value, ask),
            Expr::Cast { .. }
            | Expr::AddrOf(_)
            | Expr::Index { .. }
            | Expr::Member { .. }
            | Expr::Call { .. } => Range::Bottom,
        }
    }

    fn restrict_edge(edge: &mut IntervalValue, var: &str, op: BinaryOp, c: i64, holds: bool) {
        if edge.is_top() {
            return;
        }
        let narrowed = edge.get(var).restrict(op, c, holds);
        if narrowed.is_top() {
            *edge = IntervalValue::Top;
        } else {
            edge.set(var, narrowed);
        }
    }

    fn branch(
        &self,
        cond: &Expr,
        input: &IntervalValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<IntervalValue> {
        let decided = self.eval(cond, input, cx);
        let mut on_true = input.clone();
        let mut on_false = input.clone();
        if decided.is_top() {
            return NodeDfv::branch(input.clone(), IntervalValue::Top, IntervalValue::Top);
        }
        match decided.truth() {
            Some(true) => on_false = IntervalValue::Top,
            Some(false) => on_true = IntervalValue::Top,
            None => {}
        }

        if let Some((var, op, c)) = var_comparison(cond) {
            Self::restrict_edge(&mut on_true, var, op, c, true);
            Self::restrict_edge(&mut on_false, var, op, c, false);
        } else if let Expr::Var(var) = cond {
            Self::restrict_edge(&mut on_true, var, BinaryOp::Ne, 0, true);
            Self::restrict_edge(&mut on_false, var, BinaryOp::Eq, 0, true);
        }
        NodeDfv::branch(input.clone(), on_true, on_false)
    }
}

impl Analysis for IntervalAnalysis {
    type Value = IntervalValue;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> IntervalValue {
        entry_boundary(env, &|_| true)
    }

    fn transfer(
        &self,
        instr: &Instr,
        input: &IntervalValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<IntervalValue> {
        let env = cx.env;
        let mut out = input.clone();
        match instr {
            Instr::Assign(assign) if assign.rhs.is_call() => {
                clobber_call(&mut out, instr, env, &|_| true)
            }
            Instr::Assign(assign) => {
                let value = self.eval(&assign.rhs, input, cx);
                if !write_target(&mut out, &assign.lhs, value, env, cx) {
                    out = IntervalValue::Top;
                }
            }
            Instr::Call(_) => clobber_call(&mut out, instr, env, &|_| true),
            Instr::CondJump(cond) => return self.branch(cond, input, cx),
            Instr::Nop | Instr::Goto | Instr::Label(_) | Instr::Return(_) | Instr::Parallel(_) => {}
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        &[
            SimKind::NodeReachability,
            SimKind::NumVarToLit,
            SimKind::NumBinToLit,
            SimKind::CondToUncond,
        ]
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        &[SimKind::DerefToVars, SimKind::NumBinToLit]
    }

    fn answer_sim(
        &self,
        query: &SimQuery,
        value: &IntervalValue,
        _env: &AnalysisEnv<'_>,
    ) -> SimAnswer {
        let range = match query {
            SimQuery::NodeReachability => return reachability(value),
            SimQuery::NumVarToLit(var) => value.get(var),
            SimQuery::NumBinToLit(expr) => self.eval(expr, value, &mut Offline),
            SimQuery::CondToUncond(cond) => {
                let range = self.eval(cond, value, &mut Offline);
                if range.is_top() {
                    return SimAnswer::Pending;
                }
                return match range.truth() {
                    Some(taken) => SimAnswer::Value(SimValue::Branch(taken)),
                    None => SimAnswer::Failed,
                };
            }
            SimQuery::DeadLhs(_) | SimQuery::DerefToVars(_) => return SimAnswer::Failed,
        };
        match (range, range.as_exact()) {
            (Range::Top, _) => SimAnswer::Pending,
            (_, Some(v)) => SimAnswer::Value(SimValue::Literal(Literal::Int(v))),
            _ => SimAnswer::Failed,
        }
    }

    fn call_entry_value(&self, call_value: &IntervalValue, env: &CallEnv<'_>) -> IntervalValue {
        call_value.project_entry(env)
    }

    fn call_exit_value(
        &self,
        call_value: &IntervalValue,
        callee_value: &IntervalValue,
        env: &CallEnv<'_>,
    ) -> IntervalValue {
        call_value.restore_after_call(callee_value, env)
    }
}

impl ExprDfv for IntervalAnalysis {
    type Component = Range;

    fn expr_dfv(&self, expr: &Expr, value: &IntervalValue) -> Range {
        self.eval(expr, value, &mut Offline)
    }
}
