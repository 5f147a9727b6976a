/*! Even/odd tracking for integer variables. Its only answer to other analyses is `x % 2` for an
 * even `x`.
 */

use crate::support::{clobber_call, entry_boundary, read_through, write_target, Ask, Offline};
use serde::{Deserialize, Serialize};
use std::fmt;
use synflow_core::analysis::{
    Analysis, AnalysisEnv, CallEnv, ExprDfv, Flat, Lattice, NodeDfv, SimAnswer, SimKind,
    SimQuery, SimValue, TransferCtx, VarMap,
};
use synflow_core::{BinaryOp, Expr, Instr, Literal, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of(value: i64) -> Self {
        if value % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::Even => write!(f, "even"),
            Parity::Odd => write!(f, "odd"),
        }
    }
}

pub type ParityValue = VarMap<Flat<Parity>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct ParityAnalysis;

impl ParityAnalysis {
    pub const NAME: &'static str = "parity";

    pub fn eval(&self, expr: &Expr, value: &ParityValue, ask: &mut dyn Ask) -> Flat<Parity> {
        match expr {
            Expr::Lit(Literal::Int(v)) => Flat::Value(Parity::of(*v)),
            Expr::Var(var) => value.get(var),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, value, ask);
                if let (BinaryOp::Mod, Some(Literal::Int(m))) = (op, right.as_literal()) {
                    return match left {
                        Flat::Value(_) if m % 2 == 0 && m != 0 => left,
                        Flat::Top => Flat::Top,
                        _ => Flat::Bottom,
                    };
                }
                if let (BinaryOp::Shl, Some(Literal::Int(s))) = (op, right.as_literal()) {
                    return match left {
                        Flat::Top => Flat::Top,
                        _ if s > 0 => Flat::Value(Parity::Even),
                        other => other,
                    };
                }
                let right = self.eval(right, value, ask);
                Self::combine(*op, left, right)
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => self.eval(operand, value, ask),
            Expr::Deref(ptr) => read_through(value, ptr, ask),
            Expr::Cast { ty, operand } if ty.is_integer() => self.eval(operand, value, ask),
            Expr::Lit(Literal::Float(_))
            | Expr::Unary { .. }
            | Expr::Cast { .. }
            | Expr::AddrOf(_)
            | Expr::Index { .. }
            | Expr::Member { .. }
            | Expr::Call { .. } => Flat::Bottom,
        }
    }

    fn combine(op: BinaryOp, left: Flat<Parity>, right: Flat<Parity>) -> Flat<Parity> {
        use Parity::{Even, Odd};

        if left.is_top() || right.is_top() {
            return Flat::Top;
        }
        match (op, left.value(), right.value()) {
            (BinaryOp::Add | BinaryOp::Sub | BinaryOp::BitXor, Some(l), Some(r)) => {
                Flat::Value(if l == r { Even } else { Odd })
            }
            (BinaryOp::Mul | BinaryOp::BitAnd, Some(Even), _)
            | (BinaryOp::Mul | BinaryOp::BitAnd, _, Some(Even)) => Flat::Value(Even),
            (BinaryOp::Mul | BinaryOp::BitAnd, Some(Odd), Some(Odd)) => Flat::Value(Odd),
            (BinaryOp::BitOr, Some(Odd), _) | (BinaryOp::BitOr, _, Some(Odd)) => Flat::Value(Odd),
            (BinaryOp::BitOr, Some(Even), Some(Even)) => Flat::Value(Even),
            _ => Flat::Bottom,
        }
    }
}

impl Analysis for ParityAnalysis {
    type Value = ParityValue;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> ParityValue {
        entry_boundary(env, &|_| true)
    }

    fn transfer(
        &self,
        instr: &Instr,
        input: &ParityValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<ParityValue> {
        let env = cx.env;
        let mut out = input.clone();
        match instr {
            Instr::Assign(assign) if assign.rhs.is_call() => {
                clobber_call(&mut out, instr, env, &|_| true)
            }
            Instr::Assign(assign) => {
                let value = self.eval(&assign.rhs, input, cx);
                if !write_target(&mut out, &assign.lhs, value, env, cx) {
                    out = ParityValue::Top;
                }
            }
            Instr::Call(_) => clobber_call(&mut out, instr, env, &|_| true),
            Instr::CondJump(_)
            | Instr::Nop
            | Instr::Goto
            | Instr::Label(_)
            | Instr::Return(_)
            | Instr::Parallel(_) => {}
        }
        NodeDfv::new(input.clone(), out)
    }

    fn sims_answered(&self) -> &'static [SimKind] {
        &[SimKind::NumBinToLit]
    }

    fn sims_needed(&self) -> &'static [SimKind] {
        &[SimKind::DerefToVars]
    }

    fn answer_sim(&self, query: &SimQuery, value: &ParityValue, _env: &AnalysisEnv<'_>) -> SimAnswer {
        let SimQuery::NumBinToLit(Expr::Binary {
            op: BinaryOp::Mod,
            left,
            right,
        }) = query
        else {
            return SimAnswer::Failed;
        };
        if !matches!(right.as_literal(), Some(Literal::Int(2 | -2))) {
            return SimAnswer::Failed;
        }
        match self.eval(left, value, &mut Offline) {
            Flat::Value(Parity::Even) => SimAnswer::Value(SimValue::Literal(Literal::Int(0))),
            Flat::Top => SimAnswer::Pending,
            _ => SimAnswer::Failed,
        }
    }

    fn call_entry_value(&self, call_value: &ParityValue, env: &CallEnv<'_>) -> ParityValue {
        call_value.project_entry(env)
    }

    fn call_exit_value(
        &self,
        call_value: &ParityValue,
        callee_value: &ParityValue,
        env: &CallEnv<'_>,
    ) -> ParityValue {
        call_value.restore_after_call(callee_value, env)
    }
}

impl ExprDfv for ParityAnalysis {
    type Component = Flat<Parity>;

    fn expr_dfv(&self, expr: &Expr, value: &ParityValue) -> Flat<Parity> {
        self.eval(expr, value, &mut Offline)
    }
}
