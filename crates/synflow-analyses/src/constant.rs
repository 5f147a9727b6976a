/*! Constant propagation over integer and floating-point literals.
 *
 * Conditional jumps are branch-sensitive: a decided condition leaves the untaken edge at Top, and
 * an equality against a literal pins the variable on the edge where it holds. Variables the
 * analysis cannot decide on its own are looked up through `NumVarToLit` and `NumBinToLit`, and
 * assignments to variables that are dead afterwards are skipped.
 */

use crate::support::{
    clobber_call, entry_boundary, reachability, read_through, write_target, Ask, Offline,
};
use synflow_core::analysis::{
    Analysis, AnalysisEnv, CallEnv, ExprDfv, Flat, NodeDfv, SimAnswer, SimKind, SimQuery,
    SimValue, TransferCtx, VarMap,
};
use synflow_core::{AssignOrigin, BinaryOp, Expr, Instr, Literal};

pub type ConstValue = VarMap<Flat<Literal>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    pub const NAME: &'static str = "const";

    fn from_answer(answer: SimAnswer) -> Flat<Literal> {
        match answer {
            SimAnswer::Value(SimValue::Literal(lit)) => Flat::Value(lit),
            SimAnswer::Pending => Flat::Top,
            _ => Flat::Bottom,
        }
    }

    pub fn eval(&self, expr: &Expr, value: &ConstValue, ask: &mut dyn Ask) -> Flat<Literal> {
        match expr {
            Expr::Lit(lit) => Flat::Value(*lit),
            Expr::Var(var) => match value.get(var) {
                Flat::Bottom => Self::from_answer(ask.ask(SimQuery::NumVarToLit(var.clone()))),
                known => known,
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, value, ask);
                let right = self.eval(right, value, ask);
                match (left, right) {
                    (Flat::Value(l), Flat::Value(r)) => {
                        op.eval(l, r).map_or(Flat::Bottom, Flat::Value)
                    }
                    (Flat::Top, _) | (_, Flat::Top) => Flat::Top,
                    _ => Self::from_answer(ask.ask(SimQuery::NumBinToLit(expr.clone()))),
                }
            }
            Expr::Unary { op, operand } => match self.eval(operand, value, ask) {
                Flat::Value(lit) => op.eval(lit).map_or(Flat::Bottom, Flat::Value),
                other => other,
            },
            Expr::Deref(ptr) => read_through(value, ptr, ask),
            Expr::Cast { ty, operand } => match self.eval(operand, value, ask) {
                Flat::Value(Literal::Float(v)) if ty.is_integer() => {
                    Flat::Value(Literal::Int(v as i64))
                }
                Flat::Value(Literal::Int(v)) if ty.is_float() => {
                    Flat::Value(Literal::Float(v as f64))
                }
                Flat::Value(_) if !ty.is_numeric() => Flat::Bottom,
                other => other,
            },
            Expr::AddrOf(_) | Expr::Index { .. } | Expr::Member { .. } | Expr::Call { .. } => {
                Flat::Bottom
            }
        }
    }

    fn assign(
        &self,
        instr: &Instr,
        input: &ConstValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> ConstValue {
        let env = cx.env;
        let mut out = input.clone();
        let Instr::Assign(assign) = instr else {
            return out;
        };
        if assign.rhs.is_call() {
            clobber_call(&mut out, instr, env, &|_| true);
            return out;
        }

        if let (Some(lhs), AssignOrigin::Source) = (assign.lhs_var(), &assign.origin) {
            match cx.sim(SimQuery::DeadLhs(lhs.to_string())) {
                SimAnswer::Value(SimValue::Dead(true)) | SimAnswer::Pending => {
                    out.set(lhs, Flat::Top);
                    return out;
                }
                _ => {}
            }
        }

        let value = self.eval(&assign.rhs, input, cx);
        if !write_target(&mut out, &assign.lhs, value, env, cx) {
            return ConstValue::Top;
        }
        out
    }

    fn branch(
        &self,
        cond: &Expr,
        input: &ConstValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<ConstValue> {
        let mut on_true = input.clone();
        let mut on_false = input.clone();
        match self.eval(cond, input, cx) {
            Flat::Value(lit) if lit.is_zero() => on_true = ConstValue::Top,
            Flat::Value(_) => on_false = ConstValue::Top,
            Flat::Top => {
                on_true = ConstValue::Top;
                on_false = ConstValue::Top;
            }
            Flat::Bottom => {}
        }

        if let Expr::Binary { op, left, right } = cond {
            let pinned = match (left.as_ref(), right.as_ref()) {
                (Expr::Var(var), Expr::Lit(lit)) | (Expr::Lit(lit), Expr::Var(var)) => {
                    Some((var, *lit))
                }
                _ => None,
            };
            match (op, pinned) {
                (BinaryOp::Eq, Some((var, lit))) => on_true.set(var, Flat::Value(lit)),
                (BinaryOp::Ne, Some((var, lit))) => on_false.set(var, Flat::Value(lit)),
                _ => {}
            }
        }
        NodeDfv::branch(input.clone(), on_true, on_false)
    }
}

impl Analysis for ConstantPropagation {
    type Value = ConstValue;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn boundary_value(&self, env: &AnalysisEnv<'_>) -> ConstValue {
        entry_boundary(env, &|_| true)
    }

    fn transfer(
        &self,
        instr: &Instr,
        input: &ConstValue,
        cx: &mut TransferCtx<'_, '_>,
    ) -> NodeDfv<ConstValue> {
        match instr {
            Instr::Assign(_) => NodeDfv::new(input.clone(), self.assign(instr, input, cx)),
            Instr::Call(_) => {
                let mut out = input.clone();
                clobber_call(&mut out, instr, cx.env, &|_| true);
                NodeDfv::new(input.clone(), out)
            }
            Instr::CondJump(cond) => self.branch(cond, input, cx),
            Instr::Nop
            | Instr::Goto
            | Instr::Label(_)
            | Instr::Return(_)
            | Instr::Parallel(_) => NodeDfv::new(input.clone(), input.clone()),
        }
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
        &[
            SimKind::DerefToVars,
            SimKind::NumVarToLit,
            SimKind::NumBinToLit,
            SimKind::DeadLhs,
        ]
    }

    fn answer_sim(&self, query: &SimQuery, value: &ConstValue, _env: &AnalysisEnv<'_>) -> SimAnswer {
        let folded = match query {
            SimQuery::NodeReachability => return reachability(value),
            SimQuery::NumVarToLit(var) => value.get(var),
            SimQuery::NumBinToLit(expr) => self.eval(expr, value, &mut Offline),
            SimQuery::CondToUncond(cond) => {
                return match self.eval(cond, value, &mut Offline) {
                    Flat::Value(lit) => SimAnswer::Value(SimValue::Branch(!lit.is_zero())),
                    Flat::Top => SimAnswer::Pending,
                    Flat::Bottom => SimAnswer::Failed,
                };
            }
            SimQuery::DeadLhs(_) | SimQuery::DerefToVars(_) => return SimAnswer::Failed,
        };
        match folded {
            Flat::Value(lit) => SimAnswer::Value(SimValue::Literal(lit)),
            Flat::Top => SimAnswer::Pending,
            Flat::Bottom => SimAnswer::Failed,
        }
    }

    fn call_entry_value(&self, call_value: &ConstValue, env: &CallEnv<'_>) -> ConstValue {
        call_value.project_entry(env)
    }

    fn call_exit_value(
        &self,
        call_value: &ConstValue,
        callee_value: &ConstValue,
        env: &CallEnv<'_>,
    ) -> ConstValue {
        call_value.restore_after_call(callee_value, env)
    }
}

impl ExprDfv for ConstantPropagation {
    type Component = Flat<Literal>;

    fn expr_dfv(&self, expr: &Expr, value: &ConstValue) -> Flat<Literal> {
        self.eval(expr, value, &mut Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synflow_core::UnaryOp;

    fn value(entries: &[(&str, Flat<Literal>)]) -> ConstValue {
        let mut value = ConstValue::empty();
        for (var, component) in entries {
            value.set(var, component.clone());
        }
        value
    }

    #[test]
    fn test_eval_folds_and_guards() {
        let cp = ConstantPropagation;
        let v = value(&[
            ("f:a", Flat::Value(Literal::Int(20))),
            ("f:z", Flat::Value(Literal::Int(0))),
            ("f:u", Flat::Bottom),
        ]);

        let rem = Expr::binary(BinaryOp::Mod, Expr::var("f:a"), Expr::int(3));
        assert_eq!(cp.eval(&rem, &v, &mut Offline), Flat::Value(Literal::Int(2)));

        let div = Expr::binary(BinaryOp::Div, Expr::var("f:a"), Expr::var("f:z"));
        assert_eq!(cp.eval(&div, &v, &mut Offline), Flat::Bottom);

        let unknown = Expr::binary(BinaryOp::Add, Expr::var("f:u"), Expr::int(1));
        assert_eq!(cp.eval(&unknown, &v, &mut Offline), Flat::Bottom);

        let unset = Expr::binary(BinaryOp::Add, Expr::var("f:u"), Expr::var("f:never"));
        assert_eq!(cp.eval(&unset, &v, &mut Offline), Flat::Top);

        let neg = Expr::unary(UnaryOp::Neg, Expr::float(1.5));
        assert_eq!(cp.eval(&neg, &v, &mut Offline), Flat::Value(Literal::Float(-1.5)));
    }

    #[test]
    fn test_cast_converts_literals() {
        let cp = ConstantPropagation;
        let cast = Expr::Cast {
            ty: synflow_core::Type::int(),
            operand: Box::new(Expr::float(2.75)),
        };
        assert_eq!(
            cp.expr_dfv(&cast, &ConstValue::empty()),
            Flat::Value(Literal::Int(2))
        );
    }

    #[test]
    fn test_answers_from_stored_value() {
        let cp = ConstantPropagation;
        let v = value(&[("f:a", Flat::Value(Literal::Int(0))), ("f:b", Flat::Bottom)]);
        let unit = synflow_core::TranslationUnit::new("t");
        let func = synflow_core::Function::new(synflow_core::FunctionSignature::new(
            "f",
            synflow_core::Type::Void,
        ));
        let config = synflow_core::analysis::HostConfig::default();
        let taken = Default::default();
        let env = AnalysisEnv {
            unit: &unit,
            func: &func,
            config: &config,
            address_taken: &taken,
        };

        assert_eq!(
            cp.answer_sim(&SimQuery::CondToUncond(Expr::var("f:a")), &v, &env),
            SimAnswer::Value(SimValue::Branch(false))
        );
        assert_eq!(
            cp.answer_sim(&SimQuery::NumVarToLit("f:b".into()), &v, &env),
            SimAnswer::Failed
        );
        assert_eq!(
            cp.answer_sim(&SimQuery::NumVarToLit("f:c".into()), &v, &env),
            SimAnswer::Pending
        );
        assert_eq!(
            cp.answer_sim(&SimQuery::NodeReachability, &ConstValue::Top, &env),
            SimAnswer::Value(SimValue::Reachable(false))
        );
    }
}
