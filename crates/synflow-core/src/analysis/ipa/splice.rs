use crate::analysis::error::{AnalysisError, Result};
use crate::cfg::NodeId;
use crate::expr::{Expr, VarName};
use crate::instructions::{Assign, AssignOrigin, Instr};
use crate::unit::TranslationUnit;
use tracing::debug;

/// Nodes around one spliced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplicedCall {
    /// Parameter assignments, in argument order.
    pub params: Vec<NodeId>,
    pub call: NodeId,
    pub ret: Option<NodeId>,
}

/// Surrounds the direct call at `node` with parameter assignments before it
/// and a return assignment after it. Returns `None` when the node is not a
/// direct call to a defined function.
pub fn splice_call(unit: &mut TranslationUnit, caller: &str, node: NodeId) -> Result<Option<SplicedCall>> {
    let caller_fn = unit
        .function(caller)
        .ok_or_else(|| AnalysisError::UnknownFunction(caller.to_string()))?;
    let body = caller_fn
        .body
        .as_ref()
        .ok_or_else(|| AnalysisError::MissingBody(caller.to_string()))?;
    let instr = body
        .instr(node)
        .ok_or(crate::IrError::UnknownNode(node.0))?;

    let Some(Expr::Call { args, .. }) = instr.call_expr() else {
        return Ok(None);
    };
    let Some(callee_name) = instr.direct_callee() else {
        return Ok(None);
    };
    let Some(callee) = unit.function(callee_name).filter(|f| f.is_defined()) else {
        return Ok(None);
    };
    if callee.is_variadic() {
        return Err(AnalysisError::VariadicSplice {
            caller: caller.to_string(),
            callee: callee_name.to_string(),
        });
    }
    if callee.params().len() != args.len() {
        return Err(AnalysisError::ArityMismatch {
            callee: callee_name.to_string(),
            args: args.len(),
            params: callee.params().len(),
        });
    }

    let callee_name = callee_name.to_string();
    let bindings: Vec<(VarName, Expr)> = callee
        .params()
        .iter()
        .map(|p| p.name.clone())
        .zip(args.iter().cloned())
        .collect();
    let returns: Vec<Expr> = callee
        .body
        .as_ref()
        .map(|cfg| cfg.return_exprs().into_iter().cloned().collect())
        .unwrap_or_default();
    let lhs = match instr {
        Instr::Assign(assign) => Some(assign.lhs.clone()),
        _ => None,
    };

    let body = unit
        .function_mut(caller)
        .and_then(|f| f.body.as_mut())
        .ok_or_else(|| AnalysisError::MissingBody(caller.to_string()))?;

    let mut params = Vec::with_capacity(bindings.len());
    for (formal, actual) in bindings {
        let assign = Assign::new(Expr::Var(formal), actual).with_origin(AssignOrigin::Param {
            callee: callee_name.clone(),
        });
        params.push(body.insert_before(node, Instr::Assign(assign))?);
    }

    let origin = AssignOrigin::Return {
        callee: callee_name.clone(),
    };
    let ret_instr = match (lhs, returns.len()) {
        (None, _) | (_, 0) => None,
        (Some(lhs), 1) => Some(Instr::Assign(
            Assign::new(lhs, returns[0].clone()).with_origin(origin),
        )),
        (Some(lhs), _) => Some(Instr::Parallel(
            returns
                .into_iter()
                .map(|ret| Assign::new(lhs.clone(), ret).with_origin(origin.clone()))
                .collect(),
        )),
    };
    let ret = match ret_instr {
        Some(instr) => Some(body.insert_after(node, instr)?),
        None => None,
    };

    debug!(caller, callee = %callee_name, %node, params = params.len(), "spliced call");
    Ok(Some(SplicedCall {
        params,
        call: node,
        ret,
    }))
}

/// Splices every direct call to a defined function. Calls through pointers,
/// to declarations, and to variadic functions are left alone. Meant to run
/// once per unit.
pub fn splice_calls(unit: &mut TranslationUnit) -> Result<Vec<(String, SplicedCall)>> {
    let mut sites = Vec::new();
    for func in unit.defined_functions() {
        for (node, instr) in unit.call_sites(func.name()) {
            let Some(callee) = instr.direct_callee().and_then(|name| unit.function(name)) else {
                continue;
            };
            if !callee.is_defined() {
                continue;
            }
            if callee.is_variadic() {
                debug!(caller = %func.name(), callee = %callee.name(), "skipping variadic callee");
                continue;
            }
            sites.push((func.name().to_string(), node));
        }
    }

    let mut spliced = Vec::with_capacity(sites.len());
    for (caller, node) in sites {
        if let Some(call) = splice_call(unit, &caller, node)? {
            spliced.push((caller, call));
        }
    }
    Ok(spliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FunctionBuilder, UnitBuilder};
    use crate::cfg::EdgeLabel;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn callee_with_returns(count: usize) -> FunctionBuilder {
        let mut f = FunctionBuilder::new("f", Type::int());
        f.param("x", Type::int()).local("y", Type::int());
        let x = f.var("x");
        let y = f.var("y");
        if count > 1 {
            f.if_goto(x.clone(), "other");
        }
        f.ret(Some(y));
        if count > 1 {
            f.label("other").unwrap();
            f.ret(Some(x));
        }
        f
    }

    fn unit_with(callee: FunctionBuilder) -> TranslationUnit {
        let mut main = FunctionBuilder::new("main", Type::int());
        main.local("a", Type::int()).local("r", Type::int());
        let a = main.var("a");
        let r = main.var("r");
        main.assign_call(r.clone(), "f", vec![a]);
        main.ret(Some(r));

        let mut unit = UnitBuilder::new("test");
        unit.function(callee).unwrap().function(main).unwrap();
        unit.build()
    }

    fn call_node(unit: &TranslationUnit) -> NodeId {
        unit.call_sites("main")[0].0
    }

    #[test]
    fn test_single_return_becomes_assignment() {
        let mut unit = unit_with(callee_with_returns(1));
        let node = call_node(&unit);
        let spliced = splice_call(&mut unit, "main", node).unwrap().unwrap();

        let body = unit.function("main").unwrap().body.as_ref().unwrap();
        assert_eq!(spliced.params.len(), 1);
        assert_eq!(body.successors(spliced.params[0]), &[(node, EdgeLabel::Uncond)]);
        assert_eq!(
            body.instr(spliced.params[0]).unwrap().to_string(),
            "f:x = main:a [param f]"
        );

        let ret = spliced.ret.unwrap();
        assert_eq!(body.successors(node), &[(ret, EdgeLabel::Uncond)]);
        match body.instr(ret).unwrap() {
            Instr::Assign(assign) => {
                assert_eq!(assign.lhs, Expr::var("main:r"));
                assert_eq!(assign.rhs, Expr::var("f:y"));
                assert!(matches!(assign.origin, AssignOrigin::Return { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_two_returns_become_parallel_assignment() {
        let mut unit = unit_with(callee_with_returns(2));
        let node = call_node(&unit);
        let spliced = splice_call(&mut unit, "main", node).unwrap().unwrap();

        let body = unit.function("main").unwrap().body.as_ref().unwrap();
        match body.instr(spliced.ret.unwrap()).unwrap() {
            Instr::Parallel(assigns) => {
                let rhs: Vec<String> = assigns.iter().map(|a| a.rhs.to_string()).collect();
                assert_eq!(rhs, vec!["f:y", "f:x"]);
                assert!(assigns.iter().all(|a| a.lhs == Expr::var("main:r")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_without_result_gets_no_return_assignment() {
        let mut main = FunctionBuilder::new("main", Type::Void);
        main.local("a", Type::int());
        let a = main.var("a");
        main.call("f", vec![a]);
        main.ret(None);

        let mut unit = UnitBuilder::new("test");
        unit.function(callee_with_returns(1))
            .unwrap()
            .function(main)
            .unwrap();
        let mut unit = unit.build();

        let spliced = splice_calls(&mut unit).unwrap();
        assert_eq!(spliced.len(), 1);
        assert_eq!(spliced[0].1.ret, None);
        assert_eq!(spliced[0].1.params.len(), 1);
    }

    #[test]
    fn test_variadic_and_arity_errors() {
        let mut callee = FunctionBuilder::new("f", Type::int());
        callee.param("x", Type::int()).variadic();
        let x = callee.var("x");
        callee.ret(Some(x));
        let mut unit = unit_with(callee);
        let node = call_node(&unit);

        assert!(splice_calls(&mut unit).unwrap().is_empty());
        assert!(matches!(
            splice_call(&mut unit, "main", node),
            Err(AnalysisError::VariadicSplice { .. })
        ));

        let mut callee = FunctionBuilder::new("f", Type::int());
        callee.param("x", Type::int()).param("z", Type::int());
        let x = callee.var("x");
        callee.ret(Some(x));
        let mut unit = unit_with(callee);
        let node = call_node(&unit);
        assert!(matches!(
            splice_call(&mut unit, "main", node),
            Err(AnalysisError::ArityMismatch { args: 1, params: 2, .. })
        ));
    }
}
