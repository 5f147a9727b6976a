use crate::{
    cfg::{Cfg, EdgeLabel, NodeId},
    expr::{Expr, VarName},
    function::{Function, FunctionSignature, Param},
    instructions::Instr,
    types::Type,
    IrError, Result,
};
use indexmap::IndexMap;
use std::collections::HashMap;

enum Jump {
    Goto(String),
    Branch {
        on_true: String,
        on_false: Option<String>,
    },
}

pub struct FunctionBuilder {
    signature: FunctionSignature,
    locals: IndexMap<VarName, Type>,
    cfg: Cfg,
    sequence: Vec<NodeId>,
    labels: HashMap<String, NodeId>,
    jumps: HashMap<NodeId, Jump>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        Self {
            signature: FunctionSignature::new(name, ret),
            locals: IndexMap::new(),
            cfg: Cfg::new(),
            sequence: Vec::new(),
            labels: HashMap::new(),
            jumps: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Qualified name of a local of this function.
    pub fn qualify(&self, name: &str) -> VarName {
        format!("{}:{}", self.signature.name, name)
    }

    pub fn var(&self, name: &str) -> Expr {
        Expr::Var(self.qualify(name))
    }

    pub fn param(&mut self, name: &str, ty: Type) -> &mut Self {
        let qualified = self.qualify(name);
        self.signature.params.push(Param::new(qualified, ty));
        self
    }

    pub fn local(&mut self, name: &str, ty: Type) -> &mut Self {
        let qualified = self.qualify(name);
        self.locals.insert(qualified, ty);
        self
    }

    pub fn variadic(&mut self) -> &mut Self {
        self.signature.variadic = true;
        self
    }

    fn push(&mut self, instr: Instr) -> NodeId {
        let id = self.cfg.add_node(instr);
        self.sequence.push(id);
        id
    }

    pub fn instr(&mut self, instr: Instr) -> NodeId {
        self.push(instr)
    }

    pub fn assign(&mut self, lhs: Expr, rhs: Expr) -> NodeId {
        self.push(Instr::assign(lhs, rhs))
    }

    pub fn call(&mut self, callee: &str, args: Vec<Expr>) -> NodeId {
        self.push(Instr::Call(Expr::call(callee, args)))
    }

    pub fn assign_call(&mut self, lhs: Expr, callee: &str, args: Vec<Expr>) -> NodeId {
        self.push(Instr::assign(lhs, Expr::call(callee, args)))
    }

    pub fn label(&mut self, name: &str) -> Result<NodeId> {
        if self.labels.contains_key(name) {
            return Err(IrError::DuplicateLabel(name.to_string()));
        }
        let id = self.push(Instr::Label(name.to_string()));
        self.labels.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn goto(&mut self, target: &str) -> NodeId {
        let id = self.push(Instr::Goto);
        self.jumps.insert(id, Jump::Goto(target.to_string()));
        id
    }

    /// Jumps to `target` when `cond` is non-zero and falls through otherwise.
    pub fn if_goto(&mut self, cond: Expr, target: &str) -> NodeId {
        let id = self.push(Instr::CondJump(cond));
        self.jumps.insert(
            id,
            Jump::Branch {
                on_true: target.to_string(),
                on_false: None,
            },
        );
        id
    }

    pub fn branch(&mut self, cond: Expr, on_true: &str, on_false: &str) -> NodeId {
        let id = self.push(Instr::CondJump(cond));
        self.jumps.insert(
            id,
            Jump::Branch {
                on_true: on_true.to_string(),
                on_false: Some(on_false.to_string()),
            },
        );
        id
    }

    pub fn ret(&mut self, value: Option<Expr>) -> NodeId {
        self.push(Instr::Return(value))
    }

    fn resolve(&self, label: &str) -> Result<NodeId> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| IrError::UnknownLabel(label.to_string()))
    }

    pub fn build(mut self) -> Result<Function> {
        let entry = self.cfg.entry();
        let exit = self.cfg.exit();
        let first = self.sequence.first().copied().unwrap_or(exit);
        self.cfg.add_edge(entry, first, EdgeLabel::Uncond)?;

        for (index, &node) in self.sequence.iter().enumerate() {
            let fallthrough = self.sequence.get(index + 1).copied().unwrap_or(exit);
            let returns = matches!(self.cfg.instr(node), Some(Instr::Return(_)));

            let edges = match self.jumps.get(&node) {
                Some(Jump::Goto(target)) => vec![(self.resolve(target)?, EdgeLabel::Uncond)],
                Some(Jump::Branch { on_true, on_false }) => {
                    let false_target = match on_false {
                        Some(label) => self.resolve(label)?,
                        None => fallthrough,
                    };
                    vec![
                        (self.resolve(on_true)?, EdgeLabel::True),
                        (false_target, EdgeLabel::False),
                    ]
                }
                None if returns => vec![(exit, EdgeLabel::Uncond)],
                None => vec![(fallthrough, EdgeLabel::Uncond)],
            };

            for (target, label) in edges {
                self.cfg.add_edge(node, target, label)?;
            }
        }

        Ok(Function {
            signature: self.signature,
            locals: self.locals,
            body: Some(self.cfg),
        })
    }
}
