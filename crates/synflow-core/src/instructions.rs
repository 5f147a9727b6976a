use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an assignment came from. Parameter and return assignments are
/// synthesized around call sites by the inter-procedural preprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssignOrigin {
    #[default]
    Source,
    Param { callee: String },
    Return { callee: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    /// One of `Var`, `Deref`, `Index` or `Member`.
    pub lhs: Expr,
    pub rhs: Expr,
    pub origin: AssignOrigin,
}

impl Assign {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Self {
            lhs,
            rhs,
            origin: AssignOrigin::Source,
        }
    }

    pub fn with_origin(mut self, origin: AssignOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// The variable written when the target is a plain variable.
    pub fn lhs_var(&self) -> Option<&str> {
        self.lhs.as_var()
    }

    /// Variables read by the assignment, including the base of an indirect
    /// or aggregate target.
    pub fn uses(&self) -> Vec<&str> {
        let mut uses = self.rhs.vars_read();
        match &self.lhs {
            Expr::Var(_) => {}
            Expr::Deref(ptr) => uses.push(ptr),
            Expr::Index { base, index } => {
                uses.push(base);
                uses.extend(index.vars_read());
            }
            Expr::Member { base, .. } => uses.push(base),
            other => uses.extend(other.vars_read()),
        }
        uses
    }
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Nop,
    Assign(Assign),
    /// A call whose result is discarded. Always holds an `Expr::Call`.
    Call(Expr),
    CondJump(Expr),
    Goto,
    Label(String),
    Return(Option<Expr>),
    /// Alternative assignments evaluated against the same input and merged.
    Parallel(Vec<Assign>),
}

impl Instr {
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Instr::Assign(Assign::new(lhs, rhs))
    }

    /// The call expression executed by this instruction, if any.
    pub fn call_expr(&self) -> Option<&Expr> {
        match self {
            Instr::Call(call) => Some(call),
            Instr::Assign(assign) if assign.rhs.is_call() => Some(&assign.rhs),
            _ => None,
        }
    }

    pub fn direct_callee(&self) -> Option<&str> {
        self.call_expr().and_then(Expr::direct_callee)
    }

    pub fn is_cond_jump(&self) -> bool {
        matches!(self, Instr::CondJump(_))
    }

    /// Variables written directly by name.
    pub fn defs(&self) -> Vec<&str> {
        match self {
            Instr::Assign(assign) => assign.lhs_var().into_iter().collect(),
            Instr::Parallel(assigns) => assigns.iter().filter_map(Assign::lhs_var).collect(),
            _ => Vec::new(),
        }
    }

    pub fn uses(&self) -> Vec<&str> {
        match self {
            Instr::Assign(assign) => assign.uses(),
            Instr::Parallel(assigns) => assigns.iter().flat_map(Assign::uses).collect(),
            Instr::Call(expr) | Instr::CondJump(expr) | Instr::Return(Some(expr)) => {
                expr.vars_read()
            }
            Instr::Nop | Instr::Goto | Instr::Label(_) | Instr::Return(None) => Vec::new(),
        }
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Instr::Assign(assign) => vec![&assign.lhs, &assign.rhs],
            Instr::Parallel(assigns) => assigns.iter().flat_map(|a| [&a.lhs, &a.rhs]).collect(),
            Instr::Call(expr) | Instr::CondJump(expr) | Instr::Return(Some(expr)) => vec![expr],
            Instr::Nop | Instr::Goto | Instr::Label(_) | Instr::Return(None) => Vec::new(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Nop => write!(f, "nop"),
            Instr::Assign(assign) => match &assign.origin {
                AssignOrigin::Source => write!(f, "{}", assign),
                AssignOrigin::Param { callee } => write!(f, "{} [param {}]", assign, callee),
                AssignOrigin::Return { callee } => write!(f, "{} [return {}]", assign, callee),
            },
            Instr::Call(expr) => write!(f, "{}", expr),
            Instr::CondJump(cond) => write!(f, "if {}", cond),
            Instr::Goto => write!(f, "goto"),
            Instr::Label(name) => write!(f, "{}:", name),
            Instr::Return(Some(expr)) => write!(f, "return {}", expr),
            Instr::Return(None) => write!(f, "return"),
            Instr::Parallel(assigns) => {
                let parts: Vec<String> = assigns.iter().map(|a| a.to_string()).collect();
                write!(f, "parallel {{ {} }}", parts.join(" | "))
            }
        }
    }
}
