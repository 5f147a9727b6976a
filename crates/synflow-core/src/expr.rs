use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variables are identified by name. Locals are qualified with their function
/// (`main:a`), globals are not.
pub type VarName = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

impl Literal {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v),
            Literal::Float(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Literal::Int(v) => *v == 0,
            Literal::Float(v) => *v == 0.0,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    /// Evaluates the operator on two integers. `None` on overflow, division by
    /// zero or an out-of-range shift.
    pub fn eval_int(&self, left: i64, right: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => left.checked_add(right),
            BinaryOp::Sub => left.checked_sub(right),
            BinaryOp::Mul => left.checked_mul(right),
            BinaryOp::Div => left.checked_div(right),
            BinaryOp::Mod => left.checked_rem(right),
            BinaryOp::Shl => u32::try_from(right).ok().and_then(|s| left.checked_shl(s)),
            BinaryOp::Shr => u32::try_from(right).ok().and_then(|s| left.checked_shr(s)),
            BinaryOp::BitAnd => Some(left & right),
            BinaryOp::BitOr => Some(left | right),
            BinaryOp::BitXor => Some(left ^ right),
            BinaryOp::Lt => Some((left < right) as i64),
            BinaryOp::Le => Some((left <= right) as i64),
            BinaryOp::Gt => Some((left > right) as i64),
            BinaryOp::Ge => Some((left >= right) as i64),
            BinaryOp::Eq => Some((left == right) as i64),
            BinaryOp::Ne => Some((left != right) as i64),
        }
    }

    pub fn eval_float(&self, left: f64, right: f64) -> Option<Literal> {
        let value = match self {
            BinaryOp::Add => Literal::Float(left + right),
            BinaryOp::Sub => Literal::Float(left - right),
            BinaryOp::Mul => Literal::Float(left * right),
            BinaryOp::Div if right != 0.0 => Literal::Float(left / right),
            BinaryOp::Lt => Literal::Int((left < right) as i64),
            BinaryOp::Le => Literal::Int((left <= right) as i64),
            BinaryOp::Gt => Literal::Int((left > right) as i64),
            BinaryOp::Ge => Literal::Int((left >= right) as i64),
            BinaryOp::Eq => Literal::Int((left == right) as i64),
            BinaryOp::Ne => Literal::Int((left != right) as i64),
            _ => return None,
        };
        Some(value)
    }

    pub fn eval(&self, left: Literal, right: Literal) -> Option<Literal> {
        match (left, right) {
            (Literal::Int(l), Literal::Int(r)) => self.eval_int(l, r).map(Literal::Int),
            (Literal::Float(l), Literal::Float(r)) => self.eval_float(l, r),
            (Literal::Int(l), Literal::Float(r)) => self.eval_float(l as f64, r),
            (Literal::Float(l), Literal::Int(r)) => self.eval_float(l, r as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }

    pub fn eval(&self, operand: Literal) -> Option<Literal> {
        match (self, operand) {
            (UnaryOp::Neg, Literal::Int(v)) => v.checked_neg().map(Literal::Int),
            (UnaryOp::Neg, Literal::Float(v)) => Some(Literal::Float(-v)),
            (UnaryOp::Not, lit) => Some(Literal::Int(lit.is_zero() as i64)),
            (UnaryOp::BitNot, Literal::Int(v)) => Some(Literal::Int(!v)),
            (UnaryOp::BitNot, Literal::Float(_)) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    Direct(String),
    Pointer(VarName),
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Direct(name) => write!(f, "{}", name),
            Callee::Pointer(var) => write!(f, "(*{})", var),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Lit(Literal),
    Var(VarName),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Deref(VarName),
    AddrOf(VarName),
    Index {
        base: VarName,
        index: Box<Expr>,
    },
    Member {
        base: VarName,
        field: String,
        through_pointer: bool,
    },
    Cast {
        ty: Type,
        operand: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<VarName>) -> Self {
        Expr::Var(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Lit(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Lit(Literal::Float(value))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn deref(name: impl Into<VarName>) -> Self {
        Expr::Deref(name.into())
    }

    pub fn addr_of(name: impl Into<VarName>) -> Self {
        Expr::AddrOf(name.into())
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Callee::Direct(callee.into()),
            args,
        }
    }

    pub fn call_pointer(pointer: impl Into<VarName>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Callee::Pointer(pointer.into()),
            args,
        }
    }

    /// Literals and plain variable references.
    pub fn is_unit(&self) -> bool {
        matches!(self, Expr::Lit(_) | Expr::Var(_))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<Literal> {
        match self {
            Expr::Lit(lit) => Some(*lit),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Expr::Call { .. })
    }

    pub fn direct_callee(&self) -> Option<&str> {
        match self {
            Expr::Call {
                callee: Callee::Direct(name),
                ..
            } => Some(name),
            _ => None,
        }
    }

    /// Variables whose value is read when the expression is evaluated. The
    /// pointee of a dereference is not included since it is not known statically.
    pub fn vars_read(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        self.collect_reads(&mut vars);
        vars
    }

    fn collect_reads<'a>(&'a self, vars: &mut Vec<&'a str>) {
        match self {
            Expr::Lit(_) | Expr::AddrOf(_) => {}
            Expr::Var(name) | Expr::Deref(name) => vars.push(name),
            Expr::Binary { left, right, .. } => {
                left.collect_reads(vars);
                right.collect_reads(vars);
            }
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => {
                operand.collect_reads(vars)
            }
            Expr::Index { base, index } => {
                vars.push(base);
                index.collect_reads(vars);
            }
            Expr::Member { base, .. } => vars.push(base),
            Expr::Call { callee, args } => {
                if let Callee::Pointer(ptr) = callee {
                    vars.push(ptr);
                }
                for arg in args {
                    arg.collect_reads(vars);
                }
            }
        }
    }

    pub fn addresses_taken(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_addresses(&mut names);
        names
    }

    fn collect_addresses<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::AddrOf(name) => names.push(name),
            Expr::Binary { left, right, .. } => {
                left.collect_addresses(names);
                right.collect_addresses(names);
            }
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => {
                operand.collect_addresses(names)
            }
            Expr::Index { index, .. } => index.collect_addresses(names),
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_addresses(names);
                }
            }
            Expr::Lit(_) | Expr::Var(_) | Expr::Deref(_) | Expr::Member { .. } => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(lit) => write!(f, "{}", lit),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Binary { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expr::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Expr::Deref(name) => write!(f, "*{}", name),
            Expr::AddrOf(name) => write!(f, "&{}", name),
            Expr::Index { base, index } => write!(f, "{}[{}]", base, index),
            Expr::Member {
                base,
                field,
                through_pointer,
            } => {
                let sep = if *through_pointer { "->" } else { "." };
                write!(f, "{}{}{}", base, sep, field)
            }
            Expr::Cast { ty, operand } => write!(f, "({}) {}", ty, operand),
            Expr::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", callee, args.join(", "))
            }
        }
    }
}
