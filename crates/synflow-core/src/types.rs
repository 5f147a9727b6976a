use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Int { bits: u16, signed: bool },
    Float { bits: u16 },
    Char,
    Ptr(Box<Type>),
    Array(Box<Type>, Option<u64>),
    Record(String),
    Function(Box<FunctionType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Type,
    pub variadic: bool,
}

impl Type {
    pub fn int() -> Self {
        Type::Int {
            bits: 32,
            signed: true,
        }
    }

    pub fn float() -> Self {
        Type::Float { bits: 64 }
    }

    pub fn ptr_to(inner: Type) -> Self {
        Type::Ptr(Box::new(inner))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Char)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_function_pointer(&self) -> bool {
        matches!(self, Type::Ptr(inner) if matches!(**inner, Type::Function(_)))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array(..) | Type::Record(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            Type::Array(elem, _) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int { bits, signed: true } => write!(f, "i{}", bits),
            Type::Int {
                bits,
                signed: false,
            } => write!(f, "u{}", bits),
            Type::Float { bits } => write!(f, "f{}", bits),
            Type::Char => write!(f, "char"),
            Type::Ptr(inner) => write!(f, "{}*", inner),
            Type::Array(elem, Some(len)) => write!(f, "{}[{}]", elem, len),
            Type::Array(elem, None) => write!(f, "{}[]", elem),
            Type::Record(name) => write!(f, "struct {}", name),
            Type::Function(ft) => write!(f, "{}", ft),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "{} ({}", self.ret, params.join(", "))?;
        if self.variadic {
            if self.params.is_empty() {
                write!(f, "...")?;
            } else {
                write!(f, ", ...")?;
            }
        }
        write!(f, ")")
    }
}
