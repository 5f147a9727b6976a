use crate::cfg::Cfg;
use crate::expr::VarName;
use crate::types::{FunctionType, Type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub signature: FunctionSignature,
    /// Locals other than parameters, by qualified name.
    pub locals: IndexMap<VarName, Type>,
    /// `None` for declarations without a definition.
    pub body: Option<Cfg>,
}

impl Function {
    pub fn new(signature: FunctionSignature) -> Self {
        Self {
            signature,
            locals: IndexMap::new(),
            body: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn is_defined(&self) -> bool {
        self.body.is_some()
    }

    pub fn is_variadic(&self) -> bool {
        self.signature.variadic
    }

    pub fn params(&self) -> &[Param] {
        &self.signature.params
    }

    /// Parameters and locals.
    pub fn is_local(&self, var: &str) -> bool {
        self.locals.contains_key(var) || self.signature.params.iter().any(|p| p.name == var)
    }

    pub fn local_type(&self, var: &str) -> Option<&Type> {
        self.locals.get(var).or_else(|| {
            self.signature
                .params
                .iter()
                .find(|p| p.name == var)
                .map(|p| &p.ty)
        })
    }

    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.signature
            .params
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.locals.keys().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub variadic: bool,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret,
            variadic: false,
        }
    }

    pub fn function_type(&self) -> FunctionType {
        FunctionType {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.ret.clone(),
            variadic: self.variadic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: VarName,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<VarName>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
