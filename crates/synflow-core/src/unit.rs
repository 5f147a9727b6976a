use crate::expr::VarName;
use crate::function::Function;
use crate::instructions::Instr;
use crate::types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A whole program: globals plus every defined or declared function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TranslationUnit {
    pub name: String,
    pub globals: IndexMap<VarName, Type>,
    pub functions: IndexMap<String, Function>,
}

impl TranslationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: IndexMap::new(),
            functions: IndexMap::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn is_global(&self, var: &str) -> bool {
        self.globals.contains_key(var)
    }

    /// Function owning a qualified local name (`func:var`).
    pub fn owner_of<'a>(&self, var: &'a str) -> Option<&'a str> {
        var.split_once(':').map(|(func, _)| func)
    }

    pub fn var_type(&self, var: &str) -> Option<&Type> {
        if let Some(ty) = self.globals.get(var) {
            return Some(ty);
        }
        self.owner_of(var)
            .and_then(|owner| self.functions.get(owner))
            .and_then(|func| func.local_type(var))
    }

    /// Variables whose address is taken anywhere in the unit.
    pub fn address_taken(&self) -> BTreeSet<VarName> {
        let mut taken = BTreeSet::new();
        for func in self.functions.values() {
            let Some(body) = &func.body else { continue };
            for node in body.nodes() {
                for expr in node.instr.exprs() {
                    taken.extend(expr.addresses_taken().into_iter().map(str::to_string));
                }
            }
        }
        taken
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values().filter(|f| f.is_defined())
    }

    pub fn call_sites(&self, func: &str) -> Vec<(crate::cfg::NodeId, &Instr)> {
        let Some(body) = self.function(func).and_then(|f| f.body.as_ref()) else {
            return Vec::new();
        };
        body.nodes()
            .filter(|n| n.instr.call_expr().is_some())
            .map(|n| (n.id, &n.instr))
            .collect()
    }
}
