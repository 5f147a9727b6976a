use super::FunctionBuilder;
use crate::{
    expr::VarName,
    function::{Function, FunctionSignature},
    types::Type,
    unit::TranslationUnit,
    IrError, Result,
};

pub struct UnitBuilder {
    unit: TranslationUnit,
}

impl UnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            unit: TranslationUnit::new(name),
        }
    }

    /// Globals keep their plain name.
    pub fn global(&mut self, name: &str, ty: Type) -> Result<VarName> {
        if self.unit.globals.contains_key(name) {
            return Err(IrError::DuplicateVariable(name.to_string()));
        }
        self.unit.globals.insert(name.to_string(), ty);
        Ok(name.to_string())
    }

    pub fn add_function(&mut self, function: Function) -> Result<&mut Self> {
        let name = function.name().to_string();
        if self.unit.functions.contains_key(&name) {
            return Err(IrError::DuplicateFunction(name));
        }
        self.unit.functions.insert(name, function);
        Ok(self)
    }

    pub fn function(&mut self, builder: FunctionBuilder) -> Result<&mut Self> {
        let function = builder.build()?;
        self.add_function(function)
    }

    /// Declares an external function without a body.
    pub fn declare(&mut self, signature: FunctionSignature) -> Result<&mut Self> {
        self.add_function(Function::new(signature))
    }

    pub fn build(self) -> TranslationUnit {
        self.unit
    }
}
