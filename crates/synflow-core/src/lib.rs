/*! Three-address IR and the synergistic dataflow engine built on it.
 *
 * The IR is a node-level control-flow graph over C-like three-address code. The engine runs
 * several client analyses over one graph at once; analyses that cannot decide something on
 * their own ask the others through simplification queries, and the host iterates all of them
 * to a common fixpoint. `IpaHost` extends this across calls with value contexts.
 */

pub mod analysis;
pub mod builder;
pub mod cfg;
pub mod expr;
pub mod function;
pub mod instructions;
pub mod types;
pub mod unit;

pub use builder::{FunctionBuilder, UnitBuilder};
pub use cfg::{Cfg, CfgNode, EdgeLabel, NodeId};
pub use expr::{BinaryOp, Callee, Expr, Literal, UnaryOp, VarName};
pub use function::{Function, FunctionSignature, Param};
pub use instructions::{Assign, AssignOrigin, Instr};
pub use types::{FunctionType, Type};
pub use unit::TranslationUnit;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("Unknown label: {0}")]
    UnknownLabel(String),
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("Unknown node: n{0}")]
    UnknownNode(u32),
    #[error("Duplicate function: {0}")]
    DuplicateFunction(String),
    #[error("Duplicate variable: {0}")]
    DuplicateVariable(String),
    #[error("Function not found: {0}")]
    FunctionNotFound(String),
}

pub type Result<T> = std::result::Result<T, IrError>;
