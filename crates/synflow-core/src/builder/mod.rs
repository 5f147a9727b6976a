/*! Builders for labelled three-address code.
 *
 * Functions are written as a linear instruction list with labels and jumps, the shape a C
 * front end lowers to. `build()` resolves the labels and wires the node-level CFG.
 */

pub mod function_builder;
pub mod unit_builder;

pub use function_builder::FunctionBuilder;
pub use unit_builder::UnitBuilder;
