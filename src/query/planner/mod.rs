// Query Planner Module
//
// Logical plans, parameter bindings and the parameter-value based optimizer
// that specializes a plan for one execution.

pub mod logical;
pub mod optimizer;
pub mod parameters;

// Export key types
pub use self::logical::{ColumnReference, Expression, JoinType, LogicalPlan, Operator, OrderingKey, ProjectionColumn};
pub use self::optimizer::{ParameterValueBasedOptimizer, SpecializedPlan};
pub use self::parameters::{ParameterValue, ParameterValues};
