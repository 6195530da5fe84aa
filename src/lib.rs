// Bayun Query Pipeline

pub mod common;
pub mod config;
pub mod query;
pub mod storage;

// Re-export key items for convenient access
pub use config::PipelineConfig;
pub use query::executor::context::QueryContext;
pub use query::executor::coordinator::ResultCoordinator;
pub use query::executor::diagnostics::{LogQueryLogger, QueryIterationFailed, QueryLogger};
pub use query::executor::enumerable::{EnumeratorStatus, QueryingEnumerable, QueryingEnumerator};
pub use query::executor::result::{DataValue, QueryError, QueryResult, QueryResultSet, Row};
pub use query::executor::shaper::{Group, GroupingShaper, Shaper, row_shaper, shaper, typed_shaper};
pub use query::planner::logical::{Expression, LogicalPlan};
pub use query::planner::optimizer::{ParameterValueBasedOptimizer, SpecializedPlan};
pub use query::planner::parameters::{ParameterValue, ParameterValues};
pub use query::sql::command::Command;
pub use query::sql::generator::{CommandCompiler, CommandCompilerFactory, SqlGenerator, SqlGeneratorFactory};
pub use storage::connection::{Backend, SharedConnection};
pub use storage::cursor::{Cursor, DataReader};
pub use storage::memory::MemoryBackend;
