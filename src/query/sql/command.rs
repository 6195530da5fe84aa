// Executable Command
//
// Backend text plus parameter definitions, produced by the command compiler
// and executed once against an acquired shared connection.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::common::types::ParameterName;
use crate::query::executor::diagnostics::QueryLogger;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::planner::logical::LogicalPlan;
use crate::query::planner::parameters::ParameterValues;
use crate::storage::connection::SharedConnection;
use crate::storage::cursor::DataReader;

/// A parameter the command binds at execution time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParameter {
    /// Parameter name in the bindings
    pub name: ParameterName,
    /// Placeholder used in the command text
    pub placeholder: String,
}

/// Compiled, executable command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Backend command text
    pub text: String,
    /// Parameters in order of first appearance in the text
    pub parameters: Vec<CommandParameter>,
    /// The specialized plan the text was generated from, for backends that
    /// interpret plans directly
    pub plan: Arc<LogicalPlan>,
}

impl Command {
    /// Pick the values of this command's parameters out of a snapshot
    pub fn bind(&self, parameter_values: &ParameterValues) -> QueryResult<ParameterValues> {
        self.parameters
            .iter()
            .map(|p| {
                parameter_values
                    .get(&p.name)
                    .cloned()
                    .map(|value| (p.name.clone(), value))
                    .ok_or_else(|| QueryError::Execution(format!(
                        "No value supplied for parameter {}", p.placeholder
                    )))
            })
            .collect()
    }

    /// Execute the command and open a reader over the result.
    ///
    /// The connection must already be acquired by the caller; this never
    /// changes its use-count.
    pub fn execute_reader(
        &self,
        connection: &SharedConnection,
        parameter_values: &ParameterValues,
        logger: &dyn QueryLogger,
    ) -> QueryResult<DataReader> {
        let bound = self.bind(parameter_values)?;
        logger.command_executing(self, &bound);
        let started = Instant::now();
        match connection.execute(self, &bound) {
            Ok(cursor) => {
                logger.command_executed(self, started.elapsed());
                Ok(DataReader::new(cursor))
            }
            Err(error) => {
                logger.command_failed(self, &error, started.elapsed());
                Err(error)
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
