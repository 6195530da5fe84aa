// Query Diagnostics
//
// Instrumentation sink for command execution and iteration failures.
// Observational only: nothing here influences control flow.

use std::time::Duration;

use log::{debug, error, info};

use crate::common::types::ContextId;
use crate::query::executor::result::QueryError;
use crate::query::planner::parameters::ParameterValues;
use crate::query::sql::command::Command;

/// Failure event raised when advancing a query enumerator fails
#[derive(Debug, Clone, Copy)]
pub struct QueryIterationFailed<'a> {
    /// Type name of the consuming context
    pub context_type: &'a str,
    /// Identity of the owning context instance
    pub context_id: ContextId,
    pub error: &'a QueryError,
}

/// Receives structured query events
pub trait QueryLogger: Send + Sync {
    fn command_executing(&self, _command: &Command, _parameters: &ParameterValues) {}

    fn command_executed(&self, _command: &Command, _elapsed: Duration) {}

    fn command_failed(&self, _command: &Command, _error: &QueryError, _elapsed: Duration) {}

    fn query_iteration_failed(&self, event: &QueryIterationFailed<'_>);
}

/// Logger that forwards events to the `log` facade
#[derive(Debug, Default, Clone)]
pub struct LogQueryLogger {
    sensitive_data_logging: bool,
}

impl LogQueryLogger {
    pub fn new(sensitive_data_logging: bool) -> Self {
        LogQueryLogger { sensitive_data_logging }
    }

    fn describe_parameters(&self, command: &Command, parameters: &ParameterValues) -> String {
        command
            .parameters
            .iter()
            .map(|p| match (self.sensitive_data_logging, parameters.get(&p.name)) {
                (true, Some(value)) => format!("{}={:?}", p.placeholder, value),
                _ => format!("{}=?", p.placeholder),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl QueryLogger for LogQueryLogger {
    fn command_executing(&self, command: &Command, parameters: &ParameterValues) {
        debug!("Executing command [{}]\n{}", self.describe_parameters(command, parameters), command.text);
    }

    fn command_executed(&self, command: &Command, elapsed: Duration) {
        info!("Executed command ({}ms)\n{}", elapsed.as_millis(), command.text);
    }

    fn command_failed(&self, command: &Command, err: &QueryError, elapsed: Duration) {
        error!("Failed executing command ({}ms): {}\n{}", elapsed.as_millis(), err, command.text);
    }

    fn query_iteration_failed(&self, event: &QueryIterationFailed<'_>) {
        error!(
            "An error occurred while iterating over the results of a query for context type '{}' ({}): {}",
            event.context_type, event.context_id, event.error
        );
    }
}
