// Query Context
//
// Per-context state shared by every query it runs: the connection, the
// current parameter values, the logger and the configuration.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::ContextId;
use crate::config::PipelineConfig;
use crate::query::executor::diagnostics::{LogQueryLogger, QueryLogger};
use crate::query::planner::parameters::{ParameterValue, ParameterValues};
use crate::storage::connection::{Backend, SharedConnection};

pub struct QueryContext {
    context_id: ContextId,
    connection: Arc<SharedConnection>,
    parameter_values: RwLock<ParameterValues>,
    logger: Arc<dyn QueryLogger>,
    config: PipelineConfig,
}

impl QueryContext {
    pub fn new(connection: Arc<SharedConnection>, logger: Arc<dyn QueryLogger>, config: PipelineConfig) -> Self {
        QueryContext {
            context_id: ContextId::next(),
            connection,
            parameter_values: RwLock::new(ParameterValues::new()),
            logger,
            config,
        }
    }

    /// Context over a backend with a fresh connection and the `log` logger
    pub fn for_backend(backend: Arc<dyn Backend>, config: PipelineConfig) -> Self {
        let logger = Arc::new(LogQueryLogger::new(config.sensitive_data_logging));
        QueryContext::new(Arc::new(SharedConnection::new(backend)), logger, config)
    }

    pub fn with_parameters(self, parameters: ParameterValues) -> Self {
        *self.parameter_values.write() = parameters;
        self
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn connection(&self) -> &Arc<SharedConnection> {
        &self.connection
    }

    pub fn logger(&self) -> &Arc<dyn QueryLogger> {
        &self.logger
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Bind a parameter for subsequent executions. Executions already running
    /// keep the snapshot they started with.
    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.parameter_values.write().insert(name, value);
    }

    /// Snapshot of the current parameter values
    pub fn parameter_values(&self) -> ParameterValues {
        self.parameter_values.read().clone()
    }
}
