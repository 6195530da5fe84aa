// Pipeline Configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::sql::generator::SqlGeneratorOptions;

/// Configuration shared by every query of a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Include parameter values in command logs
    pub sensitive_data_logging: bool,
    /// Context type name reported in failure events
    pub context_type: String,
    /// SQL dialect options for the command compiler
    pub sql: SqlGeneratorOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sensitive_data_logging: false,
            context_type: "QueryContext".to_string(),
            sql: SqlGeneratorOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Configuration(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| QueryError::Configuration(format!("Invalid config {}: {}", path.display(), e)))
    }
}
