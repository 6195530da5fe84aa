// Common types shared across the pipeline

pub mod types;

pub use self::types::{ContextId, ParameterName};
