// Parameter Bindings
//
// Runtime parameter values supplied fresh for every execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::types::ParameterName;
use crate::query::executor::result::{DataValue, QueryError, QueryResult};

/// Value bound to a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Collection value, used by `IN @param`. Listed first so JSON arrays
    /// deserialize as lists rather than blobs.
    List(Vec<DataValue>),
    Scalar(DataValue),
}

impl ParameterValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Scalar(DataValue::Null))
    }

    /// Convert a JSON value: arrays become lists, scalars become scalars
    pub fn from_json(value: &serde_json::Value) -> QueryResult<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(DataValue::from_json)
                .collect::<QueryResult<Vec<_>>>()
                .map(ParameterValue::List),
            other => DataValue::from_json(other).map(ParameterValue::Scalar),
        }
    }
}

impl From<DataValue> for ParameterValue {
    fn from(value: DataValue) -> Self {
        ParameterValue::Scalar(value)
    }
}

impl From<Vec<DataValue>> for ParameterValue {
    fn from(values: Vec<DataValue>) -> Self {
        ParameterValue::List(values)
    }
}

/// Mapping from parameter name to runtime value
///
/// Ordered by name so that snapshots compare and render deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValues {
    values: BTreeMap<ParameterName, ParameterValue>,
}

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Look up a parameter, failing when it has no binding
    pub fn require(&self, name: &str) -> QueryResult<&ParameterValue> {
        self.values
            .get(name)
            .ok_or_else(|| QueryError::ParameterNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterName, &ParameterValue)> {
        self.values.iter()
    }

    /// Parse a `name=json` assignment, as accepted on the command line.
    /// Values that are not valid JSON are taken as text.
    pub fn parse_assignment(assignment: &str) -> QueryResult<(ParameterName, ParameterValue)> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            QueryError::InvalidOperation(format!("Expected name=value, got '{}'", assignment))
        })?;
        let name = name.trim().trim_start_matches('@').to_string();
        if name.is_empty() {
            return Err(QueryError::InvalidOperation(format!("Missing parameter name in '{}'", assignment)));
        }
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => ParameterValue::from_json(&json)?,
            Err(_) => ParameterValue::Scalar(DataValue::Text(raw.to_string())),
        };
        Ok((name, value))
    }
}

impl FromIterator<(ParameterName, ParameterValue)> for ParameterValues {
    fn from_iter<I: IntoIterator<Item = (ParameterName, ParameterValue)>>(iter: I) -> Self {
        ParameterValues {
            values: iter.into_iter().collect(),
        }
    }
}
