// Query Result Implementation
//
// This module defines the value, row and error types shared by the pipeline.

use std::cmp::Ordering;
use std::fmt;

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Possible data types for values in a row
///
/// Serialized untagged so JSON scalars map directly onto values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(String),
    Timestamp(String),
    Blob(Vec<u8>),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Date(s) => write!(f, "DATE '{}'", s),
            DataValue::Timestamp(s) => write!(f, "TIMESTAMP '{}'", s),
            DataValue::Blob(b) => write!(f, "BLOB ({} bytes)", b.len()),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Null, _) => Some(Ordering::Less),
            (_, DataValue::Null) => Some(Ordering::Greater),

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            (DataValue::Date(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Blob(a), DataValue::Blob(b)) if a == b => Some(Ordering::Equal),

            (DataValue::Text(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Text(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Text(b)) => Some(a.cmp(b)),

            _ => None,
        }
    }
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Compare two DataValues for sorting purposes.
    /// NULLs sort before any non-NULL value.
    pub fn compare(&self, other: &Self) -> QueryResult<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ok(Ordering::Equal),
            (DataValue::Null, _) => Ok(Ordering::Less),
            (_, DataValue::Null) => Ok(Ordering::Greater),
            (a, b) => a.partial_cmp(b).ok_or_else(||
                QueryError::TypeError(format!("Cannot compare incompatible values: {:?} and {:?}", a, b))
            ),
        }
    }

    /// Render the value as a SQL literal
    pub fn to_sql_literal(&self) -> String {
        match self {
            DataValue::Null => "NULL".to_string(),
            DataValue::Integer(i) => i.to_string(),
            DataValue::Float(f) => f.to_string(),
            DataValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DataValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DataValue::Date(s) => format!("DATE '{}'", s.replace('\'', "''")),
            DataValue::Timestamp(s) => format!("TIMESTAMP '{}'", s.replace('\'', "''")),
            DataValue::Blob(b) => format!("X'{}'", hex::encode(b)),
        }
    }

    /// Convert a JSON scalar into a value. Arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> QueryResult<Self> {
        match value {
            serde_json::Value::Null => Ok(DataValue::Null),
            serde_json::Value::Bool(b) => Ok(DataValue::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(DataValue::Integer(i)),
                None => n.as_f64()
                    .map(DataValue::Float)
                    .ok_or_else(|| QueryError::TypeError(format!("Unsupported number: {}", n))),
            },
            serde_json::Value::String(s) => Ok(DataValue::Text(s.clone())),
            other => Err(QueryError::TypeError(format!("Expected a JSON scalar, found {}", other))),
        }
    }

    /// Convert the value into JSON. Dates and timestamps become strings,
    /// blobs become hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Null => serde_json::Value::Null,
            DataValue::Integer(i) => serde_json::Value::from(*i),
            DataValue::Float(f) => serde_json::Value::from(*f),
            DataValue::Text(s) | DataValue::Date(s) | DataValue::Timestamp(s) => serde_json::Value::String(s.clone()),
            DataValue::Boolean(b) => serde_json::Value::Bool(*b),
            DataValue::Blob(b) => serde_json::Value::String(hex::encode(b)),
        }
    }
}

/// Represents a row in query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Values keyed by column name, in column order
    values: LinkedHashMap<String, DataValue>,
}

impl Eq for Row {}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Row {
            values: LinkedHashMap::new(),
        }
    }

    /// Create a row from column values
    pub fn from_values(columns: Vec<String>, values: Vec<DataValue>) -> Self {
        let mut row = Row::new();
        for (col, val) in columns.into_iter().zip(values) {
            row.values.insert(col, val);
        }
        row
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&DataValue> {
        self.values.get(column)
    }

    /// Set a value for a column, appending the column if it is new
    pub fn set(&mut self, column: String, value: DataValue) {
        self.values.insert(column, value);
    }

    /// Get all column names in order
    pub fn columns(&self) -> Vec<&String> {
        self.values.keys().collect()
    }

    /// Get all values in column order
    pub fn values(&self) -> Vec<&DataValue> {
        self.values.values().collect()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get all values with their corresponding column names
    pub fn values_with_names(&self) -> impl Iterator<Item = (&String, &DataValue)> {
        self.values.iter()
    }

    /// Convert the row into a JSON object keyed by column name
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// Represents query execution error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The plan and the parameter snapshot are structurally incompatible
    #[error("Plan specialization error: {0}")]
    PlanSpecialization(String),
    /// The specialized plan could not be compiled into a command
    #[error("Compilation error: {0}")]
    Compilation(String),
    /// Opening, closing or using the connection failed
    #[error("Connection error: {0}")]
    Connection(String),
    /// Executing the command or reading from the cursor failed
    #[error("Execution error: {0}")]
    Execution(String),
    /// Converting a row into an output element failed
    #[error("Shaping error: {0}")]
    Shaping(String),
    /// Error in data type handling
    #[error("Type error: {0}")]
    TypeError(String),
    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),
    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    /// Parameter not found in the bindings
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),
    /// Invalid operation, signals misuse rather than a runtime condition
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// Configuration or data file could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Shaping(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Fully materialized resultset, used for display
#[derive(Debug)]
pub struct QueryResultSet {
    /// Column names in the resultset
    columns: Vec<String>,
    /// Rows of data
    rows: Vec<Row>,
}

impl QueryResultSet {
    /// Create a new empty resultset with column names
    pub fn new(columns: Vec<String>) -> Self {
        QueryResultSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row to the resultset
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Get the columns in the resultset
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the rows in the resultset
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Format the resultset as a string table
    pub fn to_string_table(&self) -> String {
        if self.columns.is_empty() {
            return "Empty result".to_string();
        }

        let mut result = String::new();

        result.push_str("| ");
        for col in &self.columns {
            result.push_str(&format!("{} | ", col));
        }
        result.push('\n');

        result.push('|');
        for col in &self.columns {
            result.push_str(&format!("{}|", "-".repeat(col.len() + 2)));
        }
        result.push('\n');

        for row in &self.rows {
            result.push_str("| ");
            for col in &self.columns {
                match row.get(col) {
                    Some(value) => result.push_str(&format!("{} | ", value)),
                    None => result.push_str("NULL | "),
                }
            }
            result.push('\n');
        }

        result
    }
}
