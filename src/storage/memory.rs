// In-Memory Backend
//
// Keeps named tables in process and executes commands by interpreting the
// specialized plan carried by the command. Results are buffered at execute
// time and streamed through the cursor one row at a time.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::query::executor::expression_eval::{evaluate_expression, evaluate_predicate};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};
use crate::query::planner::logical::{Expression, JoinType, LogicalPlan};
use crate::query::planner::parameters::ParameterValues;
use crate::query::sql::command::Command;
use crate::storage::connection::Backend;
use crate::storage::cursor::Cursor;

/// A table held in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<DataValue>>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; the value count must match the column count
    pub fn insert(&mut self, values: Vec<DataValue>) -> QueryResult<()> {
        if values.len() != self.columns.len() {
            return Err(QueryError::TypeError(format!(
                "Row has {} values, but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(values);
        Ok(())
    }
}

/// On-disk dataset format: `{"tables": {"name": {"columns": [..], "rows": [[..]]}}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub tables: BTreeMap<String, MemoryTable>,
}

/// Backend that keeps its tables in memory
pub struct MemoryBackend {
    name: String,
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    executions: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        MemoryBackend {
            name: name.to_string(),
            tables: RwLock::new(BTreeMap::new()),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn from_dataset(name: &str, dataset: Dataset) -> QueryResult<Self> {
        let backend = MemoryBackend::new(name);
        for (table_name, table) in dataset.tables {
            for row in &table.rows {
                if row.len() != table.columns.len() {
                    return Err(QueryError::Configuration(format!(
                        "Table '{}' has a row with {} values for {} columns",
                        table_name,
                        row.len(),
                        table.columns.len()
                    )));
                }
            }
            backend.add_table(&table_name, table);
        }
        Ok(backend)
    }

    /// Load a dataset from a JSON file
    pub fn from_json_file(name: &str, path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Configuration(format!("Cannot read {}: {}", path.display(), e)))?;
        let dataset: Dataset = serde_json::from_str(&text)
            .map_err(|e| QueryError::Configuration(format!("Invalid dataset {}: {}", path.display(), e)))?;
        info!("Loaded {} table(s) from {}", dataset.tables.len(), path.display());
        Self::from_dataset(name, dataset)
    }

    pub fn add_table(&self, name: &str, table: MemoryTable) {
        self.tables.write().insert(name.to_string(), table);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn evaluate(&self, plan: &LogicalPlan, parameters: &ParameterValues) -> QueryResult<Relation> {
        match plan {
            LogicalPlan::Scan { table_name, alias } => {
                let tables = self.tables.read();
                let table = tables
                    .get(table_name)
                    .ok_or_else(|| QueryError::TableNotFound(table_name.clone()))?;
                let columns: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| match alias {
                        Some(a) => format!("{}.{}", a, c),
                        None => c.clone(),
                    })
                    .collect();
                let rows = table
                    .rows
                    .iter()
                    .map(|values| Row::from_values(columns.clone(), values.clone()))
                    .collect();
                Ok(Relation { columns, rows })
            }
            LogicalPlan::Filter { predicate, input } => {
                let mut relation = self.evaluate(input, parameters)?;
                let mut kept = Vec::with_capacity(relation.rows.len());
                for row in relation.rows {
                    if evaluate_predicate(predicate, &row, parameters)? {
                        kept.push(row);
                    }
                }
                relation.rows = kept;
                Ok(relation)
            }
            LogicalPlan::Projection { columns, input } => {
                let relation = self.evaluate(input, parameters)?;
                let names: Vec<String> = columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c.output_name(i))
                    .collect();
                ensure_distinct(&names, "projection")?;
                let mut rows = Vec::with_capacity(relation.rows.len());
                for row in &relation.rows {
                    let mut values = Vec::with_capacity(columns.len());
                    for column in columns {
                        values.push(evaluate_expression(&column.expr, row, parameters)?);
                    }
                    rows.push(Row::from_values(names.clone(), values));
                }
                Ok(Relation { columns: names, rows })
            }
            LogicalPlan::Join { left, right, condition, join_type } => {
                let left = self.evaluate(left, parameters)?;
                let right = self.evaluate(right, parameters)?;
                let mut columns = left.columns.clone();
                columns.extend(right.columns.iter().cloned());
                // Merged rows are keyed by name, so a shared name would lose a side
                ensure_distinct(&columns, "join")?;

                let mut rows = Vec::new();
                for l in &left.rows {
                    let mut matched = false;
                    for r in &right.rows {
                        let merged = merge(l, r);
                        if evaluate_predicate(condition, &merged, parameters)? {
                            matched = true;
                            rows.push(merged);
                        }
                    }
                    if !matched && *join_type == JoinType::Left {
                        let mut padded = l.clone();
                        for name in &right.columns {
                            padded.set(name.clone(), DataValue::Null);
                        }
                        rows.push(padded);
                    }
                }
                Ok(Relation { columns, rows })
            }
            LogicalPlan::Sort { keys, input } => {
                let relation = self.evaluate(input, parameters)?;
                let mut keyed = Vec::with_capacity(relation.rows.len());
                for row in relation.rows {
                    let mut values = Vec::with_capacity(keys.len());
                    for key in keys {
                        values.push(evaluate_expression(&key.expr, &row, parameters)?);
                    }
                    keyed.push((values, row));
                }

                let mut error = None;
                keyed.sort_by(|(a, _), (b, _)| {
                    for (i, key) in keys.iter().enumerate() {
                        match a[i].compare(&b[i]) {
                            Ok(std::cmp::Ordering::Equal) => continue,
                            Ok(ordering) if key.descending => return ordering.reverse(),
                            Ok(ordering) => return ordering,
                            Err(e) => {
                                error.get_or_insert(e);
                                return std::cmp::Ordering::Equal;
                            }
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                if let Some(e) = error {
                    return Err(e);
                }

                Ok(Relation {
                    columns: relation.columns,
                    rows: keyed.into_iter().map(|(_, row)| row).collect(),
                })
            }
            LogicalPlan::Limit { count, offset, input } => {
                let mut relation = self.evaluate(input, parameters)?;
                let count = row_count(count, parameters)?;
                let offset = match offset {
                    Some(offset) => row_count(offset, parameters)?,
                    None => 0,
                };
                relation.rows = relation.rows.into_iter().skip(offset).take(count).collect();
                Ok(relation)
            }
        }
    }
}

fn merge(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    for (name, value) in right.values_with_names() {
        merged.set(name.clone(), value.clone());
    }
    merged
}

fn ensure_distinct(columns: &[String], operation: &str) -> QueryResult<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(QueryError::Execution(format!(
                "Column name '{}' is ambiguous in {}; qualify the sources with aliases",
                column, operation
            )));
        }
    }
    Ok(())
}

fn row_count(expr: &Expression, parameters: &ParameterValues) -> QueryResult<usize> {
    match evaluate_expression(expr, &Row::new(), parameters)? {
        DataValue::Integer(n) if n >= 0 => Ok(n as usize),
        other => Err(QueryError::Execution(format!(
            "Row count must be a non-negative integer, got {}", other
        ))),
    }
}

struct Relation {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> QueryResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> QueryResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn execute_reader(&self, command: &Command, parameters: &ParameterValues) -> QueryResult<Box<dyn Cursor>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let relation = self.evaluate(&command.plan, parameters)?;
        debug!("Memory backend '{}' buffered {} row(s)", self.name, relation.rows.len());
        Ok(Box::new(MemoryCursor {
            columns: relation.columns,
            rows: relation.rows.into_iter(),
            current: None,
        }))
    }
}

/// Cursor over a buffered result
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
}

impl Cursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn read(&mut self) -> QueryResult<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}
