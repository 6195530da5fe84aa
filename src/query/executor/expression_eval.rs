// Expression Evaluation Utility
//
// Evaluates plan expressions against a single row with SQL three-valued logic.

use std::cmp::Ordering;

use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};
use crate::query::planner::logical::{ColumnReference, Expression, Operator};
use crate::query::planner::parameters::{ParameterValue, ParameterValues};

/// Evaluate an expression in the context of a single row
pub fn evaluate_expression(expr: &Expression, row: &Row, parameters: &ParameterValues) -> QueryResult<DataValue> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Column(col_ref) => resolve_column(col_ref, row).cloned(),
        Expression::Parameter(name) => match parameters.require(name)? {
            ParameterValue::Scalar(value) => Ok(value.clone()),
            ParameterValue::List(_) => Err(QueryError::TypeError(format!(
                "Parameter @{} is a list and cannot be used as a scalar", name
            ))),
        },
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate_expression(left, row, parameters)?;
            let right_val = evaluate_expression(right, row, parameters)?;
            evaluate_binary(&left_val, *op, &right_val)
        }
        Expression::Not(inner) => match evaluate_expression(inner, row, parameters)? {
            DataValue::Null => Ok(DataValue::Null),
            DataValue::Boolean(b) => Ok(DataValue::Boolean(!b)),
            other => Err(QueryError::TypeError(format!("NOT requires a boolean, got {}", other))),
        },
        Expression::IsNull(inner) => Ok(DataValue::Boolean(evaluate_expression(inner, row, parameters)?.is_null())),
        Expression::IsNotNull(inner) => Ok(DataValue::Boolean(!evaluate_expression(inner, row, parameters)?.is_null())),
        Expression::InList { expr, list, negated } => {
            let value = evaluate_expression(expr, row, parameters)?;
            let items = list
                .iter()
                .map(|item| evaluate_expression(item, row, parameters))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(evaluate_in(&value, &items, *negated))
        }
        Expression::InParameter { expr, parameter, negated } => {
            let value = evaluate_expression(expr, row, parameters)?;
            match parameters.require(parameter)? {
                ParameterValue::List(items) => Ok(evaluate_in(&value, items, *negated)),
                ParameterValue::Scalar(_) => Err(QueryError::TypeError(format!(
                    "Parameter @{} used with IN must be a list", parameter
                ))),
            }
        }
    }
}

/// Evaluate a predicate; only TRUE passes, FALSE and NULL reject the row
pub fn evaluate_predicate(expr: &Expression, row: &Row, parameters: &ParameterValues) -> QueryResult<bool> {
    match evaluate_expression(expr, row, parameters)? {
        DataValue::Boolean(b) => Ok(b),
        DataValue::Null => Ok(false),
        other => Err(QueryError::TypeError(format!("Predicate must be boolean, got {}", other))),
    }
}

/// Find a column in a row. Qualified references fall back to the bare column
/// name; unqualified ones match a single `alias.name` column.
pub fn resolve_column<'a>(col_ref: &ColumnReference, row: &'a Row) -> QueryResult<&'a DataValue> {
    if let Some(value) = row.get(&col_ref.qualified_name()) {
        return Ok(value);
    }
    if col_ref.table.is_some() {
        if let Some(value) = row.get(&col_ref.name) {
            return Ok(value);
        }
    } else {
        let suffix = format!(".{}", col_ref.name);
        let mut matches = row.values_with_names().filter(|(name, _)| name.ends_with(&suffix));
        if let Some((first_name, value)) = matches.next() {
            if let Some((other_name, _)) = matches.next() {
                return Err(QueryError::ColumnNotFound(format!(
                    "Column reference '{}' is ambiguous between '{}' and '{}'",
                    col_ref.name, first_name, other_name
                )));
            }
            return Ok(value);
        }
    }
    Err(QueryError::ColumnNotFound(col_ref.qualified_name()))
}

fn truth(value: &DataValue) -> QueryResult<Option<bool>> {
    match value {
        DataValue::Null => Ok(None),
        DataValue::Boolean(b) => Ok(Some(*b)),
        other => Err(QueryError::TypeError(format!("Expected a boolean, got {}", other))),
    }
}

fn to_value(truth: Option<bool>) -> DataValue {
    truth.map_or(DataValue::Null, DataValue::Boolean)
}

fn values_equal(left: &DataValue, right: &DataValue) -> bool {
    matches!(left.partial_cmp(right), Some(Ordering::Equal))
}

fn evaluate_binary(left: &DataValue, op: Operator, right: &DataValue) -> QueryResult<DataValue> {
    match op {
        Operator::And => {
            let (l, r) = (truth(left)?, truth(right)?);
            Ok(match (l, r) {
                (Some(false), _) | (_, Some(false)) => DataValue::Boolean(false),
                (Some(true), Some(true)) => DataValue::Boolean(true),
                _ => DataValue::Null,
            })
        }
        Operator::Or => {
            let (l, r) = (truth(left)?, truth(right)?);
            Ok(match (l, r) {
                (Some(true), _) | (_, Some(true)) => DataValue::Boolean(true),
                (Some(false), Some(false)) => DataValue::Boolean(false),
                _ => DataValue::Null,
            })
        }
        _ if left.is_null() || right.is_null() => Ok(DataValue::Null),
        Operator::Equals => Ok(DataValue::Boolean(values_equal(left, right))),
        Operator::NotEquals => Ok(DataValue::Boolean(!values_equal(left, right))),
        Operator::LessThan | Operator::GreaterThan | Operator::LessEquals | Operator::GreaterEquals => {
            let ordering = left.compare(right)?;
            let result = match op {
                Operator::LessThan => ordering == Ordering::Less,
                Operator::GreaterThan => ordering == Ordering::Greater,
                Operator::LessEquals => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(DataValue::Boolean(result))
        }
        Operator::Plus | Operator::Minus | Operator::Multiply | Operator::Divide => evaluate_arithmetic(left, op, right),
    }
}

fn evaluate_arithmetic(left: &DataValue, op: Operator, right: &DataValue) -> QueryResult<DataValue> {
    match (left, right) {
        (DataValue::Integer(a), DataValue::Integer(b)) => {
            let result = match op {
                Operator::Plus => a.checked_add(*b),
                Operator::Minus => a.checked_sub(*b),
                Operator::Multiply => a.checked_mul(*b),
                _ => {
                    if *b == 0 {
                        return Err(QueryError::Execution("Division by zero".to_string()));
                    }
                    a.checked_div(*b)
                }
            };
            result
                .map(DataValue::Integer)
                .ok_or_else(|| QueryError::Execution("Numeric overflow".to_string()))
        }
        (DataValue::Integer(_) | DataValue::Float(_), DataValue::Integer(_) | DataValue::Float(_)) => {
            let a = as_f64(left);
            let b = as_f64(right);
            Ok(DataValue::Float(match op {
                Operator::Plus => a + b,
                Operator::Minus => a - b,
                Operator::Multiply => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(QueryError::Execution("Division by zero".to_string()));
                    }
                    a / b
                }
            }))
        }
        (DataValue::Text(a), DataValue::Text(b)) if op == Operator::Plus => Ok(DataValue::Text(format!("{}{}", a, b))),
        _ => Err(QueryError::TypeError(format!(
            "Cannot apply {} to {} and {}", op.symbol(), left, right
        ))),
    }
}

fn as_f64(value: &DataValue) -> f64 {
    match value {
        DataValue::Integer(i) => *i as f64,
        DataValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn evaluate_in(value: &DataValue, items: &[DataValue], negated: bool) -> DataValue {
    if value.is_null() {
        return DataValue::Null;
    }
    let membership = if items.iter().any(|item| values_equal(value, item)) {
        Some(true)
    } else if items.iter().any(DataValue::is_null) {
        None
    } else {
        Some(false)
    };
    to_value(membership.map(|found| found != negated))
}
