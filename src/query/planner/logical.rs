// Logical Query Plan Implementation
//
// This module defines the logical plan representation handed to the pipeline.
// Plans are immutable values: every rewrite produces a new tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::executor::result::DataValue;

/// Column reference (could be qualified with table name or alias)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnReference {
    /// Name of the column as it appears in a row produced by a scan
    pub fn qualified_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessEquals => "<=",
            Operator::GreaterEquals => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessEquals
                | Operator::GreaterEquals
        )
    }
}

/// Scalar expression inside a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value
    Literal(DataValue),
    /// Column reference
    Column(ColumnReference),
    /// Reference to a runtime parameter
    Parameter(String),
    /// Binary operation (e.g., a + b, x = y)
    BinaryOp {
        left: Box<Expression>,
        op: Operator,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
    /// `expr [NOT] IN (v1, v2, ...)`
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    /// `expr [NOT] IN @param`, where the parameter is bound to a list
    InParameter {
        expr: Box<Expression>,
        parameter: String,
        negated: bool,
    },
}

impl Expression {
    pub fn column(name: &str) -> Self {
        match name.split_once('.') {
            Some((table, column)) => Expression::Column(ColumnReference {
                table: Some(table.to_string()),
                name: column.to_string(),
            }),
            None => Expression::Column(ColumnReference {
                table: None,
                name: name.to_string(),
            }),
        }
    }

    pub fn param(name: &str) -> Self {
        Expression::Parameter(name.to_string())
    }

    pub fn literal(value: DataValue) -> Self {
        Expression::Literal(value)
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(DataValue::Boolean(value))
    }

    pub fn binary(left: Expression, op: Operator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(self, other: Expression) -> Self {
        Expression::binary(self, Operator::Equals, other)
    }

    pub fn not_equals(self, other: Expression) -> Self {
        Expression::binary(self, Operator::NotEquals, other)
    }

    pub fn gt(self, other: Expression) -> Self {
        Expression::binary(self, Operator::GreaterThan, other)
    }

    pub fn lt(self, other: Expression) -> Self {
        Expression::binary(self, Operator::LessThan, other)
    }

    pub fn and(self, other: Expression) -> Self {
        Expression::binary(self, Operator::And, other)
    }

    pub fn or(self, other: Expression) -> Self {
        Expression::binary(self, Operator::Or, other)
    }

    pub fn negate(self) -> Self {
        Expression::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expression::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Self {
        Expression::IsNotNull(Box::new(self))
    }

    pub fn in_list(self, list: Vec<Expression>) -> Self {
        Expression::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn in_param(self, parameter: &str) -> Self {
        Expression::InParameter {
            expr: Box::new(self),
            parameter: parameter.to_string(),
            negated: false,
        }
    }

    /// Returns the literal boolean this expression is, if any
    pub fn as_bool_literal(&self) -> Option<bool> {
        match self {
            Expression::Literal(DataValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Append parameter names referenced by this expression, in order of
    /// first appearance
    pub fn collect_parameters(&self, out: &mut Vec<String>) {
        match self {
            Expression::Literal(_) | Expression::Column(_) => {}
            Expression::Parameter(name) => push_unique(out, name),
            Expression::BinaryOp { left, right, .. } => {
                left.collect_parameters(out);
                right.collect_parameters(out);
            }
            Expression::Not(inner) | Expression::IsNull(inner) | Expression::IsNotNull(inner) => {
                inner.collect_parameters(out)
            }
            Expression::InList { expr, list, .. } => {
                expr.collect_parameters(out);
                for item in list {
                    item.collect_parameters(out);
                }
            }
            Expression::InParameter { expr, parameter, .. } => {
                expr.collect_parameters(out);
                push_unique(out, parameter);
            }
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|existing| existing == name) {
        out.push(name.to_string());
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value.to_sql_literal()),
            Expression::Column(col) => write!(f, "{}", col),
            Expression::Parameter(name) => write!(f, "@{}", name),
            Expression::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expression::Not(inner) => write!(f, "NOT {}", inner),
            Expression::IsNull(inner) => write!(f, "{} IS NULL", inner),
            Expression::IsNotNull(inner) => write!(f, "{} IS NOT NULL", inner),
            Expression::InList { expr, list, negated } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{} {} ({})", expr, keyword, items.join(", "))
            }
            Expression::InParameter { expr, parameter, negated } => {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{} {} @{}", expr, keyword, parameter)
            }
        }
    }
}

/// Output column of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionColumn {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl ProjectionColumn {
    /// Name of the column in the output row
    pub fn output_name(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expression::Column(col) => col.name.clone(),
            _ => format!("expr{}", position),
        }
    }
}

impl From<&str> for ProjectionColumn {
    fn from(name: &str) -> Self {
        ProjectionColumn {
            expr: Expression::column(name),
            alias: None,
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingKey {
    pub expr: Expression,
    #[serde(default)]
    pub descending: bool,
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

/// Represents a node in the logical query plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Scan a table
    Scan {
        /// Table name
        table_name: String,
        /// Table alias (if any)
        alias: Option<String>,
    },
    /// Filter rows based on a predicate
    Filter {
        /// Predicate expression
        predicate: Expression,
        /// Input plan
        input: Box<LogicalPlan>,
    },
    /// Project columns
    Projection {
        /// Columns to project
        columns: Vec<ProjectionColumn>,
        /// Input plan
        input: Box<LogicalPlan>,
    },
    /// Join two relations
    Join {
        /// Left input plan
        left: Box<LogicalPlan>,
        /// Right input plan
        right: Box<LogicalPlan>,
        /// Join condition
        condition: Expression,
        /// Join type
        join_type: JoinType,
    },
    /// Order rows
    Sort {
        keys: Vec<OrderingKey>,
        input: Box<LogicalPlan>,
    },
    /// Limit the number of rows, optionally skipping some first
    Limit {
        count: Expression,
        offset: Option<Expression>,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn scan(table_name: &str) -> Self {
        LogicalPlan::Scan {
            table_name: table_name.to_string(),
            alias: None,
        }
    }

    pub fn scan_as(table_name: &str, alias: &str) -> Self {
        LogicalPlan::Scan {
            table_name: table_name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    pub fn filter(self, predicate: Expression) -> Self {
        LogicalPlan::Filter {
            predicate,
            input: Box::new(self),
        }
    }

    pub fn project<C: Into<ProjectionColumn>>(self, columns: Vec<C>) -> Self {
        LogicalPlan::Projection {
            columns: columns.into_iter().map(Into::into).collect(),
            input: Box::new(self),
        }
    }

    pub fn join(self, right: LogicalPlan, condition: Expression, join_type: JoinType) -> Self {
        LogicalPlan::Join {
            left: Box::new(self),
            right: Box::new(right),
            condition,
            join_type,
        }
    }

    /// Sort ascending by the given columns
    pub fn sort_by(self, columns: &[&str]) -> Self {
        LogicalPlan::Sort {
            keys: columns
                .iter()
                .map(|name| OrderingKey {
                    expr: Expression::column(name),
                    descending: false,
                })
                .collect(),
            input: Box::new(self),
        }
    }

    pub fn limit(self, count: Expression) -> Self {
        LogicalPlan::Limit {
            count,
            offset: None,
            input: Box::new(self),
        }
    }

    /// Parameter names referenced anywhere in the plan, in order of first
    /// appearance
    pub fn referenced_parameters(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters(&self, out: &mut Vec<String>) {
        match self {
            LogicalPlan::Scan { .. } => {}
            LogicalPlan::Filter { predicate, input } => {
                input.collect_parameters(out);
                predicate.collect_parameters(out);
            }
            LogicalPlan::Projection { columns, input } => {
                input.collect_parameters(out);
                for col in columns {
                    col.expr.collect_parameters(out);
                }
            }
            LogicalPlan::Join { left, right, condition, .. } => {
                left.collect_parameters(out);
                right.collect_parameters(out);
                condition.collect_parameters(out);
            }
            LogicalPlan::Sort { keys, input } => {
                input.collect_parameters(out);
                for key in keys {
                    key.expr.collect_parameters(out);
                }
            }
            LogicalPlan::Limit { count, offset, input } => {
                input.collect_parameters(out);
                count.collect_parameters(out);
                if let Some(offset) = offset {
                    offset.collect_parameters(out);
                }
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            LogicalPlan::Scan { table_name, alias } => match alias {
                Some(a) => writeln!(f, "{}Scan: {} as {}", pad, table_name, a),
                None => writeln!(f, "{}Scan: {}", pad, table_name),
            },
            LogicalPlan::Filter { predicate, input } => {
                writeln!(f, "{}Filter: {}", pad, predicate)?;
                input.fmt_indented(f, depth + 1)
            }
            LogicalPlan::Projection { columns, input } => {
                let names: Vec<String> = columns.iter().map(|c| c.expr.to_string()).collect();
                writeln!(f, "{}Projection: {}", pad, names.join(", "))?;
                input.fmt_indented(f, depth + 1)
            }
            LogicalPlan::Join { left, right, condition, join_type } => {
                writeln!(f, "{}{:?} Join: {}", pad, join_type, condition)?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            LogicalPlan::Sort { keys, input } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{}{}", k.expr, if k.descending { " DESC" } else { "" }))
                    .collect();
                writeln!(f, "{}Sort: {}", pad, keys.join(", "))?;
                input.fmt_indented(f, depth + 1)
            }
            LogicalPlan::Limit { count, offset, input } => {
                match offset {
                    Some(offset) => writeln!(f, "{}Limit: {} offset {}", pad, count, offset)?,
                    None => writeln!(f, "{}Limit: {}", pad, count)?,
                }
                input.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
