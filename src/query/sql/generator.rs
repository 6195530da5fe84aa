// SQL Generator
//
// Compiles a specialized plan into SQL text with named parameter placeholders.
// Nodes that cannot be expressed as a clause of the enclosing SELECT are
// emitted as derived tables.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::planner::logical::{Expression, JoinType, LogicalPlan, OrderingKey, ProjectionColumn};
use crate::query::planner::optimizer::SpecializedPlan;
use crate::query::sql::command::{Command, CommandParameter};

/// Options controlling the generated SQL dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlGeneratorOptions {
    /// Prefix of parameter placeholders
    pub parameter_prefix: String,
    /// Character used to quote identifiers
    pub identifier_quote: char,
}

impl Default for SqlGeneratorOptions {
    fn default() -> Self {
        SqlGeneratorOptions {
            parameter_prefix: "@".to_string(),
            identifier_quote: '"',
        }
    }
}

/// Compiles a specialized plan into an executable command
pub trait CommandCompiler {
    fn compile(&mut self, plan: &SpecializedPlan) -> QueryResult<Command>;
}

/// Creates a fresh compiler for every execution
pub trait CommandCompilerFactory: Send + Sync {
    fn create(&self) -> Box<dyn CommandCompiler>;
}

/// Factory for [`SqlGenerator`]
#[derive(Debug, Clone, Default)]
pub struct SqlGeneratorFactory {
    options: SqlGeneratorOptions,
}

impl SqlGeneratorFactory {
    pub fn new(options: SqlGeneratorOptions) -> Self {
        SqlGeneratorFactory { options }
    }
}

impl CommandCompilerFactory for SqlGeneratorFactory {
    fn create(&self) -> Box<dyn CommandCompiler> {
        Box::new(SqlGenerator::new(self.options.clone()))
    }
}

// Clause ranks, outermost first
const RANK_LIMIT: u8 = 3;
const RANK_SORT_PROJECT: u8 = 2;
const RANK_FILTER: u8 = 1;

#[derive(Default)]
struct SelectParts {
    projection: Option<Vec<ProjectionColumn>>,
    from: Option<String>,
    filters: Vec<Expression>,
    order_by: Option<Vec<OrderingKey>>,
    limit: Option<Expression>,
    offset: Option<Expression>,
}

/// Generates SQL text for one command
pub struct SqlGenerator {
    options: SqlGeneratorOptions,
    parameters: Vec<CommandParameter>,
    derived_tables: usize,
    // Source qualifiers hidden inside derived tables of the SELECT being
    // built, mapped to the derived table alias that exposes their columns
    renamed_qualifiers: Vec<(String, String)>,
}

impl SqlGenerator {
    pub fn new(options: SqlGeneratorOptions) -> Self {
        SqlGenerator {
            options,
            parameters: Vec::new(),
            derived_tables: 0,
            renamed_qualifiers: Vec::new(),
        }
    }

    fn select(&mut self, plan: &LogicalPlan) -> QueryResult<String> {
        let enclosing = std::mem::take(&mut self.renamed_qualifiers);
        let mut parts = SelectParts::default();
        let result = match self.collect(plan, &mut parts, RANK_LIMIT) {
            Ok(()) => self.render(parts),
            Err(e) => Err(e),
        };
        self.renamed_qualifiers = enclosing;
        result
    }

    /// Fold `plan` into `parts`, starting a derived table whenever a node is
    /// out of clause order or its clause is already taken
    fn collect(&mut self, plan: &LogicalPlan, parts: &mut SelectParts, allowed: u8) -> QueryResult<()> {
        match plan {
            LogicalPlan::Limit { count, offset, input } if allowed >= RANK_LIMIT && parts.limit.is_none() => {
                parts.limit = Some(count.clone());
                parts.offset = offset.clone();
                self.collect(input, parts, RANK_SORT_PROJECT)
            }
            LogicalPlan::Sort { keys, input } if allowed >= RANK_SORT_PROJECT && parts.order_by.is_none() => {
                parts.order_by = Some(keys.clone());
                self.collect(input, parts, RANK_SORT_PROJECT)
            }
            LogicalPlan::Projection { columns, input } if allowed >= RANK_SORT_PROJECT && parts.projection.is_none() => {
                parts.projection = Some(columns.clone());
                self.collect(input, parts, RANK_SORT_PROJECT)
            }
            LogicalPlan::Filter { predicate, input } if allowed >= RANK_FILTER => {
                parts.filters.push(predicate.clone());
                self.collect(input, parts, RANK_FILTER)
            }
            LogicalPlan::Scan { .. } | LogicalPlan::Join { .. } => {
                parts.from = Some(self.source(plan)?);
                Ok(())
            }
            _ => {
                parts.from = Some(self.derived_table(plan)?);
                Ok(())
            }
        }
    }

    fn source(&mut self, plan: &LogicalPlan) -> QueryResult<String> {
        match plan {
            LogicalPlan::Scan { table_name, alias } => Ok(match alias {
                Some(alias) => format!("{} AS {}", self.quote(table_name), self.quote(alias)),
                None => self.quote(table_name),
            }),
            LogicalPlan::Join { left, right, condition, join_type } => {
                let left = self.source(left)?;
                let right = self.source(right)?;
                let keyword = match join_type {
                    JoinType::Inner => "INNER JOIN",
                    JoinType::Left => "LEFT JOIN",
                };
                let condition = self.predicate(condition)?;
                Ok(format!("{} {} {} ON {}", left, keyword, right, condition))
            }
            other => self.derived_table(other),
        }
    }

    fn derived_table(&mut self, plan: &LogicalPlan) -> QueryResult<String> {
        let alias = format!("t{}", self.derived_tables);
        self.derived_tables += 1;
        let inner = self.select(plan)?;

        let mut qualifiers = Vec::new();
        source_qualifiers(plan, &mut qualifiers);
        for qualifier in qualifiers {
            self.renamed_qualifiers.push((qualifier, alias.clone()));
        }
        Ok(format!("({}) AS {}", inner, self.quote(&alias)))
    }

    fn qualifier<'a>(&'a self, table: &'a str) -> &'a str {
        self.renamed_qualifiers
            .iter()
            .rev()
            .find(|(hidden, _)| hidden == table)
            .map(|(_, alias)| alias.as_str())
            .unwrap_or(table)
    }

    fn render(&mut self, parts: SelectParts) -> QueryResult<String> {
        let from = parts
            .from
            .ok_or_else(|| QueryError::Compilation("Plan has no source".to_string()))?;

        let projection = match &parts.projection {
            Some(columns) if !columns.is_empty() => {
                let mut rendered = Vec::with_capacity(columns.len());
                for column in columns {
                    let expr = self.expression(&column.expr)?;
                    rendered.push(match &column.alias {
                        Some(alias) => format!("{} AS {}", expr, self.quote(alias)),
                        None => expr,
                    });
                }
                rendered.join(", ")
            }
            _ => "*".to_string(),
        };

        let mut sql = format!("SELECT {} FROM {}", projection, from);

        if !parts.filters.is_empty() {
            // Filters were collected outermost first
            let mut predicates = Vec::with_capacity(parts.filters.len());
            for filter in parts.filters.iter().rev() {
                let rendered = self.predicate(filter)?;
                predicates.push(if parts.filters.len() > 1 && matches!(filter, Expression::BinaryOp { .. }) {
                    format!("({})", rendered)
                } else {
                    rendered
                });
            }
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if let Some(keys) = &parts.order_by {
            let mut rendered = Vec::with_capacity(keys.len());
            for key in keys {
                let expr = self.expression(&key.expr)?;
                rendered.push(if key.descending { format!("{} DESC", expr) } else { expr });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered.join(", "));
        }

        if let Some(limit) = &parts.limit {
            let limit = self.expression(limit)?;
            sql.push_str(" LIMIT ");
            sql.push_str(&limit);
        }
        if let Some(offset) = &parts.offset {
            let offset = self.expression(offset)?;
            sql.push_str(" OFFSET ");
            sql.push_str(&offset);
        }

        Ok(sql)
    }

    /// Render a search condition; boolean constants become `1 = 1` / `1 = 0`
    fn predicate(&mut self, expr: &Expression) -> QueryResult<String> {
        match expr.as_bool_literal() {
            Some(true) => Ok("1 = 1".to_string()),
            Some(false) => Ok("1 = 0".to_string()),
            None => self.expression(expr),
        }
    }

    fn operand(&mut self, expr: &Expression) -> QueryResult<String> {
        let rendered = self.expression(expr)?;
        Ok(match expr {
            Expression::BinaryOp { .. } | Expression::InList { .. } => format!("({})", rendered),
            _ => rendered,
        })
    }

    fn expression(&mut self, expr: &Expression) -> QueryResult<String> {
        match expr {
            Expression::Literal(value) => Ok(value.to_sql_literal()),
            Expression::Column(col) => Ok(match &col.table {
                Some(table) => format!("{}.{}", self.quote(self.qualifier(table)), self.quote(&col.name)),
                None => self.quote(&col.name),
            }),
            Expression::Parameter(name) => Ok(self.parameter(name)),
            Expression::BinaryOp { left, op, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(format!("{} {} {}", left, op.symbol(), right))
            }
            Expression::Not(inner) => {
                let inner = self.predicate(inner)?;
                Ok(format!("NOT ({})", inner))
            }
            Expression::IsNull(inner) => Ok(format!("{} IS NULL", self.operand(inner)?)),
            Expression::IsNotNull(inner) => Ok(format!("{} IS NOT NULL", self.operand(inner)?)),
            Expression::InList { expr, list, negated } => {
                let value = self.operand(expr)?;
                let mut items = Vec::with_capacity(list.len());
                for item in list {
                    items.push(self.expression(item)?);
                }
                let keyword = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", value, keyword, items.join(", ")))
            }
            Expression::InParameter { parameter, .. } => Err(QueryError::Compilation(format!(
                "IN @{} must be expanded by the optimizer before compilation",
                parameter
            ))),
        }
    }

    fn parameter(&mut self, name: &str) -> String {
        let placeholder = format!("{}{}", self.options.parameter_prefix, name);
        if !self.parameters.iter().any(|p| p.name == name) {
            self.parameters.push(CommandParameter {
                name: name.to_string(),
                placeholder: placeholder.clone(),
            });
        }
        placeholder
    }

    fn quote(&self, identifier: &str) -> String {
        let q = self.options.identifier_quote;
        let escaped = identifier.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }
}

/// Names a column of `plan` can be qualified with: scan aliases, or the table
/// name of an unaliased scan
fn source_qualifiers(plan: &LogicalPlan, out: &mut Vec<String>) {
    match plan {
        LogicalPlan::Scan { table_name, alias } => out.push(alias.clone().unwrap_or_else(|| table_name.clone())),
        LogicalPlan::Join { left, right, .. } => {
            source_qualifiers(left, out);
            source_qualifiers(right, out);
        }
        LogicalPlan::Filter { input, .. }
        | LogicalPlan::Projection { input, .. }
        | LogicalPlan::Sort { input, .. }
        | LogicalPlan::Limit { input, .. } => source_qualifiers(input, out),
    }
}

fn unbound(names: &[String]) -> QueryError {
    let names: Vec<String> = names.iter().map(|n| format!("@{}", n)).collect();
    QueryError::Compilation(format!(
        "Parameter {} is referenced but has no bound value",
        names.join(", ")
    ))
}

impl CommandCompiler for SqlGenerator {
    fn compile(&mut self, plan: &SpecializedPlan) -> QueryResult<Command> {
        self.parameters.clear();
        self.derived_tables = 0;
        self.renamed_qualifiers.clear();

        let missing: Vec<String> = plan
            .plan
            .referenced_parameters()
            .into_iter()
            .filter(|name| !plan.parameters.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(unbound(&missing));
        }

        let text = self.select(&plan.plan)?;
        Ok(Command {
            text,
            parameters: std::mem::take(&mut self.parameters),
            plan: Arc::new(plan.plan.clone()),
        })
    }
}
