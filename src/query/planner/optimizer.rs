// Query Optimizer Implementation
//
// Specializes a logical plan for one execution using the concrete parameter
// values of that execution. The input plan is never modified; a new plan is
// returned together with the parameter snapshot it was specialized for.

use log::debug;

use crate::query::executor::result::{DataValue, QueryError, QueryResult};
use crate::query::planner::logical::{Expression, LogicalPlan, Operator};
use crate::query::planner::parameters::{ParameterValue, ParameterValues};

/// A plan tailored to one parameter snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SpecializedPlan {
    pub plan: LogicalPlan,
    pub parameters: ParameterValues,
}

/// Optimizer that exploits parameter values:
///
/// * `x = @p` with `@p` NULL becomes `x IS NULL`, `x <> @p` becomes `x IS NOT NULL`
/// * `@p IS [NOT] NULL` folds to a boolean
/// * `x IN @list` expands into a literal list, NULL entries become `OR x IS NULL`
/// * boolean constants fold through `AND`, `OR` and `NOT`
/// * filters that fold to `TRUE` are removed
#[derive(Debug, Default, Clone)]
pub struct ParameterValueBasedOptimizer {}

impl ParameterValueBasedOptimizer {
    pub fn new() -> Self {
        ParameterValueBasedOptimizer {}
    }

    /// Produce a plan specialized for `parameters`
    pub fn optimize(&self, plan: &LogicalPlan, parameters: &ParameterValues) -> QueryResult<SpecializedPlan> {
        let specialized = Specializer { parameters }.plan(plan)?;
        debug!("Specialized plan for {} parameter(s):\n{}", parameters.len(), specialized);
        Ok(SpecializedPlan {
            plan: specialized,
            parameters: parameters.clone(),
        })
    }
}

struct Specializer<'a> {
    parameters: &'a ParameterValues,
}

impl Specializer<'_> {
    fn plan(&self, plan: &LogicalPlan) -> QueryResult<LogicalPlan> {
        Ok(match plan {
            LogicalPlan::Scan { .. } => plan.clone(),
            LogicalPlan::Filter { predicate, input } => {
                let input = self.plan(input)?;
                let predicate = self.expression(predicate)?;
                if predicate.as_bool_literal() == Some(true) {
                    return Ok(input);
                }
                LogicalPlan::Filter {
                    predicate,
                    input: Box::new(input),
                }
            }
            LogicalPlan::Projection { columns, input } => {
                let mut rewritten = Vec::with_capacity(columns.len());
                for col in columns {
                    let mut col = col.clone();
                    col.expr = self.expression(&col.expr)?;
                    rewritten.push(col);
                }
                LogicalPlan::Projection {
                    columns: rewritten,
                    input: Box::new(self.plan(input)?),
                }
            }
            LogicalPlan::Join { left, right, condition, join_type } => LogicalPlan::Join {
                left: Box::new(self.plan(left)?),
                right: Box::new(self.plan(right)?),
                condition: self.expression(condition)?,
                join_type: *join_type,
            },
            LogicalPlan::Sort { keys, input } => {
                let mut rewritten = Vec::with_capacity(keys.len());
                for key in keys {
                    let mut key = key.clone();
                    key.expr = self.expression(&key.expr)?;
                    rewritten.push(key);
                }
                LogicalPlan::Sort {
                    keys: rewritten,
                    input: Box::new(self.plan(input)?),
                }
            }
            LogicalPlan::Limit { count, offset, input } => {
                self.check_row_count(count, "LIMIT")?;
                if let Some(offset) = offset {
                    self.check_row_count(offset, "OFFSET")?;
                }
                LogicalPlan::Limit {
                    count: count.clone(),
                    offset: offset.clone(),
                    input: Box::new(self.plan(input)?),
                }
            }
        })
    }

    /// LIMIT and OFFSET must resolve to non-negative integers
    fn check_row_count(&self, expr: &Expression, clause: &str) -> QueryResult<()> {
        let value = match expr {
            Expression::Literal(value) => value,
            Expression::Parameter(name) => match self.parameters.get(name) {
                Some(ParameterValue::Scalar(value)) => value,
                Some(ParameterValue::List(_)) => {
                    return Err(QueryError::PlanSpecialization(format!(
                        "{} parameter @{} is bound to a list", clause, name
                    )));
                }
                // Left for the compiler to report as unbound
                None => return Ok(()),
            },
            other => {
                return Err(QueryError::PlanSpecialization(format!(
                    "{} must be a literal or a parameter, found {}", clause, other
                )));
            }
        };
        match value {
            DataValue::Integer(n) if *n >= 0 => Ok(()),
            other => Err(QueryError::PlanSpecialization(format!(
                "{} requires a non-negative integer, got {}", clause, other
            ))),
        }
    }

    fn is_null(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Literal(DataValue::Null) => true,
            Expression::Parameter(name) => self.parameters.get(name).is_some_and(ParameterValue::is_null),
            _ => false,
        }
    }

    fn expression(&self, expr: &Expression) -> QueryResult<Expression> {
        match expr {
            Expression::Literal(_) | Expression::Column(_) => Ok(expr.clone()),
            Expression::Parameter(name) => match self.parameters.get(name) {
                Some(ParameterValue::List(_)) => Err(QueryError::PlanSpecialization(format!(
                    "Parameter @{} is bound to a list but used as a scalar", name
                ))),
                _ => Ok(expr.clone()),
            },
            Expression::BinaryOp { left, op, right } => {
                let left = self.expression(left)?;
                let right = self.expression(right)?;
                Ok(self.binary(left, *op, right))
            }
            Expression::Not(inner) => Ok(negate(self.expression(inner)?)),
            Expression::IsNull(inner) => {
                let inner = self.expression(inner)?;
                Ok(self.null_check(inner, false))
            }
            Expression::IsNotNull(inner) => {
                let inner = self.expression(inner)?;
                Ok(self.null_check(inner, true))
            }
            Expression::InList { expr, list, negated } => {
                let expr = self.expression(expr)?;
                let list = list
                    .iter()
                    .map(|item| self.expression(item))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(expand_in(expr, list, *negated))
            }
            Expression::InParameter { expr, parameter, negated } => {
                let expr = self.expression(expr)?;
                match self.parameters.get(parameter) {
                    Some(ParameterValue::List(values)) => {
                        let list = values.iter().cloned().map(Expression::Literal).collect();
                        Ok(expand_in(expr, list, *negated))
                    }
                    Some(ParameterValue::Scalar(_)) => Err(QueryError::PlanSpecialization(format!(
                        "Parameter @{} used with IN must be bound to a list", parameter
                    ))),
                    None => Ok(Expression::InParameter {
                        expr: Box::new(expr),
                        parameter: parameter.clone(),
                        negated: *negated,
                    }),
                }
            }
        }
    }

    fn binary(&self, left: Expression, op: Operator, right: Expression) -> Expression {
        match op {
            Operator::Equals | Operator::NotEquals => {
                let negated = op == Operator::NotEquals;
                if self.is_null(&right) {
                    return self.null_check(left, negated);
                }
                if self.is_null(&left) {
                    return self.null_check(right, negated);
                }
                Expression::binary(left, op, right)
            }
            op if op.is_comparison() && (self.is_null(&left) || self.is_null(&right)) => {
                Expression::Literal(DataValue::Null)
            }
            Operator::And => match (left.as_bool_literal(), right.as_bool_literal()) {
                (Some(false), _) | (_, Some(false)) => Expression::boolean(false),
                (Some(true), _) => right,
                (_, Some(true)) => left,
                _ => Expression::binary(left, op, right),
            },
            Operator::Or => match (left.as_bool_literal(), right.as_bool_literal()) {
                (Some(true), _) | (_, Some(true)) => Expression::boolean(true),
                (Some(false), _) => right,
                (_, Some(false)) => left,
                _ => Expression::binary(left, op, right),
            },
            _ => Expression::binary(left, op, right),
        }
    }

    /// `expr IS NULL` (or `IS NOT NULL` when `negated`), folded when the
    /// operand's nullness is known
    fn null_check(&self, expr: Expression, negated: bool) -> Expression {
        let known = match &expr {
            Expression::Literal(value) => Some(value.is_null()),
            Expression::Parameter(name) => self.parameters.get(name).map(ParameterValue::is_null),
            _ => None,
        };
        match known {
            Some(is_null) => Expression::boolean(is_null != negated),
            None if negated => Expression::IsNotNull(Box::new(expr)),
            None => Expression::IsNull(Box::new(expr)),
        }
    }
}

fn negate(expr: Expression) -> Expression {
    match expr {
        Expression::Literal(DataValue::Boolean(b)) => Expression::boolean(!b),
        Expression::Literal(DataValue::Null) => Expression::Literal(DataValue::Null),
        Expression::Not(inner) => *inner,
        other => Expression::Not(Box::new(other)),
    }
}

/// Move NULL entries of an IN list into an explicit null check
fn expand_in(expr: Expression, list: Vec<Expression>, negated: bool) -> Expression {
    let has_null = list.iter().any(|item| matches!(item, Expression::Literal(DataValue::Null)));
    let values: Vec<Expression> = list
        .into_iter()
        .filter(|item| !matches!(item, Expression::Literal(DataValue::Null)))
        .collect();

    let membership = if values.is_empty() {
        Expression::boolean(negated)
    } else {
        Expression::InList {
            expr: Box::new(expr.clone()),
            list: values,
            negated,
        }
    };

    match (has_null, negated) {
        (false, _) => membership,
        (true, false) => match membership.as_bool_literal() {
            Some(false) => Expression::IsNull(Box::new(expr)),
            _ => membership.or(Expression::IsNull(Box::new(expr))),
        },
        (true, true) => match membership.as_bool_literal() {
            Some(true) => Expression::IsNotNull(Box::new(expr)),
            _ => membership.and(Expression::IsNotNull(Box::new(expr))),
        },
    }
}
