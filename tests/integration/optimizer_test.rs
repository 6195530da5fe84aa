use anyhow::Result;

use bayun_pipeline::query::executor::result::{DataValue, QueryError};
use bayun_pipeline::query::planner::logical::{Expression, JoinType, LogicalPlan};
use bayun_pipeline::query::planner::optimizer::ParameterValueBasedOptimizer;
use bayun_pipeline::query::planner::parameters::ParameterValues;

fn specialize(plan: &LogicalPlan, params: &ParameterValues) -> Result<LogicalPlan> {
    Ok(ParameterValueBasedOptimizer::new().optimize(plan, params)?.plan)
}

#[test]
fn test_same_plan_specializes_differently_per_snapshot() -> Result<()> {
    let plan = LogicalPlan::scan("customers").filter(Expression::column("name").equals(Expression::param("name")));

    let with_value = ParameterValues::new().with("name", DataValue::Text("Alice".into()));
    assert_eq!(specialize(&plan, &with_value)?, plan);

    let with_null = ParameterValues::new().with("name", DataValue::Null);
    assert_eq!(
        specialize(&plan, &with_null)?,
        LogicalPlan::scan("customers").filter(Expression::column("name").is_null())
    );
    Ok(())
}

#[test]
fn test_not_equals_null_becomes_is_not_null() -> Result<()> {
    let plan = LogicalPlan::scan("t").filter(Expression::param("p").not_equals(Expression::column("a")));
    let params = ParameterValues::new().with("p", DataValue::Null);
    assert_eq!(
        specialize(&plan, &params)?,
        LogicalPlan::scan("t").filter(Expression::column("a").is_not_null())
    );
    Ok(())
}

#[test]
fn test_ordering_comparison_with_null_is_unknown() -> Result<()> {
    let plan = LogicalPlan::scan("t").filter(Expression::column("a").gt(Expression::param("p")));
    let params = ParameterValues::new().with("p", DataValue::Null);
    assert_eq!(
        specialize(&plan, &params)?,
        LogicalPlan::scan("t").filter(Expression::literal(DataValue::Null))
    );
    Ok(())
}

#[test]
fn test_optional_filter_pattern() -> Result<()> {
    // WHERE (@min IS NULL OR a > @min) AND b = 1
    let plan = LogicalPlan::scan("t").filter(
        Expression::param("min")
            .is_null()
            .or(Expression::column("a").gt(Expression::param("min")))
            .and(Expression::column("b").equals(Expression::literal(DataValue::Integer(1)))),
    );

    let unset = ParameterValues::new().with("min", DataValue::Null);
    assert_eq!(
        specialize(&plan, &unset)?,
        LogicalPlan::scan("t").filter(Expression::column("b").equals(Expression::literal(DataValue::Integer(1))))
    );

    let set = ParameterValues::new().with("min", DataValue::Integer(10));
    assert_eq!(
        specialize(&plan, &set)?,
        LogicalPlan::scan("t").filter(
            Expression::column("a")
                .gt(Expression::param("min"))
                .and(Expression::column("b").equals(Expression::literal(DataValue::Integer(1))))
        )
    );
    Ok(())
}

#[test]
fn test_not_in_list_with_null_entry() -> Result<()> {
    let plan = LogicalPlan::scan("t").filter(Expression::column("a").in_param("ids").negate());
    let params = ParameterValues::new().with("ids", vec![DataValue::Integer(1), DataValue::Null]);
    let specialized = specialize(&plan, &params)?;
    let expected = Expression::Not(Box::new(
        Expression::column("a")
            .in_list(vec![Expression::literal(DataValue::Integer(1))])
            .or(Expression::column("a").is_null()),
    ));
    assert_eq!(specialized, LogicalPlan::scan("t").filter(expected));
    Ok(())
}

#[test]
fn test_empty_list_in_join_condition() -> Result<()> {
    let plan = LogicalPlan::scan_as("a", "a").join(
        LogicalPlan::scan_as("b", "b"),
        Expression::column("a.id")
            .equals(Expression::column("b.a_id"))
            .and(Expression::column("b.kind").in_param("kinds")),
        JoinType::Inner,
    );
    let params = ParameterValues::new().with("kinds", Vec::<DataValue>::new());
    let specialized = specialize(&plan, &params)?;
    let LogicalPlan::Join { condition, .. } = &specialized else {
        panic!("expected a join, got {}", specialized);
    };
    assert_eq!(*condition, Expression::boolean(false));
    Ok(())
}

#[test]
fn test_list_used_as_scalar_is_rejected() {
    let plan = LogicalPlan::scan("t").filter(Expression::column("a").equals(Expression::param("ids")));
    let params = ParameterValues::new().with("ids", vec![DataValue::Integer(1)]);
    assert!(matches!(
        ParameterValueBasedOptimizer::new().optimize(&plan, &params),
        Err(QueryError::PlanSpecialization(_))
    ));
}

#[test]
fn test_unbound_parameters_are_left_alone() -> Result<()> {
    let plan = LogicalPlan::scan("t")
        .filter(Expression::column("a").in_param("ids"))
        .limit(Expression::param("take"));
    assert_eq!(specialize(&plan, &ParameterValues::new())?, plan);
    Ok(())
}

#[test]
fn test_specialized_plan_carries_snapshot() -> Result<()> {
    let plan = LogicalPlan::scan("t").filter(Expression::column("a").equals(Expression::param("p")));
    let mut params = ParameterValues::new().with("p", DataValue::Integer(1));
    let specialized = ParameterValueBasedOptimizer::new().optimize(&plan, &params)?;

    params.insert("p", DataValue::Integer(2));
    assert_eq!(specialized.parameters.get("p"), Some(&DataValue::Integer(1).into()));
    Ok(())
}
