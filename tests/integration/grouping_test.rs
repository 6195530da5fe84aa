use std::sync::Arc;

use anyhow::Result;

use bayun_pipeline::config::PipelineConfig;
use bayun_pipeline::query::executor::context::QueryContext;
use bayun_pipeline::query::executor::enumerable::QueryingEnumerable;
use bayun_pipeline::query::executor::result::{DataValue, QueryError};
use bayun_pipeline::query::executor::shaper::{Group, GroupingShaper};
use bayun_pipeline::query::planner::logical::{Expression, JoinType, LogicalPlan};

#[path = "../common/mod.rs"]
mod common;

use common::{ScriptedBackend, int, recording_context, shop_backend, text};

fn keyed_backend() -> ScriptedBackend {
    ScriptedBackend::new(
        &["key", "value"],
        vec![
            vec![text("A"), int(1)],
            vec![text("A"), int(2)],
            vec![text("B"), int(3)],
        ],
    )
}

fn values(group: &Group<i64>) -> Vec<i64> {
    group.elements.clone()
}

#[test]
fn test_lookahead_is_not_read_twice() -> Result<()> {
    let backend = Arc::new(keyed_backend());
    let (context, _) = recording_context(backend.clone());
    let shaper = GroupingShaper::new(&["key"], |row| Ok(row.get("value").and_then(|v| v.as_i64()))).into_shaper();
    let query = QueryingEnumerable::new(context, LogicalPlan::scan("t"), shaper);

    let mut enumerator = query.enumerator();

    // Group A needs one row past its end to know it is complete
    assert!(enumerator.move_next()?);
    let a = enumerator.take_current().unwrap();
    assert_eq!(a.key, vec![text("A")]);
    assert_eq!(values(&a), vec![1, 2]);
    assert_eq!(backend.physical_reads(), 3);
    assert_eq!(enumerator.pending_lookahead(), Some(true));

    // Group B starts from the row already read
    assert!(enumerator.move_next()?);
    let b = enumerator.take_current().unwrap();
    assert_eq!(b.key, vec![text("B")]);
    assert_eq!(values(&b), vec![3]);
    assert_eq!(backend.physical_reads(), 4);
    assert_eq!(enumerator.pending_lookahead(), Some(false));

    // The end was already observed; no further read is issued
    assert!(!enumerator.move_next()?);
    assert_eq!(backend.physical_reads(), 4);
    Ok(())
}

#[test]
fn test_single_group() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new(
        &["key", "value"],
        vec![vec![text("A"), int(1)], vec![text("A"), int(2)]],
    ));
    let (context, _) = recording_context(backend.clone());
    let query = QueryingEnumerable::new(context, LogicalPlan::scan("t"), GroupingShaper::rows(&["key"]).into_shaper());

    let groups = query.to_vec()?;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].elements.len(), 2);
    assert_eq!(backend.physical_reads(), 3);
    Ok(())
}

#[test]
fn test_empty_input_yields_no_groups() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new(&["key", "value"], Vec::new()));
    let (context, _) = recording_context(backend.clone());
    let query = QueryingEnumerable::new(context, LogicalPlan::scan("t"), GroupingShaper::rows(&["key"]).into_shaper());

    assert!(query.to_vec()?.is_empty());
    assert_eq!(backend.physical_reads(), 1);
    Ok(())
}

#[test]
fn test_failure_inside_lookahead_is_reported() {
    let backend = Arc::new(keyed_backend().failing_on_read(3));
    let (context, logger) = recording_context(backend);
    let query = QueryingEnumerable::new(context.clone(), LogicalPlan::scan("t"), GroupingShaper::rows(&["key"]).into_shaper());

    let err = query.to_vec().unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
    assert_eq!(logger.failures().len(), 1);
    assert!(!context.connection().is_open());
}

#[test]
fn test_missing_key_column() {
    let backend = Arc::new(keyed_backend());
    let (context, _) = recording_context(backend);
    let query = QueryingEnumerable::new(context, LogicalPlan::scan("t"), GroupingShaper::rows(&["missing"]).into_shaper());

    assert_eq!(query.to_vec().unwrap_err(), QueryError::ColumnNotFound("missing".to_string()));
}

#[test]
fn test_customers_with_orders_over_left_join() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let context = Arc::new(QueryContext::for_backend(backend.clone(), PipelineConfig::default()));

    let plan = LogicalPlan::scan_as("customers", "c")
        .join(
            LogicalPlan::scan_as("orders", "o"),
            Expression::column("c.id").equals(Expression::column("o.customer_id")),
            JoinType::Left,
        )
        .sort_by(&["c.id", "o.id"]);

    // Customers without orders still form a group, with no elements
    let shaper = GroupingShaper::new(&["c.id", "c.name"], |row| {
        Ok(match row.get("o.amount") {
            Some(DataValue::Integer(amount)) => Some(*amount),
            _ => None,
        })
    })
    .into_shaper();
    let query = QueryingEnumerable::new(context, plan, shaper);

    let groups = query.to_vec()?;
    let summary: Vec<(Vec<DataValue>, Vec<i64>)> = groups.into_iter().map(|g| (g.key, g.elements)).collect();
    assert_eq!(
        summary,
        vec![
            (vec![int(1), text("Alice")], vec![250, 75]),
            (vec![int(2), text("Bob")], vec![120]),
            (vec![int(3), text("Carol")], vec![]),
        ]
    );
    assert_eq!(backend.execution_count(), 1);
    assert_eq!(backend.open_count(), 1);
    assert_eq!(backend.close_count(), 1);
    Ok(())
}
