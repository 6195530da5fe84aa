use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use bayun_pipeline::config::PipelineConfig;
use bayun_pipeline::query::executor::context::QueryContext;
use bayun_pipeline::query::executor::enumerable::QueryingEnumerable;
use bayun_pipeline::query::executor::result::{DataValue, QueryError};
use bayun_pipeline::query::executor::shaper::{row_shaper, shaper};
use bayun_pipeline::query::planner::logical::{Expression, LogicalPlan};

#[path = "../common/mod.rs"]
mod common;

use common::{ScriptedBackend, int, recording_context, shop_backend};

#[derive(Debug, PartialEq)]
struct CustomerOrders {
    customer_id: i64,
    order_ids: Vec<i64>,
}

fn orders_for(customer_id: i64) -> LogicalPlan {
    LogicalPlan::scan("orders")
        .filter(Expression::column("customer_id").equals(Expression::literal(int(customer_id))))
        .sort_by(&["id"])
}

#[test]
fn test_nested_query_shares_the_connection() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let context = Arc::new(QueryContext::for_backend(backend.clone(), PipelineConfig::default()));
    let peak_use = Arc::new(AtomicUsize::new(0));

    let nested_context = context.clone();
    let peak = peak_use.clone();
    let customer_orders = shaper(move |_, reader, _| {
        let customer_id = reader
            .current()?
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| QueryError::Shaping("customer id is missing".to_string()))?;

        let mut orders = QueryingEnumerable::new(nested_context.clone(), orders_for(customer_id), row_shaper()).enumerator();
        let mut order_ids = Vec::new();
        while orders.move_next()? {
            peak.fetch_max(nested_context.connection().use_count(), Ordering::SeqCst);
            if let Some(id) = orders.current().and_then(|r| r.get("id")).and_then(|v| v.as_i64()) {
                order_ids.push(id);
            }
        }
        orders.dispose()?;
        Ok(CustomerOrders { customer_id, order_ids })
    });

    let query = QueryingEnumerable::new(context.clone(), LogicalPlan::scan("customers").sort_by(&["id"]), customer_orders);
    let results = query.to_vec()?;

    assert_eq!(
        results,
        vec![
            CustomerOrders { customer_id: 1, order_ids: vec![10, 11] },
            CustomerOrders { customer_id: 2, order_ids: vec![12] },
            CustomerOrders { customer_id: 3, order_ids: vec![] },
        ]
    );

    // The outer and inner enumerations overlapped on one physical open
    assert_eq!(peak_use.load(Ordering::SeqCst), 2);
    assert_eq!(backend.open_count(), 1);
    assert_eq!(backend.close_count(), 1);
    assert_eq!(backend.execution_count(), 4);
    assert_eq!(context.connection().totals(), (4, 4));
    assert!(!context.connection().is_open());
    Ok(())
}

#[test]
fn test_nested_failure_is_reported_by_both_levels() {
    let backend = Arc::new(ScriptedBackend::with_ids(&[1, 2]));
    let (context, logger) = recording_context(backend.clone());

    let nested_context = context.clone();
    let failing_inner = shaper(move |_, _, _| {
        let inner = QueryingEnumerable::new(
            nested_context.clone(),
            LogicalPlan::scan("t").filter(Expression::column("id").equals(Expression::param("missing"))),
            row_shaper(),
        );
        Ok(inner.to_vec()?.len())
    });
    let query = QueryingEnumerable::new(context.clone(), LogicalPlan::scan("t"), failing_inner);

    let err = query.to_vec().unwrap_err();
    assert!(matches!(err, QueryError::Compilation(_)));

    // Each enumerator reports its own failure exactly once
    let failures = logger.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.error == err));

    assert_eq!(context.connection().totals(), (2, 2));
    assert_eq!(backend.opens(), 1);
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_parameter_changes_inside_shaper_affect_only_new_executions() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let context = Arc::new(QueryContext::for_backend(backend, PipelineConfig::default()));
    context.set_parameter("customer", int(1));

    let nested_context = context.clone();
    let count_orders = shaper(move |_, reader, _| {
        let id = reader.current()?.get("id").cloned().unwrap_or(DataValue::Null);
        nested_context.set_parameter("customer", id);
        let plan = LogicalPlan::scan("orders")
            .filter(Expression::column("customer_id").equals(Expression::param("customer")));
        Ok(QueryingEnumerable::new(nested_context.clone(), plan, row_shaper()).to_vec()?.len())
    });

    // The outer query keeps the snapshot it started with even though the
    // shaper rebinds the same parameter on every row
    let outer = LogicalPlan::scan("customers")
        .filter(
            Expression::column("id")
                .equals(Expression::param("customer"))
                .or(Expression::column("id").gt(Expression::param("customer"))),
        )
        .sort_by(&["id"]);
    let counts = QueryingEnumerable::new(context, outer, count_orders).to_vec()?;
    assert_eq!(counts, vec![2, 1, 0]);
    Ok(())
}
