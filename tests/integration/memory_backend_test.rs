use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tempfile::NamedTempFile;

use bayun_pipeline::config::PipelineConfig;
use bayun_pipeline::query::executor::context::QueryContext;
use bayun_pipeline::query::executor::enumerable::QueryingEnumerable;
use bayun_pipeline::query::executor::result::{DataValue, QueryError, Row};
use bayun_pipeline::query::executor::shaper::{row_shaper, typed_shaper};
use bayun_pipeline::query::planner::logical::{Expression, JoinType, LogicalPlan, Operator, OrderingKey, ProjectionColumn};
use bayun_pipeline::storage::memory::MemoryBackend;

#[path = "../common/mod.rs"]
mod common;

use common::{int, shop_backend, text};

const DATASET: &str = r#"{
  "tables": {
    "products": {
      "columns": ["id", "name", "price", "discontinued"],
      "rows": [
        [1, "Widget", 9.5, false],
        [2, "Gadget", 25.0, true],
        [3, "Gizmo", null, false]
      ]
    }
  }
}"#;

fn dataset_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

fn context_for(backend: Arc<MemoryBackend>) -> Arc<QueryContext> {
    Arc::new(QueryContext::for_backend(backend, PipelineConfig::default()))
}

#[test]
fn test_load_dataset_from_json() -> Result<()> {
    let file = dataset_file(DATASET)?;
    let backend = Arc::new(MemoryBackend::from_json_file("products", file.path())?);
    assert_eq!(backend.table_names(), vec!["products".to_string()]);

    let query = QueryingEnumerable::new(context_for(backend), LogicalPlan::scan("products"), row_shaper());
    let rows = query.to_vec()?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("price"), Some(&DataValue::Float(9.5)));
    assert_eq!(rows[2].get("price"), Some(&DataValue::Null));
    assert_eq!(rows[1].get("discontinued"), Some(&DataValue::Boolean(true)));
    Ok(())
}

#[test]
fn test_malformed_dataset_is_rejected() -> Result<()> {
    let file = dataset_file(r#"{"tables": {"t": {"columns": ["a", "b"], "rows": [[1]]}}}"#)?;
    assert!(matches!(
        MemoryBackend::from_json_file("bad", file.path()),
        Err(QueryError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn test_null_comparison_filters_row_out() -> Result<()> {
    let file = dataset_file(DATASET)?;
    let backend = Arc::new(MemoryBackend::from_json_file("products", file.path())?);
    let context = context_for(backend);

    // price < 100 is unknown for the NULL price, so Gizmo is excluded
    let plan = LogicalPlan::scan("products")
        .filter(Expression::column("price").lt(Expression::literal(DataValue::Integer(100))));
    let names: Vec<DataValue> = QueryingEnumerable::new(context.clone(), plan, row_shaper())
        .to_vec()?
        .iter()
        .filter_map(|r| r.get("name").cloned())
        .collect();
    assert_eq!(names, vec![text("Widget"), text("Gadget")]);

    // A NULL parameter turns into IS NULL and finds it
    context.set_parameter("price", DataValue::Null);
    let plan = LogicalPlan::scan("products").filter(Expression::column("price").equals(Expression::param("price")));
    let rows = QueryingEnumerable::new(context, plan, row_shaper()).to_vec()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&text("Gizmo")));
    Ok(())
}

#[test]
fn test_sort_descending_with_offset() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let context = context_for(backend);
    context.set_parameter("skip", int(1));

    let plan = LogicalPlan::Limit {
        count: Expression::literal(int(5)),
        offset: Some(Expression::param("skip")),
        input: Box::new(LogicalPlan::Sort {
            keys: vec![OrderingKey {
                expr: Expression::column("amount"),
                descending: true,
            }],
            input: Box::new(LogicalPlan::scan("orders")),
        }),
    };
    let ids: Vec<i64> = QueryingEnumerable::new(context, plan, row_shaper())
        .to_vec()?
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(ids, vec![12, 11]);
    Ok(())
}

#[test]
fn test_projection_with_computed_column() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let plan = LogicalPlan::scan("orders")
        .filter(Expression::column("customer_id").equals(Expression::literal(int(1))))
        .project(vec![
            ProjectionColumn::from("id"),
            ProjectionColumn {
                expr: Expression::binary(Expression::column("amount"), Operator::Multiply, Expression::literal(int(2))),
                alias: Some("doubled".to_string()),
            },
        ]);
    let rows = QueryingEnumerable::new(context_for(backend), plan, row_shaper()).to_vec()?;
    assert_eq!(
        rows,
        vec![
            Row::from_values(vec!["id".into(), "doubled".into()], vec![int(10), int(500)]),
            Row::from_values(vec!["id".into(), "doubled".into()], vec![int(11), int(150)]),
        ]
    );
    Ok(())
}

#[test]
fn test_in_list_parameter() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let context = context_for(backend);
    context.set_parameter("ids", vec![int(1), int(3)]);
    let plan = LogicalPlan::scan("customers")
        .filter(Expression::column("id").in_param("ids"))
        .sort_by(&["id"]);
    let rows = QueryingEnumerable::new(context, plan, row_shaper()).to_vec()?;
    let names: Vec<&DataValue> = rows.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec![&text("Alice"), &text("Carol")]);
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct Customer {
    id: i64,
    name: String,
}

#[test]
fn test_typed_shaper_deserializes_rows() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let query = QueryingEnumerable::new(context_for(backend), LogicalPlan::scan("customers"), typed_shaper::<Customer>());
    let customers = query.to_vec()?;
    assert_eq!(
        customers[1],
        Customer {
            id: 2,
            name: "Bob".to_string()
        }
    );
    Ok(())
}

#[test]
fn test_division_by_zero_surfaces_as_execution_error() {
    let backend = Arc::new(shop_backend());
    let plan = LogicalPlan::scan("orders").project(vec![ProjectionColumn {
        expr: Expression::binary(Expression::column("amount"), Operator::Divide, Expression::literal(int(0))),
        alias: None,
    }]);
    let err = QueryingEnumerable::new(context_for(backend.clone()), plan, row_shaper())
        .to_vec()
        .unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
    assert_eq!(backend.open_count(), backend.close_count());
}

#[test]
fn test_unknown_table() {
    let backend = Arc::new(shop_backend());
    let err = QueryingEnumerable::new(context_for(backend), LogicalPlan::scan("invoices"), row_shaper())
        .to_vec()
        .unwrap_err();
    assert_eq!(err, QueryError::TableNotFound("invoices".to_string()));
}

#[test]
fn test_left_join_keeps_left_values_when_aliased() -> Result<()> {
    let backend = Arc::new(shop_backend());
    let plan = LogicalPlan::scan_as("customers", "c")
        .join(
            LogicalPlan::scan_as("orders", "o"),
            Expression::column("c.id").equals(Expression::column("o.customer_id")),
            JoinType::Left,
        )
        .filter(Expression::column("c.id").equals(Expression::literal(int(3))));
    let rows = QueryingEnumerable::new(context_for(backend), plan, row_shaper()).to_vec()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("c.id"), Some(&int(3)));
    assert_eq!(rows[0].get("c.name"), Some(&text("Carol")));
    assert_eq!(rows[0].get("o.id"), Some(&DataValue::Null));
    Ok(())
}

#[test]
fn test_join_with_shared_column_name_is_ambiguous() {
    let backend = Arc::new(shop_backend());
    let plan = LogicalPlan::scan("customers").join(
        LogicalPlan::scan("orders"),
        Expression::column("customer_id").equals(Expression::literal(int(3))),
        JoinType::Left,
    );
    let err = QueryingEnumerable::new(context_for(backend.clone()), plan, row_shaper())
        .to_vec()
        .unwrap_err();
    assert!(matches!(&err, QueryError::Execution(message) if message.contains("'id'")), "unexpected error: {}", err);
    assert_eq!(backend.open_count(), backend.close_count());
}

#[test]
fn test_projection_with_duplicate_output_names_is_ambiguous() {
    let backend = Arc::new(shop_backend());
    let plan = LogicalPlan::scan_as("customers", "c")
        .join(
            LogicalPlan::scan_as("orders", "o"),
            Expression::column("c.id").equals(Expression::column("o.customer_id")),
            JoinType::Inner,
        )
        .project(vec!["c.id", "o.id"]);
    let err = QueryingEnumerable::new(context_for(backend), plan, row_shaper())
        .to_vec()
        .unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));

    // Aliasing one side resolves it
    let plan = LogicalPlan::scan_as("customers", "c")
        .join(
            LogicalPlan::scan_as("orders", "o"),
            Expression::column("c.id").equals(Expression::column("o.customer_id")),
            JoinType::Inner,
        )
        .project(vec![
            ProjectionColumn::from("c.id"),
            ProjectionColumn {
                expr: Expression::column("o.id"),
                alias: Some("order_id".to_string()),
            },
        ]);
    let backend = Arc::new(shop_backend());
    let rows = QueryingEnumerable::new(context_for(backend), plan, row_shaper()).to_vec();
    assert_eq!(rows.map(|r| r.len()), Ok(3));
}
