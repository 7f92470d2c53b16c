mod common;

use northwind_agent::{AgentError, ExecutionConfig, ExecutionEngine, QueryParameters, Scalar};
use std::time::{Duration, Instant};

fn engine(store: &common::Northwind) -> ExecutionEngine {
    ExecutionEngine::new(&store.path, ExecutionConfig::default())
}

#[tokio::test]
async fn test_count_column_is_normalized() {
    let store = common::northwind().unwrap();
    let result = engine(&store)
        .run_query("SELECT COUNT(*) FROM Products", QueryParameters::None)
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["count".to_string()]);
    assert_eq!(result.rows, vec![vec![Scalar::Integer(common::PRODUCT_COUNT)]]);
}

#[tokio::test]
async fn test_mutating_statements_never_execute() {
    let store = common::northwind().unwrap();
    let engine = engine(&store);
    for sql in [
        "DROP TABLE Products",
        "delete from Products",
        "UPDATE Products SET UnitPrice = 0",
        "INSERT INTO Categories (CategoryName) VALUES ('x')",
        "Alter Table Products ADD COLUMN x INTEGER",
        "SELECT 1; DELETE FROM Products",
    ] {
        let err = engine.run_query(sql, QueryParameters::None).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsafeQueryRejected(_)), "{}: {:?}", sql, err);
    }

    let count = engine
        .run_query("SELECT COUNT(*) FROM Products", QueryParameters::None)
        .await
        .unwrap();
    assert_eq!(count.rows[0][0], Scalar::Integer(common::PRODUCT_COUNT));
}

#[tokio::test]
async fn test_runaway_query_times_out() {
    let store = common::northwind().unwrap();
    let config = ExecutionConfig {
        query_timeout: Duration::from_millis(200),
        ..ExecutionConfig::default()
    };
    let engine = ExecutionEngine::new(&store.path, config);

    let started = Instant::now();
    let err = engine
        .run_query(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
            QueryParameters::None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::QueryTimeout(_)), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_positional_and_named_binding() {
    let store = common::northwind().unwrap();
    let engine = engine(&store);

    let positional = engine
        .run_query(
            "SELECT ProductName FROM Products WHERE ProductID = ?1",
            QueryParameters::Positional(vec![Scalar::Integer(1)]),
        )
        .await
        .unwrap();
    assert_eq!(positional.rows, vec![vec![Scalar::Text("Chai".to_string())]]);

    // A value that would break an interpolated query binds harmlessly.
    let named = engine
        .run_query(
            "SELECT COUNT(*) AS n FROM Products WHERE ProductName = :name",
            QueryParameters::Named(vec![(":name".to_string(), Scalar::Text("x'; DROP TABLE Products; --".to_string()))]),
        )
        .await
        .unwrap();
    assert_eq!(named.rows[0][0], Scalar::Integer(0));
}

#[tokio::test]
async fn test_rows_are_capped() {
    let store = common::northwind().unwrap();
    let config = ExecutionConfig {
        max_rows: 5,
        ..ExecutionConfig::default()
    };
    let result = ExecutionEngine::new(&store.path, config)
        .run_query("SELECT ProductID FROM Products", QueryParameters::None)
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 5);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_list_tables_covers_northwind() {
    let store = common::northwind().unwrap();
    let result = engine(&store).list_tables().await.unwrap();
    assert_eq!(result.columns, vec!["table".to_string(), "row_count".to_string()]);
    assert!(result.row_count >= 11);

    let products = result
        .rows
        .iter()
        .find(|row| row[0] == Scalar::Text("Products".to_string()))
        .expect("Products listed");
    assert_eq!(products[1], Scalar::Integer(common::PRODUCT_COUNT));
}

#[tokio::test]
async fn test_describe_products() {
    let store = common::northwind().unwrap();
    let result = engine(&store).describe_table("Products").await.unwrap();
    let columns: Vec<_> = result.column_values("column").cloned().collect();
    for name in ["ProductID", "ProductName", "CategoryID", "SupplierID", "UnitPrice", "UnitsInStock"] {
        assert!(columns.contains(&Scalar::Text(name.to_string())), "missing {}", name);
    }
    let references: Vec<_> = result.column_values("references").cloned().collect();
    assert!(references.contains(&Scalar::Text("Categories.CategoryID".to_string())));
}

#[tokio::test]
async fn test_describe_unknown_table_suggests() {
    let store = common::northwind().unwrap();
    match engine(&store).describe_table("Prodcuts").await {
        Err(AgentError::UnknownTable { name, suggestion }) => {
            assert_eq!(name, "Prodcuts");
            assert_eq!(suggestion.as_deref(), Some("Products"));
        }
        other => panic!("expected UnknownTable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_store_is_catalog_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ExecutionEngine::new(dir.path().join("absent.db"), ExecutionConfig::default());
    let err = engine.list_tables().await.unwrap_err();
    assert!(matches!(err, AgentError::CatalogUnavailable(_)), "{:?}", err);
}
