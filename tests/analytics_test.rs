mod common;

use northwind_agent::{
    builtin_registry, AgentError, AnalyticsEngine, CapabilityCall, ExecutionConfig, ExecutionEngine,
    InvocationRequest, ReportFormatter, ReportStyle, ReportingConfig, Scalar,
};
use serde_json::json;
use std::sync::Arc;

fn analytics(store: &common::Northwind) -> AnalyticsEngine {
    AnalyticsEngine::new(Arc::new(ExecutionEngine::new(&store.path, ExecutionConfig::default())))
}

fn revenues(result: &northwind_agent::StructuredResult) -> Vec<f64> {
    result
        .column_values("TotalRevenue")
        .map(|v| v.as_f64().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_top_products_ranked_by_revenue() {
    let store = common::northwind().unwrap();
    let result = analytics(&store).top_products(5).await.unwrap();

    assert!(result.row_count <= 5);
    let revenue = revenues(&result);
    assert!(revenue.windows(2).all(|w| w[0] >= w[1]), "{:?}", revenue);
    // 15 x 22.00 at 15% off beats every undiscounted line.
    assert_eq!(
        result.column_values("ProductName").next(),
        Some(&Scalar::Text("Chef Anton Cajun Seasoning".to_string()))
    );
}

#[tokio::test]
async fn test_limit_bounds_enforced_by_engine() {
    let store = common::northwind().unwrap();
    let analytics = analytics(&store);
    for limit in [0, 1001, -3] {
        let err = analytics.top_products(limit).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameter { .. }), "{}: {:?}", limit, err);
        let err = analytics.customer_behavior(limit).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameter { .. }), "{}: {:?}", limit, err);
    }
}

#[tokio::test]
async fn test_limit_bounds_enforced_by_registry() {
    let store = common::northwind().unwrap();
    let engine = Arc::new(ExecutionEngine::new(&store.path, ExecutionConfig::default()));
    let registry = builtin_registry(
        Arc::clone(&engine),
        Arc::new(AnalyticsEngine::new(engine)),
        ReportFormatter::new(&ReportingConfig::default()),
        ReportStyle::Table,
    )
    .unwrap();

    for limit in [0, 1001] {
        let err = registry
            .validate(&InvocationRequest::new("top_products", json!({ "limit": limit })))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameter { .. }), "{}: {:?}", limit, err);
    }

    let arguments = registry
        .validate(&InvocationRequest::new("top_products", json!({})))
        .unwrap();
    assert_eq!(arguments["limit"], json!(10));
    let handler = registry.resolve("top_products").unwrap();
    let result = handler(CapabilityCall::new(arguments)).await.unwrap();
    assert_eq!(result.row_count, 10);
}

#[tokio::test]
async fn test_category_shares_sum_to_whole() {
    let store = common::northwind().unwrap();
    let result = analytics(&store).sales_by_category().await.unwrap();

    assert!(result.column_index("RevenueShare").is_some());
    let total: f64 = result
        .column_values("RevenueShare")
        .filter_map(Scalar::as_f64)
        .sum();
    assert!((total - 100.0).abs() < 0.05, "shares sum to {}", total);
}

#[tokio::test]
async fn test_country_and_employee_breakdowns() {
    let store = common::northwind().unwrap();
    let analytics = analytics(&store);

    let countries = analytics.sales_by_country().await.unwrap();
    let names: Vec<_> = countries.column_values("Country").cloned().collect();
    assert!(names.contains(&Scalar::Text("Germany".to_string())));
    assert!(names.contains(&Scalar::Text("Sweden".to_string())));

    let employees = analytics.employee_performance().await.unwrap();
    assert!(employees.column_index("EmployeeName").is_some());
    assert!(employees.row_count > 0);
}

#[tokio::test]
async fn test_customer_behavior_limit() {
    let store = common::northwind().unwrap();
    let result = analytics(&store).customer_behavior(2).await.unwrap();
    assert_eq!(result.row_count, 2);
    assert!(result.column_index("TotalSpent").is_some());
}
