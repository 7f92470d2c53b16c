//! Built-in capability families registered at startup.

use crate::analytics::{AnalyticsEngine, LIMIT_RANGE};
use crate::capability::registry::{handler, CapabilityCall, CapabilityRegistry};
use crate::capability::spec::{CapabilityFamily, CapabilitySpec, ParameterSpec, ParameterType, ReturnShape};
use crate::config::ReportStyle;
use crate::error::Result;
use crate::execution::engine::{ExecutionEngine, QueryParameters};
use crate::execution::result::{Scalar, StructuredResult};
use crate::reporting::{ReportFormatter, REPORT_COLUMN};
use serde_json::json;
use std::sync::Arc;

/// Registry with the execution, analytics and reporting families.
pub fn builtin_registry(
    engine: Arc<ExecutionEngine>,
    analytics: Arc<AnalyticsEngine>,
    formatter: ReportFormatter,
    default_style: ReportStyle,
) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    register_execution(&mut registry, engine)?;
    register_analytics(&mut registry, analytics)?;
    register_reporting(&mut registry, formatter, default_style)?;
    Ok(registry)
}

pub fn register_execution(registry: &mut CapabilityRegistry, engine: Arc<ExecutionEngine>) -> Result<()> {
    let e = Arc::clone(&engine);
    registry.register(
        CapabilitySpec::new(
            "run_query",
            CapabilityFamily::Execution,
            "Run one read-only SELECT (SQLite dialect). Bind values with ?1/?2 or :name via `parameters` instead of inlining them.",
        )
        .param(ParameterSpec::required("sql", ParameterType::String, "a single SELECT or WITH statement"))
        .param(ParameterSpec::optional(
            "parameters",
            ParameterType::Any,
            "array of positional values or object of named values",
            None,
        )),
        handler(move |call: CapabilityCall| run_query(Arc::clone(&e), call)),
    )?;

    let e = Arc::clone(&engine);
    registry.register(
        CapabilitySpec::new("list_tables", CapabilityFamily::Execution, "List every table with its row count.")
            .returns(ReturnShape::columns(&["table", "row_count"])),
        handler(move |_call: CapabilityCall| {
            let engine = Arc::clone(&e);
            async move { engine.list_tables().await }
        }),
    )?;

    registry.register(
        CapabilitySpec::new(
            "describe_table",
            CapabilityFamily::Execution,
            "Columns of one table with type, nullability, default, primary key and references.",
        )
        .param(ParameterSpec::required("table", ParameterType::String, "table name"))
        .returns(ReturnShape::columns(&[
            "column",
            "type",
            "nullable",
            "default",
            "primary_key",
            "references",
        ])),
        handler(move |call: CapabilityCall| describe_table(Arc::clone(&engine), call)),
    )
}

pub fn register_analytics(registry: &mut CapabilityRegistry, analytics: Arc<AnalyticsEngine>) -> Result<()> {
    let limit = |description: &str| {
        ParameterSpec::optional("limit", ParameterType::Integer, description, Some(json!(10)))
            .bounded(*LIMIT_RANGE.start() as f64, *LIMIT_RANGE.end() as f64)
    };

    let a = Arc::clone(&analytics);
    registry.register(
        CapabilitySpec::new(
            "sales_by_category",
            CapabilityFamily::Analytics,
            "Order lines, quantity, revenue, average line value and revenue share per product category.",
        )
        .returns(ReturnShape::columns(&[
            "CategoryName",
            "TotalOrders",
            "TotalQuantity",
            "TotalRevenue",
            "AvgOrderValue",
            "RevenueShare",
        ])),
        handler(move |_call: CapabilityCall| {
            let analytics = Arc::clone(&a);
            async move { analytics.sales_by_category().await }
        }),
    )?;

    let a = Arc::clone(&analytics);
    registry.register(
        CapabilitySpec::new(
            "top_products",
            CapabilityFamily::Analytics,
            "Best-selling products ranked by revenue, highest first.",
        )
        .param(limit("number of products to return"))
        .returns(ReturnShape::columns(&[
            "ProductName",
            "CategoryName",
            "TotalQuantitySold",
            "TotalRevenue",
        ])),
        handler(move |call: CapabilityCall| top_products(Arc::clone(&a), call)),
    )?;

    let a = Arc::clone(&analytics);
    registry.register(
        CapabilitySpec::new(
            "customer_behavior",
            CapabilityFamily::Analytics,
            "Order count, total spend, average order value and last order date per customer.",
        )
        .param(limit("number of customers to return"))
        .returns(ReturnShape::columns(&[
            "CustomerID",
            "CompanyName",
            "Country",
            "OrderCount",
            "TotalSpent",
            "AvgOrderValue",
            "LastOrderDate",
        ])),
        handler(move |call: CapabilityCall| customer_behavior(Arc::clone(&a), call)),
    )?;

    let a = Arc::clone(&analytics);
    registry.register(
        CapabilitySpec::new(
            "sales_by_country",
            CapabilityFamily::Analytics,
            "Orders and revenue per ship country.",
        )
        .returns(ReturnShape::columns(&["Country", "OrderCount", "TotalRevenue", "RevenueShare"])),
        handler(move |_call: CapabilityCall| {
            let analytics = Arc::clone(&a);
            async move { analytics.sales_by_country().await }
        }),
    )?;

    registry.register(
        CapabilitySpec::new(
            "employee_performance",
            CapabilityFamily::Analytics,
            "Orders handled and revenue generated per employee.",
        )
        .returns(ReturnShape::columns(&[
            "EmployeeID",
            "EmployeeName",
            "Title",
            "OrderCount",
            "TotalRevenue",
            "RevenueShare",
        ])),
        handler(move |_call: CapabilityCall| {
            let analytics = Arc::clone(&analytics);
            async move { analytics.employee_performance().await }
        }),
    )
}

pub fn register_reporting(
    registry: &mut CapabilityRegistry,
    formatter: ReportFormatter,
    default_style: ReportStyle,
) -> Result<()> {
    let default_style = match default_style {
        ReportStyle::Table => "table",
        ReportStyle::Prose => "prose",
        ReportStyle::Csv => "csv",
    };
    let formatter = Arc::new(formatter);
    registry.register(
        CapabilitySpec::new(
            "format_report",
            CapabilityFamily::Reporting,
            "Format every result gathered so far as a table, prose or csv report.",
        )
        .param(ParameterSpec::optional(
            "style",
            ParameterType::String,
            "table, prose or csv",
            Some(json!(default_style)),
        ))
        .returns(ReturnShape::columns(&[REPORT_COLUMN])),
        handler(move |call: CapabilityCall| format_report(Arc::clone(&formatter), call)),
    )
}

async fn run_query(engine: Arc<ExecutionEngine>, call: CapabilityCall) -> Result<StructuredResult> {
    let sql = call.str_arg("sql")?;
    let params = QueryParameters::from_json(call.arguments.get("parameters"))?;
    engine.run_query(sql, params).await
}

async fn describe_table(engine: Arc<ExecutionEngine>, call: CapabilityCall) -> Result<StructuredResult> {
    engine.describe_table(call.str_arg("table")?).await
}

async fn top_products(analytics: Arc<AnalyticsEngine>, call: CapabilityCall) -> Result<StructuredResult> {
    analytics.top_products(call.i64_arg("limit")?).await
}

async fn customer_behavior(analytics: Arc<AnalyticsEngine>, call: CapabilityCall) -> Result<StructuredResult> {
    analytics.customer_behavior(call.i64_arg("limit")?).await
}

async fn format_report(formatter: Arc<ReportFormatter>, call: CapabilityCall) -> Result<StructuredResult> {
    let style: ReportStyle = call.str_arg("style")?.parse()?;
    let text = formatter.format(&call.prior_results, style);
    Ok(StructuredResult::single(REPORT_COLUMN, Scalar::Text(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, ReportingConfig};
    use serde_json::Map;

    fn registry() -> CapabilityRegistry {
        let engine = Arc::new(ExecutionEngine::new("/nonexistent.db", ExecutionConfig::default()));
        let analytics = Arc::new(AnalyticsEngine::new(Arc::clone(&engine)));
        builtin_registry(
            engine,
            analytics,
            ReportFormatter::new(&ReportingConfig::default()),
            ReportStyle::Table,
        )
        .unwrap()
    }

    #[test]
    fn test_all_families_registered() {
        let registry = registry();
        for name in [
            "run_query",
            "list_tables",
            "describe_table",
            "sales_by_category",
            "top_products",
            "customer_behavior",
            "sales_by_country",
            "employee_performance",
            "format_report",
        ] {
            assert!(registry.resolve(name).is_ok(), "{} missing", name);
        }
        assert_eq!(registry.len(), 9);
    }

    #[tokio::test]
    async fn test_format_report_uses_prior_results() {
        let registry = registry();
        let handler = registry.resolve("format_report").unwrap();
        let arguments = registry
            .validate(&crate::capability::InvocationRequest::new("format_report", json!({})))
            .unwrap();
        let call = CapabilityCall {
            arguments,
            prior_results: Arc::new(vec![StructuredResult::single("count", Scalar::Integer(77))]),
        };
        let result = handler(call).await.unwrap();
        assert_eq!(result.columns, vec![REPORT_COLUMN.to_string()]);
        match &result.rows[0][0] {
            Scalar::Text(text) => assert!(text.contains("77")),
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_style_is_invalid_parameter() {
        let registry = registry();
        let handler = registry.resolve("format_report").unwrap();
        let mut arguments = Map::new();
        arguments.insert("style".to_string(), json!("html"));
        let err = handler(CapabilityCall::new(arguments)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidParameter);
    }
}
