//! Analytics Engine - fixed catalog of read-only aggregations over the Northwind store

use crate::error::{AgentError, Result};
use crate::execution::engine::{ExecutionEngine, QueryParameters};
use crate::execution::result::{Scalar, StructuredResult};
use crate::reporting::share;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

pub const LIMIT_RANGE: RangeInclusive<i64> = 1..=1000;

/// Line revenue after discount. Missing discounts count as none.
const LINE_REVENUE: &str = "od.UnitPrice * od.Quantity * (1 - COALESCE(od.Discount, 0))";

pub struct AnalyticsEngine {
    engine: Arc<ExecutionEngine>,
}

impl AnalyticsEngine {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }

    /// Revenue, order lines and quantity per product category.
    pub async fn sales_by_category(&self) -> Result<StructuredResult> {
        let sql = format!(
            "SELECT c.CategoryName,
                    COUNT(od.OrderID) AS TotalOrders,
                    SUM(od.Quantity) AS TotalQuantity,
                    SUM({rev}) AS TotalRevenue,
                    AVG({rev}) AS AvgOrderValue
             FROM OrderDetails od
             JOIN Products p ON od.ProductID = p.ProductID
             JOIN Categories c ON p.CategoryID = c.CategoryID
             GROUP BY c.CategoryName
             ORDER BY TotalRevenue DESC, c.CategoryName",
            rev = LINE_REVENUE
        );
        let mut result = self.engine.run_query(&sql, QueryParameters::None).await?;
        add_revenue_share(&mut result);
        info!("sales_by_category: {} categories", result.row_count);
        Ok(result)
    }

    /// Best-selling products by revenue. Products without sales rank last with zero revenue.
    pub async fn top_products(&self, limit: i64) -> Result<StructuredResult> {
        let limit = validate_limit(limit)?;
        let sql = format!(
            "SELECT p.ProductName,
                    c.CategoryName,
                    COALESCE(SUM(od.Quantity), 0) AS TotalQuantitySold,
                    COALESCE(SUM({rev}), 0) AS TotalRevenue
             FROM Products p
             JOIN Categories c ON p.CategoryID = c.CategoryID
             LEFT JOIN OrderDetails od ON p.ProductID = od.ProductID
             GROUP BY p.ProductID, p.ProductName, c.CategoryName
             ORDER BY TotalRevenue DESC, p.ProductName
             LIMIT ?1",
            rev = LINE_REVENUE
        );
        self.engine
            .run_query(&sql, QueryParameters::Positional(vec![Scalar::Integer(limit)]))
            .await
    }

    /// Orders, spend and recency per customer, biggest spenders first.
    pub async fn customer_behavior(&self, limit: i64) -> Result<StructuredResult> {
        let limit = validate_limit(limit)?;
        let sql = format!(
            "SELECT cu.CustomerID,
                    cu.CompanyName,
                    cu.Country,
                    COUNT(DISTINCT o.OrderID) AS OrderCount,
                    COALESCE(SUM({rev}), 0) AS TotalSpent,
                    CASE WHEN COUNT(DISTINCT o.OrderID) = 0 THEN NULL
                         ELSE COALESCE(SUM({rev}), 0) / COUNT(DISTINCT o.OrderID) END AS AvgOrderValue,
                    MAX(o.OrderDate) AS LastOrderDate
             FROM Customers cu
             LEFT JOIN Orders o ON o.CustomerID = cu.CustomerID
             LEFT JOIN OrderDetails od ON od.OrderID = o.OrderID
             GROUP BY cu.CustomerID, cu.CompanyName, cu.Country
             ORDER BY TotalSpent DESC, OrderCount DESC, cu.CustomerID
             LIMIT ?1",
            rev = LINE_REVENUE
        );
        self.engine
            .run_query(&sql, QueryParameters::Positional(vec![Scalar::Integer(limit)]))
            .await
    }

    pub async fn sales_by_country(&self) -> Result<StructuredResult> {
        let sql = format!(
            "SELECT o.ShipCountry AS Country,
                    COUNT(DISTINCT o.OrderID) AS OrderCount,
                    SUM({rev}) AS TotalRevenue
             FROM Orders o
             JOIN OrderDetails od ON od.OrderID = o.OrderID
             GROUP BY o.ShipCountry
             ORDER BY TotalRevenue DESC, Country",
            rev = LINE_REVENUE
        );
        let mut result = self.engine.run_query(&sql, QueryParameters::None).await?;
        add_revenue_share(&mut result);
        Ok(result)
    }

    pub async fn employee_performance(&self) -> Result<StructuredResult> {
        let sql = format!(
            "SELECT e.EmployeeID,
                    e.FirstName || ' ' || e.LastName AS EmployeeName,
                    e.Title,
                    COUNT(DISTINCT o.OrderID) AS OrderCount,
                    COALESCE(SUM({rev}), 0) AS TotalRevenue
             FROM Employees e
             LEFT JOIN Orders o ON o.EmployeeID = e.EmployeeID
             LEFT JOIN OrderDetails od ON od.OrderID = o.OrderID
             GROUP BY e.EmployeeID, e.FirstName, e.LastName, e.Title
             ORDER BY TotalRevenue DESC, e.EmployeeID",
            rev = LINE_REVENUE
        );
        let mut result = self.engine.run_query(&sql, QueryParameters::None).await?;
        add_revenue_share(&mut result);
        Ok(result)
    }
}

pub fn validate_limit(limit: i64) -> Result<i64> {
    if LIMIT_RANGE.contains(&limit) {
        Ok(limit)
    } else {
        Err(AgentError::invalid_parameter(
            "limit",
            format!(
                "{} is outside {}..={}",
                limit,
                LIMIT_RANGE.start(),
                LIMIT_RANGE.end()
            ),
        ))
    }
}

/// Append `RevenueShare` (percent of the column total). Null when the total is zero.
fn add_revenue_share(result: &mut StructuredResult) {
    if result.column_index("TotalRevenue").is_none() {
        return;
    }
    let revenues: Vec<f64> = result
        .column_values("TotalRevenue")
        .map(|v| v.as_f64().unwrap_or(0.0))
        .collect();
    let whole: f64 = revenues.iter().sum();
    let shares = revenues
        .iter()
        .map(|part| match share(*part, whole) {
            Some(pct) => Scalar::Real((pct * 100.0).round() / 100.0),
            None => Scalar::Null,
        })
        .collect();
    result.push_column("RevenueShare", shares);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(1000).unwrap(), 1000);
        assert!(matches!(validate_limit(0), Err(AgentError::InvalidParameter { .. })));
        assert!(matches!(validate_limit(1001), Err(AgentError::InvalidParameter { .. })));
    }

    #[test]
    fn test_revenue_share_handles_zero_total() {
        let mut result = StructuredResult::new(
            vec!["Country".to_string(), "TotalRevenue".to_string()],
            vec![
                vec![Scalar::Text("UK".to_string()), Scalar::Real(0.0)],
                vec![Scalar::Text("USA".to_string()), Scalar::Null],
            ],
            0,
        );
        add_revenue_share(&mut result);
        assert_eq!(result.columns.last().map(String::as_str), Some("RevenueShare"));
        assert!(result.column_values("RevenueShare").all(Scalar::is_null));
    }

    #[test]
    fn test_zero_revenue_share_reported_as_not_applicable() {
        use crate::config::{ReportStyle, ReportingConfig};
        use crate::reporting::ReportFormatter;

        let mut result = StructuredResult::new(
            vec!["Country".to_string(), "TotalRevenue".to_string()],
            vec![vec![Scalar::Text("UK".to_string()), Scalar::Real(0.0)]],
            0,
        );
        add_revenue_share(&mut result);
        let text = ReportFormatter::new(&ReportingConfig::default()).format(&[result], ReportStyle::Table);
        assert!(text.contains("| UK | 0.00 | n/a |"), "{}", text);
    }

    #[test]
    fn test_revenue_share_sums_to_hundred() {
        let mut result = StructuredResult::new(
            vec!["TotalRevenue".to_string()],
            vec![vec![Scalar::Real(75.0)], vec![Scalar::Integer(25)]],
            0,
        );
        add_revenue_share(&mut result);
        let shares: Vec<f64> = result
            .column_values("RevenueShare")
            .filter_map(Scalar::as_f64)
            .collect();
        assert_eq!(shares, vec![75.0, 25.0]);
    }
}
