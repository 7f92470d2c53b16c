//! Offline oracle routing questions to capabilities by keyword.
//!
//! Used by the CLI when no API key is configured. Invokes one capability per
//! question and finalizes as soon as a result is in the context.

use crate::error::{AgentError, Result};
use crate::oracle::{Oracle, OracleRequest};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

type Builder = fn(&regex::Captures<'_>, &OracleRequest<'_>) -> Option<Value>;

struct Route {
    pattern: Regex,
    build: Builder,
}

fn route(pattern: &str, build: Builder) -> Result<Route> {
    let pattern = Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| AgentError::Config(format!("bad route pattern: {}", e)))?;
    Ok(Route { pattern, build })
}

pub struct RuleOracle {
    routes: Vec<Route>,
}

impl RuleOracle {
    pub fn new() -> Result<Self> {
        Ok(Self {
            routes: vec![
                route(r"\b(schema|describe|columns)\b", |_, req| {
                    mentioned_table(req).map(|table| invoke("describe_table", json!({ "table": table })))
                })?,
                route(r"\btop\s+(\d+)|best[- ]selling", |caps, _| {
                    let limit = caps
                        .get(1)
                        .and_then(|m| m.as_str().parse::<i64>().ok())
                        .unwrap_or(10);
                    Some(invoke("top_products", json!({ "limit": limit })))
                })?,
                route(r"\bhow many\b", |_, req| {
                    mentioned_table(req).map(|table| {
                        invoke("run_query", json!({ "sql": format!("SELECT COUNT(*) FROM \"{}\"", table) }))
                    })
                })?,
                route(r"\bcategor", |_, _| Some(invoke("sales_by_category", json!({}))))?,
                route(r"\bcustomers?\b", |_, _| Some(invoke("customer_behavior", json!({ "limit": 10 }))))?,
                route(r"average order value", |_, _| {
                    Some(invoke(
                        "run_query",
                        json!({ "sql": "SELECT AVG(OrderTotal) AS AvgOrderValue FROM (\
                            SELECT SUM(UnitPrice * Quantity * (1 - COALESCE(Discount, 0))) AS OrderTotal \
                            FROM OrderDetails GROUP BY OrderID)" }),
                    ))
                })?,
                route(r"\bsuppliers?\b", |_, _| {
                    Some(invoke(
                        "run_query",
                        json!({ "sql": "SELECT s.CompanyName, COUNT(p.ProductID) AS ProductCount \
                            FROM Suppliers s LEFT JOIN Products p ON p.SupplierID = s.SupplierID \
                            GROUP BY s.SupplierID ORDER BY ProductCount DESC" }),
                    ))
                })?,
                route(r"\bcountry|countries\b", |_, _| Some(invoke("sales_by_country", json!({}))))?,
                route(r"\bemployees?\b", |_, _| Some(invoke("employee_performance", json!({}))))?,
                route(r"out of stock", |_, _| {
                    Some(invoke(
                        "run_query",
                        json!({ "sql": "SELECT ProductName, UnitsInStock FROM Products WHERE UnitsInStock = ?1",
                                "parameters": [0] }),
                    ))
                })?,
                route(r"\b(trend|seasonal|monthly)", |_, _| {
                    Some(invoke(
                        "run_query",
                        json!({ "sql": "SELECT strftime('%Y-%m', o.OrderDate) AS Month, COUNT(DISTINCT o.OrderID) AS OrderCount, \
                            SUM(od.UnitPrice * od.Quantity * (1 - COALESCE(od.Discount, 0))) AS TotalRevenue \
                            FROM Orders o JOIN OrderDetails od ON od.OrderID = o.OrderID \
                            GROUP BY Month ORDER BY Month" }),
                    ))
                })?,
                route(r"\btables\b", |_, _| Some(invoke("list_tables", json!({}))))?,
            ],
        })
    }

    /// Capability invocation the question routes to, if any.
    pub fn route(&self, request: &OracleRequest<'_>) -> Option<Value> {
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .captures(request.question)
                .and_then(|caps| (route.build)(&caps, request))
        })
    }
}

#[async_trait]
impl Oracle for RuleOracle {
    async fn select(&self, request: &OracleRequest<'_>) -> Result<String> {
        if !request.context.is_empty() {
            return Ok(json!({ "action": "finalize" }).to_string());
        }
        let decision = self.route(request).unwrap_or_else(|| {
            json!({
                "action": "finalize",
                "answer": "No offline route matches this question. Set OPENAI_API_KEY to use the language model."
            })
        });
        Ok(decision.to_string())
    }
}

fn invoke(capability: &str, arguments: Value) -> Value {
    json!({ "action": "invoke", "capability": capability, "arguments": arguments })
}

/// Longest schema table name appearing in the question, allowing a plural `s`.
fn mentioned_table(request: &OracleRequest<'_>) -> Option<String> {
    let question = request.question.to_lowercase();
    request
        .schema
        .table_names()
        .into_iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            let singular = lower.strip_suffix('s').unwrap_or(&lower);
            !singular.is_empty() && (question.contains(&lower) || question.contains(singular))
        })
        .max_by_key(|name| name.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConversationContext;
    use crate::oracle::{decode_decision, OracleDecision};
    use crate::schema::{SchemaDescriptor, TableDescriptor};

    fn table(name: &str) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            referenced_by: Vec::new(),
        }
    }

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor {
            tables: vec![table("Products"), table("Orders"), table("OrderDetails")],
        }
    }

    async fn decide(question: &str, context: &ConversationContext) -> OracleDecision {
        decide_with(&schema(), question, context).await
    }

    async fn decide_with(schema: &SchemaDescriptor, question: &str, context: &ConversationContext) -> OracleDecision {
        let request = OracleRequest {
            question,
            schema,
            capabilities: &[],
            context,
            step: 1,
            remaining_steps: 6,
            preview_rows: 5,
            feedback: None,
        };
        decode_decision(&RuleOracle::new().unwrap().select(&request).await.unwrap())
    }

    #[test]
    fn test_every_route_compiles() {
        assert!(RuleOracle::new().unwrap().routes.len() > 10);
    }

    #[tokio::test]
    async fn test_top_n_carries_limit() {
        let context = ConversationContext::new("q");
        match decide("What are the top 5 best-selling products?", &context).await {
            OracleDecision::Invoke(req) => {
                assert_eq!(req.capability, "top_products");
                assert_eq!(req.arguments["limit"], json!(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_count_targets_mentioned_table() {
        let context = ConversationContext::new("q");
        match decide("How many products do we have?", &context).await {
            OracleDecision::Invoke(req) => {
                assert_eq!(req.capability, "run_query");
                assert_eq!(req.arguments["sql"], json!("SELECT COUNT(*) FROM \"Products\""));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrouted_question_finalizes() {
        let context = ConversationContext::new("q");
        assert!(matches!(
            decide("What is the meaning of life?", &context).await,
            OracleDecision::Finalize(_)
        ));
    }

    #[tokio::test]
    async fn test_lone_s_table_name_does_not_match_every_question() {
        let mut schema = schema();
        schema.tables.push(table("s"));
        let context = ConversationContext::new("q");

        assert!(matches!(
            decide_with(&schema, "How many widgets are there?", &context).await,
            OracleDecision::Finalize(_)
        ));
        match decide_with(&schema, "How many orders are there?", &context).await {
            OracleDecision::Invoke(req) => {
                assert_eq!(req.arguments["sql"], json!("SELECT COUNT(*) FROM \"Orders\""))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
