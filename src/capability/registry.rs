//! Capability Registry - name -> (spec, handler) table populated at startup
//!
//! Nothing mutates the registry once it is shared, so concurrent cycles read it
//! through an `Arc` without locking.

use crate::capability::spec::{CapabilitySpec, InvocationRequest};
use crate::error::{AgentError, Result};
use crate::execution::engine::closest;
use crate::execution::result::StructuredResult;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Input handed to a capability handler.
#[derive(Debug, Clone)]
pub struct CapabilityCall {
    /// Validated arguments with defaults filled in.
    pub arguments: Map<String, Value>,
    /// Successful results gathered earlier in the same cycle.
    pub prior_results: Arc<Vec<StructuredResult>>,
}

impl CapabilityCall {
    pub fn new(arguments: Map<String, Value>) -> Self {
        Self {
            arguments,
            prior_results: Arc::new(Vec::new()),
        }
    }

    pub fn str_arg(&self, name: &str) -> Result<&str> {
        self.arguments
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::invalid_parameter(name, "expected a string"))
    }

    pub fn i64_arg(&self, name: &str) -> Result<i64> {
        self.arguments
            .get(name)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AgentError::invalid_parameter(name, "expected an integer"))
    }
}

pub type CapabilityFuture = Pin<Box<dyn Future<Output = Result<StructuredResult>> + Send>>;
pub type CapabilityHandler = Arc<dyn Fn(CapabilityCall) -> CapabilityFuture + Send + Sync>;

/// Wrap an async closure as a [`CapabilityHandler`].
pub fn handler<F, Fut>(f: F) -> CapabilityHandler
where
    F: Fn(CapabilityCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StructuredResult>> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

#[derive(Default)]
pub struct CapabilityRegistry {
    specs: Vec<CapabilitySpec>,
    handlers: Vec<CapabilityHandler>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CapabilitySpec, handler: CapabilityHandler) -> Result<()> {
        if self.index.contains_key(&spec.name) {
            return Err(AgentError::DuplicateCapability(spec.name));
        }
        debug!("Registered capability {} ({:?})", spec.name, spec.family);
        self.index.insert(spec.name.clone(), self.specs.len());
        self.specs.push(spec);
        self.handlers.push(handler);
        Ok(())
    }

    /// Specs in registration order, for prompt construction.
    pub fn describe_all(&self) -> &[CapabilitySpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Result<&CapabilitySpec> {
        self.lookup(name).map(|idx| &self.specs[idx])
    }

    pub fn resolve(&self, name: &str) -> Result<CapabilityHandler> {
        self.lookup(name).map(|idx| Arc::clone(&self.handlers[idx]))
    }

    /// Check a request against its spec and return the arguments to call with.
    pub fn validate(&self, request: &InvocationRequest) -> Result<Map<String, Value>> {
        self.spec(&request.capability)?
            .validate_arguments(&request.arguments)
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AgentError::UnknownCapability {
                name: name.to_string(),
                suggestion: closest(name, &self.names()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::spec::CapabilityFamily;
    use crate::execution::result::Scalar;

    async fn count_arguments(call: CapabilityCall) -> Result<StructuredResult> {
        Ok(StructuredResult::single(
            "echo",
            Scalar::Integer(call.arguments.len() as i64),
        ))
    }

    fn echo() -> CapabilityHandler {
        handler(count_arguments)
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = CapabilityRegistry::new();
        let spec = CapabilitySpec::new("list_tables", CapabilityFamily::Execution, "");
        registry.register(spec.clone(), echo()).unwrap();
        assert!(matches!(
            registry.register(spec, echo()),
            Err(AgentError::DuplicateCapability(name)) if name == "list_tables"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_suggests_nearest() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(CapabilitySpec::new("run_query", CapabilityFamily::Execution, ""), echo())
            .unwrap();
        assert!(registry.resolve("run_query").is_ok());
        match registry.resolve("run_qeury") {
            Err(AgentError::UnknownCapability { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("run_query"))
            }
            _ => panic!("expected UnknownCapability"),
        }
    }

    #[tokio::test]
    async fn test_resolved_handler_runs() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(CapabilitySpec::new("echo", CapabilityFamily::Reporting, ""), echo())
            .unwrap();
        let handler = registry.resolve("echo").unwrap();
        let result = handler(CapabilityCall::new(Map::new())).await.unwrap();
        assert_eq!(result.rows, vec![vec![Scalar::Integer(0)]]);
    }
}
