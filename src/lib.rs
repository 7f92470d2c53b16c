pub mod analytics;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod oracle;
pub mod orchestrator;
pub mod provision;
pub mod reporting;
pub mod schema;

pub use analytics::AnalyticsEngine;
pub use capability::{
    builtin_registry, handler, CapabilityCall, CapabilityFamily, CapabilityRegistry, CapabilitySpec,
    InvocationRequest, ParameterSpec, ParameterType,
};
pub use config::{AgentConfig, ExecutionConfig, OrchestratorConfig, ReportStyle, ReportingConfig, SynthesisMode};
pub use context::ConversationContext;
pub use error::{AgentError, ErrorKind, Result};
pub use execution::{ExecutionEngine, QueryParameters, Scalar, StructuredResult};
pub use oracle::{LlmOracle, Oracle, OracleDecision, RuleOracle, ScriptedOracle};
pub use orchestrator::{AnswerResult, Orchestrator, TraceEvent, TraceEventType};
pub use provision::provision_northwind;
pub use reporting::ReportFormatter;
pub use schema::{SchemaCatalog, SchemaDescriptor};
