//! Orchestrator - drives one question from first decision to final answer
//!
//! `AwaitingDecision -> Invoking -> Aggregating -> (AwaitingDecision | Finalizing) -> Done`,
//! with `Failed` reachable from every state. Each question runs as an
//! independent cycle owning its own context; only the schema snapshot and
//! the capability registry are shared, and both are read-only.

pub mod trace;

pub use trace::{TraceEvent, TraceEventType};

use crate::analytics::AnalyticsEngine;
use crate::capability::{builtin_registry, CapabilityCall, CapabilityRegistry, InvocationRequest};
use crate::config::{AgentConfig, OrchestratorConfig, SynthesisMode};
use crate::context::ConversationContext;
use crate::error::{AgentError, ErrorKind, Result};
use crate::execution::engine::ExecutionEngine;
use crate::execution::result::StructuredResult;
use crate::oracle::{decode_decision, Oracle, OracleDecision, OracleRequest};
use crate::reporting::{report_text, ReportFormatter};
use crate::schema::{SchemaCatalog, SchemaDescriptor};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shortest window given to oracle synthesis once the cycle budget is spent.
const SYNTHESIS_FLOOR: Duration = Duration::from_millis(50);

const PARTIAL_NOTE: &str =
    "(Partial answer: the step or time budget ran out before the question was fully resolved.)";

/// What the front end receives for one question.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub cycle_id: String,
    pub text: String,
    pub succeeded: bool,
    /// Finalized because a budget ran out rather than on the oracle's signal.
    pub partial: bool,
    pub failure_reason: Option<ErrorKind>,
    /// Distinct capability names in first-attempt order.
    pub capabilities_attempted: Vec<String>,
    pub trace: Vec<TraceEvent>,
}

enum CycleState {
    AwaitingDecision,
    Invoking(InvocationRequest),
    Aggregating(InvocationRequest, StructuredResult),
    Finalizing(Finalization),
    Done(AnswerResult),
    Failed(AgentError),
}

struct Finalization {
    answer: Option<String>,
    partial: bool,
}

impl Finalization {
    fn partial() -> Self {
        Self {
            answer: None,
            partial: true,
        }
    }
}

/// Mutable state of a single cycle. Never shared between cycles.
struct Cycle {
    id: String,
    question: String,
    schema: Arc<SchemaDescriptor>,
    context: ConversationContext,
    trace: Vec<TraceEvent>,
    attempted: Vec<String>,
    failures: HashMap<String, u32>,
    invocations: usize,
    protocol_errors: u32,
    feedback: Option<String>,
    deadline: Instant,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    catalog: SchemaCatalog,
    schema: RwLock<Arc<SchemaDescriptor>>,
    registry: Arc<CapabilityRegistry>,
    oracle: Arc<dyn Oracle>,
    formatter: ReportFormatter,
}

impl Orchestrator {
    /// Loads the schema snapshot up front; an unreachable store fails here.
    pub fn new(
        config: OrchestratorConfig,
        catalog: SchemaCatalog,
        registry: Arc<CapabilityRegistry>,
        oracle: Arc<dyn Oracle>,
        formatter: ReportFormatter,
    ) -> Result<Self> {
        if config.step_budget == 0 {
            return Err(AgentError::Config("step_budget must be at least 1".to_string()));
        }
        let schema = catalog.describe()?;
        info!(
            "Orchestrator ready: {} tables, {} capabilities",
            schema.tables.len(),
            registry.len()
        );
        Ok(Self {
            config,
            catalog,
            schema: RwLock::new(Arc::new(schema)),
            registry,
            oracle,
            formatter,
        })
    }

    /// Wire the built-in engines and capabilities for `config.database_path`.
    pub fn from_config(config: &AgentConfig, oracle: Arc<dyn Oracle>) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(ExecutionEngine::new(&config.database_path, config.execution.clone()));
        let analytics = Arc::new(AnalyticsEngine::new(Arc::clone(&engine)));
        let formatter = ReportFormatter::new(&config.reporting);
        let registry = builtin_registry(
            engine,
            analytics,
            formatter.clone(),
            config.orchestrator.report_style,
        )?;
        Self::new(
            config.orchestrator.clone(),
            SchemaCatalog::new(&config.database_path),
            Arc::new(registry),
            oracle,
            formatter,
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn schema(&self) -> Arc<SchemaDescriptor> {
        Arc::clone(&self.schema.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Re-read the store's schema. Cycles already running keep their snapshot.
    pub fn refresh_schema(&self) -> Result<()> {
        let schema = self.catalog.describe()?;
        *self.schema.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(schema);
        info!("Schema snapshot refreshed");
        Ok(())
    }

    pub async fn ask(&self, question: &str) -> AnswerResult {
        self.ask_with_cancellation(question, &CancellationToken::new())
            .await
    }

    pub async fn ask_with_cancellation(&self, question: &str, cancel: &CancellationToken) -> AnswerResult {
        let cycle_id = Uuid::new_v4().to_string();
        let span = info_span!("cycle", id = %cycle_id);
        self.run_cycle(question, cycle_id, cancel)
            .instrument(span)
            .await
    }

    async fn run_cycle(&self, question: &str, id: String, cancel: &CancellationToken) -> AnswerResult {
        info!("Question: {}", question);
        let mut cycle = Cycle {
            id,
            question: question.to_string(),
            schema: self.schema(),
            context: ConversationContext::new(question),
            trace: Vec::new(),
            attempted: Vec::new(),
            failures: HashMap::new(),
            invocations: 0,
            protocol_errors: 0,
            feedback: None,
            deadline: Instant::now() + self.config.cycle_budget,
        };

        let mut state = CycleState::AwaitingDecision;
        loop {
            state = match state {
                CycleState::AwaitingDecision => self.await_decision(&mut cycle, cancel).await,
                CycleState::Invoking(request) => self.invoke(&mut cycle, request, cancel).await,
                CycleState::Aggregating(request, result) => self.aggregate(&mut cycle, request, result),
                CycleState::Finalizing(finalization) => self.finalize(&mut cycle, finalization, cancel).await,
                CycleState::Done(answer) => return answer,
                CycleState::Failed(error) => return self.fail(cycle, error),
            };
        }
    }

    async fn await_decision(&self, cycle: &mut Cycle, cancel: &CancellationToken) -> CycleState {
        if cancel.is_cancelled() {
            return CycleState::Failed(AgentError::Cancelled);
        }
        if let Some(state) = self.check_budgets(cycle) {
            return state;
        }

        let timeout = self
            .config
            .oracle_timeout
            .min(cycle.deadline.saturating_duration_since(Instant::now()));
        let request = OracleRequest {
            question: &cycle.question,
            schema: &cycle.schema,
            capabilities: self.registry.describe_all(),
            context: &cycle.context,
            step: cycle.invocations + 1,
            remaining_steps: self.config.step_budget - cycle.invocations,
            preview_rows: self.config.prompt_preview_rows,
            feedback: cycle.feedback.as_deref(),
        };

        let reply = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancelled while awaiting a decision");
                return CycleState::Failed(AgentError::Cancelled);
            }
            reply = tokio::time::timeout(timeout, self.oracle.select(&request)) => reply,
        };

        let raw = match reply {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.protocol_error(cycle, e.to_string()),
            Err(_) if Instant::now() >= cycle.deadline => {
                warn!("Cycle budget ran out while awaiting a decision");
                return CycleState::Finalizing(Finalization::partial());
            }
            Err(_) => return self.protocol_error(cycle, format!("no reply within {:?}", timeout)),
        };

        match decode_decision(&raw) {
            OracleDecision::Invoke(request) => {
                cycle.protocol_errors = 0;
                cycle.feedback = None;
                debug!("Oracle chose {}", request.capability);
                cycle.trace.push(TraceEvent::now(
                    TraceEventType::Decision,
                    json!({ "action": "invoke", "capability": request.capability, "step": cycle.invocations + 1 }),
                ));
                CycleState::Invoking(request)
            }
            OracleDecision::Finalize(signal) => {
                debug!("Oracle signalled completion");
                cycle.trace.push(TraceEvent::now(
                    TraceEventType::Decision,
                    json!({ "action": "finalize", "has_answer": signal.answer.is_some() }),
                ));
                CycleState::Finalizing(Finalization {
                    answer: signal.answer,
                    partial: false,
                })
            }
            OracleDecision::Malformed(reason) => {
                debug!("Malformed oracle reply: {}", raw);
                self.protocol_error(cycle, reason)
            }
        }
    }

    /// Wall-clock budget first, then the invocation budget.
    fn check_budgets(&self, cycle: &Cycle) -> Option<CycleState> {
        if Instant::now() >= cycle.deadline {
            warn!("Cycle budget of {:?} exhausted", self.config.cycle_budget);
            return Some(CycleState::Finalizing(Finalization::partial()));
        }
        if cycle.invocations >= self.config.step_budget {
            warn!("Step budget of {} exhausted", self.config.step_budget);
            return Some(if cycle.context.has_results() {
                CycleState::Finalizing(Finalization::partial())
            } else {
                CycleState::Failed(AgentError::StepBudgetExhausted(self.config.step_budget))
            });
        }
        None
    }

    fn protocol_error(&self, cycle: &mut Cycle, reason: String) -> CycleState {
        cycle.protocol_errors += 1;
        warn!(attempt = cycle.protocol_errors, "Oracle protocol error: {}", reason);
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Error,
            json!({ "stage": "decision", "kind": ErrorKind::OracleProtocolError, "message": reason }),
        ));
        if cycle.protocol_errors > self.config.oracle_protocol_retries {
            return CycleState::Failed(AgentError::OracleProtocolError(reason));
        }
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Retry,
            json!({ "stage": "decision", "attempt": cycle.protocol_errors + 1 }),
        ));
        cycle.feedback = Some(reason);
        CycleState::AwaitingDecision
    }

    async fn invoke(&self, cycle: &mut Cycle, request: InvocationRequest, cancel: &CancellationToken) -> CycleState {
        if cancel.is_cancelled() {
            return CycleState::Failed(AgentError::Cancelled);
        }
        cycle.invocations += 1;
        let step = cycle.invocations;
        if !cycle.attempted.contains(&request.capability) {
            cycle.attempted.push(request.capability.clone());
        }
        info!(step, capability = %request.capability, "Invoking capability");
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Invocation,
            json!({ "step": step, "capability": request.capability, "arguments": request.arguments }),
        ));

        let prepared = self
            .registry
            .validate(&request)
            .and_then(|arguments| Ok((self.registry.resolve(&request.capability)?, arguments)));
        let (handler, arguments) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.invocation_failed(cycle, step, request, e),
        };

        let call = CapabilityCall {
            arguments,
            prior_results: Arc::new(cycle.context.successful_results()),
        };
        let timeout = self
            .config
            .invocation_timeout
            .min(cycle.deadline.saturating_duration_since(Instant::now()));
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!(step, "Cancelled during invocation");
                return CycleState::Failed(AgentError::Cancelled);
            }
            outcome = tokio::time::timeout(timeout, handler(call)) => outcome,
        };

        match outcome {
            Ok(Ok(result)) => CycleState::Aggregating(request, result),
            Ok(Err(e)) => self.invocation_failed(cycle, step, request, e),
            Err(_) if Instant::now() >= cycle.deadline => {
                warn!(step, "Cycle budget ran out during invocation");
                cycle
                    .context
                    .push_failure(step, request, &AgentError::QueryTimeout(timeout));
                CycleState::Finalizing(Finalization::partial())
            }
            Err(_) => self.invocation_failed(cycle, step, request, AgentError::QueryTimeout(timeout)),
        }
    }

    /// Record the failure and go back to the oracle, unless this capability
    /// has used up its retries or the failure cannot be recovered locally.
    fn invocation_failed(
        &self,
        cycle: &mut Cycle,
        step: usize,
        request: InvocationRequest,
        error: AgentError,
    ) -> CycleState {
        let capability = request.capability.clone();
        warn!(step, capability = %capability, "Invocation failed: {}", error);
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Error,
            json!({ "step": step, "capability": capability, "kind": error.kind(), "message": error.to_string() }),
        ));
        cycle.context.push_failure(step, request, &error);

        if matches!(error, AgentError::CatalogUnavailable(_) | AgentError::Cancelled) {
            return CycleState::Failed(error);
        }

        let failures = cycle.failures.entry(capability.clone()).or_insert(0);
        *failures += 1;
        if *failures > self.config.max_retries_per_capability {
            warn!("Retry budget for '{}' exhausted after {} failures", capability, failures);
            return CycleState::Failed(error);
        }
        let failures = *failures;
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Retry,
            json!({ "capability": capability, "failures": failures }),
        ));
        CycleState::AwaitingDecision
    }

    fn aggregate(&self, cycle: &mut Cycle, request: InvocationRequest, result: StructuredResult) -> CycleState {
        let step = cycle.invocations;
        info!(
            step,
            capability = %request.capability,
            rows = result.row_count,
            elapsed_ms = result.elapsed_ms,
            "Invocation succeeded"
        );
        cycle.trace.push(TraceEvent::now(
            TraceEventType::InvocationResult,
            json!({
                "step": step,
                "capability": request.capability,
                "columns": result.columns,
                "row_count": result.row_count,
                "truncated": result.truncated,
                "elapsed_ms": result.elapsed_ms,
            }),
        ));
        cycle.context.push_success(step, request, result);

        if cycle.invocations >= self.config.step_budget {
            info!("Step budget of {} reached, finalizing", self.config.step_budget);
            return CycleState::Finalizing(Finalization::partial());
        }
        CycleState::AwaitingDecision
    }

    async fn finalize(&self, cycle: &mut Cycle, finalization: Finalization, cancel: &CancellationToken) -> CycleState {
        let results = cycle.context.successful_results();

        let mut text = None;
        if self.config.synthesis == SynthesisMode::Oracle && !results.is_empty() {
            // Bounded by what is left of the cycle budget, with a floor so a
            // cycle finalized at the deadline still gets a short attempt.
            let timeout = self
                .config
                .oracle_timeout
                .min(cycle.deadline.saturating_duration_since(Instant::now()))
                .max(SYNTHESIS_FLOOR.min(self.config.oracle_timeout));
            let synthesis = self.oracle.synthesize(&cycle.question, &cycle.context);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cancelled during synthesis");
                    return CycleState::Failed(AgentError::Cancelled);
                }
                outcome = tokio::time::timeout(timeout, synthesis) => outcome,
            };
            match outcome {
                Ok(Ok(Some(prose))) if !prose.trim().is_empty() => text = Some(prose),
                Ok(Ok(_)) => debug!("Oracle offered no synthesis, using formatter"),
                Ok(Err(e)) => warn!("Synthesis failed, using formatter: {}", e),
                Err(_) => warn!("Synthesis timed out, using formatter"),
            }
        }
        let mut text = text.unwrap_or_else(|| self.render(&results, finalization.answer.as_deref()));
        if finalization.partial {
            text = format!("{}\n\n{}", text, PARTIAL_NOTE);
        }

        info!(
            invocations = cycle.invocations,
            results = results.len(),
            partial = finalization.partial,
            "Cycle finished"
        );
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Finalize,
            json!({ "invocations": cycle.invocations, "results": results.len(), "partial": finalization.partial }),
        ));

        CycleState::Done(AnswerResult {
            cycle_id: cycle.id.clone(),
            text,
            succeeded: true,
            partial: finalization.partial,
            failure_reason: None,
            capabilities_attempted: std::mem::take(&mut cycle.attempted),
            trace: std::mem::take(&mut cycle.trace),
        })
    }

    /// A report produced during the cycle already covers earlier results.
    fn render(&self, results: &[StructuredResult], answer: Option<&str>) -> String {
        let body = match results.iter().rev().find_map(report_text) {
            Some(report) => report.to_string(),
            None => self.formatter.format(results, self.config.report_style),
        };
        match answer {
            Some(answer) if !results.is_empty() => format!("{}\n\n{}", answer.trim(), body),
            Some(answer) => answer.trim().to_string(),
            None => body,
        }
    }

    fn fail(&self, mut cycle: Cycle, error: AgentError) -> AnswerResult {
        let kind = error.kind();
        warn!(reason = %kind, "Cycle failed: {}", error);
        cycle.trace.push(TraceEvent::now(
            TraceEventType::Error,
            json!({ "stage": "cycle", "kind": kind }),
        ));
        let attempted = if cycle.attempted.is_empty() {
            "none".to_string()
        } else {
            cycle.attempted.join(", ")
        };
        AnswerResult {
            cycle_id: cycle.id,
            text: format!("{} Capabilities attempted: {}.", kind.user_message(), attempted),
            succeeded: false,
            partial: false,
            failure_reason: Some(kind),
            capabilities_attempted: cycle.attempted,
            trace: cycle.trace,
        }
    }
}
