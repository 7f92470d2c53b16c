//! Per-question record of invocations and their outcomes.

use crate::capability::InvocationRequest;
use crate::error::{AgentError, ErrorKind};
use crate::execution::result::StructuredResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success { result: StructuredResult },
    Failure { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub step: usize,
    pub request: InvocationRequest,
    pub outcome: InvocationOutcome,
}

/// Discarded once the question is answered; nothing carries over between questions.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub question: String,
    pub entries: Vec<ContextEntry>,
}

impl ConversationContext {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn push_success(&mut self, step: usize, request: InvocationRequest, result: StructuredResult) {
        self.entries.push(ContextEntry {
            step,
            request,
            outcome: InvocationOutcome::Success { result },
        });
    }

    pub fn push_failure(&mut self, step: usize, request: InvocationRequest, error: &AgentError) {
        self.entries.push(ContextEntry {
            step,
            request,
            outcome: InvocationOutcome::Failure {
                kind: error.kind(),
                message: error.to_string(),
            },
        });
    }

    pub fn successful_results(&self) -> Vec<StructuredResult> {
        self.entries
            .iter()
            .filter_map(|e| match &e.outcome {
                InvocationOutcome::Success { result } => Some(result.clone()),
                InvocationOutcome::Failure { .. } => None,
            })
            .collect()
    }

    pub fn has_results(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.outcome, InvocationOutcome::Success { .. }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text form for prompts; each result is previewed as JSON records.
    pub fn render(&self, preview_rows: usize) -> String {
        if self.entries.is_empty() {
            return "(none yet)".to_string();
        }
        self.entries
            .iter()
            .map(|entry| {
                let args = serde_json::Value::Object(entry.request.arguments.clone());
                let head = format!("Step {}: {} {}", entry.step, entry.request.capability, args);
                match &entry.outcome {
                    InvocationOutcome::Success { result } => {
                        format!("{}\n  -> {}", head, result.to_json_records(preview_rows))
                    }
                    InvocationOutcome::Failure { kind, message } => {
                        format!("{}\n  -> failed ({}): {}", head, kind, message)
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
