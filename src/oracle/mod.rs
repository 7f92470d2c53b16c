//! Oracle boundary
//!
//! The oracle maps a question plus schema, capabilities and results so far to
//! the next decision. It is consumed as a black box returning raw text; the
//! orchestrator owns decoding.

pub mod decision;
pub mod llm;
pub mod rules;
pub mod scripted;

pub use decision::{decode_decision, FinalizeSignal, OracleDecision};
pub use llm::LlmOracle;
pub use rules::RuleOracle;
pub use scripted::{RecordedRequest, ScriptedOracle};

use crate::capability::CapabilitySpec;
use crate::context::ConversationContext;
use crate::error::Result;
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;

/// Everything the oracle sees for one decision.
pub struct OracleRequest<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaDescriptor,
    pub capabilities: &'a [CapabilitySpec],
    pub context: &'a ConversationContext,
    /// 1-based index of the invocation this decision would be.
    pub step: usize,
    pub remaining_steps: usize,
    pub preview_rows: usize,
    /// Why the previous reply was rejected, if it was.
    pub feedback: Option<&'a str>,
}

impl OracleRequest<'_> {
    pub fn render_prompt(&self) -> String {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| format!("- {}: {}", c.signature(), c.description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            r#"You answer questions about a SQLite database by invoking capabilities.

Schema:
{schema}

Capabilities:
{capabilities}

Question: "{question}"

Results so far:
{context}

You may invoke {remaining} more capabilities (this would be step {step}).
Reply with exactly one JSON object and no other text, either
{{"action":"invoke","capability":"<name>","arguments":{{...}}}}
or, once the results answer the question,
{{"action":"finalize","answer":"<short answer using only numbers from the results>"}}"#,
            schema = self.schema.render(),
            capabilities = capabilities,
            question = self.question,
            context = self.context.render(self.preview_rows),
            remaining = self.remaining_steps,
            step = self.step,
        );
        if let Some(feedback) = self.feedback {
            prompt.push_str(&format!("\n\nYour previous reply was rejected: {}", feedback));
        }
        prompt
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Raw reply for the next decision.
    async fn select(&self, request: &OracleRequest<'_>) -> Result<String>;

    /// Prose answer from the gathered results. `None` means no synthesis is offered.
    async fn synthesize(&self, _question: &str, _context: &ConversationContext) -> Result<Option<String>> {
        Ok(None)
    }
}
