//! Deterministic oracle replaying canned replies. Used by tests and the offline demo.

use crate::context::ConversationContext;
use crate::error::{AgentError, Result};
use crate::oracle::{Oracle, OracleRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted oracle saw for one decision.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub question: String,
    pub step: usize,
    pub remaining_steps: usize,
    pub context_entries: usize,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    delay: Option<Duration>,
    synthesis: Option<String>,
    synthesis_delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Reply used whenever the queue is empty.
    pub fn repeating(mut self, reply: impl Into<String>) -> Self {
        self.repeat = Some(reply.into());
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_synthesis(mut self, text: impl Into<String>) -> Self {
        self.synthesis = Some(text.into());
        self
    }

    /// Sleep before answering a synthesis request.
    pub fn with_synthesis_delay(mut self, delay: Duration) -> Self {
        self.synthesis_delay = Some(delay);
        self
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply.into());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn select(&self, request: &OracleRequest<'_>) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                question: request.question.to_string(),
                step: request.step,
                remaining_steps: request.remaining_steps,
                context_entries: request.context.len(),
                prompt: request.render_prompt(),
            });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| AgentError::OracleProtocolError("script exhausted".to_string()))
    }

    async fn synthesize(&self, _question: &str, _context: &ConversationContext) -> Result<Option<String>> {
        if let Some(delay) = self.synthesis_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.synthesis.clone())
    }
}
