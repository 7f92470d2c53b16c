use crate::config::LlmConfig;
use crate::context::ConversationContext;
use crate::error::{AgentError, Result};
use crate::oracle::{Oracle, OracleRequest};
use async_trait::async_trait;
use tracing::{debug, warn};

const DECISION_SYSTEM_PROMPT: &str = "Return JSON only, no text.";
const SYNTHESIS_SYSTEM_PROMPT: &str =
    "You summarise query results for a business user. Use only numbers present in the results. Plain prose, no JSON.";

/// Oracle backed by an OpenAI-compatible chat-completions endpoint.
pub struct LlmOracle {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmOracle {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::Config("OPENAI_API_KEY is required".to_string()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn call_llm(&self, system: &str, prompt: &str, temperature: f32) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature,
        });

        // Reasoning models only accept max_completion_tokens
        if self.config.model.starts_with("gpt-5") || self.config.model.starts_with("o1") {
            body["max_completion_tokens"] = serde_json::json!(self.config.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(self.config.max_tokens);
        }

        debug!("Calling {} ({} prompt chars)", self.config.model, prompt.len());
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::OracleProtocolError(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::OracleProtocolError(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::OracleProtocolError(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(AgentError::OracleProtocolError(format!("LLM API error: {}", error)));
        }

        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| AgentError::OracleProtocolError("No choices in LLM response".to_string()))?;

        match choice.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!("LLM response was truncated due to length limit"),
            Some("content_filter") => {
                return Err(AgentError::OracleProtocolError(
                    "LLM response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        let content = choice["message"]["content"].as_str().unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AgentError::OracleProtocolError("Empty content in LLM response".to_string()));
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn select(&self, request: &OracleRequest<'_>) -> Result<String> {
        // Decisions should be repeatable; the configured temperature applies to prose only.
        self.call_llm(DECISION_SYSTEM_PROMPT, &request.render_prompt(), 0.1)
            .await
    }

    async fn synthesize(&self, question: &str, context: &ConversationContext) -> Result<Option<String>> {
        let prompt = format!(
            "Question: \"{}\"\n\nResults:\n{}\n\nAnswer the question in two or three sentences.",
            question,
            context.render(50)
        );
        let text = self
            .call_llm(SYNTHESIS_SYSTEM_PROMPT, &prompt, self.config.temperature)
            .await?;
        Ok(Some(text.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            LlmOracle::new(LlmConfig::default()),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_builds_with_key() {
        let config = LlmConfig {
            api_key: "sk-test".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(LlmOracle::new(config).unwrap().model(), "gpt-4");
    }
}
