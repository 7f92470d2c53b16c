//! Agent configuration
//!
//! Everything tunable lives in explicit structs passed to constructors.
//! `AgentConfig::from_env` is the only place that reads the process environment.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub execution: ExecutionConfig,
    pub reporting: ReportingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("northwind.db"),
            log_level: "info".to_string(),
            llm: LlmConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            execution: ExecutionConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

/// How the final answer text is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Deterministic rendering by the report formatter.
    Formatter,
    /// Ask the oracle for prose; falls back to the formatter on any failure.
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    Table,
    Prose,
    Csv,
}

impl FromStr for ReportStyle {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(ReportStyle::Table),
            "prose" | "text" => Ok(ReportStyle::Prose),
            "csv" => Ok(ReportStyle::Csv),
            other => Err(AgentError::invalid_parameter(
                "style",
                format!("unknown report style '{}' (expected table, prose or csv)", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum capability invocations per question.
    pub step_budget: usize,
    /// Failed invocations tolerated per distinct capability name before the cycle fails.
    pub max_retries_per_capability: u32,
    /// Malformed oracle replies tolerated before the cycle fails.
    pub oracle_protocol_retries: u32,
    pub oracle_timeout: Duration,
    pub invocation_timeout: Duration,
    /// Wall-clock budget for one question; on expiry the cycle finalizes with what it has.
    pub cycle_budget: Duration,
    pub synthesis: SynthesisMode,
    pub report_style: ReportStyle,
    /// Rows per result included in the oracle prompt.
    pub prompt_preview_rows: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_budget: 6,
            max_retries_per_capability: 2,
            oracle_protocol_retries: 1,
            oracle_timeout: Duration::from_secs(20),
            invocation_timeout: Duration::from_secs(15),
            cycle_budget: Duration::from_secs(45),
            synthesis: SynthesisMode::Formatter,
            report_style: ReportStyle::Prose,
            prompt_preview_rows: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub query_timeout: Duration,
    pub max_rows: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            max_rows: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Column-name suffixes treated as currency (rounded to two decimals).
    pub currency_suffixes: Vec<String>,
    /// Column-name suffixes holding percentages; an empty cell renders as `n/a`.
    #[serde(default = "default_percent_suffixes")]
    pub percent_suffixes: Vec<String>,
    /// Rows rendered per result before eliding.
    pub preview_rows: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            currency_suffixes: [
                "price", "revenue", "total", "amount", "cost", "spent", "sales", "value",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            percent_suffixes: default_percent_suffixes(),
            preview_rows: 10,
        }
    }
}

fn default_percent_suffixes() -> Vec<String> {
    vec!["share".to_string(), "pct".to_string(), "percent".to_string()]
}

impl AgentConfig {
    /// Load from `.env` and the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        config.llm.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("MODEL_NAME") {
            config.llm.model = model;
        }
        config.llm.max_tokens = env_parse("MAX_TOKENS", config.llm.max_tokens)?;
        config.llm.temperature = env_parse("TEMPERATURE", config.llm.temperature)?;

        let o = &mut config.orchestrator;
        o.step_budget = env_parse("AGENT_STEP_BUDGET", o.step_budget)?;
        o.max_retries_per_capability =
            env_parse("AGENT_MAX_RETRIES", o.max_retries_per_capability)?;
        o.cycle_budget = Duration::from_secs(env_parse(
            "AGENT_CYCLE_BUDGET_SECS",
            o.cycle_budget.as_secs(),
        )?);
        if std::env::var("AGENT_ORACLE_SYNTHESIS").map(|v| v == "1" || v == "true").unwrap_or(false) {
            o.synthesis = SynthesisMode::Oracle;
        }

        config.execution.query_timeout = Duration::from_secs(env_parse(
            "AGENT_QUERY_TIMEOUT_SECS",
            config.execution.query_timeout.as_secs(),
        )?);

        Ok(config)
    }

    /// Checks knobs common to every run.
    pub fn validate(&self) -> Result<()> {
        let o = &self.orchestrator;
        if o.step_budget == 0 {
            return Err(AgentError::Config("step_budget must be at least 1".to_string()));
        }
        if o.cycle_budget.is_zero() || o.oracle_timeout.is_zero() || o.invocation_timeout.is_zero() {
            return Err(AgentError::Config("timeouts must be non-zero".to_string()));
        }
        if self.execution.query_timeout.is_zero() {
            return Err(AgentError::Config("query_timeout must be non-zero".to_string()));
        }
        if self.execution.max_rows == 0 {
            return Err(AgentError::Config("max_rows must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgentError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    /// Additional checks for runs that call the hosted language model.
    pub fn validate_for_llm(&self) -> Result<()> {
        self.validate()?;
        if self.llm.api_key.trim().is_empty() {
            return Err(AgentError::Config("OPENAI_API_KEY is required".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AgentError::Config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
