use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    #[error("Unknown capability '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownCapability {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Unsafe query rejected: {0}")]
    UnsafeQueryRejected(String),

    #[error("Unknown table '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownTable {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Query exceeded the {}ms time limit", .0.as_millis())]
    QueryTimeout(Duration),

    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Oracle protocol error: {0}")]
    OracleProtocolError(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Step budget of {0} invocations exhausted")]
    StepBudgetExhausted(usize),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provisioning error: {0}")]
    Provision(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Stable discriminant of [`AgentError`], safe to hand to end users and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    CatalogUnavailable,
    DuplicateCapability,
    UnknownCapability,
    UnsafeQueryRejected,
    UnknownTable,
    QueryTimeout,
    InvalidParameter,
    OracleProtocolError,
    Cancelled,
    StepBudgetExhausted,
    QueryFailed,
    Config,
    Provision,
    Internal,
}

impl ErrorKind {
    /// Short explanation shown when a cycle fails. Never carries internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::CatalogUnavailable => "The dataset could not be reached.",
            ErrorKind::DuplicateCapability => "The assistant is misconfigured.",
            ErrorKind::UnknownCapability => {
                "The assistant kept requesting an operation that does not exist."
            }
            ErrorKind::UnsafeQueryRejected => {
                "The assistant attempted a query that is not allowed on this dataset."
            }
            ErrorKind::UnknownTable => "The assistant referred to a table that does not exist.",
            ErrorKind::QueryTimeout => "The query took too long to run.",
            ErrorKind::InvalidParameter => "The assistant supplied invalid arguments to an operation.",
            ErrorKind::OracleProtocolError => "The language model returned an unusable response.",
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::StepBudgetExhausted => {
                "The question could not be answered within the allowed number of steps."
            }
            ErrorKind::QueryFailed => "The generated query could not be executed.",
            ErrorKind::Config => "The assistant is misconfigured.",
            ErrorKind::Provision => "The dataset could not be prepared.",
            ErrorKind::Internal => "An internal error occurred.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            AgentError::DuplicateCapability(_) => ErrorKind::DuplicateCapability,
            AgentError::UnknownCapability { .. } => ErrorKind::UnknownCapability,
            AgentError::UnsafeQueryRejected(_) => ErrorKind::UnsafeQueryRejected,
            AgentError::UnknownTable { .. } => ErrorKind::UnknownTable,
            AgentError::QueryTimeout(_) => ErrorKind::QueryTimeout,
            AgentError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            AgentError::OracleProtocolError(_) => ErrorKind::OracleProtocolError,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::StepBudgetExhausted(_) => ErrorKind::StepBudgetExhausted,
            AgentError::QueryFailed(_) => ErrorKind::QueryFailed,
            AgentError::Config(_) => ErrorKind::Config,
            AgentError::Provision(_) => ErrorKind::Provision,
            AgentError::Io(_) | AgentError::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            // The engine replaces the zero duration with its configured limit.
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                AgentError::QueryTimeout(Duration::ZERO)
            }
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ReadOnly => {
                AgentError::UnsafeQueryRejected("the store is read-only".to_string())
            }
            rusqlite::Error::InvalidParameterName(name) => {
                AgentError::invalid_parameter(name.clone(), "not used by the query")
            }
            rusqlite::Error::InvalidParameterCount(given, expected) => AgentError::invalid_parameter(
                "parameters",
                format!("query expects {} values, got {}", expected, given),
            ),
            _ => AgentError::QueryFailed(e.to_string()),
        }
    }
}
