use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    Decision,
    Invocation,
    InvocationResult,
    Error,
    Retry,
    Finalize,
}

/// One entry of the diagnostic trace returned with every answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub ts_ms: i64,
    pub event_type: TraceEventType,
    #[serde(default)]
    pub payload: Value,
}

impl TraceEvent {
    pub fn now(event_type: TraceEventType, payload: Value) -> Self {
        Self {
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event_type,
            payload,
        }
    }
}
