//! Strict decode of an oracle reply into a decision.
//!
//! Accepted replies are exactly one JSON object, optionally inside a single
//! ```json fence:
//!
//! - `{"action":"invoke","capability":"<name>","arguments":{...}}`
//! - `{"action":"finalize","answer":"<text>"}`
//!
//! Anything else is `Malformed`. There is no best-effort recovery.

use crate::capability::InvocationRequest;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeSignal {
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleDecision {
    Invoke(InvocationRequest),
    Finalize(FinalizeSignal),
    Malformed(String),
}

pub fn decode_decision(raw: &str) -> OracleDecision {
    match try_decode(raw) {
        Ok(decision) => decision,
        Err(reason) => OracleDecision::Malformed(reason),
    }
}

fn try_decode(raw: &str) -> Result<OracleDecision, String> {
    let body = strip_fence(raw.trim())?;
    let value: Value = serde_json::from_str(body).map_err(|e| format!("not a single JSON object: {}", e))?;
    let Value::Object(mut object) = value else {
        return Err("reply is not a JSON object".to_string());
    };

    let action = match object.remove("action") {
        Some(Value::String(action)) => action,
        Some(_) => return Err("'action' must be a string".to_string()),
        None => return Err("missing 'action'".to_string()),
    };

    match action.as_str() {
        "invoke" => {
            let capability = match object.remove("capability") {
                Some(Value::String(name)) if !name.trim().is_empty() => name,
                Some(_) => return Err("'capability' must be a non-empty string".to_string()),
                None => return Err("missing 'capability'".to_string()),
            };
            let arguments = match object.remove("arguments") {
                None => Map::new(),
                Some(Value::Object(arguments)) => arguments,
                Some(_) => return Err("'arguments' must be an object".to_string()),
            };
            reject_extra(&object)?;
            Ok(OracleDecision::Invoke(InvocationRequest {
                capability,
                arguments,
            }))
        }
        "finalize" => {
            let answer = match object.remove("answer") {
                None | Some(Value::Null) => None,
                Some(Value::String(text)) => Some(text).filter(|t| !t.trim().is_empty()),
                Some(_) => return Err("'answer' must be a string".to_string()),
            };
            reject_extra(&object)?;
            Ok(OracleDecision::Finalize(FinalizeSignal { answer }))
        }
        other => Err(format!("unknown action '{}'", other)),
    }
}

fn reject_extra(object: &Map<String, Value>) -> Result<(), String> {
    match object.keys().next() {
        Some(key) => Err(format!("unexpected field '{}'", key)),
        None => Ok(()),
    }
}

/// Remove one enclosing ```/```json fence. Nested or partial fences are rejected.
fn strip_fence(text: &str) -> Result<&str, String> {
    let Some(rest) = text.strip_prefix("```") else {
        return Ok(text);
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let Some(inner) = rest.strip_suffix("```") else {
        return Err("unterminated code fence".to_string());
    };
    if inner.contains("```") {
        return Err("more than one code fence".to_string());
    }
    if !inner.starts_with('\n') && !inner.starts_with("\r\n") {
        return Err("code fence must be followed by a newline".to_string());
    }
    Ok(inner.trim())
}
