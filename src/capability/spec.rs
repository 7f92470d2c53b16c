//! Capability contracts: what an operation is called, what it accepts and what it returns.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityFamily {
    Execution,
    Analytics,
    Reporting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value; the handler interprets it.
    Any,
}

impl ParameterType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Array => value.is_array(),
            ParameterType::Object => value.is_object(),
            ParameterType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn optional(name: &str, param_type: ParameterType, description: &str, default: Option<Value>) -> Self {
        Self {
            required: false,
            default,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn bounded(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    /// Type and range check for a supplied value. Integral floats are narrowed to integers.
    fn check(&self, value: &Value) -> Result<Value> {
        if !self.param_type.accepts(value) {
            return Err(AgentError::invalid_parameter(
                &self.name,
                format!("expected {:?}, got {}", self.param_type, json_type_name(value)),
            ));
        }
        let value = match (self.param_type, value.as_f64()) {
            (ParameterType::Integer, Some(f)) if !value.is_i64() => Value::from(f as i64),
            _ => value.clone(),
        };
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(AgentError::invalid_parameter(
                        &self.name,
                        format!("{} is below the minimum of {}", n, min),
                    ));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(AgentError::invalid_parameter(
                        &self.name,
                        format!("{} is above the maximum of {}", n, max),
                    ));
                }
            }
        }
        Ok(value)
    }
}

/// Declared output of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnShape {
    /// Columns depend on the query.
    Dynamic,
    Columns { columns: Vec<String> },
}

impl ReturnShape {
    pub fn columns(names: &[&str]) -> Self {
        ReturnShape::Columns {
            columns: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub family: CapabilityFamily,
    pub parameters: Vec<ParameterSpec>,
    pub returns: ReturnShape,
}

impl CapabilitySpec {
    pub fn new(name: &str, family: CapabilityFamily, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            family,
            parameters: Vec::new(),
            returns: ReturnShape::Dynamic,
        }
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    /// Validate supplied arguments and fill defaults. Unknown arguments, missing
    /// required ones, type mismatches and out-of-range numbers are all `InvalidParameter`.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>> {
        if let Some(extra) = arguments
            .keys()
            .find(|k| !self.parameters.iter().any(|p| &p.name == *k))
        {
            return Err(AgentError::invalid_parameter(
                extra.as_str(),
                format!("not accepted by '{}'", self.name),
            ));
        }

        let mut validated = Map::new();
        for param in &self.parameters {
            match arguments.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    validated.insert(param.name.clone(), param.check(value)?);
                }
                None if param.required => {
                    return Err(AgentError::invalid_parameter(&param.name, "required"));
                }
                None => {
                    if let Some(default) = &param.default {
                        validated.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }

    /// One-line signature for prompts, e.g. `top_products(limit: integer = 10, 1..1000)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let mut s = format!("{}: {}", p.name, format!("{:?}", p.param_type).to_lowercase());
                if !p.required {
                    s.push('?');
                }
                if let Some(d) = &p.default {
                    s.push_str(&format!(" = {}", d));
                }
                if let (Some(min), Some(max)) = (p.minimum, p.maximum) {
                    s.push_str(&format!(" [{}..{}]", min, max));
                }
                s
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// The oracle's request to run one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub capability: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(capability: &str, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            capability: capability.to_string(),
            arguments,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn top_products() -> CapabilitySpec {
        CapabilitySpec::new("top_products", CapabilityFamily::Analytics, "Best sellers by revenue").param(
            ParameterSpec::optional("limit", ParameterType::Integer, "rows", Some(json!(10))).bounded(1.0, 1000.0),
        )
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_is_filled() {
        let validated = top_products().validate_arguments(&Map::new()).unwrap();
        assert_eq!(validated["limit"], json!(10));
    }

    #[test]
    fn test_bounds_are_enforced() {
        let spec = top_products();
        assert!(spec.validate_arguments(&args(json!({"limit": 5}))).is_ok());
        for bad in [json!({"limit": 0}), json!({"limit": 1001})] {
            assert!(matches!(
                spec.validate_arguments(&args(bad)),
                Err(AgentError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_type_and_unknown_arguments_rejected() {
        let spec = top_products();
        assert!(spec.validate_arguments(&args(json!({"limit": "five"}))).is_err());
        assert!(spec.validate_arguments(&args(json!({"limit": 2.5}))).is_err());
        assert!(spec.validate_arguments(&args(json!({"top": 5}))).is_err());
        assert_eq!(
            spec.validate_arguments(&args(json!({"limit": 7.0}))).unwrap()["limit"],
            json!(7)
        );
    }

    #[test]
    fn test_missing_required() {
        let spec = CapabilitySpec::new("describe_table", CapabilityFamily::Execution, "")
            .param(ParameterSpec::required("table", ParameterType::String, "table name"));
        let err = spec.validate_arguments(&Map::new()).unwrap_err();
        assert!(err.to_string().contains("table"));
    }

    #[test]
    fn test_signature() {
        assert_eq!(top_products().signature(), "top_products(limit: integer? = 10 [1..1000])");
    }
}
