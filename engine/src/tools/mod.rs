//! Tool adapters
//!
//! Each adapter wraps one external data-fetching call as a typed callable:
//! a name, a description, a JSON Schema for its arguments, and `invoke`.
//! Arguments are validated against the schema before any network call is
//! made. Adapters never retry and never panic across their boundary; every
//! failure comes back as a ToolError with a human-readable cause so the
//! calling agent can decide what to do with it.

pub mod search;
pub mod weather;

pub use search::{ResearchTool, SearchApi, WebSearchTool};
pub use weather::{CurrentWeatherTool, ForecastTool, WeatherApi};

use async_trait::async_trait;
use serde_json::Value;

/// Errors surfaced by tool adapters
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One external capability exposed to an agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls)
    fn name(&self) -> &str;

    /// Human-readable description, shown in the agent's tool manifest
    fn description(&self) -> &str;

    /// JSON Schema object for the arguments (`properties` + `required`)
    fn schema(&self) -> Value;

    /// Validate arguments against the schema, make the one outbound call,
    /// and return the formatted output text.
    async fn invoke(&self, args: Value) -> Result<String, ToolError>;
}

/// Validate an argument object against a declared schema.
///
/// Checks that `args` is an object, that every `required` key is present,
/// and that each supplied property matches its declared primitive type.
/// Unknown properties are ignored.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let Some(args_map) = args.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".to_string(),
        ));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args_map.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, spec) in properties {
            let Some(value) = args_map.get(key) else {
                continue;
            };
            let Some(expected) = spec.get("type").and_then(Value::as_str) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{key}' must be of type {expected}"
                )));
            }
        }
    }

    Ok(())
}

/// Render the tool section of an agent's system prompt.
///
/// Lists each tool with its description and argument schema, plus the
/// single-JSON-object call convention the agent loop parses.
pub fn manifest(tools: &[std::sync::Arc<dyn Tool>]) -> String {
    let mut parts = vec![
        "To call a tool, your ENTIRE response must be ONLY this JSON object, with no \
         explanation, no markdown fences, and no text before or after:"
            .to_string(),
        r#"{"tool": "tool_name", "arguments": {"arg1": "value1"}}"#.to_string(),
        String::new(),
        "When you have the final answer, respond with plain text only, without JSON."
            .to_string(),
        String::new(),
        "Available tools:".to_string(),
    ];

    for tool in tools {
        parts.push(String::new());
        parts.push(format!("## {}", tool.name()));
        parts.push(tool.description().to_string());
        parts.push(format!("Arguments schema: {}", tool.schema()));
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string"},
                "days": {"type": "integer"}
            },
            "required": ["location"]
        })
    }

    #[test]
    fn test_validate_args_accepts_valid_input() {
        let schema = location_schema();
        assert!(validate_args(&schema, &json!({"location": "Tokyo"})).is_ok());
        assert!(validate_args(&schema, &json!({"location": "Tokyo", "days": 2})).is_ok());
    }

    #[test]
    fn test_validate_args_rejects_missing_required() {
        let schema = location_schema();
        let err = validate_args(&schema, &json!({"days": 2})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_validate_args_rejects_wrong_type() {
        let schema = location_schema();
        let err = validate_args(&schema, &json!({"location": 42})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = validate_args(&schema, &json!({"location": "Tokyo", "days": "two"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_validate_args_rejects_non_object() {
        let schema = location_schema();
        let err = validate_args(&schema, &json!("Tokyo")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
