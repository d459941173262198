//! Shared fakes for unit tests.
//!
//! Scripted stand-ins for the chat model and tool adapters so routing and
//! agent behavior can be exercised without any network dependency.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::agent::CapabilityAgent;
use crate::llm::{ChatModel, CompletionError, Message};
use crate::tools::{Tool, ToolError};

/// Model fake that replays a fixed list of replies, then errors.
pub(crate) struct ScriptedModel {
    replies: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            calls: Mutex::new(0),
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _messages: &[Message]) -> crate::llm::Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| CompletionError::InvalidRequest("script exhausted".to_string()))
    }
}

/// Model fake that always times out.
pub(crate) struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _messages: &[Message]) -> crate::llm::Result<String> {
        Err(CompletionError::Timeout)
    }
}

/// Tool fake that echoes its `text` argument.
pub(crate) struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        Ok(format!("echo: {}", args["text"].as_str().unwrap_or("")))
    }
}

/// Tool fake that always fails with a network error.
pub(crate) struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        Err(ToolError::Network("connection refused".to_string()))
    }
}

/// A tool-less agent whose model replays the given replies.
pub(crate) fn scripted_agent(
    name: &str,
    description: &str,
    replies: &[&str],
) -> CapabilityAgent {
    CapabilityAgent::new(
        name,
        description,
        format!("You are {name}."),
        vec![],
        false,
        ScriptedModel::new(replies),
    )
}

/// The two-agent roster the routing tests select against.
pub(crate) fn weather_and_search_agents() -> Vec<CapabilityAgent> {
    vec![
        scripted_agent(
            "WeatherAssistant",
            "An AI assistant that provides weather information. Answers questions about \
             current weather, forecasts, and precipitation.",
            &[],
        ),
        scripted_agent(
            "SearchAssistant",
            "An AI assistant that performs web searches and research. Use me for finding \
             current information, news, facts, or detailed research.",
            &[],
        ),
    ]
}
