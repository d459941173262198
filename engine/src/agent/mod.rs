//! Capability agents
//!
//! A capability agent binds a set of tool adapters to a role description and
//! a response policy. `respond` drives a bounded think-act loop against the
//! chat model: a reply that parses as a tool call dispatches the named
//! adapter and feeds the output back; any other reply is the draft answer.
//! With `reflect` enabled the draft gets exactly one review pass after tool
//! use, never an open-ended self-correction loop.
//!
//! Agents always return text. Model failures and tool failures degrade into
//! explanatory content; no error crosses this boundary.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{ChatModel, Message};
use crate::orchestrator::TranscriptEntry;
use crate::tools::{self, Tool};

/// Maximum tool dispatches inside one respond() call
const MAX_TOOL_ROUNDS: usize = 4;

/// A bounded-role handler that may invoke tool adapters to answer a task
pub struct CapabilityAgent {
    name: String,
    description: String,
    system_message: String,
    tools: Vec<Arc<dyn Tool>>,
    reflect: bool,
    model: Arc<dyn ChatModel>,
}

impl CapabilityAgent {
    /// Create a new capability agent.
    ///
    /// `description` is what the routing policy matches against; the
    /// `system_message` is what the model sees. `reflect` enables the single
    /// self-review pass after tool use.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_message: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
        reflect: bool,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_message: system_message.into(),
            tools,
            reflect,
            model,
        }
    }

    /// Agent name, persisted as `agent_name` on assistant turns.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capability description used by the routing policy.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Answer a task given the prior turns of the current run.
    ///
    /// Always returns text: a real answer, a degraded one built from raw
    /// tool output, or an apology.
    pub async fn respond(&self, task: &str, transcript: &[TranscriptEntry]) -> String {
        let mut messages = self.build_messages(task, transcript);
        let mut last_tool_output: Option<String> = None;
        let mut used_tool = false;

        for round in 0..=MAX_TOOL_ROUNDS {
            let reply = match self.model.complete(&messages).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Agent {} model call failed: {}", self.name, e);
                    return self.apology();
                }
            };

            let Some((tool_name, args)) = parse_tool_call(&reply) else {
                let draft = reply;
                if self.reflect && used_tool {
                    return self.review_draft(draft, messages).await;
                }
                return draft;
            };

            if round == MAX_TOOL_ROUNDS {
                break;
            }

            debug!("Agent {} calling tool {}", self.name, tool_name);
            let output = self.dispatch(&tool_name, args).await;
            messages.push(Message::assistant(reply));
            messages.push(Message::user(format!(
                "Tool output from {tool_name}:\n{output}"
            )));
            last_tool_output = Some(output);
            used_tool = true;
        }

        // Tool budget exhausted without a final answer. Raw tool output is
        // still better than nothing.
        warn!("Agent {} exhausted its tool budget", self.name);
        last_tool_output.unwrap_or_else(|| self.apology())
    }

    fn build_messages(&self, task: &str, transcript: &[TranscriptEntry]) -> Vec<Message> {
        let mut system = self.system_message.clone();
        if !self.tools.is_empty() {
            system.push_str("\n\n");
            system.push_str(&tools::manifest(&self.tools));
        }
        system.push_str(
            "\n\nWhen the user's request is fully answered, end your reply with the word TERMINATE.",
        );

        let mut messages = vec![Message::system(system)];
        for entry in transcript {
            messages.push(Message::assistant(format!(
                "[{}] {}",
                entry.actor, entry.content
            )));
        }
        messages.push(Message::user(task));
        messages
    }

    /// Dispatch a tool call by name. Failures come back as output text so
    /// the model can see the error and recover.
    async fn dispatch(&self, name: &str, args: Value) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            let available: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
            warn!("Agent {} requested unknown tool {}", self.name, name);
            return format!(
                "ERROR: Unknown tool '{}'. Available tools: {}",
                name,
                available.join(", ")
            );
        };

        match tool.invoke(args).await {
            Ok(output) => output,
            Err(e) => format!("ERROR: {e}"),
        }
    }

    /// The single reflection pass: show the model its own draft and accept
    /// at most one revision.
    async fn review_draft(&self, draft: String, mut messages: Vec<Message>) -> String {
        messages.push(Message::assistant(draft.clone()));
        messages.push(Message::user(
            "Review your draft above against the tool output. If it is accurate, repeat it; \
             otherwise reply with the corrected answer. Reply with the answer only."
                .to_string(),
        ));

        match self.model.complete(&messages).await {
            Ok(revised) if !revised.trim().is_empty() => revised,
            Ok(_) => draft,
            Err(e) => {
                warn!("Agent {} reflection pass failed: {}", self.name, e);
                draft
            }
        }
    }

    fn apology(&self) -> String {
        format!(
            "I apologize, but I could not complete that request right now: the {} data \
             sources are unavailable. Please try again later.",
            self.name
        )
    }
}

/// Parse a model reply as a `{"tool": ..., "arguments": {...}}` call.
///
/// Handles the raw object form and a markdown-fenced variant, which some
/// models emit despite instructions.
pub(crate) fn parse_tool_call(content: &str) -> Option<(String, Value)> {
    let trimmed = content.trim();

    if let Some(call) = try_parse_call(trimmed) {
        return Some(call);
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        if let Some(call) = try_parse_call(inner.trim()) {
            return Some(call);
        }
    }

    None
}

fn try_parse_call(s: &str) -> Option<(String, Value)> {
    let json: Value = serde_json::from_str(s).ok()?;
    let tool = json.get("tool")?.as_str()?.to_string();
    let arguments = json.get("arguments").cloned().unwrap_or(Value::Null);
    Some((tool, arguments))
}

/// Extract the body of the first markdown code fence in the text.
fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}
