//! Agent selection policies
//!
//! The orchestrator delegates "who acts next" to a SelectionPolicy. The
//! keyword policy is the deterministic reference implementation: it scores
//! each agent's declared capability text against the task and falls back to
//! the first-registered agent when nothing matches. The model-backed policy
//! asks the chat model to pick by name and falls back the same way when the
//! model fails or answers with an unknown name, so routing never errors.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::TranscriptEntry;
use crate::agent::CapabilityAgent;
use crate::llm::{ChatModel, Message};

/// Picks which registered agent acts next
#[async_trait]
pub trait SelectionPolicy: Send + Sync {
    /// Return the index of the agent to act next.
    ///
    /// Must always return a valid index for a non-empty agent list;
    /// ambiguity resolves to a deterministic fallback, never an error.
    async fn select(&self, transcript: &[TranscriptEntry], agents: &[CapabilityAgent]) -> usize;
}

/// Deterministic keyword-matching policy.
///
/// Scores each agent by how many distinct capability words from its name and
/// description appear in the latest user task. Highest score wins; ties keep
/// the earlier registration; a zero-score board falls back to index 0.
pub struct KeywordPolicy;

/// Words too generic to signal a capability
const STOPWORDS: &[&str] = &[
    "assistant", "answers", "questions", "provides", "performs", "about", "information",
    "detailed", "comprehensive", "queries", "like", "tomorrow",
];

#[async_trait]
impl SelectionPolicy for KeywordPolicy {
    async fn select(&self, transcript: &[TranscriptEntry], agents: &[CapabilityAgent]) -> usize {
        let task = latest_user_task(transcript).to_lowercase();

        let mut best = 0;
        let mut best_score = 0;
        for (i, agent) in agents.iter().enumerate() {
            let score = keyword_score(&task, agent);
            debug!("Agent {} scored {} for task", agent.name(), score);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }

        best
    }
}

fn keyword_score(task: &str, agent: &CapabilityAgent) -> usize {
    let capability_text = format!("{} {}", agent.name(), agent.description()).to_lowercase();

    let words: HashSet<&str> = capability_text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .filter(|w| !STOPWORDS.contains(w))
        .collect();

    words.into_iter().filter(|w| task.contains(w)).count()
}

fn latest_user_task(transcript: &[TranscriptEntry]) -> &str {
    transcript
        .iter()
        .rev()
        .find(|e| e.actor == "user")
        .map(|e| e.content.as_str())
        .unwrap_or_default()
}

/// Model-backed policy: the chat model picks an agent by name.
pub struct ModelPolicy {
    model: Arc<dyn ChatModel>,
}

impl ModelPolicy {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SelectionPolicy for ModelPolicy {
    async fn select(&self, transcript: &[TranscriptEntry], agents: &[CapabilityAgent]) -> usize {
        let task = latest_user_task(transcript);

        let roster: Vec<String> = agents
            .iter()
            .map(|a| format!("- {}: {}", a.name(), a.description()))
            .collect();

        let prompt = format!(
            "Pick the single best handler for this task.\n\nHandlers:\n{}\n\nTask: {}\n\n\
             Reply with exactly one handler name and nothing else.",
            roster.join("\n"),
            task
        );

        let reply = match self.model.complete(&[Message::user(prompt)]).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Routing model failed, falling back to first agent: {}", e);
                return 0;
            }
        };

        let normalized = reply.trim().to_lowercase();
        for (i, agent) in agents.iter().enumerate() {
            if normalized.contains(&agent.name().to_lowercase()) {
                return i;
            }
        }

        warn!("Routing model answered with unknown handler: {}", reply);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{weather_and_search_agents, FailingModel, ScriptedModel};

    fn seed(query: &str) -> Vec<TranscriptEntry> {
        vec![TranscriptEntry {
            actor: "user".to_string(),
            content: query.to_string(),
        }]
    }

    #[tokio::test]
    async fn test_keyword_policy_routes_weather_query() {
        let agents = weather_and_search_agents();
        let idx = KeywordPolicy
            .select(&seed("What's the weather in Tokyo?"), &agents)
            .await;
        assert_eq!(agents[idx].name(), "WeatherAssistant");
    }

    #[tokio::test]
    async fn test_keyword_policy_routes_search_query() {
        let agents = weather_and_search_agents();
        let idx = KeywordPolicy
            .select(&seed("Search the web for the latest rust news"), &agents)
            .await;
        assert_eq!(agents[idx].name(), "SearchAssistant");
    }

    #[tokio::test]
    async fn test_keyword_policy_falls_back_to_first_registered() {
        let agents = weather_and_search_agents();
        let idx = KeywordPolicy.select(&seed("Tell me a joke"), &agents).await;
        assert_eq!(idx, 0);
    }

    #[tokio::test]
    async fn test_model_policy_picks_named_agent() {
        let agents = weather_and_search_agents();
        let policy = ModelPolicy::new(ScriptedModel::new(&["SearchAssistant"]));

        let idx = policy.select(&seed("anything"), &agents).await;
        assert_eq!(agents[idx].name(), "SearchAssistant");
    }

    #[tokio::test]
    async fn test_model_policy_falls_back_on_unknown_name() {
        let agents = weather_and_search_agents();
        let policy = ModelPolicy::new(ScriptedModel::new(&["CalendarAssistant"]));

        let idx = policy.select(&seed("anything"), &agents).await;
        assert_eq!(idx, 0);
    }

    #[tokio::test]
    async fn test_model_policy_falls_back_on_model_failure() {
        let agents = weather_and_search_agents();
        let policy = ModelPolicy::new(std::sync::Arc::new(FailingModel));

        let idx = policy.select(&seed("anything"), &agents).await;
        assert_eq!(idx, 0);
    }
}
