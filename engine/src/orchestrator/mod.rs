//! Orchestrator
//!
//! Runs one bounded routing loop per incoming query. A selection policy
//! inspects the transcript and picks exactly one capability agent to act;
//! the agent's output is appended to the transcript; control returns to
//! selection until an agent emits the TERMINATE sentinel or the step budget
//! runs out. Either way the caller gets exactly one answer: on budget
//! exhaustion the transcript tail stands in for a finished reply.
//!
//! Nothing on this path returns an error to the caller. Agent and tool
//! failures have already been absorbed into answer text by the agents.

pub mod policy;

pub use policy::{KeywordPolicy, ModelPolicy, SelectionPolicy};

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::agent::CapabilityAgent;

/// Sentinel token an agent emits to end the run
pub const TERMINATE_SENTINEL: &str = "TERMINATE";

/// Name recorded when no capability agent produced the answer
pub const ORCHESTRATOR_ACTOR: &str = "orchestrator";

/// One entry of a run's transcript
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// "user" for the incoming query, otherwise the acting agent's name
    pub actor: String,
    pub content: String,
}

/// Final result of one orchestration run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Answer text with the sentinel stripped
    pub answer: String,

    /// Name of the last-acting agent, for persistence as `agent_name`
    pub agent_name: String,

    /// Number of agent invocations the run consumed
    pub steps: u32,
}

/// Run states of the routing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    AwaitingSelection,
    AgentActive(usize),
    Terminated,
}

/// Routes each incoming query through the registered capability agents
pub struct Orchestrator {
    agents: Vec<CapabilityAgent>,
    policy: Box<dyn SelectionPolicy>,
    max_steps: u32,
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// Rejects an empty agent registry and a zero step budget up front so
    /// that `run` itself cannot fail.
    pub fn new(
        agents: Vec<CapabilityAgent>,
        policy: Box<dyn SelectionPolicy>,
        max_steps: u32,
    ) -> Result<Self> {
        if agents.is_empty() {
            bail!("At least one capability agent must be registered");
        }
        if max_steps == 0 {
            bail!("Step budget must be at least 1");
        }
        Ok(Self {
            agents,
            policy,
            max_steps,
        })
    }

    /// The registered agents, in registration order.
    pub fn agents(&self) -> &[CapabilityAgent] {
        &self.agents
    }

    /// Process one query to exactly one answer, in bounded steps.
    pub async fn run(&self, query: &str) -> RunOutcome {
        let mut transcript = vec![TranscriptEntry {
            actor: "user".to_string(),
            content: query.to_string(),
        }];
        let mut steps = 0u32;
        let mut state = RunState::AwaitingSelection;

        loop {
            match state {
                RunState::AwaitingSelection => {
                    if steps >= self.max_steps {
                        state = RunState::Terminated;
                        continue;
                    }
                    let idx = self.policy.select(&transcript, &self.agents).await;
                    let idx = idx.min(self.agents.len() - 1);
                    debug!("Selected agent {} for step {}", self.agents[idx].name(), steps + 1);
                    state = RunState::AgentActive(idx);
                }

                RunState::AgentActive(idx) => {
                    let agent = &self.agents[idx];
                    steps += 1;

                    let output = agent.respond(query, &transcript[1..]).await;
                    let terminated = output.contains(TERMINATE_SENTINEL);
                    transcript.push(TranscriptEntry {
                        actor: agent.name().to_string(),
                        content: output,
                    });

                    state = if terminated {
                        RunState::Terminated
                    } else {
                        RunState::AwaitingSelection
                    };
                }

                RunState::Terminated => break,
            }
        }

        let outcome = finalize(&transcript, steps);
        info!(
            "Run finished after {} step(s), answered by {}",
            outcome.steps, outcome.agent_name
        );
        outcome
    }
}

/// Build the outcome from the transcript tail.
///
/// The answer is the most recent agent output that still has content after
/// the sentinel is stripped; an answer is produced even when the budget ran
/// out mid-conversation.
fn finalize(transcript: &[TranscriptEntry], steps: u32) -> RunOutcome {
    for entry in transcript.iter().rev() {
        if entry.actor == "user" {
            continue;
        }
        let answer = strip_sentinel(&entry.content);
        if !answer.is_empty() {
            return RunOutcome {
                answer,
                agent_name: entry.actor.clone(),
                steps,
            };
        }
    }

    RunOutcome {
        answer: "I was unable to produce an answer for that request.".to_string(),
        agent_name: ORCHESTRATOR_ACTOR.to_string(),
        steps,
    }
}

fn strip_sentinel(content: &str) -> String {
    content.replace(TERMINATE_SENTINEL, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scripted_agent;

    #[test]
    fn test_empty_registry_is_rejected() {
        let result = Orchestrator::new(vec![], Box::new(KeywordPolicy), 15);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_step_budget_is_rejected() {
        let agents = vec![scripted_agent("Solo", "does things", &["ok TERMINATE"])];
        let result = Orchestrator::new(agents, Box::new(KeywordPolicy), 0);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sentinel_terminates_run() {
        let agents = vec![scripted_agent(
            "Solo",
            "handles everything",
            &["Here is the answer. TERMINATE"],
        )];
        let orchestrator = Orchestrator::new(agents, Box::new(KeywordPolicy), 15).unwrap();

        let outcome = orchestrator.run("do something").await;
        assert_eq!(outcome.answer, "Here is the answer.");
        assert_eq!(outcome.agent_name, "Solo");
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_transcript_tail() {
        // The agent never emits the sentinel; the run must stop at the
        // budget and still return the latest output.
        let replies: Vec<String> = (0..10).map(|i| format!("thinking {i}")).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let agents = vec![scripted_agent("Loop", "loops forever", &refs)];
        let orchestrator = Orchestrator::new(agents, Box::new(KeywordPolicy), 3).unwrap();

        let outcome = orchestrator.run("never stop").await;
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.answer, "thinking 2");
        assert_eq!(outcome.agent_name, "Loop");
    }

    #[tokio::test]
    async fn test_sentinel_only_reply_still_yields_answer() {
        let agents = vec![scripted_agent(
            "Terse",
            "says little",
            &["Some partial progress", "TERMINATE"],
        )];
        let orchestrator = Orchestrator::new(agents, Box::new(KeywordPolicy), 5).unwrap();

        let outcome = orchestrator.run("go").await;
        // The bare-sentinel reply is empty once stripped; the previous
        // output is the best available answer.
        assert_eq!(outcome.answer, "Some partial progress");
        assert!(!outcome.answer.is_empty());
    }

    #[tokio::test]
    async fn test_policy_receives_growing_transcript() {
        use std::sync::{Arc, Mutex};

        struct CountingPolicy {
            seen: Arc<Mutex<Vec<usize>>>,
        }

        #[async_trait::async_trait]
        impl SelectionPolicy for CountingPolicy {
            async fn select(
                &self,
                transcript: &[TranscriptEntry],
                _agents: &[CapabilityAgent],
            ) -> usize {
                self.seen.lock().unwrap().push(transcript.len());
                0
            }
        }

        let agents = vec![scripted_agent(
            "Worker",
            "works",
            &["step one", "step two TERMINATE"],
        )];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let policy = Box::new(CountingPolicy {
            seen: Arc::clone(&seen),
        });
        let orchestrator = Orchestrator::new(agents, policy, 5).unwrap();

        let outcome = orchestrator.run("go").await;
        assert_eq!(outcome.steps, 2);
        // Selection saw the seeded transcript, then the grown one.
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
