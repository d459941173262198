//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: interactive conversation loop
//! - ask: answer one question and exit
//! - history / sessions / stats: conversation store reads
//! - cleanup: retention purge
//!
//! This layer owns the call shape into the core: it records the user turn,
//! awaits the orchestrator run, and records the assistant turn with the
//! answering agent's name. Storage failures are the only faults that
//! propagate out of here; everything on the orchestration path has already
//! been degraded into answer text by the agents.

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::CapabilityAgent;
use crate::config::{Config, OPENAI_API_KEY_ENV, TAVILY_API_KEY_ENV};
use crate::db::{ConversationRepository, Database, MessageRole};
use crate::llm::openai::OpenAiModel;
use crate::llm::ChatModel;
use crate::orchestrator::{KeywordPolicy, ModelPolicy, Orchestrator, RunOutcome, SelectionPolicy};
use crate::session::SessionContext;
use crate::tools::{
    CurrentWeatherTool, ForecastTool, ResearchTool, SearchApi, Tool, WeatherApi, WebSearchTool,
};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the agent roster and orchestrator from config and environment.
///
/// The weather agent is always available (Open-Meteo needs no key); the
/// search agent joins only when a Tavily key is present. The model provider
/// key is required.
fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let api_key = std::env::var(OPENAI_API_KEY_ENV).with_context(|| {
        format!("{OPENAI_API_KEY_ENV} is not set; the assistant needs a model provider key")
    })?;
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiModel::new(&config.model, api_key));

    let mut agents = Vec::new();

    let weather_api = WeatherApi::new(&config.weather);
    let weather_tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(CurrentWeatherTool::new(weather_api.clone())),
        Arc::new(ForecastTool::new(weather_api)),
    ];
    agents.push(CapabilityAgent::new(
        "WeatherAssistant",
        "An AI assistant that provides weather information. Answers questions about \
         current weather, forecasts, and precipitation.",
        "You are a weather information assistant.\n\
         Use the available tools to provide accurate weather data and forecasts.\n\
         Always include temperature, conditions, and relevant precipitation info.\n\
         Be concise and user-friendly in your responses.",
        weather_tools,
        true,
        Arc::clone(&model),
    ));

    match std::env::var(TAVILY_API_KEY_ENV) {
        Ok(tavily_key) => {
            let search_api = SearchApi::new(&config.search, tavily_key);
            let search_tools: Vec<Arc<dyn Tool>> = vec![
                Arc::new(WebSearchTool::new(search_api.clone())),
                Arc::new(ResearchTool::new(search_api)),
            ];
            agents.push(CapabilityAgent::new(
                "SearchAssistant",
                "An AI assistant that performs web searches and research. Use me for \
                 finding current information, news, facts, or detailed research.",
                "You are a web search and research assistant.\n\
                 Use web_search for quick queries and research for in-depth information.\n\
                 Always cite sources and provide comprehensive, accurate information.\n\
                 Be thorough but concise in your responses.",
                search_tools,
                true,
                Arc::clone(&model),
            ));
        }
        Err(_) => {
            tracing::warn!("{} not set, search agent disabled", TAVILY_API_KEY_ENV);
        }
    }

    let policy: Box<dyn SelectionPolicy> = match config.orchestrator.routing.as_str() {
        "model" => Box::new(ModelPolicy::new(Arc::clone(&model))),
        _ => Box::new(KeywordPolicy),
    };

    Orchestrator::new(agents, policy, config.orchestrator.max_steps)
}

/// One full turn: record the user message, run the orchestrator, record the
/// assistant message. `context` (history from a resumed session) is folded
/// into the prompt but never stored as part of the user's turn.
async fn process_query(
    orchestrator: &Orchestrator,
    repo: &ConversationRepository,
    session: &SessionContext,
    user_input: &str,
    context: Option<&str>,
) -> Result<RunOutcome> {
    repo.save(session.id(), MessageRole::User, user_input, None)
        .await?;

    let query = match context.filter(|c| !c.is_empty()) {
        Some(context) => format!("{context}\n\nCurrent request: {user_input}"),
        None => user_input.to_string(),
    };

    let outcome = orchestrator.run(&query).await;

    repo.save(
        session.id(),
        MessageRole::Assistant,
        &outcome.answer,
        Some(&outcome.agent_name),
    )
    .await?;

    Ok(outcome)
}

/// Answer a single question and exit.
pub async fn handle_ask(query: String, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();
    let session = SessionContext::new();

    let outcome = process_query(&orchestrator, &repo, &session, &query, None).await?;

    match format {
        OutputFormat::Text => {
            println!("{}", outcome.answer);
            println!();
            println!("  Agent:   {}", outcome.agent_name);
            println!("  Session: {}", session.id());
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": session.id(),
                "answer": outcome.answer,
                "agent": outcome.agent_name,
                "steps": outcome.steps,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Run the interactive chat loop.
pub async fn handle_chat(
    config: &Config,
    format: OutputFormat,
    resume: Option<String>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();
    let session = SessionContext::new();

    // History from an earlier session is folded into the first prompt only.
    let mut carried_context = match &resume {
        Some(previous) => {
            let context = repo
                .context_for_model(previous, config.orchestrator.context_messages)
                .await?;
            if context.is_empty() {
                println!("No history found for session {previous}.");
            } else {
                println!("Resuming with context from session {previous}.");
            }
            context
        }
        None => String::new(),
    };

    print_welcome(&orchestrator, session.id());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("you> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !run_slash_command(command, &orchestrator, &repo, &session).await? {
                break;
            }
            continue;
        }

        let context = if carried_context.is_empty() {
            None
        } else {
            Some(carried_context.as_str())
        };
        let outcome = process_query(&orchestrator, &repo, &session, input, context).await?;
        carried_context.clear();

        match format {
            OutputFormat::Text => {
                println!();
                println!("{}", outcome.answer);
                println!("  [{}]", outcome.agent_name);
                println!();
            }
            OutputFormat::Json => {
                let output = json!({
                    "answer": outcome.answer,
                    "agent": outcome.agent_name,
                    "steps": outcome.steps,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
    }

    println!("Goodbye!");
    database.close().await
}

/// Handle a slash command; returns false when the loop should exit.
async fn run_slash_command(
    command: &str,
    orchestrator: &Orchestrator,
    repo: &ConversationRepository,
    session: &SessionContext,
) -> Result<bool> {
    match command.trim().to_lowercase().as_str() {
        "quit" | "exit" => return Ok(false),

        "help" => {
            println!("Commands:");
            println!("  /help    Show this help message");
            println!("  /agents  List available agents");
            println!("  /history Show this session's conversation");
            println!("  /quit    Exit the assistant");
        }

        "agents" => {
            println!("Available agents:");
            for agent in orchestrator.agents() {
                println!("  {}", agent.name());
                println!("      {}", agent.description());
            }
        }

        "history" => {
            let messages = repo.history(session.id(), None).await?;
            if messages.is_empty() {
                println!("Nothing in this session yet.");
            } else {
                print_messages(&messages);
            }
        }

        other => {
            println!("Unknown command: /{other}");
            println!("Type /help for available commands.");
        }
    }

    Ok(true)
}

/// Show conversation history for a session.
pub async fn handle_history(
    session: Option<String>,
    limit: u32,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();

    let session_id = match session {
        Some(id) => id,
        None => {
            // Default to the most recently active session.
            match repo.recent_sessions(365, 1).await?.into_iter().next() {
                Some(summary) => summary.session_id,
                None => {
                    println!("No conversations recorded yet.");
                    return database.close().await;
                }
            }
        }
    };

    let messages = repo.history(&session_id, Some(limit)).await?;

    match format {
        OutputFormat::Text => {
            println!("Session {} ({} messages):", session_id, messages.len());
            print_messages(&messages);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
    }

    database.close().await
}

/// List sessions active inside the lookback window.
pub async fn handle_sessions(
    days: u32,
    limit: u32,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();

    let sessions = repo.recent_sessions(days, limit).await?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No sessions in the last {days} day(s).");
            } else {
                println!("Sessions active in the last {days} day(s):");
                for summary in &sessions {
                    println!(
                        "  {}  last active {}  ({} messages)",
                        summary.session_id,
                        format_timestamp(summary.last_activity),
                        summary.message_count
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }

    database.close().await
}

/// Show conversation store statistics.
pub async fn handle_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();

    let stats = repo.statistics().await?;

    match format {
        OutputFormat::Text => {
            println!("Conversation store statistics:");
            println!("  Total messages:     {}", stats.total_messages);
            println!("  Total sessions:     {}", stats.total_sessions);
            println!("  User messages:      {}", stats.user_messages);
            println!("  Assistant messages: {}", stats.assistant_messages);
            println!("  Oldest message:     {}", optional_timestamp(stats.oldest_timestamp));
            println!("  Newest message:     {}", optional_timestamp(stats.newest_timestamp));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    database.close().await
}

/// Purge messages older than the retention window.
pub async fn handle_cleanup(
    older_than_days: u32,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.db_path()?)
        .await
        .context("Failed to open database")?;
    let repo = database.conversations();

    let deleted = repo.purge_older_than(older_than_days).await?;

    match format {
        OutputFormat::Text => {
            println!("Deleted {deleted} message(s) older than {older_than_days} day(s).");
        }
        OutputFormat::Json => {
            let output = json!({"deleted": deleted, "older_than_days": older_than_days});
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

fn print_welcome(orchestrator: &Orchestrator, session_id: &str) {
    println!("Valet multi-agent assistant (session {session_id})");
    println!();
    println!("Specialized agents:");
    for agent in orchestrator.agents() {
        println!("  - {}", agent.name());
    }
    println!();
    println!("Type a question, or /help for commands.");
    println!();
}

fn print_messages(messages: &[crate::db::StoredMessage]) {
    for message in messages {
        let stamp = format_timestamp(message.timestamp);
        match (&message.role, &message.agent_name) {
            (MessageRole::Assistant, Some(agent)) => {
                println!("[{stamp}] assistant ({agent}): {}", message.content);
            }
            (role, _) => {
                println!("[{stamp}] {}: {}", role.as_str(), message.content);
            }
        }
    }
}

fn format_timestamp(millis: i64) -> String {
    use chrono::TimeZone;

    chrono::Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn optional_timestamp(millis: Option<i64>) -> String {
    millis.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}
