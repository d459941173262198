//! Web search tools backed by the Tavily API
//!
//! Two depths share one wire format: `web_search` does a basic-depth query,
//! `research` an advanced-depth one with more results. Output is the API's
//! AI-generated answer followed by numbered sources.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{validate_args, Tool, ToolError};
use crate::config::SearchConfig;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum source snippet length before truncation
const SNIPPET_LIMIT: usize = 200;

/// Shared HTTP plumbing for the search tools
#[derive(Debug, Clone)]
pub struct SearchApi {
    base_url: String,
    api_key: String,
    max_results: u32,
    client: Client,
}

impl SearchApi {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_results: config.max_results,
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn request(
        &self,
        query: &str,
        search_depth: &str,
        max_results: u32,
    ) -> Result<SearchResponse, ToolError> {
        let payload = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": search_depth,
            "include_answer": true,
            "max_results": max_results,
        });

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Network("Request timed out".to_string())
                } else {
                    ToolError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ToolError::Api(format!(
                "Search API error: status {}",
                response.status()
            )));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Parse(format!("Failed to parse search response: {e}")))?;

        debug!("Search completed for: {}", query);
        Ok(data)
    }

    fn format_results(&self, data: &SearchResponse, query: &str) -> String {
        let mut parts = Vec::new();

        if let Some(answer) = data.answer.as_deref().filter(|a| !a.is_empty()) {
            parts.push(format!("Answer: {answer}\n"));
        }

        if !data.results.is_empty() {
            parts.push("Sources:".to_string());
            for (i, result) in data.results.iter().enumerate() {
                let mut content = result.content.clone();
                if content.len() > SNIPPET_LIMIT {
                    let mut cut = SNIPPET_LIMIT;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("...");
                }
                parts.push(format!("\n{}. {}", i + 1, result.title));
                parts.push(format!("   {}", result.url));
                parts.push(format!("   {content}"));
            }
        }

        if parts.is_empty() {
            return format!("No results found for: {query}");
        }

        parts.join("\n")
    }
}

/// Quick web search at basic depth
pub struct WebSearchTool {
    api: SearchApi,
}

impl WebSearchTool {
    pub fn new(api: SearchApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Quick web search for general queries, returns an answer with sources"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        validate_args(&self.schema(), &args)?;
        let query = args["query"].as_str().unwrap_or_default();
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "search query cannot be empty".to_string(),
            ));
        }

        let data = self
            .api
            .request(query, "basic", self.api.max_results)
            .await?;
        Ok(self.api.format_results(&data, query))
    }
}

/// Deep research at advanced depth with a larger result set
pub struct ResearchTool {
    api: SearchApi,
}

impl ResearchTool {
    pub fn new(api: SearchApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for ResearchTool {
    fn name(&self) -> &str {
        "research"
    }

    fn description(&self) -> &str {
        "Deep research for comprehensive information on a topic"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Research topic"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        validate_args(&self.schema(), &args)?;
        let query = args["query"].as_str().unwrap_or_default();
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "research query cannot be empty".to_string(),
            ));
        }

        let data = self.api.request(query, "advanced", 10).await?;
        Ok(self.api.format_results(&data, query))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}
