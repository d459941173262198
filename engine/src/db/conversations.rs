//! Conversation Repository
//!
//! Persists every conversational turn and answers the history, session, and
//! analytics queries. Messages are append-only: a row is written once by
//! `save` and removed only by `purge_older_than`.
//!
//! Every write runs inside an explicit transaction. If the insert fails the
//! transaction is dropped (rolled back) and the error is re-signaled with
//! context; the pooled connection is returned on every exit path.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Role of a stored conversational turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => bail!("Unknown message role in store: {other}"),
        }
    }
}

/// One stored conversational turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    /// Unix milliseconds. Ordering within a session is (timestamp, id), so
    /// same-millisecond writes keep their insertion order.
    pub timestamp: i64,
    pub role: MessageRole,
    pub content: String,
    /// Set only on assistant turns; names the agent that produced the text.
    pub agent_name: Option<String>,
}

/// Aggregate view of one session, derived from its messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Timestamp of the most recent message (unix milliseconds)
    pub last_activity: i64,
    pub message_count: i64,
}

/// Store-wide aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_messages: i64,
    pub total_sessions: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Repository for conversation persistence
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message to a session.
    ///
    /// Atomic: the row is either durably committed or not written at all.
    pub async fn save(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        agent_name: Option<&str>,
    ) -> Result<()> {
        let now = now_millis()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open write transaction")?;

        // On error the transaction is dropped here, which rolls it back
        // before the error propagates to the caller.
        sqlx::query(
            "INSERT INTO conversations (session_id, timestamp, role, content, agent_name) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(now)
        .bind(role.as_str())
        .bind(content)
        .bind(agent_name)
        .execute(&mut *tx)
        .await
        .context("Failed to save message")?;

        tx.commit().await.context("Failed to commit message")?;

        debug!("Saved {} message to session {}", role.as_str(), session_id);
        Ok(())
    }

    /// Fetch a session's messages in chronological order (oldest first).
    ///
    /// `limit` selects the most recent N messages before re-ordering.
    /// `None` and `Some(0)` both return the full session.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<StoredMessage>> {
        const SELECT: &str = "SELECT id, session_id, timestamp, role, content, agent_name \
                              FROM conversations WHERE session_id = ? \
                              ORDER BY timestamp DESC, id DESC";

        let rows = match limit {
            Some(n) if n > 0 => {
                sqlx::query(&format!("{SELECT} LIMIT ?"))
                    .bind(session_id)
                    .bind(n as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            _ => {
                sqlx::query(SELECT)
                    .bind(session_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to fetch session history")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(StoredMessage {
                id: row.get("id"),
                session_id: row.get("session_id"),
                timestamp: row.get("timestamp"),
                role: MessageRole::parse(&row.get::<String, _>("role"))?,
                content: row.get("content"),
                agent_name: row.get("agent_name"),
            });
        }
        messages.reverse();

        debug!(
            "Retrieved {} messages from session {}",
            messages.len(),
            session_id
        );
        Ok(messages)
    }

    /// Sessions with at least one message inside the lookback window,
    /// most recent activity first.
    pub async fn recent_sessions(
        &self,
        lookback_days: u32,
        limit: u32,
    ) -> Result<Vec<SessionSummary>> {
        let cutoff = now_millis()? - i64::from(lookback_days) * 86_400_000;

        let rows = sqlx::query(
            "SELECT session_id, MAX(timestamp) AS last_activity, COUNT(*) AS message_count \
             FROM conversations WHERE timestamp >= ? \
             GROUP BY session_id \
             ORDER BY last_activity DESC \
             LIMIT ?",
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent sessions")?;

        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                session_id: row.get("session_id"),
                last_activity: row.get("last_activity"),
                message_count: row.get("message_count"),
            })
            .collect())
    }

    /// Aggregate counts over the whole store. Read-only and idempotent.
    pub async fn statistics(&self) -> Result<StoreStatistics> {
        let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count messages")?;

        let total_sessions: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT session_id) FROM conversations")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count sessions")?;

        let user_messages: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE role = 'user'")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count user messages")?;

        let assistant_messages: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE role = 'assistant'")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count assistant messages")?;

        let oldest_timestamp: Option<i64> =
            sqlx::query_scalar("SELECT MIN(timestamp) FROM conversations")
                .fetch_one(&self.pool)
                .await
                .context("Failed to read oldest timestamp")?;

        let newest_timestamp: Option<i64> =
            sqlx::query_scalar("SELECT MAX(timestamp) FROM conversations")
                .fetch_one(&self.pool)
                .await
                .context("Failed to read newest timestamp")?;

        Ok(StoreStatistics {
            total_messages,
            total_sessions,
            user_messages,
            assistant_messages,
            oldest_timestamp,
            newest_timestamp,
        })
    }

    /// Delete messages older than `age_days`. Returns the number removed.
    ///
    /// Retention only; never called from the conversation flow.
    pub async fn purge_older_than(&self, age_days: u32) -> Result<u64> {
        let cutoff = now_millis()? - i64::from(age_days) * 86_400_000;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open write transaction")?;

        let deleted = sqlx::query("DELETE FROM conversations WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .context("Failed to purge old messages")?
            .rows_affected();

        tx.commit().await.context("Failed to commit purge")?;

        debug!("Purged {} messages older than {} days", deleted, age_days);
        Ok(deleted)
    }

    /// Format the most recent turns of a session for seeding a model prompt.
    ///
    /// Returns an empty string for an unknown or empty session.
    pub async fn context_for_model(&self, session_id: &str, max_messages: u32) -> Result<String> {
        use chrono::TimeZone;

        let messages = self.history(session_id, Some(max_messages)).await?;
        if messages.is_empty() {
            return Ok(String::new());
        }

        let mut parts = vec!["Previous conversation history:".to_string()];
        for msg in &messages {
            let clock = chrono::Utc
                .timestamp_millis_opt(msg.timestamp)
                .single()
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());

            let role = match msg.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };

            match &msg.agent_name {
                Some(agent) => {
                    parts.push(format!("[{clock}] {role} ({agent}): {}", msg.content));
                }
                None => parts.push(format!("[{clock}] {role}: {}", msg.content)),
            }
        }

        Ok(parts.join("\n"))
    }
}

/// Current wall-clock time as unix milliseconds.
fn now_millis() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as i64)
}
