//! Session Context
//!
//! Generates the session identifier once per process run and threads it
//! through every conversation-store write. Uniqueness within a single host
//! is the only requirement: the timestamp keeps ids sortable and the UUID
//! suffix distinguishes same-second runs. Nothing here is persisted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Ephemeral per-run identity
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: String,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    /// Generate a fresh session id, e.g. `v-20260804153000-1f2e3d4c`.
    pub fn new() -> Self {
        let started_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "v-{}-{}",
            started_at.format("%Y%m%d%H%M%S"),
            &suffix[..8]
        );
        Self { id, started_at }
    }

    /// The session id every save call for this run carries.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When this run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let ctx = SessionContext::new();
        let id = ctx.id();

        assert!(id.starts_with("v-"));
        // v- + 14 digit timestamp + - + 8 hex chars
        assert_eq!(id.len(), 2 + 14 + 1 + 8);
    }

    #[test]
    fn test_same_second_runs_get_distinct_ids() {
        let a = SessionContext::new();
        let b = SessionContext::new();
        assert_ne!(a.id(), b.id());
    }
}
