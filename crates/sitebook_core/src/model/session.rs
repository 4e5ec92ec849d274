//! Session context model.
//!
//! # Invariants
//! - `active_project` is a soft reference; it may name a project that no
//!   longer exists.
//! - `history` is most-recent-first and holds each name at most once.

use serde::{Deserialize, Serialize};

/// Per-conversation reference state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: String,
    pub active_project: Option<String>,
    pub history: Vec<String>,
    /// Unix epoch milliseconds; `0` for a session never written.
    pub updated_at: i64,
}

impl SessionContext {
    /// Empty context for a session that has not been written yet.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Most recently referenced project, if any.
    pub fn most_recent(&self) -> Option<&str> {
        self.history.first().map(String::as_str)
    }
}
