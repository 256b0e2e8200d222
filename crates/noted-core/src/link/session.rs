//! In-flight authorization session.
//!
//! ```text
//! Pending -> Confirmed | TimedOut | Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    TimedOut,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

/// Ephemeral record of one linking attempt.
///
/// Checkpointed to the store so another context can observe or cancel it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub status: SessionStatus,
    /// Remote id that was already confirmed when the session began.
    #[serde(default)]
    pub baseline_remote_id: Option<String>,
    /// Remote id established by this session.
    #[serde(default)]
    pub linked_remote_id: Option<String>,
}

impl LinkSession {
    pub fn new(max_attempts: u32, interval_ms: u64, baseline_remote_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            attempts_made: 0,
            max_attempts,
            interval_ms,
            status: SessionStatus::Pending,
            baseline_remote_id,
            linked_remote_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
