use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::link::reconciler::StatusReason;

/// Lifecycle events for the link.
/// Front ends subscribe to these instead of polling the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkEvent {
    LinkStarted {
        session_id: Uuid,
        max_attempts: u32,
        at: DateTime<Utc>,
    },
    /// A new link was established by a watcher session.
    Linked {
        session_id: Uuid,
        remote_id: String,
        workspace_name: Option<String>,
        at: DateTime<Utc>,
    },
    LinkTimedOut {
        session_id: Uuid,
        attempts: u32,
        at: DateTime<Utc>,
    },
    LinkCancelled {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    /// A confirmed link was reported gone and local state was reset.
    Revoked {
        reason: Option<StatusReason>,
        at: DateTime<Utc>,
    },
}

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 32;

/// Sender shared by the watcher and the monitor.
pub fn channel() -> tokio::sync::broadcast::Sender<LinkEvent> {
    let (tx, _rx) = tokio::sync::broadcast::channel(EVENT_CAPACITY);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_serialization() {
        let event = LinkEvent::Linked {
            session_id: Uuid::nil(),
            remote_id: "u-9".into(),
            workspace_name: Some("Acme".into()),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Linked");
        assert_eq!(json["remote_id"], "u-9");
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let tx = channel();
        assert!(tx
            .send(LinkEvent::Revoked {
                reason: None,
                at: Utc::now()
            })
            .is_err());
        let mut rx = tx.subscribe();
        tx.send(LinkEvent::Revoked {
            reason: None,
            at: Utc::now(),
        })
        .unwrap();
        assert!(matches!(rx.try_recv(), Ok(LinkEvent::Revoked { .. })));
    }
}
