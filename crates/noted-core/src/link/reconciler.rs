//! Reconciles the locally cached link against the relay's view of it.
//!
//! Only an explicit `connected: false` may downgrade a confirmed link. A
//! failed status check leaves the stored state exactly as it was.
//!
//! ```text
//! cached remote_id? -- yes --> status(cached)
//!     |                          |- connected -------------> Confirmed (save)
//!     |                          |- error -----------------> Unchanged (no write)
//!     |                          \- not connected:
//!     |                               was confirmed -> reset, Revoked
//!     |                               clear_local_state -> reset
//!     |                               otherwise -> candidate dropped
//!     v                               then fall through, skipping that id
//! discover_latest() -- none / local id / rejected id --> Unlinked or Revoked
//!     | candidate
//!     v
//! status(candidate) -- connected --> Confirmed (save)
//!                   \- not linked --> not adopted
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::identity::{redact, LinkIdentity};
use super::store::LinkStateStore;
use crate::error::RelayError;

/// Why the relay considers an id linked or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    ValidToken,
    NoToken,
    InvalidToken,
    #[serde(other)]
    Other,
}

/// Follow-up the relay asks the client to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    #[serde(alias = "clear_extension_storage")]
    ClearLocalState,
    #[serde(other)]
    Other,
}

/// Decoded answer of the relay's status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub connected: bool,
    #[serde(default)]
    pub reason: Option<StatusReason>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub action: Option<StatusAction>,
}

impl LinkStatus {
    pub fn linked(workspace_name: Option<&str>) -> Self {
        Self {
            connected: true,
            reason: Some(StatusReason::ValidToken),
            message: None,
            workspace_id: None,
            workspace_name: workspace_name.map(str::to_string),
            action: None,
        }
    }

    pub fn not_linked(reason: StatusReason) -> Self {
        Self {
            connected: false,
            reason: Some(reason),
            message: None,
            workspace_id: None,
            workspace_name: None,
            action: None,
        }
    }

    /// Ask the client to drop its local identity as well.
    pub fn clearing_local_state(mut self) -> Self {
        self.action = Some(StatusAction::ClearLocalState);
        self
    }
}

/// The remote capabilities the reconciler needs.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Is this id actively linked?
    async fn status(&self, remote_id: &str) -> Result<LinkStatus, RelayError>;

    /// Most recent id to complete authorization from any client, if any.
    async fn discover_latest(&self) -> Result<Option<String>, RelayError>;
}

/// What a reconcile pass concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The id is linked; stored identity is confirmed.
    Confirmed { workspace_name: Option<String> },
    /// A previously confirmed link was reported gone; identity was reset.
    Revoked { reason: Option<StatusReason> },
    /// Nothing is linked and nothing was confirmed before.
    Unlinked,
    /// The status check failed; state untouched.
    Unchanged { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub identity: LinkIdentity,
    pub outcome: ReconcileOutcome,
}

impl Reconciled {
    fn new(identity: LinkIdentity, outcome: ReconcileOutcome) -> Self {
        Self { identity, outcome }
    }
}

type Clock = dyn Fn() -> DateTime<Utc> + Send + Sync;

/// Decides the current link and repairs the store when it disagrees with the relay.
pub struct Reconciler {
    store: Arc<LinkStateStore>,
    source: Arc<dyn IdentitySource>,
    clock: Arc<Clock>,
}

impl Reconciler {
    pub fn new(store: Arc<LinkStateStore>, source: Arc<dyn IdentitySource>) -> Self {
        Self {
            store,
            source,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (tests pin it to get comparable outputs).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<LinkStateStore> {
        &self.store
    }

    /// Reconcile whatever is currently stored.
    pub async fn reconcile_stored(&self) -> Reconciled {
        let identity = self.store.load();
        self.reconcile(identity).await
    }

    /// One reconcile pass starting from `identity`.
    ///
    /// Idempotent for a stable remote: feeding the output back in yields the
    /// same identity. A cached id the relay rejects is cleared and discovery
    /// runs in the same pass, skipping the rejected id.
    pub async fn reconcile(&self, identity: LinkIdentity) -> Reconciled {
        let mut identity = identity;
        let mut revoked = None;
        let mut rejected = None;

        if let Some(cached) = identity.remote_id.clone() {
            let status = match self.source.status(&cached).await {
                Ok(status) => status,
                Err(e) => return Self::unchanged(identity, e),
            };
            if status.connected {
                return self.confirmed(identity, &cached, status);
            }
            if identity.confirmed {
                info!(
                    remote_id = %redact(&cached),
                    reason = ?status.reason,
                    "link revoked by relay; resetting local identity"
                );
                identity = self.store.reset();
                revoked = Some(status.reason);
            } else if status.action == Some(StatusAction::ClearLocalState) {
                debug!(candidate = %redact(&cached), "relay asked to clear local state");
                identity = self.store.reset();
            } else {
                debug!(candidate = %redact(&cached), "dropping unconfirmed candidate");
                identity = identity.without_candidate();
                self.persist(&identity);
            }
            rejected = Some(cached);
        }

        let finish = |identity: LinkIdentity, revoked: Option<Option<StatusReason>>| match revoked {
            Some(reason) => Reconciled::new(identity, ReconcileOutcome::Revoked { reason }),
            None => Reconciled::new(identity, ReconcileOutcome::Unlinked),
        };

        let candidate = match self.source.discover_latest().await {
            Ok(Some(found)) if found != identity.local_id && Some(&found) != rejected.as_ref() => {
                debug!(candidate = %redact(&found), "discovered authorization candidate");
                found
            }
            Ok(_) => return finish(identity, revoked),
            Err(e) if rejected.is_none() => return Self::unchanged(identity, e),
            Err(e) => {
                warn!(error = %e, "discovery failed after clearing a rejected id");
                return finish(identity, revoked);
            }
        };

        match self.source.status(&candidate).await {
            Ok(status) if status.connected => self.confirmed(identity, &candidate, status),
            // A discovered id that is not linked is never adopted.
            Ok(_) => finish(identity, revoked),
            Err(e) if rejected.is_none() => Self::unchanged(identity, e),
            Err(e) => {
                warn!(error = %e, "status check of discovered candidate failed");
                finish(identity, revoked)
            }
        }
    }

    fn confirmed(&self, identity: LinkIdentity, remote_id: &str, status: LinkStatus) -> Reconciled {
        let confirmed = identity.confirm(remote_id, (self.clock)());
        if !identity.confirmed || identity.remote_id.as_deref() != Some(remote_id) {
            info!(
                remote_id = %redact(remote_id),
                workspace = status.workspace_name.as_deref().unwrap_or("unknown"),
                "link confirmed"
            );
        }
        self.persist(&confirmed);
        Reconciled::new(
            confirmed,
            ReconcileOutcome::Confirmed {
                workspace_name: status.workspace_name,
            },
        )
    }

    fn persist(&self, identity: &LinkIdentity) {
        if let Err(e) = self.store.save(identity) {
            warn!(error = %e, "failed to persist reconciled identity");
        }
    }

    fn unchanged(identity: LinkIdentity, err: RelayError) -> Reconciled {
        warn!(error = %err, "status check failed; keeping current link state");
        Reconciled::new(
            identity,
            ReconcileOutcome::Unchanged {
                reason: err.to_string(),
            },
        )
    }
}
