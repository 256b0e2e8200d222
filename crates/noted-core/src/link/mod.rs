//! Workspace link state and its reconciliation against the relay.

pub mod identity;
pub mod monitor;
pub mod projector;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod watcher;

pub use identity::LinkIdentity;
pub use monitor::ConnectivityMonitor;
pub use projector::{project, Projection, StatusLabel};
pub use reconciler::{
    IdentitySource, LinkStatus, ReconcileOutcome, Reconciled, Reconciler, StatusAction,
    StatusReason,
};
pub use session::{LinkSession, SessionStatus};
pub use store::LinkStateStore;
pub use watcher::{cancel_checkpointed, CompletionWatcher, ImmediateTicker, Ticker, TokioTicker};
