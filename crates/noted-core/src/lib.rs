//! # Noted Core Library
//!
//! Core logic for Noted, which summarizes articles and saves them to a
//! linked Notion workspace through a relay backend that holds the OAuth
//! tokens. The `noted` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Link state**: a persisted [`LinkIdentity`] (local placeholder id,
//!   remote id, confirmed flag) plus a credential-validated flag
//! - **Reconciler**: compares the cached link with the relay and repairs it;
//!   only an explicit "not connected" answer can demote a confirmed link
//! - **Completion watcher**: bounded polling after the user starts
//!   authorization in the browser
//! - **Projector**: pure mapping from state to `can_act` and a status label
//! - **Relay client**: reqwest-based HTTP client for every backend call
//!
//! ## Key Components
//!
//! - [`LinkStateStore`]: persisted link identity
//! - [`Reconciler`]: link repair against an [`IdentitySource`]
//! - [`CompletionWatcher`]: linking session state machine
//! - [`project`]: status projection
//! - [`RelayClient`]: backend calls
//! - [`Clipper`]: summarize-and-save flow

pub mod clip;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod link;
pub mod relay;
pub mod storage;

pub use clip::{Article, Clipped, Clipper};
pub use config::Config;
pub use error::{ClipError, ConfigError, CoreError, RelayError, StoreError};
pub use events::LinkEvent;
pub use link::{
    cancel_checkpointed, project, CompletionWatcher, ConnectivityMonitor, IdentitySource,
    LinkIdentity, LinkSession, LinkStateStore, LinkStatus, Projection, ReconcileOutcome,
    Reconciled, Reconciler, SessionStatus, StatusLabel, Ticker, TokioTicker,
};
pub use relay::RelayClient;
pub use storage::{KvStore, MemoryKv, SqliteKv};
