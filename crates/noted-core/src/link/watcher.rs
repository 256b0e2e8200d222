//! Bounded polling for completion of an out-of-band authorization.
//!
//! The watcher has no thread of its own: `run` is a cooperative loop that
//! awaits each tick (including its network calls) before scheduling the next.
//! Cancellation is observed at tick boundaries; an in-flight status check is allowed
//! to finish and its result is discarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::identity::redact;
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::session::{LinkSession, SessionStatus};
use super::store::LinkStateStore;
use crate::events::LinkEvent;

/// Waits between ticks. Injected so tests run without real delays.
#[async_trait]
pub trait Ticker: Send + Sync {
    async fn wait(&self, interval: Duration);
}

/// Real time via `tokio::time::sleep`.
pub struct TokioTicker;

#[async_trait]
impl Ticker for TokioTicker {
    async fn wait(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Yields to the scheduler and returns at once.
pub struct ImmediateTicker;

#[async_trait]
impl Ticker for ImmediateTicker {
    async fn wait(&self, _interval: Duration) {
        tokio::task::yield_now().await;
    }
}

/// Drives one [`LinkSession`] at a time to a terminal status.
pub struct CompletionWatcher {
    reconciler: Arc<Reconciler>,
    ticker: Arc<dyn Ticker>,
    current: Mutex<Option<LinkSession>>,
    events: broadcast::Sender<LinkEvent>,
}

impl CompletionWatcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        ticker: Arc<dyn Ticker>,
        events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        Self {
            reconciler,
            ticker,
            current: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the most recent session started or resumed here.
    pub fn session(&self) -> Option<LinkSession> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Begin a new session, superseding any pending one.
    pub fn start(&self, max_attempts: u32, interval_ms: u64) -> LinkSession {
        let baseline = self.store().load().confirmed_remote_id();
        let session = LinkSession::new(max_attempts, interval_ms, baseline);

        let superseded = match self.current.lock() {
            Ok(mut guard) => {
                let old = guard.take().filter(LinkSession::is_pending).map(|mut old| {
                    old.finish(SessionStatus::Cancelled);
                    old
                });
                *guard = Some(session.clone());
                old
            }
            Err(_) => None,
        };
        if let Some(old) = superseded {
            debug!(session = %old.id, "superseded by new link session");
            self.emit(LinkEvent::LinkCancelled {
                session_id: old.id,
                at: Utc::now(),
            });
        }

        self.checkpoint(&session);
        info!(session = %session.id, max_attempts, interval_ms, "link session started");
        self.emit(LinkEvent::LinkStarted {
            session_id: session.id,
            max_attempts,
            at: Utc::now(),
        });
        session
    }

    /// Adopt a pending session checkpointed by another context.
    pub fn resume_checkpointed(&self) -> Option<LinkSession> {
        let session = self.store().load_session().filter(LinkSession::is_pending)?;
        let mut guard = self.current.lock().ok()?;
        if guard.as_ref().is_some_and(|s| s.id != session.id && s.is_pending()) {
            return None;
        }
        *guard = Some(session.clone());
        debug!(session = %session.id, attempts = session.attempts_made, "resumed link session");
        Some(session)
    }

    /// Start a session and run it to completion in place.
    pub async fn watch(&self, max_attempts: u32, interval_ms: u64) -> SessionStatus {
        let session = self.start(max_attempts, interval_ms);
        self.run(session.id).await
    }

    /// Start a session and run it on the tokio runtime.
    pub fn spawn(
        self: &Arc<Self>,
        max_attempts: u32,
        interval_ms: u64,
    ) -> (LinkSession, tokio::task::JoinHandle<SessionStatus>) {
        let session = self.start(max_attempts, interval_ms);
        let watcher = Arc::clone(self);
        let id = session.id;
        let handle = tokio::spawn(async move { watcher.run(id).await });
        (session, handle)
    }

    /// Request cancellation of the pending session. No-op once terminal.
    pub fn cancel(&self) -> bool {
        let cancelled = match self.current.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(session) => session.finish(SessionStatus::Cancelled).then(|| session.clone()),
                None => None,
            },
            Err(_) => None,
        };
        match cancelled {
            Some(session) => {
                self.checkpoint(&session);
                info!(session = %session.id, "link session cancelled");
                self.emit(LinkEvent::LinkCancelled {
                    session_id: session.id,
                    at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Tick until the session reaches a terminal status.
    pub async fn run(&self, session_id: Uuid) -> SessionStatus {
        loop {
            let Some(session) = self.pending(session_id) else {
                return self.final_status(session_id);
            };
            if session.attempts_exhausted() {
                return self.time_out(session_id);
            }

            self.ticker.wait(Duration::from_millis(session.interval_ms)).await;
            if self.pending(session_id).is_none() {
                return self.final_status(session_id);
            }
            self.update(session_id, |s| s.attempts_made += 1);

            let result = self.reconciler.reconcile_stored().await;
            let Some(session) = self.pending(session_id) else {
                debug!(session = %session_id, "session ended during status check; discarding result");
                return self.final_status(session_id);
            };

            match &result.outcome {
                ReconcileOutcome::Revoked { reason } => self.emit(LinkEvent::Revoked {
                    reason: reason.clone(),
                    at: Utc::now(),
                }),
                ReconcileOutcome::Unchanged { reason } => debug!(
                    session = %session_id,
                    attempt = session.attempts_made,
                    reason = %reason,
                    "status check failed; will retry"
                ),
                _ => {}
            }

            if let (true, Some(remote_id)) = (result.identity.confirmed, &result.identity.remote_id) {
                if session.baseline_remote_id.as_ref() != Some(remote_id) {
                    let workspace_name = match &result.outcome {
                        ReconcileOutcome::Confirmed { workspace_name } => workspace_name.clone(),
                        _ => None,
                    };
                    return self.confirm(session_id, remote_id, workspace_name);
                }
            }

            if session.attempts_exhausted() {
                return self.time_out(session_id);
            }
        }
    }

    fn store(&self) -> &LinkStateStore {
        self.reconciler.store()
    }

    /// The session if it is still ours and pending, folding in any
    /// cancellation written to the checkpoint by another context. A newer
    /// session checkpointed by another context supersedes this one.
    fn pending(&self, session_id: Uuid) -> Option<LinkSession> {
        let checkpoint = self.store().load_session();

        let mut guard = self.current.lock().ok()?;
        let session = guard.as_mut().filter(|s| s.id == session_id)?;
        let stop = checkpoint.as_ref().and_then(|other| {
            if other.id == session_id {
                (other.status == SessionStatus::Cancelled).then_some("cancelled by another context")
            } else {
                (other.started_at >= session.started_at)
                    .then_some("superseded by a session in another context")
            }
        });
        if let Some(why) = stop {
            if session.finish(SessionStatus::Cancelled) {
                info!(session = %session_id, "link session {why}");
                self.emit(LinkEvent::LinkCancelled {
                    session_id,
                    at: Utc::now(),
                });
            }
        }
        session.is_pending().then(|| session.clone())
    }

    fn final_status(&self, session_id: Uuid) -> SessionStatus {
        self.current
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().filter(|s| s.id == session_id).map(|s| s.status))
            // Superseded by a newer session.
            .unwrap_or(SessionStatus::Cancelled)
    }

    fn update(&self, session_id: Uuid, f: impl FnOnce(&mut LinkSession)) -> Option<LinkSession> {
        let snapshot = {
            let mut guard = self.current.lock().ok()?;
            let session = guard.as_mut().filter(|s| s.id == session_id)?;
            f(session);
            session.clone()
        };
        self.checkpoint(&snapshot);
        Some(snapshot)
    }

    fn confirm(
        &self,
        session_id: Uuid,
        remote_id: &str,
        workspace_name: Option<String>,
    ) -> SessionStatus {
        let finished = self.update(session_id, |s| {
            if s.finish(SessionStatus::Confirmed) {
                s.linked_remote_id = Some(remote_id.to_string());
            }
        });
        let Some(session) = finished else {
            return self.final_status(session_id);
        };
        if session.status != SessionStatus::Confirmed {
            return session.status;
        }
        info!(session = %session_id, remote_id = %redact(remote_id), attempts = session.attempts_made, "link established");
        self.emit(LinkEvent::Linked {
            session_id,
            remote_id: remote_id.to_string(),
            workspace_name,
            at: Utc::now(),
        });
        SessionStatus::Confirmed
    }

    fn time_out(&self, session_id: Uuid) -> SessionStatus {
        let finished = self.update(session_id, |s| {
            s.finish(SessionStatus::TimedOut);
        });
        let Some(session) = finished else {
            return self.final_status(session_id);
        };
        if session.status != SessionStatus::TimedOut {
            return session.status;
        }
        info!(session = %session_id, attempts = session.attempts_made, "link session timed out");
        self.emit(LinkEvent::LinkTimedOut {
            session_id,
            attempts: session.attempts_made,
            at: Utc::now(),
        });
        SessionStatus::TimedOut
    }

    fn checkpoint(&self, session: &LinkSession) {
        if let Err(e) = self.store().save_session(session) {
            warn!(error = %e, "failed to checkpoint link session");
        }
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cancel the checkpointed session from a context that does not own it.
///
/// The owning watcher observes this on its next tick.
pub fn cancel_checkpointed(store: &LinkStateStore) -> bool {
    let Some(mut session) = store.load_session() else {
        return false;
    };
    if !session.finish(SessionStatus::Cancelled) {
        return false;
    }
    match store.save_session(&session) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "failed to record cancellation");
            false
        }
    }
}
