//! Periodic background connectivity check.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::reconciler::{ReconcileOutcome, Reconciled, Reconciler};
use super::watcher::Ticker;
use crate::events::LinkEvent;

pub struct ConnectivityMonitor {
    reconciler: Arc<Reconciler>,
    ticker: Arc<dyn Ticker>,
    interval: Duration,
    events: broadcast::Sender<LinkEvent>,
}

impl ConnectivityMonitor {
    pub fn new(
        reconciler: Arc<Reconciler>,
        ticker: Arc<dyn Ticker>,
        interval: Duration,
        events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        Self {
            reconciler,
            ticker,
            interval,
            events,
        }
    }

    /// Reconcile the stored link once, announcing a revoke.
    pub async fn check_once(&self) -> Reconciled {
        let result = self.reconciler.reconcile_stored().await;
        if let ReconcileOutcome::Revoked { reason } = &result.outcome {
            let _ = self.events.send(LinkEvent::Revoked {
                reason: reason.clone(),
                at: Utc::now(),
            });
        }
        result
    }

    /// Check every interval until `shutdown` flips to true or its sender drops.
    /// Returns the number of checks performed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut checks = 0;
        loop {
            if *shutdown.borrow() {
                return checks;
            }
            tokio::select! {
                _ = self.ticker.wait(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return checks;
                    }
                    continue;
                }
            }
            let result = self.check_once().await;
            checks += 1;
            debug!(outcome = ?result.outcome, checks, "background connectivity check");
        }
    }
}
