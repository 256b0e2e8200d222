use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use noted_core::link::identity::redact;
use noted_core::{
    cancel_checkpointed, events, project, CompletionWatcher, ConnectivityMonitor, LinkEvent,
    LinkSession, LinkStateStore, ReconcileOutcome, SessionStatus, TokioTicker,
};
use tokio::sync::watch;

use super::{App, CmdResult};

#[derive(Subcommand)]
pub enum LinkAction {
    /// Open the authorization page and wait for the link to complete
    Start {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show the current link status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-check the link against the relay now
    Check,
    /// Cancel a link session waiting in another terminal
    Cancel,
    /// Forget the current link and start over with a fresh identity
    Reset,
    /// Keep checking the link in the background until interrupted
    Monitor,
}

pub async fn run(action: LinkAction) -> CmdResult {
    match action {
        LinkAction::Start { no_browser } => start(no_browser).await,
        LinkAction::Status { json } => status(json),
        LinkAction::Check => check().await,
        LinkAction::Cancel => {
            let app = App::open()?;
            if cancel_checkpointed(&app.store) {
                println!("link session cancelled");
            } else {
                println!("no link session in progress");
            }
            Ok(())
        }
        LinkAction::Reset => {
            let app = App::open()?;
            cancel_checkpointed(&app.store);
            let fresh = app.store.reset();
            println!("link reset (local id {})", redact(&fresh.local_id));
            Ok(())
        }
        LinkAction::Monitor => monitor().await,
    }
}

async fn start(no_browser: bool) -> CmdResult {
    let app = App::open()?;
    let url = app.relay.login_url();
    if no_browser {
        println!("Open this URL to authorize Noted: {url}");
    } else if let Err(e) = app.relay.open_login() {
        tracing::warn!(error = %e, "could not open a browser");
        println!("Open this URL to authorize Noted: {url}");
    } else {
        println!("Opened {url} in your browser");
    }

    let watcher = Arc::new(CompletionWatcher::new(
        app.reconciler.clone(),
        Arc::new(TokioTicker),
        events::channel(),
    ));
    let mut rx = watcher.subscribe();
    let (session, mut handle) =
        watcher.spawn(app.config.watcher.max_attempts, app.config.watcher.interval_ms);
    println!(
        "Waiting for authorization (checking every {} ms, up to {} times)...",
        session.interval_ms, session.max_attempts
    );

    let status = tokio::select! {
        finished = &mut handle => finished?,
        _ = tokio::signal::ctrl_c() => {
            watcher.cancel();
            handle.await?
        }
    };

    match status {
        SessionStatus::Confirmed => {
            let mut workspace = None;
            while let Ok(event) = rx.try_recv() {
                if let LinkEvent::Linked { workspace_name, .. } = event {
                    workspace = workspace_name;
                }
            }
            match workspace {
                Some(name) => println!("linked to workspace {name}"),
                None => println!("linked"),
            }
            Ok(())
        }
        SessionStatus::Cancelled => {
            println!("link session cancelled");
            Ok(())
        }
        SessionStatus::TimedOut => {
            Err("authorization was not completed in time; run `noted link start` again".into())
        }
        SessionStatus::Pending => Err("link session ended unexpectedly".into()),
    }
}

/// A checkpointed session that is pending and could still be running.
fn live_session(store: &LinkStateStore) -> Option<LinkSession> {
    store.load_session().filter(|s| {
        let budget_ms = u64::from(s.max_attempts)
            .saturating_mul(s.interval_ms)
            .saturating_add(30_000);
        let deadline = i64::try_from(budget_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|budget| s.started_at.checked_add_signed(budget));
        s.is_pending() && deadline.map_or(true, |deadline| deadline > Utc::now())
    })
}

fn status(json: bool) -> CmdResult {
    let app = App::open()?;
    let identity = app.store.load();
    let credential_valid = app.store.credential_valid();
    let session = live_session(&app.store);
    let projection = project(&identity, credential_valid, session.as_ref());

    if json {
        let out = serde_json::json!({
            "label": projection.label,
            "can_act": projection.can_act,
            "confirmed": identity.confirmed,
            "credential_valid": credential_valid,
            "last_checked_at": identity.last_checked_at,
            "session": session.as_ref().map(|s| serde_json::json!({
                "attempts_made": s.attempts_made,
                "max_attempts": s.max_attempts,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Status:     {}", projection.label);
    match identity.active_remote_id() {
        Some(remote) => println!("Account:    {}", redact(remote)),
        None => println!("Account:    -"),
    }
    println!(
        "API key:    {}",
        if credential_valid { "validated" } else { "not validated" }
    );
    if let Some(at) = identity.last_checked_at {
        println!("Checked at: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(s) = session {
        println!("Session:    attempt {}/{}", s.attempts_made, s.max_attempts);
    }
    println!(
        "Ready:      {}",
        if projection.can_act { "yes" } else { "no" }
    );
    Ok(())
}

fn describe(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Confirmed {
            workspace_name: Some(name),
        } => format!("linked to workspace {name}"),
        ReconcileOutcome::Confirmed { workspace_name: None } => "linked".into(),
        ReconcileOutcome::Revoked { .. } => "link was revoked; run `noted link start` to link again".into(),
        ReconcileOutcome::Unlinked => "not linked".into(),
        ReconcileOutcome::Unchanged { reason } => format!("could not reach the relay ({reason}); status unchanged"),
    }
}

async fn check() -> CmdResult {
    let app = App::open()?;
    let result = app.reconciler.reconcile_stored().await;
    println!("{}", describe(&result.outcome));
    Ok(())
}

async fn monitor() -> CmdResult {
    let app = App::open()?;
    let tx = events::channel();
    let mut rx = tx.subscribe();
    let monitor = ConnectivityMonitor::new(
        app.reconciler.clone(),
        Arc::new(TokioTicker),
        Duration::from_secs(app.config.monitor.interval_secs),
        tx,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let LinkEvent::Revoked { at, .. } = event {
                println!("{}: link revoked", at.format("%H:%M:%S"));
            }
        }
    });

    let first = monitor.check_once().await;
    println!("{}", describe(&first.outcome));
    println!(
        "checking every {} s; press Ctrl-C to stop",
        app.config.monitor.interval_secs
    );
    let checks = monitor.run(stop_rx).await;
    printer.abort();
    println!("stopped after {} checks", checks + 1);
    Ok(())
}
