//! Summarize an article and save it to the linked workspace.
//!
//! The flow is offered only when the projector says `can_act`. An
//! authentication failure from the relay on either write triggers an
//! immediate reconcile; the store is reset only if that reconcile also
//! finds the link gone. Server and network failures are returned as-is
//! and never retried automatically.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ClipError, RelayError};
use crate::link::identity::redact;
use crate::link::projector::project;
use crate::link::reconciler::{ReconcileOutcome, Reconciler};
use crate::relay::{RelayClient, SaveEntryRequest};

/// Article text ready to send: whitespace collapsed, length bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl Article {
    /// # Errors
    /// Returns [`ClipError::EmptyContent`] when nothing but whitespace remains.
    pub fn new(
        title: &str,
        url: &str,
        raw_content: &str,
        max_chars: usize,
    ) -> Result<Self, ClipError> {
        let normalized = normalize_whitespace(raw_content);
        if normalized.is_empty() {
            return Err(ClipError::EmptyContent);
        }
        Ok(Self {
            title: normalize_whitespace(title),
            url: url.trim().to_string(),
            content: truncate_chars(&normalized, max_chars).to_string(),
        })
    }
}

/// Collapse every run of whitespace into one space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Result of a successful clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clipped {
    pub summary: String,
    pub category: String,
    pub page_url: String,
}

pub struct Clipper {
    reconciler: Arc<Reconciler>,
    relay: Arc<RelayClient>,
    max_content_chars: usize,
    default_category: String,
}

impl Clipper {
    pub fn new(reconciler: Arc<Reconciler>, relay: Arc<RelayClient>, config: &Config) -> Self {
        Self {
            reconciler,
            relay,
            max_content_chars: config.relay.max_content_chars,
            default_category: config.clip.default_category.clone(),
        }
    }

    /// Build an [`Article`] bounded by this clipper's content limit.
    pub fn article(&self, title: &str, url: &str, raw_content: &str) -> Result<Article, ClipError> {
        Article::new(title, url, raw_content, self.max_content_chars)
    }

    /// Summarize `article` and save it under the confirmed remote id.
    ///
    /// # Errors
    /// - [`ClipError::NotReady`] if the link is unconfirmed or the API key
    ///   was never validated.
    /// - [`ClipError::LinkLost`] if the relay rejected a write and the
    ///   follow-up reconcile found the link revoked.
    /// - [`ClipError::Summarize`], [`ClipError::SaveRejected`] or
    ///   [`ClipError::Save`] for the remaining relay failures.
    pub async fn clip(&self, article: &Article, api_key: &str) -> Result<Clipped, ClipError> {
        let store = self.reconciler.store();
        let identity = store.load();
        let credential_valid = store.credential_valid();
        if !project(&identity, credential_valid, None).can_act {
            let why = if !identity.confirmed {
                "workspace is not linked"
            } else {
                "API key has not been validated"
            };
            return Err(ClipError::NotReady(why.to_string()));
        }
        let Some(user_id) = identity.active_remote_id().map(str::to_string) else {
            return Err(ClipError::NotReady("workspace is not linked".into()));
        };

        let title = (!article.title.is_empty()).then_some(article.title.as_str());
        let summary = match self
            .relay
            .summarize_and_categorize(&article.content, title, api_key)
            .await
        {
            Ok(summary) => summary,
            Err(e) if e.is_auth_failure() => {
                return Err(self.after_auth_failure(e, ClipError::Summarize).await)
            }
            Err(e) => return Err(ClipError::Summarize(e)),
        };

        let category = summary
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.default_category.clone());
        debug!(user = %redact(&user_id), category = %category, "summary ready");

        let request = SaveEntryRequest {
            summary: summary.summary.clone(),
            url: article.url.clone(),
            title: article.title.clone(),
            user_id,
            category: category.clone(),
        };
        let saved = match self.relay.save_entry(&request).await {
            Ok(saved) => saved,
            Err(e) if e.is_auth_failure() => {
                return Err(self.after_auth_failure(e, ClipError::SaveRejected).await)
            }
            Err(e) => {
                warn!(error = %e, "save failed");
                return Err(ClipError::Save(e));
            }
        };

        info!(category = %category, "article saved");
        Ok(Clipped {
            summary: summary.summary,
            category,
            page_url: saved.page_url,
        })
    }

    /// Reconcile right away; report the link as lost only if the relay agrees.
    async fn after_auth_failure(
        &self,
        err: RelayError,
        otherwise: fn(RelayError) -> ClipError,
    ) -> ClipError {
        warn!(error = %err, "relay rejected write; rechecking link");
        let result = self.reconciler.reconcile_stored().await;
        match result.outcome {
            ReconcileOutcome::Revoked { .. } | ReconcileOutcome::Unlinked => ClipError::LinkLost,
            ReconcileOutcome::Confirmed { .. } | ReconcileOutcome::Unchanged { .. } => {
                otherwise(err)
            }
        }
    }
}
