//! The durable record binding this installation to a workspace account.
//!
//! Local id format: "noted-<16 hex chars>", a digest of a fresh installation
//! seed and the host name. It is a placeholder key only and is never sent
//! to the relay as a credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const LOCAL_ID_PREFIX: &str = "noted-";
const LOCAL_ID_HEX_LEN: usize = 16;

/// One candidate binding between this installation and a remote account.
///
/// `confirmed == true` means a status check observed exactly `remote_id` as
/// linked at `last_checked_at`. A cached `remote_id` with `confirmed == false`
/// is a candidate only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkIdentity {
    pub local_id: String,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl LinkIdentity {
    /// A fresh, unlinked identity with a newly generated local id.
    pub fn generate() -> Self {
        Self::with_local_id(generate_local_id())
    }

    pub fn with_local_id(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: None,
            confirmed: false,
            last_checked_at: None,
        }
    }

    /// The id to use for outgoing calls, if any.
    ///
    /// Only a confirmed remote id qualifies; the local id is never used.
    pub fn active_remote_id(&self) -> Option<&str> {
        if self.confirmed {
            self.remote_id.as_deref()
        } else {
            None
        }
    }

    /// Confirmed remote id, used as the watcher's baseline.
    pub fn confirmed_remote_id(&self) -> Option<String> {
        self.active_remote_id().map(str::to_string)
    }

    pub fn confirm(&self, remote_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            local_id: self.local_id.clone(),
            remote_id: Some(remote_id.to_string()),
            confirmed: true,
            last_checked_at: Some(at),
        }
    }

    /// Same local id, no candidate.
    pub fn without_candidate(&self) -> Self {
        Self::with_local_id(self.local_id.clone())
    }
}

/// Derive a new local id from a random installation seed.
pub fn generate_local_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    if let Ok(host) = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        hasher.update(host.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}{}", LOCAL_ID_PREFIX, &digest[..LOCAL_ID_HEX_LEN])
}

/// Shorten an identifier for log output.
pub fn redact(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
