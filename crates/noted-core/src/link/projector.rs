//! User-facing link status, derived from state only.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::LinkIdentity;
use super::session::LinkSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Linked,
    NotLinked,
    Linking,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Linked => "linked",
            StatusLabel::NotLinked => "not linked",
            StatusLabel::Linking => "linking…",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    /// Whether the summarize-and-save action may be offered.
    pub can_act: bool,
    pub label: StatusLabel,
}

/// Project link state and the credential flag onto UI affordances.
///
/// Pure: same inputs, same output.
pub fn project(
    identity: &LinkIdentity,
    credential_valid: bool,
    session: Option<&LinkSession>,
) -> Projection {
    let label = if session.is_some_and(LinkSession::is_pending) {
        StatusLabel::Linking
    } else if identity.confirmed {
        StatusLabel::Linked
    } else {
        StatusLabel::NotLinked
    };
    Projection {
        can_act: identity.confirmed && credential_valid,
        label,
    }
}
