//! Durable link state.
//!
//! The whole [`LinkIdentity`] is one JSON document under one key, so a
//! reader can never pair `confirmed` with a `remote_id` from another write.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::identity::{redact, LinkIdentity};
use super::session::LinkSession;
use crate::error::StoreError;
use crate::storage::KvStore;

const IDENTITY_KEY: &str = "link.identity";
const SESSION_KEY: &str = "link.session";
const CREDENTIAL_KEY: &str = "credential.validated";

/// Link state over any [`KvStore`], shared by every context in the process.
pub struct LinkStateStore {
    kv: Arc<dyn KvStore>,
    /// Ephemeral identity used after a storage failure, for this process only.
    fallback: Mutex<Option<LinkIdentity>>,
}

impl LinkStateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            fallback: Mutex::new(None),
        }
    }

    /// Last saved identity, or a freshly generated one if none exists.
    ///
    /// Never fails: a broken backend yields an in-memory identity that stays
    /// stable until the process exits.
    pub fn load(&self) -> LinkIdentity {
        match self.read_identity() {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                let identity = LinkIdentity::generate();
                debug!(local_id = %redact(&identity.local_id), "generated new local identity");
                if let Err(e) = self.save(&identity) {
                    warn!(error = %e, "could not persist new identity; using ephemeral copy");
                    return self.ephemeral(Some(identity));
                }
                identity
            }
            Err(e) => {
                warn!(error = %e, "link state unreadable; using ephemeral identity");
                self.ephemeral(None)
            }
        }
    }

    /// Persist the identity as a single atomic write.
    ///
    /// # Errors
    /// Returns an error if the value cannot be encoded or written. The
    /// ephemeral fallback is updated either way.
    pub fn save(&self, identity: &LinkIdentity) -> Result<(), StoreError> {
        if let Ok(mut fallback) = self.fallback.lock() {
            if fallback.is_some() {
                *fallback = Some(identity.clone());
            }
        }
        let json = serde_json::to_string(identity)?;
        self.kv.set(IDENTITY_KEY, &json)
    }

    /// Drop the link, generate a new local id, persist and return it.
    pub fn reset(&self) -> LinkIdentity {
        let identity = LinkIdentity::generate();
        if let Err(e) = self.save(&identity) {
            warn!(error = %e, "could not persist reset identity; using ephemeral copy");
            return self.ephemeral(Some(identity));
        }
        identity
    }

    pub fn credential_valid(&self) -> bool {
        match self.kv.get(CREDENTIAL_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "credential flag unreadable; treating as not validated");
                false
            }
        }
    }

    /// Set or clear the validated-credential flag.
    pub fn set_credential_valid(&self, valid: bool) -> Result<(), StoreError> {
        if valid {
            self.kv.set(CREDENTIAL_KEY, "true")
        } else {
            self.kv.delete(CREDENTIAL_KEY)
        }
    }

    /// Latest session checkpoint, if any.
    pub fn load_session(&self) -> Option<LinkSession> {
        match self.kv.get(SESSION_KEY) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable session checkpoint");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "session checkpoint unreadable");
                None
            }
        }
    }

    pub fn save_session(&self, session: &LinkSession) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        self.kv.set(SESSION_KEY, &json)
    }

    fn read_identity(&self) -> Result<Option<LinkIdentity>, StoreError> {
        if let Ok(fallback) = self.fallback.lock() {
            if let Some(identity) = fallback.as_ref() {
                return Ok(Some(identity.clone()));
            }
        }
        let Some(json) = self.kv.get(IDENTITY_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: IDENTITY_KEY.to_string(),
                source,
            })
    }

    fn ephemeral(&self, seed: Option<LinkIdentity>) -> LinkIdentity {
        let Ok(mut fallback) = self.fallback.lock() else {
            return seed.unwrap_or_else(LinkIdentity::generate);
        };
        if let Some(identity) = seed {
            *fallback = Some(identity);
        }
        fallback.get_or_insert_with(LinkIdentity::generate).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::session::SessionStatus;
    use crate::storage::{MemoryKv, SqliteKv};

    /// Backend whose every call fails.
    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Locked)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Locked)
        }
        fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Locked)
        }
    }

    fn memory_store() -> LinkStateStore {
        LinkStateStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_load_generates_and_persists_identity() {
        let store = memory_store();
        let first = store.load();
        assert!(first.remote_id.is_none());
        assert!(!first.confirmed);

        // Stable across loads.
        assert_eq!(store.load(), first);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store = LinkStateStore::new(Arc::new(SqliteKv::open_memory().unwrap()));
        let identity = store.load().confirm("u-9", chrono::Utc::now());
        store.save(&identity).unwrap();
        assert_eq!(store.load(), identity);
    }

    #[test]
    fn test_reset_regenerates_local_id() {
        let store = memory_store();
        let linked = store.load().confirm("u-1", chrono::Utc::now());
        store.save(&linked).unwrap();

        let fresh = store.reset();
        assert_ne!(fresh.local_id, linked.local_id);
        assert!(fresh.remote_id.is_none());
        assert!(!fresh.confirmed);
        assert_eq!(store.load(), fresh);
    }

    #[test]
    fn test_broken_backend_falls_back_to_stable_ephemeral_identity() {
        let store = LinkStateStore::new(Arc::new(BrokenKv));
        let first = store.load();
        let second = store.load();
        assert_eq!(first, second);

        // Saves are reflected in-process even though the write fails.
        let linked = first.confirm("u-2", chrono::Utc::now());
        assert!(store.save(&linked).is_err());
        assert_eq!(store.load(), linked);
    }

    #[test]
    fn test_corrupt_document_falls_back() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(IDENTITY_KEY, "{not json").unwrap();
        let store = LinkStateStore::new(kv);
        let identity = store.load();
        assert!(!identity.confirmed);
        assert_eq!(store.load(), identity);
    }

    #[test]
    fn test_credential_flag_independent_of_identity() {
        let store = memory_store();
        assert!(!store.credential_valid());
        store.set_credential_valid(true).unwrap();
        assert!(store.credential_valid());

        store.reset();
        assert!(store.credential_valid());

        store.set_credential_valid(false).unwrap();
        assert!(!store.credential_valid());
    }

    #[test]
    fn test_session_checkpoint() {
        let store = memory_store();
        assert!(store.load_session().is_none());

        let mut session = LinkSession::new(3, 100, None);
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session(), Some(session.clone()));

        session.finish(SessionStatus::Cancelled);
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap().status, SessionStatus::Cancelled);
    }
}
