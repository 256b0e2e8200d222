//! Summarization API key held in the OS keyring.
//!
//! The key itself never touches the kv store or the logs; only the
//! "validated" flag lives beside the link state.

use thiserror::Error;

use crate::error::CoreError;
use crate::link::store::LinkStateStore;

const SERVICE: &str = "noted";
const API_KEY_ENTRY: &str = "openai_api_key";

/// Overrides the keyring lookup when set (useful on headless machines).
pub const API_KEY_ENV: &str = "NOTED_API_KEY";

const API_KEY_PREFIX: &str = "sk-";
const MIN_API_KEY_LEN: usize = 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyFormatError {
    #[error("API key is empty")]
    Empty,
    #[error("API key must start with 'sk-'")]
    MissingPrefix,
    #[error("API key is too short (expected at least 20 characters)")]
    TooShort,
    #[error("API key must not contain whitespace")]
    Whitespace,
}

/// Local format check; does not contact the provider.
pub fn validate_api_key(key: &str) -> Result<(), KeyFormatError> {
    if key.is_empty() {
        return Err(KeyFormatError::Empty);
    }
    if key.chars().any(char::is_whitespace) {
        return Err(KeyFormatError::Whitespace);
    }
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(KeyFormatError::MissingPrefix);
    }
    if key.chars().count() < MIN_API_KEY_LEN {
        return Err(KeyFormatError::TooShort);
    }
    Ok(())
}

/// Thin wrapper around the OS keyring for the API key.
pub mod keyring_store {
    use super::{API_KEY_ENTRY, SERVICE};

    pub fn get() -> Result<Option<String>, keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set(value: &str) -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
        entry.set_password(value)
    }

    pub fn delete() -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The API key from `NOTED_API_KEY`, else from the keyring.
pub fn api_key() -> Result<Option<String>, CoreError> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(Some(key.trim().to_string()));
        }
    }
    Ok(keyring_store::get()?)
}

/// Check, store and flag a new key. A key that fails the check clears the flag.
pub fn store_api_key(store: &LinkStateStore, key: &str) -> Result<(), CoreError> {
    let key = key.trim();
    if let Err(e) = validate_api_key(key) {
        store.set_credential_valid(false)?;
        return Err(CoreError::Credential(e));
    }
    keyring_store::set(key)?;
    store.set_credential_valid(true)?;
    Ok(())
}

/// Remove the stored key and clear the flag.
pub fn clear_api_key(store: &LinkStateStore) -> Result<(), CoreError> {
    store.set_credential_valid(false)?;
    keyring_store::delete()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use std::sync::Arc;

    #[test]
    fn test_accepts_well_formed_keys() {
        assert!(validate_api_key("sk-abcdefghijklmnopqrstuvwxyz").is_ok());
        assert!(validate_api_key("sk-proj-0123456789ABCDEF").is_ok());
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert_eq!(validate_api_key(""), Err(KeyFormatError::Empty));
        assert_eq!(
            validate_api_key("pk-abcdefghijklmnopqrstuvwxyz"),
            Err(KeyFormatError::MissingPrefix)
        );
        assert_eq!(validate_api_key("sk-short"), Err(KeyFormatError::TooShort));
        assert_eq!(
            validate_api_key("sk-abcdefghij klmnopqrstuvwxyz"),
            Err(KeyFormatError::Whitespace)
        );
    }

    #[test]
    fn test_invalid_key_clears_flag_without_touching_keyring() {
        let store = LinkStateStore::new(Arc::new(MemoryKv::new()));
        store.set_credential_valid(true).unwrap();
        let err = store_api_key(&store, "not-a-key").unwrap_err();
        assert!(matches!(err, CoreError::Credential(KeyFormatError::MissingPrefix)));
        assert!(!store.credential_valid());
    }
}
