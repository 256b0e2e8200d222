pub mod kv;

pub use kv::{KvStore, MemoryKv, SqliteKv};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/noted[-dev]/` based on NOTED_ENV.
///
/// Set NOTED_ENV=dev to use the development data directory, or
/// NOTED_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("NOTED_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("NOTED_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("noted-dev")
            } else {
                base_dir.join("noted")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
