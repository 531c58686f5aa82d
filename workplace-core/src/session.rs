//! Persisted session of the signed-in user.
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::io::ErrorKind;
use std::path::Path;

use crate::error::{io_err, StoreError};
use crate::paths::{ensure_root, home, session_path, write_atomic};
use crate::types::Session;

/// Load the session from `<home>/.workplace/session.yaml`.
///
/// Returns `StoreError::SessionNotFound` if absent,
/// `StoreError::Parse` (with path) if malformed.
pub fn load_at(home: &Path) -> Result<Session, StoreError> {
    let path = session_path(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StoreError::SessionNotFound { path });
        }
        Err(err) => return Err(io_err(&path, err)),
    };
    serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Session, StoreError> {
    load_at(&home()?)
}

/// Atomically persist `session`, replacing any previous one.
pub fn save_at(home: &Path, session: &Session) -> Result<(), StoreError> {
    ensure_root(home)?;
    let yaml = serde_yaml::to_string(session)?;
    write_atomic(&session_path(home), &yaml)
}

/// `save_at` convenience wrapper.
pub fn save(session: &Session) -> Result<(), StoreError> {
    save_at(&home()?, session)
}

/// Remove the persisted session. Returns `false` if there was none.
pub fn clear_at(home: &Path) -> Result<bool, StoreError> {
    let path = session_path(home);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(&path, err)),
    }
}

/// `clear_at` convenience wrapper.
pub fn clear() -> Result<bool, StoreError> {
    clear_at(&home()?)
}
