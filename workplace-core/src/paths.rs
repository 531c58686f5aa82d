//! On-disk layout of persisted client state.
//!
//! ```text
//! ~/.workplace/
//!   session.yaml   (mode 0600, written on login, removed on logout)
//!   config.yaml    (mode 0600, optional; defaults apply when absent)
//! ```

use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};

pub const SESSION_FILE: &str = "session.yaml";
pub const CONFIG_FILE: &str = "config.yaml";

pub fn workplace_root(home: &Path) -> PathBuf {
    home.join(".workplace")
}

pub fn session_path(home: &Path) -> PathBuf {
    workplace_root(home).join(SESSION_FILE)
}

pub fn config_path(home: &Path) -> PathBuf {
    workplace_root(home).join(CONFIG_FILE)
}

/// Resolve the current user's home directory.
pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

/// Create `<home>/.workplace/` (mode `0700`) if it does not yet exist.
pub(crate) fn ensure_root(home: &Path) -> Result<PathBuf, StoreError> {
    let dir = workplace_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// Atomically write `contents` to `path`: `.tmp` sibling, `chmod 0600`, rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
