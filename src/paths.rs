//! Path utilities for a node's home directory.
//!
//! # Home
//! - [`default_home_dir`] - `NODEWARDEN_HOME`, falling back to `~/.nodewarden/`
//!
//! # Derived directories
//! - [`data_dir`] - `<home>/data/` (index and cluster state)
//! - [`logs_dir`] - `<home>/logs/` (node logs)

use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{Error, Result};

/// Get the default home directory.
///
/// Resolution order:
/// 1. `NODEWARDEN_HOME` environment variable (if set and non-empty)
/// 2. `~/.nodewarden/`
pub fn default_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(constants::HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::configuration("failed to determine user home directory"))?;
    Ok(home.join(".nodewarden"))
}

/// Data directory below a home: `<home>/data/`
pub fn data_dir(home: &Path) -> PathBuf {
    home.join("data")
}

/// Log directory below a home: `<home>/logs/`
pub fn logs_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

/// Resolve `path` to an existing, writable directory.
///
/// Relative paths are resolved against the current directory. Writability is
/// checked by creating and removing a temporary file inside the directory.
pub fn resolve_writable_dir(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_relative() {
        std::env::current_dir()
            .map_err(|e| Error::io("resolving current directory", e))?
            .join(path)
    } else {
        path.to_path_buf()
    };

    if !absolute.exists() {
        return Err(Error::home_path(&absolute, "does not exist"));
    }
    if !absolute.is_dir() {
        return Err(Error::home_path(&absolute, "is not a directory"));
    }

    tempfile::NamedTempFile::new_in(&absolute)
        .map_err(|_| Error::home_path(&absolute, "is not writable"))?;

    absolute
        .canonicalize()
        .map_err(|e| Error::io(format!("canonicalizing {}", absolute.display()), e))
}
