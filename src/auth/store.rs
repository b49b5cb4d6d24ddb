//! Durable token persistence.
//!
//! One [`TokenRecord`] is stored as pretty JSON at:
//! `~/.config/harvester/token.json` (or `$XDG_CONFIG_HOME/harvester/token.json`).
//! Writes go to a sibling temp file first and are renamed into place, so a
//! reader never observes a half-written record.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::TokenRecord;

const TOKEN_FILE_NAME: &str = "token.json";
const APP_DIR_NAME: &str = "harvester";

/// Errors for persisted token operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error("token store I/O error at {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Stored record could not be decoded.
    #[error("token store at {path} is corrupt: {source}")]
    Corrupt {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// Serialization failed.
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// File-backed store holding a single [`TokenRecord`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store backed by an explicit file path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfigDirUnavailable`] if no usable config dir is found.
    pub fn default_location() -> Result<Self, StoreError> {
        Ok(Self::at(default_token_path()?))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored record.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the file cannot be decoded and
    /// [`StoreError::Io`] if it cannot be read.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<TokenRecord>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("no persisted token record");
                return Ok(None);
            }
            Err(source) => return Err(io_error(&self.path, source)),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Persists `record`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when encoding or any filesystem step fails.
    #[instrument(level = "debug", skip(self, record), fields(path = %self.path.display()))]
    pub fn save(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(record)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(&encoded)
            .and_then(|()| file.sync_all())
            .map_err(|e| io_error(&tmp_path, e))?;
        drop(file);
        set_owner_only_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| io_error(&self.path, e))?;

        debug!(issued_at = record.issued_at(), "persisted token record");
        Ok(())
    }

    /// Removes the stored record. Returns `true` when a file was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when removal fails.
    pub fn clear(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Returns the default token path (`~/.config/harvester/token.json`).
///
/// # Errors
///
/// Returns [`StoreError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_token_path() -> Result<PathBuf, StoreError> {
    Ok(resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )?
    .join(TOKEN_FILE_NAME))
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StoreError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(StoreError::ConfigDirUnavailable)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn set_owner_only_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
