//! Per-run output directory and page files.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::identifier::ResourceId;

/// Highest numeric suffix tried for the run directory.
const MAX_DIR_SUFFIX: u32 = 10_000;

/// Output could not be written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem I/O failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Every candidate directory name is already taken.
    #[error("no free output directory name for {base}")]
    NoFreeName {
        /// The base directory name.
        base: PathBuf,
    },
}

impl PersistenceError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Writes one file per page into a directory owned by the run.
#[derive(Debug, Clone)]
pub struct PersistenceSink {
    dir: PathBuf,
}

impl PersistenceSink {
    /// Creates the run directory under `parent`.
    ///
    /// The directory is named after `resource`; if that name exists, `_1`,
    /// `_2`, ... are tried in order. Creation is atomic, so two runs never
    /// share a directory.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if `parent` cannot be created or no free
    /// name is found.
    #[instrument(level = "debug", fields(parent = %parent.display(), resource_id = %resource))]
    pub fn prepare(parent: &Path, resource: ResourceId) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;

        let base_name = resource.to_string();
        let candidates = std::iter::once(base_name.clone())
            .chain((1..=MAX_DIR_SUFFIX).map(|i| format!("{base_name}_{i}")));

        for name in candidates {
            let dir = parent.join(&name);
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    info!(dir = %dir.display(), "created output directory");
                    return Ok(Self { dir });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(dir = %dir.display(), "output directory exists, trying next suffix");
                }
                Err(error) => return Err(PersistenceError::io(dir, error)),
            }
        }

        Err(PersistenceError::NoFreeName {
            base: parent.join(base_name),
        })
    }

    /// The run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a page is written to: `pg<page>.json`.
    #[must_use]
    pub fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join(format!("pg{page}.json"))
    }

    /// Writes `payload` for `page` and returns the file path.
    ///
    /// The payload goes to a temporary sibling first and is renamed into
    /// place, so the final file never holds partial content.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] on any filesystem failure.
    pub async fn write(&self, page: u32, payload: &str) -> Result<PathBuf, PersistenceError> {
        let path = self.page_path(page);
        let tmp_path = self.dir.join(format!(".pg{page}.json.part"));

        tokio::fs::write(&tmp_path, payload.as_bytes())
            .await
            .map_err(|e| PersistenceError::io(&tmp_path, e))?;
        if let Err(error) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(PersistenceError::io(&path, error));
        }

        debug!(page, path = %path.display(), bytes = payload.len(), "page saved");
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_prepare_uses_resource_id_then_suffixes() {
        let root = TempDir::new().unwrap();
        let id = ResourceId::new(4242);

        let first = PersistenceSink::prepare(root.path(), id).unwrap();
        let second = PersistenceSink::prepare(root.path(), id).unwrap();
        let third = PersistenceSink::prepare(root.path(), id).unwrap();

        assert_eq!(first.dir(), root.path().join("4242"));
        assert_eq!(second.dir(), root.path().join("4242_1"));
        assert_eq!(third.dir(), root.path().join("4242_2"));
    }

    #[test]
    fn test_prepare_creates_missing_parent() {
        let root = TempDir::new().unwrap();
        let parent = root.path().join("a").join("b");
        let sink = PersistenceSink::prepare(&parent, ResourceId::new(1)).unwrap();
        assert!(sink.dir().is_dir());
    }

    #[tokio::test]
    async fn test_write_page_file() {
        let root = TempDir::new().unwrap();
        let sink = PersistenceSink::prepare(root.path(), ResourceId::new(9)).unwrap();

        let path = sink.write(12, r#"[{"page":12}]"#).await.unwrap();

        assert_eq!(path, root.path().join("9").join("pg12.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"[{"page":12}]"#);
        let leftovers: Vec<_> = std::fs::read_dir(sink.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_write_into_removed_directory_fails() {
        let root = TempDir::new().unwrap();
        let sink = PersistenceSink::prepare(root.path(), ResourceId::new(3)).unwrap();
        std::fs::remove_dir(sink.dir()).unwrap();

        let err = sink.write(1, "[]").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }
}
