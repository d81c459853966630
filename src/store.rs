//! Mock file storage.
//!
//! The resolver reads mock files through [`MockStore`] so tests can swap
//! the filesystem for something that fails on demand.

use crate::error::ResolveError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Read access to mock files, addressed relative to a root directory.
#[async_trait]
pub trait MockStore: Send + Sync {
    /// Directory mock file names are resolved against.
    fn root(&self) -> &Path;

    /// Read a file. `Ok(None)` when it does not exist.
    async fn read(&self, relative: &str) -> Result<Option<Vec<u8>>, ResolveError>;

    /// Whether a regular file exists.
    async fn exists(&self, relative: &str) -> Result<bool, ResolveError>;
}

/// [`MockStore`] over a directory on disk.
#[derive(Debug, Clone)]
pub struct FsMockStore {
    root: PathBuf,
}

impl FsMockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a relative name onto the root. Names escaping the root with
    /// `..` resolve to `None`.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl MockStore for FsMockStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, relative: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        let Some(path) = self.resolve(relative) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ResolveError::Io { path, source }),
        }
    }

    async fn exists(&self, relative: &str) -> Result<bool, ResolveError> {
        let Some(path) = self.resolve(relative) else {
            return Ok(false);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ResolveError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/ace.json"), b"{\"ace\":1}").unwrap();
        let store = FsMockStore::new(dir.path());

        assert!(store.exists("nested/ace.json").await.unwrap());
        assert!(store.exists("/nested/ace.json").await.unwrap());
        assert!(!store.exists("nested/king.json").await.unwrap());
        assert!(!store.exists("nested").await.unwrap());

        let bytes = store.read("nested/ace.json").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"{\"ace\":1}"[..]));
        assert_eq!(store.read("missing.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parent_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMockStore::new(dir.path().join("mocks"));
        std::fs::create_dir(store.root()).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

        assert_eq!(store.read("../secret.txt").await.unwrap(), None);
        assert!(!store.exists("../secret.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_reading_a_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let store = FsMockStore::new(dir.path());

        assert!(matches!(
            store.read("nested").await,
            Err(ResolveError::Io { .. })
        ));
    }
}
