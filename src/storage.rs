use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

/// Durable blob storage keyed by a relative path. The production
/// implementation writes to a configured directory on local disk; tests swap
/// in an in-memory fake.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Removes a blob. Returns `false` if it was already absent, which the
    /// delete paths treat as success.
    async fn remove(&self, path: &str) -> Result<bool>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        // Stored paths are generated, not user-supplied, but refuse traversal
        // anyway.
        if relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_)))
        {
            bail!("invalid stored file path: {path}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create upload directory {}", parent.display()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write blob {}", full.display()))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read blob {}", full.display()))
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove blob {}", full.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FileStore, LocalFileStore};

    #[tokio::test]
    async fn writes_reads_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.put("a/b.pdf", b"content".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b.pdf").await.unwrap(), b"content");

        assert!(store.remove("a/b.pdf").await.unwrap());
        assert!(!store.remove("a/b.pdf").await.unwrap());
        assert!(store.get("a/b.pdf").await.is_err());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        assert!(store.put("../escape.txt", vec![1]).await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }
}
