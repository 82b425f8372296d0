use crate::errors::BlobError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// The out-of-scope external blob-store client, reduced to the small
/// interface this crate actually calls (spec.md §1, §6). `get`/`put` mirror
/// object-store semantics; `put_atomic` is the write-then-rename primitive
/// spec.md §5 requires for idempotent reruns.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
    async fn exists(&self, key: &str) -> bool;
    async fn put_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;
}

/// Reference implementation backed by a local directory tree. Good enough to
/// drive the CLI end to end without a real object-store dependency; a
/// production deployment would swap this for an S3/GCS-backed `BlobStore`
/// (see `config::S3Config` in the teacher's `config.rs` for the shape such a
/// client's credentials would take).
pub struct LocalFsBlobStore {
    root: PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound(key.to_string())
            } else {
                BlobError::Io { key: key.to_string(), message: e.to_string() }
            }
        })
    }

    async fn exists(&self, key: &str) -> bool {
        tokio::fs::metadata(self.resolve(key)).await.is_ok()
    }

    async fn put_atomic(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| BlobError::Io {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        }
        let tmp_path = tmp_sibling(&path);
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| BlobError::Io {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| BlobError::Io {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = std::env::temp_dir().join(format!("sentinel-test-{}", uuid::Uuid::new_v4()));
        let store = LocalFsBlobStore::new(&dir);
        store.put_atomic("a/b.json", b"hello").await.unwrap();
        assert!(store.exists("a/b.json").await);
        let bytes = store.get("a/b.json").await.unwrap();
        assert_eq!(bytes, b"hello");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rerun_overwrites_atomically() {
        let dir = std::env::temp_dir().join(format!("sentinel-test-{}", uuid::Uuid::new_v4()));
        let store = LocalFsBlobStore::new(&dir);
        store.put_atomic("digest.json", b"{\"v\":1}").await.unwrap();
        store.put_atomic("digest.json", b"{\"v\":2}").await.unwrap();
        let bytes = store.get("digest.json").await.unwrap();
        assert_eq!(bytes, b"{\"v\":2}");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = std::env::temp_dir().join(format!("sentinel-test-{}", uuid::Uuid::new_v4()));
        let store = LocalFsBlobStore::new(&dir);
        let err = store.get("nope.json").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }
}
