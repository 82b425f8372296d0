//! Writes detector artifacts and the final digest to the blob store, with
//! retry-with-backoff on failure and a dry-run path. spec.md §7
//! (PersistenceError: "retried with exponential backoff, 3 attempts,
//! 1s/4s/16s") and §5 ("idempotence: write-then-rename").

use crate::dataset::blob_store::BlobStore;
use crate::errors::PersistenceError;
use sha2::{Digest as _, Sha256};
use std::sync::Arc;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_SECS: [u64; 3] = [1, 4, 16];

pub struct ArtifactWriter {
    store: Arc<dyn BlobStore>,
    dry_run: bool,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn BlobStore>, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    /// Writes `bytes` to `key`, retrying on failure per spec.md §7. In
    /// dry-run mode the write is logged but never performed, mirroring the
    /// teacher's `execute_or_log`.
    pub async fn persist_or_log(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        if self.dry_run {
            tracing::info!(key, bytes = bytes.len(), hash = %content_hash(bytes), "dry-run: artifact not written");
            return Ok(());
        }

        let mut last_err = None;
        for (attempt, backoff_secs) in BACKOFF_SECS.iter().enumerate() {
            match self.store.put_atomic(key, bytes).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(key, attempt = attempt + 1, error = %e, "artifact write failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS as usize {
                        tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
                    }
                }
            }
        }

        Err(PersistenceError::WriteFailed { key: key.to_string(), attempts: MAX_ATTEMPTS, source: last_err.expect("at least one attempt was made") })
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::blob_store::LocalFsBlobStore;

    #[tokio::test]
    async fn dry_run_never_writes() {
        let dir = tempfile_dir();
        let store = Arc::new(LocalFsBlobStore::new(dir.clone()));
        let writer = ArtifactWriter::new(store.clone(), true);
        writer.persist_or_log("digest.json", b"{}").await.unwrap();
        assert!(!store.exists("digest.json").await);
    }

    #[tokio::test]
    async fn live_write_persists_bytes() {
        let dir = tempfile_dir();
        let store = Arc::new(LocalFsBlobStore::new(dir.clone()));
        let writer = ArtifactWriter::new(store.clone(), false);
        writer.persist_or_log("digest.json", b"{\"ok\":true}").await.unwrap();
        let bytes = store.get("digest.json").await.unwrap();
        assert_eq!(bytes, b"{\"ok\":true}");
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("sentinel-persistence-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
