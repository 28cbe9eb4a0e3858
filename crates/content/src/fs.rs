//! Filesystem-backed content store.
//!
//! Blobs live under `<root>/<first two hex chars>/<id>`. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader never observes a partially written blob.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use crate::hash::ContentHash;
use crate::store::{locator, ContentDigest, ContentError, ContentStore, Result, StoredContent};

pub struct FsContentStore {
    root: PathBuf,
    public_base: String,
    tmp_counter: AtomicU64,
}

impl FsContentStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>, public_base: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_base: public_base.into(),
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredContent> {
        let hash = ContentHash::from_data(bytes);
        let target = self.blob_path(&hash);
        let id = hash.to_hex();

        if fs::try_exists(&target).await? {
            tracing::debug!(content_id = %id, "content already stored");
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
            let tmp = target.with_extension(format!("{}.{seq}.tmp", std::process::id()));
            fs::write(&tmp, bytes).await?;
            if let Err(err) = fs::rename(&tmp, &target).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(err.into());
            }
            tracing::debug!(content_id = %id, size = bytes.len(), "stored content");
        }

        Ok(StoredContent {
            path: locator(&self.public_base, &id),
            size: bytes.len() as u64,
            id,
        })
    }

    async fn hash_only(&self, bytes: &[u8]) -> Result<ContentDigest> {
        Ok(ContentDigest {
            id: ContentHash::from_data(bytes).to_hex(),
            size: bytes.len() as u64,
        })
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let hash = ContentHash::from_hex(id).map_err(|_| ContentError::InvalidId(id.to_string()))?;
        match fs::read(self.blob_path(&hash)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_then_fetch() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::open(dir.path().join("content"), "/content")
            .await
            .unwrap();

        let stored = store.store(b"hello").await.unwrap();
        assert_eq!(stored.size, 5);
        assert_eq!(store.fetch(&stored.id).await.unwrap(), b"hello");

        let digest = store.hash_only(b"hello").await.unwrap();
        assert_eq!(digest.id, stored.id);
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::open(dir.path(), "/content").await.unwrap();

        let a = store.store(b"twice").await.unwrap();
        let b = store.store(b"twice").await.unwrap();
        assert_eq!(a, b);

        let shard = dir.path().join(&a.id[..2]);
        let mut entries = std::fs::read_dir(shard).unwrap();
        assert!(entries.next().is_some());
        assert!(entries.next().is_none(), "no temporary files left behind");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_hex_ids() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::open(dir.path(), "/content").await.unwrap();

        assert!(matches!(
            store.fetch("../secret").await,
            Err(ContentError::InvalidId(_))
        ));
        assert!(matches!(
            store.fetch(&"ab".repeat(32)).await,
            Err(ContentError::NotFound(_))
        ));
    }
}
