//! In-memory object storage
//!
//! Used for local development and as the test double for the workflow:
//! every call is counted and individual operations can be made to fail.

use super::{ObjectInfo, ObjectStore, StoredObject, UploadOptions};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Blob {
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Blob>>,
    calls: AtomicUsize,
    fail_uploads: AtomicBool,
    fail_removes: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Rewrite an object's creation time, for exercising age-based sweeps
    pub async fn set_created_at(&self, bucket: &str, path: &str, created_at: DateTime<Utc>) {
        if let Some(blob) = self
            .objects
            .write()
            .await
            .get_mut(&(bucket.to_string(), path.to_string()))
        {
            blob.created_at = created_at;
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        self.record_call();

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                service: "memory-storage".to_string(),
                message: "upload rejected".to_string(),
            });
        }

        let key = (bucket.to_string(), path.to_string());
        let mut objects = self.objects.write().await;

        if objects.contains_key(&key) && !options.upsert {
            return Err(AppError::Duplicate {
                message: format!("object {}/{} already exists", bucket, path),
            });
        }

        objects.insert(
            key,
            Blob {
                bytes: bytes.to_vec(),
                created_at: Utc::now(),
            },
        );

        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.record_call();

        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .map(|b| b.bytes.clone())
            .ok_or_else(|| AppError::NotFound {
                resource_type: "object".to_string(),
                id: format!("{}/{}", bucket, path),
            })
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        self.record_call();

        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                service: "memory-storage".to_string(),
                message: "remove rejected".to_string(),
            });
        }

        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>> {
        self.record_call();

        let mut objects: Vec<ObjectInfo> = self
            .objects
            .read()
            .await
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, path), blob)| ObjectInfo {
                path: path.clone(),
                size: blob.bytes.len() as u64,
                created_at: Some(blob.created_at),
            })
            .collect();

        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_remove() {
        let store = MemoryObjectStore::new();
        let options = UploadOptions::default();

        store.upload("papers", "a.pdf", b"%PDF-1.4", &options).await.unwrap();
        assert_eq!(store.download("papers", "a.pdf").await.unwrap(), b"%PDF-1.4");

        store.remove("papers", "a.pdf").await.unwrap();
        assert!(store.download("papers", "a.pdf").await.is_err());
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test]
    async fn test_upload_without_upsert_rejects_existing_path() {
        let store = MemoryObjectStore::new();
        let options = UploadOptions::default();

        store.upload("papers", "a.pdf", b"one", &options).await.unwrap();
        let err = store.upload("papers", "a.pdf", b"two", &options).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));

        let upsert = UploadOptions {
            upsert: true,
            ..UploadOptions::default()
        };
        store.upload("papers", "a.pdf", b"two", &upsert).await.unwrap();
        assert_eq!(store.download("papers", "a.pdf").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_bucket() {
        let store = MemoryObjectStore::new();
        let options = UploadOptions::default();

        store.upload("papers", "b.pdf", b"b", &options).await.unwrap();
        store.upload("papers", "a.pdf", b"a", &options).await.unwrap();
        store.upload("other", "c.pdf", b"c", &options).await.unwrap();

        let listed = store.list("papers").await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_injected_upload_failure() {
        let store = MemoryObjectStore::new();
        store.fail_uploads(true);
        assert!(store
            .upload("papers", "a.pdf", b"x", &UploadOptions::default())
            .await
            .is_err());
        assert!(store.is_empty().await);
    }
}
