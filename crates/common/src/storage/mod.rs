//! Object storage for uploaded paper binaries
//!
//! Provides:
//! - The `ObjectStore` trait used by the upload workflow and the reconciler
//! - A Supabase Storage backend
//! - An in-memory backend with call counting and fault injection

mod memory;
mod supabase;

pub use memory::MemoryObjectStore;
pub use supabase::SupabaseObjectStore;

use crate::config::{AppConfig, StorageBackendKind};
use crate::errors::Result;
use crate::supabase::SupabaseClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Options sent with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Cache-Control max-age in seconds, e.g. "3600"
    pub cache_control: String,
    /// Replace an existing object at the same path
    pub upsert: bool,
    pub content_type: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            upsert: false,
            content_type: "application/pdf".to_string(),
        }
    }
}

/// Location of an uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
}

/// Listing entry used by the orphan sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Trait for binary object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `bucket/path`
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<StoredObject>;

    /// Fetch the bytes stored under `bucket/path`
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    /// Delete `bucket/path`; deleting a missing object is not an error
    async fn remove(&self, bucket: &str, path: &str) -> Result<()>;

    /// List every object in a bucket
    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>>;

    /// Backend name for logs
    fn backend_name(&self) -> &str;
}

/// Create an object store based on configuration
pub fn create_object_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackendKind::Supabase => {
            let client = SupabaseClient::new(
                &config.supabase,
                Duration::from_secs(config.storage.timeout_secs),
            )?;
            Ok(Arc::new(SupabaseObjectStore::new(client)))
        }
        StorageBackendKind::Memory => {
            tracing::warn!("Using in-memory object storage; uploads are lost on restart");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
    }
}
