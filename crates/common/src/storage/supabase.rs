//! Supabase Storage backend

use super::{ObjectInfo, ObjectStore, StoredObject, UploadOptions};
use crate::errors::{AppError, Result};
use crate::supabase::{ensure_success, SupabaseClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE: &str = "supabase-storage";
const LIST_PAGE_SIZE: usize = 1000;

pub struct SupabaseObjectStore {
    client: SupabaseClient,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: Vec<&'a str>,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    // Folders come back with a null id
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<EntryMetadata>,
}

#[derive(Deserialize)]
struct EntryMetadata {
    #[serde(default)]
    size: u64,
}

impl SupabaseObjectStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn object_path(bucket: &str, path: &str) -> String {
        format!("/storage/v1/object/{}/{}", bucket, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        let response = self
            .client
            .service_request(Method::POST, &Self::object_path(bucket, path))
            .header("cache-control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .header("content-type", &options.content_type)
            .body(bytes.to_vec())
            .send()
            .await?;

        let response = ensure_success(response, SERVICE).await?;
        let body: UploadResponse = response.json().await?;

        debug!(bucket, path, key = ?body.key, size = bytes.len(), "Object uploaded");

        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .service_request(Method::GET, &Self::object_path(bucket, path))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound {
                resource_type: "object".to_string(),
                id: format!("{}/{}", bucket, path),
            });
        }

        let response = ensure_success(response, SERVICE).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let response = self
            .client
            .service_request(Method::DELETE, &format!("/storage/v1/object/{}", bucket))
            .json(&RemoveRequest {
                prefixes: vec![path],
            })
            .send()
            .await?;

        ensure_success(response, SERVICE).await?;
        debug!(bucket, path, "Object removed");
        Ok(())
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut offset = 0;

        loop {
            let response = self
                .client
                .service_request(Method::POST, &format!("/storage/v1/object/list/{}", bucket))
                .json(&ListRequest {
                    prefix: "",
                    limit: LIST_PAGE_SIZE,
                    offset,
                    sort_by: SortBy {
                        column: "name",
                        order: "asc",
                    },
                })
                .send()
                .await?;

            let page: Vec<ListEntry> = ensure_success(response, SERVICE).await?.json().await?;
            let page_len = page.len();

            objects.extend(page.into_iter().filter(|e| e.id.is_some()).map(|e| ObjectInfo {
                path: e.name,
                size: e.metadata.map(|m| m.size).unwrap_or(0),
                created_at: e.created_at,
            }));

            if page_len < LIST_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        Ok(objects)
    }

    fn backend_name(&self) -> &str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path() {
        assert_eq!(
            SupabaseObjectStore::object_path("papers", "/abc.pdf"),
            "/storage/v1/object/papers/abc.pdf"
        );
    }

    #[test]
    fn test_list_entry_parsing() {
        let entries: Vec<ListEntry> = serde_json::from_value(serde_json::json!([
            {"name": "a.pdf", "id": "1", "created_at": "2024-01-01T00:00:00Z", "metadata": {"size": 42}},
            {"name": "folder", "id": null, "created_at": null, "metadata": null}
        ]))
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].metadata.as_ref().map(|m| m.size), Some(42));
        assert!(entries[1].id.is_none());
    }
}
