//! Shared HTTP client for the Supabase REST, storage, and auth APIs

use crate::config::SupabaseConfig;
use crate::errors::{AppError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Thin wrapper around `reqwest::Client` that knows the project URL and keys
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_key: Option<String>,
}

impl SupabaseClient {
    /// Create a client from configuration
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<Self> {
        let base_url = config.url.clone().ok_or_else(|| AppError::Configuration {
            message: "supabase.url is not set".to_string(),
        })?;
        let anon_key = config.anon_key.clone().ok_or_else(|| AppError::Configuration {
            message: "supabase.anon_key is not set".to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_key: config.service_key.clone(),
        })
    }

    /// Absolute URL for an API path such as `/rest/v1/papers`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request authorised with the service key (falls back to the anon key)
    pub fn service_request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.service_key.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Request carrying only the anon key, optionally acting as a user
    pub fn user_request(&self, method: Method, path: &str, access_token: Option<&str>) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }
}

/// Turn a non-success response into an `Upstream` error carrying the body
pub async fn ensure_success(response: Response, service: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(upstream_error(service, status, &body))
}

pub(crate) fn upstream_error(service: &str, status: StatusCode, body: &str) -> AppError {
    AppError::Upstream {
        service: service.to_string(),
        message: format!("HTTP {}: {}", status, body),
    }
}
