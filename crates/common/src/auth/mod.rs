//! Authentication and session utilities
//!
//! Provides:
//! - Session, user and auth-event types
//! - The `AuthBackend` trait with Supabase GoTrue and in-memory backends
//! - `SessionProvider`, the process-wide session cache and event channel
//! - JWT validation and request extractors

mod extract;
mod memory;
mod provider;
mod supabase;

pub use extract::{bearer_token, CurrentSession, MaybeSession, ACCESS_TOKEN_COOKIE};
pub use memory::MemoryAuth;
pub use provider::SessionProvider;
pub use supabase::SupabaseAuth;

use crate::config::{AppConfig, AuthBackendKind};
use crate::errors::{AppError, Result};
use crate::supabase::SupabaseClient;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Audience Supabase puts on user access tokens
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }
}

/// Result of a sign-up; the session is absent while email confirmation is pending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUp {
    pub user: User,
    pub session: Option<Session>,
}

/// Auth state change broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user: User },
    SignedUp { user: User },
    SignedOut { user_id: Uuid },
}

/// Email/password pair submitted to sign-in and sign-up
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

/// Session store contract
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp>;

    /// Revoke the session behind `access_token`
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Resolve the user behind an access token
    async fn get_user(&self, access_token: &str) -> Result<User>;

    /// Backend name for logs
    fn backend_name(&self) -> &str;
}

/// Access token claims, compatible with Supabase-issued tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    #[serde(default)]
    pub email: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    #[serde(default)]
    pub aud: Option<String>,

    #[serde(default)]
    pub role: Option<String>,
}

impl JwtClaims {
    pub fn user(&self) -> Result<User> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| AppError::Unauthorized {
            message: "Token subject is not a user id".to_string(),
        })?;
        Ok(User {
            id,
            email: self.email.clone(),
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new access token for `user`
    pub fn generate_token(&self, user: &User) -> Result<(String, JwtClaims)> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            aud: Some(AUTHENTICATED_AUDIENCE.to_string()),
            role: Some(AUTHENTICATED_AUDIENCE.to_string()),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            AppError::Internal {
                message: format!("Failed to generate token: {}", e),
            }
        })?;
        Ok((token, claims))
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid access token".to_string(),
                },
            })
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim without checking the signature.
///
/// Only bounds how long a session resolved by the backend is cached; the
/// backend has already vouched for the token itself.
pub fn unverified_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
}

/// Argon2id hash of `password` as a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::Internal {
        message: format!("Failed to encode password salt: {}", e),
    })?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Check `password` against a PHC string from `hash_password`
pub fn verify_password(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Random hex token, used for refresh tokens and dev secrets
pub fn generate_secret() -> String {
    let random_bytes: [u8; 32] = rand::random();
    hex::encode(random_bytes)
}

/// Build the session provider selected by configuration
pub fn create_session_provider(config: &AppConfig) -> Result<SessionProvider> {
    let jwt_secret = config.supabase.jwt_secret.clone();
    let cache_ttl = std::time::Duration::from_secs(config.auth.session_cache_secs);

    match config.auth.backend {
        AuthBackendKind::Supabase => {
            let client = SupabaseClient::new(
                &config.supabase,
                std::time::Duration::from_secs(config.storage.timeout_secs),
            )?;
            let backend: Arc<dyn AuthBackend> = Arc::new(SupabaseAuth::new(client));
            let jwt = jwt_secret.map(|s| JwtManager::new(&s, config.auth.token_ttl_secs));
            Ok(SessionProvider::new(backend, jwt).with_cache_ttl(cache_ttl))
        }
        AuthBackendKind::Memory => {
            let secret = jwt_secret.unwrap_or_else(|| {
                tracing::warn!("No JWT secret configured; using a per-process secret");
                generate_secret()
            });
            let backend: Arc<dyn AuthBackend> = Arc::new(MemoryAuth::new(JwtManager::new(
                &secret,
                config.auth.token_ttl_secs,
            )));
            Ok(SessionProvider::new(
                backend,
                Some(JwtManager::new(&secret, config.auth.token_ttl_secs)),
            )
            .with_cache_ttl(cache_ttl))
        }
    }
}
