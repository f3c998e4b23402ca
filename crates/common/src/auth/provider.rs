//! Process-wide session provider
//!
//! Resolves access tokens to sessions (cache, then local JWT validation, then
//! the backend) and broadcasts auth state changes to subscribers.
//!
//! A cached session is trusted until the cache TTL or the token's own expiry,
//! whichever comes first. After that the token is checked again, so a
//! revocation made at the backend shows up within one TTL.

use super::{unverified_expiry, AuthBackend, AuthEvent, JwtManager, Session, SignUp};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CachedSession {
    session: Session,
    fresh_until: DateTime<Utc>,
}

pub struct SessionProvider {
    backend: Arc<dyn AuthBackend>,
    jwt: Option<JwtManager>,
    cache_ttl: chrono::Duration,
    sessions: RwLock<HashMap<String, CachedSession>>,
    // signed-out tokens that would still pass local validation, with their expiry
    revoked: RwLock<HashMap<String, Option<DateTime<Utc>>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn AuthBackend>, jwt: Option<JwtManager>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            jwt,
            cache_ttl: to_chrono(DEFAULT_CACHE_TTL),
            sessions: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// How long a resolved session is served without checking the token again
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = to_chrono(ttl);
        self
    }

    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.backend
    }

    /// Receive every auth state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Resolve an access token; `None` means signed out
    pub async fn get_session(&self, access_token: &str) -> Result<Option<Session>> {
        if self.revoked.read().await.contains_key(access_token) {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(cached) = self.sessions.read().await.get(access_token) {
            if cached.fresh_until > now {
                return Ok(Some(cached.session.clone()));
            }
        }
        self.sessions.write().await.remove(access_token);

        if let Some(jwt) = &self.jwt {
            let claims = match jwt.validate_token(access_token) {
                Ok(claims) => claims,
                Err(e) => {
                    debug!(error = %e, "Access token rejected");
                    return Ok(None);
                }
            };
            let user = match claims.user() {
                Ok(user) => user,
                Err(e) => {
                    debug!(error = %e, "Access token subject rejected");
                    return Ok(None);
                }
            };

            let session = Session {
                access_token: access_token.to_string(),
                refresh_token: None,
                user,
                expires_at: claims.expires_at(),
            };
            self.remember(&session).await;
            return Ok(Some(session));
        }

        match self.backend.get_user(access_token).await {
            Ok(user) => {
                let session = Session {
                    access_token: access_token.to_string(),
                    refresh_token: None,
                    user,
                    expires_at: unverified_expiry(access_token),
                };
                self.remember(&session).await;
                Ok(Some(session))
            }
            Err(AppError::Unauthorized { .. } | AppError::ExpiredToken) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.backend.sign_in(email, password).await?;
        self.remember(&session).await;

        info!(user_id = %session.user.id, "User signed in");
        self.publish(AuthEvent::SignedIn {
            user: session.user.clone(),
        });
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let signed_up = self.backend.sign_up(email, password).await?;
        if let Some(session) = &signed_up.session {
            self.remember(session).await;
        }

        info!(
            user_id = %signed_up.user.id,
            confirmed = signed_up.session.is_some(),
            "User signed up"
        );
        self.publish(AuthEvent::SignedUp {
            user: signed_up.user.clone(),
        });
        Ok(signed_up)
    }

    /// Sign out; the token stops resolving even if the backend call fails
    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        self.sessions.write().await.remove(&session.access_token);
        {
            let mut revoked = self.revoked.write().await;
            let now = Utc::now();
            revoked.retain(|_, exp| exp.map_or(true, |exp| exp > now));
            revoked.insert(session.access_token.clone(), session.expires_at);
        }

        if let Err(e) = self.backend.sign_out(&session.access_token).await {
            warn!(user_id = %session.user.id, error = %e, "Backend sign-out failed");
        }

        info!(user_id = %session.user.id, "User signed out");
        self.publish(AuthEvent::SignedOut {
            user_id: session.user.id,
        });
        Ok(())
    }

    async fn remember(&self, session: &Session) {
        let now = Utc::now();
        let mut fresh_until = now
            .checked_add_signed(self.cache_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(exp) = session.expires_at {
            fresh_until = fresh_until.min(exp);
        }

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, cached| cached.fresh_until > now);
        if fresh_until > now {
            sessions.insert(
                session.access_token.clone(),
                CachedSession {
                    session: session.clone(),
                    fresh_until,
                },
            );
        }
    }

    #[cfg(test)]
    async fn cached_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;

    fn provider() -> (SessionProvider, Arc<MemoryAuth>) {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend.clone(), None);
        (provider, backend)
    }

    #[tokio::test]
    async fn test_unknown_token_has_no_session() {
        let (provider, _) = provider();
        assert!(provider.get_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_events_follow_sign_in_and_out() {
        let (provider, _) = provider();
        let mut events = provider.subscribe();

        let signed_up = provider.sign_up("reader@example.com", "hunter22").await.unwrap();
        let session = provider.sign_in("reader@example.com", "hunter22").await.unwrap();
        provider.sign_out(&session).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedUp {
                user: signed_up.user.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedIn {
                user: signed_up.user.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedOut {
                user_id: signed_up.user.id
            }
        );
    }

    #[tokio::test]
    async fn test_session_is_cached_after_sign_in() {
        let (provider, backend) = provider();
        provider.sign_up("reader@example.com", "hunter22").await.unwrap();
        let session = provider.sign_in("reader@example.com", "hunter22").await.unwrap();

        let before = backend.call_count();
        let found = provider.get_session(&session.access_token).await.unwrap();
        assert_eq!(found.map(|s| s.user.id), Some(session.user.id));
        assert_eq!(backend.call_count(), before);
    }

    #[tokio::test]
    async fn test_signed_out_token_stops_resolving() {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend, Some(JwtManager::new("test_secret", 3600)));

        provider.sign_up("reader@example.com", "hunter22").await.unwrap();
        let session = provider.sign_in("reader@example.com", "hunter22").await.unwrap();
        provider.sign_out(&session).await.unwrap();

        assert!(provider
            .get_session(&session.access_token)
            .await
            .unwrap()
            .is_none());
    }

    async fn signed_up_token(backend: &MemoryAuth) -> Session {
        backend
            .sign_up("reader@example.com", "hunter22")
            .await
            .unwrap()
            .session
            .unwrap()
    }

    #[tokio::test]
    async fn test_backend_revocation_seen_after_cache_ttl() {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend.clone(), None)
            .with_cache_ttl(Duration::from_millis(50));
        let session = signed_up_token(&backend).await;

        assert!(provider.get_session(&session.access_token).await.unwrap().is_some());

        // revoked elsewhere, not through this provider
        backend.sign_out(&session.access_token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(provider.get_session(&session.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_checks_backend_every_time() {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend.clone(), None).with_cache_ttl(Duration::ZERO);
        let session = signed_up_token(&backend).await;

        assert!(provider.get_session(&session.access_token).await.unwrap().is_some());
        backend.sign_out(&session.access_token).await.unwrap();
        assert!(provider.get_session(&session.access_token).await.unwrap().is_none());
        assert_eq!(provider.cached_count().await, 0);
    }

    #[tokio::test]
    async fn test_backend_session_carries_token_expiry() {
        let (provider, backend) = provider();
        let session = signed_up_token(&backend).await;

        let resolved = provider
            .get_session(&session.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.expires_at, session.expires_at);
        assert!(resolved.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_entries_are_pruned_on_write() {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend.clone(), None)
            .with_cache_ttl(Duration::from_millis(20));

        let first = signed_up_token(&backend).await;
        provider.get_session(&first.access_token).await.unwrap();
        assert_eq!(provider.cached_count().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        provider.sign_up("other@example.com", "hunter22").await.unwrap();
        assert_eq!(provider.cached_count().await, 1);
    }

    #[tokio::test]
    async fn test_signed_token_with_bad_subject_is_signed_out() {
        let backend = Arc::new(MemoryAuth::new(JwtManager::new("test_secret", 3600)));
        let provider = SessionProvider::new(backend, Some(JwtManager::new("test_secret", 3600)));

        let claims = crate::auth::JwtClaims {
            sub: "service-account".to_string(),
            email: String::new(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
            aud: Some(crate::auth::AUTHENTICATED_AUDIENCE.to_string()),
            role: None,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        assert!(provider.get_session(&token).await.unwrap().is_none());
    }
}
