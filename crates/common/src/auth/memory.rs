//! In-memory session store with locally signed tokens

use super::{
    generate_secret, hash_password, verify_password, AuthBackend, JwtManager, Session, SignUp, User,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Account {
    user: User,
    /// Argon2 PHC string
    password_hash: String,
}

pub struct MemoryAuth {
    jwt: JwtManager,
    // keyed by lowercased email
    accounts: RwLock<HashMap<String, Account>>,
    live_tokens: RwLock<HashSet<String>>,
    calls: AtomicUsize,
}

impl MemoryAuth {
    pub fn new(jwt: JwtManager) -> Self {
        Self {
            jwt,
            accounts: RwLock::new(HashMap::new()),
            live_tokens: RwLock::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn issue(&self, user: &User) -> Result<Session> {
        let (token, claims) = self.jwt.generate_token(user)?;
        self.live_tokens.write().await.insert(token.clone());

        Ok(Session {
            access_token: token,
            refresh_token: Some(generate_secret()),
            user: user.clone(),
            expires_at: claims.expires_at(),
        })
    }

    fn duplicate() -> AppError {
        AppError::Duplicate {
            message: "User already registered".to_string(),
        }
    }

    fn invalid_credentials() -> AppError {
        AppError::Unauthorized {
            message: "Invalid login credentials".to_string(),
        }
    }
}

/// Argon2 is CPU-bound; keep it off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password hashing task failed: {}", e),
        })
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (user, password_hash) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&email.to_lowercase())
                .ok_or_else(Self::invalid_credentials)?;
            (account.user.clone(), account.password_hash.clone())
        };

        let password = password.to_string();
        if !blocking(move || verify_password(&password, &password_hash)).await? {
            return Err(Self::invalid_credentials());
        }

        self.issue(&user).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = email.to_lowercase();
        if self.accounts.read().await.contains_key(&key) {
            return Err(Self::duplicate());
        }

        let password = password.to_string();
        let password_hash = blocking(move || hash_password(&password)).await??;

        let user = {
            let mut accounts = self.accounts.write().await;
            // another sign-up may have won while hashing
            if accounts.contains_key(&key) {
                return Err(Self::duplicate());
            }

            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
            };
            accounts.insert(
                key,
                Account {
                    user: user.clone(),
                    password_hash,
                },
            );
            user
        };

        let session = self.issue(&user).await?;
        Ok(SignUp {
            user,
            session: Some(session),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.live_tokens.write().await.remove(access_token);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.live_tokens.read().await.contains(access_token) {
            return Err(AppError::Unauthorized {
                message: "Session not found".to_string(),
            });
        }
        self.jwt.validate_token(access_token)?.user()
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryAuth {
        MemoryAuth::new(JwtManager::new("test_secret", 3600))
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = backend();
        let signed_up = auth.sign_up("Reader@Example.com", "hunter22").await.unwrap();
        assert!(signed_up.session.is_some());

        let session = auth.sign_in("reader@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user.id, signed_up.user.id);

        let user = tokio_test::assert_ok!(auth.get_user(&session.access_token).await);
        assert_eq!(user.id, signed_up.user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let auth = backend();
        auth.sign_up("reader@example.com", "hunter22").await.unwrap();

        let err = auth.sign_in("reader@example.com", "wrong-password").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_passwords_are_stored_as_argon2() {
        let auth = backend();
        auth.sign_up("reader@example.com", "hunter22").await.unwrap();

        let accounts = auth.accounts.read().await;
        let stored = &accounts["reader@example.com"].password_hash;
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("hunter22"));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up() {
        let auth = backend();
        auth.sign_up("reader@example.com", "hunter22").await.unwrap();
        assert!(auth.sign_up("reader@example.com", "other-pass").await.is_err());
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let auth = backend();
        let session = auth
            .sign_up("reader@example.com", "hunter22")
            .await
            .unwrap()
            .session
            .unwrap();

        tokio_test::assert_ok!(auth.sign_out(&session.access_token).await);
        tokio_test::assert_err!(auth.get_user(&session.access_token).await);
    }
}
