//! Supabase GoTrue backend

use super::{AuthBackend, Session, SignUp, User};
use crate::errors::{AppError, Result};
use crate::supabase::{ensure_success, SupabaseClient};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};

const SERVICE: &str = "supabase-auth";

pub struct SupabaseAuth {
    client: SupabaseClient,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
            expires_at,
        }
    }
}

/// Sign-up returns a token response when email confirmation is disabled and
/// a bare user otherwise
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(User),
}

#[derive(Deserialize, Default)]
struct GoTrueError {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Credential and token failures become `Unauthorized` with GoTrue's message
    async fn check(response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY => {
                let status = response.status();
                let body: GoTrueError = response.json().await.unwrap_or_default();
                let message = body
                    .error_description
                    .or(body.msg)
                    .or(body.message)
                    .unwrap_or_else(|| status.to_string());
                Err(AppError::Unauthorized { message })
            }
            _ => ensure_success(response, SERVICE).await,
        }
    }
}

#[async_trait]
impl AuthBackend for SupabaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .client
            .user_request(Method::POST, "/auth/v1/token?grant_type=password", None)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let token: TokenResponse = Self::check(response).await?.json().await?;
        Ok(token.into_session())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let response = self
            .client
            .user_request(Method::POST, "/auth/v1/signup", None)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        match Self::check(response).await?.json().await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                Ok(SignUp {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUp {
                user,
                session: None,
            }),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .user_request(Method::POST, "/auth/v1/logout", Some(access_token))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        let response = self
            .client
            .user_request(Method::GET, "/auth/v1/user", Some(access_token))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    fn backend_name(&self) -> &str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_sign_up_response_variants() {
        let id = Uuid::new_v4();

        let pending: SignUpResponse =
            serde_json::from_value(json!({"id": id, "email": "a@b.co", "aud": "authenticated"}))
                .unwrap();
        assert!(matches!(pending, SignUpResponse::User(u) if u.id == id));

        let confirmed: SignUpResponse = serde_json::from_value(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "ref",
            "user": {"id": id, "email": "a@b.co"}
        }))
        .unwrap();
        match confirmed {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                assert_eq!(session.user.id, id);
                assert!(session.expires_at.is_some());
            }
            SignUpResponse::User(_) => panic!("expected a session"),
        }
    }
}
