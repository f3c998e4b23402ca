//! Axum extractors resolving the caller's session
//!
//! The token is read from `Authorization: Bearer <token>` first and from the
//! `sb-access-token` cookie otherwise, so page routes work for browsers.

use super::{Session, SessionProvider};
use crate::errors::{AppError, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use std::sync::Arc;

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Session of the caller, if any
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

/// Session of the caller; rejects with `Unauthenticated` when signed out
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Extract the access token from the Authorization header or cookie
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim()).filter(|t| !t.is_empty());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_TOKEN_COOKIE)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for MaybeSession
where
    Arc<SessionProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeSession(None));
        };

        let provider = Arc::<SessionProvider>::from_ref(state);
        Ok(MaybeSession(provider.get_session(token).await?))
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    Arc<SessionProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match MaybeSession::from_request_parts(parts, state).await? {
            MaybeSession(Some(session)) => Ok(CurrentSession(session)),
            MaybeSession(None) => Err(AppError::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("sb-access-token=xyz"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sb-access-token=xyz; other=1"),
        );
        assert_eq!(bearer_token(&headers), Some("xyz"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
