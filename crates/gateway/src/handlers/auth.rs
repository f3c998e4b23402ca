//! Sign-in, sign-up and sign-out handlers
//!
//! Successful sign-in sets the access token cookie so page routes resolve the
//! session without an Authorization header.

use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::Utc;
use researchease_common::{
    auth::{Credentials, CurrentSession, Session, User, ACCESS_TOKEN_COOKIE},
    errors::{AppError, Result},
};
use serde::Serialize;
use validator::Validate;

#[derive(Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    /// True while the account awaits email confirmation
    pub confirmation_required: bool,
}

fn validated(credentials: &Credentials) -> Result<()> {
    credentials.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}

fn session_cookie(session: &Session) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let max_age = session
        .expires_at
        .map(|exp| (exp - Utc::now()).num_seconds().max(0))
        .map(|secs| format!("; Max-Age={}", secs))
        .unwrap_or_default();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
        ACCESS_TOKEN_COOKIE, session.access_token, max_age
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// Sign in with email and password
pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(HeaderMap, Json<SessionResponse>)> {
    validated(&credentials)?;

    let session = state
        .sessions
        .sign_in(&credentials.email, &credentials.password)
        .await?;

    Ok((session_cookie(&session), Json(SessionResponse { session })))
}

/// Create an account; the session is present unless confirmation is pending
pub async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, HeaderMap, Json<SignUpResponse>)> {
    validated(&credentials)?;

    let signed_up = state
        .sessions
        .sign_up(&credentials.email, &credentials.password)
        .await?;

    let headers = signed_up
        .session
        .as_ref()
        .map(session_cookie)
        .unwrap_or_default();

    Ok((
        StatusCode::CREATED,
        headers,
        Json(SignUpResponse {
            confirmation_required: signed_up.session.is_none(),
            user: signed_up.user,
            session: signed_up.session,
        }),
    ))
}

/// Sign out and clear the cookie
pub async fn sign_out(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<(StatusCode, HeaderMap)> {
    state.sessions.sign_out(&session).await?;
    state.intakes.evict(session.user_id()).await;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("sb-access-token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}
