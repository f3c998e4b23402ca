//! Paper listing and analysis page handlers

use super::NotifiedError;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use researchease_common::{
    auth::{CurrentSession, MaybeSession},
    errors::{AppError, Result},
    types::{Analysis, Paper},
    Session,
};
use researchease_pipeline::{AnalysisPage, Notification, Tab};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub tab: Option<String>,
}

/// The caller's papers, newest first
pub async fn list_papers(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<Vec<Paper>>> {
    let papers = state.papers.list_papers(session.user_id()).await?;
    Ok(Json(papers))
}

async fn load_page(
    state: &AppState,
    session: Option<&Session>,
    paper_id: Uuid,
    query: &PageQuery,
) -> Result<AnalysisPage> {
    let mut page = state.presenter.load(session, paper_id).await?;
    if let Some(tab) = query.tab.as_deref() {
        page.tabs.select(tab.parse::<Tab>()?);
    }
    Ok(page)
}

/// Analysis page; redirects when signed out or when the paper is unknown
pub async fn analysis_page(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let Ok(paper_id) = Uuid::parse_str(&id) else {
        warn!(id = %id, "Malformed paper id, redirecting home");
        return Redirect::to("/").into_response();
    };

    match load_page(&state, session.as_ref(), paper_id, &query).await {
        Ok(page) => Json(page).into_response(),
        Err(AppError::Unauthenticated) => {
            Redirect::to(&state.config.server.auth_route).into_response()
        }
        Err(AppError::NotFound { .. }) => Redirect::to("/").into_response(),
        Err(e) => e.into_response(),
    }
}

/// Analysis page data with error statuses instead of redirects
pub async fn get_analysis(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    Path(paper_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> std::result::Result<Json<AnalysisPage>, NotifiedError> {
    load_page(&state, session.as_ref(), paper_id, &query)
        .await
        .map(Json)
        .map_err(|e| {
            let notification = match &e {
                AppError::Unauthenticated => Notification::login_to_view(),
                AppError::NotFound { .. } => Notification::destructive("Error", "Paper not found"),
                other => Notification::destructive("Error", other.to_string()),
            };
            NotifiedError::new(e, notification)
        })
}

/// Re-run analysis for one of the caller's papers
pub async fn regenerate(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(paper_id): Path<Uuid>,
) -> std::result::Result<Json<Analysis>, NotifiedError> {
    let paper = state
        .papers
        .find_paper(paper_id)
        .await
        .map_err(NotifiedError::upload)?
        .filter(|p| p.user_id == session.user_id())
        .ok_or_else(|| {
            NotifiedError::new(
                AppError::paper_not_found(paper_id),
                Notification::destructive("Error", "Paper not found"),
            )
        })?;

    info!(paper_id = %paper.id, "Manual analysis requested");
    let analysis = state
        .generator
        .generate(paper.id, &paper.title)
        .await
        .map_err(|e| NotifiedError::new(e, Notification::analysis_failed()))?;

    Ok(Json(analysis))
}
