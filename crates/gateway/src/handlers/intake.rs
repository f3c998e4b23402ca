//! File intake and upload handlers
//!
//! Each signed-in user has one intake. Selecting stages a file after
//! validation; uploading runs the staged file through the workflow.

use super::NotifiedError;
use crate::AppState;
use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use researchease_common::{
    auth::{CurrentSession, MaybeSession},
    errors::AppError,
};
use researchease_pipeline::{
    intake::StagedFile, FileCandidate, FileIntake, Notification, UploadOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct IntakeStatus {
    pub staged: Option<StagedFile>,
    pub error: Option<String>,
    pub armed: bool,
    /// An upload is running and holds the intake
    pub uploading: bool,
    pub progress: u8,
    pub max_size_mb: usize,
}

impl IntakeStatus {
    fn of(intake: &FileIntake, progress: u8) -> Self {
        Self {
            staged: intake.staged().map(FileCandidate::summary),
            error: intake.error().map(str::to_string),
            armed: intake.is_armed(),
            uploading: false,
            progress,
            max_size_mb: intake.policy().max_mb(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectQuery {
    /// `drop` when the file arrived through the drop zone
    #[serde(default)]
    pub via: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DragRequest {
    pub active: bool,
}

/// Read the `file` field of a multipart body
async fn read_candidate(mut multipart: Multipart) -> Result<FileCandidate, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Invalid multipart body: {}", e),
        field: Some("file".to_string()),
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| AppError::Validation {
            message: format!("Failed to read file: {}", e),
            field: Some("file".to_string()),
        })?;

        return Ok(FileCandidate::new(name, media_type, bytes.to_vec()));
    }

    Err(AppError::Validation {
        message: "Multipart body has no `file` field".to_string(),
        field: Some("file".to_string()),
    })
}

/// Validate and stage a file
pub async fn select_file(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<SelectQuery>,
    multipart: Multipart,
) -> Result<Json<IntakeStatus>, NotifiedError> {
    let candidate = read_candidate(multipart).await.map_err(NotifiedError::upload)?;
    let slot = state.intakes.slot(session.user_id()).await;
    let mut intake = slot.intake.lock().await;

    let selected = match query.via.as_deref() {
        Some("drop") => intake.drop_file(candidate),
        _ => intake.select(candidate),
    };
    if let Err(e) = selected {
        return Err(NotifiedError::upload(e));
    }

    Ok(Json(IntakeStatus::of(&intake, slot.progress.get())))
}

/// Toggle the drop zone highlight
pub async fn drag(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(request): Json<DragRequest>,
) -> Json<IntakeStatus> {
    let slot = state.intakes.slot(session.user_id()).await;
    let mut intake = slot.intake.lock().await;
    if request.active {
        intake.drag_over();
    } else {
        intake.drag_leave();
    }
    Json(IntakeStatus::of(&intake, slot.progress.get()))
}

/// Clear the staged file and error
pub async fn reset(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<IntakeStatus> {
    let slot = state.intakes.slot(session.user_id()).await;
    let mut intake = slot.intake.lock().await;
    intake.reset();
    Json(IntakeStatus::of(&intake, slot.progress.get()))
}

/// Current intake state; does not wait for a running upload
pub async fn status(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<IntakeStatus> {
    let slot = state.intakes.slot(session.user_id()).await;
    let progress = slot.progress.get();

    let status = match slot.intake.try_lock() {
        Ok(intake) => IntakeStatus::of(&intake, progress),
        Err(_) => IntakeStatus {
            staged: None,
            error: None,
            armed: false,
            uploading: true,
            progress,
            max_size_mb: state.config.intake.max_size_mb,
        },
    };
    Json(status)
}

/// Upload the staged file and generate its analysis
pub async fn upload(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Result<(StatusCode, Json<UploadOutcome>), NotifiedError> {
    let Some(session) = session else {
        return Err(NotifiedError::new(
            AppError::Unauthenticated,
            Notification::login_to_upload(),
        ));
    };

    let slot = state.intakes.slot(session.user_id()).await;
    let mut intake = slot.intake.lock().await;

    let outcome = state
        .workflow
        .upload(Some(&session), &mut intake, &slot.progress)
        .await
        .map_err(NotifiedError::upload)?;

    info!(
        paper_id = %outcome.paper.id,
        user_id = %session.user_id(),
        "Paper uploaded and analyzed"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}
