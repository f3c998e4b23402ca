//! API handlers module

pub mod auth;
pub mod health;
pub mod intake;
pub mod papers;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use researchease_common::errors::{AppError, ErrorDetails};
use researchease_pipeline::Notification;
use serde::Serialize;

/// An error response that also carries the notification to show the user
#[derive(Debug)]
pub struct NotifiedError {
    pub error: AppError,
    pub notification: Notification,
}

#[derive(Serialize)]
struct NotifiedErrorBody {
    error: ErrorDetails,
    notification: Notification,
}

impl NotifiedError {
    pub fn new(error: AppError, notification: Notification) -> Self {
        Self {
            error,
            notification,
        }
    }

    /// Notification chosen from the upload error taxonomy
    pub fn upload(error: AppError) -> Self {
        let notification = Notification::for_upload_error(&error);
        Self::new(error, notification)
    }
}

impl IntoResponse for NotifiedError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let code = self.error.code();
        let message = self.error.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, code = ?code, status = status.as_u16(), "Server error");
        } else {
            tracing::warn!(error = %message, code = ?code, status = status.as_u16(), "Client error");
        }

        let details = match &self.error {
            AppError::AnalysisFailed { paper_id, .. } => {
                Some(serde_json::json!({ "paper_id": paper_id }))
            }
            _ => None,
        };

        let body = NotifiedErrorBody {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None,
            },
            notification: self.notification,
        };

        (status, Json(body)).into_response()
    }
}
