//! User-facing notifications returned alongside workflow results

use researchease_common::errors::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Destructive,
        }
    }

    pub fn upload_successful() -> Self {
        Self::info(
            "Upload successful",
            "Your file has been uploaded and is being processed.",
        )
    }

    pub fn analysis_started() -> Self {
        Self::info(
            "Analysis started",
            "Your paper is being analyzed. This may take a moment.",
        )
    }

    pub fn analysis_failed() -> Self {
        Self::destructive(
            "Analysis failed",
            "There was an error analyzing your paper. Please try again.",
        )
    }

    pub fn analysis_in_progress() -> Self {
        Self::info(
            "Analysis in progress",
            "Your paper is still being analyzed. Please check back later.",
        )
    }

    pub fn analysis_not_found() -> Self {
        Self::destructive("Analysis not found", "No analysis found for this paper.")
    }

    pub fn login_to_upload() -> Self {
        Self::destructive("Authentication required", "Please log in to upload files")
    }

    pub fn login_to_view() -> Self {
        Self::destructive("Authentication required", "Please log in to view analysis")
    }

    pub fn invalid_file_type() -> Self {
        Self::destructive("Invalid file type", "Please upload a PDF file")
    }

    pub fn file_too_large(limit_mb: usize) -> Self {
        Self::destructive(
            "File too large",
            format!("Please upload a file smaller than {} MB", limit_mb),
        )
    }

    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::destructive("Upload failed", message)
    }

    /// Notification shown for a failed upload step
    pub fn for_upload_error(err: &AppError) -> Self {
        match err {
            AppError::InvalidType { .. } => Self::invalid_file_type(),
            AppError::TooLarge { limit_mb, .. } => Self::file_too_large(*limit_mb),
            AppError::Unauthenticated => Self::login_to_upload(),
            AppError::AnalysisFailed { .. } => Self::analysis_failed(),
            other => Self::upload_failed(other.to_string()),
        }
    }
}
