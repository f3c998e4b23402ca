//! File intake: validation and staging of the file chosen for upload
//!
//! Picking a file and dropping one run the same validation. A rejected file
//! is never staged; the previous selection is cleared too.

use researchease_common::config::IntakeConfig;
use researchease_common::errors::{AppError, Result};
use researchease_common::metrics;
use serde::Serialize;
use tracing::debug;

const MIB: usize = 1024 * 1024;

/// A file offered for upload
#[derive(Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    /// Declared media type, e.g. `application/pdf`
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn summary(&self) -> StagedFile {
        StagedFile {
            name: self.name.clone(),
            media_type: self.media_type.clone(),
            size: self.size(),
        }
    }
}

impl std::fmt::Debug for FileCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCandidate")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.size())
            .finish()
    }
}

/// Metadata of the staged file, without the bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    pub name: String,
    pub media_type: String,
    pub size: usize,
}

/// What the intake accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePolicy {
    pub max_bytes: usize,
    pub accepted_media_prefix: String,
}

impl IntakePolicy {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            max_bytes: config.max_size_mb * MIB,
            accepted_media_prefix: config.accepted_media_prefix.clone(),
        }
    }

    /// Limit in whole megabytes, as shown to users
    pub fn max_mb(&self) -> usize {
        self.max_bytes / MIB
    }

    /// Check a candidate without changing any state
    pub fn check(&self, candidate: &FileCandidate) -> Result<()> {
        if !candidate.media_type.starts_with(&self.accepted_media_prefix) {
            return Err(AppError::InvalidType {
                media_type: candidate.media_type.clone(),
            });
        }
        if candidate.size() > self.max_bytes {
            return Err(AppError::TooLarge {
                size: candidate.size(),
                limit: self.max_bytes,
                limit_mb: self.max_mb(),
            });
        }
        Ok(())
    }
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * MIB,
            accepted_media_prefix: "application/pdf".to_string(),
        }
    }
}

/// Staging area for one user's upload
#[derive(Debug, Default)]
pub struct FileIntake {
    policy: IntakePolicy,
    staged: Option<FileCandidate>,
    error: Option<String>,
    armed: bool,
}

impl FileIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: IntakePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    /// Validate and stage a file; on rejection nothing stays staged
    pub fn select(&mut self, candidate: FileCandidate) -> Result<&FileCandidate> {
        if let Err(e) = self.policy.check(&candidate) {
            let (message, reason) = match &e {
                AppError::InvalidType { .. } => {
                    ("Only PDF files are supported".to_string(), "invalid_type")
                }
                _ => (
                    format!(
                        "File size exceeds the maximum limit of {} MB",
                        self.policy.max_mb()
                    ),
                    "too_large",
                ),
            };

            debug!(name = %candidate.name, reason, "File rejected at intake");
            metrics::record_intake_rejection(reason);

            self.staged = None;
            self.error = Some(message);
            return Err(e);
        }

        debug!(name = %candidate.name, size = candidate.size(), "File staged");
        self.error = None;
        Ok(self.staged.insert(candidate))
    }

    pub fn drag_over(&mut self) {
        self.armed = true;
    }

    pub fn drag_leave(&mut self) {
        self.armed = false;
    }

    /// A dropped file disarms the drop zone and goes through `select`
    pub fn drop_file(&mut self, candidate: FileCandidate) -> Result<&FileCandidate> {
        self.armed = false;
        self.select(candidate)
    }

    /// Clear the staged file and any error
    pub fn reset(&mut self) {
        self.staged = None;
        self.error = None;
    }

    pub fn staged(&self) -> Option<&FileCandidate> {
        self.staged.as_ref()
    }

    pub fn take_staged(&mut self) -> Option<FileCandidate> {
        self.staged.take()
    }

    /// Put a file back after a failed upload so the user can retry
    pub fn restage(&mut self, candidate: FileCandidate) {
        self.staged = Some(candidate);
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}
