//! Paper record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Processing status of an uploaded paper.
///
/// The only permitted transition is `Processing -> Analyzed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    Processing,
    Analyzed,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Processing => "processing",
            PaperStatus::Analyzed => "analyzed",
        }
    }

    /// Whether a paper in this status may be moved to `next`.
    ///
    /// Re-applying the current status is allowed so repeated writes are harmless.
    pub fn can_transition_to(&self, next: PaperStatus) -> bool {
        matches!(
            (self, next),
            (PaperStatus::Processing, _) | (PaperStatus::Analyzed, PaperStatus::Analyzed)
        )
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PaperStatus::Processing),
            "analyzed" => Ok(PaperStatus::Analyzed),
            other => Err(format!("unknown paper status: {}", other)),
        }
    }
}

/// A stored paper row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: Uuid,
    pub title: String,
    pub file_path: String,
    pub status: PaperStatus,
    pub user_id: Uuid,
    pub upload_date: DateTime<Utc>,
}

impl Paper {
    pub fn to_ref(&self) -> PaperRef {
        PaperRef {
            id: self.id,
            title: self.title.clone(),
        }
    }
}

/// Insert payload for a paper; status always starts at `processing`
#[derive(Debug, Clone, Serialize)]
pub struct NewPaper {
    pub id: Uuid,
    pub title: String,
    pub file_path: String,
    pub user_id: Uuid,
}

impl NewPaper {
    /// Build the row for a freshly uploaded file
    pub fn for_upload(id: Uuid, filename: &str, user_id: Uuid) -> Self {
        Self {
            id,
            title: title_from_filename(filename),
            file_path: storage_path(id, filename),
            user_id,
        }
    }

    /// Materialize the row as a store would after insert
    pub fn into_paper(self, upload_date: DateTime<Utc>) -> Paper {
        Paper {
            id: self.id,
            title: self.title,
            file_path: self.file_path,
            status: PaperStatus::Processing,
            user_id: self.user_id,
            upload_date,
        }
    }
}

/// Identifier and title handed to analyzers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRef {
    pub id: Uuid,
    pub title: String,
}

/// Paper title derived from the uploaded filename with its extension removed
pub fn title_from_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        Some(_) => "",
        None => name,
    };

    let stem = stem.trim();
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}

fn extension_of(filename: &str) -> String {
    let ext: String = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    if ext.is_empty() {
        "pdf".to_string()
    } else {
        ext
    }
}

/// Storage path for an upload, `{id}.{ext}`
pub fn storage_path(id: Uuid, filename: &str) -> String {
    format!("{}.{}", id, extension_of(filename))
}
