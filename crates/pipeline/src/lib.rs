//! ResearchEase pipeline
//!
//! Everything between a file picked for upload and the rendered analysis:
//! - File intake validation and staging
//! - The upload workflow with progress reporting
//! - Analysis generation (fixed or LLM-backed)
//! - Analysis page rendering with placeholder fallbacks
//! - Background reconciliation of interrupted uploads

pub mod analyzer;
pub mod generator;
pub mod intake;
pub mod notify;
pub mod orchestrator;
pub mod pdf;
pub mod presenter;
pub mod progress;
pub mod reconciler;

pub use analyzer::{create_analyzer, Analyzer};
pub use generator::AnalysisGenerator;
pub use intake::{FileCandidate, FileIntake, IntakePolicy};
pub use notify::Notification;
pub use orchestrator::{AnalysisWorkflow, UploadOutcome, WorkflowSettings};
pub use presenter::{AnalysisPage, AnalysisPresenter, AnalysisState, Tab, TabSet};
pub use progress::ProgressHandle;
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerSettings};
