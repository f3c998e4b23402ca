//! Upload and analysis workflow
//!
//! Runs the staged file through object upload, paper insert and analysis
//! generation, strictly in that order. A failed step halts the workflow;
//! nothing is retried here.

use crate::generator::AnalysisGenerator;
use crate::intake::FileIntake;
use crate::notify::Notification;
use crate::progress::{ProgressHandle, ProgressTicker, COMPLETE};
use researchease_common::config::AppConfig;
use researchease_common::errors::{AppError, Result};
use researchease_common::metrics;
use researchease_common::storage::UploadOptions;
use researchease_common::types::{Analysis, NewPaper, Paper};
use researchease_common::{ObjectStore, PaperStore, Session};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

/// Where uploads go and how they are written
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub bucket: String,
    pub upload_options: UploadOptions,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            upload_options: UploadOptions {
                cache_control: config.storage.cache_control.clone(),
                upsert: config.storage.upsert,
                ..Default::default()
            },
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub paper: Paper,
    pub analysis: Analysis,
    /// Route of the analysis page for the new paper
    pub redirect_to: String,
    pub notifications: Vec<Notification>,
}

pub struct AnalysisWorkflow {
    objects: Arc<dyn ObjectStore>,
    papers: Arc<dyn PaperStore>,
    generator: Arc<AnalysisGenerator>,
    settings: WorkflowSettings,
}

impl AnalysisWorkflow {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        papers: Arc<dyn PaperStore>,
        generator: Arc<AnalysisGenerator>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            objects,
            papers,
            generator,
            settings,
        }
    }

    pub fn generator(&self) -> &Arc<AnalysisGenerator> {
        &self.generator
    }

    /// Upload the staged file, record it, and generate its analysis.
    ///
    /// On success the intake and progress are reset. If the object or paper
    /// write fails the file stays staged with the error recorded; once the
    /// paper exists the intake is cleared even if analysis fails.
    #[instrument(skip_all, fields(user_id, paper_id))]
    pub async fn upload(
        &self,
        session: Option<&Session>,
        intake: &mut FileIntake,
        progress: &ProgressHandle,
    ) -> Result<UploadOutcome> {
        let Some(session) = session else {
            intake.set_error("You must be logged in to upload files");
            return Err(AppError::Unauthenticated);
        };
        let user_id = session.user_id();
        Span::current().record("user_id", tracing::field::display(user_id));

        let Some(candidate) = intake.take_staged() else {
            return Err(AppError::Validation {
                message: "No file selected".to_string(),
                field: Some("file".to_string()),
            });
        };

        let start = Instant::now();
        progress.reset();

        let new_paper = NewPaper::for_upload(Uuid::new_v4(), &candidate.name, user_id);
        let paper_id = new_paper.id;
        let path = new_paper.file_path.clone();
        Span::current().record("paper_id", tracing::field::display(paper_id));

        let options = UploadOptions {
            content_type: candidate.media_type.clone(),
            ..self.settings.upload_options.clone()
        };

        let ticker = ProgressTicker::start(progress.clone());
        let uploaded = self
            .objects
            .upload(&self.settings.bucket, &path, &candidate.bytes, &options)
            .await;
        ticker.stop();

        if let Err(e) = uploaded {
            error!(path = %path, error = %e, "Object upload failed");
            let err = AppError::UploadFailed {
                path: path.clone(),
                message: e.to_string(),
            };
            intake.restage(candidate);
            intake.set_error(err.to_string());
            metrics::record_upload(start.elapsed().as_secs_f64(), &format!("{:?}", err.code()));
            return Err(err);
        }
        info!(path = %path, size = candidate.size(), "Object uploaded");

        let paper = match self.papers.insert_paper(new_paper).await {
            Ok(paper) => paper,
            Err(e) => {
                error!(error = %e, "Paper insert failed, removing uploaded object");
                if let Err(remove_err) = self.objects.remove(&self.settings.bucket, &path).await {
                    warn!(path = %path, error = %remove_err, "Compensating remove failed; object left for the orphan sweep");
                }
                let err = e.into_persist_failed("paper");
                intake.restage(candidate);
                intake.set_error(err.to_string());
                metrics::record_upload(start.elapsed().as_secs_f64(), &format!("{:?}", err.code()));
                return Err(err);
            }
        };
        progress.set(COMPLETE);

        let mut notifications = vec![Notification::upload_successful()];

        // The paper is stored from here on, so the staged file is not offered again
        let analysis = match self.generator.generate(paper.id, &paper.title).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(error = %e, "Analysis generation failed; paper left processing");
                intake.reset();
                let err = match e {
                    AppError::AnalysisFailed { .. } => e,
                    other => AppError::AnalysisFailed {
                        paper_id: paper.id.to_string(),
                        message: other.to_string(),
                    },
                };
                metrics::record_upload(start.elapsed().as_secs_f64(), &format!("{:?}", err.code()));
                return Err(err);
            }
        };
        notifications.push(Notification::analysis_started());

        intake.reset();
        progress.reset();
        metrics::record_upload(start.elapsed().as_secs_f64(), "success");
        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload workflow complete"
        );

        Ok(UploadOutcome {
            redirect_to: format!("/analysis/{}", paper.id),
            paper,
            analysis,
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analyzer, FixedAnalyzer};
    use crate::intake::FileCandidate;
    use async_trait::async_trait;
    use researchease_common::auth::User;
    use researchease_common::db::MemoryPaperStore;
    use researchease_common::storage::MemoryObjectStore;
    use researchease_common::types::{AnalysisContent, PaperRef, PaperStatus};
    use std::sync::Mutex;

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        papers: Arc<MemoryPaperStore>,
        workflow: AnalysisWorkflow,
    }

    fn harness_with(analyzer: Arc<dyn Analyzer>) -> Harness {
        let objects = Arc::new(MemoryObjectStore::new());
        let papers = Arc::new(MemoryPaperStore::new());
        let generator = Arc::new(AnalysisGenerator::new(papers.clone(), analyzer));
        let workflow = AnalysisWorkflow::new(
            objects.clone(),
            papers.clone(),
            generator,
            WorkflowSettings::default(),
        );
        Harness {
            objects,
            papers,
            workflow,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(FixedAnalyzer))
    }

    fn session() -> Session {
        Session {
            access_token: "token".to_string(),
            refresh_token: None,
            user: User {
                id: Uuid::new_v4(),
                email: "reader@example.com".to_string(),
            },
            expires_at: None,
        }
    }

    fn staged_intake() -> FileIntake {
        let mut intake = FileIntake::new();
        intake
            .select(FileCandidate::new(
                "paper.pdf",
                "application/pdf",
                vec![0u8; 2 * 1024 * 1024],
            ))
            .unwrap();
        intake
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, paper: &PaperRef) -> Result<AnalysisContent> {
            Err(AppError::AnalysisFailed {
                paper_id: paper.id.to_string(),
                message: "model unavailable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Records the progress value seen when analysis starts
    struct ProgressWatcher {
        progress: ProgressHandle,
        seen: Mutex<Option<u8>>,
    }

    #[async_trait]
    impl Analyzer for ProgressWatcher {
        async fn analyze(&self, _paper: &PaperRef) -> Result<AnalysisContent> {
            if let Ok(mut seen) = self.seen.lock() {
                *seen = Some(self.progress.get());
            }
            Ok(AnalysisContent::default())
        }

        fn name(&self) -> &str {
            "watcher"
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_upload_makes_no_gateway_calls() {
        let h = harness();
        let mut intake = staged_intake();

        let err = h
            .workflow
            .upload(None, &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthenticated));
        assert_eq!(h.objects.call_count(), 0);
        assert_eq!(h.papers.call_count(), 0);
        assert!(intake.staged().is_some());
        assert_eq!(intake.error(), Some("You must be logged in to upload files"));
    }

    #[tokio::test]
    async fn test_nothing_staged_is_validation_error() {
        let h = harness();
        let mut intake = FileIntake::new();

        let err = h
            .workflow
            .upload(Some(&session()), &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(h.objects.call_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let h = harness();
        let session = session();
        let mut intake = staged_intake();
        let progress = ProgressHandle::new();

        let outcome = h
            .workflow
            .upload(Some(&session), &mut intake, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.paper.title, "paper");
        assert_eq!(outcome.paper.user_id, session.user.id);
        assert_eq!(outcome.paper.file_path, format!("{}.pdf", outcome.paper.id));
        assert_eq!(outcome.redirect_to, format!("/analysis/{}", outcome.paper.id));
        assert_eq!(
            outcome.notifications,
            vec![Notification::upload_successful(), Notification::analysis_started()]
        );

        let stored = h.papers.find_paper(outcome.paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Analyzed);
        assert_eq!(h.papers.analysis_count().await, 1);
        assert!(h.objects.contains("papers", &outcome.paper.file_path).await);

        assert!(intake.staged().is_none());
        assert!(intake.error().is_none());
        assert_eq!(progress.get(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_complete_before_analysis() {
        let progress = ProgressHandle::new();
        let watcher = Arc::new(ProgressWatcher {
            progress: progress.clone(),
            seen: Mutex::new(None),
        });
        let h = harness_with(watcher.clone());
        let mut intake = staged_intake();

        h.workflow
            .upload(Some(&session()), &mut intake, &progress)
            .await
            .unwrap();

        assert_eq!(*watcher.seen.lock().unwrap(), Some(COMPLETE));
    }

    #[tokio::test]
    async fn test_upload_failure_creates_no_row() {
        let h = harness();
        h.objects.fail_uploads(true);
        let mut intake = staged_intake();

        let err = h
            .workflow
            .upload(Some(&session()), &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UploadFailed { .. }), "{:?}", err);
        assert_eq!(h.papers.paper_count().await, 0);
        assert!(intake.staged().is_some());
        assert!(intake.error().is_some());
    }

    #[tokio::test]
    async fn test_insert_failure_removes_uploaded_object() {
        let h = harness();
        h.papers.fail_paper_inserts(true);
        let mut intake = staged_intake();

        let err = h
            .workflow
            .upload(Some(&session()), &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PersistFailed { .. }), "{:?}", err);
        assert!(h.objects.is_empty().await);
        assert!(intake.staged().is_some());
    }

    #[tokio::test]
    async fn test_failed_compensation_leaves_object_for_sweep() {
        let h = harness();
        h.papers.fail_paper_inserts(true);
        h.objects.fail_removes(true);
        let mut intake = staged_intake();

        let err = h
            .workflow
            .upload(Some(&session()), &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PersistFailed { .. }));
        assert_eq!(h.objects.len().await, 1);
    }

    #[tokio::test]
    async fn test_analysis_failure_leaves_paper_processing() {
        let h = harness_with(Arc::new(FailingAnalyzer));
        let mut intake = staged_intake();

        let err = h
            .workflow
            .upload(Some(&session()), &mut intake, &ProgressHandle::new())
            .await
            .unwrap_err();

        let paper_id = match err {
            AppError::AnalysisFailed { paper_id, .. } => paper_id,
            other => panic!("unexpected error: {:?}", other),
        };
        let paper = h
            .papers
            .find_paper(paper_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paper.status, PaperStatus::Processing);
        assert_eq!(h.papers.analysis_count().await, 0);
        assert!(intake.staged().is_none());
    }
}
