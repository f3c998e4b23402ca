//! Background repair of half-finished uploads
//!
//! Each pass:
//! - marks papers `analyzed` when their analysis exists but the status write was lost
//! - re-runs generation for papers stuck in `processing` past a deadline
//! - regenerates analyses missing from `analyzed` papers
//! - deletes stored objects that no paper row points at, after a grace period

use crate::generator::AnalysisGenerator;
use chrono::{DateTime, Utc};
use researchease_common::config::AppConfig;
use researchease_common::errors::Result;
use researchease_common::metrics;
use researchease_common::types::{Paper, PaperStatus};
use researchease_common::{ObjectStore, PaperStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub bucket: String,
    pub interval: Duration,
    pub stuck_after: Duration,
    pub orphan_grace: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            interval: Duration::from_secs(config.reconciler.interval_secs),
            stuck_after: Duration::from_secs(config.reconciler.stuck_after_secs),
            orphan_grace: Duration::from_secs(config.reconciler.orphan_grace_secs),
        }
    }
}

/// Counts of repairs made by one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub statuses_repaired: usize,
    pub regenerated: usize,
    pub regeneration_failures: usize,
    pub orphans_removed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Reconciler {
    objects: Arc<dyn ObjectStore>,
    papers: Arc<dyn PaperStore>,
    generator: Arc<AnalysisGenerator>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        papers: Arc<dyn PaperStore>,
        generator: Arc<AnalysisGenerator>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            objects,
            papers,
            generator,
            settings,
        }
    }

    /// Run one repair pass
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let now = Utc::now();
        let mut report = ReconcileReport::default();

        // Listed before the papers so an object uploaded mid-pass is never
        // compared against a stale paper list
        let objects = self.objects.list(&self.settings.bucket).await?;

        let processing = self.papers.list_papers_by_status(PaperStatus::Processing).await?;
        let analyzed = self.papers.list_papers_by_status(PaperStatus::Analyzed).await?;
        let known: HashSet<String> = processing
            .iter()
            .chain(analyzed.iter())
            .map(|p| p.file_path.clone())
            .collect();

        for paper in &processing {
            if self.papers.find_analysis_by_paper(paper.id).await?.is_some() {
                self.papers
                    .update_paper_status(paper.id, PaperStatus::Analyzed)
                    .await?;
                info!(paper_id = %paper.id, "Marked paper analyzed; analysis already existed");
                report.statuses_repaired += 1;
            } else if older_than(paper.upload_date, now, self.settings.stuck_after) {
                warn!(paper_id = %paper.id, upload_date = %paper.upload_date, "Paper stuck in processing, regenerating");
                self.regenerate(paper, &mut report).await;
            }
        }

        for paper in &analyzed {
            if self.papers.find_analysis_by_paper(paper.id).await?.is_none() {
                warn!(paper_id = %paper.id, "Analyzed paper has no analysis, regenerating");
                self.regenerate(paper, &mut report).await;
            }
        }

        for object in objects {
            if known.contains(&object.path) {
                continue;
            }
            let Some(created_at) = object.created_at else {
                debug!(path = %object.path, "Orphan candidate without creation time, skipping");
                continue;
            };
            if !older_than(created_at, now, self.settings.orphan_grace) {
                continue;
            }
            match self.objects.remove(&self.settings.bucket, &object.path).await {
                Ok(()) => {
                    info!(path = %object.path, size = object.size, "Removed orphaned object");
                    report.orphans_removed += 1;
                }
                Err(e) => warn!(path = %object.path, error = %e, "Failed to remove orphaned object"),
            }
        }

        metrics::record_repairs("status", report.statuses_repaired);
        metrics::record_repairs("regenerated", report.regenerated);
        metrics::record_repairs("orphan", report.orphans_removed);

        Ok(report)
    }

    async fn regenerate(&self, paper: &Paper, report: &mut ReconcileReport) {
        match self.generator.generate(paper.id, &paper.title).await {
            Ok(_) => report.regenerated += 1,
            Err(e) => {
                error!(paper_id = %paper.id, error = %e, "Regeneration failed");
                report.regeneration_failures += 1;
            }
        }
    }

    /// Run passes on the configured interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.settings.interval.as_secs(), "Reconciler started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciler stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.is_clean() => debug!("Reconcile pass found nothing to repair"),
                        Ok(report) => info!(?report, "Reconcile pass complete"),
                        Err(e) => error!(error = %e, "Reconcile pass failed"),
                    }
                }
            }
        }
    }
}

fn older_than(at: DateTime<Utc>, now: DateTime<Utc>, age: Duration) -> bool {
    match chrono::Duration::from_std(age) {
        Ok(age) => now - at >= age,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FixedAnalyzer;
    use researchease_common::db::MemoryPaperStore;
    use researchease_common::storage::{MemoryObjectStore, UploadOptions};
    use researchease_common::types::{Analysis, AnalysisContent, NewPaper};
    use uuid::Uuid;

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        papers: Arc<MemoryPaperStore>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        let objects = Arc::new(MemoryObjectStore::new());
        let papers = Arc::new(MemoryPaperStore::new());
        let generator = Arc::new(AnalysisGenerator::new(papers.clone(), Arc::new(FixedAnalyzer)));
        let reconciler = Reconciler::new(
            objects.clone(),
            papers.clone(),
            generator,
            ReconcilerSettings {
                bucket: "papers".to_string(),
                interval: Duration::from_millis(5),
                stuck_after: Duration::from_secs(600),
                orphan_grace: Duration::from_secs(3600),
            },
        );
        Harness {
            objects,
            papers,
            reconciler,
        }
    }

    async fn paper_aged(h: &Harness, age: chrono::Duration) -> Paper {
        let paper = NewPaper::for_upload(Uuid::new_v4(), "paper.pdf", Uuid::new_v4())
            .into_paper(Utc::now() - age);
        h.papers.put_paper(paper.clone()).await;
        paper
    }

    async fn status_of(h: &Harness, paper: &Paper) -> PaperStatus {
        h.papers.find_paper(paper.id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_marks_analyzed_when_analysis_exists() {
        let h = harness();
        let paper = paper_aged(&h, chrono::Duration::seconds(5)).await;
        h.papers
            .put_analysis(Analysis::new(paper.id, AnalysisContent::default()))
            .await;

        let report = h.reconciler.run_once().await.unwrap();
        assert_eq!(report.statuses_repaired, 1);
        assert_eq!(status_of(&h, &paper).await, PaperStatus::Analyzed);
    }

    #[tokio::test]
    async fn test_regenerates_only_stuck_papers() {
        let h = harness();
        let stuck = paper_aged(&h, chrono::Duration::minutes(30)).await;
        let fresh = paper_aged(&h, chrono::Duration::seconds(5)).await;

        let report = h.reconciler.run_once().await.unwrap();
        assert_eq!(report.regenerated, 1);
        assert_eq!(status_of(&h, &stuck).await, PaperStatus::Analyzed);
        assert_eq!(status_of(&h, &fresh).await, PaperStatus::Processing);
        assert_eq!(h.papers.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_regenerates_missing_analysis() {
        let h = harness();
        let mut paper = NewPaper::for_upload(Uuid::new_v4(), "paper.pdf", Uuid::new_v4())
            .into_paper(Utc::now());
        paper.status = PaperStatus::Analyzed;
        h.papers.put_paper(paper.clone()).await;

        let report = h.reconciler.run_once().await.unwrap();
        assert_eq!(report.regenerated, 1);
        assert!(h.papers.find_analysis_by_paper(paper.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeps_old_orphans_only() {
        let h = harness();
        let options = UploadOptions::default();
        let paper = paper_aged(&h, chrono::Duration::seconds(5)).await;
        for path in [paper.file_path.as_str(), "old-orphan.pdf", "new-orphan.pdf"] {
            h.objects.upload("papers", path, b"%PDF", &options).await.unwrap();
        }
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        h.objects.set_created_at("papers", "old-orphan.pdf", long_ago).await;
        h.objects.set_created_at("papers", &paper.file_path, long_ago).await;

        let report = h.reconciler.run_once().await.unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(!h.objects.contains("papers", "old-orphan.pdf").await);
        assert!(h.objects.contains("papers", "new-orphan.pdf").await);
        assert!(h.objects.contains("papers", &paper.file_path).await);
    }

    #[tokio::test]
    async fn test_clean_store_reports_nothing() {
        let h = harness();
        assert!(h.reconciler.run_once().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let reconciler = Arc::new(h.reconciler);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.run(rx).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reconciler did not stop")
            .unwrap();
        assert!(h.objects.call_count() > 0);
    }
}
