//! Analysis generation and persistence
//!
//! Produces an analysis for an uploaded paper and records it together with
//! the paper's move to `analyzed`. A paper holds at most one analysis, so
//! generating again returns the stored row.

use crate::analyzer::Analyzer;
use researchease_common::errors::{AppError, Result};
use researchease_common::metrics;
use researchease_common::types::{Analysis, PaperRef, PaperStatus};
use researchease_common::PaperStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct AnalysisGenerator {
    papers: Arc<dyn PaperStore>,
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisGenerator {
    pub fn new(papers: Arc<dyn PaperStore>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { papers, analyzer }
    }

    pub fn analyzer_name(&self) -> &str {
        self.analyzer.name()
    }

    /// Generate and persist the analysis for a paper.
    ///
    /// Store failures surface as `PersistFailed`; analyzer failures as
    /// `AnalysisFailed` carrying the paper id.
    #[instrument(skip(self), fields(analyzer = %self.analyzer.name()))]
    pub async fn generate(&self, paper_id: Uuid, title: &str) -> Result<Analysis> {
        let existing = self
            .papers
            .find_analysis_by_paper(paper_id)
            .await
            .map_err(|e| e.into_persist_failed("analysis"))?;

        if let Some(analysis) = existing {
            info!("Analysis already recorded, reusing it");
            self.papers
                .update_paper_status(paper_id, PaperStatus::Analyzed)
                .await
                .map_err(|e| e.into_persist_failed("paper"))?;
            return Ok(analysis);
        }

        let start = Instant::now();
        let paper = PaperRef {
            id: paper_id,
            title: title.to_string(),
        };

        let content = match self.analyzer.analyze(&paper).await {
            Ok(content) => content,
            Err(e) => {
                metrics::record_analysis(start.elapsed().as_secs_f64(), self.analyzer.name(), false);
                warn!(error = %e, "Analyzer failed");
                return Err(match e {
                    AppError::AnalysisFailed { .. } => e,
                    other => AppError::AnalysisFailed {
                        paper_id: paper_id.to_string(),
                        message: other.to_string(),
                    },
                });
            }
        };

        let recorded = self
            .papers
            .record_analysis(&Analysis::new(paper_id, content))
            .await;
        metrics::record_analysis(
            start.elapsed().as_secs_f64(),
            self.analyzer.name(),
            recorded.is_ok(),
        );

        match recorded {
            Ok(analysis) => {
                info!(analysis_id = %analysis.id, "Analysis recorded");
                Ok(analysis)
            }
            // Lost a race with another generator for the same paper
            Err(AppError::Duplicate { .. }) => {
                warn!("Analysis was recorded concurrently, returning the stored row");
                self.papers
                    .find_analysis_by_paper(paper_id)
                    .await
                    .map_err(|e| e.into_persist_failed("analysis"))?
                    .ok_or_else(|| AppError::PersistFailed {
                        entity: "analysis".to_string(),
                        message: format!("analysis for paper {} vanished after conflict", paper_id),
                    })
            }
            Err(e) => Err(e.into_persist_failed("analysis")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{fixed_analysis, FixedAnalyzer};
    use async_trait::async_trait;
    use chrono::Utc;
    use researchease_common::db::MemoryPaperStore;
    use researchease_common::types::{AnalysisContent, NewPaper, Paper};

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, _paper: &PaperRef) -> Result<AnalysisContent> {
            Err(AppError::Upstream {
                service: "llm".to_string(),
                message: "overloaded".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Records a competing analysis for the same paper while "working"
    struct RacingAnalyzer {
        store: Arc<MemoryPaperStore>,
        winner: tokio::sync::Mutex<Option<Uuid>>,
    }

    #[async_trait]
    impl Analyzer for RacingAnalyzer {
        async fn analyze(&self, paper: &PaperRef) -> Result<AnalysisContent> {
            let rival = self
                .store
                .record_analysis(&Analysis::new(paper.id, fixed_analysis()))
                .await?;
            *self.winner.lock().await = Some(rival.id);
            Ok(AnalysisContent::default())
        }

        fn name(&self) -> &str {
            "racing"
        }
    }

    async fn seeded() -> (Arc<MemoryPaperStore>, Paper) {
        let store = Arc::new(MemoryPaperStore::new());
        let paper = NewPaper::for_upload(Uuid::new_v4(), "paper.pdf", Uuid::new_v4())
            .into_paper(Utc::now());
        store.put_paper(paper.clone()).await;
        (store, paper)
    }

    #[tokio::test]
    async fn test_generate_records_one_analysis_and_marks_analyzed() {
        let (store, paper) = seeded().await;
        let generator = AnalysisGenerator::new(store.clone(), Arc::new(FixedAnalyzer));

        let analysis = generator.generate(paper.id, &paper.title).await.unwrap();
        assert_eq!(analysis.paper_id, paper.id);
        assert_eq!(analysis.content, fixed_analysis());

        let stored = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Analyzed);
        assert_eq!(store.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_generate_twice_reuses_existing_row() {
        let (store, paper) = seeded().await;
        let generator = AnalysisGenerator::new(store.clone(), Arc::new(FixedAnalyzer));

        let first = generator.generate(paper.id, &paper.title).await.unwrap();
        let second = generator.generate(paper.id, &paper.title).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_generation_returns_the_stored_row() {
        let (store, paper) = seeded().await;
        let analyzer = Arc::new(RacingAnalyzer {
            store: store.clone(),
            winner: tokio::sync::Mutex::new(None),
        });
        let generator = AnalysisGenerator::new(store.clone(), analyzer.clone());

        let analysis = generator.generate(paper.id, &paper.title).await.unwrap();

        let winner = (*analyzer.winner.lock().await).expect("rival recorded first");
        assert_eq!(analysis.id, winner);
        assert_eq!(analysis.content, fixed_analysis());
        assert_eq!(store.analysis_count().await, 1);

        let stored = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Analyzed);
    }

    #[tokio::test]
    async fn test_existing_analysis_repairs_status() {
        let (store, paper) = seeded().await;
        store
            .put_analysis(Analysis::new(paper.id, AnalysisContent::default()))
            .await;
        let generator = AnalysisGenerator::new(store.clone(), Arc::new(FailingAnalyzer));

        generator.generate(paper.id, &paper.title).await.unwrap();
        let stored = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Analyzed);
    }

    #[tokio::test]
    async fn test_analyzer_failure_carries_paper_id() {
        let (store, paper) = seeded().await;
        let generator = AnalysisGenerator::new(store.clone(), Arc::new(FailingAnalyzer));

        let err = generator.generate(paper.id, &paper.title).await.unwrap_err();
        match err {
            AppError::AnalysisFailed { paper_id, .. } => assert_eq!(paper_id, paper.id.to_string()),
            other => panic!("unexpected error: {:?}", other),
        }

        let stored = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Processing);
        assert_eq!(store.analysis_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_persist_failed() {
        let (store, paper) = seeded().await;
        store.fail_analysis_writes(true);
        let generator = AnalysisGenerator::new(store.clone(), Arc::new(FixedAnalyzer));

        let err = generator.generate(paper.id, &paper.title).await.unwrap_err();
        assert!(matches!(err, AppError::PersistFailed { .. }), "{:?}", err);

        let stored = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::Processing);
        assert_eq!(store.analysis_count().await, 0);
    }
}
