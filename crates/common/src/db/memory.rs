//! In-memory backend
//!
//! Both tables sit behind one lock, so `record_analysis` is atomic. Calls are
//! counted and writes can be made to fail for exercising the workflow.

use super::PaperStore;
use crate::errors::{AppError, Result};
use crate::types::{Analysis, NewPaper, Paper, PaperStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    papers: HashMap<Uuid, Paper>,
    // keyed by paper id
    analyses: HashMap<Uuid, Analysis>,
}

#[derive(Default)]
pub struct MemoryPaperStore {
    tables: RwLock<Tables>,
    calls: AtomicUsize,
    fail_paper_inserts: AtomicBool,
    fail_analysis_writes: AtomicBool,
    fail_status_updates: AtomicBool,
}

impl MemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_paper_inserts(&self, fail: bool) {
        self.fail_paper_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_analysis_writes(&self, fail: bool) {
        self.fail_analysis_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    pub async fn paper_count(&self) -> usize {
        self.tables.read().await.papers.len()
    }

    pub async fn analysis_count(&self) -> usize {
        self.tables.read().await.analyses.len()
    }

    /// Seed a paper directly, bypassing counters and fault injection
    pub async fn put_paper(&self, paper: Paper) {
        self.tables.write().await.papers.insert(paper.id, paper);
    }

    /// Seed an analysis directly, bypassing counters and fault injection
    pub async fn put_analysis(&self, analysis: Analysis) {
        self.tables
            .write()
            .await
            .analyses
            .insert(analysis.paper_id, analysis);
    }

    /// Rewrite a paper's upload date, for exercising age-based sweeps
    pub async fn set_upload_date(&self, id: Uuid, upload_date: DateTime<Utc>) {
        if let Some(paper) = self.tables.write().await.papers.get_mut(&id) {
            paper.upload_date = upload_date;
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::Internal {
                message: format!("{} write rejected", what),
            });
        }
        Ok(())
    }

    fn transition(tables: &mut Tables, id: Uuid, status: PaperStatus) -> Result<Paper> {
        let paper = tables
            .papers
            .get_mut(&id)
            .ok_or_else(|| AppError::paper_not_found(id))?;

        if !paper.status.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                paper_id: id.to_string(),
                from: paper.status.to_string(),
                to: status.to_string(),
            });
        }

        paper.status = status;
        Ok(paper.clone())
    }

    fn insert_analysis_row(tables: &mut Tables, analysis: &Analysis) -> Result<Analysis> {
        if !tables.papers.contains_key(&analysis.paper_id) {
            return Err(AppError::paper_not_found(analysis.paper_id));
        }
        if tables.analyses.contains_key(&analysis.paper_id) {
            return Err(AppError::Duplicate {
                message: format!("analysis for paper {} already exists", analysis.paper_id),
            });
        }

        tables.analyses.insert(analysis.paper_id, analysis.clone());
        Ok(analysis.clone())
    }
}

#[async_trait]
impl PaperStore for MemoryPaperStore {
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper> {
        self.record_call();
        Self::injected(&self.fail_paper_inserts, "paper")?;

        let mut tables = self.tables.write().await;
        if tables.papers.contains_key(&paper.id)
            || tables.papers.values().any(|p| p.file_path == paper.file_path)
        {
            return Err(AppError::Duplicate {
                message: format!("paper {} already exists", paper.id),
            });
        }

        let paper = paper.into_paper(Utc::now());
        tables.papers.insert(paper.id, paper.clone());
        Ok(paper)
    }

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
        self.record_call();
        Ok(self.tables.read().await.papers.get(&id).cloned())
    }

    async fn update_paper_status(&self, id: Uuid, status: PaperStatus) -> Result<Paper> {
        self.record_call();
        Self::injected(&self.fail_status_updates, "status")?;
        Self::transition(&mut *self.tables.write().await, id, status)
    }

    async fn delete_paper(&self, id: Uuid) -> Result<bool> {
        self.record_call();
        let mut tables = self.tables.write().await;
        tables.analyses.remove(&id);
        Ok(tables.papers.remove(&id).is_some())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        self.record_call();
        Self::injected(&self.fail_analysis_writes, "analysis")?;
        Self::insert_analysis_row(&mut *self.tables.write().await, analysis)
    }

    async fn find_analysis_by_paper(&self, paper_id: Uuid) -> Result<Option<Analysis>> {
        self.record_call();
        Ok(self.tables.read().await.analyses.get(&paper_id).cloned())
    }

    async fn record_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        self.record_call();
        Self::injected(&self.fail_analysis_writes, "analysis")?;
        Self::injected(&self.fail_status_updates, "status")?;

        let mut tables = self.tables.write().await;

        // Validate the transition before touching either table
        let status = tables
            .papers
            .get(&analysis.paper_id)
            .map(|p| p.status)
            .ok_or_else(|| AppError::paper_not_found(analysis.paper_id))?;
        if !status.can_transition_to(PaperStatus::Analyzed) {
            return Err(AppError::InvalidTransition {
                paper_id: analysis.paper_id.to_string(),
                from: status.to_string(),
                to: PaperStatus::Analyzed.to_string(),
            });
        }

        let stored = Self::insert_analysis_row(&mut tables, analysis)?;
        Self::transition(&mut tables, analysis.paper_id, PaperStatus::Analyzed)?;
        Ok(stored)
    }

    async fn list_papers_by_status(&self, status: PaperStatus) -> Result<Vec<Paper>> {
        self.record_call();
        let mut papers: Vec<Paper> = self
            .tables
            .read()
            .await
            .papers
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        papers.sort_by_key(|p| p.upload_date);
        Ok(papers)
    }

    async fn list_papers(&self, user_id: Uuid) -> Result<Vec<Paper>> {
        self.record_call();
        let mut papers: Vec<Paper> = self
            .tables
            .read()
            .await
            .papers
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        papers.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(papers)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisContent;

    async fn seeded() -> (MemoryPaperStore, Paper) {
        let store = MemoryPaperStore::new();
        let paper = store
            .insert_paper(NewPaper::for_upload(Uuid::new_v4(), "paper.pdf", Uuid::new_v4()))
            .await
            .unwrap();
        (store, paper)
    }

    #[tokio::test]
    async fn test_insert_starts_processing() {
        let (store, paper) = seeded().await;
        assert_eq!(paper.status, PaperStatus::Processing);

        let found = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(found, paper);
    }

    #[tokio::test]
    async fn test_record_analysis_marks_analyzed() {
        let (store, paper) = seeded().await;
        let analysis = Analysis::new(paper.id, AnalysisContent::default());

        store.record_analysis(&analysis).await.unwrap();

        let found = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(found.status, PaperStatus::Analyzed);
        assert_eq!(store.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_second_analysis_is_rejected() {
        let (store, paper) = seeded().await;
        store
            .record_analysis(&Analysis::new(paper.id, AnalysisContent::default()))
            .await
            .unwrap();

        let err = store
            .insert_analysis(&Analysis::new(paper.id, AnalysisContent::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
        assert_eq!(store.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_cannot_move_backwards() {
        let (store, paper) = seeded().await;
        store
            .update_paper_status(paper.id, PaperStatus::Analyzed)
            .await
            .unwrap();

        let err = store
            .update_paper_status(paper.id, PaperStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_failed_record_leaves_no_partial_state() {
        let (store, paper) = seeded().await;
        store.fail_status_updates(true);

        assert!(store
            .record_analysis(&Analysis::new(paper.id, AnalysisContent::default()))
            .await
            .is_err());
        assert_eq!(store.analysis_count().await, 0);
        let found = store.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(found.status, PaperStatus::Processing);
    }

    #[tokio::test]
    async fn test_list_papers_is_per_user() {
        let (store, paper) = seeded().await;
        store
            .insert_paper(NewPaper::for_upload(Uuid::new_v4(), "other.pdf", Uuid::new_v4()))
            .await
            .unwrap();

        let mine = store.list_papers(paper.user_id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, paper.id);
    }
}
