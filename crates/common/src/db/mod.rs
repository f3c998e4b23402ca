//! Relational persistence for papers and analyses
//!
//! Provides:
//! - The `PaperStore` trait used by the workflow, presenter and reconciler
//! - SeaORM entity models
//! - Postgres (SeaORM), Supabase PostgREST and in-memory backends

pub mod models;
mod memory;
mod postgres;
mod rest;

pub use memory::MemoryPaperStore;
pub use postgres::{DbPool, PostgresPaperStore};
pub use rest::RestPaperStore;

use crate::config::{AppConfig, DatabaseBackend};
use crate::errors::Result;
use crate::supabase::SupabaseClient;
use crate::types::{Analysis, NewPaper, Paper, PaperStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Gateway to the `papers` and `analyses` tables
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Insert a paper row with status `processing`
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper>;

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>>;

    /// Move a paper to `status`; backwards moves fail with `InvalidTransition`
    async fn update_paper_status(&self, id: Uuid, status: PaperStatus) -> Result<Paper>;

    /// Returns whether a row was deleted
    async fn delete_paper(&self, id: Uuid) -> Result<bool>;

    /// Insert an analysis row; a second analysis for a paper is `Duplicate`
    async fn insert_analysis(&self, analysis: &Analysis) -> Result<Analysis>;

    async fn find_analysis_by_paper(&self, paper_id: Uuid) -> Result<Option<Analysis>>;

    /// Insert the analysis and mark its paper `analyzed`
    async fn record_analysis(&self, analysis: &Analysis) -> Result<Analysis>;

    /// Papers in a given status, oldest first
    async fn list_papers_by_status(&self, status: PaperStatus) -> Result<Vec<Paper>>;

    /// A user's papers, newest first
    async fn list_papers(&self, user_id: Uuid) -> Result<Vec<Paper>>;

    async fn ping(&self) -> Result<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &str;
}

/// Create a paper store based on configuration
pub async fn create_paper_store(config: &AppConfig) -> Result<Arc<dyn PaperStore>> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let pool = DbPool::new(&config.database).await?;
            let store = PostgresPaperStore::new(pool);
            if config.database.run_migrations {
                store.migrate().await?;
            }
            info!("Using Postgres paper store");
            Ok(Arc::new(store))
        }
        DatabaseBackend::Rest => {
            let client = SupabaseClient::new(
                &config.supabase,
                Duration::from_secs(config.storage.timeout_secs),
            )?;
            info!("Using Supabase REST paper store");
            Ok(Arc::new(RestPaperStore::new(client)))
        }
        DatabaseBackend::Memory => {
            warn!("Using in-memory paper store; papers are lost on restart");
            Ok(Arc::new(MemoryPaperStore::new()))
        }
    }
}
