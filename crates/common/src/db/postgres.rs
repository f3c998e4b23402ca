//! Postgres backend through SeaORM
//!
//! `record_analysis` runs inside a transaction so the analysis row and the
//! status change land together.

use super::models::*;
use super::PaperStore;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::types::{Analysis, NewPaper, Paper, PaperStatus};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS papers (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'processing',
    user_id UUID NOT NULL,
    upload_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_papers_user_id ON papers (user_id);
CREATE INDEX IF NOT EXISTS idx_papers_status ON papers (status);

CREATE TABLE IF NOT EXISTS analyses (
    id UUID PRIMARY KEY,
    paper_id UUID NOT NULL UNIQUE REFERENCES papers (id) ON DELETE CASCADE,
    summary TEXT,
    key_findings JSONB,
    methodology_notes TEXT,
    section_summaries JSONB,
    key_terms JSONB,
    citation_analysis JSONB,
    generated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts).await?;

        info!("Database connection established");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn.execute_unprepared("SELECT 1").await?;
        Ok(())
    }
}

/// `PaperStore` backed by Postgres
#[derive(Clone)]
pub struct PostgresPaperStore {
    pool: DbPool,
}

impl PostgresPaperStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        self.pool.conn().execute_unprepared(SCHEMA).await?;
        info!("Database schema ensured");
        Ok(())
    }

    async fn transition<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        status: PaperStatus,
    ) -> Result<Paper> {
        let model = PaperEntity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::paper_not_found(id))?;

        let current: Paper = model.clone().try_into()?;
        if !current.status.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                paper_id: id.to_string(),
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        if current.status == status {
            return Ok(current);
        }

        let mut active: PaperActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.update(conn).await?.try_into()
    }
}

/// Unique-key violations become `Duplicate`
fn map_insert_error(err: DbErr, what: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::Duplicate {
            message: format!("{} already exists: {}", what, detail),
        },
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl PaperStore for PostgresPaperStore {
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let active = PaperActiveModel {
            id: Set(paper.id),
            title: Set(paper.title),
            file_path: Set(paper.file_path),
            status: Set(PaperStatus::Processing.as_str().to_string()),
            user_id: Set(paper.user_id),
            upload_date: Set(Utc::now().into()),
        };

        active
            .insert(self.pool.conn())
            .await
            .map_err(|e| map_insert_error(e, "paper"))?
            .try_into()
    }

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(id)
            .one(self.pool.conn())
            .await?
            .map(Paper::try_from)
            .transpose()
    }

    async fn update_paper_status(&self, id: Uuid, status: PaperStatus) -> Result<Paper> {
        Self::transition(self.pool.conn(), id, status).await
    }

    async fn delete_paper(&self, id: Uuid) -> Result<bool> {
        let result = PaperEntity::delete_by_id(id).exec(self.pool.conn()).await?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        AnalysisActiveModel::from_analysis(analysis)?
            .insert(self.pool.conn())
            .await
            .map_err(|e| map_insert_error(e, "analysis"))?
            .try_into()
    }

    async fn find_analysis_by_paper(&self, paper_id: Uuid) -> Result<Option<Analysis>> {
        AnalysisEntity::find()
            .filter(AnalysisColumn::PaperId.eq(paper_id))
            .one(self.pool.conn())
            .await?
            .map(Analysis::try_from)
            .transpose()
    }

    async fn record_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        let txn = self.pool.conn().begin().await?;

        let stored: Analysis = AnalysisActiveModel::from_analysis(analysis)?
            .insert(&txn)
            .await
            .map_err(|e| map_insert_error(e, "analysis"))?
            .try_into()?;

        Self::transition(&txn, analysis.paper_id, PaperStatus::Analyzed).await?;

        txn.commit().await?;
        debug!(paper_id = %analysis.paper_id, "Analysis recorded");
        Ok(stored)
    }

    async fn list_papers_by_status(&self, status: PaperStatus) -> Result<Vec<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::Status.eq(status.as_str()))
            .order_by_asc(PaperColumn::UploadDate)
            .all(self.pool.conn())
            .await?
            .into_iter()
            .map(Paper::try_from)
            .collect()
    }

    async fn list_papers(&self, user_id: Uuid) -> Result<Vec<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::UserId.eq(user_id))
            .order_by_desc(PaperColumn::UploadDate)
            .all(self.pool.conn())
            .await?
            .into_iter()
            .map(Paper::try_from)
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
