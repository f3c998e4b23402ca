//! Supabase PostgREST backend
//!
//! PostgREST has no multi-statement transactions, so `record_analysis` is two
//! ordered writes: the analysis insert, then the status update. A crash
//! between them leaves an analyzed-but-processing paper for the reconciler.

use super::PaperStore;
use crate::errors::{AppError, Result};
use crate::supabase::{ensure_success, SupabaseClient};
use crate::types::{Analysis, NewPaper, Paper, PaperStatus};
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const SERVICE: &str = "supabase-rest";
const PAPERS: &str = "/rest/v1/papers";
const ANALYSES: &str = "/rest/v1/analyses";

pub struct RestPaperStore {
    client: SupabaseClient,
}

#[derive(Serialize)]
struct PaperInsert<'a> {
    #[serde(flatten)]
    paper: &'a NewPaper,
    status: PaperStatus,
}

#[derive(Serialize)]
struct StatusPatch {
    status: PaperStatus,
}

impl RestPaperStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn rows<T: DeserializeOwned>(response: Response, what: &str) -> Result<Vec<T>> {
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Duplicate {
                message: format!("{} already exists: {}", what, body),
            });
        }
        Ok(ensure_success(response, SERVICE).await?.json().await?)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>> {
        let response = self
            .client
            .service_request(Method::GET, &format!("{}?{}", table, query))
            .send()
            .await?;
        Self::rows(response, table).await
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        what: &str,
    ) -> Result<T> {
        let response = self
            .client
            .service_request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        Self::rows(response, what)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::PersistFailed {
                entity: what.to_string(),
                message: "insert returned no rows".to_string(),
            })
    }
}

#[async_trait]
impl PaperStore for RestPaperStore {
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let body = PaperInsert {
            paper: &paper,
            status: PaperStatus::Processing,
        };
        self.insert(PAPERS, &body, "paper").await
    }

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
        let rows: Vec<Paper> = self
            .select(PAPERS, &format!("id=eq.{}&select=*", id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_paper_status(&self, id: Uuid, status: PaperStatus) -> Result<Paper> {
        let current = self
            .find_paper(id)
            .await?
            .ok_or_else(|| AppError::paper_not_found(id))?;

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

        // Guard on the observed status so a concurrent change is not overwritten
        let response = self
            .client
            .service_request(
                Method::PATCH,
                &format!("{}?id=eq.{}&status=eq.{}", PAPERS, id, current.status),
            )
            .header("Prefer", "return=representation")
            .json(&StatusPatch { status })
            .send()
            .await?;

        let rows: Vec<Paper> = Self::rows(response, "paper").await?;
        match rows.into_iter().next() {
            Some(paper) => Ok(paper),
            // Someone else moved it first; report what is there now
            None => self
                .find_paper(id)
                .await?
                .filter(|p| p.status == status)
                .ok_or_else(|| AppError::paper_not_found(id)),
        }
    }

    async fn delete_paper(&self, id: Uuid) -> Result<bool> {
        let response = self
            .client
            .service_request(Method::DELETE, &format!("{}?id=eq.{}", PAPERS, id))
            .header("Prefer", "return=representation")
            .send()
            .await?;

        let rows: Vec<serde_json::Value> = Self::rows(response, "paper").await?;
        Ok(!rows.is_empty())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        self.insert(ANALYSES, analysis, "analysis").await
    }

    async fn find_analysis_by_paper(&self, paper_id: Uuid) -> Result<Option<Analysis>> {
        let rows: Vec<Analysis> = self
            .select(ANALYSES, &format!("paper_id=eq.{}&select=*&limit=1", paper_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn record_analysis(&self, analysis: &Analysis) -> Result<Analysis> {
        let stored = self.insert_analysis(analysis).await?;
        self.update_paper_status(analysis.paper_id, PaperStatus::Analyzed)
            .await?;
        Ok(stored)
    }

    async fn list_papers_by_status(&self, status: PaperStatus) -> Result<Vec<Paper>> {
        self.select(
            PAPERS,
            &format!("status=eq.{}&select=*&order=upload_date.asc", status),
        )
        .await
    }

    async fn list_papers(&self, user_id: Uuid) -> Result<Vec<Paper>> {
        self.select(
            PAPERS,
            &format!("user_id=eq.{}&select=*&order=upload_date.desc", user_id),
        )
        .await
    }

    async fn ping(&self) -> Result<()> {
        let _: Vec<serde_json::Value> = self.select(PAPERS, "select=id&limit=1").await?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_insert_body() {
        let paper = NewPaper::for_upload(Uuid::nil(), "paper.pdf", Uuid::nil());
        let body = serde_json::to_value(PaperInsert {
            paper: &paper,
            status: PaperStatus::Processing,
        })
        .unwrap();

        assert_eq!(body["title"], "paper");
        assert_eq!(body["status"], "processing");
        assert_eq!(body["file_path"], format!("{}.pdf", Uuid::nil()));
    }

    #[test]
    fn test_paper_row_parsing() {
        let rows: Vec<Paper> = serde_json::from_value(serde_json::json!([{
            "id": Uuid::nil(),
            "title": "paper",
            "file_path": "x.pdf",
            "status": "analyzed",
            "user_id": Uuid::nil(),
            "upload_date": "2024-05-01T12:00:00+00:00"
        }]))
        .unwrap();

        assert_eq!(rows[0].status, PaperStatus::Analyzed);
    }

    mod postgrest {
        use super::*;
        use crate::config::SupabaseConfig;
        use crate::types::AnalysisContent;
        use axum::extract::State;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use chrono::Utc;
        use serde_json::{json, Value};
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        /// Minimal PostgREST stand-in holding a single paper row
        #[derive(Clone)]
        struct FakeRest {
            log: Arc<Mutex<Vec<&'static str>>>,
            paper: Arc<Mutex<Value>>,
            fail_patch: bool,
        }

        impl FakeRest {
            fn new(paper: &Paper, fail_patch: bool) -> Self {
                Self {
                    log: Arc::new(Mutex::new(Vec::new())),
                    paper: Arc::new(Mutex::new(serde_json::to_value(paper).unwrap())),
                    fail_patch,
                }
            }

            fn calls(&self) -> Vec<&'static str> {
                self.log.lock().unwrap().clone()
            }

            fn status(&self) -> Value {
                self.paper.lock().unwrap()["status"].clone()
            }
        }

        async fn insert_analysis(
            State(fake): State<FakeRest>,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            fake.log.lock().unwrap().push("insert analysis");
            (StatusCode::CREATED, Json(json!([body])))
        }

        async fn select_papers(State(fake): State<FakeRest>) -> Json<Value> {
            fake.log.lock().unwrap().push("select paper");
            Json(json!([fake.paper.lock().unwrap().clone()]))
        }

        async fn patch_paper(
            State(fake): State<FakeRest>,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            fake.log.lock().unwrap().push("update status");
            if fake.fail_patch {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "message": "unavailable" })),
                );
            }
            let mut paper = fake.paper.lock().unwrap();
            paper["status"] = body["status"].clone();
            (StatusCode::OK, Json(json!([paper.clone()])))
        }

        async fn serve(fake: FakeRest) -> RestPaperStore {
            let app = Router::new()
                .route(ANALYSES, post(insert_analysis))
                .route(PAPERS, get(select_papers).patch(patch_paper))
                .with_state(fake);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let config = SupabaseConfig {
                url: Some(format!("http://{}", addr)),
                anon_key: Some("anon".into()),
                service_key: Some("service".into()),
                ..Default::default()
            };
            RestPaperStore::new(SupabaseClient::new(&config, Duration::from_secs(5)).unwrap())
        }

        fn paper() -> Paper {
            NewPaper::for_upload(Uuid::new_v4(), "paper.pdf", Uuid::new_v4()).into_paper(Utc::now())
        }

        #[tokio::test]
        async fn test_record_analysis_inserts_before_status_update() {
            let paper = paper();
            let fake = FakeRest::new(&paper, false);
            let store = serve(fake.clone()).await;

            let analysis = Analysis::new(paper.id, AnalysisContent::default());
            let stored = store.record_analysis(&analysis).await.unwrap();

            assert_eq!(stored.id, analysis.id);
            assert_eq!(
                fake.calls(),
                vec!["insert analysis", "select paper", "update status"]
            );
            assert_eq!(fake.status(), "analyzed");
        }

        #[tokio::test]
        async fn test_failed_status_update_leaves_paper_processing() {
            let paper = paper();
            let fake = FakeRest::new(&paper, true);
            let store = serve(fake.clone()).await;

            let err = store
                .record_analysis(&Analysis::new(paper.id, AnalysisContent::default()))
                .await
                .unwrap_err();

            assert!(matches!(err, AppError::Upstream { .. }), "{:?}", err);
            // the analysis row is already written; the reconciler finishes the move
            assert_eq!(fake.calls()[0], "insert analysis");
            assert_eq!(fake.status(), "processing");
        }
    }
}
