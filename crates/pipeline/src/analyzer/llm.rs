//! LLM-backed analyzer
//!
//! Downloads the stored PDF, extracts its text, and asks an OpenAI-compatible
//! chat endpoint for the analysis as a JSON object. Without an API key the
//! fixed analysis is returned instead.

use super::fixed::fixed_analysis;
use super::Analyzer;
use crate::pdf::{extract_text, PdfError};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use regex_lite::Regex;
use researchease_common::config::AppConfig;
use researchease_common::errors::{AppError, Result};
use researchease_common::types::{AnalysisContent, PaperRef};
use researchease_common::{ObjectStore, PaperStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a research assistant that reads academic papers and \
returns structured analyses as a single JSON object. Never include prose outside the JSON.";

const RESPONSE_SHAPE: &str = r#"{
  "summary": "string",
  "key_findings": ["string"],
  "methodology_notes": "string",
  "section_summaries": {"abstract": "string", "introduction": "string", "methodology": "string", "results": "string", "discussion": "string", "conclusion": "string"},
  "key_terms": {"terms": [{"term": "string", "definition": "string"}]},
  "citation_analysis": {"references": [{"title": "string", "authors": "string", "year": "string", "citations": "string"}]}
}"#;

/// LLM analyzer settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retry: Duration,
    pub max_input_chars: usize,
    pub bucket: String,
}

impl LlmSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.analysis.endpoint.clone(),
            api_key: config.analysis.api_key.clone(),
            model: config.analysis.model.clone(),
            timeout: Duration::from_secs(config.analysis.timeout_secs),
            max_retry: Duration::from_secs(config.analysis.max_retry_secs),
            max_input_chars: config.analysis.max_input_chars,
            bucket: config.storage.bucket.clone(),
        }
    }
}

pub struct LlmAnalyzer {
    settings: LlmSettings,
    client: reqwest::Client,
    objects: Arc<dyn ObjectStore>,
    papers: Arc<dyn PaperStore>,
    fence: Regex,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl LlmAnalyzer {
    pub fn new(
        settings: LlmSettings,
        objects: Arc<dyn ObjectStore>,
        papers: Arc<dyn PaperStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").map_err(|e| {
            AppError::Configuration {
                message: format!("invalid fence pattern: {}", e),
            }
        })?;

        Ok(Self {
            settings,
            client,
            objects,
            papers,
            fence,
        })
    }

    /// Extracted text of the paper's stored PDF
    async fn paper_text(&self, paper: &PaperRef) -> Result<String> {
        let stored = self
            .papers
            .find_paper(paper.id)
            .await?
            .ok_or_else(|| AppError::paper_not_found(paper.id))?;

        let bytes = self
            .objects
            .download(&self.settings.bucket, &stored.file_path)
            .await?;

        let text = extract_text(&bytes).map_err(|e| match e {
            PdfError::Load(_) | PdfError::NoText => AppError::AnalysisFailed {
                paper_id: paper.id.to_string(),
                message: e.to_string(),
            },
        })?;

        Ok(truncate_chars(&text, self.settings.max_input_chars).to_string())
    }

    fn build_prompt(&self, paper: &PaperRef, text: &str) -> String {
        format!(
            "Analyze the paper titled \"{}\".\n\n\
            Respond with a JSON object of exactly this shape:\n{}\n\n\
            Use lowercase section names. Give years and citation counts as short strings \
            such as \"2017\" and \"45000+\".\n\n\
            Paper text:\n{}",
            paper.title, RESPONSE_SHAPE, text
        )
    }

    /// One chat completion attempt, classified for retry
    async fn complete_once(
        &self,
        api_key: &str,
        prompt: &str,
    ) -> std::result::Result<String, backoff::Error<AppError>> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM request failed");
                backoff::Error::transient(AppError::Upstream {
                    service: "llm".to_string(),
                    message: format!("LLM API request failed: {}", e),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = AppError::Upstream {
                service: "llm".to_string(),
                message: format!("LLM API error {}: {}", status, body),
            };
            return if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = status.as_u16(), "LLM API returned a retryable status");
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            };
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::Upstream {
                service: "llm".to_string(),
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                backoff::Error::permanent(AppError::Upstream {
                    service: "llm".to_string(),
                    message: "Empty response from LLM".to_string(),
                })
            })
    }

    /// Parse the model's reply into analysis content
    fn parse_content(&self, paper: &PaperRef, reply: &str) -> Result<AnalysisContent> {
        let body = match self.fence.captures(reply).and_then(|c| c.get(1)) {
            Some(m) => m.as_str(),
            None => match (reply.find('{'), reply.rfind('}')) {
                (Some(start), Some(end)) if end > start => &reply[start..=end],
                _ => reply.trim(),
            },
        };

        let content: AnalysisContent =
            serde_json::from_str(body).map_err(|e| AppError::AnalysisFailed {
                paper_id: paper.id.to_string(),
                message: format!("model reply is not a valid analysis: {}", e),
            })?;

        if content == AnalysisContent::default() {
            return Err(AppError::AnalysisFailed {
                paper_id: paper.id.to_string(),
                message: "model reply contained no analysis fields".to_string(),
            });
        }

        Ok(content)
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    #[instrument(skip(self), fields(paper_id = %paper.id, model = %self.settings.model))]
    async fn analyze(&self, paper: &PaperRef) -> Result<AnalysisContent> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            debug!("No LLM API key configured, returning fixed analysis");
            return Ok(fixed_analysis());
        };

        let text = self.paper_text(paper).await?;
        let prompt = self.build_prompt(paper, &text);
        debug!(prompt_chars = prompt.len(), "Requesting analysis from LLM");

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.settings.max_retry),
            ..Default::default()
        };
        let reply = retry(backoff, || self.complete_once(api_key, &prompt))
            .await
            .map_err(|e| AppError::AnalysisFailed {
                paper_id: paper.id.to_string(),
                message: e.to_string(),
            })?;

        let content = self.parse_content(paper, &reply)?;
        info!(
            findings = content.key_findings.as_ref().map_or(0, Vec::len),
            "LLM analysis parsed"
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Longest prefix of `text` holding at most `max` characters
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use researchease_common::db::MemoryPaperStore;
    use researchease_common::storage::{MemoryObjectStore, UploadOptions};
    use researchease_common::types::NewPaper;
    use uuid::Uuid;

    fn settings(api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(1),
            max_retry: Duration::from_millis(10),
            max_input_chars: 100,
            bucket: "papers".to_string(),
        }
    }

    fn analyzer(
        api_key: Option<&str>,
    ) -> (LlmAnalyzer, Arc<MemoryObjectStore>, Arc<MemoryPaperStore>) {
        let objects = Arc::new(MemoryObjectStore::new());
        let papers = Arc::new(MemoryPaperStore::new());
        let analyzer = LlmAnalyzer::new(settings(api_key), objects.clone(), papers.clone()).unwrap();
        (analyzer, objects, papers)
    }

    fn paper_ref() -> PaperRef {
        PaperRef {
            id: Uuid::new_v4(),
            title: "Attention".to_string(),
        }
    }

    #[tokio::test]
    async fn test_without_api_key_returns_fixed_analysis() {
        let (analyzer, objects, papers) = analyzer(None);
        let content = analyzer.analyze(&paper_ref()).await.unwrap();

        assert_eq!(content, fixed_analysis());
        assert_eq!(objects.call_count(), 0);
        assert_eq!(papers.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_fails_before_any_request() {
        let (analyzer, objects, papers) = analyzer(Some("sk-test"));
        let paper = NewPaper::for_upload(Uuid::new_v4(), "broken.pdf", Uuid::new_v4())
            .into_paper(Utc::now());
        objects
            .upload("papers", &paper.file_path, b"not a pdf", &UploadOptions::default())
            .await
            .unwrap();
        papers.put_paper(paper.clone()).await;

        let err = analyzer.analyze(&paper.to_ref()).await.unwrap_err();
        assert!(matches!(err, AppError::AnalysisFailed { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_missing_paper_is_not_found() {
        let (analyzer, _, _) = analyzer(Some("sk-test"));
        let err = analyzer.analyze(&paper_ref()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let (analyzer, _, _) = analyzer(None);
        let reply = "Here you go:\n```json\n{\"summary\": \"Short\", \"key_findings\": [\"A\"], \
                     \"citation_analysis\": {\"references\": [{\"title\": \"T\", \"authors\": \"X\", \"year\": 2017, \"citations\": \"10+\"}]}}\n```";
        let content = analyzer.parse_content(&paper_ref(), reply).unwrap();

        assert_eq!(content.summary.as_deref(), Some("Short"));
        assert_eq!(content.key_findings, Some(vec!["A".to_string()]));
        let refs = content.citation_analysis.unwrap().references.unwrap();
        assert_eq!(refs[0].year, "2017");
    }

    #[test]
    fn test_parse_rejects_empty_or_invalid_reply() {
        let (analyzer, _, _) = analyzer(None);
        assert!(matches!(
            analyzer.parse_content(&paper_ref(), "{}"),
            Err(AppError::AnalysisFailed { .. })
        ));
        assert!(matches!(
            analyzer.parse_content(&paper_ref(), "I cannot help with that."),
            Err(AppError::AnalysisFailed { .. })
        ));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
