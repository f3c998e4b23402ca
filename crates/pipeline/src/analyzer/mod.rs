//! Analyzers turn a stored paper into analysis content
//!
//! Provides a unified interface for:
//! - The fixed placeholder analysis
//! - An LLM-backed analyzer working from the extracted PDF text

mod fixed;
mod llm;

pub use fixed::{fixed_analysis, FixedAnalyzer};
pub use llm::{LlmAnalyzer, LlmSettings};

use async_trait::async_trait;
use researchease_common::config::{AnalyzerKind, AppConfig};
use researchease_common::errors::Result;
use researchease_common::types::{AnalysisContent, PaperRef};
use researchease_common::{ObjectStore, PaperStore};
use std::sync::Arc;

/// Trait for analysis generation
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Produce analysis content for a paper
    async fn analyze(&self, paper: &PaperRef) -> Result<AnalysisContent>;

    /// Analyzer name for logs and metrics
    fn name(&self) -> &str;
}

/// Create an analyzer based on configuration
pub fn create_analyzer(
    config: &AppConfig,
    objects: Arc<dyn ObjectStore>,
    papers: Arc<dyn PaperStore>,
) -> Result<Arc<dyn Analyzer>> {
    match config.analysis.provider {
        AnalyzerKind::Fixed => Ok(Arc::new(FixedAnalyzer)),
        AnalyzerKind::Llm => {
            if config.analysis.api_key.is_none() {
                tracing::warn!("LLM analyzer selected without an API key; responses fall back to the fixed analysis");
            }
            let settings = LlmSettings::from_config(config);
            Ok(Arc::new(LlmAnalyzer::new(settings, objects, papers)?))
        }
    }
}
