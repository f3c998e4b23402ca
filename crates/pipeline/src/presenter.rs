//! Analysis page assembly
//!
//! Loads a paper and its analysis for the signed-in owner and renders the
//! six-tab view. Any field the stored analysis lacks is replaced by
//! placeholder content so every tab always has something to show.

use crate::notify::Notification;
use researchease_common::errors::{AppError, Result};
use researchease_common::types::{Analysis, Paper, PaperStatus};
use researchease_common::{PaperStore, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const FALLBACK_HEADING: &str = "Neural Network Approaches to Natural Language Processing";
const RESULTS_HEADING: &str = "Analysis Results";
const UNKNOWN: &str = "Unknown";

const FALLBACK_SUMMARY: &str = "This paper explores recent advancements in neural network approaches to natural language processing (NLP), with a focus on transformer architectures and their applications in various NLP tasks.";

const FALLBACK_FINDINGS: [&str; 4] = [
    "A systematic comparison of transformer-based models across multiple NLP tasks",
    "Analysis of computational efficiency and parameter optimization techniques",
    "Identification of remaining challenges and promising research directions",
    "A framework for evaluating ethical considerations in NLP model deployment",
];

const FALLBACK_SECTIONS: [(&str, &str); 3] = [
    ("Abstract", "Natural language processing (NLP) has been transformed by neural network approaches, particularly transformer-based architectures."),
    ("Introduction", "The introduction traces the evolution of NLP from rule-based systems to statistical approaches and finally to neural network models."),
    ("Literature Review", "This section examines prior work in neural NLP, focusing on the development of key architectures."),
];

const FALLBACK_METHODOLOGY: &str = "The paper employs a mixed-methods approach combining quantitative benchmarking with qualitative analysis of model architectures.";

const FALLBACK_TERMS: [(&str, &str, &str); 2] = [
    ("Transformer Architecture", "A neural network architecture introduced in the paper \"Attention Is All You Need\" (Vaswani et al., 2017).", "Architecture"),
    ("Self-Attention", "A mechanism that allows a model to weigh the importance of different words in a sequence relative to each other.", "Mechanism"),
];

const FALLBACK_REFERENCES: [(&str, &str, &str, &str); 2] = [
    (
        "Attention Is All You Need",
        "Vaswani, A., Shazeer, N., Parmar, N., Uszkoreit, J., Jones, L., Gomez, A. N., Kaiser, L., & Polosukhin, I.",
        "2017",
        "45,000+",
    ),
    (
        "BERT: Pre-training of Deep Bidirectional Transformers",
        "Devlin, J., Chang, M. W., Lee, K., & Toutanova, K.",
        "2019",
        "30,000+",
    ),
];

/// Tabs of the analysis view, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Summary,
    Sections,
    Methodology,
    Findings,
    Terminology,
    References,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Summary,
        Tab::Sections,
        Tab::Methodology,
        Tab::Findings,
        Tab::Terminology,
        Tab::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Summary => "summary",
            Tab::Sections => "sections",
            Tab::Methodology => "methodology",
            Tab::Findings => "findings",
            Tab::Terminology => "terminology",
            Tab::References => "references",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Summary => "Summary",
            Tab::Sections => "Sections",
            Tab::Methodology => "Methodology",
            Tab::Findings => "Findings",
            Tab::Terminology => "Terminology",
            Tab::References => "References",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::Validation {
                message: format!("unknown tab: {}", s),
                field: Some("tab".to_string()),
            })
    }
}

/// Single-select tab state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TabSet {
    active: Tab,
}

impl TabSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    pub fn select(&mut self, tab: Tab) {
        self.active = tab;
    }

    pub fn is_active(&self, tab: Tab) -> bool {
        self.active == tab
    }

    pub fn tabs(&self) -> &'static [Tab] {
        &Tab::ALL
    }
}

/// Whether the page has analysis content to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    Ready,
    /// Paper still processing, no analysis yet
    Pending,
    /// Paper marked analyzed but no analysis row exists
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSection {
    pub name: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTerm {
    pub term: String,
    pub definition: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedReference {
    pub title: String,
    pub authors: String,
    pub year: String,
    pub cited: String,
}

/// Display-ready analysis with every field filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedAnalysis {
    pub heading: String,
    pub authors: String,
    pub published: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub sections: Vec<RenderedSection>,
    pub methodology_notes: String,
    pub key_terms: Vec<RenderedTerm>,
    pub references: Vec<RenderedReference>,
    /// Fields that were filled from placeholder content
    pub fallbacks: Vec<&'static str>,
}

/// Body of the analysis page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageContent {
    Analysis(RenderedAnalysis),
    Unavailable { heading: String, message: String },
}

impl PageContent {
    fn unavailable() -> Self {
        PageContent::Unavailable {
            heading: "Analysis not available".to_string(),
            message: "The analysis for this paper is either in progress or has not been generated yet. Please check back later.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPage {
    pub paper: Paper,
    pub state: AnalysisState,
    /// e.g. "Analyzed on Mar 1, 2024 • PDF"
    pub analyzed_on: String,
    pub content: PageContent,
    pub tabs: TabSet,
    pub notifications: Vec<Notification>,
}

pub struct AnalysisPresenter {
    papers: Arc<dyn PaperStore>,
}

impl AnalysisPresenter {
    pub fn new(papers: Arc<dyn PaperStore>) -> Self {
        Self { papers }
    }

    /// Load the analysis page for a paper owned by the session user
    #[instrument(skip(self, session), fields(paper_id = %paper_id))]
    pub async fn load(&self, session: Option<&Session>, paper_id: Uuid) -> Result<AnalysisPage> {
        let session = session.ok_or(AppError::Unauthenticated)?;

        let paper = self
            .papers
            .find_paper(paper_id)
            .await?
            .filter(|p| p.user_id == session.user_id())
            .ok_or_else(|| AppError::paper_not_found(paper_id))?;

        let analysis = self.papers.find_analysis_by_paper(paper_id).await?;

        let (state, content, notifications) = match (&analysis, paper.status) {
            (Some(analysis), _) => (
                AnalysisState::Ready,
                PageContent::Analysis(render(Some(analysis))),
                Vec::new(),
            ),
            (None, PaperStatus::Processing) => {
                debug!("Analysis not generated yet");
                (
                    AnalysisState::Pending,
                    PageContent::unavailable(),
                    vec![Notification::analysis_in_progress()],
                )
            }
            (None, PaperStatus::Analyzed) => {
                error!("Paper is analyzed but has no analysis row");
                (
                    AnalysisState::Missing,
                    PageContent::unavailable(),
                    vec![Notification::analysis_not_found()],
                )
            }
        };

        Ok(AnalysisPage {
            analyzed_on: format!("Analyzed on {} • PDF", paper.upload_date.format("%b %-d, %Y")),
            paper,
            state,
            content,
            tabs: TabSet::new(),
            notifications,
        })
    }
}

/// Overlay stored analysis values on the placeholder content.
///
/// Text fields fall back when absent or empty; list fields fall back only
/// when absent.
pub fn render(analysis: Option<&Analysis>) -> RenderedAnalysis {
    let content = analysis.map(|a| &a.content);
    let mut fallbacks = Vec::new();

    let stored_summary = content
        .and_then(|c| c.summary.as_deref())
        .filter(|s| !s.is_empty());
    let heading = match stored_summary {
        Some(_) => RESULTS_HEADING,
        None => FALLBACK_HEADING,
    };
    let summary = stored_summary.map(str::to_string).unwrap_or_else(|| {
        fallbacks.push("summary");
        FALLBACK_SUMMARY.to_string()
    });

    let key_findings = match content.and_then(|c| c.key_findings.as_ref()) {
        Some(findings) => findings.clone(),
        None => {
            fallbacks.push("key_findings");
            FALLBACK_FINDINGS.iter().map(|s| s.to_string()).collect()
        }
    };

    let sections = match content.and_then(|c| c.section_summaries.as_ref()) {
        Some(sections) => sections
            .iter()
            .map(|(name, summary)| RenderedSection {
                name: capitalize(name),
                summary: summary.to_string(),
            })
            .collect(),
        None => {
            fallbacks.push("section_summaries");
            FALLBACK_SECTIONS
                .iter()
                .map(|(name, summary)| RenderedSection {
                    name: name.to_string(),
                    summary: summary.to_string(),
                })
                .collect()
        }
    };

    let methodology_notes = match content
        .and_then(|c| c.methodology_notes.as_deref())
        .filter(|s| !s.is_empty())
    {
        Some(notes) => notes.to_string(),
        None => {
            fallbacks.push("methodology_notes");
            FALLBACK_METHODOLOGY.to_string()
        }
    };

    let key_terms = match content
        .and_then(|c| c.key_terms.as_ref())
        .and_then(|k| k.terms.as_ref())
    {
        Some(terms) => terms
            .iter()
            .map(|t| RenderedTerm {
                term: t.term.clone(),
                definition: t.definition.clone(),
                tag: "Term".to_string(),
            })
            .collect(),
        None => {
            fallbacks.push("key_terms");
            FALLBACK_TERMS
                .iter()
                .map(|(term, definition, tag)| RenderedTerm {
                    term: term.to_string(),
                    definition: definition.to_string(),
                    tag: tag.to_string(),
                })
                .collect()
        }
    };

    let references = match content
        .and_then(|c| c.citation_analysis.as_ref())
        .and_then(|c| c.references.as_ref())
    {
        Some(refs) => refs
            .iter()
            .map(|r| RenderedReference {
                title: r.title.clone(),
                authors: r.authors.clone(),
                year: r.year.clone(),
                cited: format!("Cited {} times", r.citations),
            })
            .collect(),
        None => {
            fallbacks.push("references");
            FALLBACK_REFERENCES
                .iter()
                .map(|(title, authors, year, citations)| RenderedReference {
                    title: title.to_string(),
                    authors: authors.to_string(),
                    year: year.to_string(),
                    cited: format!("Cited {} times", citations),
                })
                .collect()
        }
    };

    RenderedAnalysis {
        heading: heading.to_string(),
        authors: UNKNOWN.to_string(),
        published: UNKNOWN.to_string(),
        summary,
        key_findings,
        sections,
        methodology_notes,
        key_terms,
        references,
        fallbacks,
    }
}

/// Upper-case the first character
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
