//! Domain types shared by every ResearchEase backend
//!
//! These are the backend-neutral shapes of the `papers` and `analyses`
//! tables. Storage backends convert to and from them at their edges.

mod analysis;
mod paper;

pub use analysis::{
    Analysis, AnalysisContent, CitationAnalysis, KeyTerm, KeyTerms, Reference, SectionSummaries,
};
pub use paper::{storage_path, title_from_filename, NewPaper, Paper, PaperRef, PaperStatus};
