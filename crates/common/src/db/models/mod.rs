//! SeaORM entity models
//!
//! Database entities for the `papers` and `analyses` tables

pub mod analysis;
pub mod paper;

pub use paper::{
    ActiveModel as PaperActiveModel, Column as PaperColumn, Entity as PaperEntity,
    Model as PaperModel,
};

pub use analysis::{
    ActiveModel as AnalysisActiveModel, Column as AnalysisColumn, Entity as AnalysisEntity,
    Model as AnalysisModel,
};
