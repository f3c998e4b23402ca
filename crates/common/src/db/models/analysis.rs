//! Analysis entity
//!
//! Structured fields are stored as JSONB and may be NULL.

use crate::errors::AppError;
use crate::types::{Analysis, AnalysisContent};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// One analysis per paper
    #[sea_orm(unique)]
    pub paper_id: Uuid,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub key_findings: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub methodology_notes: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub section_summaries: Option<Json>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub key_terms: Option<Json>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub citation_analysis: Option<Json>,

    pub generated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id",
        on_delete = "Cascade"
    )]
    Paper,
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn to_json<T: Serialize>(value: &Option<T>) -> std::result::Result<Option<Json>, AppError> {
    Ok(value.as_ref().map(serde_json::to_value).transpose()?)
}

fn from_json<T: serde::de::DeserializeOwned>(value: Option<Json>) -> std::result::Result<Option<T>, AppError> {
    Ok(value
        .filter(|v| !v.is_null())
        .map(serde_json::from_value)
        .transpose()?)
}

impl ActiveModel {
    pub fn from_analysis(analysis: &Analysis) -> std::result::Result<Self, AppError> {
        let content = &analysis.content;
        Ok(ActiveModel {
            id: Set(analysis.id),
            paper_id: Set(analysis.paper_id),
            summary: Set(content.summary.clone()),
            key_findings: Set(to_json(&content.key_findings)?),
            methodology_notes: Set(content.methodology_notes.clone()),
            section_summaries: Set(to_json(&content.section_summaries)?),
            key_terms: Set(to_json(&content.key_terms)?),
            citation_analysis: Set(to_json(&content.citation_analysis)?),
            generated_at: Set(analysis.generated_at.into()),
        })
    }
}

impl TryFrom<Model> for Analysis {
    type Error = AppError;

    fn try_from(model: Model) -> std::result::Result<Self, AppError> {
        Ok(Analysis {
            id: model.id,
            paper_id: model.paper_id,
            content: AnalysisContent {
                summary: model.summary,
                key_findings: from_json(model.key_findings)?,
                methodology_notes: model.methodology_notes,
                section_summaries: from_json(model.section_summaries)?,
                key_terms: from_json(model.key_terms)?,
                citation_analysis: from_json(model.citation_analysis)?,
            },
            generated_at: model.generated_at.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SectionSummaries;
    use chrono::Utc;

    #[test]
    fn test_null_columns_read_as_none() {
        let model = Model {
            id: Uuid::new_v4(),
            paper_id: Uuid::new_v4(),
            summary: None,
            key_findings: Some(serde_json::Value::Null),
            methodology_notes: None,
            section_summaries: None,
            key_terms: None,
            citation_analysis: None,
            generated_at: Utc::now().into(),
        };

        let analysis = Analysis::try_from(model).unwrap();
        assert!(analysis.content.key_findings.is_none());
        assert!(analysis.content.section_summaries.is_none());
    }

    #[test]
    fn test_sections_survive_jsonb_columns() {
        let mut sections = SectionSummaries::new();
        sections.insert("abstract", "A");
        sections.insert("results", "R");

        let json = to_json(&Some(sections.clone())).unwrap();
        let back: Option<SectionSummaries> = from_json(json).unwrap();
        assert_eq!(back, Some(sections));
    }
}
