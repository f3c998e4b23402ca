//! Paper entity

use crate::errors::AppError;
use crate::types::{Paper, PaperStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// `{id}.{ext}` inside the papers bucket
    #[sea_orm(column_type = "Text", unique)]
    pub file_path: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub user_id: Uuid,

    pub upload_date: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::analysis::Entity")]
    Analysis,
}

impl Related<super::analysis::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Analysis.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Paper {
    type Error = AppError;

    fn try_from(model: Model) -> std::result::Result<Self, AppError> {
        let status: PaperStatus = model
            .status
            .parse()
            .map_err(|message| AppError::Internal { message })?;

        Ok(Paper {
            id: model.id,
            title: model.title,
            file_path: model.file_path,
            status,
            user_id: model.user_id,
            upload_date: model.upload_date.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(status: &str) -> Model {
        Model {
            id: Uuid::new_v4(),
            title: "paper.pdf".to_string(),
            file_path: "abc.pdf".to_string(),
            status: status.to_string(),
            user_id: Uuid::new_v4(),
            upload_date: Utc::now().into(),
        }
    }

    #[test]
    fn test_row_converts_to_paper() {
        let model = row("analyzed");
        let paper = Paper::try_from(model.clone()).unwrap();

        assert_eq!(paper.id, model.id);
        assert_eq!(paper.status, PaperStatus::Analyzed);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = Paper::try_from(row("archived")).unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }
}
