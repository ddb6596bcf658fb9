//! Document entity
//!
//! A course material file: its blob location, upload metadata, and current
//! lifecycle status. Ingestion jobs read these rows to decide what to process;
//! they never hold the file bytes themselves (see `common::blob`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Uploaded,
    Ingested,
    Failed,
}

impl From<String> for DocumentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "UPLOADED" => DocumentStatus::Uploaded,
            "INGESTED" => DocumentStatus::Ingested,
            "FAILED" => DocumentStatus::Failed,
            _ => DocumentStatus::Uploaded,
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Uploaded => "UPLOADED".to_string(),
            DocumentStatus::Ingested => "INGESTED".to_string(),
            DocumentStatus::Failed => "FAILED".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub course_code: String,

    /// Sanitized filename, safe to use as the tail of a blob key
    #[sea_orm(column_type = "Text")]
    pub filename: String,

    /// Blob store key the file content lives under
    #[sea_orm(column_type = "Text")]
    pub s3_key: String,

    #[sea_orm(column_type = "Text")]
    pub content_type: String,

    pub file_size: i64,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub uploaded_by: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn document_status(&self) -> DocumentStatus {
        DocumentStatus::from(self.status.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseCode",
        to = "super::course::Column::CourseCode"
    )]
    Course,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
