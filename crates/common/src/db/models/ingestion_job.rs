//! Ingestion job entity
//!
//! One row per submitted ingestion job. The status column is the job's state
//! machine; `claim`/`cancel`/`retry` in `repository.rs` are the only writers
//! that may move it, each via a conditional `UPDATE ... WHERE status = ...`
//! so a job is claimed by exactly one worker task.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document selection mode for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestionMode {
    /// Documents uploaded since this course's last successful ingestion
    New,
    /// An explicit, caller-provided list of document ids
    Selected,
    /// Every document belonging to the course
    All,
    /// Every document belonging to the course, regardless of prior ingestion status
    Reingest,
}

impl From<String> for IngestionMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => IngestionMode::New,
            "SELECTED" => IngestionMode::Selected,
            "ALL" => IngestionMode::All,
            "REINGEST" => IngestionMode::Reingest,
            _ => IngestionMode::New,
        }
    }
}

impl From<IngestionMode> for String {
    fn from(mode: IngestionMode) -> Self {
        match mode {
            IngestionMode::New => "NEW".to_string(),
            IngestionMode::Selected => "SELECTED".to_string(),
            IngestionMode::All => "ALL".to_string(),
            IngestionMode::Reingest => "REINGEST".to_string(),
        }
    }
}

/// Job status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "QUEUED" => JobStatus::Queued,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELED" => JobStatus::Canceled,
            _ => JobStatus::Queued,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => "QUEUED".to_string(),
            JobStatus::Running => "RUNNING".to_string(),
            JobStatus::Completed => "COMPLETED".to_string(),
            JobStatus::Failed => "FAILED".to_string(),
            JobStatus::Canceled => "CANCELED".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingestion_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub course_code: String,

    #[sea_orm(column_type = "Text")]
    pub mode: String,

    /// Document ids named by a SELECTED-mode request; empty for NEW/ALL/REINGEST
    #[sea_orm(column_type = "JsonBinary")]
    pub document_ids: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Fixed at creation time to the selector's result size; never rewritten
    pub docs_total: i32,

    pub docs_done: i32,

    pub vectors_created: i32,

    pub retry_count: i32,

    pub max_retries: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub created_by: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn job_status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }

    pub fn ingestion_mode(&self) -> IngestionMode {
        IngestionMode::from(self.mode.clone())
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.job_status(),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Calculate progress percentage over documents processed so far
    pub fn progress_percent(&self) -> f64 {
        if self.docs_total == 0 {
            0.0
        } else {
            (self.docs_done as f64 / self.docs_total as f64) * 100.0
        }
    }

    /// document_ids as a typed vector, for SELECTED-mode jobs
    pub fn document_ids_vec(&self) -> Vec<Uuid> {
        serde_json::from_value(self.document_ids.clone()).unwrap_or_default()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_zero_total() {
        let model = Model {
            id: Uuid::nil(),
            course_code: "CS101".into(),
            mode: "ALL".into(),
            document_ids: serde_json::json!([]),
            status: "QUEUED".into(),
            docs_total: 0,
            docs_done: 0,
            vectors_created: 0,
            retry_count: 0,
            max_retries: 2,
            error_message: None,
            created_by: "prof@example.edu".into(),
            created_at: chrono::Utc::now().into(),
            updated_at: chrono::Utc::now().into(),
            started_at: None,
            completed_at: None,
        };
        assert_eq!(model.progress_percent(), 0.0);
        assert!(!model.is_terminal());
    }
}
