//! Course entity
//!
//! Minimal existence record. Course catalog management (creation, enrollment,
//! staff rosters) lives outside this service; all we need here is something to
//! check `course_code` against before accepting a document upload or ingestion job.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub course_code: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document::Entity")]
    Documents,
    #[sea_orm(has_many = "super::ingestion_job::Entity")]
    IngestionJobs,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl Related<super::ingestion_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IngestionJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
