//! SeaORM entity models
//!
//! Database entities for the course-material ingestion service

mod course;
mod document;
mod ingestion_job;

pub use course::{
    ActiveModel as CourseActiveModel, Column as CourseColumn, Entity as CourseEntity,
    Model as Course,
};

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, DocumentStatus,
    Entity as DocumentEntity, Model as Document,
};

pub use ingestion_job::{
    ActiveModel as IngestionJobActiveModel, Column as IngestionJobColumn,
    Entity as IngestionJobEntity, IngestionMode, JobStatus, Model as IngestionJob,
};
