//! Repository traits for task storage.
//!
//! Implemented by the host application's persistence layer; the cache core
//! only consumes these. Tests use an in-memory implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::tasks::{NewTaskRecord, StatusCounts, TaskPatch, TaskQueryFilter, TaskRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("task `{0}` not found")]
    NotFound(i64),
    #[error("persistence error: {message}")]
    Persistence { message: String },
}

impl RepoError {
    pub fn from_persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait TasksRepo: Send + Sync {
    async fn find_task(&self, id: i64) -> Result<Option<TaskRecord>, RepoError>;

    async fn list_tasks(&self, filter: &TaskQueryFilter) -> Result<Vec<TaskRecord>, RepoError>;

    async fn status_counts(&self, user_id: i64) -> Result<StatusCounts, RepoError>;
}

#[async_trait]
pub trait TasksWriteRepo: Send + Sync {
    async fn insert_task(&self, record: NewTaskRecord) -> Result<TaskRecord, RepoError>;

    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<TaskRecord, RepoError>;

    /// Delete the task, returning the deleted row.
    async fn delete_task(&self, id: i64) -> Result<TaskRecord, RepoError>;
}
