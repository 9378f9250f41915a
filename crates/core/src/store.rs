use std::error::Error as StdError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::query::ProjectQuerySpec;
use crate::types::{NewProject, Project, ProjectId, ProjectStatus};

/// Persistence boundary the project service depends on.
///
/// Implementations must hide soft-deleted records from every read and must
/// make each individual call atomic per record.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Persists a validated project, assigning its id and both timestamps from `now`.
    async fn insert(&self, project: &NewProject, now: DateTime<Utc>)
        -> Result<Project, StoreError>;

    /// Looks up a visible project.
    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    /// Lists visible projects matching the query, in the query's order.
    async fn find_all(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, StoreError>;

    /// Sets `status = next` and `updated_at = now` only if the record is
    /// visible and its status is still `expected`.
    async fn update_status(
        &self,
        id: ProjectId,
        expected: ProjectStatus,
        next: ProjectStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusWrite, StoreError>;

    /// Marks a visible project deleted. Returns `false` when nothing matched.
    async fn soft_delete(&self, id: ProjectId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    Applied(Project),
    /// The record was deleted or its status changed since it was read.
    Conflict,
}

/// Failure inside the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
    #[error("stored record is invalid: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}
