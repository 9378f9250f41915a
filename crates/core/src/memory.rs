use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::query::{ProjectQuerySpec, SortField, SortOrder};
use crate::store::{ProjectStore, StatusWrite, StoreError};
use crate::types::{NewProject, Project, ProjectId, ProjectStatus};

/// Process-local [`ProjectStore`] with the same visibility and
/// conditional-write rules as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    last_id: ProjectId,
    records: Vec<StoredProject>,
}

#[derive(Debug, Clone)]
struct StoredProject {
    project: Project,
    deleted_at: Option<DateTime<Utc>>,
}

impl StoredProject {
    fn visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl MemoryInner {
    fn visible_mut(&mut self, id: ProjectId) -> Option<&mut StoredProject> {
        self.records
            .iter_mut()
            .find(|record| record.project.id == id && record.visible())
    }
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn insert(
        &self,
        project: &NewProject,
        now: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        let mut inner = self.lock()?;
        inner.last_id += 1;
        let stored = Project {
            id: inner.last_id,
            name: project.name.clone(),
            client_name: project.client_name.clone(),
            status: project.status,
            start_date: project.start_date,
            end_date: project.end_date,
            created_at: now,
            updated_at: now,
        };
        inner.records.push(StoredProject {
            project: stored.clone(),
            deleted_at: None,
        });
        Ok(stored)
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .iter()
            .find(|record| record.project.id == id && record.visible())
            .map(|record| record.project.clone()))
    }

    async fn find_all(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, StoreError> {
        let inner = self.lock()?;
        let mut projects: Vec<Project> = inner
            .records
            .iter()
            .filter(|record| record.visible() && query.matches(&record.project))
            .map(|record| record.project.clone())
            .collect();
        drop(inner);

        // Stable sort: equal keys keep insertion order.
        projects.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::StartDate => a.start_date.cmp(&b.start_date),
            };
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(projects)
    }

    async fn update_status(
        &self,
        id: ProjectId,
        expected: ProjectStatus,
        next: ProjectStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusWrite, StoreError> {
        let mut inner = self.lock()?;
        match inner.visible_mut(id) {
            Some(record) if record.project.status == expected => {
                record.project.status = next;
                record.project.updated_at = now;
                Ok(StatusWrite::Applied(record.project.clone()))
            }
            _ => Ok(StatusWrite::Conflict),
        }
    }

    async fn soft_delete(&self, id: ProjectId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.visible_mut(id) {
            Some(record) => {
                record.deleted_at = Some(now);
                record.project.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
