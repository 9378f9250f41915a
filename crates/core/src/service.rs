use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::policy::{StatusTransitionPolicy, TransitionDecision};
use crate::query::ProjectQuerySpec;
use crate::store::{ProjectStore, StatusWrite, StoreError};
use crate::types::{NewProject, Project, ProjectDraft, ProjectId, ProjectStatus, ValidationError};

/// Source of "now" for timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Conditional writes that lose a race are re-decided at most this many times.
const MAX_STATUS_ATTEMPTS: usize = 3;

/// Entry point for every project operation exposed to callers.
#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn ProjectStore>,
    clock: Clock,
}

impl ProjectService {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Validates the draft and persists it, returning the stored entity.
    pub async fn create(&self, draft: ProjectDraft) -> Result<Project, ServiceError> {
        let project = NewProject::from_draft(draft)?;
        let created = self.store.insert(&project, self.now()).await?;
        info!(stage = "service", project_id = created.id, status = %created.status, "project created");
        Ok(created)
    }

    /// Lists visible projects. An empty result is not an error.
    pub async fn list(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, ServiceError> {
        let projects = self.store.find_all(query).await?;
        debug!(stage = "service", count = projects.len(), sort_by = query.sort_by.as_str(), sort_order = query.sort_order.as_str(), "projects listed");
        Ok(projects)
    }

    pub async fn get_by_id(&self, id: ProjectId) -> Result<Project, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Moves a project to `requested`.
    ///
    /// Requesting the current status returns the entity untouched, without
    /// bumping `updated_at`. The write is conditional on the status that was
    /// read; when another writer got there first the record is re-read and
    /// the request decided again.
    pub async fn update_status(
        &self,
        id: ProjectId,
        requested: ProjectStatus,
    ) -> Result<Project, ServiceError> {
        for attempt in 1..=MAX_STATUS_ATTEMPTS {
            let current = self.get_by_id(id).await?;
            let decision = StatusTransitionPolicy::decide(current.status, requested);
            debug!(stage = "service", project_id = id, attempt, from = %current.status, to = %requested, decision = decision.as_str(), "status transition decided");

            match decision {
                TransitionDecision::Unchanged => return Ok(current),
                TransitionDecision::Rejected => {
                    return Err(ServiceError::Validation(ValidationError::new(format!(
                        "Invalid status transition from {} to {}",
                        current.status, requested
                    ))))
                }
                TransitionDecision::Allowed => {}
            }

            match self
                .store
                .update_status(id, current.status, requested, self.now())
                .await?
            {
                StatusWrite::Applied(updated) => {
                    info!(stage = "service", project_id = id, from = %current.status, to = %requested, "project status changed");
                    return Ok(updated);
                }
                StatusWrite::Conflict => {
                    warn!(stage = "service", project_id = id, attempt, "status write lost a race; re-reading");
                }
            }
        }

        Err(ServiceError::Conflict(id))
    }

    /// Tombstones a visible project. A second delete reports not-found.
    pub async fn soft_delete(&self, id: ProjectId) -> Result<(), ServiceError> {
        if self.store.soft_delete(id, self.now()).await? {
            info!(stage = "service", project_id = id, "project deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound(id))
        }
    }

    /// Checks that the store answers.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.store.ping().await.map_err(ServiceError::from)
    }
}

/// Typed failure of a service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error("project {0} was modified concurrently")]
    Conflict(ProjectId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

/// Coarse error classification used by transports to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Store,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Store => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::memory::MemoryProjectStore;
    use crate::query::{ListParams, SortField, SortOrder};

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Clock that advances one minute on every call.
    fn ticking_clock() -> Clock {
        let ticks = Arc::new(AtomicI64::new(0));
        Arc::new(move || base_time() + Duration::minutes(ticks.fetch_add(1, Ordering::SeqCst)))
    }

    fn service() -> ProjectService {
        ProjectService::new(Arc::new(MemoryProjectStore::new())).with_clock(ticking_clock())
    }

    fn draft(name: &str, client: &str, status: &str, start: &str) -> ProjectDraft {
        ProjectDraft {
            name: Some(name.into()),
            client_name: Some(client.into()),
            status: Some(status.into()),
            start_date: Some(start.into()),
            end_date: None,
        }
    }

    fn spec(params: ListParams) -> ProjectQuerySpec {
        ProjectQuerySpec::from_params(params).expect("valid params")
    }

    #[tokio::test]
    async fn create_returns_normalized_entity() {
        let service = service();
        let mut input = draft("Redesign", "Acme", "active", "2024-01-01");
        input.end_date = Some("2024-03-01".into());

        let project = service.create(input).await.expect("create");
        assert_eq!(project.id, 1);
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.end_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(project.created_at, project.updated_at);
    }

    #[tokio::test]
    async fn invalid_create_persists_nothing() {
        let service = service();
        let mut input = draft("Redesign", "Acme", "active", "2024-01-10");
        input.end_date = Some("2024-01-09".into());

        let err = service.create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let all = service.list(&ProjectQuerySpec::default()).await.expect("list");
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_scenario() {
        let service = service();
        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .expect("create");

        let completed = service
            .update_status(project.id, ProjectStatus::Completed)
            .await
            .expect("active -> completed");
        assert_eq!(completed.status, ProjectStatus::Completed);
        assert!(completed.updated_at > project.updated_at);

        let err = service
            .update_status(project.id, ProjectStatus::Active)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Invalid status transition from completed to active"
        );

        service.soft_delete(project.id).await.expect("delete");
        let err = service.get_by_id(project.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(id) if id == project.id));
    }

    #[tokio::test]
    async fn same_status_update_is_a_noop() {
        let service = service();
        let project = service
            .create(draft("Redesign", "Acme", "on_hold", "2024-01-01"))
            .await
            .expect("create");

        let unchanged = service
            .update_status(project.id, ProjectStatus::OnHold)
            .await
            .expect("no-op");
        assert_eq!(unchanged, project);
    }

    #[tokio::test]
    async fn update_status_on_missing_or_deleted_is_not_found() {
        let service = service();
        let err = service
            .update_status(42, ProjectStatus::Active)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .expect("create");
        service.soft_delete(project.id).await.expect("delete");
        let err = service
            .update_status(project.id, ProjectStatus::OnHold)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let service = service();
        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .expect("create");

        service.soft_delete(project.id).await.expect("first delete");
        let err = service.soft_delete(project.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let service = service();
        let website = service
            .create(draft("Website", "ACME Corp", "active", "2024-03-01"))
            .await
            .unwrap();
        let acme_app = service
            .create(draft("acme app", "Globex", "on_hold", "2024-01-01"))
            .await
            .unwrap();
        let other = service
            .create(draft("Branding", "Initech", "active", "2024-02-01"))
            .await
            .unwrap();
        let deleted = service
            .create(draft("Acme archive", "Acme", "active", "2024-04-01"))
            .await
            .unwrap();
        service.soft_delete(deleted.id).await.unwrap();

        let all = service.list(&ProjectQuerySpec::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![other.id, acme_app.id, website.id]);

        let found = service
            .list(&spec(ListParams {
                search: Some("acme".into()),
                ..ListParams::default()
            }))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![acme_app.id, website.id]);

        let active_acme = service
            .list(&spec(ListParams {
                status: Some("active".into()),
                search: Some("ACME".into()),
                ..ListParams::default()
            }))
            .await
            .unwrap();
        assert_eq!(active_acme.len(), 1);
        assert_eq!(active_acme[0].id, website.id);

        let by_start = service
            .list(&ProjectQuerySpec {
                sort_by: SortField::StartDate,
                sort_order: SortOrder::Asc,
                ..ProjectQuerySpec::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = by_start.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![acme_app.id, other.id, website.id]);

        let none = service
            .list(&spec(ListParams {
                search: Some("nothing matches".into()),
                ..ListParams::default()
            }))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    /// Store whose status write always loses the race once per attempt.
    struct RacingStore {
        inner: MemoryProjectStore,
        interleaved: Mutex<Option<ProjectStatus>>,
    }

    #[async_trait]
    impl ProjectStore for RacingStore {
        async fn insert(
            &self,
            project: &NewProject,
            now: DateTime<Utc>,
        ) -> Result<Project, StoreError> {
            self.inner.insert(project, now).await
        }

        async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_all(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, StoreError> {
            self.inner.find_all(query).await
        }

        async fn update_status(
            &self,
            id: ProjectId,
            expected: ProjectStatus,
            next: ProjectStatus,
            now: DateTime<Utc>,
        ) -> Result<StatusWrite, StoreError> {
            let interleaved = self.interleaved.lock().unwrap().take();
            if let Some(other) = interleaved {
                self.inner.update_status(id, expected, other, now).await?;
            }
            self.inner.update_status(id, expected, next, now).await
        }

        async fn soft_delete(&self, id: ProjectId, now: DateTime<Utc>) -> Result<bool, StoreError> {
            self.inner.soft_delete(id, now).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lost_race_is_re_decided_against_fresh_state() {
        let store = Arc::new(RacingStore {
            inner: MemoryProjectStore::new(),
            interleaved: Mutex::new(None),
        });
        let service = ProjectService::new(store.clone()).with_clock(ticking_clock());
        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .unwrap();

        // Another writer completes the project between our read and our write.
        *store.interleaved.lock().unwrap() = Some(ProjectStatus::Completed);
        let err = service
            .update_status(project.id, ProjectStatus::OnHold)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status transition from completed to on_hold"
        );
    }

    #[tokio::test]
    async fn lost_race_to_same_target_is_a_noop() {
        let store = Arc::new(RacingStore {
            inner: MemoryProjectStore::new(),
            interleaved: Mutex::new(None),
        });
        let service = ProjectService::new(store.clone()).with_clock(ticking_clock());
        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .unwrap();

        *store.interleaved.lock().unwrap() = Some(ProjectStatus::OnHold);
        let updated = service
            .update_status(project.id, ProjectStatus::OnHold)
            .await
            .expect("other writer already applied it");
        assert_eq!(updated.status, ProjectStatus::OnHold);
    }

    /// Store where some other writer always wins the conditional write.
    #[derive(Default)]
    struct ContendedStore {
        inner: MemoryProjectStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl ProjectStore for ContendedStore {
        async fn insert(
            &self,
            project: &NewProject,
            now: DateTime<Utc>,
        ) -> Result<Project, StoreError> {
            self.inner.insert(project, now).await
        }

        async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_all(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, StoreError> {
            self.inner.find_all(query).await
        }

        async fn update_status(
            &self,
            _id: ProjectId,
            _expected: ProjectStatus,
            _next: ProjectStatus,
            _now: DateTime<Utc>,
        ) -> Result<StatusWrite, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(StatusWrite::Conflict)
        }

        async fn soft_delete(&self, id: ProjectId, now: DateTime<Utc>) -> Result<bool, StoreError> {
            self.inner.soft_delete(id, now).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persistent_contention_gives_up_with_conflict() {
        let store = Arc::new(ContendedStore::default());
        let service = ProjectService::new(store.clone()).with_clock(ticking_clock());
        let project = service
            .create(draft("Redesign", "Acme", "active", "2024-01-01"))
            .await
            .unwrap();

        let err = service
            .update_status(project.id, ProjectStatus::OnHold)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(id) if id == project.id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.writes.load(Ordering::SeqCst), MAX_STATUS_ATTEMPTS);

        let stored = service.get_by_id(project.id).await.unwrap();
        assert_eq!(stored.status, ProjectStatus::Active);
        assert_eq!(stored.updated_at, project.updated_at);
    }
}
