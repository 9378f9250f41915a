use std::{path::PathBuf, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite, SqlitePool,
};
use thiserror::Error;

use projdesk_core::{
    NewProject, Project, ProjectId, ProjectQuerySpec, ProjectStatus, ProjectStore, StatusWrite,
    StoreError,
};

const PROJECT_COLUMNS: &str =
    "id, name, client_name, status, start_date, end_date, created_at, updated_at";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens a pool for the connection string, creating the database file
    /// (and its parent directory) when it does not exist yet.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        if let Some(parent) = database_file(database_url).and_then(|path| {
            path.parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(PathBuf::from)
        }) {
            std::fs::create_dir_all(&parent).map_err(StorageError::CreateDir)?;
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if is_in_memory(database_url) {
            // Each connection to `:memory:` opens a separate, empty database.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to the `projects` table.
    pub fn projects(&self) -> ProjectRepository {
        ProjectRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for checked-out connections and closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Extracts the on-disk path from a SQLite URL, `None` for in-memory databases.
fn database_file(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

fn is_in_memory(database_url: &str) -> bool {
    database_file(database_url).is_none() || database_url.contains("mode=memory")
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create database directory: {0}")]
    CreateDir(std::io::Error),
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Repository responsible for the `projects` table.
#[derive(Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}

#[async_trait]
impl ProjectStore for ProjectRepository {
    async fn insert(
        &self,
        project: &NewProject,
        now: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        let timestamp = to_rfc3339(now);
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "INSERT INTO projects \
             (name, client_name, status, start_date, end_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(&project.name)
        .bind(&project.client_name)
        .bind(project.status.as_str())
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(ProjectRow::into_domain).transpose()
    }

    async fn find_all(&self, query: &ProjectQuerySpec) -> Result<Vec<Project>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted_at IS NULL"
        ));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        if let Some(search) = &query.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR client_name LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        // Column and direction come from closed enums, never from caller text.
        builder
            .push(" ORDER BY ")
            .push(query.sort_by.column())
            .push(" ")
            .push(query.sort_order.as_str());

        let rows = builder
            .build_query_as::<ProjectRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        rows.into_iter().map(ProjectRow::into_domain).collect()
    }

    async fn update_status(
        &self,
        id: ProjectId,
        expected: ProjectStatus,
        next: ProjectStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusWrite, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects \
             SET status = ?, updated_at = ? \
             WHERE id = ? AND status = ? AND deleted_at IS NULL \
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(next.as_str())
        .bind(to_rfc3339(now))
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => Ok(StatusWrite::Applied(row.into_domain()?)),
            None => Ok(StatusWrite::Conflict),
        }
    }

    async fn soft_delete(&self, id: ProjectId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let timestamp = to_rfc3339(now);
        let result = sqlx::query(
            "UPDATE projects \
             SET deleted_at = ?, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }
}

/// Representation of a `projects` row.
#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    client_name: String,
    status: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProjectRow {
    fn into_domain(self) -> Result<Project, StoreError> {
        let status = self.status.parse::<ProjectStatus>().map_err(|_| {
            StoreError::Corrupt(format!(
                "project {} has unknown status {:?}",
                self.id, self.status
            ))
        })?;

        Ok(Project {
            id: self.id,
            name: self.name,
            client_name: self.client_name,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Builds a `LIKE` pattern that matches `needle` literally anywhere in a value.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
