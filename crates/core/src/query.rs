use serde::Deserialize;

use crate::types::{Project, ProjectStatus, ValidationError};

/// Raw list parameters as they arrive from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Field a project list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    StartDate,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "createdAt",
            Self::StartDate => "startDate",
        }
    }

    /// Column name in the `projects` table.
    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::StartDate => "start_date",
        }
    }

    fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "createdAt" => Ok(Self::CreatedAt),
            "startDate" => Ok(Self::StartDate),
            _ => Err(ValidationError::new(
                "Invalid sortBy field. Must be: createdAt, startDate",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(ValidationError::new("Invalid sortOrder. Must be: ASC or DESC")),
        }
    }
}

/// Normalized, validated filter and sort descriptor for listing projects.
///
/// All filters combine with AND, and soft-deleted rows are always excluded by
/// the store. Ordering uses a single key; rows with equal keys come back in
/// whatever order the store yields them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectQuerySpec {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl ProjectQuerySpec {
    /// Validates raw parameters. Empty values mean "not specified".
    pub fn from_params(params: ListParams) -> Result<Self, ValidationError> {
        let status = present(params.status)
            .map(|raw| raw.parse::<ProjectStatus>())
            .transpose()?;
        let search = present(params.search);
        let sort_by = present(params.sort_by)
            .map(|raw| SortField::parse(&raw))
            .transpose()?
            .unwrap_or_default();
        let sort_order = present(params.sort_order)
            .map(|raw| SortOrder::parse(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            status,
            search,
            sort_by,
            sort_order,
        })
    }

    /// Returns `true` when the project satisfies the status and search filters.
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(status) = self.status {
            if project.status != status {
                return false;
            }
        }

        match &self.search {
            Some(needle) => {
                contains_ignore_ascii_case(&project.name, needle)
                    || contains_ignore_ascii_case(&project.client_name, needle)
            }
            None => true,
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Substring test with ASCII-only case folding, matching SQLite `LIKE`.
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
