use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned by the store on creation.
pub type ProjectId = i64;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub const ALL: [Self; 3] = [Self::Active, Self::OnHold, Self::Completed];

    /// Returns the canonical wire and database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            _ => Err(ValidationError::new(
                "Invalid status. Must be: active, on_hold, or completed",
            )),
        }
    }
}

/// Input rejected before it reaches the store. The message is safe to show to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A visible (non-deleted) project as returned by every read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub client_name: String,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unvalidated creation payload as submitted by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Creation payload that passed validation and can be handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub client_name: String,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewProject {
    /// Validates and normalizes a draft.
    ///
    /// Checks run in a fixed order: required fields, status value, date
    /// formats, then the date range. The first failure is reported.
    pub fn from_draft(draft: ProjectDraft) -> Result<Self, ValidationError> {
        let name = non_blank(draft.name);
        let client_name = non_blank(draft.client_name);
        let status = non_blank(draft.status);
        let start_date = non_blank(draft.start_date);

        let (Some(name), Some(client_name), Some(status), Some(start_date)) =
            (name, client_name, status, start_date)
        else {
            return Err(ValidationError::new(
                "Missing required fields: name, clientName, status, startDate",
            ));
        };

        let status: ProjectStatus = status.parse()?;
        let start_date = parse_date("startDate", &start_date)?;
        let end_date = non_blank(draft.end_date)
            .map(|raw| parse_date("endDate", &raw))
            .transpose()?;

        if let Some(end_date) = end_date {
            if end_date < start_date {
                return Err(ValidationError::new(
                    "endDate must be greater than or equal to startDate",
                ));
            }
        }

        Ok(Self {
            name,
            client_name,
            status,
            start_date,
            end_date,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Accepts exactly `YYYY-MM-DD`. chrono's `%Y` alone also takes signed and
/// five-digit years, which would not sort as text in the store.
fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::new(format!("{field} must be a valid date (YYYY-MM-DD)"));
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| invalid())
}
