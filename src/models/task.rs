use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;

pub const TASK_STATUSES: &[&str] = &["todo", "in_progress", "blocked", "done"];

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "todo")]
    pub status: String,
    pub assignee_id: Option<Uuid>,
    /// Ids of tasks in the same project this one waits on.
    pub depends_on: Vec<Uuid>,
    #[schema(format = DateTime, example = "2025-10-01T09:00:00Z")]
    pub start_date: Option<DateTime<Utc>>,
    #[schema(format = DateTime, example = "2025-10-15T17:00:00Z")]
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Task {
    fn entity_type() -> &'static str { "task" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub depends_on: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        let depends_on: Vec<Uuid> = serde_json::from_str(&value.depends_on)
            .map_err(|err| AppError::internal(format!("corrupt depends_on for task {}: {err}", value.id)))?;

        Ok(Task {
            id: value.id,
            project_id: value.project_id,
            title: value.title,
            description: value.description,
            status: value.status,
            assignee_id: value.assignee_id,
            depends_on,
            start_date: value.start_date,
            end_date: value.end_date,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateRequest {
    #[schema(example = "Pour foundations")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "todo")]
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[schema(format = DateTime, example = "2025-10-01T09:00:00Z")]
    pub start_date: Option<DateTime<Utc>>,
    #[schema(format = DateTime, example = "2025-10-15T17:00:00Z")]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Absent leaves the assignee alone; `null` unassigns.
    #[serde(default, deserialize_with = "super::nullable")]
    #[schema(value_type = Option<Uuid>)]
    pub assignee_id: Option<Option<Uuid>>,
    pub depends_on: Option<Vec<Uuid>>,
    #[schema(format = DateTime)]
    pub start_date: Option<DateTime<Utc>>,
    #[schema(format = DateTime)]
    pub end_date: Option<DateTime<Utc>>,
}

pub fn validate_status(status: &str) -> Result<(), AppError> {
    if TASK_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "status must be one of {}",
            TASK_STATUSES.join(", ")
        )))
    }
}

pub fn validate_schedule(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), AppError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::bad_request("end_date must not be before start_date")),
        _ => Ok(()),
    }
}
