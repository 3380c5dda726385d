use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "FIELD_OPS")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_system: bool,
    #[schema(example = json!(["VIEW_PROJECT"]))]
    pub permissions: Vec<String>,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbRole {
    pub fn into_role(self, permissions: Vec<String>) -> Role {
        Role {
            id: self.id,
            name: self.name,
            description: self.description,
            is_system: self.is_system,
            permissions,
            user_count: self.user_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleCreateRequest {
    #[schema(example = "field ops")]
    pub name: String,
    #[schema(example = "Site crews that only read project data")]
    pub description: Option<String>,
    #[serde(default)]
    #[schema(example = json!(["VIEW_PROJECT"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole permission set when present.
    pub permissions: Option<Vec<String>>,
}

/// Result of a role deletion: the removed role and how many users lost it.
#[derive(Debug, Clone)]
pub struct DeletedRole {
    pub role: Role,
    pub cleared_users: u64,
}
