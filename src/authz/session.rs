use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::token_from_headers;

use super::guard::Grants;

/// Identity and effective permissions of the caller, resolved per request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Option<String>,
    pub permissions: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn grants(&self) -> Grants<'_> {
        Grants {
            role: self.role.as_deref(),
            permissions: &self.permissions,
        }
    }

    pub fn has_permission(&self, action: &str) -> bool {
        self.grants().has_permission(action)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    name: String,
    email: String,
    role_id: Option<Uuid>,
    role_name: Option<String>,
}

/// Reads the user's current role and permission set. `None` when the user
/// no longer exists.
pub async fn load_session(pool: &SqlitePool, user_id: Uuid) -> Result<Option<Session>, AppError> {
    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT u.id, u.name, u.email, u.role_id, r.name AS role_name
        FROM users u
        LEFT JOIN roles r ON r.id = u.role_id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let permissions = match row.role_id {
        Some(role_id) => {
            sqlx::query_scalar::<_, String>("SELECT action FROM role_permissions WHERE role_id = ? ORDER BY action")
                .bind(role_id)
                .fetch_all(pool)
                .await?
        }
        None => Vec::new(),
    };

    Ok(Some(Session {
        user_id: row.id,
        email: row.email,
        name: row.name,
        role: row.role_name,
        permissions,
        issued_at: Utc::now(),
    }))
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or_else(|| AppError::unauthorized("no session"))?;
        let claims = state.jwt.decode(&token)?;

        if !claims.is_stale(Utc::now()) {
            let issued_at = claims.issued_at();
            return Ok(Session {
                user_id: claims.sub,
                email: claims.email,
                name: claims.name,
                role: claims.role,
                permissions: claims.permissions,
                issued_at,
            });
        }

        tracing::debug!(user_id = %claims.sub, "session claims stale, reloading grants");

        load_session(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("session user no longer exists"))
    }
}
