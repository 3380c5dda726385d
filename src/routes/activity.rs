use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::app::AppState;
use crate::authz::catalog::MANAGE_USERS;
use crate::authz::{require_permission, Session};
use crate::errors::AppResult;
use crate::events::{list_recent, ActivityEntry};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    /// Number of entries, newest first. Defaults to 100.
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/activity",
    tag = "Activity",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Recent activity", body = [ActivityEntry]),
        (status = 403, description = "Missing MANAGE_USERS")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_activity(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<ActivityEntry>>> {
    require_permission(&session, MANAGE_USERS)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = list_recent(&state.pool, limit).await?;
    Ok(Json(entries))
}
