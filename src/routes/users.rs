use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::assignment;
use crate::authz::catalog::system;
use crate::authz::{require_role, Session};
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::models::user::{AssignRoleRequest, UserView};

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses(
        (status = 200, description = "Users with their role and permissions", body = [UserView]),
        (status = 403, description = "Missing MANAGE_USERS")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, session: Session) -> AppResult<Json<Vec<UserView>>> {
    let users = assignment::list_users(&state.pool, &session).await?;
    Ok(Json(users))
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned or cleared", body = UserView),
        (status = 400, description = "Missing roleId or self-assignment"),
        (status = 403, description = "Missing MANAGE_USERS"),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignRoleRequest>,
) -> AppResult<Json<UserView>> {
    let (before, after) = assignment::assign_role(&state.pool, &session, id, payload.role_id).await?;
    record_role_change(&state, &session, &headers, &before, &after);
    Ok(Json(after))
}

/// Older admin endpoint. Gated on the ADMIN role rather than a permission.
#[utoipa::path(
    patch,
    path = "/api/admin/users/{userId}/role",
    tag = "Users",
    params(("userId" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned or cleared", body = UserView),
        (status = 403, description = "Caller is not an ADMIN"),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn admin_assign_role(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignRoleRequest>,
) -> AppResult<Json<UserView>> {
    require_role(&session, system::ADMIN)?;

    let (before, after) = assignment::set_user_role(&state.pool, &session, user_id, payload.role_id).await?;
    record_role_change(&state, &session, &headers, &before, &after);
    Ok(Json(after))
}

fn record_role_change(state: &AppState, session: &Session, headers: &HeaderMap, before: &UserView, after: &UserView) {
    log_activity_with_context(
        &state.event_bus,
        "role_changed",
        Some(session.user_id),
        after,
        Some(before),
        Some(RequestContext::from_headers(headers)),
    );
}
