use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, Session};
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::models::role::{Role, RoleCreateRequest, RoleUpdateRequest};

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "All roles with their permissions", body = [Role]),
        (status = 403, description = "Missing MANAGE_USERS")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, session: Session) -> AppResult<Json<Vec<Role>>> {
    let roles = roles::list_roles(&state.pool, &session).await?;
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Blank or reserved name, or invalid permissions"),
        (status = 403, description = "Missing MANAGE_USERS"),
        (status = 409, description = "Role name already taken")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let role = roles::create_role(&state.pool, &session, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(session.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let role = roles::get_role(&state.pool, &session, id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    patch,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "System role or invalid payload"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already taken")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let (before, after) = roles::update_role(&state.pool, &session, id, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(session.user_id),
        &after,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted and cleared from its holders"),
        (status = 400, description = "System roles cannot be deleted"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let deleted = roles::delete_role(&state.pool, &session, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(session.user_id),
        &deleted.role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
