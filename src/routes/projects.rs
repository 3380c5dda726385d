use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::catalog::{CREATE_PROJECT, DELETE_PROJECT};
use crate::authz::{require_permission, require_project_edit, require_project_view, Session};
use crate::db::begin_write;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::models::project::{
    DbProject, MemberRequest, Project, ProjectCreateRequest, ProjectMembership, ProjectUpdateRequest,
};
use crate::utils::utc_now;

const PROJECT_COLUMNS: &str = "p.id, p.owner_id, p.name, p.description, p.created_at, p.updated_at, p.deleted_at";

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects visible to the caller", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(State(state): State<AppState>, session: Session) -> AppResult<Json<Vec<Project>>> {
    let rows = if session.grants().can_view_any_project() {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.deleted_at IS NULL ORDER BY p.created_at DESC");
        sqlx::query_as::<_, DbProject>(&sql).fetch_all(&state.pool).await?
    } else {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.deleted_at IS NULL AND ( \
                 p.owner_id = ? \
                 OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?) \
                 OR EXISTS (SELECT 1 FROM tasks t WHERE t.project_id = p.id AND t.assignee_id = ?) \
             ) ORDER BY p.created_at DESC"
        );
        sqlx::query_as::<_, DbProject>(&sql)
            .bind(session.user_id)
            .bind(session.user_id)
            .bind(session.user_id)
            .fetch_all(&state.pool)
            .await?
    };

    let mut conn = state.pool.acquire().await?;
    let mut projects = Vec::with_capacity(rows.len());
    for row in rows {
        let member_ids = member_ids(&mut conn, row.id).await?;
        projects.push(row.into_project(member_ids));
    }

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 403, description = "Missing CREATE_PROJECT"),
        (status = 404, description = "A listed member does not exist")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    require_permission(&session, CREATE_PROJECT)?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let members: BTreeSet<Uuid> = payload
        .member_ids
        .into_iter()
        .filter(|id| *id != session.user_id)
        .collect();

    let now = utc_now();
    let project_id = Uuid::new_v4();
    let mut tx = begin_write(&state.pool).await?;

    sqlx::query(
        "INSERT INTO projects (id, owner_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(session.user_id)
    .bind(&name)
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for user_id in &members {
        ensure_user_exists(&mut tx, *user_id).await?;
        insert_member(&mut tx, project_id, *user_id).await?;
    }

    let project = fetch_project(&mut tx, project_id).await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(session.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 404, description = "Project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    require_project_view(&state.pool, &session, id).await?;

    let mut conn = state.pool.acquire().await?;
    Ok(Json(fetch_project(&mut conn, id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "Caller may see but not edit the project"),
        (status = 404, description = "Project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    require_project_edit(&state.pool, &session, id).await?;

    let mut tx = begin_write(&state.pool).await?;
    let before = fetch_project(&mut tx, id).await?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("name must not be empty")),
        Some(name) => name.to_string(),
        None => before.name.clone(),
    };
    let description = payload.description.or_else(|| before.description.clone());

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(utc_now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let after = fetch_project(&mut tx, id).await?;
    tx.commit().await?;

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
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project soft deleted"),
        (status = 403, description = "Missing DELETE_PROJECT"),
        (status = 404, description = "Project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_project_view(&state.pool, &session, id).await?;
    require_permission(&session, DELETE_PROJECT)?;

    let mut tx = begin_write(&state.pool).await?;
    let project = fetch_project(&mut tx, id).await?;

    let now = utc_now();
    let affected = sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("project not found"));
    }
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(session.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/members",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = MemberRequest,
    responses(
        (status = 200, description = "Member added", body = Project),
        (status = 403, description = "Caller may not edit the project"),
        (status = 404, description = "Project or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<MemberRequest>,
) -> AppResult<Json<Project>> {
    require_project_edit(&state.pool, &session, id).await?;

    let mut tx = begin_write(&state.pool).await?;
    ensure_user_exists(&mut tx, payload.user_id).await?;
    insert_member(&mut tx, id, payload.user_id).await?;
    let project = fetch_project(&mut tx, id).await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "member_added",
        Some(session.user_id),
        &ProjectMembership { project_id: id, user_id: payload.user_id },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}/members/{userId}",
    tag = "Projects",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("userId" = Uuid, Path, description = "Member to remove")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Caller may not edit the project"),
        (status = 404, description = "Project not found or user is not a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    require_project_edit(&state.pool, &session, id).await?;

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::not_found("user is not a member of this project"));
    }

    log_activity_with_context(
        &state.event_bus,
        "member_removed",
        Some(session.user_id),
        &ProjectMembership { project_id: id, user_id },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_project(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<Project> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.id = ? AND p.deleted_at IS NULL");
    let row = sqlx::query_as::<_, DbProject>(&sql)
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    let member_ids = member_ids(conn, project_id).await?;
    Ok(row.into_project(member_ids))
}

async fn member_ids(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM project_members WHERE project_id = ? ORDER BY added_at")
            .bind(project_id)
            .fetch_all(conn)
            .await?,
    )
}

async fn insert_member(conn: &mut SqliteConnection, project_id: Uuid, user_id: Uuid) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO project_members (project_id, user_id, added_at) VALUES (?, ?, ?)")
        .bind(project_id)
        .bind(user_id)
        .bind(utc_now())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn ensure_user_exists(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<()> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(conn)
        .await?;

    if exists == 0 {
        return Err(AppError::not_found(format!("user {user_id} not found")));
    }
    Ok(())
}

