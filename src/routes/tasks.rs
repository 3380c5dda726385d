use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::catalog::ASSIGN_TASKS;
use crate::authz::{require_permission, require_project_view, Session};
use crate::db::begin_write;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::models::task::{validate_schedule, validate_status, DbTask, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::routes::projects::ensure_user_exists;
use crate::utils::utc_now;

const TASK_COLUMNS: &str = "id, project_id, title, description, status, assignee_id, depends_on, \
     start_date, end_date, created_by, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/api/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Tasks of the project", body = [Task]),
        (status = 404, description = "Project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    require_project_view(&state.pool, &session, project_id).await?;

    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY created_at");
    let tasks = sqlx::query_as::<_, DbTask>(&sql)
        .bind(project_id)
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid status, schedule or dependency"),
        (status = 403, description = "Assigning requires ASSIGN_TASKS"),
        (status = 404, description = "Project or assignee not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    ApiJson(payload): ApiJson<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    require_project_view(&state.pool, &session, project_id).await?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let status = payload.status.unwrap_or_else(|| "todo".to_string());
    validate_status(&status)?;
    validate_schedule(payload.start_date, payload.end_date)?;

    let mut tx = begin_write(&state.pool).await?;

    if let Some(assignee) = payload.assignee_id {
        require_permission(&session, ASSIGN_TASKS)?;
        ensure_user_exists(&mut tx, assignee).await?;
    }

    let task_id = Uuid::new_v4();
    let depends_on = validated_dependencies(&mut tx, project_id, task_id, &payload.depends_on).await?;
    let now = utc_now();

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, description, status, assignee_id, depends_on, start_date, end_date, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(project_id)
    .bind(&title)
    .bind(&payload.description)
    .bind(&status)
    .bind(payload.assignee_id)
    .bind(depends_on)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(session.user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let task = fetch_task(&mut tx, project_id, task_id).await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(session.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}/tasks/{taskId}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("taskId" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid status, schedule or dependency"),
        (status = 403, description = "Reassigning requires ASSIGN_TASKS"),
        (status = 404, description = "Project, task or assignee not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    require_project_view(&state.pool, &session, project_id).await?;

    let mut tx = begin_write(&state.pool).await?;
    let before = fetch_task(&mut tx, project_id, task_id).await?;
    let mut task = before.clone();

    if let Some(title) = payload.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        task.title = title.to_string();
    }
    if payload.description.is_some() {
        task.description = payload.description;
    }
    if let Some(status) = payload.status {
        validate_status(&status)?;
        task.status = status;
    }
    if let Some(assignee) = payload.assignee_id {
        if assignee != task.assignee_id {
            require_permission(&session, ASSIGN_TASKS)?;
            if let Some(user_id) = assignee {
                ensure_user_exists(&mut tx, user_id).await?;
            }
            task.assignee_id = assignee;
        }
    }
    if payload.start_date.is_some() {
        task.start_date = payload.start_date;
    }
    if payload.end_date.is_some() {
        task.end_date = payload.end_date;
    }
    validate_schedule(task.start_date, task.end_date)?;

    let depends_on = match payload.depends_on.as_deref() {
        Some(ids) => validated_dependencies(&mut tx, project_id, task_id, ids).await?,
        None => serde_json::to_string(&task.depends_on)
            .map_err(|err| AppError::internal(format!("failed to encode depends_on: {err}")))?,
    };

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, status = ?, assignee_id = ?, depends_on = ?, \
         start_date = ?, end_date = ?, updated_at = ? WHERE id = ? AND project_id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.status)
    .bind(task.assignee_id)
    .bind(depends_on)
    .bind(task.start_date)
    .bind(task.end_date)
    .bind(utc_now())
    .bind(task_id)
    .bind(project_id)
    .execute(&mut *tx)
    .await?;

    let after = fetch_task(&mut tx, project_id, task_id).await?;
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

async fn fetch_task(conn: &mut SqliteConnection, project_id: Uuid, task_id: Uuid) -> AppResult<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND project_id = ?");
    sqlx::query_as::<_, DbTask>(&sql)
        .bind(task_id)
        .bind(project_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?
        .try_into()
}

/// Dependencies must be other tasks of the same project. Returns the JSON column value.
async fn validated_dependencies(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    task_id: Uuid,
    ids: &[Uuid],
) -> AppResult<String> {
    let ids: BTreeSet<Uuid> = ids.iter().copied().collect();
    if ids.contains(&task_id) {
        return Err(AppError::bad_request("a task cannot depend on itself"));
    }

    for id in &ids {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM tasks WHERE id = ? AND project_id = ?")
            .bind(id)
            .bind(project_id)
            .fetch_one(&mut *conn)
            .await?;
        if found == 0 {
            return Err(AppError::bad_request(format!("dependency {id} is not a task of this project")));
        }
    }

    let ids: Vec<Uuid> = ids.into_iter().collect();
    serde_json::to_string(&ids).map_err(|err| AppError::internal(format!("failed to encode depends_on: {err}")))
}
