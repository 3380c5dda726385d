use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{
    require_project_budget_edit, require_project_view, require_workspace_budget_edit, require_workspace_view, Session,
};
use crate::db::begin_write;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::models::budget::{
    BudgetLine, BudgetLineRequest, BudgetSummary, BudgetWorkspace, WorkspaceCreateRequest, WorkspaceDetail,
    WorkspaceOverview,
};
use crate::models::project::MemberRequest;
use crate::routes::projects::ensure_user_exists;
use crate::utils::utc_now;

const WORKSPACE_COLUMNS: &str = "w.id, w.owner_id, w.project_id, w.name, w.currency, w.created_at, w.updated_at";
const DEFAULT_CURRENCY: &str = "EUR";

#[utoipa::path(
    get,
    path = "/api/workspaces",
    tag = "Budgets",
    responses((status = 200, description = "Workspaces visible to the caller", body = [WorkspaceOverview])),
    security(("bearerAuth" = []))
)]
pub async fn list_workspaces(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<WorkspaceOverview>>> {
    let grants = session.grants();
    let workspaces = if grants.can_view_any_project() || grants.can_edit_any_budget() {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM budget_workspaces w ORDER BY w.created_at DESC");
        sqlx::query_as::<_, BudgetWorkspace>(&sql).fetch_all(&state.pool).await?
    } else {
        let sql = format!(
            "SELECT {WORKSPACE_COLUMNS} FROM budget_workspaces w \
             LEFT JOIN projects p ON p.id = w.project_id AND p.deleted_at IS NULL \
             WHERE w.owner_id = ? \
                OR EXISTS (SELECT 1 FROM workspace_members m WHERE m.workspace_id = w.id AND m.user_id = ?) \
                OR p.owner_id = ? \
                OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ?) \
             ORDER BY w.created_at DESC"
        );
        sqlx::query_as::<_, BudgetWorkspace>(&sql)
            .bind(session.user_id)
            .bind(session.user_id)
            .bind(session.user_id)
            .bind(session.user_id)
            .fetch_all(&state.pool)
            .await?
    };

    let mut conn = state.pool.acquire().await?;
    Ok(Json(overviews(&mut conn, workspaces).await?))
}

#[utoipa::path(
    post,
    path = "/api/workspaces",
    tag = "Budgets",
    request_body = WorkspaceCreateRequest,
    responses(
        (status = 201, description = "Workspace created", body = BudgetWorkspace),
        (status = 403, description = "Caller may not edit the linked project's budget"),
        (status = 404, description = "Linked project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_workspace(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<WorkspaceCreateRequest>,
) -> AppResult<(StatusCode, Json<BudgetWorkspace>)> {
    if let Some(project_id) = payload.project_id {
        require_project_budget_edit(&state.pool, &session, project_id).await?;
    }

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let currency = payload
        .currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::bad_request("currency must be a three-letter ISO code"));
    }

    let now = utc_now();
    let workspace_id = Uuid::new_v4();
    let mut conn = state.pool.acquire().await?;

    sqlx::query(
        "INSERT INTO budget_workspaces (id, owner_id, project_id, name, currency, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(workspace_id)
    .bind(session.user_id)
    .bind(payload.project_id)
    .bind(&name)
    .bind(&currency)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let workspace = fetch_workspace(&mut conn, workspace_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(session.user_id),
        &workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(workspace)))
}

#[utoipa::path(
    get,
    path = "/api/workspaces/{id}",
    tag = "Budgets",
    params(("id" = Uuid, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace with lines and totals", body = WorkspaceDetail),
        (status = 404, description = "Workspace not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_workspace(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<WorkspaceDetail>> {
    require_workspace_view(&state.pool, &session, id).await?;

    let mut conn = state.pool.acquire().await?;
    Ok(Json(workspace_detail(&mut conn, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/workspaces/{id}/members",
    tag = "Budgets",
    params(("id" = Uuid, Path, description = "Workspace id")),
    request_body = MemberRequest,
    responses(
        (status = 200, description = "Member added", body = WorkspaceDetail),
        (status = 403, description = "Caller may not edit this budget"),
        (status = 404, description = "Workspace or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<MemberRequest>,
) -> AppResult<Json<WorkspaceDetail>> {
    require_workspace_budget_edit(&state.pool, &session, id).await?;

    let mut tx = begin_write(&state.pool).await?;
    ensure_user_exists(&mut tx, payload.user_id).await?;

    sqlx::query("INSERT OR IGNORE INTO workspace_members (workspace_id, user_id, added_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(payload.user_id)
        .bind(utc_now())
        .execute(&mut *tx)
        .await?;

    let detail = workspace_detail(&mut tx, id).await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "member_added",
        Some(session.user_id),
        &detail.workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(detail))
}

#[utoipa::path(
    post,
    path = "/api/workspaces/{id}/lines",
    tag = "Budgets",
    params(("id" = Uuid, Path, description = "Workspace id")),
    request_body = BudgetLineRequest,
    responses(
        (status = 201, description = "Line added", body = BudgetLine),
        (status = 400, description = "Negative amount or VAT out of range"),
        (status = 403, description = "Caller may not edit this budget"),
        (status = 404, description = "Workspace not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_line(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<BudgetLineRequest>,
) -> AppResult<(StatusCode, Json<BudgetLine>)> {
    require_workspace_budget_edit(&state.pool, &session, id).await?;
    payload.validate()?;

    let line = BudgetLine {
        id: Uuid::new_v4(),
        workspace_id: id,
        description: payload.description.trim().to_string(),
        quantity: payload.quantity,
        unit_price: payload.unit_price,
        vat_rate: payload.vat_rate,
        created_at: utc_now(),
    };

    sqlx::query(
        "INSERT INTO budget_lines (id, workspace_id, description, quantity, unit_price, vat_rate, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(line.id)
    .bind(line.workspace_id)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.vat_rate)
    .bind(line.created_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(session.user_id),
        &line,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(line)))
}

#[utoipa::path(
    delete,
    path = "/api/workspaces/{id}/lines/{lineId}",
    tag = "Budgets",
    params(
        ("id" = Uuid, Path, description = "Workspace id"),
        ("lineId" = Uuid, Path, description = "Budget line id")
    ),
    responses(
        (status = 204, description = "Line removed"),
        (status = 403, description = "Caller may not edit this budget"),
        (status = 404, description = "Workspace or line not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_line(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    require_workspace_budget_edit(&state.pool, &session, id).await?;

    let line = sqlx::query_as::<_, BudgetLine>(
        "SELECT id, workspace_id, description, quantity, unit_price, vat_rate, created_at FROM budget_lines WHERE id = ? AND workspace_id = ?",
    )
    .bind(line_id)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("budget line not found"))?;

    sqlx::query("DELETE FROM budget_lines WHERE id = ?")
        .bind(line_id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(session.user_id),
        &line,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/budget",
    tag = "Budgets",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "The project's workspaces with totals", body = [WorkspaceOverview]),
        (status = 404, description = "Project not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn project_budget(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<WorkspaceOverview>>> {
    require_project_view(&state.pool, &session, project_id).await?;

    let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM budget_workspaces w WHERE w.project_id = ? ORDER BY w.created_at");
    let workspaces = sqlx::query_as::<_, BudgetWorkspace>(&sql)
        .bind(project_id)
        .fetch_all(&state.pool)
        .await?;

    let mut conn = state.pool.acquire().await?;
    Ok(Json(overviews(&mut conn, workspaces).await?))
}

async fn fetch_workspace(conn: &mut SqliteConnection, workspace_id: Uuid) -> AppResult<BudgetWorkspace> {
    let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM budget_workspaces w WHERE w.id = ?");
    sqlx::query_as::<_, BudgetWorkspace>(&sql)
        .bind(workspace_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("workspace not found"))
}

async fn workspace_lines(conn: &mut SqliteConnection, workspace_id: Uuid) -> AppResult<Vec<BudgetLine>> {
    Ok(sqlx::query_as::<_, BudgetLine>(
        "SELECT id, workspace_id, description, quantity, unit_price, vat_rate, created_at \
         FROM budget_lines WHERE workspace_id = ? ORDER BY created_at",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await?)
}

async fn workspace_detail(conn: &mut SqliteConnection, workspace_id: Uuid) -> AppResult<WorkspaceDetail> {
    let workspace = fetch_workspace(conn, workspace_id).await?;
    let member_ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM workspace_members WHERE workspace_id = ? ORDER BY added_at",
    )
    .bind(workspace_id)
    .fetch_all(&mut *conn)
    .await?;
    let lines = workspace_lines(conn, workspace_id).await?;
    let summary = BudgetSummary::from_lines(&lines);

    Ok(WorkspaceDetail {
        workspace,
        member_ids,
        lines,
        summary,
    })
}

async fn overviews(conn: &mut SqliteConnection, workspaces: Vec<BudgetWorkspace>) -> AppResult<Vec<WorkspaceOverview>> {
    let mut result = Vec::with_capacity(workspaces.len());
    for workspace in workspaces {
        let lines = workspace_lines(conn, workspace.id).await?;
        result.push(WorkspaceOverview {
            summary: BudgetSummary::from_lines(&lines),
            workspace,
        });
    }
    Ok(result)
}
