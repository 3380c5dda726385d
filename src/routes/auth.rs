use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::AppendHeaders;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::assignment::fetch_user_view;
use crate::authz::catalog::system;
use crate::authz::{load_session, Session};
use crate::db::seed::role_id_by_name;
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ApiJson;
use crate::jwt::JwtConfig;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest};
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

type CookieHeader = AppendHeaders<[(axum::http::HeaderName, String); 1]>;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, CookieHeader, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email)?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let member_role = role_id_by_name(&state.pool, system::MEMBER).await?;
    let now = utc_now();
    let user_id = uuid::Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(member_role)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::conflict("email already in use")
        } else {
            AppError::Database(err)
        }
    })?;

    let (token, cookie, user) = issue(&state, user_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, cookie, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<(CookieHeader, Json<AuthResponse>)> {
    let email = payload.email.trim().to_lowercase();

    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role_id, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let (token, cookie, user) = issue(&state, db_user.id).await?;
    tracing::info!(user_id = %user.id, "login");

    Ok((cookie, Json(AuthResponse { token, user })))
}

/// Re-issues the caller's token from the current role and permission set.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Fresh token", body = AuthResponse),
        (status = 401, description = "No valid session")
    ),
    security(("bearerAuth" = []))
)]
pub async fn refresh(State(state): State<AppState>, session: Session) -> AppResult<(CookieHeader, Json<AuthResponse>)> {
    let (token, cookie, user) = issue(&state, session.user_id).await?;
    Ok((cookie, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current session", body = Session),
        (status = 401, description = "No valid session")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(session: Session) -> AppResult<Json<Session>> {
    Ok(Json(session))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Session cookie cleared", body = MessageResponse))
)]
pub async fn logout() -> AppResult<(CookieHeader, Json<MessageResponse>)> {
    Ok((
        AppendHeaders([(SET_COOKIE, JwtConfig::clear_cookie())]),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

async fn issue(
    state: &AppState,
    user_id: uuid::Uuid,
) -> AppResult<(String, CookieHeader, crate::models::user::UserView)> {
    let session = load_session(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
    let user = fetch_user_view(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

    let token = state.jwt.encode(&session)?;
    let cookie = AppendHeaders([(SET_COOKIE, state.jwt.session_cookie(&token))]);
    Ok((token, cookie, user))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}
