use std::collections::HashMap;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::catalog::MANAGE_USERS;
use super::guard::require_permission;
use super::session::Session;
use crate::db::begin_write;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUserView, UserView};

const USER_VIEW_SELECT: &str = "SELECT u.id, u.name, u.email, u.role_id, r.name AS role_name, \
     u.avatar_key, u.cv_key, u.created_at, u.updated_at \
     FROM users u LEFT JOIN roles r ON r.id = u.role_id";

pub async fn fetch_user_view(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<UserView>> {
    let mut conn = pool.acquire().await?;
    load_user_view(&mut conn, user_id).await
}

async fn load_user_view(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<Option<UserView>> {
    let sql = format!("{USER_VIEW_SELECT} WHERE u.id = ?");
    let Some(row) = sqlx::query_as::<_, DbUserView>(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let permissions = match row.role_id {
        Some(role_id) => {
            sqlx::query_scalar::<_, String>("SELECT action FROM role_permissions WHERE role_id = ? ORDER BY action")
                .bind(role_id)
                .fetch_all(&mut *conn)
                .await?
        }
        None => Vec::new(),
    };

    Ok(Some(row.into_view(permissions)))
}

pub async fn list_users(pool: &SqlitePool, caller: &Session) -> AppResult<Vec<UserView>> {
    require_permission(caller, MANAGE_USERS)?;

    let sql = format!("{USER_VIEW_SELECT} ORDER BY u.name, u.email");
    let rows = sqlx::query_as::<_, DbUserView>(&sql).fetch_all(pool).await?;

    let actions = sqlx::query_as::<_, (Uuid, String)>("SELECT role_id, action FROM role_permissions ORDER BY action")
        .fetch_all(pool)
        .await?;
    let mut by_role: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (role_id, action) in actions {
        by_role.entry(role_id).or_default().push(action);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let permissions = row
                .role_id
                .and_then(|id| by_role.get(&id).cloned())
                .unwrap_or_default();
            row.into_view(permissions)
        })
        .collect())
}

/// Sets or clears a user's role on behalf of a `MANAGE_USERS` holder.
/// Returns the user before and after the change.
pub async fn assign_role(
    pool: &SqlitePool,
    caller: &Session,
    user_id: Uuid,
    role_id: Option<Uuid>,
) -> AppResult<(UserView, UserView)> {
    require_permission(caller, MANAGE_USERS)?;
    set_user_role(pool, caller, user_id, role_id).await
}

/// The assignment itself, without the permission check. Callers are
/// responsible for authorizing `caller` first.
pub async fn set_user_role(
    pool: &SqlitePool,
    caller: &Session,
    user_id: Uuid,
    role_id: Option<Uuid>,
) -> AppResult<(UserView, UserView)> {
    if user_id == caller.user_id {
        return Err(AppError::invalid_operation("you cannot change your own role"));
    }

    // Role check and update run under one write lock.
    let mut tx = begin_write(pool).await?;

    let before = load_user_view(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    if let Some(role_id) = role_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE id = ?")
            .bind(role_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(AppError::not_found("role not found"));
        }
    }

    sqlx::query("UPDATE users SET role_id = ?, updated_at = ? WHERE id = ?")
        .bind(role_id)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let after = load_user_view(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    tx.commit().await?;

    tracing::info!(
        actor = %caller.user_id,
        user = %user_id,
        role = after.role.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
        "user role changed"
    );
    Ok((before, after))
}
