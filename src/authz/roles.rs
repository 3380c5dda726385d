//! Role and permission-set management. Every mutation requires
//! `MANAGE_USERS` and runs in a single transaction.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::catalog::{self, system, MANAGE_USERS};
use super::guard::require_permission;
use super::session::Session;
use crate::db::begin_write;
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::models::role::{DbRole, DeletedRole, Role, RoleCreateRequest, RoleUpdateRequest};

const ROLE_COLUMNS: &str = "r.id, r.name, r.description, r.is_system, r.created_at, r.updated_at, \
     (SELECT COUNT(*) FROM users u WHERE u.role_id = r.id) AS user_count";

/// Normalizes a requested role name and rejects blank or reserved names.
pub fn validated_name(raw: &str) -> AppResult<String> {
    let name = catalog::normalize(raw);
    if name.is_empty() {
        return Err(AppError::bad_request("role name must not be empty"));
    }
    if system::is_reserved(&name) {
        return Err(AppError::invalid_operation(format!("role name {name} is reserved")));
    }
    Ok(name)
}

fn validated_actions(raw: &[String]) -> AppResult<Vec<String>> {
    catalog::normalize_actions(raw).map_err(AppError::bad_request)
}

pub async fn fetch_role(conn: &mut SqliteConnection, role_id: Uuid) -> AppResult<Option<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = ?");
    let Some(db_role) = sqlx::query_as::<_, DbRole>(&sql)
        .bind(role_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let permissions = role_actions(conn, role_id).await?;
    Ok(Some(db_role.into_role(permissions)))
}

async fn role_actions(conn: &mut SqliteConnection, role_id: Uuid) -> AppResult<Vec<String>> {
    Ok(
        sqlx::query_scalar::<_, String>("SELECT action FROM role_permissions WHERE role_id = ? ORDER BY action")
            .bind(role_id)
            .fetch_all(conn)
            .await?,
    )
}

async fn ensure_name_free(conn: &mut SqliteConnection, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(conn)
        .await?;

    match existing {
        Some(id) if Some(id) != except => Err(AppError::conflict(format!("role {name} already exists"))),
        _ => Ok(()),
    }
}

async fn insert_actions(conn: &mut SqliteConnection, role_id: Uuid, actions: &[String]) -> AppResult<()> {
    let now = Utc::now();
    for action in actions {
        sqlx::query("INSERT INTO role_permissions (id, role_id, action, created_at) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(role_id)
            .bind(action)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn map_name_conflict(name: &str) -> impl Fn(sqlx::Error) -> AppError + '_ {
    move |err| {
        if is_unique_violation(&err) {
            AppError::conflict(format!("role {name} already exists"))
        } else {
            AppError::Database(err)
        }
    }
}

pub async fn list_roles(pool: &SqlitePool, caller: &Session) -> AppResult<Vec<Role>> {
    require_permission(caller, MANAGE_USERS)?;

    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r ORDER BY r.is_system DESC, r.name");
    let roles = sqlx::query_as::<_, DbRole>(&sql).fetch_all(pool).await?;

    let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT role_id, action FROM role_permissions ORDER BY action")
        .fetch_all(pool)
        .await?;

    let mut by_role: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (role_id, action) in rows {
        by_role.entry(role_id).or_default().push(action);
    }

    Ok(roles
        .into_iter()
        .map(|role| {
            let permissions = by_role.remove(&role.id).unwrap_or_default();
            role.into_role(permissions)
        })
        .collect())
}

pub async fn get_role(pool: &SqlitePool, caller: &Session, role_id: Uuid) -> AppResult<Role> {
    require_permission(caller, MANAGE_USERS)?;

    let mut conn = pool.acquire().await?;
    fetch_role(&mut conn, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))
}

pub async fn create_role(pool: &SqlitePool, caller: &Session, req: RoleCreateRequest) -> AppResult<Role> {
    require_permission(caller, MANAGE_USERS)?;

    let name = validated_name(&req.name)?;
    let actions = validated_actions(&req.permissions)?;
    let description = req.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    let now = Utc::now();
    let role_id = Uuid::new_v4();

    let mut tx = begin_write(pool).await?;
    ensure_name_free(&mut tx, &name, None).await?;

    sqlx::query(
        "INSERT INTO roles (id, name, description, is_system, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(role_id)
    .bind(&name)
    .bind(&description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(map_name_conflict(&name))?;

    insert_actions(&mut tx, role_id, &actions).await?;

    let role = fetch_role(&mut tx, role_id)
        .await?
        .ok_or_else(|| AppError::internal("role vanished after insert"))?;
    tx.commit().await?;

    tracing::info!(role = %role.name, permissions = role.permissions.len(), "role created");
    Ok(role)
}

/// Applies `req` and returns the role as it was before and after.
pub async fn update_role(
    pool: &SqlitePool,
    caller: &Session,
    role_id: Uuid,
    req: RoleUpdateRequest,
) -> AppResult<(Role, Role)> {
    require_permission(caller, MANAGE_USERS)?;

    let actions = req.permissions.as_deref().map(validated_actions).transpose()?;

    let mut tx = begin_write(pool).await?;
    let before = fetch_role(&mut tx, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;

    if before.is_system && (req.name.is_some() || actions.is_some()) {
        return Err(AppError::invalid_operation(format!(
            "system role {} cannot be renamed or have its permissions changed",
            before.name
        )));
    }

    let name = match req.name.as_deref() {
        Some(raw) => {
            let name = validated_name(raw)?;
            if name != before.name {
                ensure_name_free(&mut tx, &name, Some(role_id)).await?;
            }
            name
        }
        None => before.name.clone(),
    };

    let description = match req.description {
        Some(d) => Some(d.trim().to_string()).filter(|d| !d.is_empty()),
        None => before.description.clone(),
    };

    sqlx::query("UPDATE roles SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(Utc::now())
        .bind(role_id)
        .execute(&mut *tx)
        .await
        .map_err(map_name_conflict(&name))?;

    if let Some(actions) = actions.as_deref() {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        insert_actions(&mut tx, role_id, actions).await?;
    }

    let after = fetch_role(&mut tx, role_id)
        .await?
        .ok_or_else(|| AppError::internal("role vanished during update"))?;
    tx.commit().await?;

    tracing::info!(role = %after.name, "role updated");
    Ok((before, after))
}

/// Clears the role from every holder, then removes it with its permissions.
pub async fn delete_role(pool: &SqlitePool, caller: &Session, role_id: Uuid) -> AppResult<DeletedRole> {
    require_permission(caller, MANAGE_USERS)?;

    let mut tx = begin_write(pool).await?;
    let role = fetch_role(&mut tx, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;

    if role.is_system {
        return Err(AppError::invalid_operation(format!("system role {} cannot be deleted", role.name)));
    }

    let cleared = sqlx::query("UPDATE users SET role_id = NULL, updated_at = ? WHERE role_id = ?")
        .bind(Utc::now())
        .bind(role_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(role = %role.name, cleared_users = cleared, "role deleted");
    Ok(DeletedRole {
        role,
        cleared_users: cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_name_normalizes() {
        assert_eq!(validated_name("  field ops ").unwrap(), "FIELD_OPS");
    }

    #[test]
    fn validated_name_rejects_reserved_and_blank() {
        assert!(matches!(validated_name("admin"), Err(AppError::InvalidOperation(_))));
        assert!(matches!(validated_name("project manager"), Err(AppError::InvalidOperation(_))));
        assert!(matches!(validated_name(" - "), Err(AppError::BadRequest(_))));
    }
}
