use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::begin_write;
use crate::authz::catalog::system;
use crate::errors::AppResult;

/// Ensures every built-in role exists, is flagged as system, and holds
/// exactly its default permissions. Safe to run on every startup.
pub async fn seed_system_roles(pool: &SqlitePool) -> AppResult<()> {
    let now = Utc::now();
    let mut tx = begin_write(pool).await?;

    for &name in system::NAMES {
        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

        let role_id = match existing {
            Some(id) => {
                sqlx::query("UPDATE roles SET is_system = 1 WHERE id = ? AND is_system = 0")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO roles (id, name, description, is_system, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
                )
                .bind(id)
                .bind(name)
                .bind(system::description(name))
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tracing::info!(role = name, "seeded system role");
                id
            }
        };

        let wanted = system::default_permissions(name);
        let held: Vec<String> = sqlx::query_scalar("SELECT action FROM role_permissions WHERE role_id = ?")
            .bind(role_id)
            .fetch_all(&mut *tx)
            .await?;

        for stale in held.iter().filter(|action| !wanted.contains(&action.as_str())) {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND action = ?")
                .bind(role_id)
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        for action in wanted.iter().filter(|action| !held.iter().any(|h| h == *action)) {
            sqlx::query("INSERT INTO role_permissions (id, role_id, action, created_at) VALUES (?, ?, ?, ?)")
                .bind(Uuid::new_v4())
                .bind(role_id)
                .bind(*action)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

pub async fn role_id_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Uuid>> {
    Ok(sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?)
}
