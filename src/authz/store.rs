use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::scope::{AccessStore, Relation, UserGrants};
use super::session::load_session;
use crate::errors::AppResult;

fn relation_from(owner: i64, member: i64, assignee: i64) -> Relation {
    if owner != 0 {
        Relation::Owner
    } else if member != 0 {
        Relation::Member
    } else if assignee != 0 {
        Relation::Assignee
    } else {
        Relation::Outsider
    }
}

#[async_trait]
impl AccessStore for SqlitePool {
    async fn user_grants(&self, user_id: Uuid) -> AppResult<Option<UserGrants>> {
        Ok(load_session(self, user_id).await?.map(|session| UserGrants {
            role: session.role,
            permissions: session.permissions,
        }))
    }

    async fn project_relation(&self, user_id: Uuid, project_id: Uuid) -> AppResult<Relation> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                p.owner_id = ?,
                EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?),
                EXISTS (SELECT 1 FROM tasks t WHERE t.project_id = p.id AND t.assignee_id = ?)
            FROM projects p
            WHERE p.id = ? AND p.deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(project_id)
        .fetch_optional(self)
        .await?;

        Ok(match row {
            Some((owner, member, assignee)) => relation_from(owner, member, assignee),
            None => Relation::Missing,
        })
    }

    async fn workspace_relation(&self, user_id: Uuid, workspace_id: Uuid) -> AppResult<Relation> {
        // membership of the linked project counts as workspace membership
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                w.owner_id = ?,
                EXISTS (SELECT 1 FROM workspace_members m WHERE m.workspace_id = w.id AND m.user_id = ?)
                OR EXISTS (
                    SELECT 1 FROM projects p
                    WHERE p.id = w.project_id
                      AND p.deleted_at IS NULL
                      AND (p.owner_id = ?
                           OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ?))
                )
            FROM budget_workspaces w
            WHERE w.id = ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(self)
        .await?;

        Ok(match row {
            Some((owner, member)) => relation_from(owner, member, 0),
            None => Relation::Missing,
        })
    }
}
