//! Resource-scoped checks: global standing OR a relation to the project or
//! budget workspace.
//!
//! A caller that cannot see a resource gets `404` whether or not it exists.
//! A caller that can see it but may not change it gets `403`.

use async_trait::async_trait;
use uuid::Uuid;

use super::guard::Grants;
use super::session::Session;
use crate::errors::{AppError, AppResult};

/// How a user relates to a project or workspace, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relation {
    Missing,
    Outsider,
    /// Assigned at least one task in the project, without being a member.
    Assignee,
    Member,
    Owner,
}

#[derive(Debug, Clone, Default)]
pub struct UserGrants {
    pub role: Option<String>,
    pub permissions: Vec<String>,
}

impl UserGrants {
    pub fn as_grants(&self) -> Grants<'_> {
        Grants {
            role: self.role.as_deref(),
            permissions: &self.permissions,
        }
    }
}

/// Lookups the scoped checks need. Implemented on `SqlitePool`.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn user_grants(&self, user_id: Uuid) -> AppResult<Option<UserGrants>>;

    async fn project_relation(&self, user_id: Uuid, project_id: Uuid) -> AppResult<Relation>;

    async fn workspace_relation(&self, user_id: Uuid, workspace_id: Uuid) -> AppResult<Relation>;
}

fn sees_project(grants: Grants<'_>, relation: Relation) -> bool {
    match relation {
        Relation::Missing => false,
        _ if grants.can_view_any_project() => true,
        relation => relation >= Relation::Assignee,
    }
}

fn sees_workspace(grants: Grants<'_>, relation: Relation) -> bool {
    match relation {
        Relation::Missing => false,
        _ if grants.can_view_any_project() || grants.can_edit_any_budget() => true,
        relation => relation >= Relation::Member,
    }
}

/// Soft check for call sites that render a 404 themselves. Unknown users and
/// unknown projects both yield `false`.
pub async fn can_view_project<S>(store: &S, user_id: Uuid, project_id: Uuid) -> AppResult<bool>
where
    S: AccessStore + ?Sized,
{
    let Some(grants) = store.user_grants(user_id).await? else {
        return Ok(false);
    };
    let relation = store.project_relation(user_id, project_id).await?;
    Ok(sees_project(grants.as_grants(), relation))
}

pub async fn require_project_view<S>(store: &S, session: &Session, project_id: Uuid) -> AppResult<Relation>
where
    S: AccessStore + ?Sized,
{
    let relation = store.project_relation(session.user_id, project_id).await?;
    if sees_project(session.grants(), relation) {
        return Ok(relation);
    }

    tracing::debug!(user_id = %session.user_id, %project_id, ?relation, "project hidden from caller");
    Err(AppError::not_found("project not found"))
}

/// Owner, or `EDIT_PROJECT`/manager standing.
pub async fn require_project_edit<S>(store: &S, session: &Session, project_id: Uuid) -> AppResult<()>
where
    S: AccessStore + ?Sized,
{
    let relation = require_project_view(store, session, project_id).await?;
    if relation == Relation::Owner || session.grants().can_edit_any_project() {
        return Ok(());
    }

    Err(AppError::forbidden("only the project owner can change this project"))
}

pub async fn require_project_budget_edit<S>(store: &S, session: &Session, project_id: Uuid) -> AppResult<()>
where
    S: AccessStore + ?Sized,
{
    let relation = require_project_view(store, session, project_id).await?;
    if relation >= Relation::Member || session.grants().can_edit_any_budget() {
        return Ok(());
    }

    Err(AppError::forbidden("not allowed to edit this project's budget"))
}

pub async fn require_workspace_view<S>(store: &S, session: &Session, workspace_id: Uuid) -> AppResult<Relation>
where
    S: AccessStore + ?Sized,
{
    let relation = store.workspace_relation(session.user_id, workspace_id).await?;
    if sees_workspace(session.grants(), relation) {
        return Ok(relation);
    }

    tracing::debug!(user_id = %session.user_id, %workspace_id, ?relation, "workspace hidden from caller");
    Err(AppError::not_found("workspace not found"))
}

pub async fn require_workspace_budget_edit<S>(store: &S, session: &Session, workspace_id: Uuid) -> AppResult<()>
where
    S: AccessStore + ?Sized,
{
    let relation = require_workspace_view(store, session, workspace_id).await?;
    if relation >= Relation::Member || session.grants().can_edit_any_budget() {
        return Ok(());
    }

    Err(AppError::forbidden("not allowed to edit this workspace's budget"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::{self, system};
    use chrono::Utc;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        users: HashMap<Uuid, UserGrants>,
        projects: HashMap<(Uuid, Uuid), Relation>,
        known_projects: Vec<Uuid>,
        workspaces: HashMap<(Uuid, Uuid), Relation>,
        known_workspaces: Vec<Uuid>,
    }

    #[async_trait]
    impl AccessStore for MemoryStore {
        async fn user_grants(&self, user_id: Uuid) -> AppResult<Option<UserGrants>> {
            Ok(self.users.get(&user_id).cloned())
        }

        async fn project_relation(&self, user_id: Uuid, project_id: Uuid) -> AppResult<Relation> {
            if !self.known_projects.contains(&project_id) {
                return Ok(Relation::Missing);
            }
            Ok(*self.projects.get(&(user_id, project_id)).unwrap_or(&Relation::Outsider))
        }

        async fn workspace_relation(&self, user_id: Uuid, workspace_id: Uuid) -> AppResult<Relation> {
            if !self.known_workspaces.contains(&workspace_id) {
                return Ok(Relation::Missing);
            }
            Ok(*self.workspaces.get(&(user_id, workspace_id)).unwrap_or(&Relation::Outsider))
        }
    }

    fn session_for(user_id: Uuid, role: Option<&str>, permissions: &[&str]) -> Session {
        Session {
            user_id,
            email: "x@example.com".into(),
            name: "X".into(),
            role: role.map(String::from),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            issued_at: Utc::now(),
        }
    }

    fn member_grants() -> UserGrants {
        UserGrants {
            role: Some(system::MEMBER.to_string()),
            permissions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn member_sees_project_outsider_does_not() {
        let project = Uuid::new_v4();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let mut store = MemoryStore::default();
        store.known_projects.push(project);
        store.users.insert(member, member_grants());
        store.users.insert(outsider, member_grants());
        store.projects.insert((member, project), Relation::Member);

        assert!(can_view_project(&store, member, project).await.unwrap());
        assert!(!can_view_project(&store, outsider, project).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_or_project_is_a_soft_false() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.users.insert(user, UserGrants { role: Some(system::ADMIN.into()), permissions: vec![] });

        assert!(!can_view_project(&store, user, project).await.unwrap());
        assert!(!can_view_project(&store, Uuid::new_v4(), project).await.unwrap());
    }

    #[tokio::test]
    async fn assignee_can_view_but_not_edit_budget() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.known_projects.push(project);
        store.projects.insert((user, project), Relation::Assignee);
        let session = session_for(user, Some(system::MEMBER), &[]);

        assert_eq!(require_project_view(&store, &session, project).await.unwrap(), Relation::Assignee);
        let err = require_project_budget_edit(&store, &session, project).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn hidden_and_missing_projects_look_the_same() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.known_projects.push(project);
        let session = session_for(user, None, &[]);

        let hidden = require_project_view(&store, &session, project).await.unwrap_err();
        let missing = require_project_view(&store, &session, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(hidden, AppError::NotFound(_)));
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn view_project_permission_sees_but_cannot_edit() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.known_projects.push(project);
        let session = session_for(user, Some("FIELD_OPS"), &[catalog::VIEW_PROJECT]);

        assert!(require_project_view(&store, &session, project).await.is_ok());
        assert!(matches!(require_project_edit(&store, &session, project).await, Err(AppError::Forbidden(_))));
        assert!(matches!(
            require_project_budget_edit(&store, &session, project).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn managers_edit_budgets_without_membership() {
        let project = Uuid::new_v4();
        let workspace = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.known_projects.push(project);
        store.known_workspaces.push(workspace);
        let session = session_for(user, Some(system::PROJECT_MANAGER), &[]);

        assert!(require_project_budget_edit(&store, &session, project).await.is_ok());
        assert!(require_workspace_budget_edit(&store, &session, workspace).await.is_ok());
    }

    #[tokio::test]
    async fn workspace_members_edit_outsiders_get_404() {
        let workspace = Uuid::new_v4();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.known_workspaces.push(workspace);
        store.workspaces.insert((member, workspace), Relation::Member);

        let member_session = session_for(member, Some(system::MEMBER), &[]);
        let outsider_session = session_for(outsider, Some(system::MEMBER), &[]);

        assert!(require_workspace_budget_edit(&store, &member_session, workspace).await.is_ok());
        assert!(matches!(
            require_workspace_budget_edit(&store, &outsider_session, workspace).await,
            Err(AppError::NotFound(_))
        ));
    }
}
