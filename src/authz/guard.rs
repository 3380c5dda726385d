use super::catalog::{self, system};
use super::session::Session;
use crate::errors::AppError;

/// Borrowed view of what a user holds: the role name and its actions.
#[derive(Debug, Clone, Copy)]
pub struct Grants<'a> {
    pub role: Option<&'a str>,
    pub permissions: &'a [String],
}

impl<'a> Grants<'a> {
    pub fn has_permission(&self, action: &str) -> bool {
        self.permissions.iter().any(|held| held == action)
    }

    fn has_role_in(&self, roles: &[&str]) -> bool {
        self.role.map(|role| roles.contains(&role)).unwrap_or(false)
    }

    /// Global standing that bypasses membership on project-scoped checks.
    pub fn is_manager(&self) -> bool {
        self.has_role_in(&[system::ADMIN, system::PROJECT_MANAGER]) || self.has_permission(catalog::MANAGE_USERS)
    }

    pub fn can_view_any_project(&self) -> bool {
        self.is_manager() || self.has_permission(catalog::VIEW_PROJECT)
    }

    pub fn can_edit_any_project(&self) -> bool {
        self.is_manager() || self.has_permission(catalog::EDIT_PROJECT)
    }

    pub fn can_edit_any_budget(&self) -> bool {
        self.is_manager() || self.has_permission(catalog::MANAGE_BUDGET)
    }
}

/// Fails with 403 unless the session holds `action`.
pub fn require_permission<'s>(session: &'s Session, action: &str) -> Result<&'s Session, AppError> {
    let action = catalog::normalize(action);
    if session.has_permission(&action) {
        return Ok(session);
    }

    tracing::debug!(user_id = %session.user_id, action = %action, "permission denied");
    Err(AppError::forbidden(format!("missing permission {action}")))
}

/// Fails with 403 unless the session's role is exactly `role`.
pub fn require_role<'s>(session: &'s Session, role: &str) -> Result<&'s Session, AppError> {
    if session.has_role(role) {
        return Ok(session);
    }

    tracing::debug!(user_id = %session.user_id, role = %role, "role check failed");
    Err(AppError::forbidden(format!("requires role {role}")))
}
