//! Permission catalog and the normalization shared by role names and actions.

use serde::Serialize;
use utoipa::ToSchema;

pub const MANAGE_USERS: &str = "MANAGE_USERS";
pub const CREATE_PROJECT: &str = "CREATE_PROJECT";
pub const VIEW_PROJECT: &str = "VIEW_PROJECT";
pub const EDIT_PROJECT: &str = "EDIT_PROJECT";
pub const DELETE_PROJECT: &str = "DELETE_PROJECT";
pub const ASSIGN_TASKS: &str = "ASSIGN_TASKS";
pub const MANAGE_BUDGET: &str = "MANAGE_BUDGET";
pub const VIEW_REPORTS: &str = "VIEW_REPORTS";

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct CatalogEntry {
    #[schema(example = "MANAGE_USERS")]
    pub action: &'static str,
    pub description: &'static str,
}

/// Actions the application itself checks. Custom roles may still store
/// actions outside this list.
pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { action: MANAGE_USERS, description: "Manage users, roles and role assignments" },
    CatalogEntry { action: CREATE_PROJECT, description: "Create new projects" },
    CatalogEntry { action: VIEW_PROJECT, description: "View every project, not only those the user belongs to" },
    CatalogEntry { action: EDIT_PROJECT, description: "Edit any project and its membership" },
    CatalogEntry { action: DELETE_PROJECT, description: "Delete projects" },
    CatalogEntry { action: ASSIGN_TASKS, description: "Assign tasks to users" },
    CatalogEntry { action: MANAGE_BUDGET, description: "Edit any project or workspace budget" },
    CatalogEntry { action: VIEW_REPORTS, description: "View daily reports" },
];

pub fn is_known(action: &str) -> bool {
    CATALOG.iter().any(|entry| entry.action == action)
}

pub fn all_actions() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|entry| entry.action)
}

/// Built-in roles. Their names are reserved and their permission sets are
/// fixed; they are re-synced from here on every startup.
pub mod system {
    use super::*;

    pub const ADMIN: &str = "ADMIN";
    pub const PROJECT_MANAGER: &str = "PROJECT_MANAGER";
    pub const MEMBER: &str = "MEMBER";

    pub const NAMES: &[&str] = &[ADMIN, PROJECT_MANAGER, MEMBER];

    pub fn is_reserved(normalized_name: &str) -> bool {
        NAMES.contains(&normalized_name)
    }

    pub fn description(name: &str) -> &'static str {
        match name {
            ADMIN => "Full administrative access",
            PROJECT_MANAGER => "Runs projects, tasks and budgets",
            _ => "Sees only the projects they belong to",
        }
    }

    pub fn default_permissions(name: &str) -> Vec<&'static str> {
        match name {
            ADMIN => all_actions().collect(),
            PROJECT_MANAGER => vec![
                CREATE_PROJECT,
                VIEW_PROJECT,
                EDIT_PROJECT,
                ASSIGN_TASKS,
                MANAGE_BUDGET,
                VIEW_REPORTS,
            ],
            _ => Vec::new(),
        }
    }
}

/// Canonical form for role names and permission actions: words split on
/// whitespace, `-` or `_`, joined with `_`, uppercased.
pub fn normalize(input: &str) -> String {
    input
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Normalizes, drops duplicates and sorts. Empty entries are rejected.
pub fn normalize_actions<I, S>(actions: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = std::collections::BTreeSet::new();
    for raw in actions {
        let action = normalize(raw.as_ref());
        if action.is_empty() {
            return Err("permission actions must not be empty".to_string());
        }
        out.insert(action);
    }
    Ok(out.into_iter().collect())
}
