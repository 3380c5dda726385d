//! Authorization: permission catalog, roles, session resolution and guards.
//!
//! Every request resolves its own `Session`; nothing about roles or
//! permissions is cached in process. How long a token's embedded permission
//! list is trusted is bounded by `SESSION_REFRESH_SECS`.

pub mod assignment;
pub mod catalog;
mod guard;
pub mod roles;
pub mod scope;
mod session;
mod store;

pub use guard::{require_permission, require_role, Grants};
pub use scope::{
    can_view_project, require_project_budget_edit, require_project_edit, require_project_view,
    require_workspace_budget_edit, require_workspace_view, AccessStore, Relation,
};
pub use session::{load_session, Session};
