use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, events, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::register,
		routes::auth::login,
		routes::auth::refresh,
		routes::auth::me,
		routes::auth::logout,
		routes::health::health,
		routes::permissions::list_permissions,
		routes::activity::list_activity,
		routes::roles::list_roles,
		routes::roles::create_role,
		routes::roles::get_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::users::list_users,
		routes::users::assign_role,
		routes::users::admin_assign_role,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::projects::get_project,
		routes::projects::update_project,
		routes::projects::delete_project,
		routes::projects::add_member,
		routes::projects::remove_member,
		routes::tasks::list_tasks,
		routes::tasks::create_task,
		routes::tasks::update_task,
		routes::budgets::list_workspaces,
		routes::budgets::create_workspace,
		routes::budgets::get_workspace,
		routes::budgets::add_member,
		routes::budgets::add_line,
		routes::budgets::delete_line,
		routes::budgets::project_budget
	),
	components(
		schemas(
			authz::Session,
			authz::catalog::CatalogEntry,
			events::ActivityEntry,
			routes::auth::MessageResponse,
			routes::health::HealthResponse,
			models::user::UserView,
			models::user::RoleRef,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::AssignRoleRequest,
			models::role::Role,
			models::role::RoleCreateRequest,
			models::role::RoleUpdateRequest,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::project::MemberRequest,
			models::task::Task,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::budget::BudgetWorkspace,
			models::budget::BudgetLine,
			models::budget::BudgetSummary,
			models::budget::WorkspaceDetail,
			models::budget::WorkspaceOverview,
			models::budget::WorkspaceCreateRequest,
			models::budget::BudgetLineRequest
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Auth", description = "Registration, login and session tokens"),
		(name = "Roles", description = "Roles and their permission sets"),
		(name = "Users", description = "User listing and role assignment"),
		(name = "Projects", description = "Projects and membership"),
		(name = "Tasks", description = "Project tasks"),
		(name = "Budgets", description = "Budget workspaces and lines"),
		(name = "Activity", description = "Activity log"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
		);
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc = Arc::new(doc);
	let json_route = get(move || {
		let doc = Arc::clone(&doc);
		async move { Json(doc.as_ref().clone()) }
	});

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_authorization_routes() {
		let doc = build_openapi(8000);
		for path in ["/api/roles", "/api/roles/{id}", "/api/users/{id}/role", "/api/admin/users/{userId}/role"] {
			assert!(doc.paths.paths.contains_key(path), "missing {path}");
		}
	}

	#[test]
	fn bearer_scheme_is_registered() {
		let doc = build_openapi(9000);
		let components = doc.components.expect("components");
		assert!(components.security_schemes.contains_key("bearerAuth"));
		assert_eq!(doc.servers.unwrap()[0].url, "http://localhost:9000");
	}
}
