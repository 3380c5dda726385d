use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::seed::seed_system_roles;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{activity, auth, budgets, health, permissions, projects, roles, tasks, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    create_app_with_config(pool, jwt_config).await
}

pub async fn create_app_with_config(pool: SqlitePool, jwt_config: JwtConfig) -> Result<Router, AppError> {
    seed_system_roles(&pool).await?;

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let role_routes = Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route("/:id", get(roles::get_role).patch(roles::update_role).delete(roles::delete_role));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", patch(users::assign_role));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/members", post(projects::add_member))
        .route("/:id/members/:user_id", delete(projects::remove_member))
        .route("/:id/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/:id/tasks/:task_id", patch(tasks::update_task))
        .route("/:id/budget", get(budgets::project_budget));

    let workspace_routes = Router::new()
        .route("/", get(budgets::list_workspaces).post(budgets::create_workspace))
        .route("/:id", get(budgets::get_workspace))
        .route("/:id/members", post(budgets::add_member))
        .route("/:id/lines", post(budgets::add_line))
        .route("/:id/lines/:line_id", delete(budgets::delete_line));

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/permissions", get(permissions::list_permissions))
        .route("/activity", get(activity::list_activity))
        .route("/admin/users/:user_id/role", patch(users::admin_assign_role))
        .nest("/roles", role_routes)
        .nest("/users", user_routes)
        .nest("/projects", project_routes)
        .nest("/workspaces", workspace_routes);

    let router = Router::new()
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
