use axum::Json;

use crate::authz::catalog::{CatalogEntry, CATALOG};
use crate::authz::Session;
use crate::errors::AppResult;

/// The known action catalog, for role editors. Any signed-in user may read it.
#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "Roles",
    responses(
        (status = 200, description = "Permission catalog", body = [CatalogEntry]),
        (status = 401, description = "No valid session")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(_session: Session) -> AppResult<Json<Vec<CatalogEntry>>> {
    Ok(Json(CATALOG.to_vec()))
}
