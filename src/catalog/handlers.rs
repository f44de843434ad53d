// HTTP handlers for the storefront menu

use axum::{extract::State, Json};

use crate::catalog::menu::MenuSnapshot;
use crate::error::ApiError;
use crate::AppState;

/// Handler for GET /api/menu
/// Returns the active catalog grouped by category
#[utoipa::path(
    get,
    path = "/api/menu",
    responses(
        (status = 200, description = "Menu snapshot", body = MenuSnapshot),
        (status = 500, description = "Internal server error")
    ),
    tag = "catalog"
)]
pub async fn get_menu(State(state): State<AppState>) -> Result<Json<MenuSnapshot>, ApiError> {
    tracing::debug!("Building menu snapshot");

    let menu = MenuSnapshot::load(state.catalog.as_ref()).await?;

    tracing::debug!("Menu snapshot has {} categories", menu.categories.len());
    Ok(Json(menu))
}
