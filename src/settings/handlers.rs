// HTTP handlers for store settings

use axum::{extract::State, Json};

use crate::error::ApiError;
use crate::settings::StoreSettings;
use crate::AppState;

/// Handler for GET /api/settings
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "Current store settings", body = StoreSettings)),
    tag = "settings"
)]
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<StoreSettings>, ApiError> {
    Ok(Json(state.settings.get().await?))
}

/// Handler for PUT /api/settings
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = StoreSettings,
    responses(
        (status = 200, description = "Settings saved", body = StoreSettings),
        (status = 400, description = "Invalid fee, margin or commission")
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<StoreSettings>,
) -> Result<Json<StoreSettings>, ApiError> {
    let saved = state.settings.update(settings).await?;
    Ok(Json(saved))
}
