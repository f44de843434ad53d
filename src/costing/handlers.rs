// HTTP handlers for costing, simulation and combo pricing

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::catalog::BomLine;
use crate::costing::combo::ComboQuote;
use crate::costing::engine::{suggested_price, CostBreakdown, ProductCostReport};
use crate::error::ApiError;
use crate::AppState;

/// Query parameters for cost reports
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MarginQuery {
    /// Target margin in percent; defaults to the store setting
    pub margin: Option<Decimal>,
}

/// Request DTO for POST /api/costing/simulate
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SimulateCostRequest {
    #[validate(length(min = 1, message = "Simulation needs at least one recipe line"))]
    pub insumos: Vec<BomLine>,
    pub margin: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimulateCostResponse {
    pub breakdown: CostBreakdown,
    pub margin: Decimal,
    pub suggested_price: Decimal,
}

async fn target_margin(state: &AppState, requested: Option<Decimal>) -> Result<Decimal, ApiError> {
    match requested {
        Some(margin) => Ok(margin),
        None => Ok(state.settings.get().await?.default_margin_pct),
    }
}

/// Handler for GET /api/products/{id}/cost
#[utoipa::path(
    get,
    path = "/api/products/{id}/cost",
    params(("id" = i32, Path, description = "Product ID"), MarginQuery),
    responses(
        (status = 200, description = "Cost breakdown and margins", body = ProductCostReport),
        (status = 404, description = "Product not found"),
        (status = 422, description = "Margin out of range")
    ),
    tag = "costing"
)]
pub async fn get_product_cost(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<MarginQuery>,
) -> Result<Json<ProductCostReport>, ApiError> {
    let margin = target_margin(&state, query.margin).await?;
    let report = state.costing.product_report(id, margin).await?;
    Ok(Json(report))
}

/// Handler for POST /api/products/{id}/pricing/refresh
#[utoipa::path(
    post,
    path = "/api/products/{id}/pricing/refresh",
    params(("id" = i32, Path, description = "Product ID"), MarginQuery),
    responses(
        (status = 200, description = "Stored cmv and margin", body = ProductCostReport),
        (status = 404, description = "Product not found")
    ),
    tag = "costing"
)]
pub async fn refresh_product_pricing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<MarginQuery>,
) -> Result<Json<ProductCostReport>, ApiError> {
    let margin = target_margin(&state, query.margin).await?;
    let report = state.costing.refresh_product_pricing(id, margin).await?;
    Ok(Json(report))
}

/// Handler for POST /api/costing/simulate
#[utoipa::path(
    post,
    path = "/api/costing/simulate",
    request_body = SimulateCostRequest,
    responses(
        (status = 200, description = "Simulated cost", body = SimulateCostResponse),
        (status = 400, description = "Empty recipe")
    ),
    tag = "costing"
)]
pub async fn simulate_cost(
    State(state): State<AppState>,
    Json(request): Json<SimulateCostRequest>,
) -> Result<Json<SimulateCostResponse>, ApiError> {
    request.validate()?;

    let margin = target_margin(&state, request.margin).await?;
    let breakdown = state.costing.simulate_cost(&request.insumos).await?;
    let suggested = suggested_price(breakdown.total_cost, margin)?.round_dp(2);

    Ok(Json(SimulateCostResponse {
        breakdown,
        margin,
        suggested_price: suggested,
    }))
}

/// Handler for GET /api/combos/{id}/quote
#[utoipa::path(
    get,
    path = "/api/combos/{id}/quote",
    params(("id" = i32, Path, description = "Combo ID")),
    responses(
        (status = 200, description = "Combo and marketplace price", body = ComboQuote),
        (status = 404, description = "Combo not found"),
        (status = 422, description = "Marketplace commission misconfigured")
    ),
    tag = "costing"
)]
pub async fn quote_combo(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<ComboQuote>, ApiError> {
    let settings = state.settings.get().await?;
    let quote = state.combos.quote(id, &settings.marketplace).await?;
    Ok(Json(quote))
}

/// Handler for POST /api/combos/{id}/pricing/refresh
#[utoipa::path(
    post,
    path = "/api/combos/{id}/pricing/refresh",
    params(("id" = i32, Path, description = "Combo ID")),
    responses(
        (status = 200, description = "Stored combo prices", body = ComboQuote),
        (status = 404, description = "Combo not found")
    ),
    tag = "costing"
)]
pub async fn refresh_combo_pricing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ComboQuote>, ApiError> {
    let settings = state.settings.get().await?;
    let quote = state.combos.refresh_combo_pricing(id, &settings.marketplace).await?;
    Ok(Json(quote))
}
