// HTTP handlers for inventory endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::error::ApiError;
use crate::inventory::models::{
    AverageCostResponse, DeductRequest, InventoryLevel, PurchaseLot, RecordPurchaseRequest, StockResponse,
};
use crate::AppState;

/// Handler for GET /api/inventory/ingredients/{id}/average-cost
#[utoipa::path(
    get,
    path = "/api/inventory/ingredients/{id}/average-cost",
    params(("id" = i32, Path, description = "Ingredient ID")),
    responses(
        (status = 200, description = "Weighted-average unit cost", body = AverageCostResponse),
        (status = 404, description = "Ingredient not found")
    ),
    tag = "inventory"
)]
pub async fn get_average_cost(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<AverageCostResponse>, ApiError> {
    let unit_cost = state.inventory.weighted_average_unit_cost(id).await?;
    Ok(Json(AverageCostResponse {
        ingredient_id: id,
        unit_cost,
    }))
}

/// Handler for GET /api/inventory/ingredients/{id}/stock
#[utoipa::path(
    get,
    path = "/api/inventory/ingredients/{id}/stock",
    params(("id" = i32, Path, description = "Ingredient ID")),
    responses((status = 200, description = "Stock summed over insumos", body = StockResponse)),
    tag = "inventory"
)]
pub async fn get_ingredient_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<StockResponse>, ApiError> {
    let quantity = state.inventory.current_stock_ingredient(id).await?;
    Ok(Json(StockResponse { id, quantity }))
}

/// Handler for GET /api/inventory/insumos/{id}/stock
#[utoipa::path(
    get,
    path = "/api/inventory/insumos/{id}/stock",
    params(("id" = i32, Path, description = "Insumo ID")),
    responses((status = 200, description = "Insumo stock", body = StockResponse)),
    tag = "inventory"
)]
pub async fn get_insumo_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<StockResponse>, ApiError> {
    let quantity = state.inventory.current_stock_insumo(id).await?;
    Ok(Json(StockResponse { id, quantity }))
}

/// Handler for POST /api/inventory/purchases
#[utoipa::path(
    post,
    path = "/api/inventory/purchases",
    request_body = RecordPurchaseRequest,
    responses(
        (status = 201, description = "Purchase lot recorded", body = PurchaseLot),
        (status = 400, description = "Invalid quantity, price or insumo"),
        (status = 404, description = "Ingredient not found")
    ),
    tag = "inventory"
)]
pub async fn record_purchase(
    State(state): State<AppState>,
    Json(request): Json<RecordPurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseLot>), ApiError> {
    let lot = state.inventory.record_purchase(request).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

/// Handler for POST /api/inventory/insumos/{id}/deduct
/// Refused deductions answer 422 and leave stock unchanged
#[utoipa::path(
    post,
    path = "/api/inventory/insumos/{id}/deduct",
    params(("id" = i32, Path, description = "Insumo ID")),
    request_body = DeductRequest,
    responses(
        (status = 200, description = "Stock after deduction", body = StockResponse),
        (status = 422, description = "Insufficient stock")
    ),
    tag = "inventory"
)]
pub async fn deduct_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<DeductRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let applied = state.inventory.deduct(id, request.quantity).await?;
    let quantity = state.inventory.current_stock_insumo(id).await?;

    if !applied {
        return Err(ApiError::business_rule(
            "INSUFFICIENT_STOCK",
            format!("Insumo {} has less than {} in stock", id, request.quantity),
            Some(json!({ "requested": request.quantity, "available": quantity })),
        ));
    }

    Ok(Json(StockResponse { id, quantity }))
}

/// Handler for GET /api/inventory/low-stock
#[utoipa::path(
    get,
    path = "/api/inventory/low-stock",
    responses((status = 200, description = "Levels at or below threshold", body = Vec<InventoryLevel>)),
    tag = "inventory"
)]
pub async fn get_low_stock(State(state): State<AppState>) -> Result<Json<Vec<InventoryLevel>>, ApiError> {
    let levels = state.inventory.low_stock().await?;
    tracing::debug!("{} insumo(s) at or below threshold", levels.len());
    Ok(Json(levels))
}
