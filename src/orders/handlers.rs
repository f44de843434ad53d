// HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::costing::StockReport;
use crate::error::ApiError;
use crate::orders::{
    CreateOrderRequest, Order, OrderFilter, OrderListQuery, OrderResponse, UpdateStatusRequest,
};
use crate::AppState;

/// Handler for POST /api/orders
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid request"),
        (status = 422, description = "Store closed")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    request.validate()?;

    let order = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for GET /api/orders
#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = [Order]),
        (status = 400, description = "Unknown status in filter")
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let filter = OrderFilter::try_from(query).map_err(ApiError::BadRequest)?;
    let orders = state.orders.list_orders(&filter).await?;
    Ok(Json(orders))
}

/// Handler for GET /api/orders/active
#[utoipa::path(
    get,
    path = "/api/orders/active",
    responses((status = 200, description = "Orders not yet concluded or cancelled", body = [Order])),
    tag = "orders"
)]
pub async fn active_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.active_orders().await?))
}

/// Handler for GET /api/orders/{id}
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderResponse),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    Ok(Json(state.orders.get_order(id).await?))
}

/// Handler for GET /api/orders/number/{number}
#[utoipa::path(
    get,
    path = "/api/orders/number/{number}",
    params(("number" = String, Path, description = "Order number, with or without #")),
    responses(
        (status = 200, description = "Order with items", body = OrderResponse),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    Ok(Json(state.orders.get_by_number(&number).await?))
}

/// Handler for PATCH /api/orders/{id}/status
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Order),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order changed concurrently"),
        (status = 422, description = "Invalid transition or insufficient stock")
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.update_status(id, request.status).await?;
    Ok(Json(order))
}

/// Handler for GET /api/orders/{id}/stock-check
#[utoipa::path(
    get,
    path = "/api/orders/{id}/stock-check",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Shortages per line", body = StockReport),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn order_stock_check(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StockReport>, ApiError> {
    Ok(Json(state.orders.stock_report(id).await?))
}

/// Handler for DELETE /api/orders/{id}
#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is still active")
    ),
    tag = "orders"
)]
pub async fn delete_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
