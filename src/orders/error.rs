use uuid::Uuid;

use crate::costing::{CostingError, StockReport};
use crate::db::StoreError;
use crate::error::ApiError;
use crate::inventory::InventoryError;
use crate::settings::SettingsError;

/// Error types for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Catalog item not found: {0}")]
    ItemNotFound(String),

    #[error("Add-on {add_on_id} is not available for {item}")]
    InvalidAddOn { add_on_id: i32, item: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("The store is closed")]
    StoreClosed,

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Insufficient stock to complete the order")]
    InsufficientStock(StockReport),

    #[error("Order {0} was modified concurrently")]
    ConcurrentUpdate(Uuid),

    #[error("Order {0} is still active and cannot be deleted")]
    ActiveOrder(Uuid),

    #[error("Could not allocate a unique order number")]
    NumberExhausted,

    #[error(transparent)]
    Costing(#[from] CostingError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OrderError> for ApiError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::NotFound(id) => ApiError::not_found("Order", id),
            OrderError::ItemNotFound(_) | OrderError::InvalidAddOn { .. } | OrderError::ValidationError(_) => {
                ApiError::BadRequest(error.to_string())
            }
            OrderError::StoreClosed => ApiError::business_rule("STORE_CLOSED", error.to_string(), None),
            OrderError::InvalidTransition(ref message) => {
                ApiError::business_rule("INVALID_TRANSITION", message.clone(), None)
            }
            OrderError::InsufficientStock(ref report) => ApiError::business_rule(
                "INSUFFICIENT_STOCK",
                error.to_string(),
                serde_json::to_value(report).ok(),
            ),
            OrderError::ConcurrentUpdate(_) | OrderError::ActiveOrder(_) => ApiError::Conflict {
                message: error.to_string(),
            },
            OrderError::NumberExhausted => ApiError::InternalError(error.to_string()),
            OrderError::Costing(inner) => inner.into(),
            OrderError::Inventory(inner) => inner.into(),
            OrderError::Settings(inner) => inner.into(),
            OrderError::Store(store) => ApiError::StoreError(store),
        }
    }
}
