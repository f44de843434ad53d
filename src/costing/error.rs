use rust_decimal::Decimal;

use crate::db::StoreError;
use crate::error::ApiError;
use crate::inventory::InventoryError;

/// Error types for costing, stock checks and combo pricing
#[derive(Debug, thiserror::Error)]
pub enum CostingError {
    #[error("Product not found: {0}")]
    ProductNotFound(i32),

    #[error("Combo not found: {0}")]
    ComboNotFound(i32),

    #[error("Margin must be in [0, 100), got {0}")]
    InvalidMargin(Decimal),

    #[error("Marketplace commission must be in [0, 100), got {0}")]
    InvalidCommission(Decimal),

    #[error("Discount must be in [0, 100], got {0}")]
    InvalidDiscount(Decimal),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CostingError> for ApiError {
    fn from(error: CostingError) -> Self {
        match error {
            CostingError::ProductNotFound(id) => ApiError::not_found("Product", id),
            CostingError::ComboNotFound(id) => ApiError::not_found("Combo", id),
            CostingError::InvalidMargin(value) => ApiError::business_rule(
                "INVALID_MARGIN",
                error.to_string(),
                Some(serde_json::json!({ "margin": value })),
            ),
            CostingError::InvalidCommission(value) => ApiError::business_rule(
                "INVALID_COMMISSION",
                error.to_string(),
                Some(serde_json::json!({ "commission_pct": value })),
            ),
            CostingError::InvalidDiscount(_) => ApiError::BadRequest(error.to_string()),
            CostingError::Inventory(inner) => inner.into(),
            CostingError::Store(store) => ApiError::StoreError(store),
        }
    }
}
