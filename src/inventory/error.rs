use rust_decimal::Decimal;

use crate::db::StoreError;
use crate::error::ApiError;

/// Error types for inventory operations
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Ingredient not found: {0}")]
    IngredientNotFound(i32),

    #[error("Insumo not found: {0}")]
    InsumoNotFound(i32),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid unit price: {0}")]
    InvalidPrice(Decimal),

    #[error("Ingredient {0} has no insumo to credit")]
    NoInsumo(i32),

    #[error("Insumo {insumo_id} is not derived from ingredient {ingredient_id}")]
    InsumoMismatch { insumo_id: i32, ingredient_id: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<InventoryError> for ApiError {
    fn from(error: InventoryError) -> Self {
        match error {
            InventoryError::IngredientNotFound(id) => ApiError::not_found("Ingredient", id),
            InventoryError::InsumoNotFound(id) => ApiError::not_found("Insumo", id),
            InventoryError::InvalidQuantity(_)
            | InventoryError::InvalidPrice(_)
            | InventoryError::NoInsumo(_)
            | InventoryError::InsumoMismatch { .. } => ApiError::BadRequest(error.to_string()),
            InventoryError::Store(store) => ApiError::StoreError(store),
        }
    }
}
