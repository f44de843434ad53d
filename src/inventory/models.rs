use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Minimum threshold given to a level row created by a purchase
pub const DEFAULT_MIN_THRESHOLD: Decimal = Decimal::TEN;

/// One purchase event of an ingredient
///
/// `remaining` is `None` for lots imported before remaining tracking existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PurchaseLot {
    pub id: i64,
    pub ingredient_id: i32,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub remaining: Option<Decimal>,
    pub purchased_at: DateTime<Utc>,
}

/// On-hand quantity of an insumo, expressed in its ingredient's unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryLevel {
    pub insumo_id: i32,
    pub quantity: Decimal,
    pub min_threshold: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    pub fn is_low(&self) -> bool {
        self.quantity <= self.min_threshold
    }
}

/// Purchase resolved to the insumo whose level gets credited
#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub ingredient_id: i32,
    pub insumo_id: i32,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// One insumo decrement inside an all-or-nothing deduction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deduction {
    pub insumo_id: i32,
    pub ingredient_id: i32,
    pub quantity: Decimal,
}

/// Quantity taken from one purchase lot by an applied deduction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotDraw {
    pub lot_id: i64,
    pub quantity: Decimal,
}

/// Everything an applied deduction took, level decrements and lot draws
///
/// Handing it back to `restock` restores both, so the average cost of the
/// ingredient is the same as before the deduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockMovement {
    pub deductions: Vec<Deduction>,
    pub lot_draws: Vec<LotDraw>,
}

impl StockMovement {
    pub fn is_empty(&self) -> bool {
        self.deductions.is_empty()
    }
}

/// Request DTO for POST /api/inventory/purchases
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordPurchaseRequest {
    pub ingredient_id: i32,
    /// Insumo credited; defaults to the ingredient's first insumo
    pub insumo_id: Option<i32>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Request DTO for POST /api/inventory/insumos/{id}/deduct
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeductRequest {
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockResponse {
    pub id: i32,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AverageCostResponse {
    pub ingredient_id: i32,
    pub unit_cost: Decimal,
}
