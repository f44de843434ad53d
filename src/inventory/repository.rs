use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::StoreError;
use crate::inventory::models::{
    Deduction, InventoryLevel, LotDraw, NewPurchase, PurchaseLot, StockMovement, DEFAULT_MIN_THRESHOLD,
};
use crate::inventory::valuation::consume_fifo;

/// Persistence of purchase lots and insumo stock levels
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Lots of an ingredient, oldest first
    async fn lots_for(&self, ingredient_id: i32) -> Result<Vec<PurchaseLot>, StoreError>;

    async fn level(&self, insumo_id: i32) -> Result<Option<InventoryLevel>, StoreError>;

    async fn levels(&self) -> Result<Vec<InventoryLevel>, StoreError>;

    /// Append a lot and credit the insumo level in one transaction
    async fn record_purchase(&self, purchase: &NewPurchase) -> Result<PurchaseLot, StoreError>;

    /// Apply every deduction or none of them
    ///
    /// Returns `None`, leaving all levels untouched, when any insumo holds
    /// less than requested. Applied deductions also consume lots FIFO; lots
    /// without remaining tracking count their purchased quantity.
    async fn try_deduct_many(&self, deductions: &[Deduction]) -> Result<Option<StockMovement>, StoreError>;

    /// Undo an applied movement: credit the levels and refill the lots it drew from
    async fn restock(&self, movement: &StockMovement) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn lots_for(&self, ingredient_id: i32) -> Result<Vec<PurchaseLot>, StoreError> {
        let lots = sqlx::query_as::<_, PurchaseLot>(
            r#"
            SELECT id, ingredient_id, quantity, unit_price, remaining, purchased_at
            FROM purchase_lots
            WHERE ingredient_id = $1
            ORDER BY purchased_at, id
            "#,
        )
        .bind(ingredient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    async fn level(&self, insumo_id: i32) -> Result<Option<InventoryLevel>, StoreError> {
        let level = sqlx::query_as::<_, InventoryLevel>(
            "SELECT insumo_id, quantity, min_threshold, updated_at FROM inventory_levels WHERE insumo_id = $1",
        )
        .bind(insumo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level)
    }

    async fn levels(&self) -> Result<Vec<InventoryLevel>, StoreError> {
        let levels = sqlx::query_as::<_, InventoryLevel>(
            "SELECT insumo_id, quantity, min_threshold, updated_at FROM inventory_levels ORDER BY insumo_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    async fn record_purchase(&self, purchase: &NewPurchase) -> Result<PurchaseLot, StoreError> {
        let mut tx = self.pool.begin().await?;

        let lot = sqlx::query_as::<_, PurchaseLot>(
            r#"
            INSERT INTO purchase_lots (ingredient_id, quantity, unit_price, remaining)
            VALUES ($1, $2, $3, $2)
            RETURNING id, ingredient_id, quantity, unit_price, remaining, purchased_at
            "#,
        )
        .bind(purchase.ingredient_id)
        .bind(purchase.quantity)
        .bind(purchase.unit_price)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_levels (insumo_id, quantity, min_threshold)
            VALUES ($1, $2, $3)
            ON CONFLICT (insumo_id)
            DO UPDATE SET quantity = inventory_levels.quantity + EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(purchase.insumo_id)
        .bind(purchase.quantity)
        .bind(DEFAULT_MIN_THRESHOLD)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(lot)
    }

    async fn try_deduct_many(&self, deductions: &[Deduction]) -> Result<Option<StockMovement>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut lot_draws = Vec::new();

        for deduction in deductions {
            // Floor check and decrement in one statement
            let result = sqlx::query(
                r#"
                UPDATE inventory_levels
                SET quantity = quantity - $2, updated_at = NOW()
                WHERE insumo_id = $1 AND quantity >= $2
                "#,
            )
            .bind(deduction.insumo_id)
            .bind(deduction.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                tracing::debug!(
                    "Deduction refused for insumo {}: less than {} in stock",
                    deduction.insumo_id,
                    deduction.quantity
                );
                return Ok(None);
            }

            let lots = sqlx::query_as::<_, PurchaseLot>(
                r#"
                SELECT id, ingredient_id, quantity, unit_price, remaining, purchased_at
                FROM purchase_lots
                WHERE ingredient_id = $1 AND COALESCE(remaining, quantity) > 0
                ORDER BY purchased_at, id
                FOR UPDATE
                "#,
            )
            .bind(deduction.ingredient_id)
            .fetch_all(&mut *tx)
            .await?;

            for (lot_id, taken) in consume_fifo(&lots, deduction.quantity) {
                sqlx::query("UPDATE purchase_lots SET remaining = COALESCE(remaining, quantity) - $2 WHERE id = $1")
                    .bind(lot_id)
                    .bind(taken)
                    .execute(&mut *tx)
                    .await?;
                lot_draws.push(LotDraw { lot_id, quantity: taken });
            }
        }

        tx.commit().await?;
        Ok(Some(StockMovement {
            deductions: deductions.to_vec(),
            lot_draws,
        }))
    }

    async fn restock(&self, movement: &StockMovement) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for deduction in &movement.deductions {
            sqlx::query(
                r#"
                INSERT INTO inventory_levels (insumo_id, quantity, min_threshold)
                VALUES ($1, $2, $3)
                ON CONFLICT (insumo_id)
                DO UPDATE SET quantity = inventory_levels.quantity + EXCLUDED.quantity, updated_at = NOW()
                "#,
            )
            .bind(deduction.insumo_id)
            .bind(deduction.quantity)
            .bind(DEFAULT_MIN_THRESHOLD)
            .execute(&mut *tx)
            .await?;
        }

        for draw in &movement.lot_draws {
            sqlx::query("UPDATE purchase_lots SET remaining = LEAST(quantity, COALESCE(remaining, 0) + $2) WHERE id = $1")
                .bind(draw.lot_id)
                .bind(draw.quantity)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
