use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::CatalogRepository;
use crate::inventory::error::InventoryError;
use crate::inventory::models::{
    Deduction, InventoryLevel, NewPurchase, PurchaseLot, RecordPurchaseRequest, StockMovement,
};
use crate::inventory::repository::InventoryStore;
use crate::inventory::valuation::weighted_average;

/// Inventory valuation and stock movements
pub struct InventoryService {
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<dyn InventoryStore>,
}

impl InventoryService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, store: Arc<dyn InventoryStore>) -> Self {
        Self { catalog, store }
    }

    /// Weighted-average price per ingredient unit
    ///
    /// Falls back to the ingredient's nominal price when no lot was ever recorded.
    pub async fn weighted_average_unit_cost(&self, ingredient_id: i32) -> Result<Decimal, InventoryError> {
        let ingredient = self
            .catalog
            .ingredient(ingredient_id)
            .await?
            .ok_or(InventoryError::IngredientNotFound(ingredient_id))?;

        let lots = self.store.lots_for(ingredient_id).await?;
        Ok(weighted_average(&lots).unwrap_or(ingredient.nominal_price))
    }

    /// Stock of one insumo, zero when it was never stocked
    pub async fn current_stock_insumo(&self, insumo_id: i32) -> Result<Decimal, InventoryError> {
        let level = self.store.level(insumo_id).await?;
        Ok(level.map(|l| l.quantity).unwrap_or(Decimal::ZERO))
    }

    /// Stock of an ingredient summed over every insumo derived from it
    pub async fn current_stock_ingredient(&self, ingredient_id: i32) -> Result<Decimal, InventoryError> {
        let insumos = self.catalog.insumos_for_ingredient(ingredient_id).await?;

        let mut total = Decimal::ZERO;
        for insumo in insumos {
            total += self.current_stock_insumo(insumo.id).await?;
        }
        Ok(total)
    }

    /// Record a purchase lot and credit the matching insumo level
    pub async fn record_purchase(&self, request: RecordPurchaseRequest) -> Result<PurchaseLot, InventoryError> {
        if request.quantity <= Decimal::ZERO {
            return Err(InventoryError::InvalidQuantity(format!(
                "Purchase quantity must be positive, got {}",
                request.quantity
            )));
        }
        if request.unit_price < Decimal::ZERO {
            return Err(InventoryError::InvalidPrice(request.unit_price));
        }

        self.catalog
            .ingredient(request.ingredient_id)
            .await?
            .ok_or(InventoryError::IngredientNotFound(request.ingredient_id))?;

        let insumo_id = match request.insumo_id {
            Some(insumo_id) => {
                let insumo = self
                    .catalog
                    .insumo(insumo_id)
                    .await?
                    .ok_or(InventoryError::InsumoNotFound(insumo_id))?;
                if insumo.ingredient_base_id != request.ingredient_id {
                    return Err(InventoryError::InsumoMismatch {
                        insumo_id,
                        ingredient_id: request.ingredient_id,
                    });
                }
                insumo_id
            }
            None => self
                .catalog
                .insumos_for_ingredient(request.ingredient_id)
                .await?
                .first()
                .map(|insumo| insumo.id)
                .ok_or(InventoryError::NoInsumo(request.ingredient_id))?,
        };

        let lot = self
            .store
            .record_purchase(&NewPurchase {
                ingredient_id: request.ingredient_id,
                insumo_id,
                quantity: request.quantity,
                unit_price: request.unit_price,
            })
            .await?;

        tracing::info!(
            "Recorded purchase of {} for ingredient {} at {} (insumo {})",
            request.quantity,
            request.ingredient_id,
            request.unit_price,
            insumo_id
        );
        Ok(lot)
    }

    /// Deduct one insumo; `false` means refused with stock unchanged
    pub async fn deduct(&self, insumo_id: i32, quantity: Decimal) -> Result<bool, InventoryError> {
        self.deduct_many(&[(insumo_id, quantity)]).await
    }

    /// Deduct several insumos all-or-nothing
    ///
    /// Repeated insumo ids are merged before the floor check.
    pub async fn deduct_many(&self, items: &[(i32, Decimal)]) -> Result<bool, InventoryError> {
        let merged = merge_positive(items)?;

        let mut deductions = Vec::with_capacity(merged.len());
        for (insumo_id, quantity) in merged {
            let ingredient_id = self.ingredient_of(insumo_id).await?;
            deductions.push(Deduction {
                insumo_id,
                ingredient_id,
                quantity,
            });
        }

        let applied = self.apply(&deductions).await?;
        if applied.is_none() {
            tracing::warn!("Stock deduction refused for insumos {:?}", items);
        }
        Ok(applied.is_some())
    }

    /// Take what an order consumes, measured per ingredient
    ///
    /// Each insumo is drawn from its own level first; what it lacks comes from
    /// the other insumos of the same ingredient, lowest id first. This is the
    /// same stock `current_stock_ingredient` reports, so an order the stock
    /// check accepts is never refused here. `None` means refused with every
    /// level untouched.
    pub async fn fulfil(&self, items: &[(i32, Decimal)]) -> Result<Option<StockMovement>, InventoryError> {
        let merged = merge_positive(items)?;

        let mut by_ingredient: BTreeMap<i32, Vec<(i32, Decimal)>> = BTreeMap::new();
        for (insumo_id, quantity) in merged {
            let ingredient_id = self.ingredient_of(insumo_id).await?;
            by_ingredient.entry(ingredient_id).or_default().push((insumo_id, quantity));
        }

        let mut deductions = Vec::new();
        for (ingredient_id, wanted) in by_ingredient {
            let mut available: BTreeMap<i32, Decimal> = BTreeMap::new();
            for insumo in self.catalog.insumos_for_ingredient(ingredient_id).await? {
                available.insert(insumo.id, self.current_stock_insumo(insumo.id).await?);
            }
            for (insumo_id, _) in &wanted {
                if !available.contains_key(insumo_id) {
                    available.insert(*insumo_id, self.current_stock_insumo(*insumo_id).await?);
                }
            }

            let mut taken: BTreeMap<i32, Decimal> = BTreeMap::new();
            let mut shortfall = Decimal::ZERO;
            for (insumo_id, quantity) in &wanted {
                let left = available.entry(*insumo_id).or_default();
                let take = (*left).min(*quantity).max(Decimal::ZERO);
                *left -= take;
                *taken.entry(*insumo_id).or_default() += take;
                shortfall += *quantity - take;
            }
            for (insumo_id, left) in available.iter_mut() {
                if shortfall <= Decimal::ZERO {
                    break;
                }
                let take = (*left).min(shortfall);
                if take > Decimal::ZERO {
                    *left -= take;
                    *taken.entry(*insumo_id).or_default() += take;
                    shortfall -= take;
                }
            }

            if shortfall > Decimal::ZERO {
                tracing::debug!("Ingredient {} is {} short for this fulfillment", ingredient_id, shortfall);
                return Ok(None);
            }

            deductions.extend(
                taken
                    .into_iter()
                    .filter(|(_, quantity)| *quantity > Decimal::ZERO)
                    .map(|(insumo_id, quantity)| Deduction {
                        insumo_id,
                        ingredient_id,
                        quantity,
                    }),
            );
        }

        self.apply(&deductions).await
    }

    /// Put back everything a movement took, used to compensate a refused fulfillment
    pub async fn restock(&self, movement: &StockMovement) -> Result<(), InventoryError> {
        if movement.is_empty() {
            return Ok(());
        }
        self.store.restock(movement).await?;
        tracing::info!("Returned stock for {} insumo(s)", movement.deductions.len());
        Ok(())
    }

    async fn apply(&self, deductions: &[Deduction]) -> Result<Option<StockMovement>, InventoryError> {
        if deductions.is_empty() {
            return Ok(Some(StockMovement::default()));
        }

        let applied = self.store.try_deduct_many(deductions).await?;
        if applied.is_some() {
            tracing::info!("Deducted stock for {} insumo(s)", deductions.len());
        }
        Ok(applied)
    }

    async fn ingredient_of(&self, insumo_id: i32) -> Result<i32, InventoryError> {
        let insumo = self
            .catalog
            .insumo(insumo_id)
            .await?
            .ok_or(InventoryError::InsumoNotFound(insumo_id))?;
        Ok(insumo.ingredient_base_id)
    }

    /// Levels at or below their minimum threshold
    pub async fn low_stock(&self) -> Result<Vec<InventoryLevel>, InventoryError> {
        let levels = self.store.levels().await?;
        Ok(levels.into_iter().filter(InventoryLevel::is_low).collect())
    }
}

/// Merge repeated insumo ids, rejecting non-positive quantities
fn merge_positive(items: &[(i32, Decimal)]) -> Result<BTreeMap<i32, Decimal>, InventoryError> {
    let mut merged: BTreeMap<i32, Decimal> = BTreeMap::new();
    for (insumo_id, quantity) in items {
        if *quantity <= Decimal::ZERO {
            return Err(InventoryError::InvalidQuantity(format!(
                "Deduction must be positive, got {} for insumo {}",
                quantity, insumo_id
            )));
        }
        *merged.entry(*insumo_id).or_default() += *quantity;
    }
    Ok(merged)
}
