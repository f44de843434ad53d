use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::costing::bom::{BomResolution, BomResolver, BomWarning};
use crate::costing::error::CostingError;
use crate::inventory::InventoryService;

/// What an order line refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LineItemRef {
    Product(i32),
    Drink(i32),
    Combo(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StockCheckLine {
    pub name: String,
    pub item: LineItemRef,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct IngredientShortage {
    pub ingredient_id: i32,
    pub ingredient_name: String,
    pub required: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LineShortage {
    pub line_item_name: String,
    pub shortages: Vec<IngredientShortage>,
}

/// Shortages per line; empty `lines` means the order can be produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct StockReport {
    pub lines: Vec<LineShortage>,
    pub warnings: Vec<BomWarning>,
}

impl StockReport {
    pub fn is_satisfiable(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Read-only check of order lines against ingredient stock
///
/// Each line is compared on its own against the current stock. Combos are
/// expanded through their products; drinks are never checked.
pub struct StockSufficiencyChecker {
    bom: BomResolver,
    inventory: Arc<InventoryService>,
}

impl StockSufficiencyChecker {
    pub fn new(bom: BomResolver, inventory: Arc<InventoryService>) -> Self {
        Self { bom, inventory }
    }

    pub async fn check(&self, lines: &[StockCheckLine]) -> Result<StockReport, CostingError> {
        let mut report = StockReport::default();
        let mut stock_cache: HashMap<i32, Decimal> = HashMap::new();

        for line in lines {
            let Some(resolution) = self.resolve(line, &mut report.warnings).await? else {
                continue;
            };
            report.warnings.extend(resolution.warnings.iter().cloned());

            let shortages = self.shortages(&resolution, &mut stock_cache).await?;
            if !shortages.is_empty() {
                report.lines.push(LineShortage {
                    line_item_name: line.name.clone(),
                    shortages,
                });
            }
        }

        if !report.is_satisfiable() {
            tracing::debug!("Stock check found shortages on {} line(s)", report.lines.len());
        }
        Ok(report)
    }

    /// Every line summed into one requirement set, reported under `name`
    ///
    /// Catches orders whose lines each fit the stock but not together.
    pub async fn check_combined(&self, name: &str, lines: &[StockCheckLine]) -> Result<StockReport, CostingError> {
        let mut report = StockReport::default();
        let mut combined = BomResolution::default();

        for line in lines {
            if let Some(resolution) = self.resolve(line, &mut report.warnings).await? {
                combined.extend(resolution);
            }
        }
        report.warnings.extend(combined.warnings.iter().cloned());

        let shortages = self.shortages(&combined, &mut HashMap::new()).await?;
        if !shortages.is_empty() {
            report.lines.push(LineShortage {
                line_item_name: name.to_string(),
                shortages,
            });
        }
        Ok(report)
    }

    async fn shortages(
        &self,
        resolution: &BomResolution,
        stock_cache: &mut HashMap<i32, Decimal>,
    ) -> Result<Vec<IngredientShortage>, CostingError> {
        let mut shortages = Vec::new();
        for (ingredient_id, (ingredient_name, required)) in resolution.by_ingredient() {
            let available = match stock_cache.get(&ingredient_id) {
                Some(stock) => *stock,
                None => {
                    let stock = self.inventory.current_stock_ingredient(ingredient_id).await?;
                    stock_cache.insert(ingredient_id, stock);
                    stock
                }
            };

            if required > available {
                shortages.push(IngredientShortage {
                    ingredient_id,
                    ingredient_name,
                    required,
                    available,
                });
            }
        }
        Ok(shortages)
    }

    /// Resolve one line; `None` for drinks and vanished catalog items
    pub async fn resolve(
        &self,
        line: &StockCheckLine,
        warnings: &mut Vec<BomWarning>,
    ) -> Result<Option<BomResolution>, CostingError> {
        let quantity = Decimal::from(line.quantity);
        let result = match line.item {
            LineItemRef::Drink(_) => return Ok(None),
            LineItemRef::Product(id) => self.bom.resolve_product(id, quantity).await,
            LineItemRef::Combo(id) => self.bom.resolve_combo(id, quantity).await,
        };

        match result {
            Ok(resolution) => Ok(Some(resolution)),
            Err(CostingError::ProductNotFound(product_id)) => {
                warnings.push(BomWarning::MissingProduct { product_id });
                Ok(None)
            }
            Err(CostingError::ComboNotFound(combo_id)) => {
                warnings.push(BomWarning::MissingCombo { combo_id });
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}
