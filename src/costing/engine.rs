use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::catalog::{BomLine, CatalogRepository};
use crate::costing::bom::{BomResolution, BomResolver, BomWarning};
use crate::costing::error::CostingError;
use crate::inventory::InventoryService;

/// Variable-cost share used when none is configured and for simulations (15%)
pub const DEFAULT_VARIABLE_COST_PCT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Half-width of the break-even band, in margin points
pub const BREAK_EVEN_BAND: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Days a monthly fixed cost is spread over
const DAYS_PER_MONTH: Decimal = Decimal::from_parts(30, 0, 0, false, 0);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Real cost of one unit of a product
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CostBreakdown {
    pub ingredient_cost: Decimal,
    pub rated_fixed_cost: Decimal,
    pub rated_variable_cost: Decimal,
    pub total_cost: Decimal,
    pub warnings: Vec<BomWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MarginStatus {
    Lucro,
    Prejuizo,
    Equilibrio,
}

/// Cost, price and margin figures shown on the pricing screen
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductCostReport {
    pub product_id: i32,
    pub name: String,
    pub breakdown: CostBreakdown,
    pub sale_price: Decimal,
    pub suggested_price: Decimal,
    pub margem_atual: Decimal,
    pub margem_sugerida: Decimal,
    pub status: MarginStatus,
}

/// Price that yields `margin_pct` of gross margin over `cost`
///
/// Margin is taken on price, not as markup on cost: cost 7.00 at 30% gives 10.00.
pub fn suggested_price(cost: Decimal, margin_pct: Decimal) -> Result<Decimal, CostingError> {
    if margin_pct < Decimal::ZERO || margin_pct >= HUNDRED {
        return Err(CostingError::InvalidMargin(margin_pct));
    }
    Ok(cost / (Decimal::ONE - margin_pct / HUNDRED))
}

/// Gross margin of `sale_price` over `cost`, in percent; zero for free items
pub fn current_margin(sale_price: Decimal, cost: Decimal) -> Decimal {
    if sale_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (sale_price - cost) / sale_price * HUNDRED
}

/// Classify a margin with a dead band of +/- 5 points around zero
pub fn classify(margin_pct: Decimal) -> MarginStatus {
    if margin_pct > BREAK_EVEN_BAND {
        MarginStatus::Lucro
    } else if margin_pct < -BREAK_EVEN_BAND {
        MarginStatus::Prejuizo
    } else {
        MarginStatus::Equilibrio
    }
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Combines bill of materials, inventory valuation and overheads
pub struct CostingEngine {
    catalog: Arc<dyn CatalogRepository>,
    inventory: Arc<InventoryService>,
    bom: BomResolver,
}

impl CostingEngine {
    pub fn new(catalog: Arc<dyn CatalogRepository>, inventory: Arc<InventoryService>) -> Self {
        let bom = BomResolver::new(catalog.clone());
        Self { catalog, inventory, bom }
    }

    /// Cost of one unit of a stored product
    pub async fn compute_cost(&self, product_id: i32) -> Result<CostBreakdown, CostingError> {
        let resolution = self.bom.resolve_product(product_id, Decimal::ONE).await?;
        let ingredient_cost = self.ingredient_cost(&resolution).await?;
        let variable_pct = self.variable_cost_pct().await?;
        let rated_fixed_cost = self.rated_fixed_cost().await?;

        Ok(Self::breakdown(ingredient_cost, rated_fixed_cost, variable_pct, resolution.warnings))
    }

    /// Cost of an ad-hoc recipe, with the flat variable-cost share
    pub async fn simulate_cost(&self, lines: &[BomLine]) -> Result<CostBreakdown, CostingError> {
        let resolution = self.bom.resolve_lines(lines, Decimal::ONE).await?;
        let ingredient_cost = self.ingredient_cost(&resolution).await?;
        let rated_fixed_cost = self.rated_fixed_cost().await?;

        Ok(Self::breakdown(
            ingredient_cost,
            rated_fixed_cost,
            DEFAULT_VARIABLE_COST_PCT,
            resolution.warnings,
        ))
    }

    /// Full pricing report at `target_margin`
    pub async fn product_report(
        &self,
        product_id: i32,
        target_margin: Decimal,
    ) -> Result<ProductCostReport, CostingError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or(CostingError::ProductNotFound(product_id))?;

        let breakdown = self.compute_cost(product_id).await?;
        let suggested = money(suggested_price(breakdown.total_cost, target_margin)?);
        let margem_atual = money(current_margin(product.sale_price, breakdown.total_cost));

        Ok(ProductCostReport {
            product_id,
            name: product.name,
            sale_price: product.sale_price,
            suggested_price: suggested,
            margem_atual,
            margem_sugerida: target_margin,
            status: classify(margem_atual),
            breakdown,
        })
    }

    /// Store the recomputed cmv and current margin on the product
    pub async fn refresh_product_pricing(
        &self,
        product_id: i32,
        target_margin: Decimal,
    ) -> Result<ProductCostReport, CostingError> {
        let report = self.product_report(product_id, target_margin).await?;

        let updated = self
            .catalog
            .update_product_pricing(product_id, report.breakdown.total_cost, report.margem_atual)
            .await?;
        if !updated {
            return Err(CostingError::ProductNotFound(product_id));
        }

        tracing::info!(
            "Refreshed pricing of product {}: cmv {} margin {}%",
            product_id,
            report.breakdown.total_cost,
            report.margem_atual
        );
        Ok(report)
    }

    async fn ingredient_cost(&self, resolution: &BomResolution) -> Result<Decimal, CostingError> {
        let mut averages: HashMap<i32, Decimal> = HashMap::new();
        let mut total = Decimal::ZERO;

        for req in &resolution.requirements {
            let unit_cost = match averages.get(&req.ingredient_id) {
                Some(cost) => *cost,
                None => {
                    let cost = self.inventory.weighted_average_unit_cost(req.ingredient_id).await?;
                    averages.insert(req.ingredient_id, cost);
                    cost
                }
            };
            total += req.quantity * unit_cost;
        }

        Ok(total)
    }

    async fn rated_fixed_cost(&self) -> Result<Decimal, CostingError> {
        let monthly: Decimal = self.catalog.fixed_costs().await?.iter().map(|c| c.monthly_amount).sum();
        let active = self.catalog.active_product_count().await?;

        if active <= 0 {
            return Ok(Decimal::ZERO);
        }
        Ok(monthly / Decimal::from(active) / DAYS_PER_MONTH)
    }

    async fn variable_cost_pct(&self) -> Result<Decimal, CostingError> {
        let costs = self.catalog.variable_costs().await?;
        if costs.is_empty() {
            return Ok(DEFAULT_VARIABLE_COST_PCT);
        }
        Ok(costs.iter().map(|c| c.percentage).sum())
    }

    fn breakdown(
        ingredient_cost: Decimal,
        rated_fixed_cost: Decimal,
        variable_pct: Decimal,
        warnings: Vec<BomWarning>,
    ) -> CostBreakdown {
        let ingredient_cost = money(ingredient_cost);
        let rated_fixed_cost = money(rated_fixed_cost);
        let rated_variable_cost = money(ingredient_cost * variable_pct / HUNDRED);

        CostBreakdown {
            ingredient_cost,
            rated_fixed_cost,
            rated_variable_cost,
            total_cost: ingredient_cost + rated_fixed_cost + rated_variable_cost,
            warnings,
        }
    }
}
