use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::catalog::{BomLine, CatalogRepository};
use crate::costing::error::CostingError;
use crate::costing::units::{to_ingredient_unit, Conversion, Unit};
use crate::db::StoreError;

/// Ingredient amount needed for a resolved line, in the ingredient's unit
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RequiredIngredient {
    pub ingredient_id: i32,
    pub ingredient_name: String,
    pub insumo_id: i32,
    pub quantity: Decimal,
    pub unit: Unit,
}

/// Entry skipped or approximated during resolution
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BomWarning {
    MissingInsumo { insumo_id: i32 },
    MissingIngredient { insumo_id: i32, ingredient_id: i32 },
    IncompatibleUnit { insumo_id: i32, from: Unit, to: Unit },
    /// Recipe line without a unit read as g/ml because of its magnitude
    LegacyUnitHeuristic { insumo_id: i32, quantity: Decimal, assumed: Unit },
    MissingProduct { product_id: i32 },
    MissingCombo { combo_id: i32 },
}

/// Flat ingredient requirements plus everything that was skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BomResolution {
    pub requirements: Vec<RequiredIngredient>,
    pub warnings: Vec<BomWarning>,
}

impl BomResolution {
    pub fn extend(&mut self, other: BomResolution) {
        self.requirements.extend(other.requirements);
        self.warnings.extend(other.warnings);
    }

    /// Requirements summed per ingredient
    pub fn by_ingredient(&self) -> BTreeMap<i32, (String, Decimal)> {
        let mut totals: BTreeMap<i32, (String, Decimal)> = BTreeMap::new();
        for req in &self.requirements {
            totals
                .entry(req.ingredient_id)
                .or_insert_with(|| (req.ingredient_name.clone(), Decimal::ZERO))
                .1 += req.quantity;
        }
        totals
    }

    /// Requirements summed per insumo, the shape stock deduction works in
    pub fn by_insumo(&self) -> BTreeMap<i32, Decimal> {
        let mut totals: BTreeMap<i32, Decimal> = BTreeMap::new();
        for req in &self.requirements {
            *totals.entry(req.insumo_id).or_default() += req.quantity;
        }
        totals
    }
}

/// Expands products and combos into ingredient requirements
///
/// The costing engine and the stock checker both go through this resolver so
/// unit handling cannot drift between them.
#[derive(Clone)]
pub struct BomResolver {
    catalog: Arc<dyn CatalogRepository>,
}

impl BomResolver {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Resolve `quantity` units of a product
    pub async fn resolve_product(&self, product_id: i32, quantity: Decimal) -> Result<BomResolution, CostingError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or(CostingError::ProductNotFound(product_id))?;

        Ok(self.resolve_lines(&product.insumos, quantity).await?)
    }

    /// Resolve `quantity` units of a combo through its products
    ///
    /// Drinks carry no bill of materials and are skipped. Constituent products
    /// that no longer exist are reported as warnings.
    pub async fn resolve_combo(&self, combo_id: i32, quantity: Decimal) -> Result<BomResolution, CostingError> {
        let combo = self
            .catalog
            .combo(combo_id)
            .await?
            .ok_or(CostingError::ComboNotFound(combo_id))?;

        let mut resolution = BomResolution::default();
        for item in &combo.products {
            let wanted = quantity * Decimal::from(item.quantity);
            match self.resolve_product(item.item_id, wanted).await {
                Ok(part) => resolution.extend(part),
                Err(CostingError::ProductNotFound(product_id)) => {
                    resolution.warnings.push(BomWarning::MissingProduct { product_id })
                }
                Err(other) => return Err(other),
            }
        }
        Ok(resolution)
    }

    /// Resolve raw recipe lines, used for products and simulations alike
    pub async fn resolve_lines(&self, lines: &[BomLine], quantity: Decimal) -> Result<BomResolution, StoreError> {
        let mut resolution = BomResolution::default();

        for line in lines {
            let Some(insumo) = self.catalog.insumo(line.insumo_id).await? else {
                resolution.warnings.push(BomWarning::MissingInsumo {
                    insumo_id: line.insumo_id,
                });
                continue;
            };

            let Some(ingredient) = self.catalog.ingredient(insumo.ingredient_base_id).await? else {
                resolution.warnings.push(BomWarning::MissingIngredient {
                    insumo_id: insumo.id,
                    ingredient_id: insumo.ingredient_base_id,
                });
                continue;
            };

            let total = line.quantity * quantity * insumo.yield_quantity;

            match to_ingredient_unit(line.quantity, total, line.unit, ingredient.unit) {
                Conversion::Converted { quantity, legacy } => {
                    if legacy {
                        tracing::debug!(
                            "Recipe line for insumo {} has no unit, reading {} as sub-unit of {}",
                            insumo.id,
                            line.quantity,
                            ingredient.unit
                        );
                        resolution.warnings.push(BomWarning::LegacyUnitHeuristic {
                            insumo_id: insumo.id,
                            quantity: line.quantity,
                            assumed: sub_unit_name(ingredient.unit),
                        });
                    }
                    resolution.requirements.push(RequiredIngredient {
                        ingredient_id: ingredient.id,
                        ingredient_name: ingredient.name.clone(),
                        insumo_id: insumo.id,
                        quantity,
                        unit: ingredient.unit,
                    });
                }
                Conversion::Incompatible { from, to } => {
                    resolution.warnings.push(BomWarning::IncompatibleUnit {
                        insumo_id: insumo.id,
                        from,
                        to,
                    });
                }
            }
        }

        Ok(resolution)
    }
}

fn sub_unit_name(unit: Unit) -> Unit {
    match unit {
        Unit::Liter => Unit::Milliliter,
        _ => Unit::Gram,
    }
}
