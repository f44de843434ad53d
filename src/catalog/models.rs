use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::costing::Unit;

/// Category name that scopes add-ons and customizations to combos
pub const COMBO_CATEGORY: &str = "Combos";

/// Raw material purchased from suppliers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngredientBase {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub unit: Unit,
    /// Nominal price per `unit`, used when no purchase lot exists
    pub nominal_price: Decimal,
    pub supplier: Option<String>,
}

/// Usage unit derived from an IngredientBase through a yield factor
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Insumo {
    pub id: i32,
    pub name: String,
    pub ingredient_base_id: i32,
    /// Ingredient amount consumed per insumo unit
    pub yield_quantity: Decimal,
    pub unit: Unit,
    pub category: String,
    pub unit_price: Decimal,
}

/// One line of a product's bill of materials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BomLine {
    pub insumo_id: i32,
    pub quantity: Decimal,
    /// Unit the quantity is written in; absent on legacy recipes
    #[serde(default)]
    pub unit: Option<Unit>,
}

/// Sellable item with a bill of materials
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: Option<String>,
    pub insumos: Vec<BomLine>,
    /// Derived cost, stored for display
    pub cmv: Decimal,
    pub sale_price: Decimal,
    pub margin_pct: Decimal,
    pub marketplace_price: Option<Decimal>,
    pub active: bool,
}

/// Drink, a leaf item with direct cost and price
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bebida {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub cost: Decimal,
    pub sale_price: Decimal,
    pub image: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ComboItem {
    pub item_id: i32,
    pub quantity: i32,
}

/// Discounted bundle of products and drinks
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Combo {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub products: Vec<ComboItem>,
    pub drinks: Vec<ComboItem>,
    pub discount_pct: Decimal,
    pub final_price: Decimal,
    pub marketplace_price: Option<Decimal>,
    pub adicional_ids: Vec<i32>,
    pub personalizacao_ids: Vec<i32>,
    pub active: bool,
}

/// Paid extra
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Adicional {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub insumo_id: Option<i32>,
    pub categories: Vec<String>,
}

impl Adicional {
    pub fn applies_to(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationKind {
    Remove,
    Substitute,
}

/// Free modification (remove / substitute)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Personalizacao {
    pub id: i32,
    pub name: String,
    pub kind: CustomizationKind,
    pub categories: Vec<String>,
}

impl Personalizacao {
    pub fn applies_to(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FixedCost {
    pub id: i32,
    pub name: String,
    pub monthly_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct VariableCost {
    pub id: i32,
    pub name: String,
    /// Percentage of ingredient cost (15 = 15%)
    pub percentage: Decimal,
}

// ============================================================================
// Database rows
// ============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct IngredientRow {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub nominal_price: Decimal,
    pub supplier: Option<String>,
}

impl TryFrom<IngredientRow> for IngredientBase {
    type Error = String;

    fn try_from(row: IngredientRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            category: row.category,
            unit: row.unit.parse()?,
            nominal_price: row.nominal_price,
            supplier: row.supplier,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct InsumoRow {
    pub id: i32,
    pub name: String,
    pub ingredient_base_id: i32,
    pub yield_quantity: Decimal,
    pub unit: String,
    pub category: String,
    pub unit_price: Decimal,
}

impl TryFrom<InsumoRow> for Insumo {
    type Error = String;

    fn try_from(row: InsumoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            ingredient_base_id: row.ingredient_base_id,
            yield_quantity: row.yield_quantity,
            unit: row.unit.parse()?,
            category: row.category,
            unit_price: row.unit_price,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: Option<String>,
    pub insumos: Json<Vec<BomLine>>,
    pub cmv: Decimal,
    pub sale_price: Decimal,
    pub margin_pct: Decimal,
    pub marketplace_price: Option<Decimal>,
    pub active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            description: row.description,
            image: row.image,
            insumos: row.insumos.0,
            cmv: row.cmv,
            sale_price: row.sale_price,
            margin_pct: row.margin_pct,
            marketplace_price: row.marketplace_price,
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ComboRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub products: Json<Vec<ComboItem>>,
    pub drinks: Json<Vec<ComboItem>>,
    pub discount_pct: Decimal,
    pub final_price: Decimal,
    pub marketplace_price: Option<Decimal>,
    pub adicional_ids: Vec<i32>,
    pub personalizacao_ids: Vec<i32>,
    pub active: bool,
}

impl From<ComboRow> for Combo {
    fn from(row: ComboRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            image: row.image,
            products: row.products.0,
            drinks: row.drinks.0,
            discount_pct: row.discount_pct,
            final_price: row.final_price,
            marketplace_price: row.marketplace_price,
            adicional_ids: row.adicional_ids,
            personalizacao_ids: row.personalizacao_ids,
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AdicionalRow {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub insumo_id: Option<i32>,
    pub categories: Vec<String>,
}

impl From<AdicionalRow> for Adicional {
    fn from(row: AdicionalRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            insumo_id: row.insumo_id,
            categories: row.categories,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PersonalizacaoRow {
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub categories: Vec<String>,
}

impl TryFrom<PersonalizacaoRow> for Personalizacao {
    type Error = String;

    fn try_from(row: PersonalizacaoRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "remove" => CustomizationKind::Remove,
            "substitute" => CustomizationKind::Substitute,
            other => return Err(format!("Invalid customization kind: {}", other)),
        };
        Ok(Self {
            id: row.id,
            name: row.name,
            kind,
            categories: row.categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bom_line_unit_optional() {
        let line: BomLine = serde_json::from_str(r#"{"insumo_id": 3, "quantity": "0.1"}"#).unwrap();
        assert_eq!(line.unit, None);
        assert_eq!(line.quantity, dec!(0.1));

        let line: BomLine =
            serde_json::from_str(r#"{"insumo_id": 3, "quantity": 150, "unit": "g"}"#).unwrap();
        assert_eq!(line.unit, Some(Unit::Gram));
    }

    #[test]
    fn test_adicional_category_scope_case_insensitive() {
        let bacon = Adicional {
            id: 1,
            name: "Bacon".into(),
            price: dec!(4),
            insumo_id: None,
            categories: vec!["Lanches".into(), COMBO_CATEGORY.into()],
        };
        assert!(bacon.applies_to("lanches"));
        assert!(bacon.applies_to("Combos"));
        assert!(!bacon.applies_to("Bebidas"));
    }

    #[test]
    fn test_personalizacao_row_rejects_unknown_kind() {
        let row = PersonalizacaoRow {
            id: 1,
            name: "Sem cebola".into(),
            kind: "add".into(),
            categories: vec![],
        };
        assert!(Personalizacao::try_from(row).is_err());
    }
}
