use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Recipe quantities below this value, written without a unit against a kg/L
/// ingredient, are read as g/ml by the legacy heuristic.
pub const LEGACY_SUBUNIT_THRESHOLD: Decimal = Decimal::TEN;

const THOUSAND: Decimal = Decimal::ONE_THOUSAND;

/// Unit of measure for ingredients, insumos and recipe lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "L", alias = "l")]
    Liter,
    #[serde(rename = "unit", alias = "un")]
    Piece,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "L",
            Unit::Piece => "unit",
        }
    }

    /// Sub-unit used by the legacy heuristic (kg -> g, L -> ml)
    fn sub_unit(&self) -> Option<Unit> {
        match self {
            Unit::Kilogram => Some(Unit::Gram),
            Unit::Liter => Some(Unit::Milliliter),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "g" => Ok(Unit::Gram),
            "kg" => Ok(Unit::Kilogram),
            "ml" => Ok(Unit::Milliliter),
            "L" | "l" => Ok(Unit::Liter),
            "unit" | "un" | "unidade" => Ok(Unit::Piece),
            other => Err(format!("Invalid unit: {}", other)),
        }
    }
}

/// Outcome of expressing a recipe amount in the ingredient's unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Quantity in the ingredient unit; `legacy` is set when the unit was inferred
    Converted { quantity: Decimal, legacy: bool },
    /// The recipe unit cannot be expressed in the ingredient unit (e.g. ml of a kg item)
    Incompatible { from: Unit, to: Unit },
}

/// Convert `quantity` written in `from` into `to`
pub fn convert(quantity: Decimal, from: Unit, to: Unit) -> Option<Decimal> {
    match (from, to) {
        (a, b) if a == b => Some(quantity),
        (Unit::Gram, Unit::Kilogram) | (Unit::Milliliter, Unit::Liter) => Some(quantity / THOUSAND),
        (Unit::Kilogram, Unit::Gram) | (Unit::Liter, Unit::Milliliter) => Some(quantity * THOUSAND),
        _ => None,
    }
}

/// Express a recipe amount in the ingredient's unit
///
/// `per_unit_quantity` is the amount written on the recipe line (used for the
/// legacy magnitude check), `total` is that amount already scaled by the
/// ordered quantity and the insumo yield.
pub fn to_ingredient_unit(
    per_unit_quantity: Decimal,
    total: Decimal,
    line_unit: Option<Unit>,
    ingredient_unit: Unit,
) -> Conversion {
    match line_unit {
        // Portions of the insumo; the yield already maps them to the ingredient unit
        Some(Unit::Piece) => Conversion::Converted { quantity: total, legacy: false },
        Some(from) => match convert(total, from, ingredient_unit) {
            Some(quantity) => Conversion::Converted { quantity, legacy: false },
            None => Conversion::Incompatible { from, to: ingredient_unit },
        },
        None => match ingredient_unit.sub_unit() {
            Some(sub) if per_unit_quantity < LEGACY_SUBUNIT_THRESHOLD => {
                let quantity = convert(total, sub, ingredient_unit).unwrap_or(total);
                Conversion::Converted { quantity, legacy: true }
            }
            _ => Conversion::Converted { quantity: total, legacy: false },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_gram_to_kilogram() {
        assert_eq!(convert(dec!(150), Unit::Gram, Unit::Kilogram), Some(dec!(0.15)));
        assert_eq!(convert(dec!(0.5), Unit::Liter, Unit::Milliliter), Some(dec!(500)));
    }

    #[test]
    fn test_incompatible_units() {
        assert_eq!(convert(dec!(1), Unit::Milliliter, Unit::Kilogram), None);
        assert_eq!(
            to_ingredient_unit(dec!(1), dec!(1), Some(Unit::Milliliter), Unit::Kilogram),
            Conversion::Incompatible { from: Unit::Milliliter, to: Unit::Kilogram }
        );
    }

    #[test]
    fn test_portion_lines_keep_yielded_quantity() {
        // 2 patties at 0.15 kg each
        assert_eq!(
            to_ingredient_unit(dec!(2), dec!(0.30), Some(Unit::Piece), Unit::Kilogram),
            Conversion::Converted { quantity: dec!(0.30), legacy: false }
        );
    }

    #[test]
    fn test_explicit_unit_never_uses_heuristic() {
        assert_eq!(
            to_ingredient_unit(dec!(0.1), dec!(0.3), Some(Unit::Kilogram), Unit::Kilogram),
            Conversion::Converted { quantity: dec!(0.3), legacy: false }
        );
    }

    #[test]
    fn test_legacy_heuristic_small_values_read_as_grams() {
        assert_eq!(
            to_ingredient_unit(dec!(5), dec!(10), None, Unit::Kilogram),
            Conversion::Converted { quantity: dec!(0.01), legacy: true }
        );
    }

    #[test]
    fn test_legacy_heuristic_ignored_for_large_values_and_pieces() {
        assert_eq!(
            to_ingredient_unit(dec!(12), dec!(12), None, Unit::Kilogram),
            Conversion::Converted { quantity: dec!(12), legacy: false }
        );
        assert_eq!(
            to_ingredient_unit(dec!(2), dec!(2), None, Unit::Piece),
            Conversion::Converted { quantity: dec!(2), legacy: false }
        );
    }

    #[test]
    fn test_unit_serde_names() {
        assert_eq!(serde_json::to_string(&Unit::Liter).unwrap(), "\"L\"");
        let unit: Unit = serde_json::from_str("\"l\"").unwrap();
        assert_eq!(unit, Unit::Liter);
        assert_eq!("kg".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert!("lb".parse::<Unit>().is_err());
    }
}
