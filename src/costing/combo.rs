use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::catalog::CatalogRepository;
use crate::costing::error::CostingError;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Marketplace channel settings (iFood-style delivery apps)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarketplaceConfig {
    pub delivery_fee: Decimal,
    /// Commission the marketplace keeps, in percent of the listed price
    pub commission_pct: Decimal,
    pub coupon: Decimal,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            delivery_fee: Decimal::ZERO,
            commission_pct: Decimal::ZERO,
            coupon: Decimal::ZERO,
        }
    }
}

/// Bundle price after discount, rounded to cents
pub fn combo_price(raw_total: Decimal, discount_pct: Decimal) -> Result<Decimal, CostingError> {
    if discount_pct < Decimal::ZERO || discount_pct > HUNDRED {
        return Err(CostingError::InvalidDiscount(discount_pct));
    }
    Ok(round_cents(raw_total * (Decimal::ONE - discount_pct / HUNDRED)))
}

/// Listed marketplace price that still nets `final_price` after commission
pub fn marketplace_price(final_price: Decimal, config: &MarketplaceConfig) -> Result<Decimal, CostingError> {
    if config.commission_pct < Decimal::ZERO || config.commission_pct >= HUNDRED {
        return Err(CostingError::InvalidCommission(config.commission_pct));
    }
    let net = final_price + config.delivery_fee - config.coupon;
    Ok(round_cents(net / (Decimal::ONE - config.commission_pct / HUNDRED)))
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MissingComboItem {
    Product(i32),
    Drink(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ComboQuote {
    pub combo_id: i32,
    pub name: String,
    pub raw_total: Decimal,
    pub discount_pct: Decimal,
    pub final_price: Decimal,
    pub marketplace_price: Decimal,
    /// Constituents that no longer exist and were priced at zero
    pub missing_items: Vec<MissingComboItem>,
}

/// Prices combos from their constituents
pub struct ComboComposer {
    catalog: Arc<dyn CatalogRepository>,
}

impl ComboComposer {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    pub async fn quote(&self, combo_id: i32, marketplace: &MarketplaceConfig) -> Result<ComboQuote, CostingError> {
        let combo = self
            .catalog
            .combo(combo_id)
            .await?
            .ok_or(CostingError::ComboNotFound(combo_id))?;

        let mut raw_total = Decimal::ZERO;
        let mut missing_items = Vec::new();

        for item in &combo.products {
            match self.catalog.product(item.item_id).await? {
                Some(product) => raw_total += product.sale_price * Decimal::from(item.quantity),
                None => missing_items.push(MissingComboItem::Product(item.item_id)),
            }
        }
        for item in &combo.drinks {
            match self.catalog.drink(item.item_id).await? {
                Some(drink) => raw_total += drink.sale_price * Decimal::from(item.quantity),
                None => missing_items.push(MissingComboItem::Drink(item.item_id)),
            }
        }

        if !missing_items.is_empty() {
            tracing::warn!("Combo {} references missing items {:?}", combo_id, missing_items);
        }

        let final_price = combo_price(raw_total, combo.discount_pct)?;
        let marketplace_price = marketplace_price(final_price, marketplace)?;

        Ok(ComboQuote {
            combo_id,
            name: combo.name,
            raw_total,
            discount_pct: combo.discount_pct,
            final_price,
            marketplace_price,
            missing_items,
        })
    }

    /// Store the recomputed final and marketplace prices on the combo
    pub async fn refresh_combo_pricing(
        &self,
        combo_id: i32,
        marketplace: &MarketplaceConfig,
    ) -> Result<ComboQuote, CostingError> {
        let quote = self.quote(combo_id, marketplace).await?;

        let updated = self
            .catalog
            .update_combo_pricing(combo_id, quote.final_price, Some(quote.marketplace_price))
            .await?;
        if !updated {
            return Err(CostingError::ComboNotFound(combo_id));
        }

        tracing::info!(
            "Refreshed combo {} pricing: final {} marketplace {}",
            combo_id,
            quote.final_price,
            quote.marketplace_price
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComboItem;
    use crate::test_support::fixtures;
    use rust_decimal_macros::dec;

    fn ifood() -> MarketplaceConfig {
        MarketplaceConfig {
            delivery_fee: dec!(5),
            commission_pct: dec!(27),
            coupon: dec!(0),
        }
    }

    #[test]
    fn test_combo_price_applies_discount() {
        assert_eq!(combo_price(dec!(50.00), dec!(10)).unwrap(), dec!(45.00));
        assert_eq!(combo_price(dec!(50.00), dec!(0)).unwrap(), dec!(50.00));
    }

    #[test]
    fn test_burger_and_soda_combo_at_fifteen_percent_off() {
        assert_eq!(combo_price(dec!(20) + dec!(6), dec!(15)).unwrap(), dec!(22.10));
    }

    #[test]
    fn test_marketplace_price_covers_commission_and_fee() {
        assert_eq!(marketplace_price(dec!(22.10), &ifood()).unwrap(), dec!(37.12));
    }

    #[test]
    fn test_full_commission_is_a_configuration_error() {
        let config = MarketplaceConfig {
            commission_pct: dec!(100),
            ..ifood()
        };
        assert!(matches!(
            marketplace_price(dec!(10), &config),
            Err(CostingError::InvalidCommission(_))
        ));
    }

    #[test]
    fn test_discount_out_of_range() {
        assert!(matches!(combo_price(dec!(10), dec!(101)), Err(CostingError::InvalidDiscount(_))));
        assert!(matches!(combo_price(dec!(10), dec!(-1)), Err(CostingError::InvalidDiscount(_))));
    }

    #[tokio::test]
    async fn test_quote_and_refresh() {
        let catalog = Arc::new(fixtures::burger_catalog());
        let composer = ComboComposer::new(catalog.clone());

        let quote = composer.refresh_combo_pricing(fixtures::COMBO_A_B, &ifood()).await.unwrap();

        assert_eq!(quote.raw_total, dec!(26));
        assert_eq!(quote.final_price, dec!(22.10));
        assert_eq!(quote.marketplace_price, dec!(37.12));
        assert!(quote.missing_items.is_empty());

        let stored = catalog.combo(fixtures::COMBO_A_B).await.unwrap().unwrap();
        assert_eq!(stored.final_price, dec!(22.10));
        assert_eq!(stored.marketplace_price, Some(dec!(37.12)));
    }

    #[tokio::test]
    async fn test_quote_reports_missing_constituents() {
        let catalog = fixtures::burger_catalog();
        let mut combo = fixtures::combo_a_b();
        combo.id = 77;
        combo.drinks.push(ComboItem { item_id: 404, quantity: 1 });
        catalog.add_combo(combo);

        let quote = ComboComposer::new(Arc::new(catalog))
            .quote(77, &MarketplaceConfig::default())
            .await
            .unwrap();

        assert_eq!(quote.missing_items, vec![MissingComboItem::Drink(404)]);
        assert_eq!(quote.marketplace_price, quote.final_price);
    }
}
