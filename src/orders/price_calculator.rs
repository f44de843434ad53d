use rust_decimal::Decimal;

/// Service for calculating order prices and subtotals
pub struct PriceCalculator;

impl PriceCalculator {
    /// Unit price snapshot: catalog price plus every selected add-on
    pub fn unit_price(base_price: Decimal, add_on_prices: &[Decimal]) -> Decimal {
        base_price + add_on_prices.iter().sum::<Decimal>()
    }

    /// Calculate subtotal for an order item
    ///
    /// # Arguments
    /// * `quantity` - Number of items ordered
    /// * `unit_price` - Price per item at time of order
    ///
    /// # Returns
    /// Subtotal as Decimal (quantity * unit_price)
    pub fn calculate_subtotal(quantity: i32, unit_price: Decimal) -> Decimal {
        Decimal::from(quantity) * unit_price
    }

    /// Sum of all line subtotals
    pub fn calculate_total(subtotals: &[Decimal]) -> Decimal {
        subtotals.iter().sum()
    }

    /// Order total charged to the customer; fixed at creation
    pub fn order_total(subtotal: Decimal, delivery_fee: Decimal) -> Decimal {
        subtotal + delivery_fee
    }
}
