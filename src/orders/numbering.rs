use chrono::{DateTime, Utc};
use rand::Rng;

use crate::orders::OrderOrigin;

/// Attempts before giving up on a unique order number
pub const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Human-readable order number
///
/// Storefront orders get `#` plus six digits so customers can quote them on
/// WhatsApp; sales-screen orders get `PED-<millis>`. Retries (`attempt > 0`)
/// of a sales number get a suffix since the clock may not have moved.
pub fn generate_order_number<R: Rng>(origin: OrderOrigin, now: DateTime<Utc>, attempt: u32, rng: &mut R) -> String {
    match origin {
        OrderOrigin::Menu => format!("#{}", rng.gen_range(100_000..1_000_000)),
        OrderOrigin::Vendas if attempt == 0 => format!("PED-{}", now.timestamp_millis()),
        OrderOrigin::Vendas => format!("PED-{}-{}", now.timestamp_millis(), rng.gen_range(10..100)),
    }
}

/// Stored form of a number typed by a person: `1234` and `#1234` both become `#1234`
pub fn normalize_order_number(input: &str) -> String {
    let trimmed = input.trim();
    let digits = trimmed.trim_start_matches('#');
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("#{}", digits)
    } else {
        trimmed.to_uppercase()
    }
}
