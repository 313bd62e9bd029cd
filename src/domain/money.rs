//! Money arithmetic on 2-decimal amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    round2(unit_price * Decimal::from(quantity))
}

/// Order total over (unit price, quantity) lines, rounded to 2 decimals.
pub fn order_total<I: IntoIterator<Item = (Decimal, i32)>>(lines: I) -> Decimal {
    round2(
        lines
            .into_iter()
            .map(|(price, qty)| price * Decimal::from(qty))
            .sum(),
    )
}

/// Gateway APIs take amounts in minor units (paise for INR).
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::from(100)).round().to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_total() {
        let total = order_total(vec![(Decimal::new(1000, 2), 2), (Decimal::new(500, 2), 1)]);
        assert_eq!(total, Decimal::new(2500, 2));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round2(Decimal::new(19999, 3)), Decimal::new(2000, 2));
        assert_eq!(line_total(Decimal::new(3333, 3), 3), Decimal::new(1000, 2));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(2500, 2)), 2500);
        assert_eq!(to_minor_units(Decimal::new(99, 2)), 99);
        assert_eq!(to_minor_units(Decimal::ZERO), 0);
    }
}
