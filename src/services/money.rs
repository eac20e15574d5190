//! Decimal money arithmetic shared by checkout and the callback handler.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Subtotal, tax and grand total of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Tax on `subtotal`, rounded to cents half away from zero.
///
/// Returns `None` when the product does not fit in a `Decimal`.
pub fn compute_tax(subtotal: Decimal, rate: Decimal) -> Option<Decimal> {
    subtotal
        .checked_mul(rate)
        .map(|tax| tax.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Totals for `(unit_price, quantity)` lines at the given tax rate.
///
/// Returns `None` on arithmetic overflow.
pub fn compute_totals<I>(lines: I, rate: Decimal) -> Option<Totals>
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let subtotal = lines.into_iter().try_fold(Decimal::ZERO, |acc, (price, quantity)| {
        price
            .checked_mul(Decimal::from(quantity))
            .and_then(|line| acc.checked_add(line))
    })?;
    let tax = compute_tax(subtotal, rate)?;
    Some(Totals {
        subtotal,
        tax,
        total: subtotal.checked_add(tax)?,
    })
}

/// Formats an amount with exactly two decimals, as sent to the gateway.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Parses a gateway amount such as `"236.00"`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn two_units_at_one_hundred_with_eighteen_percent() {
        let totals = compute_totals([(dec!(100), 2)], dec!(0.18)).unwrap();
        assert_eq!(totals.subtotal, dec!(200));
        assert_eq!(totals.tax, dec!(36.00));
        assert_eq!(totals.total, dec!(236.00));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 0.25 * 0.18 = 0.045
        assert_eq!(compute_tax(dec!(0.25), dec!(0.18)), Some(dec!(0.05)));
        // 14999 * 0.18 = 2699.82
        assert_eq!(compute_tax(dec!(14999), dec!(0.18)), Some(dec!(2699.82)));
    }

    #[test]
    fn overflowing_lines_yield_none() {
        assert_eq!(compute_totals([(Decimal::MAX, 2)], dec!(0.18)), None);
        assert_eq!(
            compute_totals([(Decimal::MAX, 1), (dec!(1), 1)], dec!(0.18)),
            None
        );
        assert_eq!(compute_tax(Decimal::MAX, dec!(1.5)), None);
    }

    #[test]
    fn amounts_format_with_two_decimals() {
        assert_eq!(format_amount(dec!(236)), "236.00");
        assert_eq!(format_amount(dec!(236.0000)), "236.00");
        assert_eq!(format_amount(dec!(17698.82)), "17698.82");
        assert_eq!(format_amount(dec!(0.005)), "0.01");
    }

    #[test]
    fn parses_gateway_amounts() {
        assert_eq!(parse_amount(" 236.00 "), Some(dec!(236)));
        assert_eq!(parse_amount("abc"), None);
    }
}
