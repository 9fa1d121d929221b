//! Currency arithmetic shared by the allocators.
//!
//! Every amount is rounded to two decimal places before it is compared.
//! Equality checks allow a configurable tolerance (0.01 by default); bound
//! checks are strict and use the rounded values directly, except shares,
//! which are rounded down.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount to cents, midpoint away from zero
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum a sequence of amounts and round the result
pub fn sum_amounts<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round_currency(amounts.into_iter().sum())
}

/// Whether two amounts are equal within `tolerance`
pub fn amounts_match(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (round_currency(a) - round_currency(b)).abs() <= tolerance
}

/// Largest whole-cent amount not above `amount * ratio`. Caps are rounded
/// down so a price over the exact share can never pass.
pub fn share_of(amount: Decimal, ratio: Decimal) -> Decimal {
    (amount * ratio).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Whatever is left of `target` after `allocated`, never below zero
pub fn headroom(target: Decimal, allocated: Decimal) -> Decimal {
    round_currency(target - allocated).max(Decimal::ZERO)
}

/// Format an amount for user-facing messages
pub fn format_amount(currency_symbol: &str, amount: Decimal) -> String {
    format!("{}{:.2}", currency_symbol, round_currency(amount))
}

/// Format a ratio such as 0.2 as "20%"
pub fn format_percentage(ratio: Decimal) -> String {
    format!("{}%", (ratio * Decimal::ONE_HUNDRED).normalize())
}
