//! Money and quantity normalizer
//!
//! Receipt entry must never block on a single malformed cell, so parsing never
//! fails: unparsable amounts become `0.00` and unparsable quantities become `1`.
//! There is no way to tell "user typed 0.00" from "user typed garbage" afterwards.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Number of decimal places amounts are carried at.
pub const AMOUNT_SCALE: u32 = 2;

/// Largest amount a receipt field can hold (the store columns are `NUMERIC(12,2)`).
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, AMOUNT_SCALE)
}

/// The amount substituted for malformed input.
pub fn zero_amount() -> Decimal {
    Decimal::new(0, AMOUNT_SCALE)
}

/// Bring an already numeric amount to canonical form.
///
/// Negative values and values above [`max_amount`] are treated as malformed.
pub fn canonical_amount(value: Decimal) -> Decimal {
    if value.is_zero() || value.is_sign_negative() {
        return zero_amount();
    }
    let mut rounded =
        value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded > max_amount() {
        return zero_amount();
    }
    rounded.rescale(AMOUNT_SCALE);
    rounded
}

/// Sum for display. Saturates at `Decimal::MAX` instead of overflowing.
pub fn sum_amounts<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(zero_amount(), |total, amount| total.checked_add(amount))
        .unwrap_or(Decimal::MAX)
}

/// Parse free-text amount input into a canonical decimal.
pub fn parse_amount(text: &str) -> Decimal {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).trim_start();
    if trimmed.is_empty() {
        return zero_amount();
    }

    match Decimal::from_str(trimmed) {
        Ok(value) => canonical_amount(value),
        Err(_) => zero_amount(),
    }
}

/// Parse free-text quantity input into an integer `>= 1`.
pub fn parse_quantity(text: &str) -> u32 {
    match text.trim().parse::<u32>() {
        Ok(0) | Err(_) => 1,
        Ok(quantity) => quantity,
    }
}

/// Render an amount the way receipts display it (`42.10`).
pub fn format_amount(value: Decimal) -> String {
    format!("{:.2}", canonical_amount(value))
}

/// Lenient serde adapters for amounts and quantities.
///
/// OCR replies and legacy rows carry numbers either as JSON numbers or strings;
/// both go through the normalizer, so a bad cell never fails deserialization.
pub mod lenient {
    use super::{canonical_amount, parse_amount, parse_quantity, zero_amount};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(amount_from_value(value.as_ref()))
    }

    pub fn quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(quantity_from_value(value.as_ref()))
    }

    pub fn amount_from_value(value: Option<&Value>) -> Decimal {
        match value {
            Some(Value::String(text)) => parse_amount(text),
            Some(Value::Number(number)) => number
                .as_f64()
                .and_then(Decimal::from_f64)
                .map(canonical_amount)
                .unwrap_or_else(zero_amount),
            _ => zero_amount(),
        }
    }

    pub fn quantity_from_value(value: Option<&Value>) -> u32 {
        match value {
            Some(Value::String(text)) => parse_quantity(text),
            Some(Value::Number(number)) => number
                .as_u64()
                .filter(|q| *q >= 1 && *q <= u32::MAX as u64)
                .map(|q| q as u32)
                .unwrap_or(1),
            _ => 1,
        }
    }
}
