//! 金额计算 (rust_decimal)
//!
//! 内部用 `Decimal` 计算，存储与序列化时转回 `f64`。

use rust_decimal::prelude::*;
use shared::order::OrderItem;

/// 2 decimal places, half away from zero
const DECIMAL_PLACES: u32 = 2;

#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Sum of line totals, attributes included
pub fn items_total(items: &[OrderItem]) -> f64 {
    let total = items.iter().fold(Decimal::ZERO, |acc, item| {
        let unit = item
            .attributes
            .iter()
            .fold(to_decimal(item.price), |unit, attribute| {
                unit + to_decimal(attribute.price) * Decimal::from(attribute.quantity)
            });
        acc + unit * Decimal::from(item.quantity)
    });
    to_f64(total)
}

/// Restaurant charge `total * percent / 100`; None when no charge applies
pub fn restaurant_charge(total: f64, percent: f64) -> Option<f64> {
    if !percent.is_finite() || percent <= 0.0 || !total.is_finite() {
        return None;
    }
    let charge = to_decimal(total) * to_decimal(percent) / Decimal::ONE_HUNDRED;
    Some(to_f64(charge))
}
