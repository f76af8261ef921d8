//! Slice planning for the sliced execution strategies
//!
//! Every plan sums to at most the quantity it was given. Iceberg and
//! participate clips are rounded down to the working scale and floored at the
//! minimum slice; TWAP and VWAP split at full decimal precision.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used for slice sizes
pub fn working_scale(quantity: Decimal, min_slice: Decimal) -> u32 {
    quantity.scale().max(min_slice.scale())
}

fn round_down(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::ToZero)
}

/// Exactly `slices` equal slices of `quantity / slices`.
///
/// Division is at full decimal precision; the last slice takes whatever the
/// division leaves over so the plan sums to `quantity` exactly.
pub fn twap_plan(quantity: Decimal, slices: usize) -> Vec<Decimal> {
    if quantity <= Decimal::ZERO || slices == 0 {
        return Vec::new();
    }

    let n = Decimal::from(slices);
    let base = quantity / n;
    let mut plan = vec![base; slices - 1];
    plan.push(quantity - base * Decimal::from(slices - 1));
    plan
}

/// Slices proportional to volume weights, stopping once quantity is exhausted.
pub fn vwap_plan(quantity: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let mut remaining = quantity;
    let mut plan = Vec::with_capacity(weights.len());
    for weight in weights {
        if remaining <= Decimal::ZERO {
            break;
        }
        let slice = (quantity * *weight).min(remaining);
        if slice > Decimal::ZERO {
            plan.push(slice);
            remaining -= slice;
        }
    }
    plan
}

/// Fixed visible clip of `quantity * visible_fraction`, repeated until done.
pub fn iceberg_plan(
    quantity: Decimal,
    visible_fraction: Decimal,
    min_slice: Decimal,
    max_slices: usize,
) -> Vec<Decimal> {
    let scale = working_scale(quantity, min_slice);
    let visible = round_down(quantity * visible_fraction, scale).max(min_slice);
    repeat_until_done(quantity, max_slices, |_| visible)
}

/// Each slice takes `participation` of what is still open.
pub fn participate_plan(
    quantity: Decimal,
    participation: Decimal,
    min_slice: Decimal,
    max_slices: usize,
) -> Vec<Decimal> {
    let scale = working_scale(quantity, min_slice);
    repeat_until_done(quantity, max_slices, |remaining| {
        round_down(remaining * participation, scale).max(min_slice)
    })
}

fn repeat_until_done(
    quantity: Decimal,
    max_slices: usize,
    next_size: impl Fn(Decimal) -> Decimal,
) -> Vec<Decimal> {
    let mut remaining = quantity;
    let mut plan = Vec::new();
    while remaining > Decimal::ZERO && plan.len() < max_slices {
        let slice = next_size(remaining).min(remaining);
        if slice <= Decimal::ZERO {
            // min_slice of zero with a rounding-to-zero clip
            plan.push(remaining);
            break;
        }
        plan.push(slice);
        remaining -= slice;
    }
    plan
}
