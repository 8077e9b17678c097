//! Basis-point arithmetic.
//!
//! All percentage configuration in Grove is expressed in basis points
//! (1/10000). Products are computed in `u128` and narrowed back with a
//! checked conversion, so callers see `None` instead of silent wraparound.

/// 100% in basis points.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// `amount * bps / 10000`, rounded down.
///
/// Returns `None` only if the result does not fit in a `u64`, which cannot
/// happen for `bps <= 10000`.
pub fn apply_bps(amount: u64, bps: u32) -> Option<u64> {
    mul_div(amount, u64::from(bps), BPS_DENOMINATOR)
}

/// `a * b / denominator`, rounded down, without intermediate overflow.
///
/// Returns `None` if `denominator` is zero or the quotient exceeds `u64::MAX`.
pub fn mul_div(a: u64, b: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let product = u128::from(a) * u128::from(b);
    u64::try_from(product / u128::from(denominator)).ok()
}

/// The smallest amount accepted when `amount` may lose at most `slippage_bps`.
pub fn min_after_slippage(amount: u64, slippage_bps: u32) -> Option<u64> {
    let haircut = apply_bps(amount, slippage_bps)?;
    amount.checked_sub(haircut)
}

/// Whether `bps` is within 0..=100%.
pub fn is_valid_bps(bps: u32) -> bool {
    u64::from(bps) <= BPS_DENOMINATOR
}
