//! Deposit fee arithmetic.
//!
//! Rates are 18-decimal fixed point: `FEE_SCALE` (1e18) is 100%, so a rate of
//! `2 * 10^15` is 0.2%.

use primitive_types::U256;

use crate::error::LedgerError;

/// Fixed-point denominator for fee rates; also the largest valid rate.
pub const FEE_SCALE: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Result of splitting a deposit between the fee recipient and the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: U256,
    pub net: U256,
}

/// Reject rates outside `[0, FEE_SCALE]`.
pub fn check_fee_rate(rate: U256) -> Result<(), LedgerError> {
    if rate > FEE_SCALE {
        return Err(LedgerError::FeeOutOfRange {
            rate,
            scale: FEE_SCALE,
        });
    }
    Ok(())
}

/// Split `amount` into `fee = floor(amount * rate / FEE_SCALE)` and
/// `net = amount - fee`.
///
/// `amount * rate` is computed as `q * rate + (r * rate) / FEE_SCALE` with
/// `amount = q * FEE_SCALE + r`, which is exact and cannot overflow for any
/// in-range rate.
pub fn split_fee(amount: U256, rate: U256) -> Result<FeeSplit, LedgerError> {
    check_fee_rate(rate)?;
    let (q, r) = amount.div_mod(FEE_SCALE);
    let whole = q.checked_mul(rate).ok_or(LedgerError::Overflow)?;
    // r < 1e18 and rate <= 1e18, so the product stays below 2^120
    let part = (r * rate) / FEE_SCALE;
    let fee = whole.checked_add(part).ok_or(LedgerError::Overflow)?;
    let net = amount.checked_sub(fee).ok_or(LedgerError::Overflow)?;
    Ok(FeeSplit { fee, net })
}
