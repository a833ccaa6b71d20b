//! Monetary arithmetic in integer minor units (cents).
//!
//! All amounts are `i64` minor units; rates are basis points. Percentage
//! application rounds half-up and the residual unit is assigned to the
//! platform fee, so any decomposition sums back to the original amount
//! exactly.

/// One hundred percent, in basis points.
pub const BPS_SCALE: i64 = 10_000;

/// Default milestone split for orders created without explicit milestones:
/// kickoff 0%, execution 70%, delivery 30%.
pub const DEFAULT_SPLIT_BPS: [u32; 3] = [0, 7_000, 3_000];

/// Platform fee for `amount`, rounded half-up.
pub fn platform_fee(amount: i64, fee_rate_bps: u32) -> i64 {
    let scaled = amount as i128 * fee_rate_bps as i128;
    ((scaled + BPS_SCALE as i128 / 2) / BPS_SCALE as i128) as i64
}

/// Split `amount` into platform fee and worker payout. The fee takes the
/// rounding residual, so `fee + payout == amount` always holds.
pub fn fee_decomposition(amount: i64, fee_rate_bps: u32) -> (i64, i64) {
    let fee = platform_fee(amount, fee_rate_bps);
    (fee, amount - fee)
}

/// Allocate `total` across the given basis-point shares. Shares must sum to
/// 100%; every slice but the last is rounded half-up and the last absorbs
/// the residual so the allocation sums to `total` exactly.
pub fn allocate(total: i64, shares_bps: &[u32]) -> Option<Vec<i64>> {
    if shares_bps.is_empty() || shares_bps.iter().map(|&s| s as i64).sum::<i64>() != BPS_SCALE {
        return None;
    }

    let mut amounts = Vec::with_capacity(shares_bps.len());
    let mut allocated: i64 = 0;
    for (i, &share) in shares_bps.iter().enumerate() {
        let amount = if i == shares_bps.len() - 1 {
            total - allocated
        } else {
            platform_fee(total, share)
        };
        allocated += amount;
        amounts.push(amount);
    }
    Some(amounts)
}
