// =============================================================================
// Fee Engine — deterministic fee amounts from a bps policy
// =============================================================================
//
// Paper fills pay only the platform component; live fills add the taker
// component. Fees are side-symmetric: a buy and a sell of identical gross
// notional produce identical fees.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::TradeMode;

/// Round to 8 fractional digits, the precision of every externally
/// observable monetary amount.
pub fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

/// Configured fee taxonomy in basis points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeePolicy {
    pub platform_fee_bps: f64,
    pub taker_fee_bps: f64,
}

/// Computes the fee owed on an order.
#[derive(Debug, Clone, Copy)]
pub struct FeeEngine {
    policy: FeePolicy,
}

impl FeeEngine {
    pub fn new(policy: FeePolicy) -> Self {
        Self { policy }
    }

    /// Fee in USD for a fill of the given gross notional, rounded to 8
    /// fractional digits.
    pub fn compute(&self, gross_notional_usd: f64, mode: TradeMode) -> f64 {
        let bps = match mode {
            TradeMode::Paper => self.policy.platform_fee_bps,
            TradeMode::Live => self.policy.platform_fee_bps + self.policy.taker_fee_bps,
        };
        round8(gross_notional_usd * bps / 10_000.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
