//! Risk projector - stock levels to option-contract trade plans
//!
//! Translates stock-price entry/stop/target levels into option-premium
//! levels via delta projection. Every trade-plan number downstream of this
//! module is an option premium, never a stock price.

use crate::types::TradePlan;

/// Minimum premium any projected level can reach
const PREMIUM_FLOOR: f64 = 0.05;

/// Stock-price trade levels produced by a signal engine
#[derive(Debug, Clone, Copy)]
pub struct StockLevels {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

/// Risk projection configuration
#[derive(Debug, Clone)]
pub struct RiskProjector {
    /// Fallback stop as a fraction of current premium when greeks are absent
    pub stop_loss_pct: f64,
    /// Fallback target as a multiple of current premium when greeks are absent
    pub target_multiple: f64,
}

impl Default for RiskProjector {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.5,
            target_multiple: 2.0,
        }
    }
}

impl RiskProjector {
    pub fn new(stop_loss_pct: f64, target_multiple: f64) -> Self {
        Self {
            stop_loss_pct,
            target_multiple,
        }
    }

    /// Project a contract trade plan from the current option mid and the
    /// engine's stock levels. `delta` comes from the chain when available;
    /// without it the percentage fallback applies.
    pub fn project(&self, mid_now: f64, levels: StockLevels, delta: Option<f64>) -> TradePlan {
        let (stop, target) = match delta {
            Some(d) if d.abs() > 0.0 => {
                let abs_delta = d.abs();
                let stop_dist = (levels.entry - levels.stop).abs();
                let target_dist = (levels.target - levels.entry).abs();
                (
                    (mid_now - stop_dist * abs_delta).max(PREMIUM_FLOOR),
                    (mid_now + target_dist * abs_delta).max(PREMIUM_FLOOR),
                )
            }
            _ => (
                (mid_now * (1.0 - self.stop_loss_pct)).max(PREMIUM_FLOOR),
                (mid_now * self.target_multiple).max(PREMIUM_FLOOR),
            ),
        };

        let risk = mid_now - stop;
        let risk_reward = if risk > 0.0 {
            (target - mid_now) / risk
        } else {
            0.0
        };

        TradePlan {
            entry: mid_now,
            stop,
            target,
            risk_reward,
        }
    }
}
