//! Backtest replay
//!
//! Replays a historical candle window through the TPO+MIT scoring path
//! with a supplied weight vector and aggregates trade statistics. Used
//! standalone and as the wiring point for candidate-weight evaluation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::parallax::weights::Genes;
use crate::parallax::{score_tpo_mit, EngineParams};
use crate::persistence::Repository;
use crate::risk::RiskProjector;
use crate::types::{BacktestResult, Candle, Interval};

/// Window length fed to the scorer
const WINDOW: usize = 30;
/// Candles the window slides forward between evaluations
const STEP: usize = 10;
/// Maximum candles a synthetic trade stays open
const EXIT_HORIZON: usize = 10;
/// Synthetic entry premium for replayed trades
const SYNTHETIC_ENTRY_PREMIUM: f64 = 1.0;
/// Near-ATM delta used to project replayed premiums
const REPLAY_DELTA: f64 = 0.5;

/// Aggregate statistics from one replay, before persistence
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}

/// Pure replay over a chronological candle series. Fewer than 60 candles
/// returns zeroed statistics.
pub fn replay(candles: &[Candle], genes: &Genes, params: &EngineParams) -> ReplayStats {
    if candles.len() < 60 {
        return ReplayStats::default();
    }

    let projector = RiskProjector::default();
    let mut total_gain = 0.0;
    let mut total_loss = 0.0;
    let mut wins = 0;
    let mut losses = 0;
    let mut equity: f64 = 0.0;
    let mut peak: f64 = 0.0;
    let mut max_drawdown: f64 = 0.0;

    let mut start = 0;
    while start + WINDOW <= candles.len() {
        let window = &candles[start..start + WINDOW];
        let price = window[WINDOW - 1].close;

        if let Some(candidate) = score_tpo_mit(window, price, genes, params) {
            if candidate.confidence >= genes.min_confidence {
                let plan = projector.project(
                    SYNTHETIC_ENTRY_PREMIUM,
                    candidate.levels,
                    Some(REPLAY_DELTA),
                );

                let exit_idx = (start + WINDOW - 1 + EXIT_HORIZON).min(candles.len() - 1);
                let exit_stock = candles[exit_idx].close;
                let drift =
                    (exit_stock - price) * candidate.direction.sign() * REPLAY_DELTA;
                let exit_premium = (SYNTHETIC_ENTRY_PREMIUM + drift).max(0.01);

                let pnl = if exit_premium >= plan.target {
                    plan.target - plan.entry
                } else if exit_premium <= plan.stop {
                    plan.stop - plan.entry
                } else {
                    exit_premium - plan.entry
                };

                if pnl > 0.0 {
                    wins += 1;
                    total_gain += pnl;
                } else {
                    losses += 1;
                    total_loss += pnl.abs();
                }
                equity += pnl;
                peak = peak.max(equity);
                max_drawdown = max_drawdown.max(peak - equity);
            }
        }
        start += STEP;
    }

    let total_trades = wins + losses;
    ReplayStats {
        total_trades,
        wins,
        losses,
        win_rate: if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        },
        profit_factor: if total_loss > 0.0 {
            total_gain / total_loss
        } else if total_gain > 0.0 {
            f64::INFINITY
        } else {
            0.0
        },
        max_drawdown,
    }
}

/// Repository-wired replay runner
pub struct BacktestReplay {
    repo: Arc<Repository>,
    params: EngineParams,
}

impl BacktestReplay {
    pub fn new(repo: Arc<Repository>, params: EngineParams) -> Self {
        Self { repo, params }
    }

    /// Load the stored window, replay it, and persist the aggregate row.
    pub fn run(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        genes: &Genes,
    ) -> Result<BacktestResult> {
        let candles = self
            .repo
            .candles_between(ticker, Interval::Min1, start, end)?;
        let stats = replay(&candles, genes, &self.params);

        let result = BacktestResult {
            ticker: ticker.to_string(),
            strategy_name: "TPO_MIT".to_string(),
            time_range: format!(
                "{}..{}",
                start.format("%Y-%m-%dT%H:%M"),
                end.format("%Y-%m-%dT%H:%M")
            ),
            total_trades: stats.total_trades,
            wins: stats.wins,
            losses: stats.losses,
            win_rate: stats.win_rate,
            profit_factor: stats.profit_factor,
            max_drawdown: stats.max_drawdown,
            run_at: Utc::now(),
        };

        if stats.total_trades > 0 {
            self.repo.insert_backtest_result(&result)?;
        }
        info!(
            "replayed {} over {} candles: {} trades, win rate {:.2}",
            ticker,
            candles.len(),
            stats.total_trades,
            stats.win_rate
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::make_candle;

    /// Trending series with a value area left behind below price
    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 450.0 + (i as f64 * 0.08);
                let wobble = (i as f64 * 0.7).sin() * 0.2;
                let p = base + wobble;
                make_candle(i as i64, p, p + 0.3, p - 0.3, p + 0.05, 200.0)
            })
            .collect()
    }

    #[test]
    fn test_replay_needs_sixty_candles() {
        let stats = replay(
            &trending_candles(59),
            &Genes::default(),
            &EngineParams::default(),
        );
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
    }

    #[test]
    fn test_replay_trade_accounting() {
        let stats = replay(
            &trending_candles(240),
            &Genes::default(),
            &EngineParams::default(),
        );
        assert_eq!(stats.total_trades, stats.wins + stats.losses);
        if stats.total_trades > 0 {
            assert!(stats.win_rate >= 0.0 && stats.win_rate <= 1.0);
            assert!(stats.max_drawdown >= 0.0);
        }
    }

    #[test]
    fn test_raising_confidence_floor_never_adds_trades() {
        let candles = trending_candles(240);
        let params = EngineParams::default();

        let mut permissive = Genes::default();
        permissive.min_confidence = 50.0;
        let mut strict = permissive.clone();
        strict.min_confidence = 75.0;

        let low = replay(&candles, &permissive, &params);
        let high = replay(&candles, &strict, &params);
        assert!(high.total_trades <= low.total_trades);
    }
}
