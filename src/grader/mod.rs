//! Grader - closes out active predictions against projected premiums
//!
//! Each pass estimates the current option premium for every ACTIVE
//! prediction from the latest stored candle, records WIN/LOSS with the
//! realized P&L, and hands the batch win-rate to the optimizer. A
//! separate sweep expires predictions left over from prior sessions.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::calendar::MarketCalendar;
use crate::evolution::EvolutionEngine;
use crate::persistence::Repository;
use crate::types::{OutcomeResult, Prediction};

/// Near-ATM delta assumed when grading without the contract's greeks
const DEFAULT_GRADING_DELTA: f64 = 0.5;
/// Projected premiums never fall below this
const PREMIUM_FLOOR: f64 = 0.01;

/// One grading pass, aggregated
#[derive(Debug, Clone, Default)]
pub struct GradeSummary {
    pub graded: usize,
    pub wins: usize,
    pub losses: usize,
}

impl GradeSummary {
    pub fn rate(&self) -> Option<f64> {
        if self.graded == 0 {
            None
        } else {
            Some(self.wins as f64 / self.graded as f64)
        }
    }
}

/// Rolling win-rate over a window
#[derive(Debug, Clone, Default)]
pub struct WinRateStats {
    pub graded: usize,
    pub wins: usize,
    pub losses: usize,
    pub rate: f64,
}

/// Week-over-week accuracy comparison
#[derive(Debug, Clone)]
pub struct DegradationReport {
    pub previous_rate: f64,
    pub recent_rate: f64,
    pub degradation: f64,
    pub graded: usize,
    pub alert: bool,
}

pub struct Grader {
    repo: Arc<Repository>,
    calendar: MarketCalendar,
    optimizer: Arc<EvolutionEngine>,
    rolling_window_days: i64,
    degradation_alert_threshold: f64,
    min_graded_for_alert: usize,
}

impl Grader {
    pub fn new(
        repo: Arc<Repository>,
        calendar: MarketCalendar,
        optimizer: Arc<EvolutionEngine>,
        rolling_window_days: i64,
        degradation_alert_threshold: f64,
        min_graded_for_alert: usize,
    ) -> Self {
        Self {
            repo,
            calendar,
            optimizer,
            rolling_window_days,
            degradation_alert_threshold,
            min_graded_for_alert,
        }
    }

    /// Project the current premium for a prediction from the latest stock
    /// price, using the documented near-ATM delta.
    fn project_premium(prediction: &Prediction, current_stock: f64) -> f64 {
        let drift = (current_stock - prediction.entry_stock_price)
            * prediction.direction.sign()
            * DEFAULT_GRADING_DELTA;
        (prediction.plan.entry + drift).max(PREMIUM_FLOOR)
    }

    /// Grade every ACTIVE prediction with stored price data. Items without
    /// a recent candle are skipped and stay active for the next pass.
    pub fn grade_open(&self) -> Result<GradeSummary> {
        let active = self.repo.get_active_predictions(None)?;
        let mut summary = GradeSummary::default();
        let mut per_ticker: HashMap<String, (usize, usize)> = HashMap::new();

        for prediction in active {
            let candle = match self.repo.latest_candle(&prediction.ticker) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    warn!("latest candle lookup failed for {}: {:#}", prediction.ticker, e);
                    continue;
                }
            };

            let current = Self::project_premium(&prediction, candle.close);
            let result = if current >= prediction.plan.target {
                OutcomeResult::Win
            } else if current <= prediction.plan.stop {
                OutcomeResult::Loss
            } else if current > prediction.plan.entry {
                OutcomeResult::Win
            } else {
                OutcomeResult::Loss
            };
            let pnl = current - prediction.plan.entry;

            if let Err(e) = self
                .repo
                .close_prediction(&prediction.id, result, pnl, Utc::now())
            {
                warn!("close failed for {}: {:#}", prediction.id, e);
                continue;
            }

            summary.graded += 1;
            let entry = per_ticker.entry(prediction.ticker.clone()).or_insert((0, 0));
            entry.0 += 1;
            if result == OutcomeResult::Win {
                summary.wins += 1;
                entry.1 += 1;
            } else {
                summary.losses += 1;
            }
            info!(
                "graded {} {} {} -> {} (pnl {:+.2})",
                prediction.ticker, prediction.direction, prediction.engine, result, pnl
            );
        }

        // Retraining is fire-and-forget: an optimizer failure leaves the
        // active weights untouched.
        for (ticker, (graded, wins)) in per_ticker {
            let rate = wins as f64 / graded as f64;
            if let Err(e) = self.optimizer.maybe_evolve(&ticker, rate) {
                warn!("retraining failed for {}: {:#}", ticker, e);
            }
        }

        Ok(summary)
    }

    /// Mark ACTIVE predictions generated before today's session as EXPIRED
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = self.calendar.local_midnight_utc(now);
        self.repo.expire_active_before(cutoff)
    }

    /// Rolling win-rate for a ticker over the configured window
    pub fn win_rate(&self, ticker: &str, window_days: i64) -> Result<WinRateStats> {
        let since = Utc::now() - Duration::days(window_days);
        let joined = self.repo.outcomes_joined(Some(ticker), Some(since))?;
        let graded = joined.len();
        let wins = joined
            .iter()
            .filter(|(_, o)| o.result == OutcomeResult::Win)
            .count();
        Ok(WinRateStats {
            graded,
            wins,
            losses: graded - wins,
            rate: if graded > 0 {
                wins as f64 / graded as f64
            } else {
                0.0
            },
        })
    }

    /// Compare the previous window against the most recent one
    pub fn degradation(&self, ticker: &str) -> Result<DegradationReport> {
        let now = Utc::now();
        let week = Duration::days(self.rolling_window_days);
        let joined = self.repo.outcomes_joined(Some(ticker), Some(now - week * 2))?;

        let mut prev = (0usize, 0usize);
        let mut recent = (0usize, 0usize);
        for (_, outcome) in &joined {
            let bucket = if outcome.closed_at >= now - week {
                &mut recent
            } else {
                &mut prev
            };
            bucket.0 += 1;
            if outcome.result == OutcomeResult::Win {
                bucket.1 += 1;
            }
        }

        let rate = |(graded, wins): (usize, usize)| {
            if graded > 0 {
                wins as f64 / graded as f64
            } else {
                0.0
            }
        };
        let previous_rate = rate(prev);
        let recent_rate = rate(recent);
        let degradation = previous_rate - recent_rate;
        let graded = prev.0 + recent.0;

        Ok(DegradationReport {
            previous_rate,
            recent_rate,
            degradation,
            graded,
            alert: degradation > self.degradation_alert_threshold
                && graded >= self.min_graded_for_alert,
        })
    }
}
